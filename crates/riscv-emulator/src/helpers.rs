//! Helper functions for testing RISC-V code.
//!
//! Programs are placed at [`CODE_BASE`] in a read/execute region and get a
//! read/write RAM region at [`RAM_BASE`]. The `expect_*` helpers panic with
//! disassembly and the execution log when the program misbehaves.

use std::fmt::Write as _;

use riscv_encoder::{assemble_code, Gpr};

use crate::{
    emulator::Engine,
    error::{EmulatorError, MemoryError},
    logging::LogLevel,
    memory::Permissions,
    profile::{EngineConfig, IsaProfile},
};

/// Load address of test programs.
pub const CODE_BASE: u64 = 0x0;
/// Default RAM start address.
pub const RAM_BASE: u64 = 0x8000_0000;
/// Default RAM size.
pub const DEFAULT_RAM_SIZE: u64 = 1024 * 1024;

fn round_up(len: u64, page: u64) -> u64 {
    len.div_ceil(page).max(1) * page
}

fn build(
    profile: IsaProfile,
    config: EngineConfig,
    code: &[u8],
    ram_size: u64,
) -> Result<Engine, EmulatorError> {
    let page = config.page_size;
    let mut engine = Engine::with_config(profile, config)?;
    engine.map(
        CODE_BASE,
        round_up(code.len() as u64, page),
        Permissions::READ | Permissions::EXEC,
    )?;
    engine.write_bytes(CODE_BASE, code)?;
    if ram_size > 0 {
        engine.map(
            RAM_BASE,
            round_up(ram_size, page),
            Permissions::READ | Permissions::WRITE,
        )?;
    }
    engine.set_pc(CODE_BASE);
    Ok(engine)
}

fn assemble(asm: &str) -> Result<Vec<u8>, EmulatorError> {
    assemble_code(asm).map_err(EmulatorError::Assembly)
}

fn test_config() -> EngineConfig {
    EngineConfig::default().with_log_level(LogLevel::Instructions)
}

/// Create an RV32 emulator from assembly code.
pub fn debug_riscv_asm(asm: &str) -> Result<Engine, EmulatorError> {
    debug_riscv_asm_with_ram(asm, DEFAULT_RAM_SIZE)
}

/// Create an RV32 emulator from assembly code with specified RAM size.
pub fn debug_riscv_asm_with_ram(asm: &str, ram_size: u64) -> Result<Engine, EmulatorError> {
    build(IsaProfile::rv32(), test_config(), &assemble(asm)?, ram_size)
}

/// Create an emulator for `profile` from assembly code.
pub fn debug_riscv_asm_with_profile(
    asm: &str,
    profile: IsaProfile,
) -> Result<Engine, EmulatorError> {
    build(profile, test_config(), &assemble(asm)?, DEFAULT_RAM_SIZE)
}

/// Create an RV32 emulator from binary code bytes.
pub fn debug_riscv_bytes(bytes: &[u8]) -> Result<Engine, EmulatorError> {
    build(IsaProfile::rv32(), test_config(), bytes, DEFAULT_RAM_SIZE)
}

/// Format error with disassembly and logs.
pub fn format_error(engine: &Engine, error: &EmulatorError) -> String {
    let mut result = String::new();
    result.push_str("=== RISC-V Execution Error ===\n\n");
    let _ = writeln!(result, "Error: {}", error);
    if let Some(pc) = error.pc() {
        let _ = writeln!(result, "PC: 0x{:08x}", pc);
    }
    result.push('\n');
    result.push_str(&engine.format_debug_info(error.pc(), 10));
    result.push('\n');
    result.push_str(&engine.dump_state());
    result
}

fn run_ok(mut engine: Engine) -> Engine {
    if let Err(e) = engine.run_until_ebreak() {
        panic!("{}\n{}", format_error(&engine, &e), e);
    }
    engine
}

/// Expect code to run successfully until EBREAK, returning the emulator.
pub fn expect_ok(asm: &str) -> Engine {
    let engine = debug_riscv_asm(asm).unwrap_or_else(|e| panic!("{}", e));
    run_ok(engine)
}

/// Expect code to run successfully and leave `expected` in `reg`.
///
/// The register is compared sign-extended from XLEN.
pub fn expect_register(asm: &str, reg: Gpr, expected: i64) {
    let engine = expect_ok(asm);
    let actual = engine.get_register_signed(reg);
    if actual != expected {
        panic!(
            "Register {} mismatch: expected {} (0x{:x}), got {} (0x{:x})\n\nCode:\n{}\n{}",
            reg,
            expected,
            expected,
            actual,
            actual,
            asm,
            engine.format_logs()
        );
    }
}

/// Expect code to run successfully and return a specific value in a0 (convenience function).
pub fn expect_a0(asm: &str, expected: i64) {
    expect_register(asm, Gpr::A0, expected);
}

/// Expect code to fail with an error accepted by `check`.
pub fn expect_error<F>(asm: &str, check: F)
where
    F: FnOnce(&EmulatorError) -> bool,
{
    expect_error_with_ram(asm, DEFAULT_RAM_SIZE, check)
}

/// Expect code to fail with an error accepted by `check`, with custom RAM size.
pub fn expect_error_with_ram<F>(asm: &str, ram_size: u64, check: F)
where
    F: FnOnce(&EmulatorError) -> bool,
{
    let engine = debug_riscv_asm_with_ram(asm, ram_size).unwrap_or_else(|e| panic!("{}", e));
    expect_engine_error(engine, asm, check)
}

fn expect_engine_error<F>(mut engine: Engine, asm: &str, check: F)
where
    F: FnOnce(&EmulatorError) -> bool,
{
    match engine.run_until_ebreak() {
        Ok(_) => {
            panic!("Expected error but execution succeeded\n\nCode:\n{}", asm);
        }
        Err(e) => {
            if !check(&e) {
                panic!("Error check failed\n{}\n{}", format_error(&engine, &e), e);
            }
        }
    }
}

/// Expect code to fail accessing unmapped or protected memory.
pub fn expect_memory_error(asm: &str) {
    expect_memory_error_with_ram(asm, DEFAULT_RAM_SIZE)
}

/// Expect code to fail accessing unmapped or protected memory, with custom RAM size.
pub fn expect_memory_error_with_ram(asm: &str, ram_size: u64) {
    expect_error_with_ram(asm, ram_size, |e| {
        matches!(
            e.memory_error(),
            Some(MemoryError::UnmappedAccess { .. } | MemoryError::PermissionDenied { .. })
        )
    });
}

/// Expect code to fail with an UnalignedAccess error under strict alignment.
pub fn expect_unaligned_error(asm: &str) {
    let code = assemble(asm).unwrap_or_else(|e| panic!("{}", e));
    let engine = build(
        IsaProfile::rv32(),
        test_config().with_strict_alignment(true),
        &code,
        DEFAULT_RAM_SIZE,
    )
    .unwrap_or_else(|e| panic!("{}", e));
    expect_engine_error(engine, asm, |e| {
        matches!(e.memory_error(), Some(MemoryError::UnalignedAccess { .. }))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_a0_simple() {
        expect_a0(
            "
addi a0, zero, 42
ebreak",
            42,
        );
    }

    #[test]
    fn test_expect_a0_arithmetic() {
        expect_a0(
            "
addi a0, zero, 5
addi a1, zero, 10
add a0, a0, a1
ebreak",
            15,
        );
    }

    #[test]
    fn test_expect_a0_memory() {
        expect_a0(
            "
lui sp, 0x80000000
addi sp, sp, 0x100
addi a0, zero, 42
sw a0, 0(sp)
lw a0, 0(sp)
ebreak",
            42,
        );
    }

    #[test]
    fn test_expect_a0_negative() {
        expect_a0(
            "
li a0, 0xFFFFBDDD
ebreak",
            -0x4223,
        );
    }

    #[test]
    fn test_expect_register() {
        expect_register(
            "
addi a1, zero, 100
ebreak",
            Gpr::A1,
            100,
        );
    }

    #[test]
    fn test_expect_memory_error() {
        expect_memory_error_with_ram(
            "
lui sp, 0x80000000
lw a0, 0x400(sp)
lui sp, 0x80001000
lw a0, 0(sp)
ebreak
            ",
            1024, // rounded up to one page, so only the second load is out of bounds
        );
    }

    #[test]
    fn test_expect_memory_error_on_code_write() {
        // Code is mapped read/execute only.
        expect_memory_error(
            "
sw a0, 0(zero)
ebreak",
        );
    }

    #[test]
    fn test_expect_unaligned_error() {
        expect_unaligned_error(
            "
lui sp, 0x80000000
lw a0, 1(sp)
ebreak",
        );
    }

    #[test]
    fn test_expect_ok() {
        let emu = expect_ok(
            "
addi a0, zero, 42
ebreak
        ",
        );
        assert_eq!(emu.get_register(Gpr::A0), 42);
    }

    #[test]
    fn test_assembly_error() {
        assert!(matches!(
            debug_riscv_asm("bogus a0"),
            Err(EmulatorError::Assembly(_))
        ));
    }
}
