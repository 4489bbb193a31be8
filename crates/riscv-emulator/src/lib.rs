//! RISC-V emulator core.
//!
//! This crate executes RV32I/RV64I/RV32E programs with the M, Zbb and Zbkb
//! extensions. An [`Engine`] owns a register file, a set of permissioned
//! memory regions and a table-driven decoder, and exposes step/run control
//! with host hooks for instrumentation and syscalls.

mod decoder;
mod emulator;
mod error;
mod executor;
mod helpers;
mod hooks;
mod logging;
mod memory;
mod profile;
mod registers;

pub use decoder::{Decoder, Format, Mnemonic, Operation};
pub use emulator::{Engine, EngineState, HaltReason, RunResult, StepResult, StopHandle};
pub use error::{ConfigError, EmulatorError, MemoryAccessKind, MemoryError, Result};
pub use helpers::{
    debug_riscv_asm, debug_riscv_asm_with_profile, debug_riscv_asm_with_ram, debug_riscv_bytes,
    expect_a0, expect_error, expect_error_with_ram, expect_memory_error,
    expect_memory_error_with_ram, expect_ok, expect_register, expect_unaligned_error,
    format_error, CODE_BASE, DEFAULT_RAM_SIZE, RAM_BASE,
};
pub use hooks::{Hook, HookAction, HookId, HookKind, MemoryAccess, SyscallInfo};
pub use logging::{InstLog, LogLevel, RegWrite};
pub use memory::{Memory, Permissions, RegionInfo};
pub use profile::{EngineConfig, Endianness, Extensions, IsaProfile, Xlen};
pub use registers::{Register, RegisterFile, RegisterSnapshot};
pub use riscv_encoder::Gpr;
