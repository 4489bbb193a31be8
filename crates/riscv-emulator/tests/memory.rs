//! Memory access tests for the RISC-V emulator.

use riscv_emulator::{
    debug_riscv_bytes, Engine, EmulatorError, EngineConfig, HaltReason, IsaProfile,
    MemoryAccessKind, MemoryError, Permissions, CODE_BASE, RAM_BASE,
};
use riscv_encoder::{addi, ebreak, lui, lw, sw, Gpr};

fn strict_engine(code: &[u8]) -> Engine {
    let config = EngineConfig::default().with_strict_alignment(true);
    let mut emu = Engine::with_config(IsaProfile::rv32(), config).unwrap();
    emu.map(CODE_BASE, 0x1000, Permissions::READ | Permissions::EXEC)
        .unwrap();
    emu.map(RAM_BASE, 0x1000, Permissions::READ | Permissions::WRITE)
        .unwrap();
    emu.write_bytes(CODE_BASE, code).unwrap();
    emu
}

#[test]
fn test_unaligned_access() {
    let mut code = Vec::new();
    // lui sp, 0x80000
    code.extend_from_slice(&lui(Gpr::SP, 0x80000).to_le_bytes());
    // addi sp, sp, 1  (unaligned address)
    code.extend_from_slice(&addi(Gpr::SP, Gpr::SP, 1).to_le_bytes());
    // lw a0, 0(sp)  (should fail - unaligned)
    code.extend_from_slice(&lw(Gpr::A0, Gpr::SP, 0).to_le_bytes());

    let mut emu = strict_engine(&code);
    assert!(emu.step().is_ok()); // lui
    assert!(emu.step().is_ok()); // addi
    let result = emu.step(); // lw - should fail
    match result {
        Err(EmulatorError::MemoryFault {
            pc,
            source:
                MemoryError::UnalignedAccess {
                    address,
                    alignment,
                    kind,
                },
        }) => {
            assert_eq!(pc, 8);
            assert_eq!(address, 0x80000001);
            assert_eq!(alignment, 4);
            assert_eq!(kind, MemoryAccessKind::Read);
        }
        other => panic!("Expected UnalignedAccess error, got {:?}", other),
    }
    // The faulting instruction does not retire.
    assert_eq!(emu.get_pc(), 8);
}

#[test]
fn test_unaligned_access_permitted_by_default() {
    let mut code = Vec::new();
    code.extend_from_slice(&lui(Gpr::SP, 0x80000).to_le_bytes());
    code.extend_from_slice(&addi(Gpr::A0, Gpr::ZERO, 0x123).to_le_bytes());
    code.extend_from_slice(&sw(Gpr::SP, Gpr::A0, 1).to_le_bytes());
    code.extend_from_slice(&lw(Gpr::A0, Gpr::SP, 1).to_le_bytes());
    code.extend_from_slice(&ebreak().to_le_bytes());

    let mut emu = debug_riscv_bytes(&code).unwrap();
    assert_eq!(emu.run_until_ebreak().unwrap(), 0x123);
}

#[test]
fn test_out_of_bounds_read() {
    let mut code = Vec::new();
    // lui sp, 0x81000  (past the end of RAM)
    code.extend_from_slice(&lui(Gpr::SP, 0x81000).to_le_bytes());
    // lw a0, 0(sp)  (should fail - out of bounds)
    code.extend_from_slice(&lw(Gpr::A0, Gpr::SP, 0).to_le_bytes());

    let mut emu = debug_riscv_bytes(&code).unwrap();
    assert!(emu.step().is_ok()); // lui
    match emu.step() {
        Err(EmulatorError::MemoryFault {
            source: MemoryError::UnmappedAccess { address, kind, .. },
            ..
        }) => {
            assert_eq!(address, 0x81000000);
            assert_eq!(kind, MemoryAccessKind::Read);
        }
        other => panic!("Expected UnmappedAccess error, got {:?}", other),
    }
}

#[test]
fn test_out_of_bounds_write() {
    let mut code = Vec::new();
    code.extend_from_slice(&lui(Gpr::SP, 0x81000).to_le_bytes());
    code.extend_from_slice(&addi(Gpr::A0, Gpr::ZERO, 42).to_le_bytes());
    // sw a0, 0(sp)  (should fail - out of bounds)
    code.extend_from_slice(&sw(Gpr::SP, Gpr::A0, 0).to_le_bytes());

    let mut emu = debug_riscv_bytes(&code).unwrap();
    assert!(emu.step().is_ok()); // lui
    assert!(emu.step().is_ok()); // addi
    match emu.step() {
        Err(EmulatorError::MemoryFault {
            source: MemoryError::UnmappedAccess { address, kind, .. },
            ..
        }) => {
            assert_eq!(address, 0x81000000);
            assert_eq!(kind, MemoryAccessKind::Write);
        }
        other => panic!("Expected UnmappedAccess error, got {:?}", other),
    }
}

#[test]
fn test_write_to_code_region() {
    let mut code = Vec::new();
    code.extend_from_slice(&addi(Gpr::A0, Gpr::ZERO, 42).to_le_bytes());
    // sw a0, 0(zero)  (try to write to code region - should fail)
    code.extend_from_slice(&sw(Gpr::ZERO, Gpr::A0, 0).to_le_bytes());

    let mut emu = debug_riscv_bytes(&code).unwrap();
    assert!(emu.step().is_ok()); // addi
    match emu.step() {
        Err(EmulatorError::MemoryFault {
            source: MemoryError::PermissionDenied { address, kind, .. },
            ..
        }) => {
            assert_eq!(address, 0);
            assert_eq!(kind, MemoryAccessKind::Write);
        }
        other => panic!("Expected PermissionDenied error, got {:?}", other),
    }
}

#[test]
fn test_protect_removes_write() {
    let mut code = Vec::new();
    code.extend_from_slice(&lui(Gpr::SP, 0x80000).to_le_bytes());
    code.extend_from_slice(&sw(Gpr::SP, Gpr::A0, 0).to_le_bytes());
    code.extend_from_slice(&ebreak().to_le_bytes());

    let mut emu = debug_riscv_bytes(&code).unwrap();
    assert!(emu.run_until_ebreak().is_ok());

    let ram = emu
        .regions()
        .find(|r| r.base == RAM_BASE)
        .expect("ram region");
    emu.protect(ram.base, ram.length, Permissions::READ).unwrap();
    emu.reset();
    let err = emu.run_until_ebreak().unwrap_err();
    assert!(matches!(
        err.memory_error(),
        Some(MemoryError::PermissionDenied {
            kind: MemoryAccessKind::Write,
            ..
        })
    ));
}

#[test]
fn test_fetch_requires_exec() {
    let mut emu = Engine::new(IsaProfile::rv32()).unwrap();
    emu.map(0x1000, 0x1000, Permissions::READ | Permissions::WRITE)
        .unwrap();
    emu.write_bytes(0x1000, &ebreak().to_le_bytes()).unwrap();

    let result = emu.run(0x1000, 0, 10, Default::default());
    assert_eq!(result.reason, HaltReason::Fault);
    assert!(matches!(
        result.error.as_ref().and_then(|e| e.memory_error()),
        Some(MemoryError::PermissionDenied {
            kind: MemoryAccessKind::InstructionFetch,
            ..
        })
    ));
    assert_eq!(result.instructions, 0);
}

#[test]
fn test_unmap_then_remap() {
    let mut emu = Engine::new(IsaProfile::rv32()).unwrap();
    emu.map(0x4000, 0x1000, Permissions::READ | Permissions::WRITE)
        .unwrap();
    emu.write_bytes(0x4000, &[1, 2, 3, 4]).unwrap();

    emu.unmap(0x4000, 0x1000).unwrap();
    assert!(matches!(
        emu.read_bytes(0x4000, 4),
        Err(EmulatorError::Memory(MemoryError::UnmappedAccess { .. }))
    ));

    emu.map(0x4000, 0x1000, Permissions::READ | Permissions::WRITE)
        .unwrap();
    // A fresh region is zero-filled.
    assert_eq!(emu.read_bytes(0x4000, 4).unwrap(), vec![0; 4]);
    emu.write_bytes(0x4ffc, &[9; 4]).unwrap();
    assert!(emu.write_bytes(0x4ffd, &[9; 4]).is_err());
}

#[test]
fn test_map_errors() {
    let mut emu = Engine::new(IsaProfile::rv32()).unwrap();
    emu.map(0x4000, 0x2000, Permissions::ALL).unwrap();
    assert_eq!(
        emu.map(0x5000, 0x1000, Permissions::READ),
        Err(EmulatorError::Memory(MemoryError::Overlap {
            base: 0x5000,
            length: 0x1000
        }))
    );
    assert!(matches!(
        emu.map(0x8001, 0x1000, Permissions::READ),
        Err(EmulatorError::Memory(MemoryError::Alignment { .. }))
    ));
    assert!(matches!(
        emu.unmap(0x4000, 0x1000),
        Err(EmulatorError::Memory(MemoryError::NotMapped { .. }))
    ));
}
