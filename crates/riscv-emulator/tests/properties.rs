//! Property tests for memory bounds, register width and bit-manipulation results.

use std::time::Duration;

use proptest::prelude::*;
use riscv_emulator::{
    EmulatorError, Engine, IsaProfile, MemoryError, Permissions, RegisterFile,
};
use riscv_encoder::{andn, cpop, pack, sext_h, Gpr};

const PAGE: u64 = 4096;

fn run_one(profile: IsaProfile, word: u32, setup: &[(Gpr, u64)]) -> Engine {
    let mut emu = Engine::new(profile).unwrap();
    emu.map(0x10000, PAGE, Permissions::ALL).unwrap();
    emu.write_bytes(0x10000, &word.to_le_bytes()).unwrap();
    for &(reg, value) in setup {
        emu.write_register(reg, value).unwrap();
    }
    emu.run(0x10000, 0x10004, 0, Duration::ZERO);
    emu
}

proptest! {
    #[test]
    fn mapped_region_bounds(pages in 1u64..8, base_page in 1u64..1024, offset in 0u64..(8 * PAGE)) {
        let base = base_page * PAGE;
        let length = pages * PAGE;
        let mut emu = Engine::new(IsaProfile::rv64()).unwrap();
        emu.map(base, length, Permissions::READ | Permissions::WRITE).unwrap();

        let address = base + offset;
        let result = emu.write_bytes(address, &[0xa5]);
        if offset < length {
            prop_assert!(result.is_ok());
            prop_assert_eq!(emu.read_bytes(address, 1).unwrap(), vec![0xa5]);
        } else {
            let is_unmapped = matches!(
                result,
                Err(EmulatorError::Memory(MemoryError::UnmappedAccess { .. }))
            );
            prop_assert!(is_unmapped);
        }

        let past_end = emu.read_bytes(base + length, 1);
        let is_unmapped = matches!(
            past_end,
            Err(EmulatorError::Memory(MemoryError::UnmappedAccess { .. }))
        );
        prop_assert!(is_unmapped);
    }

    #[test]
    fn register_width_truncation(value in any::<u64>(), index in 1u8..32) {
        let reg = Gpr::new(index);
        let mut rv32 = RegisterFile::new(&IsaProfile::rv32());
        rv32.write(reg.into(), value).unwrap();
        prop_assert_eq!(rv32.read(reg.into()).unwrap(), value & 0xffff_ffff);

        let mut rv64 = RegisterFile::new(&IsaProfile::rv64());
        rv64.write(reg.into(), value).unwrap();
        prop_assert_eq!(rv64.read(reg.into()).unwrap(), value);
    }

    #[test]
    fn zero_register_ignores_writes(value in any::<u64>()) {
        let mut regs = RegisterFile::new(&IsaProfile::rv64());
        regs.write(Gpr::ZERO.into(), value).unwrap();
        prop_assert_eq!(regs.x(Gpr::ZERO), 0);
    }

    #[test]
    fn bitmanip_matches_reference(a in any::<u32>(), b in any::<u32>()) {
        let (a, b) = (a as u64, b as u64);
        let setup = [(Gpr::A0, a), (Gpr::A1, b)];

        let emu = run_one(IsaProfile::rv32(), andn(Gpr::A2, Gpr::A0, Gpr::A1), &setup);
        prop_assert_eq!(emu.get_register(Gpr::A2), a & !b & 0xffff_ffff);

        let emu = run_one(IsaProfile::rv32(), pack(Gpr::A2, Gpr::A0, Gpr::A1), &setup);
        prop_assert_eq!(emu.get_register(Gpr::A2), (a & 0xffff) | ((b & 0xffff) << 16));

        let emu = run_one(IsaProfile::rv32(), cpop(Gpr::A2, Gpr::A0), &setup);
        prop_assert_eq!(emu.get_register(Gpr::A2), a.count_ones() as u64);

        let emu = run_one(IsaProfile::rv32(), sext_h(Gpr::A2, Gpr::A0), &setup);
        prop_assert_eq!(emu.get_register(Gpr::A2), (a as u16 as i16 as i32 as u32) as u64);
    }
}
