//! Instruction execution logic.

use riscv_encoder::Gpr;

use crate::{
    decoder::{Mnemonic, Operation},
    error::{EmulatorError, MemoryAccessKind, MemoryError, Result},
    hooks::{HookAction, HookKind, HookRegistry, MemoryAccess},
    logging::RegWrite,
    memory::Memory,
    profile::Xlen,
    registers::RegisterFile,
};

/// Result of executing one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// Continue at the given PC.
    Next(u64),
    /// EBREAK.
    Halt,
    /// ECALL.
    Syscall,
    Fault(EmulatorError),
}

/// Side effects of one step, collected for the instruction log.
#[derive(Debug, Default)]
pub(crate) struct StepRecord {
    pub reg_write: Option<RegWrite>,
    pub mem_accesses: Vec<MemoryAccess>,
    /// A memory hook asked to stop.
    pub stop_requested: bool,
}

/// Mutable machine state an operation executes against.
pub(crate) struct ExecContext<'a> {
    pub regs: &'a mut RegisterFile,
    pub memory: &'a mut Memory,
    pub hooks: &'a mut HookRegistry,
    pub strict_alignment: bool,
    pub record: &'a mut StepRecord,
}

impl ExecContext<'_> {
    fn notify(&mut self, kind: HookKind, access: &MemoryAccess) {
        if self.hooks.memory(kind, &*self.regs, access) == HookAction::Stop {
            self.record.stop_requested = true;
        }
    }

    fn fault(pc: u64) -> impl FnOnce(MemoryError) -> EmulatorError {
        move |source| EmulatorError::MemoryFault { pc, source }
    }

    /// Fetch the instruction at `pc`, running fetch memory hooks.
    pub fn fetch(&mut self, pc: u64) -> Result<u32> {
        if pc & 0b11 != 0 {
            return Err(EmulatorError::MisalignedFetch { pc, target: pc });
        }
        let mut access = MemoryAccess {
            kind: MemoryAccessKind::InstructionFetch,
            address: pc,
            size: 4,
            value: 0,
        };
        self.notify(HookKind::BeforeMemoryAccess, &access);
        let word = self.memory.fetch(pc).map_err(Self::fault(pc))?;
        access.value = word as u64;
        self.notify(HookKind::AfterMemoryAccess, &access);
        Ok(word)
    }

    fn check_alignment(
        &self,
        pc: u64,
        address: u64,
        size: usize,
        kind: MemoryAccessKind,
    ) -> Result<()> {
        if self.strict_alignment && address % size as u64 != 0 {
            return Err(EmulatorError::MemoryFault {
                pc,
                source: MemoryError::UnalignedAccess {
                    address,
                    alignment: size,
                    kind,
                },
            });
        }
        Ok(())
    }

    fn load(&mut self, pc: u64, address: u64, size: usize) -> Result<u64> {
        self.check_alignment(pc, address, size, MemoryAccessKind::Read)?;
        let mut access = MemoryAccess {
            kind: MemoryAccessKind::Read,
            address,
            size,
            value: 0,
        };
        self.notify(HookKind::BeforeMemoryAccess, &access);
        access.value = self.memory.load(address, size).map_err(Self::fault(pc))?;
        self.notify(HookKind::AfterMemoryAccess, &access);
        self.record.mem_accesses.push(access);
        Ok(access.value)
    }

    fn store(&mut self, pc: u64, address: u64, size: usize, value: u64) -> Result<()> {
        self.check_alignment(pc, address, size, MemoryAccessKind::Write)?;
        let access = MemoryAccess {
            kind: MemoryAccessKind::Write,
            address,
            size,
            value: if size == 8 {
                value
            } else {
                value & ((1u64 << (size * 8)) - 1)
            },
        };
        self.notify(HookKind::BeforeMemoryAccess, &access);
        self.memory
            .store(address, size, value)
            .map_err(Self::fault(pc))?;
        self.notify(HookKind::AfterMemoryAccess, &access);
        self.record.mem_accesses.push(access);
        Ok(())
    }

    fn write_rd(&mut self, rd: Gpr, value: u64) {
        if rd == Gpr::ZERO {
            return;
        }
        let old = self.regs.x(rd);
        self.regs.set_x(rd, value);
        self.record.reg_write = Some(RegWrite {
            rd,
            old,
            new: self.regs.x(rd),
        });
    }

    /// Link and jump; the target must be 4-byte aligned.
    fn jump(&mut self, pc: u64, rd: Gpr, target: u64, link: u64) -> Result<StepOutcome> {
        if target & 0b11 != 0 {
            return Err(EmulatorError::MisalignedFetch { pc, target });
        }
        self.write_rd(rd, link);
        Ok(StepOutcome::Next(target))
    }
}

fn sext32(value: u64) -> u64 {
    value as u32 as i32 as i64 as u64
}

fn rotate_left(xlen: Xlen, value: u64, amount: u64) -> u64 {
    match xlen {
        Xlen::Rv32 => (value as u32).rotate_left((amount & 31) as u32) as u64,
        Xlen::Rv64 => value.rotate_left((amount & 63) as u32),
    }
}

fn rotate_right(xlen: Xlen, value: u64, amount: u64) -> u64 {
    match xlen {
        Xlen::Rv32 => (value as u32).rotate_right((amount & 31) as u32) as u64,
        Xlen::Rv64 => value.rotate_right((amount & 63) as u32),
    }
}

/// Execute `op` fetched from `pc`.
pub(crate) fn execute(op: &Operation, pc: u64, ctx: &mut ExecContext<'_>) -> StepOutcome {
    match execute_op(op, pc, ctx) {
        Ok(outcome) => outcome,
        Err(e) => StepOutcome::Fault(e),
    }
}

fn execute_op(op: &Operation, pc: u64, ctx: &mut ExecContext<'_>) -> Result<StepOutcome> {
    use Mnemonic::*;

    let xlen = ctx.regs.xlen();
    let bits = xlen.bits();
    let mask = xlen.mask();
    let shmask = (bits - 1) as u64;

    let a = ctx.regs.x(op.rs1);
    let b = ctx.regs.x(op.rs2);
    let sa = xlen.signed(a);
    let sb = xlen.signed(b);
    let imm = op.imm as u64;
    let shamt = (op.imm as u64 & shmask) as u32;
    let next = pc.wrapping_add(op.len as u64) & mask;
    let addr = a.wrapping_add(imm) & mask;

    let value = match op.mnemonic {
        Lui => imm,
        Auipc => pc.wrapping_add(imm),
        Jal => return ctx.jump(pc, op.rd, pc.wrapping_add(imm) & mask, next),
        Jalr => return ctx.jump(pc, op.rd, addr & !1, next),

        Beq | Bne | Blt | Bge | Bltu | Bgeu => {
            let taken = match op.mnemonic {
                Beq => a == b,
                Bne => a != b,
                Blt => sa < sb,
                Bge => sa >= sb,
                Bltu => a < b,
                _ => a >= b,
            };
            if !taken {
                return Ok(StepOutcome::Next(next));
            }
            let target = pc.wrapping_add(imm) & mask;
            if target & 0b11 != 0 {
                return Err(EmulatorError::MisalignedFetch { pc, target });
            }
            return Ok(StepOutcome::Next(target));
        }

        Lb => ctx.load(pc, addr, 1)? as u8 as i8 as i64 as u64,
        Lh => ctx.load(pc, addr, 2)? as u16 as i16 as i64 as u64,
        Lw => sext32(ctx.load(pc, addr, 4)?),
        Ld => ctx.load(pc, addr, 8)?,
        Lbu => ctx.load(pc, addr, 1)?,
        Lhu => ctx.load(pc, addr, 2)?,
        Lwu => ctx.load(pc, addr, 4)?,

        Sb | Sh | Sw | Sd => {
            let size = match op.mnemonic {
                Sb => 1,
                Sh => 2,
                Sw => 4,
                _ => 8,
            };
            ctx.store(pc, addr, size, b)?;
            return Ok(StepOutcome::Next(next));
        }

        Fence => return Ok(StepOutcome::Next(next)),
        Ecall => return Ok(StepOutcome::Syscall),
        Ebreak => return Ok(StepOutcome::Halt),

        Addi => a.wrapping_add(imm),
        Slti => (sa < op.imm) as u64,
        Sltiu => (a < (imm & mask)) as u64,
        Xori => a ^ imm,
        Ori => a | imm,
        Andi => a & imm,
        Slli => a << shamt,
        Srli => a >> shamt,
        Srai => (sa >> shamt) as u64,

        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Sll => a << (b & shmask),
        Slt => (sa < sb) as u64,
        Sltu => (a < b) as u64,
        Xor => a ^ b,
        Srl => a >> (b & shmask),
        Sra => (sa >> (b & shmask)) as u64,
        Or => a | b,
        And => a & b,

        Addiw => sext32(a.wrapping_add(imm)),
        Slliw => sext32(((a as u32) << (shamt & 31)) as u64),
        Srliw => sext32(((a as u32) >> (shamt & 31)) as u64),
        Sraiw => ((a as i32) >> (shamt & 31)) as i64 as u64,
        Addw => sext32(a.wrapping_add(b)),
        Subw => sext32(a.wrapping_sub(b)),
        Sllw => sext32(((a as u32) << (b & 31)) as u64),
        Srlw => sext32(((a as u32) >> (b & 31)) as u64),
        Sraw => ((a as i32) >> (b & 31)) as i64 as u64,

        Mul => a.wrapping_mul(b),
        Mulh => ((sa as i128 * sb as i128) >> bits) as u64,
        Mulhsu => ((sa as i128 * b as i128) >> bits) as u64,
        Mulhu => ((a as u128 * b as u128) >> bits) as u64,
        // Division by zero and signed overflow never trap.
        Div => {
            if sb == 0 {
                u64::MAX
            } else {
                sa.wrapping_div(sb) as u64
            }
        }
        Divu => a.checked_div(b).unwrap_or(u64::MAX),
        Rem => {
            if sb == 0 {
                a
            } else {
                sa.wrapping_rem(sb) as u64
            }
        }
        Remu => a.checked_rem(b).unwrap_or(a),
        Mulw => sext32((a as u32).wrapping_mul(b as u32) as u64),
        Divw => match b as i32 {
            0 => u64::MAX,
            y => (a as i32).wrapping_div(y) as i64 as u64,
        },
        Divuw => match b as u32 {
            0 => u64::MAX,
            y => sext32(((a as u32) / y) as u64),
        },
        Remw => match b as i32 {
            0 => sext32(a),
            y => (a as i32).wrapping_rem(y) as i64 as u64,
        },
        Remuw => match b as u32 {
            0 => sext32(a),
            y => sext32(((a as u32) % y) as u64),
        },

        Andn => a & !b,
        Orn => a | !b,
        Xnor => !(a ^ b),
        Clz => match xlen {
            Xlen::Rv32 => (a as u32).leading_zeros() as u64,
            Xlen::Rv64 => a.leading_zeros() as u64,
        },
        Ctz => match xlen {
            Xlen::Rv32 => (a as u32).trailing_zeros() as u64,
            Xlen::Rv64 => a.trailing_zeros() as u64,
        },
        Cpop => a.count_ones() as u64,
        Max => sa.max(sb) as u64,
        Maxu => a.max(b),
        Min => sa.min(sb) as u64,
        Minu => a.min(b),
        SextB => a as u8 as i8 as i64 as u64,
        SextH => a as u16 as i16 as i64 as u64,
        ZextH => a & 0xffff,
        Rol => rotate_left(xlen, a, b),
        Ror => rotate_right(xlen, a, b),
        Rori => rotate_right(xlen, a, shamt as u64),
        OrcB => (0..bits / 8)
            .map(|i| i * 8)
            .filter(|shift| (a >> shift) & 0xff != 0)
            .fold(0u64, |acc, shift| acc | (0xffu64 << shift)),
        Rev8 => match xlen {
            Xlen::Rv32 => (a as u32).swap_bytes() as u64,
            Xlen::Rv64 => a.swap_bytes(),
        },
        Clzw => (a as u32).leading_zeros() as u64,
        Ctzw => (a as u32).trailing_zeros() as u64,
        Cpopw => (a as u32).count_ones() as u64,
        Rolw => sext32((a as u32).rotate_left((b & 31) as u32) as u64),
        Rorw => sext32((a as u32).rotate_right((b & 31) as u32) as u64),
        Roriw => sext32((a as u32).rotate_right(shamt & 31) as u64),

        Pack => {
            let half = bits / 2;
            let low = (1u64 << half) - 1;
            (a & low) | ((b & low) << half)
        }
        Packh => (a & 0xff) | ((b & 0xff) << 8),
        Packw => sext32((a & 0xffff) | ((b & 0xffff) << 16)),
        Brev8 => (0..bits / 8).map(|i| i * 8).fold(0u64, |acc, shift| {
            acc | ((((a >> shift) as u8).reverse_bits() as u64) << shift)
        }),
        // RV32 only: bit i of each half lands in bit 2i (low) and 2i+1 (high).
        Zip => (0..16u32).fold(0u64, |acc, i| {
            let low = (a >> i) & 1;
            let high = (a >> (i + 16)) & 1;
            acc | (low << (2 * i)) | (high << (2 * i + 1))
        }),
        Unzip => (0..16u32).fold(0u64, |acc, i| {
            let even = (a >> (2 * i)) & 1;
            let odd = (a >> (2 * i + 1)) & 1;
            acc | (even << i) | (odd << (i + 16))
        }),
    };

    ctx.write_rd(op.rd, value);
    Ok(StepOutcome::Next(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoder::Decoder, memory::Permissions, profile::IsaProfile};
    use riscv_encoder::*;

    struct Machine {
        regs: RegisterFile,
        memory: Memory,
        hooks: HookRegistry,
        decoder: Decoder,
    }

    impl Machine {
        fn new(profile: IsaProfile) -> Self {
            let mut memory = Memory::new(0x1000, profile.endianness());
            memory.map(0x1000, 0x1000, Permissions::ALL).unwrap();
            Self {
                regs: RegisterFile::new(&profile),
                memory,
                hooks: HookRegistry::default(),
                decoder: Decoder::new(&profile).unwrap(),
            }
        }

        fn set(&mut self, reg: Gpr, value: u64) -> &mut Self {
            self.regs.set_x(reg, value);
            self
        }

        fn exec(&mut self, word: u32) -> StepOutcome {
            let op = self.decoder.decode(word, 0x1000).unwrap();
            let mut record = StepRecord::default();
            let mut ctx = ExecContext {
                regs: &mut self.regs,
                memory: &mut self.memory,
                hooks: &mut self.hooks,
                strict_alignment: false,
                record: &mut record,
            };
            execute(&op, 0x1000, &mut ctx)
        }

        fn get(&self, reg: Gpr) -> u64 {
            self.regs.x(reg)
        }
    }

    fn rv32() -> Machine {
        Machine::new(IsaProfile::rv32())
    }

    fn rv64() -> Machine {
        Machine::new(IsaProfile::rv64())
    }

    #[test]
    fn test_sample_operations() {
        let mut m = rv32();
        m.set(Gpr::A0, 0xFFFF_BDDD).set(Gpr::A1, 0);
        assert_eq!(m.exec(0x40a5_f533), StepOutcome::Next(0x1004));
        assert_eq!(m.get(Gpr::A0), 0);

        let mut m = rv32();
        m.set(Gpr::A0, 0xFFFF_BDDD).set(Gpr::A1, 0);
        m.exec(0x08b5_4633);
        assert_eq!(m.get(Gpr::A2), 0x0000_BDDD);

        let mut m = rv32();
        m.set(Gpr::A0, 0x0000_8000);
        m.exec(0x6055_1513);
        assert_eq!(m.get(Gpr::A0), 0xFFFF_8000);

        let mut m = rv32();
        m.set(Gpr::A0, 0x7080_7080);
        m.exec(0x6025_1513);
        assert_eq!(m.get(Gpr::A0), 8);
    }

    #[test]
    fn test_rv64_bitmanip() {
        let mut m = rv64();
        m.set(Gpr::A0, 0x8000);
        m.exec(sext_h(Gpr::A0, Gpr::A0));
        assert_eq!(m.get(Gpr::A0), 0xFFFF_FFFF_FFFF_8000);

        m.set(Gpr::A0, 0x1111_2222_3333_4444)
            .set(Gpr::A1, 0x5555_6666_7777_8888);
        m.exec(pack(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0x7777_8888_3333_4444);

        m.set(Gpr::A0, u64::MAX);
        m.exec(cpop(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 64);
        m.exec(cpopw(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 32);

        m.set(Gpr::A0, 0x8000).set(Gpr::A1, 0x0001);
        m.exec(packw(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0x0001_8000);
        m.set(Gpr::A1, 0x8000);
        m.exec(packw(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0xFFFF_FFFF_8000_8000);
    }

    #[test]
    fn test_zbkb_permutations() {
        let mut m = rv32();
        m.set(Gpr::A0, 0x0102_0380);
        m.exec(brev8(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x8040_C001);

        m.set(Gpr::A0, 0x0000_FFFF);
        m.exec(zip(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x5555_5555);
        m.set(Gpr::A0, 0xFFFF_0000);
        m.exec(zip(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0xAAAA_AAAA);

        m.set(Gpr::A0, 0x5555_5555);
        m.exec(unzip(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x0000_FFFF);

        m.set(Gpr::A0, 0x1234_5678);
        m.exec(zip(Gpr::A1, Gpr::A0));
        m.exec(unzip(Gpr::A2, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0x1234_5678);

        let mut m = rv64();
        m.set(Gpr::A0, 0x0102_0304_0506_0780);
        m.exec(brev8(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x8040_C020_A060_E001);
    }

    #[test]
    fn test_zbb_misc() {
        let mut m = rv32();
        m.set(Gpr::A0, 0x0010_0000);
        m.exec(clz(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 11);
        m.exec(ctz(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 20);
        m.set(Gpr::A0, 0);
        m.exec(clz(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 32);

        m.set(Gpr::A0, 0x0012_0300);
        m.exec(orc_b(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x00ff_ff00);
        m.exec(rev8(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x0003_1200);

        m.set(Gpr::A0, 0x8000_0001).set(Gpr::A2, 4);
        m.exec(rol(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0x0000_0018);
        m.exec(rori(Gpr::A1, Gpr::A0, 1));
        assert_eq!(m.get(Gpr::A1), 0xC000_0000);

        m.set(Gpr::A0, (-5i32) as u32 as u64).set(Gpr::A2, 3);
        m.exec(max(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 3);
        m.exec(maxu(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FFFB);
        m.exec(min(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FFFB);

        m.set(Gpr::A0, 0x1234_5680);
        m.exec(sext_b(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FF80);
        m.exec(zext_h(Gpr::A1, Gpr::A0));
        assert_eq!(m.get(Gpr::A1), 0x5680);

        m.set(Gpr::A0, 0xF0).set(Gpr::A2, 0x3C);
        m.exec(orn(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FFF3);
        m.exec(xnor(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FF33);
        m.exec(packh(Gpr::A1, Gpr::A0, Gpr::A2));
        assert_eq!(m.get(Gpr::A1), 0x3CF0);
    }

    #[test]
    fn test_division_edge_cases() {
        let mut m = rv32();
        m.set(Gpr::A0, 7).set(Gpr::A1, 0);
        m.exec(div(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0xFFFF_FFFF);
        m.exec(divu(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0xFFFF_FFFF);
        m.exec(rem(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 7);
        m.exec(remu(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 7);

        m.set(Gpr::A0, 0x8000_0000).set(Gpr::A1, 0xFFFF_FFFF);
        m.exec(div(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0x8000_0000);
        m.exec(rem(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0);

        let mut m = rv64();
        m.set(Gpr::A0, i64::MIN as u64).set(Gpr::A1, u64::MAX);
        m.exec(div(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), i64::MIN as u64);
        m.set(Gpr::A1, 0);
        m.exec(divw(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), u64::MAX);
    }

    #[test]
    fn test_multiply_high() {
        let mut m = rv32();
        m.set(Gpr::A0, 0xFFFF_FFFF).set(Gpr::A1, 0xFFFF_FFFF);
        m.exec(mulh(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0);
        m.exec(mulhu(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0xFFFF_FFFE);
        m.exec(mulhsu(Gpr::A2, Gpr::A0, Gpr::A1));
        assert_eq!(m.get(Gpr::A2), 0xFFFF_FFFF);
    }

    #[test]
    fn test_word_ops_sign_extend() {
        let mut m = rv64();
        m.set(Gpr::A0, 0x7FFF_FFFF);
        m.exec(addiw(Gpr::A1, Gpr::A0, 1));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FFFF_8000_0000);
        m.exec(slliw(Gpr::A1, Gpr::A0, 1));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FFFF_FFFF_FFFE);
        m.set(Gpr::A0, 0xFFFF_FFFF_0000_0001);
        m.exec(srliw(Gpr::A1, Gpr::A0, 0));
        assert_eq!(m.get(Gpr::A1), 1);
    }

    #[test]
    fn test_wraparound_and_xlen() {
        let mut m = rv32();
        m.set(Gpr::A0, 0xFFFF_FFFF);
        m.exec(addi(Gpr::A0, Gpr::A0, 1));
        assert_eq!(m.get(Gpr::A0), 0);

        m.set(Gpr::A0, 0x8000_0000);
        m.exec(srai(Gpr::A1, Gpr::A0, 4));
        assert_eq!(m.get(Gpr::A1), 0xF800_0000);
        m.exec(srli(Gpr::A1, Gpr::A0, 4));
        assert_eq!(m.get(Gpr::A1), 0x0800_0000);
        m.exec(slti(Gpr::A1, Gpr::A0, 0));
        assert_eq!(m.get(Gpr::A1), 1);
        m.exec(sltiu(Gpr::A1, Gpr::A0, -1));
        assert_eq!(m.get(Gpr::A1), 1);
    }

    #[test]
    fn test_loads_and_stores() {
        let mut m = rv32();
        m.set(Gpr::SP, 0x1100).set(Gpr::A0, 0x8081_8283);
        m.exec(sw(Gpr::SP, Gpr::A0, 4));
        m.exec(lb(Gpr::A1, Gpr::SP, 4));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_FF83);
        m.exec(lbu(Gpr::A1, Gpr::SP, 4));
        assert_eq!(m.get(Gpr::A1), 0x83);
        m.exec(lh(Gpr::A1, Gpr::SP, 6));
        assert_eq!(m.get(Gpr::A1), 0xFFFF_8081);
        m.exec(lhu(Gpr::A1, Gpr::SP, 6));
        assert_eq!(m.get(Gpr::A1), 0x8081);

        // Misaligned access is allowed unless strict alignment is on.
        m.exec(lw(Gpr::A1, Gpr::SP, 5));
        assert_eq!(m.get(Gpr::A1), 0x0080_8182);

        match m.exec(lw(Gpr::A1, Gpr::ZERO, 0)) {
            StepOutcome::Fault(EmulatorError::MemoryFault {
                pc: 0x1000,
                source: MemoryError::UnmappedAccess { address: 0, .. },
            }) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_jumps_and_branches() {
        let mut m = rv32();
        assert_eq!(m.exec(jal(Gpr::RA, 16)), StepOutcome::Next(0x1010));
        assert_eq!(m.get(Gpr::RA), 0x1004);

        m.set(Gpr::A0, 0x2001);
        assert_eq!(m.exec(jalr(Gpr::RA, Gpr::A0, 3)), StepOutcome::Next(0x2004));

        m.set(Gpr::A0, 1).set(Gpr::A1, 2);
        assert_eq!(m.exec(blt(Gpr::A0, Gpr::A1, -8)), StepOutcome::Next(0x0ff8));
        assert_eq!(m.exec(bge(Gpr::A0, Gpr::A1, -8)), StepOutcome::Next(0x1004));

        m.set(Gpr::RA, 0);
        assert_eq!(
            m.exec(jal(Gpr::RA, 2)),
            StepOutcome::Fault(EmulatorError::MisalignedFetch {
                pc: 0x1000,
                target: 0x1002
            })
        );
        // rd is not written when the jump faults
        assert_eq!(m.get(Gpr::RA), 0);
    }

    #[test]
    fn test_system() {
        let mut m = rv32();
        assert_eq!(m.exec(ecall()), StepOutcome::Syscall);
        assert_eq!(m.exec(ebreak()), StepOutcome::Halt);
        assert_eq!(m.exec(fence()), StepOutcome::Next(0x1004));
    }

    #[test]
    fn test_x0_stays_zero() {
        let mut m = rv32();
        m.exec(addi(Gpr::ZERO, Gpr::ZERO, 5));
        assert_eq!(m.get(Gpr::ZERO), 0);
    }
}
