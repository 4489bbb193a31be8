//! Table-driven instruction decoder.
//!
//! The table is built once per profile. Each entry is keyed on the fields
//! that identify it: `(opcode)`, `(opcode, funct3)`, `(opcode, funct3,
//! funct7)` or `(opcode, funct3, funct7, rs2)`. Lookup tries the most
//! specific key first, so `zext.h` wins over `pack rd, rs1, x0`.

use std::{collections::HashMap, fmt};

use riscv_encoder::{opcode, Gpr};

use crate::{
    error::{ConfigError, EmulatorError, Result},
    profile::{Extensions, IsaProfile, Xlen},
};

/// Operand layout of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `rd, rs1, rs2`
    R,
    /// `rd, rs1, imm`
    I,
    /// `rd, rs1, shamt`
    Shift,
    /// `rd, rs1`
    Unary,
    /// `rd, imm(rs1)`
    Load,
    /// `rs2, imm(rs1)`
    Store,
    /// `rs1, rs2, offset`
    Branch,
    /// `rd, imm[31:12]`
    Upper,
    /// `rd, offset`
    Jal,
    /// `rd, imm(rs1)`
    Jalr,
    /// no operands
    System,
}

macro_rules! mnemonics {
    ($($variant:ident => $name:literal : $format:ident,)*) => {
        /// Instruction mnemonic.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
        }

        impl Mnemonic {
            /// Assembly name (`andn`, `sext.h`, ...).
            pub const fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name,)*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $(Mnemonic::$variant => Format::$format,)*
                }
            }
        }
    };
}

mnemonics! {
    Lui => "lui": Upper,
    Auipc => "auipc": Upper,
    Jal => "jal": Jal,
    Jalr => "jalr": Jalr,
    Beq => "beq": Branch,
    Bne => "bne": Branch,
    Blt => "blt": Branch,
    Bge => "bge": Branch,
    Bltu => "bltu": Branch,
    Bgeu => "bgeu": Branch,
    Lb => "lb": Load,
    Lh => "lh": Load,
    Lw => "lw": Load,
    Ld => "ld": Load,
    Lbu => "lbu": Load,
    Lhu => "lhu": Load,
    Lwu => "lwu": Load,
    Sb => "sb": Store,
    Sh => "sh": Store,
    Sw => "sw": Store,
    Sd => "sd": Store,
    Addi => "addi": I,
    Slti => "slti": I,
    Sltiu => "sltiu": I,
    Xori => "xori": I,
    Ori => "ori": I,
    Andi => "andi": I,
    Slli => "slli": Shift,
    Srli => "srli": Shift,
    Srai => "srai": Shift,
    Add => "add": R,
    Sub => "sub": R,
    Sll => "sll": R,
    Slt => "slt": R,
    Sltu => "sltu": R,
    Xor => "xor": R,
    Srl => "srl": R,
    Sra => "sra": R,
    Or => "or": R,
    And => "and": R,
    Fence => "fence": System,
    Ecall => "ecall": System,
    Ebreak => "ebreak": System,
    Addiw => "addiw": I,
    Slliw => "slliw": Shift,
    Srliw => "srliw": Shift,
    Sraiw => "sraiw": Shift,
    Addw => "addw": R,
    Subw => "subw": R,
    Sllw => "sllw": R,
    Srlw => "srlw": R,
    Sraw => "sraw": R,
    Mul => "mul": R,
    Mulh => "mulh": R,
    Mulhsu => "mulhsu": R,
    Mulhu => "mulhu": R,
    Div => "div": R,
    Divu => "divu": R,
    Rem => "rem": R,
    Remu => "remu": R,
    Mulw => "mulw": R,
    Divw => "divw": R,
    Divuw => "divuw": R,
    Remw => "remw": R,
    Remuw => "remuw": R,
    Andn => "andn": R,
    Orn => "orn": R,
    Xnor => "xnor": R,
    Clz => "clz": Unary,
    Ctz => "ctz": Unary,
    Cpop => "cpop": Unary,
    Max => "max": R,
    Maxu => "maxu": R,
    Min => "min": R,
    Minu => "minu": R,
    SextB => "sext.b": Unary,
    SextH => "sext.h": Unary,
    ZextH => "zext.h": Unary,
    Rol => "rol": R,
    Ror => "ror": R,
    Rori => "rori": Shift,
    OrcB => "orc.b": Unary,
    Rev8 => "rev8": Unary,
    Clzw => "clzw": Unary,
    Ctzw => "ctzw": Unary,
    Cpopw => "cpopw": Unary,
    Rolw => "rolw": R,
    Rorw => "rorw": R,
    Roriw => "roriw": Shift,
    Pack => "pack": R,
    Packh => "packh": R,
    Packw => "packw": R,
    Brev8 => "brev8": Unary,
    Zip => "zip": Unary,
    Unzip => "unzip": Unary,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub mnemonic: Mnemonic,
    pub rd: Gpr,
    pub rs1: Gpr,
    pub rs2: Gpr,
    /// Sign-extended immediate, or the shift amount for shift-immediates.
    pub imm: i64,
    /// Encoded length in bytes.
    pub len: u8,
    /// Raw instruction word.
    pub word: u32,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic;
        match m.format() {
            Format::R => write!(f, "{} {}, {}, {}", m, self.rd, self.rs1, self.rs2),
            Format::I | Format::Shift => {
                write!(f, "{} {}, {}, {}", m, self.rd, self.rs1, self.imm)
            }
            Format::Unary => write!(f, "{} {}, {}", m, self.rd, self.rs1),
            Format::Load | Format::Jalr => {
                write!(f, "{} {}, {}({})", m, self.rd, self.imm, self.rs1)
            }
            Format::Store => write!(f, "{} {}, {}({})", m, self.rs2, self.imm, self.rs1),
            Format::Branch => write!(f, "{} {}, {}, {}", m, self.rs1, self.rs2, self.imm),
            Format::Upper => write!(f, "{} {}, 0x{:x}", m, self.rd, (self.imm >> 12) & 0xfffff),
            Format::Jal => write!(f, "{} {}, {}", m, self.rd, self.imm),
            Format::System => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Op(u8),
    Funct3(u8, u8),
    Funct7(u8, u8, u8),
    Rs2(u8, u8, u8, u8),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Op(op) => write!(f, "opcode=0x{op:02x}"),
            Key::Funct3(op, f3) => write!(f, "opcode=0x{op:02x} funct3={f3}"),
            Key::Funct7(op, f3, f7) => {
                write!(f, "opcode=0x{op:02x} funct3={f3} funct7=0x{f7:02x}")
            }
            Key::Rs2(op, f3, f7, rs2) => {
                write!(f, "opcode=0x{op:02x} funct3={f3} funct7=0x{f7:02x} rs2={rs2}")
            }
        }
    }
}

/// Extra field constraints checked after a table hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constraint {
    None,
    /// `rd` and `rs1` must be `x0`.
    ZeroRdRs1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    mnemonic: Mnemonic,
    constraint: Constraint,
}

/// Decoder for one ISA profile.
#[derive(Debug, Clone)]
pub struct Decoder {
    table: HashMap<Key, Entry>,
    register_count: u8,
}

struct Fields {
    opcode: u8,
    rd: u8,
    funct3: u8,
    rs1: u8,
    rs2: u8,
    funct7: u8,
}

impl Fields {
    fn of(word: u32) -> Self {
        Self {
            opcode: (word & 0x7f) as u8,
            rd: ((word >> 7) & 0x1f) as u8,
            funct3: ((word >> 12) & 0x7) as u8,
            rs1: ((word >> 15) & 0x1f) as u8,
            rs2: ((word >> 20) & 0x1f) as u8,
            funct7: (word >> 25) as u8,
        }
    }
}

fn imm_i(word: u32) -> i64 {
    ((word as i32) >> 20) as i64
}

fn imm_s(word: u32) -> i64 {
    ((((word as i32) >> 25) << 5) | ((word >> 7) & 0x1f) as i32) as i64
}

fn imm_b(word: u32) -> i64 {
    let imm = (((word as i32) >> 31) << 12)
        | (((word >> 7) & 0x1) << 11) as i32
        | (((word >> 25) & 0x3f) << 5) as i32
        | (((word >> 8) & 0xf) << 1) as i32;
    imm as i64
}

fn imm_u(word: u32) -> i64 {
    (word & 0xffff_f000) as i32 as i64
}

fn imm_j(word: u32) -> i64 {
    let imm = (((word as i32) >> 31) << 20)
        | (word & 0x000f_f000) as i32
        | (((word >> 20) & 0x1) << 11) as i32
        | (((word >> 21) & 0x3ff) << 1) as i32;
    imm as i64
}

impl Decoder {
    /// Build the decode table for `profile`.
    ///
    /// # Errors
    ///
    /// `ConflictingEncoding` if two different operations claim the same key.
    pub fn new(profile: &IsaProfile) -> std::result::Result<Self, ConfigError> {
        let mut builder = TableBuilder {
            table: HashMap::new(),
        };
        let rv64 = profile.xlen() == Xlen::Rv64;

        builder.base(rv64)?;
        if profile.has(Extensions::M) {
            builder.m(rv64)?;
        }
        if profile.has(Extensions::ZBB) {
            builder.zbb(rv64)?;
        }
        if profile.has(Extensions::ZBKB) {
            builder.zbkb(rv64)?;
        }

        Ok(Self {
            table: builder.table,
            register_count: profile.register_count(),
        })
    }

    fn lookup(&self, f: &Fields) -> Option<Entry> {
        [
            Key::Rs2(f.opcode, f.funct3, f.funct7, f.rs2),
            Key::Funct7(f.opcode, f.funct3, f.funct7),
            Key::Funct3(f.opcode, f.funct3),
            Key::Op(f.opcode),
        ]
        .iter()
        .find_map(|key| self.table.get(key).copied())
    }

    /// Decode the instruction `word` fetched from `pc`.
    pub fn decode(&self, word: u32, pc: u64) -> Result<Operation> {
        let illegal = EmulatorError::IllegalInstruction {
            pc,
            instruction: word,
        };
        // Compressed encodings are not supported.
        if word & 0b11 != 0b11 {
            return Err(illegal);
        }

        let fields = Fields::of(word);
        let entry = self.lookup(&fields).ok_or(illegal.clone())?;
        if entry.constraint == Constraint::ZeroRdRs1 && (fields.rd != 0 || fields.rs1 != 0) {
            return Err(illegal);
        }

        let mnemonic = entry.mnemonic;
        let format = mnemonic.format();
        let imm = match format {
            Format::I | Format::Load | Format::Jalr => imm_i(word),
            Format::Shift => ((word >> 20) & 0x3f) as i64,
            Format::Store => imm_s(word),
            Format::Branch => imm_b(word),
            Format::Upper => imm_u(word),
            Format::Jal => imm_j(word),
            Format::R | Format::Unary | Format::System => 0,
        };

        // Fields not used by the format are reported as x0.
        let (uses_rd, uses_rs1, uses_rs2) = match format {
            Format::R => (true, true, true),
            Format::I | Format::Shift | Format::Unary | Format::Load | Format::Jalr => {
                (true, true, false)
            }
            Format::Store | Format::Branch => (false, true, true),
            Format::Upper | Format::Jal => (true, false, false),
            Format::System => (false, false, false),
        };
        let reg = |used: bool, num: u8| -> Result<Gpr> {
            if !used {
                return Ok(Gpr::ZERO);
            }
            if num >= self.register_count {
                return Err(illegal.clone());
            }
            Ok(Gpr::from_field(num as u32))
        };

        Ok(Operation {
            mnemonic,
            rd: reg(uses_rd, fields.rd)?,
            rs1: reg(uses_rs1, fields.rs1)?,
            rs2: reg(uses_rs2, fields.rs2)?,
            imm,
            len: 4,
            word,
        })
    }
}

struct TableBuilder {
    table: HashMap<Key, Entry>,
}

impl TableBuilder {
    fn insert_with(
        &mut self,
        key: Key,
        mnemonic: Mnemonic,
        constraint: Constraint,
    ) -> std::result::Result<(), ConfigError> {
        let entry = Entry {
            mnemonic,
            constraint,
        };
        match self.table.get(&key) {
            Some(existing) if *existing != entry => Err(ConfigError::ConflictingEncoding {
                key: key.to_string(),
                existing: existing.mnemonic.name(),
                new: mnemonic.name(),
            }),
            Some(_) => Ok(()),
            None => {
                self.table.insert(key, entry);
                Ok(())
            }
        }
    }

    fn insert(&mut self, key: Key, mnemonic: Mnemonic) -> std::result::Result<(), ConfigError> {
        self.insert_with(key, mnemonic, Constraint::None)
    }

    /// Register a shift-immediate. On RV64 `imm[5]` lives in funct7 bit 0.
    fn shift(
        &mut self,
        op: u8,
        funct3: u8,
        funct7: u8,
        mnemonic: Mnemonic,
        rv64: bool,
    ) -> std::result::Result<(), ConfigError> {
        self.insert(Key::Funct7(op, funct3, funct7), mnemonic)?;
        if rv64 {
            self.insert(Key::Funct7(op, funct3, funct7 | 1), mnemonic)?;
        }
        Ok(())
    }

    fn base(&mut self, rv64: bool) -> std::result::Result<(), ConfigError> {
        use Mnemonic::*;
        use opcode::*;

        self.insert(Key::Op(LUI as u8), Lui)?;
        self.insert(Key::Op(AUIPC as u8), Auipc)?;
        self.insert(Key::Op(JAL as u8), Jal)?;
        self.insert(Key::Funct3(JALR as u8, 0), Jalr)?;

        for (f3, m) in [(0, Beq), (1, Bne), (4, Blt), (5, Bge), (6, Bltu), (7, Bgeu)] {
            self.insert(Key::Funct3(BRANCH as u8, f3), m)?;
        }
        for (f3, m) in [(0, Lb), (1, Lh), (2, Lw), (4, Lbu), (5, Lhu)] {
            self.insert(Key::Funct3(LOAD as u8, f3), m)?;
        }
        for (f3, m) in [(0, Sb), (1, Sh), (2, Sw)] {
            self.insert(Key::Funct3(STORE as u8, f3), m)?;
        }
        for (f3, m) in [(0, Addi), (2, Slti), (3, Sltiu), (4, Xori), (6, Ori), (7, Andi)] {
            self.insert(Key::Funct3(OP_IMM as u8, f3), m)?;
        }
        self.shift(OP_IMM as u8, 1, 0x00, Slli, rv64)?;
        self.shift(OP_IMM as u8, 5, 0x00, Srli, rv64)?;
        self.shift(OP_IMM as u8, 5, 0x20, Srai, rv64)?;

        for (f3, f7, m) in [
            (0, 0x00, Add),
            (0, 0x20, Sub),
            (1, 0x00, Sll),
            (2, 0x00, Slt),
            (3, 0x00, Sltu),
            (4, 0x00, Xor),
            (5, 0x00, Srl),
            (5, 0x20, Sra),
            (6, 0x00, Or),
            (7, 0x00, And),
        ] {
            self.insert(Key::Funct7(OP as u8, f3, f7), m)?;
        }

        self.insert(Key::Funct3(MISC_MEM as u8, 0), Fence)?;
        self.insert_with(Key::Rs2(SYSTEM as u8, 0, 0, 0), Ecall, Constraint::ZeroRdRs1)?;
        self.insert_with(Key::Rs2(SYSTEM as u8, 0, 0, 1), Ebreak, Constraint::ZeroRdRs1)?;

        if rv64 {
            self.insert(Key::Funct3(LOAD as u8, 3), Ld)?;
            self.insert(Key::Funct3(LOAD as u8, 6), Lwu)?;
            self.insert(Key::Funct3(STORE as u8, 3), Sd)?;
            self.insert(Key::Funct3(OP_IMM_32 as u8, 0), Addiw)?;
            self.shift(OP_IMM_32 as u8, 1, 0x00, Slliw, false)?;
            self.shift(OP_IMM_32 as u8, 5, 0x00, Srliw, false)?;
            self.shift(OP_IMM_32 as u8, 5, 0x20, Sraiw, false)?;
            for (f3, f7, m) in [
                (0, 0x00, Addw),
                (0, 0x20, Subw),
                (1, 0x00, Sllw),
                (5, 0x00, Srlw),
                (5, 0x20, Sraw),
            ] {
                self.insert(Key::Funct7(OP_32 as u8, f3, f7), m)?;
            }
        }
        Ok(())
    }

    fn m(&mut self, rv64: bool) -> std::result::Result<(), ConfigError> {
        use Mnemonic::*;
        use opcode::*;

        for (f3, m) in [
            (0, Mul),
            (1, Mulh),
            (2, Mulhsu),
            (3, Mulhu),
            (4, Div),
            (5, Divu),
            (6, Rem),
            (7, Remu),
        ] {
            self.insert(Key::Funct7(OP as u8, f3, 0x01), m)?;
        }
        if rv64 {
            for (f3, m) in [(0, Mulw), (4, Divw), (5, Divuw), (6, Remw), (7, Remuw)] {
                self.insert(Key::Funct7(OP_32 as u8, f3, 0x01), m)?;
            }
        }
        Ok(())
    }

    /// Operations shared by Zbb and Zbkb.
    fn logic_and_rotate(&mut self, rv64: bool) -> std::result::Result<(), ConfigError> {
        use Mnemonic::*;
        use opcode::*;

        for (f3, f7, m) in [
            (7, 0x20, Andn),
            (6, 0x20, Orn),
            (4, 0x20, Xnor),
            (1, 0x30, Rol),
            (5, 0x30, Ror),
        ] {
            self.insert(Key::Funct7(OP as u8, f3, f7), m)?;
        }
        self.shift(OP_IMM as u8, 5, 0x30, Rori, rv64)?;
        let rev8_f7 = if rv64 { 0x35 } else { 0x34 };
        self.insert(Key::Rs2(OP_IMM as u8, 5, rev8_f7, 0x18), Rev8)?;

        if rv64 {
            self.insert(Key::Funct7(OP_32 as u8, 1, 0x30), Rolw)?;
            self.insert(Key::Funct7(OP_32 as u8, 5, 0x30), Rorw)?;
            self.insert(Key::Funct7(OP_IMM_32 as u8, 5, 0x30), Roriw)?;
        }
        Ok(())
    }

    fn zbb(&mut self, rv64: bool) -> std::result::Result<(), ConfigError> {
        use Mnemonic::*;
        use opcode::*;

        self.logic_and_rotate(rv64)?;
        for (rs2, m) in [(0, Clz), (1, Ctz), (2, Cpop), (4, SextB), (5, SextH)] {
            self.insert(Key::Rs2(OP_IMM as u8, 1, 0x30, rs2), m)?;
        }
        for (f3, m) in [(6, Max), (7, Maxu), (4, Min), (5, Minu)] {
            self.insert(Key::Funct7(OP as u8, f3, 0x05), m)?;
        }
        self.insert(Key::Rs2(OP_IMM as u8, 5, 0x14, 0x07), OrcB)?;

        if rv64 {
            self.insert(Key::Rs2(OP_32 as u8, 4, 0x04, 0), ZextH)?;
            for (rs2, m) in [(0, Clzw), (1, Ctzw), (2, Cpopw)] {
                self.insert(Key::Rs2(OP_IMM_32 as u8, 1, 0x30, rs2), m)?;
            }
        } else {
            self.insert(Key::Rs2(OP as u8, 4, 0x04, 0), ZextH)?;
        }
        Ok(())
    }

    fn zbkb(&mut self, rv64: bool) -> std::result::Result<(), ConfigError> {
        use Mnemonic::*;
        use opcode::*;

        self.logic_and_rotate(rv64)?;
        self.insert(Key::Funct7(OP as u8, 4, 0x04), Pack)?;
        self.insert(Key::Funct7(OP as u8, 7, 0x04), Packh)?;
        self.insert(Key::Rs2(OP_IMM as u8, 5, 0x34, 0x07), Brev8)?;
        if rv64 {
            self.insert(Key::Funct7(OP_32 as u8, 4, 0x04), Packw)?;
        } else {
            self.insert(Key::Rs2(OP_IMM as u8, 1, 0x04, 0x0f), Zip)?;
            self.insert(Key::Rs2(OP_IMM as u8, 5, 0x04, 0x0f), Unzip)?;
        }
        Ok(())
    }
}
