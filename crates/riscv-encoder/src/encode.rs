//! Instruction encoding functions.
//!
//! Operand order follows the assembly syntax: destination first, then
//! sources, then the immediate. Stores take `(rs1, rs2, imm)` where `rs1` is
//! the base address register and `rs2` the value being stored.

use crate::regs::Gpr;

/// Major opcodes (bits 6:0).
pub mod opcode {
    pub const LOAD: u32 = 0x03;
    pub const MISC_MEM: u32 = 0x0f;
    pub const OP_IMM: u32 = 0x13;
    pub const AUIPC: u32 = 0x17;
    pub const OP_IMM_32: u32 = 0x1b;
    pub const STORE: u32 = 0x23;
    pub const OP: u32 = 0x33;
    pub const LUI: u32 = 0x37;
    pub const OP_32: u32 = 0x3b;
    pub const BRANCH: u32 = 0x63;
    pub const JALR: u32 = 0x67;
    pub const JAL: u32 = 0x6f;
    pub const SYSTEM: u32 = 0x73;
}

use opcode::*;

fn reg(r: Gpr) -> u32 {
    r.num() as u32
}

/// R-type: `funct7 | rs2 | rs1 | funct3 | rd | opcode`.
pub fn r_type(op: u32, rd: Gpr, funct3: u32, rs1: Gpr, rs2: Gpr, funct7: u32) -> u32 {
    ((funct7 & 0x7f) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 & 0x7) << 12)
        | (reg(rd) << 7)
        | (op & 0x7f)
}

/// I-type with a sign-extended 12-bit immediate.
pub fn i_type(op: u32, rd: Gpr, funct3: u32, rs1: Gpr, imm: i32) -> u32 {
    (((imm as u32) & 0xfff) << 20)
        | (reg(rs1) << 15)
        | ((funct3 & 0x7) << 12)
        | (reg(rd) << 7)
        | (op & 0x7f)
}

/// S-type store encoding.
pub fn s_type(op: u32, funct3: u32, rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7f) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 & 0x7) << 12)
        | ((imm & 0x1f) << 7)
        | (op & 0x7f)
}

/// B-type branch encoding; `imm` is a byte offset (bit 0 ignored).
pub fn b_type(funct3: u32, rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 12) & 0x1) << 31)
        | (((imm >> 5) & 0x3f) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | ((funct3 & 0x7) << 12)
        | (((imm >> 1) & 0xf) << 8)
        | (((imm >> 11) & 0x1) << 7)
        | BRANCH
}

/// U-type encoding; `imm20` is the 20-bit upper immediate.
pub fn u_type(op: u32, rd: Gpr, imm20: u32) -> u32 {
    ((imm20 & 0xfffff) << 12) | (reg(rd) << 7) | (op & 0x7f)
}

/// J-type encoding; `imm` is a byte offset (bit 0 ignored).
pub fn j_type(rd: Gpr, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 20) & 0x1) << 31)
        | (((imm >> 1) & 0x3ff) << 21)
        | (((imm >> 11) & 0x1) << 20)
        | (((imm >> 12) & 0xff) << 12)
        | (reg(rd) << 7)
        | JAL
}

/// Shift-immediate encoding with `funct6` in bits 31:26 and a 6-bit shamt.
fn shift_imm(op: u32, funct3: u32, rd: Gpr, rs1: Gpr, shamt: u32, funct6: u32) -> u32 {
    ((funct6 & 0x3f) << 26)
        | ((shamt & 0x3f) << 20)
        | (reg(rs1) << 15)
        | ((funct3 & 0x7) << 12)
        | (reg(rd) << 7)
        | (op & 0x7f)
}

/// Unary encoding that selects the operation through the rs2 field.
fn unary(op: u32, funct3: u32, rd: Gpr, rs1: Gpr, funct7: u32, selector: u32) -> u32 {
    r_type(op, rd, funct3, rs1, Gpr::from_field(selector), funct7)
}

// RV32I / RV64I

pub fn lui(rd: Gpr, imm20: u32) -> u32 {
    u_type(LUI, rd, imm20)
}

pub fn auipc(rd: Gpr, imm20: u32) -> u32 {
    u_type(AUIPC, rd, imm20)
}

pub fn jal(rd: Gpr, imm: i32) -> u32 {
    j_type(rd, imm)
}

pub fn jalr(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(JALR, rd, 0x0, rs1, imm)
}

pub fn beq(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x0, rs1, rs2, imm)
}

pub fn bne(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x1, rs1, rs2, imm)
}

pub fn blt(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x4, rs1, rs2, imm)
}

pub fn bge(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x5, rs1, rs2, imm)
}

pub fn bltu(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x6, rs1, rs2, imm)
}

pub fn bgeu(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    b_type(0x7, rs1, rs2, imm)
}

pub fn lb(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x0, rs1, imm)
}

pub fn lh(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x1, rs1, imm)
}

pub fn lw(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x2, rs1, imm)
}

pub fn ld(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x3, rs1, imm)
}

pub fn lbu(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x4, rs1, imm)
}

pub fn lhu(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x5, rs1, imm)
}

pub fn lwu(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(LOAD, rd, 0x6, rs1, imm)
}

pub fn sb(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    s_type(STORE, 0x0, rs1, rs2, imm)
}

pub fn sh(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    s_type(STORE, 0x1, rs1, rs2, imm)
}

pub fn sw(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    s_type(STORE, 0x2, rs1, rs2, imm)
}

pub fn sd(rs1: Gpr, rs2: Gpr, imm: i32) -> u32 {
    s_type(STORE, 0x3, rs1, rs2, imm)
}

pub fn addi(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x0, rs1, imm)
}

pub fn slti(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x2, rs1, imm)
}

pub fn sltiu(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x3, rs1, imm)
}

pub fn xori(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x4, rs1, imm)
}

pub fn ori(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x6, rs1, imm)
}

pub fn andi(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0x7, rs1, imm)
}

pub fn slli(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM, 0x1, rd, rs1, shamt, 0x00)
}

pub fn srli(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM, 0x5, rd, rs1, shamt, 0x00)
}

pub fn srai(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM, 0x5, rd, rs1, shamt, 0x10)
}

pub fn add(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x0, rs1, rs2, 0x00)
}

pub fn sub(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x0, rs1, rs2, 0x20)
}

pub fn sll(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x1, rs1, rs2, 0x00)
}

pub fn slt(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x2, rs1, rs2, 0x00)
}

pub fn sltu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x3, rs1, rs2, 0x00)
}

pub fn xor(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x4, rs1, rs2, 0x00)
}

pub fn srl(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x5, rs1, rs2, 0x00)
}

pub fn sra(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x5, rs1, rs2, 0x20)
}

pub fn or(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x6, rs1, rs2, 0x00)
}

pub fn and(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x7, rs1, rs2, 0x00)
}

pub fn fence() -> u32 {
    // fence iorw, iorw
    i_type(MISC_MEM, Gpr::ZERO, 0x0, Gpr::ZERO, 0x0ff)
}

pub fn ecall() -> u32 {
    SYSTEM
}

pub fn ebreak() -> u32 {
    (1 << 20) | SYSTEM
}

// RV64I word operations

pub fn addiw(rd: Gpr, rs1: Gpr, imm: i32) -> u32 {
    i_type(OP_IMM_32, rd, 0x0, rs1, imm)
}

pub fn slliw(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM_32, 0x1, rd, rs1, shamt & 0x1f, 0x00)
}

pub fn srliw(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM_32, 0x5, rd, rs1, shamt & 0x1f, 0x00)
}

pub fn sraiw(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM_32, 0x5, rd, rs1, shamt & 0x1f, 0x10)
}

pub fn addw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x0, rs1, rs2, 0x00)
}

pub fn subw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x0, rs1, rs2, 0x20)
}

pub fn sllw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x1, rs1, rs2, 0x00)
}

pub fn srlw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x5, rs1, rs2, 0x00)
}

pub fn sraw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x5, rs1, rs2, 0x20)
}

// M extension

pub fn mul(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x0, rs1, rs2, 0x01)
}

pub fn mulh(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x1, rs1, rs2, 0x01)
}

pub fn mulhsu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x2, rs1, rs2, 0x01)
}

pub fn mulhu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x3, rs1, rs2, 0x01)
}

pub fn div(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x4, rs1, rs2, 0x01)
}

pub fn divu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x5, rs1, rs2, 0x01)
}

pub fn rem(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x6, rs1, rs2, 0x01)
}

pub fn remu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x7, rs1, rs2, 0x01)
}

pub fn mulw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x0, rs1, rs2, 0x01)
}

pub fn divw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x4, rs1, rs2, 0x01)
}

pub fn divuw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x5, rs1, rs2, 0x01)
}

pub fn remw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x6, rs1, rs2, 0x01)
}

pub fn remuw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x7, rs1, rs2, 0x01)
}

// Zbb: basic bit manipulation

pub fn andn(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x7, rs1, rs2, 0x20)
}

pub fn orn(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x6, rs1, rs2, 0x20)
}

pub fn xnor(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x4, rs1, rs2, 0x20)
}

pub fn clz(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x30, 0x00)
}

pub fn ctz(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x30, 0x01)
}

pub fn cpop(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x30, 0x02)
}

pub fn sext_b(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x30, 0x04)
}

pub fn sext_h(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x30, 0x05)
}

/// `zext.h` in its RV32 encoding (`pack rd, rs1, x0`).
pub fn zext_h(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP, 0x4, rd, rs1, 0x04, 0x00)
}

/// `zext.h` in its RV64 encoding (`packw rd, rs1, x0`).
pub fn zext_h_rv64(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_32, 0x4, rd, rs1, 0x04, 0x00)
}

pub fn max(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x6, rs1, rs2, 0x05)
}

pub fn maxu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x7, rs1, rs2, 0x05)
}

pub fn min(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x4, rs1, rs2, 0x05)
}

pub fn minu(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x5, rs1, rs2, 0x05)
}

pub fn rol(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x1, rs1, rs2, 0x30)
}

pub fn ror(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x5, rs1, rs2, 0x30)
}

pub fn rori(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM, 0x5, rd, rs1, shamt, 0x18)
}

pub fn orc_b(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x5, rd, rs1, 0x14, 0x07)
}

/// `rev8` in its RV32 encoding.
pub fn rev8(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x5, rd, rs1, 0x34, 0x18)
}

/// `rev8` in its RV64 encoding.
pub fn rev8_rv64(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x5, rd, rs1, 0x35, 0x18)
}

pub fn clzw(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM_32, 0x1, rd, rs1, 0x30, 0x00)
}

pub fn ctzw(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM_32, 0x1, rd, rs1, 0x30, 0x01)
}

pub fn cpopw(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM_32, 0x1, rd, rs1, 0x30, 0x02)
}

pub fn rolw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x1, rs1, rs2, 0x30)
}

pub fn rorw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x5, rs1, rs2, 0x30)
}

pub fn roriw(rd: Gpr, rs1: Gpr, shamt: u32) -> u32 {
    shift_imm(OP_IMM_32, 0x5, rd, rs1, shamt & 0x1f, 0x18)
}

// Zbkb: bit manipulation for cryptography

pub fn pack(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x4, rs1, rs2, 0x04)
}

pub fn packh(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP, rd, 0x7, rs1, rs2, 0x04)
}

pub fn packw(rd: Gpr, rs1: Gpr, rs2: Gpr) -> u32 {
    r_type(OP_32, rd, 0x4, rs1, rs2, 0x04)
}

pub fn brev8(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x5, rd, rs1, 0x34, 0x07)
}

/// `zip`, RV32 only.
pub fn zip(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x1, rd, rs1, 0x04, 0x0f)
}

/// `unzip`, RV32 only.
pub fn unzip(rd: Gpr, rs1: Gpr) -> u32 {
    unary(OP_IMM, 0x5, rd, rs1, 0x04, 0x0f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_words() {
        // Instruction words run by the riscv-samples app.
        assert_eq!(andn(Gpr::A0, Gpr::A1, Gpr::A0), 0x40a5_f533);
        assert_eq!(pack(Gpr::A2, Gpr::A0, Gpr::A1), 0x08b5_4633);
        assert_eq!(sext_h(Gpr::A0, Gpr::A0), 0x6055_1513);
        assert_eq!(cpop(Gpr::A0, Gpr::A0), 0x6025_1513);
    }

    #[test]
    fn test_base_encodings() {
        assert_eq!(addi(Gpr::A0, Gpr::ZERO, 42), 0x02a0_0513);
        assert_eq!(add(Gpr::A0, Gpr::A1, Gpr::A2), 0x00c5_8533);
        assert_eq!(lui(Gpr::SP, 0x80000), 0x8000_0137);
        assert_eq!(ecall(), 0x0000_0073);
        assert_eq!(ebreak(), 0x0010_0073);
        assert_eq!(ret_word(), 0x0000_8067);
    }

    fn ret_word() -> u32 {
        jalr(Gpr::ZERO, Gpr::RA, 0)
    }

    #[test]
    fn test_branch_and_jump_offsets() {
        // beq a0, a1, -8
        assert_eq!(beq(Gpr::A0, Gpr::A1, -8), 0xfeb5_0ce3);
        // jal ra, 2048
        assert_eq!(jal(Gpr::RA, 2048), 0x0010_00ef);
        // jal zero, -4
        assert_eq!(jal(Gpr::ZERO, -4), 0xffdf_f06f);
    }

    #[test]
    fn test_store_immediate_split() {
        // sw a0, -4(sp)
        assert_eq!(sw(Gpr::SP, Gpr::A0, -4), 0xfea1_2e23);
    }

    #[test]
    fn test_shift_immediates() {
        assert_eq!(slli(Gpr::A0, Gpr::A0, 3), 0x0035_1513);
        assert_eq!(srai(Gpr::A0, Gpr::A0, 1), 0x4015_5513);
        // rv64 shamt uses bit 25
        assert_eq!(slli(Gpr::A0, Gpr::A0, 32) >> 25, 0x01);
        assert_eq!(rori(Gpr::A0, Gpr::A1, 8), 0x6085_d513);
    }

    #[test]
    fn test_zbkb_unary() {
        assert_eq!(brev8(Gpr::A0, Gpr::A0), 0x6875_5513);
        assert_eq!(zip(Gpr::A0, Gpr::A0), 0x08f5_1513);
        assert_eq!(unzip(Gpr::A0, Gpr::A0), 0x08f5_5513);
    }
}
