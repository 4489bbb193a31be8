//! RISC-V assembler.
//!
//! This module parses RISC-V assembly text and converts it to binary
//! instructions. It is a two-pass assembler: the first pass records label
//! offsets, the second encodes with labels resolved to PC-relative offsets.
//!
//! Supported syntax, one statement per line:
//!
//! ```text
//! loop:                     # label definition
//!     addi a0, a0, 1        # operands separated by commas
//!     lw   a1, 8(sp)        # memory operands as imm(reg)
//!     bne  a0, a1, loop     # branch/jump targets are labels or byte offsets
//!     li   a2, 0x12345678   # pseudo-instructions: li mv not neg nop j ret beqz bnez zext.b sext.w
//! ```

use alloc::{
    collections::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, space0},
    combinator::{map, map_res, opt, recognize, verify},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::{encode::*, regs::Gpr};

/// A parsed operand.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Reg(Gpr),
    Imm(i64),
    Mem { offset: i64, base: Gpr },
    Label(String),
}

/// A parsed statement awaiting encoding.
#[derive(Debug, Clone)]
struct Statement {
    line: usize,
    mnemonic: String,
    operands: Vec<Operand>,
}

/// How a mnemonic's operands map onto an encoder.
#[derive(Clone, Copy)]
enum Form {
    /// `op rd, rs1, rs2`
    R(fn(Gpr, Gpr, Gpr) -> u32),
    /// `op rd, rs1, imm`
    I(fn(Gpr, Gpr, i32) -> u32),
    /// `op rd, rs1, shamt`
    Shift(fn(Gpr, Gpr, u32) -> u32),
    /// `op rd, rs1`
    Unary(fn(Gpr, Gpr) -> u32),
    /// `op rd, imm(rs1)`
    Load(fn(Gpr, Gpr, i32) -> u32),
    /// `op rs2, imm(rs1)`
    Store(fn(Gpr, Gpr, i32) -> u32),
    /// `op rs1, rs2, target`
    Branch(fn(Gpr, Gpr, i32) -> u32),
    /// `op rs1, target` comparing against zero
    BranchZero(fn(Gpr, Gpr, i32) -> u32),
    /// `op rd, imm`
    Upper(fn(Gpr, u32) -> u32),
    /// `op`
    Nullary(fn() -> u32),
    Jal,
    Jalr,
    J,
    Ret,
    Li,
    Mv,
    Not,
    Neg,
    ZextB,
    SextW,
}

fn lookup(mnemonic: &str) -> Option<Form> {
    let form = match mnemonic {
        // RV32I / RV64I
        "add" => Form::R(add),
        "sub" => Form::R(sub),
        "sll" => Form::R(sll),
        "slt" => Form::R(slt),
        "sltu" => Form::R(sltu),
        "xor" => Form::R(xor),
        "srl" => Form::R(srl),
        "sra" => Form::R(sra),
        "or" => Form::R(or),
        "and" => Form::R(and),
        "addi" => Form::I(addi),
        "slti" => Form::I(slti),
        "sltiu" => Form::I(sltiu),
        "xori" => Form::I(xori),
        "ori" => Form::I(ori),
        "andi" => Form::I(andi),
        "slli" => Form::Shift(slli),
        "srli" => Form::Shift(srli),
        "srai" => Form::Shift(srai),
        "lb" => Form::Load(lb),
        "lh" => Form::Load(lh),
        "lw" => Form::Load(lw),
        "ld" => Form::Load(ld),
        "lbu" => Form::Load(lbu),
        "lhu" => Form::Load(lhu),
        "lwu" => Form::Load(lwu),
        "sb" => Form::Store(sb),
        "sh" => Form::Store(sh),
        "sw" => Form::Store(sw),
        "sd" => Form::Store(sd),
        "beq" => Form::Branch(beq),
        "bne" => Form::Branch(bne),
        "blt" => Form::Branch(blt),
        "bge" => Form::Branch(bge),
        "bltu" => Form::Branch(bltu),
        "bgeu" => Form::Branch(bgeu),
        "lui" => Form::Upper(lui),
        "auipc" => Form::Upper(auipc),
        "jal" => Form::Jal,
        "jalr" => Form::Jalr,
        "fence" => Form::Nullary(fence),
        "ecall" => Form::Nullary(ecall),
        "ebreak" => Form::Nullary(ebreak),
        "addiw" => Form::I(addiw),
        "slliw" => Form::Shift(slliw),
        "srliw" => Form::Shift(srliw),
        "sraiw" => Form::Shift(sraiw),
        "addw" => Form::R(addw),
        "subw" => Form::R(subw),
        "sllw" => Form::R(sllw),
        "srlw" => Form::R(srlw),
        "sraw" => Form::R(sraw),
        // M
        "mul" => Form::R(mul),
        "mulh" => Form::R(mulh),
        "mulhsu" => Form::R(mulhsu),
        "mulhu" => Form::R(mulhu),
        "div" => Form::R(div),
        "divu" => Form::R(divu),
        "rem" => Form::R(rem),
        "remu" => Form::R(remu),
        "mulw" => Form::R(mulw),
        "divw" => Form::R(divw),
        "divuw" => Form::R(divuw),
        "remw" => Form::R(remw),
        "remuw" => Form::R(remuw),
        // Zbb
        "andn" => Form::R(andn),
        "orn" => Form::R(orn),
        "xnor" => Form::R(xnor),
        "clz" => Form::Unary(clz),
        "ctz" => Form::Unary(ctz),
        "cpop" => Form::Unary(cpop),
        "sext.b" => Form::Unary(sext_b),
        "sext.h" => Form::Unary(sext_h),
        "zext.h" => Form::Unary(zext_h),
        "max" => Form::R(max),
        "maxu" => Form::R(maxu),
        "min" => Form::R(min),
        "minu" => Form::R(minu),
        "rol" => Form::R(rol),
        "ror" => Form::R(ror),
        "rori" => Form::Shift(rori),
        "orc.b" => Form::Unary(orc_b),
        "rev8" => Form::Unary(rev8),
        "clzw" => Form::Unary(clzw),
        "ctzw" => Form::Unary(ctzw),
        "cpopw" => Form::Unary(cpopw),
        "rolw" => Form::R(rolw),
        "rorw" => Form::R(rorw),
        "roriw" => Form::Shift(roriw),
        // Zbkb
        "pack" => Form::R(pack),
        "packh" => Form::R(packh),
        "packw" => Form::R(packw),
        "brev8" => Form::Unary(brev8),
        "zip" => Form::Unary(zip),
        "unzip" => Form::Unary(unzip),
        // Pseudo-instructions
        "nop" => Form::Nullary(nop),
        "j" => Form::J,
        "ret" => Form::Ret,
        "li" => Form::Li,
        "mv" => Form::Mv,
        "not" => Form::Not,
        "neg" => Form::Neg,
        "beqz" => Form::BranchZero(beq),
        "bnez" => Form::BranchZero(bne),
        "zext.b" => Form::ZextB,
        "sext.w" => Form::SextW,
        _ => return None,
    };
    Some(form)
}

fn nop() -> u32 {
    addi(Gpr::ZERO, Gpr::ZERO, 0)
}

/// Parse a register name.
fn parse_register(input: &str) -> IResult<&str, Gpr> {
    map_res(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        Gpr::from_name,
    )(input)
}

/// Parse an integer immediate (decimal, hex or binary, optionally negative).
fn parse_immediate(input: &str) -> IResult<&str, i64> {
    let (input, negative) = map(opt(char('-')), |sign| sign.is_some())(input)?;
    let (input, magnitude) = alt((
        map_res(
            preceded(
                alt((tag("0x"), tag("0X"))),
                take_while1(|c: char| c.is_ascii_hexdigit()),
            ),
            |s: &str| u64::from_str_radix(s, 16),
        ),
        map_res(
            preceded(tag("0b"), take_while1(|c: char| c == '0' || c == '1')),
            |s: &str| u64::from_str_radix(s, 2),
        ),
        map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
            s.parse::<u64>()
        }),
    ))(input)?;
    let value = magnitude as i64;
    Ok((input, if negative { value.wrapping_neg() } else { value }))
}

/// Parse a label name (identifier not starting with a digit).
fn parse_label(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '.'),
            take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        )),
        |s: &str| !s.is_empty(),
    )(input)
}

/// Parse `imm(reg)` or `(reg)`.
fn parse_memory(input: &str) -> IResult<&str, Operand> {
    map(
        pair(
            opt(parse_immediate),
            delimited(
                char('('),
                delimited(space0, parse_register, space0),
                char(')'),
            ),
        ),
        |(offset, base)| Operand::Mem {
            offset: offset.unwrap_or(0),
            base,
        },
    )(input)
}

fn parse_operand(input: &str) -> IResult<&str, Operand> {
    alt((
        parse_memory,
        map(parse_register, Operand::Reg),
        map(parse_immediate, Operand::Imm),
        map(parse_label, |s: &str| Operand::Label(s.to_string())),
    ))(input)
}

/// Parse `mnemonic op, op, ...`.
fn parse_instruction(input: &str) -> IResult<&str, (&str, Vec<Operand>)> {
    let (input, mnemonic) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_')(input)?;
    let (input, operands) = preceded(
        space0,
        separated_list0(delimited(space0, char(','), space0), parse_operand),
    )(input)?;
    let (input, _) = space0(input)?;
    Ok((input, (mnemonic, operands)))
}

/// Parse an optional `label:` prefix.
fn parse_label_def(input: &str) -> IResult<&str, Option<&str>> {
    let (input, _) = space0(input)?;
    let (input, label) = opt(terminated(parse_label, pair(space0, char(':'))))(input)?;
    let (input, _) = space0(input)?;
    Ok((input, label))
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

/// Split a 32-bit constant into `lui`/`addi` parts.
fn split_constant(value: i32) -> (u32, i32) {
    let lo = (value << 20) >> 20;
    let hi = ((value.wrapping_sub(lo) as u32) >> 12) & 0xfffff;
    (hi, lo)
}

fn li_value(line: usize, value: i64) -> Result<i32, String> {
    if value >= i32::MIN as i64 && value <= u32::MAX as i64 {
        Ok(value as i32)
    } else {
        Err(format!("line {}: li immediate {} does not fit in 32 bits", line, value))
    }
}

/// Number of instruction words a statement expands to.
fn statement_size(stmt: &Statement) -> Result<usize, String> {
    match (stmt.mnemonic.as_str(), stmt.operands.as_slice()) {
        ("li", [_, Operand::Imm(value)]) => {
            let value = li_value(stmt.line, *value)?;
            if (-2048..2048).contains(&value) {
                Ok(1)
            } else if split_constant(value).1 == 0 {
                Ok(1)
            } else {
                Ok(2)
            }
        }
        _ => Ok(1),
    }
}

fn fits_signed(value: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    value >= min && value <= max
}

struct Encoder<'a> {
    labels: &'a BTreeMap<String, u32>,
}

impl Encoder<'_> {
    fn imm12(&self, line: usize, value: i64) -> Result<i32, String> {
        if fits_signed(value, 12) {
            Ok(value as i32)
        } else {
            Err(format!("line {}: immediate {} does not fit in 12 bits", line, value))
        }
    }

    fn shamt(&self, line: usize, value: i64) -> Result<u32, String> {
        if (0..64).contains(&value) {
            Ok(value as u32)
        } else {
            Err(format!("line {}: shift amount {} out of range", line, value))
        }
    }

    fn target(&self, line: usize, pc: u32, operand: &Operand, bits: u32) -> Result<i32, String> {
        let offset = match operand {
            Operand::Imm(offset) => *offset,
            Operand::Label(name) => {
                let target = self
                    .labels
                    .get(name)
                    .ok_or_else(|| format!("line {}: undefined label '{}'", line, name))?;
                *target as i64 - pc as i64
            }
            other => return Err(format!("line {}: expected jump target, got {:?}", line, other)),
        };
        if !fits_signed(offset, bits) || offset % 2 != 0 {
            return Err(format!("line {}: target offset {} out of range", line, offset));
        }
        Ok(offset as i32)
    }

    fn encode(&self, stmt: &Statement, pc: u32, out: &mut Vec<u32>) -> Result<(), String> {
        use Operand::*;

        let line = stmt.line;
        let form = lookup(&stmt.mnemonic)
            .ok_or_else(|| format!("line {}: unknown instruction '{}'", line, stmt.mnemonic))?;
        let bad_operands = || {
            format!(
                "line {}: invalid operands for '{}': {:?}",
                line, stmt.mnemonic, stmt.operands
            )
        };

        match (form, stmt.operands.as_slice()) {
            (Form::R(f), [Reg(rd), Reg(rs1), Reg(rs2)]) => out.push(f(*rd, *rs1, *rs2)),
            (Form::I(f), [Reg(rd), Reg(rs1), Imm(imm)]) => {
                out.push(f(*rd, *rs1, self.imm12(line, *imm)?))
            }
            (Form::Shift(f), [Reg(rd), Reg(rs1), Imm(shamt)]) => {
                out.push(f(*rd, *rs1, self.shamt(line, *shamt)?))
            }
            (Form::Unary(f), [Reg(rd), Reg(rs1)]) => out.push(f(*rd, *rs1)),
            (Form::Load(f), [Reg(rd), Mem { offset, base }]) => {
                out.push(f(*rd, *base, self.imm12(line, *offset)?))
            }
            (Form::Store(f), [Reg(rs2), Mem { offset, base }]) => {
                out.push(f(*base, *rs2, self.imm12(line, *offset)?))
            }
            (Form::Branch(f), [Reg(rs1), Reg(rs2), target]) => {
                out.push(f(*rs1, *rs2, self.target(line, pc, target, 13)?))
            }
            (Form::BranchZero(f), [Reg(rs1), target]) => {
                out.push(f(*rs1, Gpr::ZERO, self.target(line, pc, target, 13)?))
            }
            (Form::Upper(f), [Reg(rd), Imm(imm)]) => {
                // Accept either the 20-bit upper immediate or a full 32-bit value.
                let imm20 = if (0..=0xfffff).contains(imm) {
                    *imm as u32
                } else {
                    (*imm as u32) >> 12
                };
                out.push(f(*rd, imm20))
            }
            (Form::Nullary(f), []) => out.push(f()),
            (Form::Jal, [target]) => out.push(jal(Gpr::RA, self.target(line, pc, target, 21)?)),
            (Form::Jal, [Reg(rd), target]) => {
                out.push(jal(*rd, self.target(line, pc, target, 21)?))
            }
            (Form::J, [target]) => out.push(jal(Gpr::ZERO, self.target(line, pc, target, 21)?)),
            (Form::Jalr, [Reg(rs1)]) => out.push(jalr(Gpr::RA, *rs1, 0)),
            (Form::Jalr, [Reg(rd), Reg(rs1)]) => out.push(jalr(*rd, *rs1, 0)),
            (Form::Jalr, [Reg(rd), Reg(rs1), Imm(imm)]) => {
                out.push(jalr(*rd, *rs1, self.imm12(line, *imm)?))
            }
            (Form::Jalr, [Reg(rd), Mem { offset, base }]) => {
                out.push(jalr(*rd, *base, self.imm12(line, *offset)?))
            }
            (Form::Ret, []) => out.push(jalr(Gpr::ZERO, Gpr::RA, 0)),
            (Form::Li, [Reg(rd), Imm(value)]) => {
                let value = li_value(line, *value)?;
                if (-2048..2048).contains(&value) {
                    out.push(addi(*rd, Gpr::ZERO, value));
                } else {
                    let (hi, lo) = split_constant(value);
                    out.push(lui(*rd, hi));
                    if lo != 0 {
                        out.push(addi(*rd, *rd, lo));
                    }
                }
            }
            (Form::Mv, [Reg(rd), Reg(rs)]) => out.push(addi(*rd, *rs, 0)),
            (Form::Not, [Reg(rd), Reg(rs)]) => out.push(xori(*rd, *rs, -1)),
            (Form::Neg, [Reg(rd), Reg(rs)]) => out.push(sub(*rd, Gpr::ZERO, *rs)),
            (Form::ZextB, [Reg(rd), Reg(rs)]) => out.push(andi(*rd, *rs, 0xff)),
            (Form::SextW, [Reg(rd), Reg(rs)]) => out.push(addiw(*rd, *rs, 0)),
            _ => return Err(bad_operands()),
        }
        Ok(())
    }
}

fn parse_program(asm: &str) -> Result<(Vec<Statement>, BTreeMap<String, u32>), String> {
    let mut statements = Vec::new();
    let mut labels = BTreeMap::new();
    let mut offset: u32 = 0;

    for (idx, raw) in asm.lines().enumerate() {
        let line = idx + 1;
        let text = strip_comment(raw);
        let (rest, label) =
            parse_label_def(text).map_err(|e| format!("line {}: {:?}", line, e))?;
        if let Some(label) = label {
            if labels.insert(label.to_string(), offset).is_some() {
                return Err(format!("line {}: duplicate label '{}'", line, label));
            }
        }
        let rest = rest.trim_end();
        if rest.is_empty() {
            continue;
        }

        let (remaining, (mnemonic, operands)) =
            parse_instruction(rest).map_err(|e| format!("line {}: {:?}", line, e))?;
        if !remaining.trim().is_empty() {
            return Err(format!("line {}: unexpected trailing input '{}'", line, remaining));
        }

        let stmt = Statement {
            line,
            mnemonic: mnemonic.to_string(),
            operands,
        };
        offset += (statement_size(&stmt)? * 4) as u32;
        statements.push(stmt);
    }

    Ok((statements, labels))
}

/// Assemble a program into little-endian machine code.
///
/// # Errors
///
/// Returns a message naming the offending line on unknown mnemonics,
/// malformed operands, out-of-range immediates or undefined labels.
pub fn assemble_code(asm: &str) -> Result<Vec<u8>, String> {
    let (statements, labels) = parse_program(asm)?;
    let encoder = Encoder { labels: &labels };

    let mut words = Vec::new();
    for stmt in &statements {
        let pc = (words.len() * 4) as u32;
        encoder.encode(stmt, pc, &mut words)?;
    }

    let mut code = Vec::with_capacity(words.len() * 4);
    for word in words {
        code.extend_from_slice(&word.to_le_bytes());
    }
    Ok(code)
}

/// Assemble a single instruction that encodes to exactly one word.
pub fn assemble_instruction(line: &str) -> Result<u32, String> {
    let code = assemble_code(line)?;
    match code.as_slice() {
        [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
        [] => Err(String::from("no instruction")),
        _ => Err(format!("'{}' expands to more than one instruction", line.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn words(code: &[u8]) -> Vec<u32> {
        code.chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_assemble_sample_instructions() {
        assert_eq!(assemble_instruction("andn a0, a1, a0"), Ok(0x40a5_f533));
        assert_eq!(assemble_instruction("pack a2, a0, a1"), Ok(0x08b5_4633));
        assert_eq!(assemble_instruction("sext.h a0, a0"), Ok(0x6055_1513));
        assert_eq!(assemble_instruction("cpop a0, a0"), Ok(0x6025_1513));
        assert_eq!(assemble_instruction("brev8 a0, a0"), Ok(0x6875_5513));
        assert_eq!(assemble_instruction("unzip a0, a0"), Ok(0x08f5_5513));
    }

    #[test]
    fn test_assemble_memory_operands() {
        assert_eq!(
            assemble_instruction("lw a0, 8(sp)"),
            Ok(lw(Gpr::A0, Gpr::SP, 8))
        );
        assert_eq!(
            assemble_instruction("sw a0, -4(sp)"),
            Ok(sw(Gpr::SP, Gpr::A0, -4))
        );
        assert_eq!(
            assemble_instruction("lbu t0, (a1)"),
            Ok(lbu(Gpr::T0, Gpr::A1, 0))
        );
    }

    #[test]
    fn test_assemble_labels() {
        let code = assemble_code(
            "
start:
    addi a0, zero, 3
loop:
    addi a0, a0, -1
    bnez a0, loop   # count down
    j done
    addi a0, zero, 99
done:
    ebreak",
        )
        .unwrap();
        assert_eq!(
            words(&code),
            vec![
                addi(Gpr::A0, Gpr::ZERO, 3),
                addi(Gpr::A0, Gpr::A0, -1),
                bne(Gpr::A0, Gpr::ZERO, -4),
                jal(Gpr::ZERO, 8),
                addi(Gpr::A0, Gpr::ZERO, 99),
                ebreak(),
            ]
        );
    }

    #[test]
    fn test_li_expansion() {
        let code = assemble_code("li a0, 0x12345678").unwrap();
        assert_eq!(
            words(&code),
            vec![lui(Gpr::A0, 0x12345), addi(Gpr::A0, Gpr::A0, 0x678)]
        );

        // Low part with the sign bit set rounds the upper part up.
        let code = assemble_code("li a0, 0xFFFFBDDD").unwrap();
        assert_eq!(
            words(&code),
            vec![lui(Gpr::A0, 0xffffc), addi(Gpr::A0, Gpr::A0, -0x223)]
        );

        let code = assemble_code("li a1, 0x80000000").unwrap();
        assert_eq!(words(&code), vec![lui(Gpr::A1, 0x80000)]);

        let code = assemble_code("li a1, -5").unwrap();
        assert_eq!(words(&code), vec![addi(Gpr::A1, Gpr::ZERO, -5)]);
    }

    #[test]
    fn test_lui_accepts_full_value() {
        assert_eq!(
            assemble_instruction("lui sp, 0x80000000"),
            Ok(lui(Gpr::SP, 0x80000))
        );
        assert_eq!(
            assemble_instruction("lui sp, 0x80000"),
            Ok(lui(Gpr::SP, 0x80000))
        );
    }

    #[test]
    fn test_errors() {
        assert!(assemble_code("frobnicate a0").unwrap_err().contains("unknown instruction"));
        assert!(assemble_code("addi a0, a0, 5000").unwrap_err().contains("12 bits"));
        assert!(assemble_code("j nowhere").unwrap_err().contains("undefined label"));
        assert!(assemble_code("add a0, a1").unwrap_err().contains("invalid operands"));
        assert!(assemble_instruction("li a0, 0x12345678").is_err());
    }
}
