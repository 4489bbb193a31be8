//! RISC-V instruction encoder.
//!
//! This crate provides functions to encode RISC-V instructions (RV32I/RV64I
//! plus the M, Zbb and Zbkb extensions) into their binary representation,
//! and a small two-pass assembler used by the emulator's tests and tools.

#![no_std]

extern crate alloc;

mod asm;
mod encode;
mod regs;

pub use asm::{assemble_code, assemble_instruction};
pub use encode::*;
pub use regs::Gpr;
