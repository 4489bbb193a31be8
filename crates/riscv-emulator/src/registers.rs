//! Register file.

use std::fmt;

use riscv_encoder::Gpr;

use crate::{
    error::{EmulatorError, Result},
    profile::{IsaProfile, Xlen},
};

/// Register identifier visible to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    X(Gpr),
    Pc,
}

impl Register {
    /// Parse `pc`, an ABI name (`a0`) or a numeric name (`x10`).
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("pc") {
            return Some(Register::Pc);
        }
        Gpr::from_name(name).ok().map(Register::X)
    }
}

impl From<Gpr> for Register {
    fn from(gpr: Gpr) -> Self {
        Register::X(gpr)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::X(gpr) => write!(f, "{}", gpr),
            Register::Pc => f.write_str("pc"),
        }
    }
}

/// Copy of every register and the PC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    x: [u64; 32],
    pc: u64,
}

impl RegisterSnapshot {
    pub fn gpr(&self, reg: Gpr) -> u64 {
        self.x[reg.num() as usize]
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }
}

/// General-purpose registers plus the PC, each XLEN bits wide.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    x: [u64; 32],
    pc: u64,
    xlen: Xlen,
    count: u8,
}

impl RegisterFile {
    pub fn new(profile: &IsaProfile) -> Self {
        Self {
            x: [0; 32],
            pc: 0,
            xlen: profile.xlen(),
            count: profile.register_count(),
        }
    }

    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    fn check(&self, reg: Register) -> Result<()> {
        match reg {
            Register::X(gpr) if gpr.num() >= self.count => Err(EmulatorError::InvalidRegister(reg)),
            _ => Ok(()),
        }
    }

    /// Read a register, zero-extended from XLEN.
    pub fn read(&self, reg: Register) -> Result<u64> {
        self.check(reg)?;
        Ok(match reg {
            Register::X(gpr) => self.x(gpr),
            Register::Pc => self.pc,
        })
    }

    /// Write a register, truncating to XLEN. Writes to `x0` are ignored.
    pub fn write(&mut self, reg: Register, value: u64) -> Result<()> {
        self.check(reg)?;
        match reg {
            Register::X(gpr) => self.set_x(gpr, value),
            Register::Pc => self.set_pc(value),
        }
        Ok(())
    }

    /// Read a GPR already validated against the profile.
    pub fn x(&self, reg: Gpr) -> u64 {
        self.x[reg.num() as usize]
    }

    pub(crate) fn set_x(&mut self, reg: Gpr, value: u64) {
        if reg != Gpr::ZERO {
            self.x[reg.num() as usize] = value & self.xlen.mask();
        }
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: u64) {
        self.pc = pc & self.xlen.mask();
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            x: self.x,
            pc: self.pc,
        }
    }

    pub fn restore(&mut self, snapshot: &RegisterSnapshot) {
        let mask = self.xlen.mask();
        for (dst, src) in self.x.iter_mut().zip(snapshot.x.iter()).skip(1) {
            *dst = src & mask;
        }
        self.pc = snapshot.pc & mask;
    }

    pub(crate) fn reset(&mut self) {
        self.x = [0; 32];
        self.pc = 0;
    }
}
