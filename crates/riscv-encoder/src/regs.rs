//! RISC-V general-purpose registers.

extern crate alloc;

use alloc::{format, string::String};
use core::fmt;

/// ABI names indexed by register number.
const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// RISC-V general-purpose register (`x0`..`x31`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gpr(u8);

impl Gpr {
    /// Create a new GPR from register number (0-31).
    ///
    /// # Panics
    ///
    /// Panics if the register number is >= 32.
    pub const fn new(num: u8) -> Self {
        assert!(num < 32, "Register number must be < 32");
        Self(num)
    }

    /// Create a GPR from a register number, returning `None` when out of range.
    pub const fn try_new(num: u8) -> Option<Self> {
        if num < 32 {
            Some(Self(num))
        } else {
            None
        }
    }

    /// Extract a register from a 5-bit instruction field.
    pub const fn from_field(field: u32) -> Self {
        Self((field & 0x1f) as u8)
    }

    /// Get the register number (0-31).
    pub const fn num(&self) -> u8 {
        self.0
    }

    /// ABI name of the register (`a0`, `sp`, ...).
    pub fn abi_name(&self) -> &'static str {
        ABI_NAMES[self.0 as usize]
    }
}

// Named registers
impl Gpr {
    pub const ZERO: Gpr = Gpr(0);
    pub const RA: Gpr = Gpr(1);
    pub const SP: Gpr = Gpr(2);
    pub const GP: Gpr = Gpr(3);
    pub const TP: Gpr = Gpr(4);
    pub const T0: Gpr = Gpr(5);
    pub const T1: Gpr = Gpr(6);
    pub const T2: Gpr = Gpr(7);
    // s0 doubles as the frame pointer
    pub const S0: Gpr = Gpr(8);
    pub const S1: Gpr = Gpr(9);
    pub const A0: Gpr = Gpr(10);
    pub const A1: Gpr = Gpr(11);
    pub const A2: Gpr = Gpr(12);
    pub const A3: Gpr = Gpr(13);
    pub const A4: Gpr = Gpr(14);
    pub const A5: Gpr = Gpr(15);
    pub const A6: Gpr = Gpr(16);
    pub const A7: Gpr = Gpr(17);
    pub const S2: Gpr = Gpr(18);
    pub const S3: Gpr = Gpr(19);
    pub const S4: Gpr = Gpr(20);
    pub const S5: Gpr = Gpr(21);
    pub const S6: Gpr = Gpr(22);
    pub const S7: Gpr = Gpr(23);
    pub const S8: Gpr = Gpr(24);
    pub const S9: Gpr = Gpr(25);
    pub const S10: Gpr = Gpr(26);
    pub const S11: Gpr = Gpr(27);
    pub const T3: Gpr = Gpr(28);
    pub const T4: Gpr = Gpr(29);
    pub const T5: Gpr = Gpr(30);
    pub const T6: Gpr = Gpr(31);

    /// Parse a register name string into a Gpr.
    ///
    /// Supports both ABI names (zero, ra, sp, a0-a7, s0-s11, t0-t6, fp)
    /// and numeric names (x0-x31).
    ///
    /// # Errors
    ///
    /// Returns an error string if the register name is invalid.
    pub fn from_name(name: &str) -> Result<Self, String> {
        if name == "fp" {
            return Ok(Gpr::S0);
        }
        if let Some(pos) = ABI_NAMES.iter().position(|n| *n == name) {
            return Ok(Gpr(pos as u8));
        }
        if let Some(num_str) = name.strip_prefix('x') {
            if let Ok(num) = num_str.parse::<u8>() {
                if let Some(reg) = Gpr::try_new(num) {
                    return Ok(reg);
                }
            }
        }
        Err(format!("Invalid register name: {}", name))
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}
