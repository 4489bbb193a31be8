//! ISA profile and engine configuration.

use std::{fmt, str::FromStr};

use bitflags::bitflags;

use crate::{error::ConfigError, logging::LogLevel};

/// Register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Xlen {
    Rv32,
    Rv64,
}

impl Xlen {
    /// Width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Xlen::Rv32 => 32,
            Xlen::Rv64 => 64,
        }
    }

    /// Mask selecting the low XLEN bits of a `u64`.
    pub const fn mask(self) -> u64 {
        match self {
            Xlen::Rv32 => 0xffff_ffff,
            Xlen::Rv64 => u64::MAX,
        }
    }

    /// Interpret an XLEN-wide value as signed.
    pub const fn signed(self, value: u64) -> i64 {
        match self {
            Xlen::Rv32 => value as u32 as i32 as i64,
            Xlen::Rv64 => value as i64,
        }
    }
}

/// Byte order of data loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

bitflags! {
    /// Optional ISA extensions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Extensions: u32 {
        /// Integer multiply/divide.
        const M = 1 << 0;
        /// Basic bit manipulation.
        const ZBB = 1 << 1;
        /// Bit manipulation for cryptography.
        const ZBKB = 1 << 2;
        /// Embedded base (16 registers, RV32 only).
        const E = 1 << 3;
    }
}

/// XLEN, data endianness and enabled extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsaProfile {
    xlen: Xlen,
    endianness: Endianness,
    extensions: Extensions,
}

impl IsaProfile {
    /// Build a profile from a register width in bits.
    ///
    /// # Errors
    ///
    /// `UnsupportedWidth` unless `width_bits` is 32 or 64, and
    /// `UnsupportedExtension` when the embedded base is requested on RV64.
    pub fn new(
        width_bits: u32,
        endianness: Endianness,
        extensions: Extensions,
    ) -> Result<Self, ConfigError> {
        let xlen = match width_bits {
            32 => Xlen::Rv32,
            64 => Xlen::Rv64,
            other => return Err(ConfigError::UnsupportedWidth(other)),
        };
        if xlen == Xlen::Rv64 && extensions.contains(Extensions::E) {
            return Err(ConfigError::UnsupportedExtension("e".into()));
        }
        Ok(Self {
            xlen,
            endianness,
            extensions,
        })
    }

    /// Little-endian RV32 with M, Zbb and Zbkb.
    pub fn rv32() -> Self {
        Self {
            xlen: Xlen::Rv32,
            endianness: Endianness::Little,
            extensions: Extensions::M | Extensions::ZBB | Extensions::ZBKB,
        }
    }

    /// Little-endian RV64 with M, Zbb and Zbkb.
    pub fn rv64() -> Self {
        Self {
            xlen: Xlen::Rv64,
            ..Self::rv32()
        }
    }

    /// Same profile with a different data byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn extensions(&self) -> Extensions {
        self.extensions
    }

    pub fn has(&self, ext: Extensions) -> bool {
        self.extensions.contains(ext)
    }

    /// Number of general-purpose registers (16 on RV32E, otherwise 32).
    pub fn register_count(&self) -> u8 {
        if self.has(Extensions::E) {
            16
        } else {
            32
        }
    }
}

impl fmt::Display for IsaProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rv{}", self.xlen.bits())?;
        f.write_str(if self.has(Extensions::E) { "e" } else { "i" })?;
        if self.has(Extensions::M) {
            f.write_str("m")?;
        }
        if self.has(Extensions::ZBB) {
            f.write_str("_zbb")?;
        }
        if self.has(Extensions::ZBKB) {
            f.write_str("_zbkb")?;
        }
        Ok(())
    }
}

impl FromStr for IsaProfile {
    type Err = ConfigError;

    /// Parse an ISA string such as `rv32im_zbb_zbkb` or `rv64i`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let invalid = || ConfigError::InvalidIsaString(s.to_string());

        let rest = lower.strip_prefix("rv").ok_or_else(invalid)?;
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(invalid());
        }
        let width: u32 = rest[..digits].parse().map_err(|_| invalid())?;
        let rest = &rest[digits..];

        let mut parts = rest.split('_');
        let single = parts.next().unwrap_or_default();
        let mut chars = single.chars();
        let mut extensions = match chars.next() {
            Some('i') => Extensions::empty(),
            Some('e') => Extensions::E,
            Some(other) => return Err(ConfigError::UnsupportedExtension(other.to_string())),
            None => return Err(invalid()),
        };
        for c in chars {
            match c {
                'm' => extensions |= Extensions::M,
                other => return Err(ConfigError::UnsupportedExtension(other.to_string())),
            }
        }
        for multi in parts {
            match multi {
                "zbb" => extensions |= Extensions::ZBB,
                "zbkb" => extensions |= Extensions::ZBKB,
                "" => return Err(invalid()),
                other => return Err(ConfigError::UnsupportedExtension(other.to_string())),
            }
        }

        IsaProfile::new(width, Endianness::Little, extensions)
    }
}

/// Engine settings that are independent of the ISA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Granularity of `map`/`unmap`/`protect`.
    pub page_size: u64,
    /// Fault on data accesses that are not naturally aligned.
    pub strict_alignment: bool,
    /// Instruction log capture level.
    pub log_level: LogLevel,
    /// Number of instruction log entries kept.
    pub log_capacity: usize,
    /// Step budget for `run_until_ebreak` / `run_until_ecall`.
    pub max_instructions: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            strict_alignment: false,
            log_level: LogLevel::None,
            log_capacity: 100,
            max_instructions: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_strict_alignment(mut self, strict: bool) -> Self {
        self.strict_alignment = strict;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_max_instructions(mut self, limit: u64) -> Self {
        self.max_instructions = limit;
        self
    }

    /// Check settings that cannot be represented by the type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < 4 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }
}
