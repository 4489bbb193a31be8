//! Error types for the RISC-V emulator.

use std::fmt;

use thiserror::Error;

use crate::{hooks::HookKind, registers::Register};

/// Kind of memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccessKind {
    Read,
    Write,
    InstructionFetch,
}

impl fmt::Display for MemoryAccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryAccessKind::Read => "read",
            MemoryAccessKind::Write => "write",
            MemoryAccessKind::InstructionFetch => "instruction fetch",
        })
    }
}

/// Invalid profile or engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported register width: {0} bits")]
    UnsupportedWidth(u32),

    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("invalid ISA string: {0:?}")]
    InvalidIsaString(String),

    #[error("invalid page size {0} (expected a power of two)")]
    InvalidPageSize(u64),

    #[error("conflicting encodings for {key}: {existing} and {new}")]
    ConflictingEncoding {
        key: String,
        existing: &'static str,
        new: &'static str,
    },

    #[error("hook does not match kind {0:?}")]
    HookMismatch(HookKind),
}

/// Memory management misuse and guest access faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("region 0x{base:x}+0x{length:x} overlaps an existing mapping")]
    Overlap { base: u64, length: u64 },

    #[error("region 0x{base:x}+0x{length:x} is not a non-empty multiple of the page size 0x{page_size:x}")]
    Alignment {
        base: u64,
        length: u64,
        page_size: u64,
    },

    #[error("no region mapped exactly at 0x{base:x}+0x{length:x}")]
    NotMapped { base: u64, length: u64 },

    #[error("{kind} of {size} bytes at unmapped address 0x{address:x}")]
    UnmappedAccess {
        address: u64,
        size: usize,
        kind: MemoryAccessKind,
    },

    #[error("{kind} of {size} bytes at 0x{address:x} not permitted")]
    PermissionDenied {
        address: u64,
        size: usize,
        kind: MemoryAccessKind,
    },

    #[error("unaligned {kind} at 0x{address:x} (requires {alignment} byte alignment)")]
    UnalignedAccess {
        address: u64,
        alignment: usize,
        kind: MemoryAccessKind,
    },
}

pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Errors that can occur during emulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    /// Host-side memory management or access error.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Guest memory fault raised while executing the instruction at `pc`.
    #[error("memory fault at PC 0x{pc:08x}: {source}")]
    MemoryFault {
        pc: u64,
        #[source]
        source: MemoryError,
    },

    #[error("register {0} is not available in this profile")]
    InvalidRegister(Register),

    #[error("illegal instruction 0x{instruction:08x} at PC 0x{pc:08x}")]
    IllegalInstruction { pc: u64, instruction: u32 },

    #[error("misaligned instruction fetch target 0x{target:08x} at PC 0x{pc:08x}")]
    MisalignedFetch { pc: u64, target: u64 },

    #[error("unhandled ECALL at PC 0x{pc:08x}")]
    UnhandledSyscall { pc: u64 },

    #[error("unexpected EBREAK at PC 0x{pc:08x}")]
    UnexpectedBreakpoint { pc: u64 },

    #[error("execution stopped by hook at PC 0x{pc:08x}")]
    StoppedByHook { pc: u64 },

    #[error("instruction limit exceeded: executed {limit} instructions at PC 0x{pc:08x}")]
    InstructionLimitExceeded { limit: u64, pc: u64 },

    #[error("assembly error: {0}")]
    Assembly(String),
}

impl EmulatorError {
    /// Get the PC where the error occurred, if it happened during execution.
    pub fn pc(&self) -> Option<u64> {
        match self {
            EmulatorError::MemoryFault { pc, .. }
            | EmulatorError::IllegalInstruction { pc, .. }
            | EmulatorError::MisalignedFetch { pc, .. }
            | EmulatorError::UnhandledSyscall { pc }
            | EmulatorError::UnexpectedBreakpoint { pc }
            | EmulatorError::StoppedByHook { pc }
            | EmulatorError::InstructionLimitExceeded { pc, .. } => Some(*pc),
            EmulatorError::Memory(_)
            | EmulatorError::Config(_)
            | EmulatorError::InvalidRegister(_)
            | EmulatorError::Assembly(_) => None,
        }
    }

    /// The underlying memory error, for both host and guest accesses.
    pub fn memory_error(&self) -> Option<&MemoryError> {
        match self {
            EmulatorError::Memory(e) | EmulatorError::MemoryFault { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = EmulatorError::MemoryFault {
            pc: 0x10000,
            source: MemoryError::PermissionDenied {
                address: 0x2000,
                size: 4,
                kind: MemoryAccessKind::Write,
            },
        };
        assert_eq!(
            e.to_string(),
            "memory fault at PC 0x00010000: write of 4 bytes at 0x2000 not permitted"
        );
        assert_eq!(e.pc(), Some(0x10000));
    }

    #[test]
    fn test_from_memory_error() {
        let e: EmulatorError = MemoryError::NotMapped {
            base: 0x1000,
            length: 0x1000,
        }
        .into();
        assert_eq!(e.pc(), None);
        assert!(matches!(
            e.memory_error(),
            Some(MemoryError::NotMapped { .. })
        ));
    }
}
