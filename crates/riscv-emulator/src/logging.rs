//! Instruction trace log.

use std::{collections::VecDeque, fmt};

use riscv_encoder::Gpr;

use crate::hooks::MemoryAccess;

/// Logging verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// No logging.
    #[default]
    None,
    /// Only log the instruction that faulted.
    Errors,
    /// Log each instruction execution.
    Instructions,
    /// Also record memory accesses.
    Verbose,
}

/// A register write performed by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub rd: Gpr,
    pub old: u64,
    pub new: u64,
}

/// Log entry for a single instruction execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstLog {
    pub cycle: u64,
    pub pc: u64,
    pub instruction: u32,
    pub disassembly: String,
    pub reg_write: Option<RegWrite>,
    pub mem_accesses: Vec<MemoryAccess>,
    /// Target when control flow left the sequential path.
    pub jump_target: Option<u64>,
    /// Error message if the instruction faulted.
    pub fault: Option<String>,
}

impl fmt::Display for InstLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Print cycle count, address and instruction
        write!(f, "[{:4}] 0x{:08x}: {}", self.cycle, self.pc, self.disassembly)?;

        if let Some(w) = &self.reg_write {
            write!(f, "\n    {}: 0x{:x} -> 0x{:x}", w.rd, w.old, w.new)?;
        }
        for access in &self.mem_accesses {
            write!(f, "\n    {}", access)?;
        }
        if let Some(target) = self.jump_target {
            write!(f, "\n    jump: 0x{:08x} -> 0x{:08x}", self.pc, target)?;
        }
        if let Some(fault) = &self.fault {
            write!(f, "\n    fault: {}", fault)?;
        }
        Ok(())
    }
}

/// Bounded buffer keeping the most recent entries.
#[derive(Debug, Clone)]
pub(crate) struct LogBuffer {
    entries: VecDeque<InstLog>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: InstLog) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &InstLog> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryAccessKind;

    fn entry(cycle: u64) -> InstLog {
        InstLog {
            cycle,
            pc: cycle * 4,
            instruction: 0x13,
            disassembly: "addi zero, zero, 0".into(),
            reg_write: None,
            mem_accesses: Vec::new(),
            jump_target: None,
            fault: None,
        }
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut buf = LogBuffer::new(3);
        for cycle in 1..=5 {
            buf.push(entry(cycle));
        }
        let cycles: Vec<u64> = buf.iter().map(|e| e.cycle).collect();
        assert_eq!(cycles, vec![3, 4, 5]);
    }

    #[test]
    fn test_display() {
        let mut log = entry(1);
        log.disassembly = "sw a0, 0(sp)".into();
        log.mem_accesses.push(MemoryAccess {
            kind: MemoryAccessKind::Write,
            address: 0x8000_0100,
            size: 4,
            value: 42,
        });
        assert_eq!(
            log.to_string(),
            "[   1] 0x00000004: sw a0, 0(sp)\n    write mem[0x80000100; 4] = 0x2a"
        );

        let mut log = entry(2);
        log.reg_write = Some(RegWrite {
            rd: Gpr::A0,
            old: 0,
            new: 5,
        });
        assert_eq!(
            log.to_string(),
            "[   2] 0x00000008: addi zero, zero, 0\n    a0: 0x0 -> 0x5"
        );
    }
}
