//! Host callbacks invoked around instructions, memory accesses and ECALLs.

use std::fmt;

use crate::{
    decoder::Operation,
    error::{ConfigError, MemoryAccessKind},
    registers::RegisterFile,
};

/// Where a hook is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeInstruction,
    AfterInstruction,
    BeforeMemoryAccess,
    AfterMemoryAccess,
    Syscall,
}

/// What the engine should do after a hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookAction {
    #[default]
    Continue,
    /// Halt the current run with `HaltReason::Normal`.
    Stop,
}

/// Handle returned by `add_hook`, used to remove the hook again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

/// A memory access as seen by memory hooks and the instruction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub kind: MemoryAccessKind,
    pub address: u64,
    pub size: usize,
    /// Value written, or value read (zero before a read completes).
    pub value: u64,
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mem[0x{:08x}; {}] = 0x{:x}",
            self.kind, self.address, self.size, self.value
        )
    }
}

/// ECALL arguments taken from the register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallInfo {
    /// PC of the ECALL instruction.
    pub pc: u64,
    /// Syscall number (from a7 register)
    pub number: u64,
    /// Syscall arguments (from a0-a6 registers)
    pub args: [u64; 7],
}

type InstructionFn = dyn FnMut(&RegisterFile, &Operation) -> HookAction + Send;
type MemoryFn = dyn FnMut(&RegisterFile, &MemoryAccess) -> HookAction + Send;
type SyscallFn = dyn FnMut(&mut RegisterFile, &SyscallInfo) -> HookAction + Send;

/// A host callback.
///
/// Instruction and memory hooks observe a read-only register file. Syscall
/// hooks may write registers, e.g. to return a value in `a0`.
pub enum Hook {
    Instruction(Box<InstructionFn>),
    Memory(Box<MemoryFn>),
    Syscall(Box<SyscallFn>),
}

impl Hook {
    pub fn instruction<F>(f: F) -> Self
    where
        F: FnMut(&RegisterFile, &Operation) -> HookAction + Send + 'static,
    {
        Hook::Instruction(Box::new(f))
    }

    pub fn memory<F>(f: F) -> Self
    where
        F: FnMut(&RegisterFile, &MemoryAccess) -> HookAction + Send + 'static,
    {
        Hook::Memory(Box::new(f))
    }

    pub fn syscall<F>(f: F) -> Self
    where
        F: FnMut(&mut RegisterFile, &SyscallInfo) -> HookAction + Send + 'static,
    {
        Hook::Syscall(Box::new(f))
    }

    fn matches(&self, kind: HookKind) -> bool {
        matches!(
            (self, kind),
            (
                Hook::Instruction(_),
                HookKind::BeforeInstruction | HookKind::AfterInstruction
            ) | (
                Hook::Memory(_),
                HookKind::BeforeMemoryAccess | HookKind::AfterMemoryAccess
            ) | (Hook::Syscall(_), HookKind::Syscall)
        )
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hook::Instruction(_) => "Hook::Instruction",
            Hook::Memory(_) => "Hook::Memory",
            Hook::Syscall(_) => "Hook::Syscall",
        })
    }
}

struct Registered {
    id: HookId,
    kind: HookKind,
    hook: Hook,
}

/// Hooks in registration order.
#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: Vec<Registered>,
    next_id: u64,
}

impl HookRegistry {
    pub fn add(&mut self, kind: HookKind, hook: Hook) -> Result<HookId, ConfigError> {
        if !hook.matches(kind) {
            return Err(ConfigError::HookMismatch(kind));
        }
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks.push(Registered { id, kind, hook });
        Ok(id)
    }

    pub fn remove(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|h| h.id != id);
        self.hooks.len() != before
    }

    pub fn has(&self, kind: HookKind) -> bool {
        self.hooks.iter().any(|h| h.kind == kind)
    }

    /// Run every instruction hook of `kind`; `Stop` if any asked to stop.
    pub fn instruction(&mut self, kind: HookKind, regs: &RegisterFile, op: &Operation) -> HookAction {
        let mut action = HookAction::Continue;
        for registered in self.hooks.iter_mut().filter(|h| h.kind == kind) {
            if let Hook::Instruction(f) = &mut registered.hook {
                if f(regs, op) == HookAction::Stop {
                    action = HookAction::Stop;
                }
            }
        }
        action
    }

    pub fn memory(
        &mut self,
        kind: HookKind,
        regs: &RegisterFile,
        access: &MemoryAccess,
    ) -> HookAction {
        let mut action = HookAction::Continue;
        for registered in self.hooks.iter_mut().filter(|h| h.kind == kind) {
            if let Hook::Memory(f) = &mut registered.hook {
                if f(regs, access) == HookAction::Stop {
                    action = HookAction::Stop;
                }
            }
        }
        action
    }

    /// Dispatch an ECALL. Returns `None` when no syscall hook is registered.
    pub fn syscall(&mut self, regs: &mut RegisterFile, info: &SyscallInfo) -> Option<HookAction> {
        let mut result = None;
        for registered in self.hooks.iter_mut() {
            if let Hook::Syscall(f) = &mut registered.hook {
                let action = f(regs, info);
                if result != Some(HookAction::Stop) {
                    result = Some(action);
                }
            }
        }
        result
    }
}
