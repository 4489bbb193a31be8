//! Core RISC-V emulator implementation.

use std::{
    fmt::Write as _,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use riscv_encoder::Gpr;
use tracing::{debug, trace, warn};

use crate::{
    decoder::{Decoder, Mnemonic, Operation},
    error::{ConfigError, EmulatorError, Result},
    executor::{execute, ExecContext, StepOutcome, StepRecord},
    hooks::{Hook, HookAction, HookId, HookKind, HookRegistry, MemoryAccess, SyscallInfo},
    logging::{InstLog, LogBuffer, LogLevel, RegWrite},
    memory::{Memory, Permissions, RegionInfo},
    profile::{EngineConfig, IsaProfile},
    registers::{Register, RegisterFile, RegisterSnapshot},
};

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Normal step completed, continue execution
    Continue,
    /// ECALL encountered, syscall information available
    Syscall(SyscallInfo),
    /// EBREAK encountered or a hook asked to stop
    Halted,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Reached the end address, executed EBREAK, or a stop was requested.
    Normal,
    /// An instruction faulted; see `RunResult::error`.
    Fault,
    InstructionLimitReached,
    TimeLimitReached,
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Halted(HaltReason),
}

/// Outcome of `Engine::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub reason: HaltReason,
    /// Instructions executed by this run.
    pub instructions: u64,
    /// PC after the run.
    pub pc: u64,
    pub error: Option<EmulatorError>,
}

/// Requests a stop of a running engine from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What happened to the instruction at the current PC.
enum Stepped {
    Retired { stop: bool },
    Breakpoint,
    Syscall { info: SyscallInfo, stop: bool },
    /// A before-instruction hook asked to stop; nothing was executed.
    StoppedBefore,
}

/// RISC-V emulator instance.
pub struct Engine {
    profile: IsaProfile,
    config: EngineConfig,
    decoder: Decoder,
    regs: RegisterFile,
    memory: Memory,
    hooks: HookRegistry,
    state: EngineState,
    stop: StopHandle,
    instruction_count: u64,
    logs: LogBuffer,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new(profile: IsaProfile) -> std::result::Result<Self, ConfigError> {
        Self::with_config(profile, EngineConfig::default())
    }

    pub fn with_config(
        profile: IsaProfile,
        config: EngineConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let decoder = Decoder::new(&profile)?;
        debug!(%profile, page_size = config.page_size, "create engine");
        Ok(Self {
            regs: RegisterFile::new(&profile),
            memory: Memory::new(config.page_size, profile.endianness()),
            hooks: HookRegistry::default(),
            state: EngineState::Idle,
            stop: StopHandle::default(),
            instruction_count: 0,
            logs: LogBuffer::new(config.log_capacity),
            profile,
            config,
            decoder,
        })
    }

    /// Set the step budget for `run_until_ebreak` / `run_until_ecall`.
    pub fn with_max_instructions(mut self, limit: u64) -> Self {
        self.config.max_instructions = limit;
        self
    }

    /// Set the logging level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn profile(&self) -> &IsaProfile {
        &self.profile
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Return to `Idle`, clearing registers and counters. Memory is kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.instruction_count = 0;
        self.state = EngineState::Idle;
        self.stop.clear();
    }

    // Memory

    pub fn map(&mut self, base: u64, length: u64, perms: Permissions) -> Result<()> {
        Ok(self.memory.map(base, length, perms)?)
    }

    pub fn unmap(&mut self, base: u64, length: u64) -> Result<()> {
        Ok(self.memory.unmap(base, length)?)
    }

    pub fn protect(&mut self, base: u64, length: u64, perms: Permissions) -> Result<()> {
        Ok(self.memory.protect(base, length, perms)?)
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionInfo> + '_ {
        self.memory.regions()
    }

    /// Copy bytes into guest memory, ignoring permissions.
    pub fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<()> {
        Ok(self.memory.poke(address, data)?)
    }

    /// Copy bytes out of guest memory, ignoring permissions.
    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.memory.peek(address, &mut buf)?;
        Ok(buf)
    }

    /// Get a reference to the memory (for inspection).
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Get a mutable reference to the memory (for initialization).
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    // Registers

    pub fn read_register(&self, reg: impl Into<Register>) -> Result<u64> {
        self.regs.read(reg.into())
    }

    pub fn write_register(&mut self, reg: impl Into<Register>, value: u64) -> Result<()> {
        self.regs.write(reg.into(), value)
    }

    /// Get the value of a register.
    pub fn get_register(&self, reg: Gpr) -> u64 {
        self.regs.x(reg)
    }

    /// Get a register sign-extended from XLEN.
    pub fn get_register_signed(&self, reg: Gpr) -> i64 {
        self.profile.xlen().signed(self.regs.x(reg))
    }

    /// Get the current program counter.
    pub fn get_pc(&self) -> u64 {
        self.regs.pc()
    }

    /// Set the program counter.
    pub fn set_pc(&mut self, pc: u64) {
        self.regs.set_pc(pc);
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn snapshot_registers(&self) -> RegisterSnapshot {
        self.regs.snapshot()
    }

    pub fn restore_registers(&mut self, snapshot: &RegisterSnapshot) {
        self.regs.restore(snapshot);
    }

    /// Get the number of instructions executed so far.
    pub fn get_instruction_count(&self) -> u64 {
        self.instruction_count
    }

    // Hooks

    pub fn add_hook(&mut self, kind: HookKind, hook: Hook) -> Result<HookId> {
        Ok(self.hooks.add(kind, hook)?)
    }

    /// Remove a hook. Returns `false` if it was not registered.
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // Execution

    fn syscall_info(&self, pc: u64) -> SyscallInfo {
        let x = |reg: Gpr| self.regs.x(reg);
        SyscallInfo {
            pc,
            number: x(Gpr::A7),
            args: [
                x(Gpr::A0),
                x(Gpr::A1),
                x(Gpr::A2),
                x(Gpr::A3),
                x(Gpr::A4),
                x(Gpr::A5),
                x(Gpr::A6),
            ],
        }
    }

    /// Fetch, decode and execute the instruction at the PC.
    ///
    /// With `dispatch_syscalls`, an ECALL that no syscall hook can take
    /// faults in place instead of retiring.
    fn step_inner(&mut self, dispatch_syscalls: bool) -> Result<Stepped> {
        let pc = self.regs.pc();
        let mut record = StepRecord::default();

        let mut ctx = ExecContext {
            regs: &mut self.regs,
            memory: &mut self.memory,
            hooks: &mut self.hooks,
            strict_alignment: self.config.strict_alignment,
            record: &mut record,
        };
        let word = match ctx.fetch(pc) {
            Ok(word) => word,
            Err(e) => return Err(self.log_fault(pc, None, e)),
        };

        let op = match self.decoder.decode(word, pc) {
            Ok(op) => op,
            Err(e) => return Err(self.log_fault(pc, Some(word), e)),
        };
        if dispatch_syscalls
            && op.mnemonic == Mnemonic::Ecall
            && !self.hooks.has(HookKind::Syscall)
        {
            let e = EmulatorError::UnhandledSyscall { pc };
            return Err(self.log_fault(pc, Some(word), e));
        }

        if self
            .hooks
            .instruction(HookKind::BeforeInstruction, &self.regs, &op)
            == HookAction::Stop
        {
            return Ok(Stepped::StoppedBefore);
        }

        let mut ctx = ExecContext {
            regs: &mut self.regs,
            memory: &mut self.memory,
            hooks: &mut self.hooks,
            strict_alignment: self.config.strict_alignment,
            record: &mut record,
        };
        let outcome = execute(&op, pc, &mut ctx);
        let next = match &outcome {
            StepOutcome::Next(next) => *next,
            StepOutcome::Halt | StepOutcome::Syscall => {
                pc.wrapping_add(op.len as u64) & self.profile.xlen().mask()
            }
            StepOutcome::Fault(_) => pc,
        };
        if let StepOutcome::Fault(e) = outcome {
            return Err(self.log_fault(pc, Some(word), e));
        }

        self.regs.set_pc(next);
        self.instruction_count += 1;
        trace!(pc = format_args!("0x{pc:08x}"), "{}", op);
        self.log_instruction(pc, &op, record.reg_write, record.mem_accesses, next);

        let after = self
            .hooks
            .instruction(HookKind::AfterInstruction, &self.regs, &op);
        let stop = record.stop_requested || after == HookAction::Stop;

        Ok(match outcome {
            StepOutcome::Halt => Stepped::Breakpoint,
            StepOutcome::Syscall => Stepped::Syscall {
                info: self.syscall_info(pc),
                stop,
            },
            _ => Stepped::Retired { stop },
        })
    }

    fn log_instruction(
        &mut self,
        pc: u64,
        op: &Operation,
        reg_write: Option<RegWrite>,
        mem_accesses: Vec<MemoryAccess>,
        next: u64,
    ) {
        match self.config.log_level {
            LogLevel::None | LogLevel::Errors => {}
            level @ (LogLevel::Instructions | LogLevel::Verbose) => {
                let sequential = pc.wrapping_add(op.len as u64) & self.profile.xlen().mask();
                self.logs.push(InstLog {
                    cycle: self.instruction_count,
                    pc,
                    instruction: op.word,
                    disassembly: op.to_string(),
                    reg_write,
                    mem_accesses: if level == LogLevel::Verbose {
                        mem_accesses
                    } else {
                        Vec::new()
                    },
                    jump_target: (next != sequential).then_some(next),
                    fault: None,
                });
            }
        }
    }

    /// Record a fault in the log and pass the error through.
    fn log_fault(&mut self, pc: u64, word: Option<u32>, error: EmulatorError) -> EmulatorError {
        warn!(pc = format_args!("0x{pc:08x}"), %error, "fault");
        if self.config.log_level != LogLevel::None {
            let disassembly = match word {
                Some(word) => self
                    .decoder
                    .decode(word, pc)
                    .map(|op| op.to_string())
                    .unwrap_or_else(|_| format!(".word 0x{:08x}", word)),
                None => String::from("<fetch failed>"),
            };
            self.logs.push(InstLog {
                cycle: self.instruction_count + 1,
                pc,
                instruction: word.unwrap_or(0),
                disassembly,
                reg_write: None,
                mem_accesses: Vec::new(),
                jump_target: None,
                fault: Some(error.to_string()),
            });
        }
        error
    }

    /// Execute a single instruction.
    ///
    /// ECALLs are returned to the caller rather than dispatched to syscall
    /// hooks.
    pub fn step(&mut self) -> Result<StepResult> {
        Ok(match self.step_inner(false)? {
            Stepped::Syscall { info, .. } => StepResult::Syscall(info),
            Stepped::Retired { stop: false } => StepResult::Continue,
            Stepped::Retired { stop: true } | Stepped::Breakpoint | Stepped::StoppedBefore => {
                StepResult::Halted
            }
        })
    }

    /// Run from `begin` until the PC reaches `end` or another halt condition.
    ///
    /// An `end` of zero never matches, and zero `instruction_limit` or
    /// `time_limit` means unbounded.
    pub fn run(
        &mut self,
        begin: u64,
        end: u64,
        instruction_limit: u64,
        time_limit: Duration,
    ) -> RunResult {
        self.regs.set_pc(begin);
        self.stop.clear();
        self.state = EngineState::Running;
        let deadline = if time_limit.is_zero() {
            None
        } else {
            Instant::now().checked_add(time_limit)
        };
        debug!(
            begin = format_args!("0x{begin:x}"),
            end = format_args!("0x{end:x}"),
            instruction_limit,
            ?time_limit,
            "run"
        );

        let mut executed = 0u64;
        let mut error = None;
        let reason = loop {
            let pc = self.regs.pc();
            if end != 0 && pc >= end {
                break HaltReason::Normal;
            }
            if self.stop.is_stop_requested() {
                break HaltReason::Normal;
            }
            if instruction_limit != 0 && executed >= instruction_limit {
                break HaltReason::InstructionLimitReached;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break HaltReason::TimeLimitReached;
            }

            let stop = match self.step_inner(true) {
                Ok(Stepped::StoppedBefore) => break HaltReason::Normal,
                Ok(Stepped::Retired { stop }) => {
                    executed += 1;
                    stop
                }
                Ok(Stepped::Breakpoint) => {
                    executed += 1;
                    break HaltReason::Normal;
                }
                Ok(Stepped::Syscall { info, stop }) => {
                    executed += 1;
                    let action = self.hooks.syscall(&mut self.regs, &info);
                    stop || action == Some(HookAction::Stop)
                }
                Err(e) => {
                    error = Some(e);
                    break HaltReason::Fault;
                }
            };
            if stop {
                break HaltReason::Normal;
            }
        };

        self.state = EngineState::Halted(reason);
        let pc = self.regs.pc();
        debug!(?reason, executed, pc = format_args!("0x{pc:x}"), "run finished");
        RunResult {
            reason,
            instructions: executed,
            pc,
            error,
        }
    }

    /// Run until EBREAK is encountered, returning the value in a0.
    ///
    /// ECALLs go to syscall hooks; without one they are an error.
    pub fn run_until_ebreak(&mut self) -> Result<u64> {
        for _ in 0..self.config.max_instructions {
            match self.step_inner(true)? {
                Stepped::Breakpoint | Stepped::StoppedBefore => {
                    return Ok(self.regs.x(Gpr::A0));
                }
                Stepped::Retired { stop } => {
                    if stop {
                        return Ok(self.regs.x(Gpr::A0));
                    }
                }
                Stepped::Syscall { info, stop } => {
                    let action = self.hooks.syscall(&mut self.regs, &info);
                    if stop || action == Some(HookAction::Stop) {
                        return Ok(self.regs.x(Gpr::A0));
                    }
                }
            }
        }
        Err(EmulatorError::InstructionLimitExceeded {
            limit: self.config.max_instructions,
            pc: self.regs.pc(),
        })
    }

    /// Run until ECALL is encountered, returning syscall information.
    ///
    /// A hook stop before an ECALL is reached ends the run with
    /// [`EmulatorError::StoppedByHook`].
    pub fn run_until_ecall(&mut self) -> Result<SyscallInfo> {
        for _ in 0..self.config.max_instructions {
            match self.step_inner(false)? {
                Stepped::Syscall { info, .. } => return Ok(info),
                Stepped::Breakpoint => {
                    return Err(EmulatorError::UnexpectedBreakpoint {
                        pc: self.regs.pc().wrapping_sub(4) & self.profile.xlen().mask(),
                    });
                }
                Stepped::Retired { stop: false } => {}
                Stepped::Retired { stop: true } | Stepped::StoppedBefore => {
                    return Err(EmulatorError::StoppedByHook { pc: self.regs.pc() });
                }
            }
        }
        Err(EmulatorError::InstructionLimitExceeded {
            limit: self.config.max_instructions,
            pc: self.regs.pc(),
        })
    }

    // Diagnostics

    /// Get captured log entries, oldest first.
    pub fn logs(&self) -> impl DoubleEndedIterator<Item = &InstLog> + ExactSizeIterator {
        self.logs.iter()
    }

    /// Format all captured logs as a string.
    pub fn format_logs(&self) -> String {
        let mut result = String::new();
        for log in self.logs.iter() {
            let _ = writeln!(result, "{}", log);
        }
        result
    }

    /// Clear captured log messages.
    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    /// Disassemble `count` instructions starting at `address`.
    ///
    /// Reads through host access, so execute-only regions can be listed.
    pub fn disassemble(&self, address: u64, count: usize) -> Result<Vec<(u64, u32, String)>> {
        let mut lines = Vec::with_capacity(count);
        for i in 0..count as u64 {
            let pc = address.wrapping_add(i * 4);
            let mut bytes = [0u8; 4];
            self.memory.peek(pc, &mut bytes)?;
            let word = u32::from_le_bytes(bytes);
            let text = match self.decoder.decode(word, pc) {
                Ok(op) => op.to_string(),
                Err(_) => format!(".word 0x{:08x}", word),
            };
            lines.push((pc, word, text));
        }
        Ok(lines)
    }

    /// Dump the current emulator state as a human-readable string.
    pub fn dump_state(&self) -> String {
        let width = (self.profile.xlen().bits() / 4) as usize;
        let mut result = String::new();
        let _ = writeln!(result, "PC: 0x{:0width$x}", self.regs.pc(), width = width);
        let _ = writeln!(result, "Instructions executed: {}", self.instruction_count);
        let _ = writeln!(result, "State: {:?}", self.state);
        result.push_str("\nRegisters:\n");

        for num in 0..self.profile.register_count() {
            let reg = Gpr::new(num);
            let value = self.regs.x(reg);
            if value != 0 || reg == Gpr::ZERO {
                let _ = writeln!(
                    result,
                    "  {} (x{}) = 0x{:0width$x} ({})",
                    reg,
                    num,
                    value,
                    self.profile.xlen().signed(value),
                    width = width
                );
            }
        }
        result
    }

    /// Format debug information including disassembly and execution logs.
    ///
    /// # Arguments
    ///
    /// * `highlight_pc` - Optional PC to highlight in disassembly (for errors)
    /// * `log_count` - Number of recent logs to show
    pub fn format_debug_info(&self, highlight_pc: Option<u64>, log_count: usize) -> String {
        let mut result = String::new();
        let center = highlight_pc.unwrap_or_else(|| self.regs.pc());

        // Show up to ten instructions either side, clipped to the region.
        result.push_str("Disassembly:\n");
        let region = self
            .memory
            .regions()
            .find(|r| center >= r.base && center - r.base < r.length);
        match region {
            Some(region) => {
                let start = center.saturating_sub(40).max(region.base) & !3;
                let end = center.saturating_add(44).min(region.base + region.length);
                let count = (end.saturating_sub(start) / 4) as usize;
                if let Ok(lines) = self.disassemble(start, count) {
                    if start > region.base {
                        result.push_str("  ...\n");
                    }
                    for (pc, _word, text) in lines {
                        let marker = if Some(pc) == highlight_pc { ">>> " } else { "    " };
                        let _ = writeln!(result, "{}0x{:08x}: {}", marker, pc, text);
                    }
                    if end < region.base + region.length {
                        result.push_str("  ...\n");
                    }
                }
            }
            None => {
                let _ = writeln!(result, "  <0x{:08x} is not mapped>", center);
            }
        }

        // Show logs
        if self.logs.iter().len() > 0 {
            result.push_str("\nLast execution logs:\n");
            let skip = self.logs.iter().len().saturating_sub(log_count);
            for log in self.logs.iter().skip(skip) {
                let _ = writeln!(result, "{}", log);
            }
        }

        result
    }
}
