use std::fmt;

use super::allocator::MemBlock;
use super::blocking::BlockedOn;
use super::cpu::{Cpu, Register, Registers, NUM_GEN_REGS, NUM_REGS};

use crate::error::SimError;
use crate::kernel::Ram;

pub(crate) type Pid = i32;

/// Reserved id of the synthetic idle process.
pub(crate) const IDLE_PID: Pid = 999;
pub(crate) const FIRST_PID: Pid = 1001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProcessState {
    Ready,
    Running,
    Blocked,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Ready => write!(f, "READY"),
            ProcessState::Running => write!(f, "RUNNING"),
            ProcessState::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Ready-to-running latency of a process, in ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StarveStats {
    pub last_ready_time: i64,
    pub times_ready: u32,
    pub max_starve: i64,
    pub avg_starve: f64,
}

impl Default for StarveStats {
    fn default() -> Self {
        StarveStats {
            last_ready_time: -1,
            times_ready: 0,
            max_starve: -1,
            avg_starve: 0.0,
        }
    }
}

impl StarveStats {
    fn entered_ready(&mut self, now: i64) {
        self.times_ready += 1;
        self.last_ready_time = now;
    }

    fn entered_running(&mut self, now: i64) {
        let starve = now - self.last_ready_time;
        self.max_starve = self.max_starve.max(starve);

        if self.times_ready == 0 {
            return;
        }
        let n = self.times_ready as f64;
        self.avg_starve = self.avg_starve * (n - 1.0) / n + starve as f64 / n;
    }
}

pub(crate) struct ProcessControlBlock {
    pub stats: StarveStats,

    id: Pid,
    registers: Registers,
    mem_block: MemBlock,
    blocked_on: Option<BlockedOn>,
}

impl ProcessControlBlock {
    /// A fresh process owning `mem_block`, with registers set up to start at
    /// the beginning of the block and an empty stack at its limit.
    pub fn new(id: Pid, mem_block: MemBlock) -> ProcessControlBlock {
        let start = mem_block.start as i32;
        let end = (mem_block.start + mem_block.size) as i32;

        let mut registers = [0; NUM_REGS];
        registers[Register::Pc as usize] = start;
        registers[Register::Base as usize] = start;
        registers[Register::Lim as usize] = end;
        registers[Register::Sp as usize] = end;

        ProcessControlBlock {
            stats: StarveStats::default(),
            id,
            registers,
            mem_block,
            blocked_on: None,
        }
    }

    pub fn with_registers(mut self, registers: Registers) -> ProcessControlBlock {
        self.registers = registers;
        self
    }

    pub fn id(&self) -> Pid {
        self.id
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn register(&self, reg: Register) -> i32 {
        self.registers[reg as usize]
    }

    pub fn mem_block(&self) -> MemBlock {
        self.mem_block
    }

    pub fn state(&self, current: Option<Pid>) -> ProcessState {
        if self.blocked_on.is_some() {
            ProcessState::Blocked
        } else if current == Some(self.id) {
            ProcessState::Running
        } else {
            ProcessState::Ready
        }
    }

    /// Context-switch save: copies the CPU registers and marks the process
    /// ready as of now.
    pub fn save(&mut self, cpu: &mut Cpu, cost: u64) {
        cpu.add_ticks(cost);
        self.registers = *cpu.registers();
        self.stats.entered_ready(cpu.ticks() as i64);
    }

    /// Context-switch restore: loads the saved registers and records how long
    /// the process waited.
    pub fn restore(&mut self, cpu: &mut Cpu, cost: u64) {
        cpu.add_ticks(cost);
        cpu.set_registers(&self.registers);
        self.stats.entered_running(cpu.ticks() as i64);
    }

    /// Copies the CPU registers without counting a state change.
    pub fn snapshot(&mut self, cpu: &Cpu) {
        self.registers = *cpu.registers();
    }

    pub fn block(&mut self, blocked_on: BlockedOn) {
        self.blocked_on = Some(blocked_on);
    }

    pub fn unblock(&mut self, now: i64) {
        self.blocked_on = None;
        self.stats.last_ready_time = now;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_on.is_some()
    }

    pub fn blocked_on(&self) -> Option<BlockedOn> {
        self.blocked_on
    }

    /// Moves the saved address space to `new_start`, shifting every register
    /// that holds an address by the same amount.
    pub fn relocate(&mut self, new_start: usize) {
        let delta = new_start as i32 - self.mem_block.start as i32;
        for reg in [Register::Base, Register::Lim, Register::Sp, Register::Pc] {
            self.registers[reg as usize] += delta;
        }
        self.mem_block.start = new_start;
    }

    /// Pushes onto the saved stack of a process that is not on the CPU.
    pub fn push_saved(&mut self, ram: &mut Ram, value: i32) -> Result<(), SimError> {
        let sp = self.register(Register::Sp) - 1;
        let in_window = sp >= self.register(Register::Base) && sp <= self.register(Register::Lim);

        match usize::try_from(sp) {
            Ok(address) if in_window && address < ram.size() => {
                ram.write(address, value);
                self.registers[Register::Sp as usize] = sp;
                Ok(())
            },
            _ => Err(SimError::IllegalMemoryAccess { addr: sp }),
        }
    }

    pub fn describe(&self, current: Option<Pid>) -> String {
        let mut out = format!("Process id {} is {}", self.id, self.state(current));
        if let Some(block) = self.blocked_on {
            out.push_str(&format!(" for {}", block));
        }
        out.push_str(": ");

        for i in 0..NUM_GEN_REGS {
            out.push_str(&format!("r{}={} ", i, self.registers[i]));
        }
        out.push_str(&format!(
            "PC={} SP={} BASE={} LIM={}\n\t\t\t Max Starve Time: {} Avg Starve Time: {:.2}",
            self.register(Register::Pc),
            self.register(Register::Sp),
            self.register(Register::Base),
            self.register(Register::Lim),
            self.stats.max_starve,
            self.stats.avg_starve,
        ));
        out
    }
}
