use log::trace;

use super::Ram;

use crate::error::SimError;
use crate::io::{InterruptController, IoCompletion};

pub(crate) const NUM_REGS: usize = 9;
pub(crate) const NUM_GEN_REGS: usize = 5;
/// Words per instruction: opcode plus three arguments.
pub(crate) const INSTR_SIZE: usize = 4;

pub(crate) type Registers = [i32; NUM_REGS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    Pc = 5,
    Sp = 6,
    Base = 7,
    Lim = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opcode {
    Set = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Copy = 5,
    Branch = 6,
    Bne = 7,
    Blt = 8,
    Pop = 9,
    Push = 10,
    Load = 11,
    Save = 12,
    Trap = 15,
}

const OPCODES: [(Opcode, &str); 14] = [
    (Opcode::Set, "SET"),
    (Opcode::Add, "ADD"),
    (Opcode::Sub, "SUB"),
    (Opcode::Mul, "MUL"),
    (Opcode::Div, "DIV"),
    (Opcode::Copy, "COPY"),
    (Opcode::Branch, "BRANCH"),
    (Opcode::Bne, "BNE"),
    (Opcode::Blt, "BLT"),
    (Opcode::Pop, "POP"),
    (Opcode::Push, "PUSH"),
    (Opcode::Load, "LOAD"),
    (Opcode::Save, "SAVE"),
    (Opcode::Trap, "TRAP"),
];

impl Opcode {
    pub fn from_word(word: i32) -> Option<Opcode> {
        OPCODES.iter().find(|(op, _)| *op as i32 == word).map(|(op, _)| *op)
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        OPCODES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(mnemonic))
            .map(|(op, _)| *op)
    }

    pub fn mnemonic(self) -> &'static str {
        OPCODES.iter().find(|(op, _)| *op == self).map_or("??", |(_, name)| name)
    }
}

/// Every event the CPU raises into the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    SystemCall,
    Clock,
    IoReadComplete { device: i32, addr: i32, data: i32 },
    IoWriteComplete { device: i32, addr: i32 },
    IllegalMemoryAccess { addr: i32 },
    DivideByZero,
    IllegalInstruction { instr: [i32; INSTR_SIZE] },
}

impl From<IoCompletion> for Interrupt {
    fn from(completion: IoCompletion) -> Self {
        match completion {
            IoCompletion::Read { device, addr, data } => Interrupt::IoReadComplete { device, addr, data },
            IoCompletion::Write { device, addr } => Interrupt::IoWriteComplete { device, addr },
        }
    }
}

/// What the CPU should do after the OS handled an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Shutdown,
}

/// Implemented by the operating system so the CPU can hand it traps and
/// interrupts. Fatal conditions come back as `Err`.
pub(crate) trait TrapHandler {
    fn system_call(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError>;
    fn interrupt_clock(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError>;
    fn interrupt_io_read_complete(&mut self, cpu: &mut Cpu, device: i32, addr: i32, data: i32) -> Result<Flow, SimError>;
    fn interrupt_io_write_complete(&mut self, cpu: &mut Cpu, device: i32, addr: i32) -> Result<Flow, SimError>;
    fn interrupt_illegal_memory_access(&mut self, cpu: &mut Cpu, addr: i32) -> Result<Flow, SimError>;
    fn interrupt_divide_by_zero(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError>;
    fn interrupt_illegal_instruction(&mut self, cpu: &mut Cpu, instr: [i32; INSTR_SIZE]) -> Result<Flow, SimError>;

    fn dispatch(&mut self, cpu: &mut Cpu, interrupt: Interrupt) -> Result<Flow, SimError> {
        match interrupt {
            Interrupt::SystemCall => self.system_call(cpu),
            Interrupt::Clock => self.interrupt_clock(cpu),
            Interrupt::IoReadComplete { device, addr, data } => self.interrupt_io_read_complete(cpu, device, addr, data),
            Interrupt::IoWriteComplete { device, addr } => self.interrupt_io_write_complete(cpu, device, addr),
            Interrupt::IllegalMemoryAccess { addr } => self.interrupt_illegal_memory_access(cpu, addr),
            Interrupt::DivideByZero => self.interrupt_divide_by_zero(cpu),
            Interrupt::IllegalInstruction { instr } => self.interrupt_illegal_instruction(cpu, instr),
        }
    }
}

pub(crate) struct Cpu {
    registers: Registers,
    ram: Ram,
    ticks: u64,
    instructions: u64,
    clock_freq: u64,
    instruction_budget: Option<u64>,
    verbose: bool,
}

impl Cpu {
    pub fn new(ram: Ram, clock_freq: u64) -> Cpu {
        Cpu {
            registers: [0; NUM_REGS],
            ram,
            ticks: 0,
            instructions: 0,
            clock_freq: clock_freq.max(1),
            instruction_budget: None,
            verbose: false,
        }
    }

    pub fn with_instruction_budget(mut self, budget: Option<u64>) -> Cpu {
        self.instruction_budget = budget;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Cpu {
        self.verbose = verbose;
        self
    }

    pub fn reg(&self, reg: Register) -> i32 {
        self.registers[reg as usize]
    }

    pub fn set_reg(&mut self, reg: Register, value: i32) {
        self.registers[reg as usize] = value;
    }

    pub fn pc(&self) -> i32 {
        self.reg(Register::Pc)
    }

    pub fn sp(&self) -> i32 {
        self.reg(Register::Sp)
    }

    pub fn base(&self) -> i32 {
        self.reg(Register::Base)
    }

    pub fn lim(&self) -> i32 {
        self.reg(Register::Lim)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn set_registers(&mut self, registers: &Registers) {
        self.registers.copy_from_slice(registers);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn add_ticks(&mut self, ticks: u64) {
        self.ticks += ticks;
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    #[cfg(test)]
    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    pub fn reg_dump(&self) -> String {
        let mut out = String::new();
        for i in 0..NUM_GEN_REGS {
            out.push_str(&format!("r{}={} ", i, self.registers[i]));
        }
        out.push_str(&format!(
            "PC={} SP={} BASE={} LIM={}",
            self.pc(),
            self.sp(),
            self.base(),
            self.lim()
        ));
        out
    }

    /// `BASE <= addr <= LIM`, and inside physical RAM.
    pub fn check_access(&self, addr: i32) -> Result<usize, Interrupt> {
        let in_window = addr >= self.base() && addr <= self.lim();
        let physical = usize::try_from(addr).ok().filter(|&a| a < self.ram.size());

        match physical {
            Some(address) if in_window => Ok(address),
            _ => Err(Interrupt::IllegalMemoryAccess { addr }),
        }
    }

    pub fn push(&mut self, value: i32) -> Result<(), SimError> {
        self.try_push(value).map_err(fault_to_error)
    }

    pub fn pop(&mut self) -> Result<i32, SimError> {
        self.try_pop().map_err(fault_to_error)
    }

    fn try_push(&mut self, value: i32) -> Result<(), Interrupt> {
        let sp = self.sp().wrapping_sub(1);
        let address = self.check_access(sp)?;
        self.set_reg(Register::Sp, sp);
        self.ram.write(address, value);
        Ok(())
    }

    fn try_pop(&mut self) -> Result<i32, Interrupt> {
        let sp = self.sp();
        let address = self.check_access(sp)?;
        self.set_reg(Register::Sp, sp.wrapping_add(1));
        Ok(self.ram.read(address))
    }

    /// Runs until the handler asks for a shutdown, the instruction budget is
    /// spent, or a fatal trap occurs.
    pub fn run(&mut self, handler: &mut dyn TrapHandler, ic: &mut InterruptController) -> Result<(), SimError> {
        loop {
            if self.instruction_budget.is_some_and(|budget| self.instructions >= budget) {
                return Ok(());
            }

            ic.tick();
            if let Some(completion) = ic.take() {
                if handler.dispatch(self, completion.into())? == Flow::Shutdown {
                    return Ok(());
                }
            }

            if let Some(interrupt) = self.step() {
                if handler.dispatch(self, interrupt)? == Flow::Shutdown {
                    return Ok(());
                }
            }

            if self.instructions % self.clock_freq == 0 && handler.dispatch(self, Interrupt::Clock)? == Flow::Shutdown {
                return Ok(());
            }
        }
    }

    /// Fetches and executes one instruction, returning the trap or fault it
    /// raised, if any.
    pub fn step(&mut self) -> Option<Interrupt> {
        let interrupt = self.cycle().err();
        self.ticks += 1;
        self.instructions += 1;
        interrupt
    }

    fn cycle(&mut self) -> Result<(), Interrupt> {
        let pc = self.pc();
        let address = self.check_access(pc)?;
        let instr = self.ram.fetch(address);

        let next_pc = pc.wrapping_add(INSTR_SIZE as i32);
        self.check_access(next_pc)?;
        self.set_reg(Register::Pc, next_pc);

        if self.verbose {
            trace!("{}", self.reg_dump());
            trace!("{}", Cpu::format_instruction(&instr));
        }

        let opcode = Cpu::decode(&instr)?;
        self.execute(opcode, &instr)
    }

    fn decode(instr: &[i32; INSTR_SIZE]) -> Result<Opcode, Interrupt> {
        let illegal = Interrupt::IllegalInstruction { instr: *instr };
        let opcode = Opcode::from_word(instr[0]).ok_or(illegal)?;

        let register_args = match opcode {
            Opcode::Set | Opcode::Push | Opcode::Pop => 1,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => 3,
            Opcode::Copy | Opcode::Load | Opcode::Save | Opcode::Bne | Opcode::Blt => 2,
            Opcode::Branch | Opcode::Trap => 0,
        };

        let all_general = instr[1..=register_args]
            .iter()
            .all(|&reg| (0..NUM_GEN_REGS as i32).contains(&reg));
        if !all_general {
            return Err(illegal);
        }

        Ok(opcode)
    }

    fn execute(&mut self, opcode: Opcode, instr: &[i32; INSTR_SIZE]) -> Result<(), Interrupt> {
        match opcode {
            Opcode::Set | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Copy => {
                self.execute_arithmetic(opcode, instr)
            },
            Opcode::Branch | Opcode::Bne | Opcode::Blt => self.execute_branch(opcode, instr),
            Opcode::Pop => {
                let value = self.try_pop()?;
                self.set_gen(instr[1], value);
                Ok(())
            },
            Opcode::Push => self.try_push(self.gen(instr[1])),
            Opcode::Load => {
                let address = self.check_access(self.gen(instr[2]).wrapping_add(self.base()))?;
                let value = self.ram.read(address);
                self.set_gen(instr[1], value);
                Ok(())
            },
            Opcode::Save => {
                let address = self.check_access(self.gen(instr[2]).wrapping_add(self.base()))?;
                self.ram.write(address, self.gen(instr[1]));
                Ok(())
            },
            Opcode::Trap => Err(Interrupt::SystemCall),
        }
    }

    fn execute_arithmetic(&mut self, opcode: Opcode, instr: &[i32; INSTR_SIZE]) -> Result<(), Interrupt> {
        let value = match opcode {
            Opcode::Set => instr[2],
            Opcode::Add => self.gen(instr[2]).wrapping_add(self.gen(instr[3])),
            Opcode::Sub => self.gen(instr[2]).wrapping_sub(self.gen(instr[3])),
            Opcode::Mul => self.gen(instr[2]).wrapping_mul(self.gen(instr[3])),
            Opcode::Div => {
                let divisor = self.gen(instr[3]);
                if divisor == 0 {
                    return Err(Interrupt::DivideByZero);
                }
                self.gen(instr[2]).wrapping_div(divisor)
            },
            Opcode::Copy => self.gen(instr[2]),
            _ => return Err(Interrupt::IllegalInstruction { instr: *instr }),
        };

        self.set_gen(instr[1], value);
        Ok(())
    }

    fn execute_branch(&mut self, opcode: Opcode, instr: &[i32; INSTR_SIZE]) -> Result<(), Interrupt> {
        let (taken, target) = match opcode {
            Opcode::Branch => (true, instr[1]),
            Opcode::Bne => (self.gen(instr[1]) != self.gen(instr[2]), instr[3]),
            Opcode::Blt => (self.gen(instr[1]) < self.gen(instr[2]), instr[3]),
            _ => return Err(Interrupt::IllegalInstruction { instr: *instr }),
        };

        if taken {
            let destination = target.wrapping_add(self.base());
            self.check_access(destination)?;
            self.set_reg(Register::Pc, destination);
        }
        Ok(())
    }

    // Operands are validated by decode, so indexes are always R0..R4.
    fn gen(&self, reg_num: i32) -> i32 {
        self.registers[reg_num as usize]
    }

    fn set_gen(&mut self, reg_num: i32, value: i32) {
        self.registers[reg_num as usize] = value;
    }

    pub fn format_instruction(instr: &[i32; INSTR_SIZE]) -> String {
        let Some(opcode) = Opcode::from_word(instr[0]) else {
            return "?? ".to_string();
        };
        let name = opcode.mnemonic();

        match opcode {
            Opcode::Set => format!("{} R{} = {}", name, instr[1], instr[2]),
            Opcode::Add => format!("{} R{} = R{} + R{}", name, instr[1], instr[2], instr[3]),
            Opcode::Sub => format!("{} R{} = R{} - R{}", name, instr[1], instr[2], instr[3]),
            Opcode::Mul => format!("{} R{} = R{} * R{}", name, instr[1], instr[2], instr[3]),
            Opcode::Div => format!("{} R{} = R{} / R{}", name, instr[1], instr[2], instr[3]),
            Opcode::Copy => format!("{} R{} = R{}", name, instr[1], instr[2]),
            Opcode::Branch => format!("{} @{}", name, instr[1]),
            Opcode::Bne => format!("{} (R{} != R{}) @{}", name, instr[1], instr[2], instr[3]),
            Opcode::Blt => format!("{} (R{} < R{}) @{}", name, instr[1], instr[2], instr[3]),
            Opcode::Pop | Opcode::Push => format!("{} R{}", name, instr[1]),
            Opcode::Load => format!("{} R{} <-- @R{}", name, instr[1], instr[2]),
            Opcode::Save => format!("{} R{} --> @R{}", name, instr[1], instr[2]),
            Opcode::Trap => name.to_string(),
        }
    }
}

fn fault_to_error(interrupt: Interrupt) -> SimError {
    match interrupt {
        Interrupt::IllegalMemoryAccess { addr } => SimError::IllegalMemoryAccess { addr },
        Interrupt::DivideByZero => SimError::DivideByZero,
        Interrupt::IllegalInstruction { instr } => SimError::IllegalInstruction { instr },
        // Stack accesses only ever fault on memory.
        _ => SimError::IllegalMemoryAccess { addr: -1 },
    }
}
