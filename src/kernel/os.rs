use log::{debug, error, info, warn};

use super::allocator::{Allocator, MemBlock};
use super::blocking::{find_waiter, IoOperation};
use super::cpu::{Cpu, Flow, Register, TrapHandler, INSTR_SIZE};
use super::device_table::DeviceTable;
use super::process_control_block::{Pid, StarveStats, FIRST_PID, IDLE_PID};
use super::syscall::{ErrorCode, SyscallKind};
use super::{LongTermScheduler, ProcessControlBlock, ProcessTable, ShortTermScheduler};

use crate::config::KernelConfig;
use crate::error::SimError;
use crate::io::{DeviceId, Program, SharedDevice};

/// `SET r0 0; SET r0 0; PUSH r0; TRAP`, i.e. exit straight away.
const IDLE_PROGRAM: [[i32; INSTR_SIZE]; 4] = [[0, 0, 0, 0], [0, 0, 0, 0], [10, 0, 0, 0], [15, 0, 0, 0]];
const IDLE_STACK_SLACK: usize = 10;
const IDLE_ALLOC_SLACK: usize = 20;

/// Starvation figures of one process, kept after it exits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProcessStats {
    pub id: Pid,
    pub stats: StarveStats,
}

/// The privileged layer. Owns the process table, free list and device
/// registry; the CPU hands it every trap and interrupt.
pub(crate) struct OperatingSystem {
    pub(super) config: KernelConfig,
    pub(super) processes: ProcessTable,
    pub(super) current: Option<Pid>,
    pub(super) allocator: Allocator,
    pub(super) devices: DeviceTable,
    pub(super) lts: LongTermScheduler,
    sts: ShortTermScheduler,
    next_pid: Pid,
    finished: Vec<ProcessStats>,
}

impl OperatingSystem {
    pub fn new(config: KernelConfig) -> OperatingSystem {
        let reserved = config.reserved.min(config.ram_size);

        OperatingSystem {
            allocator: Allocator::new(reserved, config.ram_size),
            processes: ProcessTable::new(),
            current: None,
            devices: DeviceTable::new(),
            lts: LongTermScheduler::new(config.seed),
            sts: ShortTermScheduler::new(config.switch_bonus),
            next_pid: FIRST_PID,
            finished: Vec::new(),
            config,
        }
    }

    pub fn register_device(&mut self, device: SharedDevice) {
        self.devices.register(device);
    }

    pub fn add_program(&mut self, program: Program) {
        self.lts.add_program(program);
    }

    pub fn programs(&self) -> &[Program] {
        self.lts.programs()
    }

    /// Starvation figures of every process that ran, finished ones first,
    /// then the ones still alive. The idle process is left out.
    pub fn run_stats(&self) -> Vec<ProcessStats> {
        let alive = self
            .processes
            .iter()
            .filter(|pcb| pcb.id() != IDLE_PID)
            .map(|pcb| ProcessStats { id: pcb.id(), stats: pcb.stats });

        self.finished.iter().copied().chain(alive).collect()
    }

    /// Loads `program` into a fresh block of `alloc_size` words and makes it
    /// the running process. Returns `false`, leaving the caller running, when
    /// it does not fit.
    pub fn create_process(&mut self, cpu: &mut Cpu, program: &Program, alloc_size: usize) -> bool {
        if program.size() > alloc_size {
            warn!(
                "Program {} ({} words) does not fit an allocation of {} words",
                program.name,
                program.size(),
                alloc_size
            );
            return false;
        }

        let Some(start) = self.alloc_block(cpu, alloc_size) else {
            warn!("Not enough RAM to load program {} ({} words)", program.name, alloc_size);
            return false;
        };

        let pid = self.next_pid;
        self.next_pid += 1;
        let pcb = ProcessControlBlock::new(pid, MemBlock::new(start, alloc_size));
        self.install(cpu, pcb, &program.data);

        info!(
            "Installed program {} ({} instructions) of size {} with process id {} at position {}",
            program.name,
            program.instruction_count(),
            alloc_size,
            pid,
            start
        );
        true
    }

    /// Installs the idle process as the running process. Fails only when not
    /// even its few words can be placed.
    pub fn create_idle_process(&mut self, cpu: &mut Cpu) -> Result<(), SimError> {
        let image: Vec<i32> = IDLE_PROGRAM.iter().flatten().copied().collect();
        let alloc_size = image.len() + IDLE_ALLOC_SLACK;

        let start = self
            .alloc_block(cpu, alloc_size)
            .ok_or(SimError::OutOfMemory { requested: alloc_size })?;

        let pcb = ProcessControlBlock::new(IDLE_PID, MemBlock::new(start, alloc_size));
        let mut registers = *pcb.registers();
        registers[Register::Sp as usize] = (start + image.len() + IDLE_STACK_SLACK) as i32;
        self.install(cpu, pcb.with_registers(registers), &image);

        debug!("Installed idle process at position {}", start);
        Ok(())
    }

    /// Context switch into a brand new process whose image goes to the start
    /// of its block.
    fn install(&mut self, cpu: &mut Cpu, pcb: ProcessControlBlock, image: &[i32]) {
        self.save_current(cpu);

        cpu.ram_mut().write_block_to(pcb.mem_block().start, image);
        cpu.set_registers(pcb.registers());

        self.current = Some(pcb.id());
        self.processes.insert(pcb);
    }

    fn save_current(&mut self, cpu: &mut Cpu) {
        let cost = self.config.switch_ticks;
        if let Some(pcb) = self.current.and_then(|pid| self.processes.get_mut(pid)) {
            pcb.save(cpu, cost);
        }
    }

    /// Picks the next process and switches to it. Ends the run once the
    /// process table is empty.
    pub fn schedule_next(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        if self.processes.is_empty() {
            info!("No more processes to run. Stopping.");
            return Ok(Flow::Shutdown);
        }

        match self.sts.select_next(&self.processes, self.current) {
            None => self.create_idle_process(cpu)?,
            Some(pid) if Some(pid) == self.current => {},
            Some(pid) => {
                self.save_current(cpu);
                self.current = Some(pid);

                let cost = self.config.switch_ticks;
                if let Some(pcb) = self.processes.get_mut(pid) {
                    pcb.restore(cpu, cost);
                }
                debug!("Switched to process {}", pid);
            },
        }

        Ok(Flow::Continue)
    }

    /// Removes the running process, returns its memory and devices, and
    /// schedules a successor.
    pub fn remove_current(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        debug!("{}", self.processes.dump(self.current));

        let Some(pid) = self.current.take() else {
            return self.schedule_next(cpu);
        };
        info!("Removing process with process id {} at {}", pid, cpu.base());

        if let Some(pcb) = self.processes.remove(pid) {
            if pid != IDLE_PID {
                self.finished.push(ProcessStats { id: pid, stats: pcb.stats });
            }
            self.release_devices(cpu, pid);
            self.free_block(cpu, pcb.mem_block());
        }

        self.schedule_next(cpu)
    }

    fn release_devices(&mut self, cpu: &Cpu, pid: Pid) {
        for device in self.devices.release_all(pid) {
            if let Some(waiter) = find_waiter(&self.processes, device, IoOperation::Open, -1) {
                debug!("Process {} released device {}, waking process {}", pid, device, waiter);
                self.unblock(cpu, waiter);
            }
        }
    }

    pub(super) fn unblock(&mut self, cpu: &Cpu, pid: Pid) {
        if let Some(pcb) = self.processes.get_mut(pid) {
            pcb.unblock(cpu.ticks() as i64);
            debug!("Unblocked process {}", pid);
        }
    }

    /// Finds room for `size` words, compacting once when the free list has
    /// enough space in total but no single block fits.
    pub(super) fn alloc_block(&mut self, cpu: &mut Cpu, size: usize) -> Option<usize> {
        for attempt in 0..2 {
            if let Some(start) = self.allocator.allocate(size) {
                return Some(start);
            }
            if attempt > 0 || self.allocator.total_free() < size {
                break;
            }
            self.compact(cpu);
        }
        None
    }

    fn free_block(&mut self, cpu: &mut Cpu, block: MemBlock) {
        self.allocator.free(block);
        self.compact(cpu);
        self.allocator.merge();
        debug!("Free memory: {:?}", self.allocator.free_blocks());
    }

    /// Slides every live process down to the bottom of usable RAM, in base
    /// address order, and leaves one free block above them.
    pub(super) fn compact(&mut self, cpu: &mut Cpu) {
        if let Some(pcb) = self.current.and_then(|pid| self.processes.get_mut(pid)) {
            pcb.snapshot(cpu);
        }

        let mut next_start = self.config.reserved.min(self.config.ram_size);
        for pid in self.processes.by_base_address() {
            let Some(pcb) = self.processes.get_mut(pid) else {
                continue;
            };
            let block = pcb.mem_block();

            if block.start != next_start {
                debug!("Relocating process {} from {} to {}", pid, block.start, next_start);
                cpu.ram_mut().relocate(block.start, next_start, block.size);
                pcb.relocate(next_start);
            }
            next_start += block.size;
        }

        self.allocator.reset(next_start, self.config.ram_size);

        if let Some(pcb) = self.current.and_then(|pid| self.processes.get(pid)) {
            cpu.set_registers(pcb.registers());
        }
    }

    /// Pushes onto a process' stack: the live stack when it is on the CPU,
    /// its saved stack otherwise.
    pub(super) fn push_to(&mut self, cpu: &mut Cpu, pid: Pid, value: i32) -> Result<(), SimError> {
        if self.current == Some(pid) {
            return cpu.push(value);
        }

        match self.processes.get_mut(pid) {
            Some(pcb) => pcb.push_saved(cpu.ram_mut(), value),
            None => Ok(()),
        }
    }

    fn complete_io(
        &mut self,
        cpu: &mut Cpu,
        device: DeviceId,
        op: IoOperation,
        addr: i32,
        data: Option<i32>,
    ) -> Result<Flow, SimError> {
        let waiter = if self.devices.contains(device) {
            find_waiter(&self.processes, device, op, addr)
        } else {
            None
        };

        let Some(pid) = waiter else {
            warn!("{:?} completion on device {} @{} has no waiting process", op, device, addr);
            cpu.push(ErrorCode::NoDeviceExists as i32)?;
            return Ok(Flow::Continue);
        };

        self.unblock(cpu, pid);
        if let Some(data) = data {
            self.push_to(cpu, pid, data)?;
        }
        self.push_to(cpu, pid, ErrorCode::Success as i32)?;
        Ok(Flow::Continue)
    }

    fn fatal(&self, cpu: &Cpu, err: SimError) -> Result<Flow, SimError> {
        error!("Process {:?} stopped the machine: {}", self.current, err);
        debug!("{}", cpu.reg_dump());
        Err(err)
    }
}

impl TrapHandler for OperatingSystem {
    fn system_call(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let id = cpu.pop()?;

        match SyscallKind::from_id(id) {
            Some(kind) => self.handle_syscall(cpu, kind),
            None => {
                warn!("Process {:?} made unknown system call {}", self.current, id);
                Ok(Flow::Continue)
            },
        }
    }

    fn interrupt_clock(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        self.schedule_next(cpu)
    }

    fn interrupt_io_read_complete(&mut self, cpu: &mut Cpu, device: i32, addr: i32, data: i32) -> Result<Flow, SimError> {
        self.complete_io(cpu, device, IoOperation::Read, addr, Some(data))
    }

    fn interrupt_io_write_complete(&mut self, cpu: &mut Cpu, device: i32, addr: i32) -> Result<Flow, SimError> {
        self.complete_io(cpu, device, IoOperation::Write, addr, None)
    }

    fn interrupt_illegal_memory_access(&mut self, cpu: &mut Cpu, addr: i32) -> Result<Flow, SimError> {
        self.fatal(cpu, SimError::IllegalMemoryAccess { addr })
    }

    fn interrupt_divide_by_zero(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        self.fatal(cpu, SimError::DivideByZero)
    }

    fn interrupt_illegal_instruction(&mut self, cpu: &mut Cpu, instr: [i32; INSTR_SIZE]) -> Result<Flow, SimError> {
        self.fatal(cpu, SimError::IllegalInstruction { instr })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::io::device::Device;
    use crate::io::{DiskDevice, KeyboardDevice};
    use crate::kernel::blocking::BlockedOn;
    use crate::kernel::long_term_scheduler::Lcg;
    use crate::kernel::process_control_block::ProcessState;
    use crate::kernel::Ram;

    fn kernel(ram_size: usize) -> (OperatingSystem, Cpu) {
        let config = KernelConfig {
            ram_size,
            switch_bonus: 200,
            seed: Some(1),
            ..KernelConfig::default()
        };
        (OperatingSystem::new(config), Cpu::new(Ram::new(ram_size), 5))
    }

    fn program(alloc: usize) -> Program {
        Program::new("p", &[[15, 0, 0, 0]; 4], Some(alloc))
    }

    fn switch_to(os: &mut OperatingSystem, cpu: &mut Cpu, pid: Pid) {
        if let Some(pcb) = os.current.and_then(|current| os.processes.get_mut(current)) {
            pcb.snapshot(cpu);
        }
        os.current = Some(pid);
        cpu.set_registers(os.processes.get(pid).unwrap().registers());
    }

    #[test]
    fn test_os_create_process_installs_registers() {
        let (mut os, mut cpu) = kernel(1000);

        assert!(os.create_process(&mut cpu, &program(100), 100));

        assert_eq!(os.current, Some(FIRST_PID));
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.base(), 0);
        assert_eq!(cpu.lim(), 100);
        assert_eq!(cpu.sp(), 100);
        assert_eq!(cpu.ram().read_block_from(0, 4), vec![15, 0, 0, 0]);
        assert_eq!(os.allocator.free_blocks(), &[MemBlock::new(100, 900)]);
    }

    #[test]
    fn test_os_create_process_saves_incumbent() {
        let (mut os, mut cpu) = kernel(1000);
        os.create_process(&mut cpu, &program(100), 100);
        cpu.set_reg(Register::R2, 17);

        os.create_process(&mut cpu, &program(100), 100);

        let parent = os.processes.get(FIRST_PID).unwrap();
        assert_eq!(parent.register(Register::R2), 17);
        assert_eq!(parent.stats.times_ready, 1);
        assert_eq!(parent.state(os.current), ProcessState::Ready);
        assert_eq!(os.current, Some(FIRST_PID + 1));
        assert_eq!(cpu.base(), 100);
        assert_eq!(cpu.ticks(), 30);
    }

    #[test]
    fn test_os_create_process_declines() {
        let (mut os, mut cpu) = kernel(300);
        os.create_process(&mut cpu, &program(200), 200);

        // Image larger than its allocation.
        assert!(!os.create_process(&mut cpu, &program(8), 8));
        // Not enough memory even after compaction.
        assert!(!os.create_process(&mut cpu, &program(150), 150));

        assert_eq!(os.current, Some(FIRST_PID));
        assert_eq!(os.processes.len(), 1);
        assert_eq!(cpu.ticks(), 0);
    }

    #[test]
    fn test_os_switches_to_starved_process() {
        let (mut os, mut cpu) = kernel(1000);
        let mut a = ProcessControlBlock::new(1001, MemBlock::new(0, 100));
        a.stats.max_starve = 50;
        let mut b = ProcessControlBlock::new(1002, MemBlock::new(100, 100));
        b.stats.max_starve = 400;
        os.processes.insert(a);
        os.processes.insert(b);
        switch_to(&mut os, &mut cpu, 1001);

        assert_eq!(os.schedule_next(&mut cpu).unwrap(), Flow::Continue);

        assert_eq!(os.current, Some(1002));
        assert_eq!(cpu.ticks(), 60);
        assert_eq!(cpu.base(), 100);
        assert_eq!(os.processes.get(1001).unwrap().stats.times_ready, 1);
    }

    #[test]
    fn test_os_no_switch_costs_nothing() {
        let (mut os, mut cpu) = kernel(1000);
        let mut a = ProcessControlBlock::new(1001, MemBlock::new(0, 100));
        a.stats.max_starve = 50;
        let mut b = ProcessControlBlock::new(1002, MemBlock::new(100, 100));
        b.stats.max_starve = 249;
        os.processes.insert(a);
        os.processes.insert(b);
        switch_to(&mut os, &mut cpu, 1001);

        os.schedule_next(&mut cpu).unwrap();

        assert_eq!(os.current, Some(1001));
        assert_eq!(cpu.ticks(), 0);
    }

    #[test]
    fn test_os_compacts_when_fragmented() {
        let (mut os, mut cpu) = kernel(650);
        os.processes.insert(ProcessControlBlock::new(1001, MemBlock::new(50, 450)));
        os.next_pid = 1002;
        os.allocator = Allocator::new(0, 0);
        os.allocator.free(MemBlock::new(0, 50));
        os.allocator.free(MemBlock::new(500, 150));
        switch_to(&mut os, &mut cpu, 1001);

        // Live registers of the running process differ from its snapshot.
        cpu.set_reg(Register::Pc, 58);
        cpu.set_reg(Register::Sp, 490);
        cpu.set_reg(Register::R0, 7);
        cpu.ram_mut().write_block_to(50, &[1, 2, 3, 4]);
        cpu.ram_mut().write(490, 99);

        assert!(os.create_process(&mut cpu, &program(180), 180));

        let moved = os.processes.get(1001).unwrap();
        assert_eq!(moved.mem_block(), MemBlock::new(0, 450));
        assert_eq!(moved.register(Register::Base), 0);
        assert_eq!(moved.register(Register::Lim), 450);
        assert_eq!(moved.register(Register::Pc), 8);
        assert_eq!(moved.register(Register::Sp), 440);
        assert_eq!(moved.register(Register::R0), 7);
        assert_eq!(cpu.ram().read_block_from(0, 4), vec![1, 2, 3, 4]);
        assert_eq!(cpu.ram().read(440), 99);

        assert_eq!(os.current, Some(1002));
        assert_eq!(cpu.base(), 450);
        assert_eq!(cpu.lim(), 630);
        assert_eq!(os.allocator.free_blocks(), &[MemBlock::new(630, 20)]);
    }

    #[test]
    fn test_os_compaction_respects_reserved_region() {
        let config = KernelConfig {
            ram_size: 400,
            reserved: 40,
            ..KernelConfig::default()
        };
        let mut os = OperatingSystem::new(config);
        let mut cpu = Cpu::new(Ram::new(400), 5);

        os.create_process(&mut cpu, &program(100), 100);
        os.create_process(&mut cpu, &program(100), 100);
        os.create_process(&mut cpu, &program(100), 100);
        assert_eq!(cpu.base(), 240);

        switch_to(&mut os, &mut cpu, 1001);
        os.remove_current(&mut cpu).unwrap();

        let bases: Vec<i32> = os.processes.iter().map(|pcb| pcb.register(Register::Base)).collect();
        assert_eq!(bases, vec![40, 140]);
        assert_eq!(os.allocator.free_blocks(), &[MemBlock::new(240, 160)]);
    }

    #[test]
    fn test_os_exit_compacts_and_reschedules() {
        let (mut os, mut cpu) = kernel(1000);
        for _ in 0..3 {
            os.create_process(&mut cpu, &program(100), 100);
        }
        switch_to(&mut os, &mut cpu, 1002);

        assert_eq!(os.remove_current(&mut cpu).unwrap(), Flow::Continue);

        assert!(!os.processes.contains(1002));
        assert_eq!(os.processes.get(1003).unwrap().mem_block(), MemBlock::new(100, 100));
        assert_eq!(cpu.ram().read(100), 15);
        assert_eq!(os.allocator.free_blocks(), &[MemBlock::new(200, 800)]);
        assert_eq!(os.current, Some(1003));
        assert_eq!(cpu.base(), 100);
        assert_eq!(cpu.lim(), 200);
    }

    #[test]
    fn test_os_last_exit_shuts_down() {
        let (mut os, mut cpu) = kernel(1000);
        os.create_process(&mut cpu, &program(100), 100);

        assert_eq!(os.remove_current(&mut cpu).unwrap(), Flow::Shutdown);
        assert!(os.processes.is_empty());
        assert_eq!(os.current, None);
        assert_eq!(os.allocator.free_blocks(), &[MemBlock::new(0, 1000)]);
        assert_eq!(os.run_stats().len(), 1);
    }

    #[test]
    fn test_os_idle_process_when_all_blocked() {
        let (mut os, mut cpu) = kernel(1000);
        os.create_process(&mut cpu, &program(100), 100);
        os.processes.get_mut(1001).unwrap().block(BlockedOn::read(0, 3));

        os.schedule_next(&mut cpu).unwrap();

        assert_eq!(os.current, Some(IDLE_PID));
        assert_eq!(cpu.base(), 100);
        assert_eq!(cpu.pc(), 100);
        assert_eq!(cpu.sp(), 126);
        assert_eq!(cpu.lim(), 136);
        assert_eq!(cpu.ram().read_block_from(100, 116), IDLE_PROGRAM.concat());
        assert_eq!(os.processes.get(1001).unwrap().stats.times_ready, 1);
        assert!(os.run_stats().iter().all(|entry| entry.id != IDLE_PID));
    }

    #[test]
    fn test_os_idle_process_out_of_memory() {
        let (mut os, mut cpu) = kernel(100);
        os.create_process(&mut cpu, &program(100), 100);
        os.processes.get_mut(1001).unwrap().block(BlockedOn::open(0));

        assert!(matches!(os.schedule_next(&mut cpu), Err(SimError::OutOfMemory { requested: 36 })));
    }

    #[test]
    fn test_os_exclusive_open_blocks_with_success() {
        let (mut os, mut cpu) = kernel(1000);
        os.register_device(Rc::new(RefCell::new(DiskDevice::new(2, 5))));
        os.create_process(&mut cpu, &program(100), 100);
        os.create_process(&mut cpu, &program(100), 100);
        os.devices.get_mut(2).unwrap().add_process(1001);

        cpu.push(2).unwrap();
        cpu.push(SyscallKind::Open as i32).unwrap();
        os.system_call(&mut cpu).unwrap();

        let waiter = os.processes.get(1002).unwrap();
        assert_eq!(waiter.blocked_on(), Some(BlockedOn::open(2)));
        assert_eq!(waiter.register(Register::Sp), 199);
        assert_eq!(cpu.ram().read(199), ErrorCode::Success as i32);
        assert!(os.devices.get(2).unwrap().contains_process(1002));
        assert_eq!(os.current, Some(1001));

        // The holder closes the device and the waiter becomes ready.
        cpu.push(2).unwrap();
        cpu.push(SyscallKind::Close as i32).unwrap();
        os.system_call(&mut cpu).unwrap();

        assert_eq!(cpu.pop().unwrap(), ErrorCode::Success as i32);
        assert_eq!(os.processes.get(1002).unwrap().state(os.current), ProcessState::Ready);
        assert!(!os.devices.get(2).unwrap().contains_process(1001));
    }

    #[test]
    fn test_os_exit_releases_devices() {
        let (mut os, mut cpu) = kernel(1000);
        os.register_device(Rc::new(RefCell::new(DiskDevice::new(2, 5))));
        os.create_process(&mut cpu, &program(100), 100);
        os.create_process(&mut cpu, &program(100), 100);
        os.devices.get_mut(2).unwrap().add_process(1001);
        os.devices.get_mut(2).unwrap().add_process(1002);
        os.processes.get_mut(1002).unwrap().block(BlockedOn::open(2));
        switch_to(&mut os, &mut cpu, 1001);

        os.remove_current(&mut cpu).unwrap();

        assert!(!os.processes.get(1002).unwrap().is_blocked());
        assert!(!os.devices.get(2).unwrap().contains_process(1001));
        assert_eq!(os.current, Some(1002));
    }

    #[test]
    fn test_os_read_complete_pushes_to_saved_stack() {
        let (mut os, mut cpu) = kernel(1000);
        os.register_device(Rc::new(RefCell::new(KeyboardDevice::new(0, 5))));
        os.create_process(&mut cpu, &program(100), 100);
        os.create_process(&mut cpu, &program(100), 100);
        os.processes.get_mut(1001).unwrap().block(BlockedOn::read(0, 7));
        let live_sp = cpu.sp();

        os.interrupt_io_read_complete(&mut cpu, 0, 7, 77).unwrap();

        let waiter = os.processes.get(1001).unwrap();
        assert!(!waiter.is_blocked());
        assert_eq!(waiter.register(Register::Sp), 98);
        assert_eq!(cpu.ram().read(99), 77);
        assert_eq!(cpu.ram().read(98), ErrorCode::Success as i32);
        assert_eq!(cpu.sp(), live_sp);
    }

    #[test]
    fn test_os_write_complete_pushes_to_live_stack_of_current() {
        let (mut os, mut cpu) = kernel(1000);
        os.register_device(Rc::new(RefCell::new(DiskDevice::new(2, 5))));
        os.create_process(&mut cpu, &program(100), 100);
        os.processes.get_mut(1001).unwrap().block(BlockedOn::write(2, 4));
        cpu.push(31).unwrap();

        os.interrupt_io_write_complete(&mut cpu, 2, 4).unwrap();

        assert!(!os.processes.get(1001).unwrap().is_blocked());
        assert_eq!(cpu.pop().unwrap(), ErrorCode::Success as i32);
        assert_eq!(cpu.pop().unwrap(), 31);
    }

    #[test]
    fn test_os_completion_without_waiter() {
        let (mut os, mut cpu) = kernel(1000);
        os.register_device(Rc::new(RefCell::new(KeyboardDevice::new(0, 5))));
        os.create_process(&mut cpu, &program(100), 100);
        os.processes.get_mut(1001).unwrap().block(BlockedOn::read(0, 7));
        switch_to(&mut os, &mut cpu, 1001);

        // Wrong address, then an unregistered device.
        os.interrupt_io_read_complete(&mut cpu, 0, 8, 5).unwrap();
        os.interrupt_io_write_complete(&mut cpu, 9, 7).unwrap();

        assert_eq!(cpu.pop().unwrap(), ErrorCode::NoDeviceExists as i32);
        assert_eq!(cpu.pop().unwrap(), ErrorCode::NoDeviceExists as i32);
        assert!(os.processes.get(1001).unwrap().is_blocked());
    }

    #[test]
    fn test_os_unblocked_process_resumes_with_result() {
        let (mut os, mut cpu) = kernel(1000);
        let keyboard = Rc::new(RefCell::new(KeyboardDevice::new(0, 0)));
        os.register_device(keyboard.clone());
        os.create_process(&mut cpu, &program(100), 100);
        os.devices.get_mut(0).unwrap().add_process(1001);

        cpu.push(0).unwrap();
        cpu.push(12).unwrap();
        cpu.push(SyscallKind::Read as i32).unwrap();
        os.system_call(&mut cpu).unwrap();
        assert_eq!(os.current, Some(IDLE_PID));

        let completion = keyboard.borrow_mut().poll().unwrap();
        os.dispatch(&mut cpu, completion.into()).unwrap();
        os.remove_current(&mut cpu).unwrap();

        assert_eq!(os.current, Some(1001));
        assert_eq!(cpu.pop().unwrap(), ErrorCode::Success as i32);
        assert_eq!(cpu.pop().unwrap(), 1);
        assert_eq!(cpu.pop().unwrap(), 1);
        assert_eq!(cpu.sp(), 100);
    }

    #[test]
    fn test_os_fatal_traps() {
        let (mut os, mut cpu) = kernel(1000);
        os.create_process(&mut cpu, &program(100), 100);

        assert!(matches!(
            os.interrupt_illegal_memory_access(&mut cpu, 5000),
            Err(SimError::IllegalMemoryAccess { addr: 5000 })
        ));
        assert!(matches!(os.interrupt_divide_by_zero(&mut cpu), Err(SimError::DivideByZero)));
        assert!(matches!(
            os.interrupt_illegal_instruction(&mut cpu, [1, 9, 0, 0]),
            Err(SimError::IllegalInstruction { instr: [1, 9, 0, 0] })
        ));
    }

    #[test]
    fn test_os_unknown_syscall_is_ignored() {
        let (mut os, mut cpu) = kernel(1000);
        os.create_process(&mut cpu, &program(100), 100);
        cpu.push(42).unwrap();

        assert_eq!(os.system_call(&mut cpu).unwrap(), Flow::Continue);
        assert_eq!(os.current, Some(1001));
        assert_eq!(cpu.sp(), 100);
    }

    fn assert_memory_tiles(os: &OperatingSystem, cpu: &Cpu, reserved: usize, ram_size: usize) {
        let mut ranges: Vec<(usize, usize)> = os
            .allocator
            .free_blocks()
            .iter()
            .map(|block| (block.start, block.end()))
            .collect();

        for pcb in os.processes.iter() {
            let block = pcb.mem_block();
            let base = if os.current == Some(pcb.id()) { cpu.base() } else { pcb.register(Register::Base) };
            assert_eq!(base, block.start as i32, "process {} base", pcb.id());
            assert_eq!(pcb.register(Register::Base), block.start as i32);
            ranges.push((block.start, block.end()));
        }

        ranges.sort();
        let mut next = reserved;
        for (start, end) in ranges {
            assert_eq!(start, next, "gap or overlap at {}", start);
            assert!(end > start);
            next = end;
        }
        assert_eq!(next, ram_size);
    }

    #[test]
    fn test_os_random_create_and_exit_keep_memory_tiled() {
        const RAM_SIZE: usize = 600;
        const RESERVED: usize = 16;

        for seed in 0..200 {
            let config = KernelConfig {
                ram_size: RAM_SIZE,
                reserved: RESERVED,
                seed: Some(seed),
                ..KernelConfig::default()
            };
            let mut os = OperatingSystem::new(config);
            let mut cpu = Cpu::new(Ram::new(RAM_SIZE), 5);
            let mut rng = Lcg::new(seed);

            for _ in 0..40 {
                if os.processes.is_empty() || rng.below(3) > 0 {
                    let size = 16 + rng.below(105);
                    let fits = os.allocator.total_free() >= size;

                    assert_eq!(os.create_process(&mut cpu, &program(size), size), fits);
                } else {
                    let pids: Vec<Pid> = os.processes.iter().map(|pcb| pcb.id()).collect();
                    let victim = pids[rng.below(pids.len())];

                    switch_to(&mut os, &mut cpu, victim);
                    os.remove_current(&mut cpu).unwrap();
                    assert!(!os.processes.contains(victim));
                }

                assert_memory_tiles(&os, &cpu, RESERVED, RAM_SIZE);
            }
        }
    }
}
