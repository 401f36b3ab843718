use log::{debug, info, warn};

use super::blocking::{find_waiter, BlockedOn, IoOperation};
use super::cpu::{Cpu, Flow, Register, INSTR_SIZE};
use super::OperatingSystem;

use crate::error::SimError;

/// System call ids, pushed last before `TRAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyscallKind {
    Exit = 0,
    Output = 1,
    GetPid = 2,
    Open = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    Exec = 7,
    Yield = 8,
    CoreDump = 9,
}

impl SyscallKind {
    pub fn from_id(id: i32) -> Option<SyscallKind> {
        let kind = match id {
            0 => SyscallKind::Exit,
            1 => SyscallKind::Output,
            2 => SyscallKind::GetPid,
            3 => SyscallKind::Open,
            4 => SyscallKind::Close,
            5 => SyscallKind::Read,
            6 => SyscallKind::Write,
            7 => SyscallKind::Exec,
            8 => SyscallKind::Yield,
            9 => SyscallKind::CoreDump,
            _ => return None,
        };
        Some(kind)
    }
}

/// Result codes pushed back to the calling program.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    Success = 0,
    IllegalMemoryAccess = -3,
    UnknownDevice = -4,
    DeviceAlreadyOpen = -6,
    DeviceNotOpen = -7,
    WriteOnly = -8,
    ReadOnly = -9,
    NoDeviceExists = -10,
}

const CORE_DUMP_DEPTH: i32 = 3;

impl OperatingSystem {
    pub(super) fn handle_syscall(&mut self, cpu: &mut Cpu, kind: SyscallKind) -> Result<Flow, SimError> {
        match kind {
            SyscallKind::Exit => self.remove_current(cpu),
            SyscallKind::Output => self.syscall_output(cpu),
            SyscallKind::GetPid => self.syscall_getpid(cpu),
            SyscallKind::Open => self.syscall_open(cpu),
            SyscallKind::Close => self.syscall_close(cpu),
            SyscallKind::Read => self.syscall_read(cpu),
            SyscallKind::Write => self.syscall_write(cpu),
            SyscallKind::Exec => self.syscall_exec(cpu),
            SyscallKind::Yield => self.schedule_next(cpu),
            SyscallKind::CoreDump => self.syscall_coredump(cpu),
        }
    }

    fn syscall_output(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        println!("OUTPUT: {}", cpu.pop()?);
        Ok(Flow::Continue)
    }

    fn syscall_getpid(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let pid = self.current.unwrap_or(-1);
        cpu.push(pid)?;
        Ok(Flow::Continue)
    }

    fn syscall_coredump(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        println!("{}", cpu.reg_dump());

        for i in 0..CORE_DUMP_DEPTH {
            if cpu.sp() > cpu.lim() - i {
                continue;
            }
            match cpu.pop() {
                Ok(value) => println!("Stack {}: {}", CORE_DUMP_DEPTH - i, value),
                Err(_) => break,
            }
        }

        self.remove_current(cpu)
    }

    fn syscall_open(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let device_id = cpu.pop()?;
        let Some(pid) = self.current else {
            return Ok(Flow::Continue);
        };

        let Some(info) = self.devices.get_mut(device_id) else {
            cpu.push(ErrorCode::UnknownDevice as i32)?;
            return Ok(Flow::Continue);
        };

        if info.contains_process(pid) {
            cpu.push(ErrorCode::DeviceAlreadyOpen as i32)?;
            return Ok(Flow::Continue);
        }

        let exclusive = !info.device.borrow().is_sharable();
        let busy = !info.unused();
        info.add_process(pid);
        cpu.push(ErrorCode::Success as i32)?;

        if exclusive && busy {
            debug!("Blocked process {} on device {}", pid, device_id);
            if let Some(pcb) = self.processes.get_mut(pid) {
                pcb.block(BlockedOn::open(device_id));
            }
            return self.schedule_next(cpu);
        }

        Ok(Flow::Continue)
    }

    fn syscall_close(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let device_id = cpu.pop()?;
        let Some(pid) = self.current else {
            return Ok(Flow::Continue);
        };

        let Some(info) = self.devices.get(device_id) else {
            cpu.push(ErrorCode::UnknownDevice as i32)?;
            return Ok(Flow::Continue);
        };

        if !info.contains_process(pid) {
            cpu.push(ErrorCode::DeviceNotOpen as i32)?;
            return Ok(Flow::Continue);
        }

        if let Some(waiter) = find_waiter(&self.processes, device_id, IoOperation::Open, -1) {
            self.unblock(cpu, waiter);
        }
        if let Some(info) = self.devices.get_mut(device_id) {
            info.remove_process(pid);
        }

        cpu.push(ErrorCode::Success as i32)?;
        Ok(Flow::Continue)
    }

    fn syscall_read(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let addr = cpu.pop()?;
        let device_id = cpu.pop()?;
        self.device_io(cpu, IoOperation::Read, device_id, addr, None)
    }

    fn syscall_write(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let data = cpu.pop()?;
        let addr = cpu.pop()?;
        let device_id = cpu.pop()?;
        self.device_io(cpu, IoOperation::Write, device_id, addr, Some(data))
    }

    /// Shared body of read and write. A busy device makes the caller retry
    /// the whole `TRAP` once it runs again; otherwise the operation starts
    /// and the caller blocks until its completion interrupt.
    fn device_io(
        &mut self,
        cpu: &mut Cpu,
        op: IoOperation,
        device_id: i32,
        addr: i32,
        data: Option<i32>,
    ) -> Result<Flow, SimError> {
        let Some(pid) = self.current else {
            return Ok(Flow::Continue);
        };

        let Some(info) = self.devices.get(device_id) else {
            cpu.push(ErrorCode::UnknownDevice as i32)?;
            return Ok(Flow::Continue);
        };

        if !info.contains_process(pid) {
            cpu.push(ErrorCode::DeviceNotOpen as i32)?;
            return Ok(Flow::Continue);
        }

        let device = info.device.clone();

        if !device.borrow().is_available() {
            let pc = cpu.pc() - INSTR_SIZE as i32;
            if cpu.base() > pc {
                cpu.push(ErrorCode::IllegalMemoryAccess as i32)?;
                return Ok(Flow::Continue);
            }

            cpu.set_reg(Register::Pc, pc);
            cpu.push(device_id)?;
            cpu.push(addr)?;
            if let Some(data) = data {
                cpu.push(data)?;
            }
            let kind = if op == IoOperation::Read { SyscallKind::Read } else { SyscallKind::Write };
            cpu.push(kind as i32)?;

            debug!("Process {} will retry {:?} on busy device {}", pid, op, device_id);
            return self.schedule_next(cpu);
        }

        let blocked_on = match (op, data) {
            (IoOperation::Write, Some(data)) => {
                if !device.borrow().is_writeable() {
                    cpu.push(ErrorCode::ReadOnly as i32)?;
                    return Ok(Flow::Continue);
                }
                device.borrow_mut().write(addr, data);
                BlockedOn::write(device_id, addr)
            },
            _ => {
                if !device.borrow().is_readable() {
                    cpu.push(ErrorCode::WriteOnly as i32)?;
                    return Ok(Flow::Continue);
                }
                let value = device.borrow_mut().read(addr);
                cpu.push(value)?;
                BlockedOn::read(device_id, addr)
            },
        };

        debug!("Blocked process {} for {}", pid, blocked_on);
        if let Some(pcb) = self.processes.get_mut(pid) {
            pcb.block(blocked_on);
        }
        self.schedule_next(cpu)
    }

    fn syscall_exec(&mut self, cpu: &mut Cpu) -> Result<Flow, SimError> {
        let program = self.lts.choose()?;
        let alloc_size = program.alloc_size();

        if !self.create_process(cpu, &program, alloc_size) {
            warn!("exec of {} declined, process {:?} keeps running", program.name, self.current);
        } else {
            info!("exec started {}", program.name);
        }
        Ok(Flow::Continue)
    }
}
