use std::fmt;

use super::process_control_block::Pid;
use super::ProcessTable;

use crate::io::DeviceId;

/// The system call a blocked process is waiting to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoOperation {
    Open,
    Read,
    Write,
}

/// Why a process is blocked. The address is only meaningful for reads and
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockedOn {
    pub device: DeviceId,
    pub op: IoOperation,
    pub addr: i32,
}

impl BlockedOn {
    pub fn open(device: DeviceId) -> BlockedOn {
        BlockedOn { device, op: IoOperation::Open, addr: -1 }
    }

    pub fn read(device: DeviceId, addr: i32) -> BlockedOn {
        BlockedOn { device, op: IoOperation::Read, addr }
    }

    pub fn write(device: DeviceId, addr: i32) -> BlockedOn {
        BlockedOn { device, op: IoOperation::Write, addr }
    }

    /// Opens match any address; reads and writes need the exact one.
    pub fn matches(&self, device: DeviceId, op: IoOperation, addr: i32) -> bool {
        self.device == device && self.op == op && (op == IoOperation::Open || self.addr == addr)
    }
}

impl fmt::Display for BlockedOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            IoOperation::Open => write!(f, "OPEN on device #{}", self.device),
            IoOperation::Read => write!(f, "READ @{} on device #{}", self.addr, self.device),
            IoOperation::Write => write!(f, "WRITE @{} on device #{}", self.addr, self.device),
        }
    }
}

/// First process, in pid order, whose block descriptor matches.
pub(crate) fn find_waiter(processes: &ProcessTable, device: DeviceId, op: IoOperation, addr: i32) -> Option<Pid> {
    processes
        .iter()
        .find(|pcb| pcb.blocked_on().is_some_and(|block| block.matches(device, op, addr)))
        .map(|pcb| pcb.id())
}
