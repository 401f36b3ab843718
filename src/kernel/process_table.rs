use std::collections::BTreeMap;

use super::process_control_block::{Pid, ProcessControlBlock};

/// Every live process, iterated in pid order.
#[derive(Default)]
pub(crate) struct ProcessTable {
    processes: BTreeMap<Pid, ProcessControlBlock>,
}

impl ProcessTable {
    pub fn new() -> ProcessTable {
        ProcessTable::default()
    }

    pub fn insert(&mut self, pcb: ProcessControlBlock) {
        self.processes.insert(pcb.id(), pcb);
    }

    pub fn remove(&mut self, pid: Pid) -> Option<ProcessControlBlock> {
        self.processes.remove(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessControlBlock> {
        self.processes.get_mut(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.processes.values()
    }

    /// Pids ordered by where their memory starts.
    pub fn by_base_address(&self) -> Vec<Pid> {
        let mut pids: Vec<(usize, Pid)> = self.iter().map(|pcb| (pcb.mem_block().start, pcb.id())).collect();
        pids.sort();
        pids.into_iter().map(|(_, pid)| pid).collect()
    }

    pub fn dump(&self, current: Option<Pid>) -> String {
        let mut out = String::from("Process Table:");
        if self.is_empty() {
            out.push_str(" (empty)");
        }
        for pcb in self.iter() {
            out.push_str("\n       ");
            out.push_str(&pcb.describe(current));
        }
        out
    }
}
