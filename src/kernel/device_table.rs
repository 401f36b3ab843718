use std::collections::BTreeMap;

use super::process_control_block::Pid;

use crate::io::{DeviceId, SharedDevice};

/// A registered device and the processes that have it open.
pub(crate) struct DeviceInfo {
    pub id: DeviceId,
    pub device: SharedDevice,
    openers: Vec<Pid>,
}

impl DeviceInfo {
    pub fn new(device: SharedDevice) -> DeviceInfo {
        let id = device.borrow().id();
        DeviceInfo { id, device, openers: Vec::new() }
    }

    pub fn add_process(&mut self, pid: Pid) {
        self.openers.push(pid);
    }

    pub fn remove_process(&mut self, pid: Pid) {
        self.openers.retain(|&opener| opener != pid);
    }

    pub fn contains_process(&self, pid: Pid) -> bool {
        self.openers.contains(&pid)
    }

    pub fn unused(&self) -> bool {
        self.openers.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct DeviceTable {
    devices: BTreeMap<DeviceId, DeviceInfo>,
}

impl DeviceTable {
    pub fn new() -> DeviceTable {
        DeviceTable::default()
    }

    /// Registers a device under its own id, replacing any device with that id.
    pub fn register(&mut self, device: SharedDevice) {
        let info = DeviceInfo::new(device);
        self.devices.insert(info.id, info);
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceInfo> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut DeviceInfo> {
        self.devices.get_mut(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Closes every device `pid` still has open. Returns the ids it was
    /// removed from.
    pub fn release_all(&mut self, pid: Pid) -> Vec<DeviceId> {
        let mut released = Vec::new();
        for info in self.devices.values_mut() {
            if info.contains_process(pid) {
                info.remove_process(pid);
                released.push(info.id);
            }
        }
        released
    }
}
