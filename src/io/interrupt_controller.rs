use std::collections::VecDeque;

use super::device::{IoCompletion, SharedDevice};

/// Collects device completions and hands them to the CPU one per cycle.
#[derive(Default)]
pub struct InterruptController {
    devices: Vec<SharedDevice>,
    pending: VecDeque<IoCompletion>,
}

impl InterruptController {
    pub fn new() -> InterruptController {
        InterruptController::default()
    }

    pub fn attach(&mut self, device: SharedDevice) {
        self.devices.push(device);
    }

    /// Advances every attached device by one cycle.
    pub fn tick(&mut self) {
        for device in &self.devices {
            if let Some(completion) = device.borrow_mut().poll() {
                self.pending.push_back(completion);
            }
        }
    }

    pub fn take(&mut self) -> Option<IoCompletion> {
        self.pending.pop_front()
    }
}
