use log::warn;

use super::device::{Device, DeviceId, IoCompletion, IoLatch};

/// Write-only output device shared by every process.
#[derive(Debug)]
pub struct ConsoleDevice {
    id: DeviceId,
    latency: u32,
    latch: IoLatch,
    pending_data: i32,
}

impl ConsoleDevice {
    pub fn new(id: DeviceId, latency: u32) -> ConsoleDevice {
        ConsoleDevice {
            id,
            latency,
            latch: IoLatch::default(),
            pending_data: 0,
        }
    }
}

impl Device for ConsoleDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn is_sharable(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        !self.latch.is_busy()
    }

    fn is_readable(&self) -> bool {
        false
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn read(&mut self, addr: i32) -> i32 {
        warn!("console {} ignored read @{}", self.id, addr);
        0
    }

    fn write(&mut self, addr: i32, data: i32) {
        self.pending_data = data;
        self.latch.start(IoCompletion::Write { device: self.id, addr }, self.latency);
    }

    fn poll(&mut self) -> Option<IoCompletion> {
        let completion = self.latch.poll()?;
        println!("CONSOLE: {}", self.pending_data);
        Some(completion)
    }
}
