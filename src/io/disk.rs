use log::warn;

use super::device::{Device, DeviceId, IoCompletion, IoLatch};

const DISK_SIZE: usize = 4096;

/// Exclusive word-addressed storage device supporting both reads and writes.
#[derive(Debug)]
pub struct DiskDevice {
    id: DeviceId,
    latency: u32,
    data: Vec<i32>,
    latch: IoLatch,
}

impl DiskDevice {
    pub fn new(id: DeviceId, latency: u32) -> DiskDevice {
        DiskDevice {
            id,
            latency,
            data: vec![0; DISK_SIZE],
            latch: IoLatch::default(),
        }
    }

    fn slot(&self, addr: i32) -> Option<usize> {
        usize::try_from(addr).ok().filter(|&idx| idx < DISK_SIZE)
    }
}

impl Device for DiskDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn is_sharable(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        !self.latch.is_busy()
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn read(&mut self, addr: i32) -> i32 {
        let data = match self.slot(addr) {
            Some(idx) => self.data[idx],
            None => {
                warn!("disk {} read outside its {} words: @{}", self.id, DISK_SIZE, addr);
                0
            },
        };

        self.latch.start(IoCompletion::Read { device: self.id, addr, data }, self.latency);
        data
    }

    fn write(&mut self, addr: i32, data: i32) {
        match self.slot(addr) {
            Some(idx) => self.data[idx] = data,
            None => warn!("disk {} write outside its {} words: @{}", self.id, DISK_SIZE, addr),
        }

        self.latch.start(IoCompletion::Write { device: self.id, addr }, self.latency);
    }

    fn poll(&mut self) -> Option<IoCompletion> {
        self.latch.poll()
    }
}
