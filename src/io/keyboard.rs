use log::warn;

use super::device::{Device, DeviceId, IoCompletion, IoLatch};

/// Read-only, exclusive input device. Each read yields the next value of a
/// fixed sequence so runs are reproducible.
#[derive(Debug)]
pub struct KeyboardDevice {
    id: DeviceId,
    latency: u32,
    next_value: i32,
    latch: IoLatch,
}

impl KeyboardDevice {
    pub fn new(id: DeviceId, latency: u32) -> KeyboardDevice {
        KeyboardDevice {
            id,
            latency,
            next_value: 1,
            latch: IoLatch::default(),
        }
    }
}

impl Device for KeyboardDevice {
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
        false
    }

    fn read(&mut self, addr: i32) -> i32 {
        let data = self.next_value;
        self.next_value += 1;
        self.latch.start(IoCompletion::Read { device: self.id, addr, data }, self.latency);
        data
    }

    fn write(&mut self, addr: i32, _data: i32) {
        warn!("keyboard {} ignored write @{}", self.id, addr);
    }

    fn poll(&mut self) -> Option<IoCompletion> {
        self.latch.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_read_sequence() {
        let mut keyboard = KeyboardDevice::new(0, 0);

        assert_eq!(keyboard.read(5), 1);
        assert!(!keyboard.is_available());
        assert_eq!(keyboard.poll(), Some(IoCompletion::Read { device: 0, addr: 5, data: 1 }));
        assert!(keyboard.is_available());
        assert_eq!(keyboard.read(6), 2);
    }

    #[test]
    fn test_keyboard_capabilities() {
        let keyboard = KeyboardDevice::new(0, 3);
        assert!(keyboard.is_readable());
        assert!(!keyboard.is_writeable());
        assert!(!keyboard.is_sharable());
    }
}
