use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type DeviceId = i32;

pub type SharedDevice = Rc<RefCell<dyn Device>>;

/// A finished device operation, raised to the CPU as an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCompletion {
    Read { device: DeviceId, addr: i32, data: i32 },
    Write { device: DeviceId, addr: i32 },
}

/// Capability set of a device as seen by the operating system.
///
/// `read` and `write` only start an operation. The device stays unavailable
/// until `poll` reports the matching completion.
pub trait Device: fmt::Debug {
    fn id(&self) -> DeviceId;
    fn is_sharable(&self) -> bool;
    fn is_available(&self) -> bool;
    fn is_readable(&self) -> bool;
    fn is_writeable(&self) -> bool;
    fn read(&mut self, addr: i32) -> i32;
    fn write(&mut self, addr: i32, data: i32);

    /// Advances the in-flight operation by one CPU cycle.
    fn poll(&mut self) -> Option<IoCompletion>;
}

/// Tracks the single in-flight operation a device may have.
#[derive(Debug, Default)]
pub struct IoLatch {
    in_flight: Option<(IoCompletion, u32)>,
}

impl IoLatch {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn start(&mut self, completion: IoCompletion, latency: u32) {
        self.in_flight = Some((completion, latency));
    }

    pub fn poll(&mut self) -> Option<IoCompletion> {
        let (completion, remaining) = self.in_flight.as_mut()?;

        if *remaining > 0 {
            *remaining -= 1;
            return None;
        }

        let completion = *completion;
        self.in_flight = None;
        Some(completion)
    }
}
