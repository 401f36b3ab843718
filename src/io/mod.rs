pub mod console;
pub mod device;
pub mod disk;
pub mod interrupt_controller;
pub mod keyboard;
pub mod loader;
pub mod program;

pub use console::ConsoleDevice;
pub use device::{DeviceId, IoCompletion, SharedDevice};
pub use disk::DiskDevice;
pub use interrupt_controller::InterruptController;
pub use keyboard::KeyboardDevice;
pub use program::Program;
