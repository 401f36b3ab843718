pub(crate) mod allocator;
pub(crate) mod blocking;
pub(crate) mod cpu;
pub(crate) mod device_table;
pub(crate) mod long_term_scheduler;
pub(crate) mod memory;
pub(crate) mod os;
pub(crate) mod process_control_block;
pub(crate) mod process_table;
pub(crate) mod short_term_scheduler;
pub(crate) mod syscall;

pub mod driver;

pub(crate) use cpu::Cpu;
pub use driver::Driver;
pub(crate) use long_term_scheduler::LongTermScheduler;
pub(crate) use memory::Ram;
pub(crate) use os::OperatingSystem;
pub(crate) use process_control_block::ProcessControlBlock;
pub(crate) use process_table::ProcessTable;
pub(crate) use short_term_scheduler::ShortTermScheduler;
