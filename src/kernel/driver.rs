use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use super::os::ProcessStats;
use super::*;

use crate::config::KernelConfig;
use crate::error::SimError;
use crate::io::{ConsoleDevice, DiskDevice, InterruptController, KeyboardDevice, Program, SharedDevice};

pub(crate) const KEYBOARD_ID: i32 = 0;
pub(crate) const CONSOLE_ID: i32 = 1;
pub(crate) const DISK_ID: i32 = 2;

const KEYBOARD_LATENCY: u32 = 12;
const CONSOLE_LATENCY: u32 = 6;
const DISK_LATENCY: u32 = 20;

/// Wires the CPU, RAM, devices and operating system together and runs the
/// machine from a first program to shutdown.
pub struct Driver {
    cpu: Cpu,
    os: OperatingSystem,
    ic: InterruptController,
}

impl Driver {
    pub fn new(config: &KernelConfig, programs: Vec<Program>) -> Driver {
        let cpu = Cpu::new(Ram::new(config.ram_size), config.clock_freq)
            .with_instruction_budget(config.max_instructions)
            .with_verbose(config.trace_cpu);
        let mut os = OperatingSystem::new(config.clone());
        let mut ic = InterruptController::new();

        let devices: [SharedDevice; 3] = [
            Rc::new(RefCell::new(KeyboardDevice::new(KEYBOARD_ID, KEYBOARD_LATENCY))),
            Rc::new(RefCell::new(ConsoleDevice::new(CONSOLE_ID, CONSOLE_LATENCY))),
            Rc::new(RefCell::new(DiskDevice::new(DISK_ID, DISK_LATENCY))),
        ];
        for device in devices {
            ic.attach(device.clone());
            os.register_device(device);
        }

        for program in programs {
            os.add_program(program);
        }

        Driver { cpu, os, ic }
    }

    /// Starts `initial` (or the first registered program) and runs until the
    /// process table empties, the instruction budget runs out, or a fatal
    /// trap stops the machine.
    pub fn start(&mut self, initial: Option<&str>) -> Result<(), SimError> {
        let program = self.initial_program(initial)?;
        let alloc_size = program.alloc_size();

        info!("Starting the simulation with {}.", program.name);
        if !self.os.create_process(&mut self.cpu, &program, alloc_size) {
            return Err(SimError::OutOfMemory { requested: alloc_size });
        }

        self.cpu.run(&mut self.os, &mut self.ic)?;

        info!(
            "Stopped after {} instructions and {} ticks.",
            self.cpu.instructions(),
            self.cpu.ticks()
        );
        Ok(())
    }

    fn initial_program(&self, initial: Option<&str>) -> Result<Program, SimError> {
        let program = match initial {
            Some(name) => self
                .os
                .lts
                .find(name)
                .ok_or_else(|| SimError::UnknownProgram(name.to_string()))?,
            None => self.os.programs().first().ok_or(SimError::NoPrograms)?,
        };

        Ok(program.clone())
    }

    pub fn print_stats(&self) {
        let stats = self.os.run_stats();
        if stats.is_empty() {
            return;
        }

        println!("Starvation statistics (ticks):");
        println!("...   ID | Max Starve | Avg Starve | Times Ready");
        println!("...------|------------|------------|------------");
        for entry in &stats {
            println!(
                "... {:>4} | {:>10} | {:>10.2} | {:>11}",
                entry.id, entry.stats.max_starve, entry.stats.avg_starve, entry.stats.times_ready
            );
        }
        println!("... Overall average starve time: {:.2}", overall_avg_starve(&stats));
    }
}

/// Mean of the per-process averages, counting only processes that waited.
pub(crate) fn overall_avg_starve(stats: &[ProcessStats]) -> f64 {
    let waited: Vec<f64> = stats
        .iter()
        .map(|entry| entry.stats.avg_starve)
        .filter(|&avg| avg > 0.0)
        .collect();

    if waited.is_empty() {
        return 0.0;
    }
    waited.iter().sum::<f64>() / waited.len() as f64
}
