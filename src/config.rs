use std::path::PathBuf;

use clap::Parser;

/// Simulated operating system running on a simulated single-core CPU
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the `.asm` programs to register
    #[arg(short, long, default_value = "programs")]
    pub programs: PathBuf,

    /// Program started as the first process (defaults to the first by name)
    #[arg(short, long)]
    pub initial: Option<String>,

    /// Words of RAM
    #[arg(long, default_value_t = 3000)]
    pub ram_size: usize,

    /// Words reserved at the bottom of RAM
    #[arg(long, default_value_t = 0)]
    pub reserved: usize,

    /// Instructions executed between clock interrupts
    #[arg(long, default_value_t = 5)]
    pub clock_freq: u64,

    /// Ticks charged for each register save and each restore
    #[arg(long, default_value_t = 30)]
    pub switch_ticks: u64,

    /// Starvation bonus given to the running process when picking the next one
    #[arg(long, default_value_t = 275)]
    pub switch_bonus: i64,

    /// Seed for the exec program choice
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many instructions
    #[arg(long)]
    pub max_instructions: Option<u64>,

    /// Trace every CPU instruction (needs -vvv)
    #[arg(long)]
    pub trace_cpu: bool,

    /// More output per occurrence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Tunables of the privileged layer.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub ram_size: usize,
    pub reserved: usize,
    pub clock_freq: u64,
    pub switch_ticks: u64,
    pub switch_bonus: i64,
    pub seed: Option<u64>,
    pub max_instructions: Option<u64>,
    pub trace_cpu: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            ram_size: 3000,
            reserved: 0,
            clock_freq: 5,
            switch_ticks: 30,
            switch_bonus: 275,
            seed: None,
            max_instructions: None,
            trace_cpu: false,
        }
    }
}

impl From<&Args> for KernelConfig {
    fn from(args: &Args) -> Self {
        KernelConfig {
            ram_size: args.ram_size,
            reserved: args.reserved,
            clock_freq: args.clock_freq.max(1),
            switch_ticks: args.switch_ticks,
            switch_bonus: args.switch_bonus,
            seed: args.seed,
            max_instructions: args.max_instructions,
            trace_cpu: args.trace_cpu,
        }
    }
}
