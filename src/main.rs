mod config;
mod error;
mod io;
mod kernel;
mod logger;

use anyhow::Context;
use clap::Parser;

use config::{Args, KernelConfig};
use io::loader;
use kernel::Driver;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(logger::level_for(args.verbose, args.quiet));

    let programs = loader::load_programs_from(&args.programs)
        .with_context(|| format!("failed to load programs from {}", args.programs.display()))?;
    let config = KernelConfig::from(&args);

    let mut driver = Driver::new(&config, programs);
    let result = driver.start(args.initial.as_deref());
    driver.print_stats();

    result.context("simulation aborted")
}
