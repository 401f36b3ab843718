use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: GlobalLogger = GlobalLogger::new();

struct GlobalLogger {}

impl GlobalLogger {
    const fn new() -> Self {
        Self {}
    }
}

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if matches!(record.level(), log::Level::Error | log::Level::Warn) {
            println!("[sos] {:5} {}", record.level(), record.args());
        } else {
            println!("[sos] {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs the logger. Calling it twice keeps the first logger but still
/// updates the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }

    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
