use std::fmt;

/// Conditions the simulated OS does not recover from. Any of these ends the
/// whole simulation, not just the offending process.
#[derive(Debug)]
pub enum SimError {
    IllegalMemoryAccess { addr: i32 },
    DivideByZero,
    IllegalInstruction { instr: [i32; 4] },
    OutOfMemory { requested: usize },
    NoPrograms,
    UnknownProgram(String),
    Parse { program: String, line: usize, message: String },
    Io(std::io::Error),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::IllegalMemoryAccess { addr } => write!(f, "illegal memory access: @{}", addr),
            SimError::DivideByZero => write!(f, "divide by zero"),
            SimError::IllegalInstruction { instr } => {
                write!(f, "illegal instruction: {} {} {} {}", instr[0], instr[1], instr[2], instr[3])
            },
            SimError::OutOfMemory { requested } => {
                write!(f, "out of memory: could not place {} words", requested)
            },
            SimError::NoPrograms => write!(f, "exec requested with no registered programs"),
            SimError::UnknownProgram(name) => write!(f, "no program named '{}'", name),
            SimError::Parse { program, line, message } => {
                write!(f, "{}:{}: {}", program, line, message)
            },
            SimError::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Io(err)
    }
}
