use std::rc::Rc;

use crate::kernel::cpu::INSTR_SIZE;

/// A loadable program as registered with the OS for `exec`.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub default_alloc: Option<usize>,
    pub call_count: u32,
    pub data: Rc<[i32]>,
}

impl Program {
    pub fn new(name: &str, instructions: &[[i32; INSTR_SIZE]], default_alloc: Option<usize>) -> Program {
        let data: Vec<i32> = instructions.iter().flatten().copied().collect();

        Program {
            name: name.to_string(),
            default_alloc,
            call_count: 0,
            data: data.into(),
        }
    }

    /// Size of the program image in words.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.data.len() / INSTR_SIZE
    }

    /// The declared allocation, or twice the image size when none was given.
    pub fn alloc_size(&self) -> usize {
        match self.default_alloc {
            Some(size) if size > 0 => size,
            _ => self.size() * 2,
        }
    }
}
