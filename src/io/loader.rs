use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::Program;

use crate::error::SimError;
use crate::kernel::cpu::{Opcode, INSTR_SIZE};

const PROGRAM_EXTENSION: &str = "asm";

#[derive(Clone, Copy)]
enum Operand {
    Reg,
    Imm,
    Label,
}

fn operands_for(opcode: Opcode) -> &'static [Operand] {
    use Operand::*;

    match opcode {
        Opcode::Set => &[Reg, Imm],
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => &[Reg, Reg, Reg],
        Opcode::Copy | Opcode::Load | Opcode::Save => &[Reg, Reg],
        Opcode::Branch => &[Label],
        Opcode::Bne | Opcode::Blt => &[Reg, Reg, Label],
        Opcode::Pop | Opcode::Push => &[Reg],
        Opcode::Trap => &[],
    }
}

/// Loads every `.asm` file in `dir`, sorted by file name.
pub fn load_programs_from(dir: &Path) -> Result<Vec<Program>, SimError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == PROGRAM_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut programs = Vec::new();
    for path in paths {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = fs::read_to_string(&path)?;

        programs.push(parse_program(&name, &source)?);
    }

    Ok(programs)
}

/// Assembles one program. Labels resolve to word offsets from the start of
/// the program, which is how the CPU interprets branch targets.
pub fn parse_program(name: &str, source: &str) -> Result<Program, SimError> {
    let error = |line: usize, message: String| SimError::Parse {
        program: name.to_string(),
        line,
        message,
    };

    let mut labels = HashMap::new();
    let mut statements = Vec::new();
    let mut default_alloc = None;

    for (idx, raw) in source.lines().enumerate() {
        let line_num = idx + 1;
        let mut line = strip_comment(raw).trim();

        if let Some(arg) = line.strip_prefix(".alloc") {
            let size = arg
                .trim()
                .parse::<usize>()
                .map_err(|err| error(line_num, format!(".alloc is not a size: {}", err)))?;
            default_alloc = Some(size);
            continue;
        }

        if let Some((label, rest)) = line.split_once(':') {
            let label = label.trim();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(error(line_num, format!("bad label '{}'", label)));
            }
            if labels.insert(label.to_string(), statements.len()).is_some() {
                return Err(error(line_num, format!("duplicate label '{}'", label)));
            }
            line = rest.trim();
        }

        if !line.is_empty() {
            statements.push((line_num, line));
        }
    }

    let mut instructions = Vec::with_capacity(statements.len());
    for (line_num, line) in statements {
        let mut words = line.split_whitespace();
        let mnemonic = words.next().unwrap_or_default();
        let opcode = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| error(line_num, format!("unknown mnemonic '{}'", mnemonic)))?;

        let args: Vec<&str> = words.collect();
        let kinds = operands_for(opcode);
        if args.len() != kinds.len() {
            return Err(error(
                line_num,
                format!("{} takes {} operands, found {}", mnemonic, kinds.len(), args.len()),
            ));
        }

        let mut instr = [0; INSTR_SIZE];
        instr[0] = opcode as i32;
        for (slot, (arg, kind)) in args.iter().zip(kinds).enumerate() {
            instr[slot + 1] = match kind {
                Operand::Reg => parse_register(arg),
                Operand::Imm => arg.parse::<i32>().ok(),
                Operand::Label => match labels.get(*arg) {
                    Some(&idx) => Some((idx * INSTR_SIZE) as i32),
                    None => arg.parse::<i32>().ok(),
                },
            }
            .ok_or_else(|| error(line_num, format!("bad operand '{}'", arg)))?;
        }

        instructions.push(instr);
    }

    Ok(Program::new(name, &instructions, default_alloc))
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_register(word: &str) -> Option<i32> {
    let digits = word.strip_prefix('r').or_else(|| word.strip_prefix('R'))?;
    digits.parse::<i32>().ok()
}
