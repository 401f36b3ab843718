use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::error::SimError;
use crate::io::Program;

/// Linear congruential generator. Seeded runs pick the same programs.
#[derive(Debug, Clone)]
pub(crate) struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Lcg {
        Lcg { state: seed }
    }

    pub fn from_clock() -> Lcg {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x2545_f491_4f6c_dd1d);
        Lcg::new(nanos)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    /// Uniform-ish value in `0..bound`, or 0 for an empty range.
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((self.next_u64() >> 33) % bound as u64) as usize
    }
}

/// Registry of loadable programs and the choice of which one `exec` starts.
pub(crate) struct LongTermScheduler {
    programs: Vec<Program>,
    rng: Lcg,
}

impl LongTermScheduler {
    pub fn new(seed: Option<u64>) -> LongTermScheduler {
        LongTermScheduler {
            programs: Vec::new(),
            rng: seed.map_or_else(Lcg::from_clock, Lcg::new),
        }
    }

    pub fn add_program(&mut self, program: Program) {
        self.programs.push(program);
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn find(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|program| program.name == name)
    }

    pub fn least_call_count(&self) -> Option<u32> {
        self.programs.iter().map(|program| program.call_count).min()
    }

    /// Picks the program for the next `exec` and bumps its call count.
    ///
    /// The draw is uniform over every registered program, not only the least
    /// called ones, so call counts do not steer the choice.
    pub fn choose(&mut self) -> Result<Program, SimError> {
        let least = self.least_call_count().ok_or(SimError::NoPrograms)?;

        let idx = self.rng.below(self.programs.len());
        let program = &mut self.programs[idx];
        program.call_count += 1;
        debug!(
            "exec picked {} (called {} times, least called {})",
            program.name, program.call_count, least
        );

        Ok(program.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(name: &str) -> Program {
        Program::new(name, &[[15, 0, 0, 0]], None)
    }

    #[test]
    fn test_lcg_is_deterministic() {
        let mut a = Lcg::new(9);
        let mut b = Lcg::new(9);

        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_eq!(a.below(0), 0);
        assert!((0..100).all(|_| a.below(3) < 3));
    }

    #[test]
    fn test_long_term_scheduler_no_programs() {
        let mut lts = LongTermScheduler::new(Some(1));
        assert!(matches!(lts.choose(), Err(SimError::NoPrograms)));
    }

    #[test]
    fn test_long_term_scheduler_choose_bumps_call_count() {
        let mut lts = LongTermScheduler::new(Some(1));
        lts.add_program(program("only"));

        assert_eq!(lts.choose().unwrap().name, "only");
        assert_eq!(lts.choose().unwrap().call_count, 2);
        assert_eq!(lts.least_call_count(), Some(2));
    }

    #[test]
    fn test_long_term_scheduler_choice_ignores_call_counts() {
        // Call counts are tracked but the draw stays uniform over every
        // program, so a heavily used program keeps being picked.
        let mut lts = LongTermScheduler::new(Some(1234));
        let mut busy = program("busy");
        busy.call_count = 1000;
        lts.add_program(busy);
        lts.add_program(program("fresh"));

        let picks: Vec<String> = (0..64).map(|_| lts.choose().unwrap().name).collect();

        assert!(picks.iter().any(|name| name == "busy"));
        assert!(picks.iter().any(|name| name == "fresh"));
    }

    #[test]
    fn test_long_term_scheduler_same_seed_same_choices() {
        let mut a = LongTermScheduler::new(Some(5));
        let mut b = LongTermScheduler::new(Some(5));
        for name in ["a", "b", "c"] {
            a.add_program(program(name));
            b.add_program(program(name));
        }

        for _ in 0..20 {
            assert_eq!(a.choose().unwrap().name, b.choose().unwrap().name);
        }
    }

    #[test]
    fn test_long_term_scheduler_find() {
        let mut lts = LongTermScheduler::new(Some(1));
        lts.add_program(program("calc"));

        assert!(lts.find("calc").is_some());
        assert!(lts.find("other").is_none());
    }
}
