use super::process_control_block::Pid;
use super::ProcessTable;

/// Starvation-priority selection with a preference for the running process.
pub(crate) struct ShortTermScheduler {
    switch_bonus: i64,
}

impl ShortTermScheduler {
    pub fn new(switch_bonus: i64) -> ShortTermScheduler {
        ShortTermScheduler { switch_bonus }
    }

    /// The incumbent, if still runnable, starts as the candidate with its
    /// worst starvation plus the switch bonus as the bar. Any runnable process
    /// whose worst starvation reaches the bar takes over and raises it, so
    /// ties go to the later pid. `None` when nothing is runnable.
    pub fn select_next(&self, processes: &ProcessTable, current: Option<Pid>) -> Option<Pid> {
        let mut candidate = None;
        let mut threshold = -1;

        if let Some(pcb) = current.and_then(|pid| processes.get(pid)) {
            if !pcb.is_blocked() {
                candidate = Some(pcb.id());
                threshold = pcb.stats.max_starve + self.switch_bonus;
            }
        }

        for pcb in processes.iter().filter(|pcb| !pcb.is_blocked()) {
            if pcb.stats.max_starve >= threshold {
                candidate = Some(pcb.id());
                threshold = pcb.stats.max_starve;
            }
        }

        candidate
    }
}
