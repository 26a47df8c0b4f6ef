//! Wall-clock timers for the simulation

/// Named timers owned by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    WorldTick,
    StatusReport,
    PhaseEnd,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    timer: Timer,
    due_at: u64,
    period: Option<u64>,
}

/// Periodic and single-shot deadlines keyed by unix milliseconds.
///
/// A periodic timer that falls behind fires once and re-arms to its next
/// future slot, so missed slots are skipped rather than replayed.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: Vec<Entry>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `timer` every `period` ms, first at `now + period`
    pub fn every(&mut self, timer: Timer, period: u64, now: u64) {
        let period = period.max(1);
        self.arm(Entry {
            timer,
            due_at: now + period,
            period: Some(period),
        });
    }

    /// Fire `timer` once, `delay` ms from `now`
    pub fn after(&mut self, timer: Timer, delay: u64, now: u64) {
        self.at(timer, now + delay);
    }

    /// Fire `timer` once at `due_at`
    pub fn at(&mut self, timer: Timer, due_at: u64) {
        self.arm(Entry {
            timer,
            due_at,
            period: None,
        });
    }

    pub fn cancel(&mut self, timer: Timer) {
        self.entries.retain(|e| e.timer != timer);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.due_at).min()
    }

    /// Take the earliest timer due at or before `now`, re-arming it if
    /// periodic. Call repeatedly until `None` to drain.
    pub fn pop_due(&mut self, now: u64) -> Option<Timer> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due_at <= now)
            .min_by_key(|(_, e)| e.due_at)
            .map(|(idx, _)| idx)?;

        let Entry { timer, period, .. } = self.entries[idx];
        match period {
            Some(period) => {
                let entry = &mut self.entries[idx];
                while entry.due_at <= now {
                    entry.due_at += period;
                }
            }
            None => {
                self.entries.remove(idx);
            }
        }
        Some(timer)
    }

    /// Re-arming a timer replaces its previous entry
    fn arm(&mut self, entry: Entry) {
        self.cancel(entry.timer);
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_timer_rearms() {
        let mut schedule = Schedule::new();
        schedule.every(Timer::WorldTick, 100, 0);

        assert_eq!(schedule.pop_due(99), None);
        assert_eq!(schedule.pop_due(100), Some(Timer::WorldTick));
        assert_eq!(schedule.pop_due(100), None);
        assert_eq!(schedule.next_deadline(), Some(200));
    }

    #[test]
    fn missed_periods_fire_once() {
        let mut schedule = Schedule::new();
        schedule.every(Timer::WorldTick, 100, 0);

        assert_eq!(schedule.pop_due(450), Some(Timer::WorldTick));
        assert_eq!(schedule.pop_due(450), None);
        assert_eq!(schedule.next_deadline(), Some(500));
    }

    #[test]
    fn one_shot_fires_once_in_deadline_order() {
        let mut schedule = Schedule::new();
        schedule.every(Timer::StatusReport, 1_000, 0);
        schedule.after(Timer::PhaseEnd, 500, 0);

        assert_eq!(schedule.next_deadline(), Some(500));
        assert_eq!(schedule.pop_due(1_000), Some(Timer::PhaseEnd));
        assert_eq!(schedule.pop_due(1_000), Some(Timer::StatusReport));
        assert_eq!(schedule.pop_due(1_000), None);
        assert_eq!(schedule.next_deadline(), Some(2_000));
    }

    #[test]
    fn rearming_replaces_and_clear_empties() {
        let mut schedule = Schedule::new();
        schedule.after(Timer::PhaseEnd, 500, 0);
        schedule.at(Timer::PhaseEnd, 900);
        assert_eq!(schedule.next_deadline(), Some(900));

        schedule.every(Timer::WorldTick, 100, 0);
        schedule.cancel(Timer::WorldTick);
        assert_eq!(schedule.next_deadline(), Some(900));

        schedule.clear();
        assert_eq!(schedule.next_deadline(), None);
    }
}
