use std::time::Instant;

use crate::core::instrument::backend::UnitHandle;
use crate::core::note::Note;

/// A note trigger waiting for its time, bound to the unit alive when it was scheduled
#[derive(Debug, Clone, Copy)]
pub struct ScheduledNote {
    pub due: Instant,
    pub unit: UnitHandle,
    pub note: Note,
    pub velocity: f32,
}

/// Pending delayed note triggers (arpeggios).
///
/// Tasks are cancelled per unit, so replacing a unit drops everything that
/// was queued for it.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<ScheduledNote>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, unit: UnitHandle, note: Note, velocity: f32) {
        self.pending.push(ScheduledNote { due, unit, note, velocity });
    }

    /// Drop all tasks for `unit`, returning how many were dropped
    pub fn cancel_unit(&mut self, unit: UnitHandle) -> usize {
        let before = self.pending.len();
        self.pending.retain(|task| task.unit != unit);
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return every task due at `now`, earliest first.
    /// Tasks due at the same instant keep their scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledNote> {
        let (mut due, waiting): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|task| task.due <= now);
        self.pending = waiting;
        due.sort_by_key(|task| task.due);
        due
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|task| task.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::PitchClass;
    use std::time::Duration;

    #[test]
    fn test_due_tasks_come_out_in_order() {
        let mut scheduler = Scheduler::new();
        let start = Instant::now();
        let unit = UnitHandle(1);
        scheduler.schedule(start + Duration::from_millis(100), unit, Note::new(PitchClass::G, 4), 0.8);
        scheduler.schedule(start, unit, Note::new(PitchClass::C, 4), 0.8);
        scheduler.schedule(start + Duration::from_millis(50), unit, Note::new(PitchClass::E, 4), 0.8);

        let due = scheduler.take_due(start + Duration::from_millis(60));
        let names: Vec<String> = due.iter().map(|t| t.note.to_string()).collect();
        assert_eq!(names, vec!["C4", "E4"]);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_cancel_unit() {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();
        scheduler.schedule(now, UnitHandle(1), Note::new(PitchClass::C, 4), 0.8);
        scheduler.schedule(now, UnitHandle(2), Note::new(PitchClass::D, 4), 0.8);
        assert_eq!(scheduler.cancel_unit(UnitHandle(1)), 1);
        let due = scheduler.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].unit, UnitHandle(2));
        assert!(scheduler.is_empty());
    }
}
