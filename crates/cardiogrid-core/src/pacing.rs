//! Event-based pacing of the external stimulus level.
//!
//! A [`Protocol`] is a finite list of scheduled events, each producing a
//! piecewise-constant contribution to `pace(t)`: the level holds for the
//! event's duration, then drops back to zero. Periodic events recur every
//! `period` time units, either indefinitely or for a finite number of
//! repeats. A [`PacingSystem`] walks a protocol forward in time and exposes
//! the current level and the time of the next level change.

use crate::error::{CardioError, Result};

/// One scheduled stimulus event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingEvent {
    /// Stimulus level while the event is active.
    pub level: f64,
    /// Time of the first occurrence.
    pub start: f64,
    /// Duration of each occurrence.
    pub duration: f64,
    /// Recurrence period; `0` means the event fires once.
    pub period: f64,
    /// Number of occurrences for periodic events; `0` means indefinitely.
    pub multiplier: u32,
}

/// A finite stimulus schedule.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    events: Vec<PacingEvent>,
}

impl Protocol {
    /// Create an empty protocol (pace stays at zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the schedule.
    ///
    /// Fails on non-finite or negative times, on a `multiplier` without a
    /// period, or on an event whose duration exceeds its period (it would
    /// overlap its own next occurrence).
    pub fn schedule(
        &mut self,
        level: f64,
        start: f64,
        duration: f64,
        period: f64,
        multiplier: u32,
    ) -> Result<()> {
        if !level.is_finite() || !start.is_finite() || !duration.is_finite() || !period.is_finite()
        {
            return Err(CardioError::protocol("Event fields must be finite"));
        }
        if start < 0.0 {
            return Err(CardioError::protocol("Event start must be non-negative"));
        }
        if duration < 0.0 {
            return Err(CardioError::protocol("Event duration must be non-negative"));
        }
        if period < 0.0 {
            return Err(CardioError::protocol("Event period must be non-negative"));
        }
        if period == 0.0 && multiplier > 0 {
            return Err(CardioError::protocol(
                "A multiplier can only be set on periodic events",
            ));
        }
        if period > 0.0 && duration > period {
            return Err(CardioError::protocol(
                "Event duration must not exceed its period",
            ));
        }
        self.events.push(PacingEvent {
            level,
            start,
            duration,
            period,
            multiplier,
        });
        Ok(())
    }

    /// The scheduled events, in insertion order.
    pub fn events(&self) -> &[PacingEvent] {
        &self.events
    }

    /// True if no events are scheduled.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An event waiting for its (next) occurrence.
#[derive(Debug, Clone, Copy)]
struct Pending {
    level: f64,
    duration: f64,
    period: f64,
    /// Occurrences left; `0` means indefinitely many.
    remaining: u32,
    /// Time of the next occurrence.
    fire: f64,
}

/// Walks a [`Protocol`] forward in time.
///
/// Time starts at zero and can only move forward. Advancing is idempotent
/// when no event boundary is crossed.
#[derive(Debug, Clone)]
pub struct PacingSystem {
    pending: Vec<Pending>,
    time: f64,
    level: f64,
    /// True while an event is holding the level up; `tdown` is its end.
    active: bool,
    tdown: f64,
}

impl PacingSystem {
    /// Create a pacing system at time zero.
    ///
    /// Events starting at `t = 0` take effect immediately.
    pub fn new(protocol: &Protocol) -> Result<Self> {
        let pending = protocol
            .events
            .iter()
            .map(|e| Pending {
                level: e.level,
                duration: e.duration,
                period: e.period,
                remaining: e.multiplier,
                fire: e.start,
            })
            .collect();
        let mut system = Self {
            pending,
            time: 0.0,
            level: 0.0,
            active: false,
            tdown: f64::INFINITY,
        };
        system.catch_up(0.0)?;
        Ok(system)
    }

    /// Advance to `t`, processing every boundary up to and including it.
    pub fn advance(&mut self, t: f64) -> Result<()> {
        if !t.is_finite() {
            return Err(CardioError::protocol("Time must be finite"));
        }
        if t < self.time {
            return Err(CardioError::protocol(format!(
                "New time ({t}) cannot be before the current time ({})",
                self.time
            )));
        }
        self.time = t;
        self.catch_up(t)
    }

    /// Current stimulus level.
    pub fn pace(&self) -> f64 {
        self.level
    }

    /// Current time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time of the next level change, or infinity when none remains.
    pub fn next_time(&self) -> f64 {
        let tdown = if self.active {
            self.tdown
        } else {
            f64::INFINITY
        };
        tdown.min(self.peek_fire())
    }

    fn catch_up(&mut self, t: f64) -> Result<()> {
        loop {
            let tdown = if self.active {
                self.tdown
            } else {
                f64::INFINITY
            };
            let tfire = self.peek_fire();
            if tdown <= tfire {
                // The running event ends before anything new starts.
                if tdown > t {
                    break;
                }
                self.level = 0.0;
                self.active = false;
            } else {
                if tfire > t {
                    break;
                }
                if self.active {
                    return Err(CardioError::protocol(format!(
                        "Simultaneous pacing events at t={tfire}"
                    )));
                }
                let i = self.next_fire_index();
                let ev = &mut self.pending[i];
                self.level = ev.level;
                self.active = true;
                self.tdown = ev.fire + ev.duration;
                if ev.period > 0.0 && ev.remaining != 1 {
                    ev.fire += ev.period;
                    if ev.remaining > 1 {
                        ev.remaining -= 1;
                    }
                } else {
                    self.pending.swap_remove(i);
                }
            }
        }
        Ok(())
    }

    fn peek_fire(&self) -> f64 {
        self.pending.iter().map(|p| p.fire).fold(f64::INFINITY, f64::min)
    }

    fn next_fire_index(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.pending.iter().enumerate() {
            if p.fire < self.pending[best].fire {
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_protocol() {
        let s = PacingSystem::new(&Protocol::new()).unwrap();
        assert_eq!(s.pace(), 0.0);
        assert_eq!(s.time(), 0.0);
        assert_eq!(s.next_time(), f64::INFINITY);
    }

    #[test]
    fn test_event_at_t_0() {
        let mut p = Protocol::new();
        p.schedule(2.0, 0.0, 1.0, 10.0, 0).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        assert_eq!(s.time(), 0.0);
        assert_eq!(s.next_time(), 1.0);
        assert_eq!(s.pace(), 2.0);

        // Advancing without crossing a boundary changes nothing.
        s.advance(0.0).unwrap();
        s.advance(0.5).unwrap();
        assert_eq!(s.next_time(), 1.0);
        assert_eq!(s.pace(), 2.0);

        s.advance(1.0).unwrap();
        assert_eq!(s.next_time(), 10.0);
        assert_eq!(s.pace(), 0.0);

        s.advance(2.0).unwrap();
        assert_eq!(s.next_time(), 10.0);
        assert_eq!(s.pace(), 0.0);

        s.advance(10.0).unwrap();
        assert_eq!(s.next_time(), 11.0);
        assert_eq!(s.pace(), 2.0);

        let err = s.advance(0.0).unwrap_err();
        assert!(err.to_string().contains("cannot be before"));
    }

    #[test]
    fn test_event_at_t_1() {
        let mut p = Protocol::new();
        p.schedule(2.0, 1.0, 1.0, 10.0, 0).unwrap();
        let s = PacingSystem::new(&p).unwrap();
        assert_eq!(s.time(), 0.0);
        assert_eq!(s.next_time(), 1.0);
        assert_eq!(s.pace(), 0.0);
    }

    #[test]
    fn test_finite_multiplier() {
        let mut p = Protocol::new();
        p.schedule(1.0, 0.0, 1.0, 10.0, 2).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        assert_eq!(s.pace(), 1.0);
        s.advance(10.5).unwrap();
        // Second (and last) occurrence.
        assert_eq!(s.pace(), 1.0);
        assert_eq!(s.next_time(), 11.0);
        s.advance(25.0).unwrap();
        assert_eq!(s.pace(), 0.0);
        assert_eq!(s.next_time(), f64::INFINITY);
    }

    #[test]
    fn test_single_shot_event() {
        let mut p = Protocol::new();
        p.schedule(5.0, 2.0, 0.5, 0.0, 0).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        s.advance(2.0).unwrap();
        assert_eq!(s.pace(), 5.0);
        assert_eq!(s.next_time(), 2.5);
        s.advance(3.0).unwrap();
        assert_eq!(s.pace(), 0.0);
        assert_eq!(s.next_time(), f64::INFINITY);
    }

    #[test]
    fn test_back_to_back_events() {
        // One event ends exactly where the next begins: not simultaneous.
        let mut p = Protocol::new();
        p.schedule(1.0, 0.0, 1.0, 0.0, 0).unwrap();
        p.schedule(3.0, 1.0, 1.0, 0.0, 0).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        assert_eq!(s.pace(), 1.0);
        s.advance(1.0).unwrap();
        assert_eq!(s.pace(), 3.0);
        s.advance(2.0).unwrap();
        assert_eq!(s.pace(), 0.0);
    }

    #[test]
    fn test_simultaneous_events_rejected() {
        let mut p = Protocol::new();
        p.schedule(1.0, 0.0, 2.0, 0.0, 0).unwrap();
        p.schedule(3.0, 1.0, 1.0, 0.0, 0).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        let err = s.advance(1.5).unwrap_err();
        assert!(err.to_string().contains("Simultaneous"));
    }

    #[test]
    fn test_schedule_validation() {
        let mut p = Protocol::new();
        assert!(p.schedule(1.0, -1.0, 1.0, 0.0, 0).is_err());
        assert!(p.schedule(1.0, 0.0, -1.0, 0.0, 0).is_err());
        assert!(p.schedule(1.0, 0.0, 1.0, -1.0, 0).is_err());
        assert!(p.schedule(1.0, 0.0, 1.0, 0.0, 2).is_err());
        assert!(p.schedule(1.0, 0.0, 2.0, 1.0, 0).is_err());
        assert!(p.schedule(f64::NAN, 0.0, 1.0, 0.0, 0).is_err());
        assert!(p.is_empty());
    }

    #[test]
    fn test_idempotent_advance() {
        let mut p = Protocol::new();
        p.schedule(2.0, 0.0, 0.5, 100.0, 0).unwrap();
        let mut s = PacingSystem::new(&p).unwrap();
        s.advance(0.3).unwrap();
        let (pace, next) = (s.pace(), s.next_time());
        s.advance(0.3).unwrap();
        assert_eq!(s.pace(), pace);
        assert_eq!(s.next_time(), next);
    }
}
