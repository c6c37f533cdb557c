//! Periodic pulling by the event sink.

/// How often the event sink brings a field up to date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Period {
    /// At most once per this many seconds of scene time.
    Seconds(f64),
    /// Skip this many frames between pulls.
    Frames(u32),
}

/// Attached to a field with [`crate::FieldBuilder::periodic`]. The field is
/// routed into the event sink when it is added to the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicUpdate {
    period: Period,
    last_update: Option<f64>,
    skipped: u32,
}

impl PeriodicUpdate {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            last_update: None,
            skipped: 0,
        }
    }

    pub fn every_seconds(seconds: f64) -> Self {
        Self::new(Period::Seconds(seconds))
    }

    pub fn every_frames(skip: u32) -> Self {
        Self::new(Period::Frames(skip))
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Called once per sink pull with the current scene time.
    pub(crate) fn time_to_update(&mut self, now: f64) -> bool {
        match self.period {
            Period::Seconds(period) => {
                let due = self.last_update.map_or(true, |last| now - last >= period);
                if due {
                    self.last_update = Some(now);
                }
                due
            }
            Period::Frames(skip) => {
                if self.skipped >= skip {
                    self.skipped = 0;
                    true
                } else {
                    self.skipped += 1;
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_period_uses_scene_time() {
        let mut p = PeriodicUpdate::every_seconds(0.5);
        assert!(p.time_to_update(10.0));
        assert!(!p.time_to_update(10.2));
        assert!(p.time_to_update(10.5));
        assert!(!p.time_to_update(10.9));
    }

    #[test]
    fn frame_period_skips_frames() {
        let mut p = PeriodicUpdate::every_frames(2);
        let pulls: Vec<bool> = (0..6).map(|_| p.time_to_update(0.0)).collect();
        assert_eq!(pulls, [false, false, true, false, false, true]);

        let mut every = PeriodicUpdate::every_frames(0);
        assert!(every.time_to_update(0.0));
        assert!(every.time_to_update(0.0));
    }
}
