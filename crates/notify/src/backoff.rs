//! Reconnect backoff schedule
//!
//! Wait times are looked up in a fixed table indexed by the number of
//! consecutive unwanted closures since the last successful open.

use std::time::Duration;

/// Default wait times in seconds
pub const DEFAULT_SCHEDULE_SECS: [u64; 5] = [0, 15, 30, 75, 120];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<u64>,
    index: usize,
}

impl BackoffSchedule {
    /// Create a schedule from wait times in seconds
    ///
    /// Returns `None` for an empty table.
    pub fn new(steps: Vec<u64>) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        Some(Self { steps, index: 0 })
    }

    /// Wait in seconds before the next reconnect attempt
    pub fn current_secs(&self) -> u64 {
        self.steps[self.index]
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs(self.current_secs())
    }

    /// Record an unwanted closure, saturating at the last entry
    pub fn advance(&mut self) {
        if self.index < self.steps.len() - 1 {
            self.index += 1;
        }
    }

    /// Record a successful open
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn steps(&self) -> &[u64] {
        &self.steps
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            steps: DEFAULT_SCHEDULE_SECS.to_vec(),
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_schedule_rejected() {
        assert!(BackoffSchedule::new(Vec::new()).is_none());
    }

    #[test]
    fn test_waits_follow_schedule_and_saturate() {
        let mut backoff = BackoffSchedule::default();
        let mut waits = Vec::new();
        for _ in 0..8 {
            waits.push(backoff.current_secs());
            backoff.advance();
        }
        assert_eq!(waits, vec![0, 15, 30, 75, 120, 120, 120, 120]);
        assert_eq!(backoff.index(), 4);
    }

    #[test]
    fn test_reset_returns_to_first_step() {
        let mut backoff = BackoffSchedule::default();
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_secs(30));

        backoff.reset();
        assert_eq!(backoff.index(), 0);
        assert_eq!(backoff.current(), Duration::ZERO);
    }

    #[test]
    fn test_single_step_schedule() {
        let mut backoff = BackoffSchedule::new(vec![5]).unwrap();
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.index(), 0);
        assert_eq!(backoff.current_secs(), 5);
    }
}
