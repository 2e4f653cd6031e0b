use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;

/// How the update loop spaces its iterations in wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Waits the full interval after every step.
    #[default]
    Fixed,
    /// Waits the interval minus the time spent in the step.
    Realtime,
    /// Never waits. Simulated time still advances by the timestep.
    Simulated,
}

const LIMIT_TOLERANCE: f64 = 1e-9;

/// Upper bound on simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RunLimit {
    #[default]
    Indefinite,
    /// Stop once simulated time passes this many seconds.
    Until(f64),
}

impl RunLimit {
    /// Finite, non-negative seconds bound the run; anything else runs forever.
    pub fn from_seconds(seconds: Option<f64>) -> Self {
        match seconds {
            Some(limit) if limit.is_finite() && limit >= 0.0 => RunLimit::Until(limit),
            _ => RunLimit::Indefinite,
        }
    }

    /// Whether a step at `time_s` is still inside the limit. Times within
    /// accumulated rounding of the limit count as inside.
    pub fn allows(&self, time_s: f64) -> bool {
        match self {
            RunLimit::Indefinite => true,
            RunLimit::Until(limit) => {
                time_s <= *limit + limit.abs().max(1.0) * LIMIT_TOLERANCE
            }
        }
    }

    pub fn seconds(&self) -> Option<f64> {
        match self {
            RunLimit::Indefinite => None,
            RunLimit::Until(limit) => Some(*limit),
        }
    }
}

/// Spaces loop iterations according to a [`Pacing`] mode.
#[derive(Debug)]
pub struct Pacer {
    pacing: Pacing,
    interval: Duration,
    step_started: Instant,
}

impl Pacer {
    pub fn new(pacing: Pacing, interval: Duration) -> Self {
        Self {
            pacing,
            interval,
            step_started: Instant::now(),
        }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Marks the start of a step.
    pub fn begin(&mut self) {
        self.step_started = Instant::now();
    }

    /// Time left to wait before the next step.
    pub fn remaining(&self) -> Duration {
        match self.pacing {
            Pacing::Fixed => self.interval,
            Pacing::Realtime => self.interval.saturating_sub(self.step_started.elapsed()),
            Pacing::Simulated => Duration::ZERO,
        }
    }

    /// Waits out the rest of the interval. Returns `false` if cancelled.
    pub fn wait(&self, token: &CancelToken) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return !token.is_cancelled();
        }
        token.sleep(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn run_limit_from_seconds() {
        assert_eq!(RunLimit::from_seconds(Some(10.0)), RunLimit::Until(10.0));
        assert_eq!(RunLimit::from_seconds(Some(0.0)), RunLimit::Until(0.0));
        assert_eq!(RunLimit::from_seconds(Some(-1.0)), RunLimit::Indefinite);
        assert_eq!(RunLimit::from_seconds(Some(f64::NAN)), RunLimit::Indefinite);
        assert_eq!(RunLimit::from_seconds(None), RunLimit::Indefinite);
    }

    #[test]
    fn run_limit_is_inclusive() {
        let limit = RunLimit::Until(0.3);
        assert!(limit.allows(0.3));
        assert!(limit.allows(3.0 * 0.1));
        assert!(!limit.allows(0.31));
        assert!(RunLimit::Indefinite.allows(f64::MAX));
    }

    #[test]
    fn realtime_subtracts_step_duration() {
        let mut pacer = Pacer::new(Pacing::Realtime, Duration::from_millis(50));
        pacer.begin();
        thread::sleep(Duration::from_millis(20));
        assert!(pacer.remaining() <= Duration::from_millis(30));

        let mut slow = Pacer::new(Pacing::Realtime, Duration::from_millis(5));
        slow.begin();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(slow.remaining(), Duration::ZERO);
    }

    #[test]
    fn fixed_and_simulated() {
        let fixed = Pacer::new(Pacing::Fixed, Duration::from_millis(100));
        assert_eq!(fixed.remaining(), Duration::from_millis(100));
        let simulated = Pacer::new(Pacing::Simulated, Duration::from_millis(100));
        assert_eq!(simulated.remaining(), Duration::ZERO);
        assert!(simulated.wait(&CancelToken::new()));
    }

    #[test]
    fn pacing_uses_snake_case_names() {
        let pacing: Pacing = serde_json::from_str("\"realtime\"").unwrap();
        assert_eq!(pacing, Pacing::Realtime);
        assert_eq!(serde_json::to_string(&Pacing::Simulated).unwrap(), "\"simulated\"");
    }
}
