//! Per-assessment hysteresis state

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::MonitorConfig;

/// Probability samples kept per assessment
pub const MAX_HISTORY: usize = 10;

/// Share of deltas that must agree for a directional trend
const TREND_MAJORITY: f64 = 0.7;

/// Direction of the recent probability history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    Oscillating,
    /// Fewer than three samples
    Unknown,
}

impl Trend {
    pub fn classify<'a>(samples: impl IntoIterator<Item = &'a f64>) -> Trend {
        let samples: Vec<f64> = samples.into_iter().copied().collect();
        if samples.len() < 3 {
            return Trend::Unknown;
        }

        let deltas = samples.len() - 1;
        let (mut rising, mut falling) = (0usize, 0usize);
        for pair in samples.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                rising += 1;
            } else if delta < 0.0 {
                falling += 1;
            }
        }

        let majority = deltas as f64 * TREND_MAJORITY;
        if rising as f64 > majority {
            Trend::Rising
        } else if falling as f64 > majority {
            Trend::Falling
        } else if rising > 0 && falling > 0 && rising.abs_diff(falling) <= 1 {
            Trend::Oscillating
        } else {
            Trend::Stable
        }
    }
}

/// Where an assessment sits in the BELOW → RISING → FIRED → FALLING cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPhase {
    Below,
    Rising,
    Fired,
    Falling,
}

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Fired,
    Cleared,
    /// Would have fired but the history is oscillating
    Suppressed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertState {
    pub id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    consecutive_above: u32,
    consecutive_below: u32,
    fired: bool,
    history: VecDeque<f64>,
}

impl AlertState {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            first_seen: now,
            last_seen: now,
            consecutive_above: 0,
            consecutive_below: 0,
            fired: false,
            history: VecDeque::with_capacity(MAX_HISTORY),
        }
    }

    /// Record one cycle's probability and apply the hysteresis rules
    pub fn observe(
        &mut self,
        probability: f64,
        now: DateTime<Utc>,
        config: &MonitorConfig,
    ) -> Transition {
        self.last_seen = now;
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(probability);

        if probability >= config.probability_threshold {
            self.consecutive_above += 1;
            self.consecutive_below = 0;

            if self.consecutive_above >= config.fire_threshold && !self.fired {
                if self.trend() == Trend::Oscillating {
                    return Transition::Suppressed;
                }
                self.fired = true;
                return Transition::Fired;
            }
        } else {
            self.consecutive_below += 1;
            self.consecutive_above = 0;

            if self.consecutive_below >= config.clear_threshold && self.fired {
                self.fired = false;
                return Transition::Cleared;
            }
        }

        Transition::None
    }

    pub fn trend(&self) -> Trend {
        Trend::classify(&self.history)
    }

    pub fn phase(&self) -> AlertPhase {
        match (self.fired, self.consecutive_above, self.consecutive_below) {
            (false, 0, _) => AlertPhase::Below,
            (false, _, _) => AlertPhase::Rising,
            (true, _, 0) => AlertPhase::Fired,
            (true, _, _) => AlertPhase::Falling,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired
    }

    pub fn consecutive_above(&self) -> u32 {
        self.consecutive_above
    }

    pub fn consecutive_below(&self) -> u32 {
        self.consecutive_below
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.last_seen > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(state: &mut AlertState, samples: &[f64]) -> Vec<Transition> {
        let config = MonitorConfig::default();
        let start = state.last_seen;
        samples
            .iter()
            .enumerate()
            .map(|(i, &p)| state.observe(p, start + Duration::minutes(15 * i as i64), &config))
            .collect()
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(Trend::classify(&[1e-5, 2e-5]), Trend::Unknown);
        assert_eq!(Trend::classify(&[1e-5, 2e-5, 3e-5, 4e-5]), Trend::Rising);
        assert_eq!(Trend::classify(&[4e-5, 3e-5, 2e-5, 1e-5]), Trend::Falling);
        assert_eq!(Trend::classify(&[2e-5, 2e-5, 2e-5]), Trend::Stable);
        assert_eq!(
            Trend::classify(&[2e-5, 6e-6, 2e-5, 6e-6, 2e-5]),
            Trend::Oscillating
        );
        // Two up and one down is close enough to balanced
        assert_eq!(Trend::classify(&[1.0, 2.0, 3.0, 3.0, 2.0]), Trend::Oscillating);
        assert_eq!(Trend::classify(&[1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 3.0]), Trend::Stable);
    }

    #[test]
    fn test_fires_on_second_consecutive_above() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let transitions = run(&mut state, &[2e-5, 3e-5, 4e-5]);

        assert_eq!(
            transitions,
            vec![Transition::None, Transition::Fired, Transition::None]
        );
        assert_eq!(state.phase(), AlertPhase::Fired);
    }

    #[test]
    fn test_clears_on_third_consecutive_below() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let transitions = run(&mut state, &[2e-5, 3e-5, 1e-6, 1e-6, 1e-6]);

        assert_eq!(transitions[1], Transition::Fired);
        assert_eq!(transitions[3], Transition::None);
        assert_eq!(transitions[4], Transition::Cleared);
        assert_eq!(state.phase(), AlertPhase::Below);
    }

    #[test]
    fn test_counters_never_both_nonzero() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let config = MonitorConfig::default();
        for (i, p) in [2e-5, 1e-6, 3e-5, 3e-5, 1e-7, 1e-7, 5e-5].iter().enumerate() {
            state.observe(*p, Utc::now() + Duration::minutes(i as i64), &config);
            assert!(state.consecutive_above() == 0 || state.consecutive_below() == 0);
            if state.is_fired() {
                assert!(state.history().count() > 0);
            }
        }
    }

    #[test]
    fn test_falling_phase_keeps_alert_fired() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        run(&mut state, &[2e-5, 3e-5, 1e-6]);

        assert!(state.is_fired());
        assert_eq!(state.phase(), AlertPhase::Falling);
    }

    #[test]
    fn test_oscillating_history_suppresses_fire() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let transitions = run(&mut state, &[2e-5, 6e-6, 2e-5, 6e-6, 2e-5, 2e-5]);

        assert!(transitions[..5].iter().all(|t| *t == Transition::None));
        assert_eq!(transitions[5], Transition::Suppressed);
        assert!(!state.is_fired());
        assert_eq!(state.phase(), AlertPhase::Rising);
    }

    #[test]
    fn test_suppression_lifts_once_trend_settles() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let transitions = run(
            &mut state,
            &[2e-5, 6e-6, 2e-5, 6e-6, 2e-5, 2e-5, 3e-5, 4e-5],
        );

        assert_eq!(transitions[5], Transition::Suppressed);
        assert_eq!(transitions[6], Transition::Suppressed);
        // Four rises against two falls no longer counts as oscillating
        assert_eq!(state.trend(), Trend::Stable);
        assert_eq!(transitions[7], Transition::Fired);
        assert!(state.is_fired());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = AlertState::new("cdm-1", Utc::now());
        let samples: Vec<f64> = (0..25).map(|i| i as f64 * 1e-6).collect();
        run(&mut state, &samples);

        let history: Vec<f64> = state.history().collect();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0], 15.0 * 1e-6);
    }

    #[test]
    fn test_staleness() {
        let seen = Utc::now();
        let state = AlertState::new("cdm-1", seen);

        assert!(!state.is_stale(seen + Duration::hours(24), Duration::hours(24)));
        assert!(state.is_stale(seen + Duration::hours(25), Duration::hours(24)));
    }
}
