//! Hysteresis-gated collision alert monitoring
//!
//! Each cycle fetches the current conjunction assessments from a feed, runs
//! every assessment through its [`AlertState`] and notifies the registered
//! sinks of newly fired alerts. An assessment has to stay above the probability
//! threshold for `fire_threshold` consecutive cycles before it fires, and below
//! it for `clear_threshold` cycles before it clears. Oscillating probability
//! histories do not fire at all.
//!
//! One cycle runs at a time: the state lock is held from the fetch until the
//! last sink returns, so a manual [`AlertMonitor::check`] waits for a running
//! background cycle.

mod feed;
mod sink;
mod state;

pub use feed::*;
pub use sink::*;
pub use state::*;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;

use crate::data::ConjunctionAssessment;
use crate::scheduler::{ScheduleError, ScheduledTask};

/// Assessments listed per category in a cycle summary
const MAX_LISTED: usize = 10;
/// Probability above which a non-emergency alert counts as high
const HIGH_PROBABILITY: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Consecutive cycles at or above threshold before an alert fires
    pub fire_threshold: u32,
    /// Consecutive cycles below threshold before a fired alert clears
    pub clear_threshold: u32,
    pub probability_threshold: f64,
    /// Feed window (hours)
    pub hours_ahead: u32,
    /// Assessments requested per fetch
    pub feed_limit: usize,
    /// States not seen for longer than this are dropped
    pub stale_after: Duration,
    /// Period of the background loop
    pub interval: std::time::Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fire_threshold: 2,
            clear_threshold: 3,
            probability_threshold: 1e-5,
            hours_ahead: 72,
            feed_limit: 100,
            stale_after: Duration::hours(24),
            interval: std::time::Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("background monitoring is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone, Serialize)]
pub struct HysteresisSummary {
    pub fire_threshold: u32,
    pub clear_threshold: u32,
    pub tracked_states: usize,
    pub active_alerts: usize,
    pub suppressed_oscillating: usize,
}

/// Outcome of a successful monitoring cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub timestamp: DateTime<Utc>,
    pub hours_ahead: u32,
    pub probability_threshold: f64,
    pub hysteresis: HysteresisSummary,
    pub total_alerts: usize,
    pub significant_alerts: usize,
    pub new_alerts: usize,
    pub cleared_alerts: usize,
    pub new_critical: usize,
    pub new_high: usize,
    /// Up to ten newly fired emergency assessments
    pub critical: Vec<ConjunctionAssessment>,
    /// Up to ten newly fired non-emergency assessments with Pc > 1e-4
    pub high: Vec<ConjunctionAssessment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum CycleReport {
    Ok(CycleSummary),
    Error {
        timestamp: DateTime<Utc>,
        error: String,
    },
}

impl CycleReport {
    pub fn is_ok(&self) -> bool {
        matches!(self, CycleReport::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub monitoring_active: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub known_alerts_count: usize,
    pub last_result: Option<CycleReport>,
}

#[derive(Default)]
struct Tracked {
    states: HashMap<String, AlertState>,
    /// Ids that have fired and not yet been evicted
    known: HashSet<String>,
}

#[derive(Default)]
struct StatusCell {
    last_check: Option<DateTime<Utc>>,
    known_alerts_count: usize,
    last_result: Option<CycleReport>,
}

pub struct AlertMonitor {
    config: MonitorConfig,
    feed: Arc<dyn ConjunctionFeed>,
    sinks: Vec<Box<dyn NotificationSink>>,
    tracked: tokio::sync::Mutex<Tracked>,
    status: RwLock<StatusCell>,
    background: Mutex<Option<ScheduledTask>>,
}

impl AlertMonitor {
    pub fn new(feed: Arc<dyn ConjunctionFeed>, config: MonitorConfig) -> Self {
        Self {
            config,
            feed,
            sinks: Vec::new(),
            tracked: tokio::sync::Mutex::new(Tracked::default()),
            status: RwLock::new(StatusCell::default()),
            background: Mutex::new(None),
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one monitoring cycle now
    pub async fn check(&self) -> Result<CycleSummary, MonitorError> {
        self.check_at(Utc::now()).await
    }

    /// Run one monitoring cycle with `now` as the cycle time
    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<CycleSummary, MonitorError> {
        let mut guard = self.tracked.lock().await;

        let assessments = match self
            .feed
            .fetch(self.config.hours_ahead, self.config.feed_limit)
            .await
        {
            Ok(assessments) => assessments,
            Err(e) => {
                log::error!("Conjunction feed {} failed: {}", self.feed.name(), e);
                self.status.write().last_result = Some(CycleReport::Error {
                    timestamp: now,
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let Tracked { states, known } = &mut *guard;

        let before = states.len();
        states.retain(|id, state| {
            let stale = state.is_stale(now, self.config.stale_after);
            if stale {
                known.remove(id);
            }
            !stale
        });
        if states.len() < before {
            log::debug!("Evicted {} stale alert states", before - states.len());
        }

        let mut fired: Vec<&ConjunctionAssessment> = Vec::new();
        let mut cleared = 0;
        let mut suppressed = 0;

        for assessment in &assessments {
            let state = states
                .entry(assessment.id.clone())
                .or_insert_with(|| AlertState::new(assessment.id.clone(), now));

            match state.observe(assessment.probability, now, &self.config) {
                Transition::Fired => {
                    known.insert(assessment.id.clone());
                    fired.push(assessment);
                }
                Transition::Cleared => {
                    log::info!("Alert {} cleared", assessment.id);
                    cleared += 1;
                }
                Transition::Suppressed => {
                    log::debug!("Alert {} suppressed, probability oscillating", assessment.id);
                    suppressed += 1;
                }
                Transition::None => {}
            }
        }

        for assessment in &fired {
            for sink in &self.sinks {
                if let Err(e) = sink.notify(assessment).await {
                    log::warn!(
                        "Sink {} failed to deliver alert {}: {}",
                        sink.name(),
                        assessment.id,
                        e
                    );
                }
            }
        }

        let critical: Vec<&ConjunctionAssessment> =
            fired.iter().copied().filter(|a| a.emergency).collect();
        let high: Vec<&ConjunctionAssessment> = fired
            .iter()
            .copied()
            .filter(|a| !a.emergency && a.probability > HIGH_PROBABILITY)
            .collect();

        let summary = CycleSummary {
            timestamp: now,
            hours_ahead: self.config.hours_ahead,
            probability_threshold: self.config.probability_threshold,
            hysteresis: HysteresisSummary {
                fire_threshold: self.config.fire_threshold,
                clear_threshold: self.config.clear_threshold,
                tracked_states: states.len(),
                active_alerts: states.values().filter(|s| s.is_fired()).count(),
                suppressed_oscillating: suppressed,
            },
            total_alerts: assessments.len(),
            significant_alerts: assessments
                .iter()
                .filter(|a| a.probability >= self.config.probability_threshold)
                .count(),
            new_alerts: fired.len(),
            cleared_alerts: cleared,
            new_critical: critical.len(),
            new_high: high.len(),
            critical: critical.into_iter().take(MAX_LISTED).cloned().collect(),
            high: high.into_iter().take(MAX_LISTED).cloned().collect(),
        };

        log::info!(
            "Monitor cycle: {} assessments, {} significant, {} new alerts, {} cleared, {} tracked",
            summary.total_alerts,
            summary.significant_alerts,
            summary.new_alerts,
            summary.cleared_alerts,
            summary.hysteresis.tracked_states
        );

        let mut status = self.status.write();
        status.last_check = Some(now);
        status.known_alerts_count = known.len();
        status.last_result = Some(CycleReport::Ok(summary.clone()));

        Ok(summary)
    }

    /// Copies of the tracked states, ordered by id
    pub async fn alert_states(&self) -> Vec<AlertState> {
        let tracked = self.tracked.lock().await;
        let mut states: Vec<AlertState> = tracked.states.values().cloned().collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    pub fn status(&self) -> MonitorStatus {
        let status = self.status.read();
        MonitorStatus {
            monitoring_active: self.is_running(),
            last_check: status.last_check,
            known_alerts_count: status.known_alerts_count,
            last_result: status.last_result.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(ScheduledTask::is_running)
    }

    /// Run [`check`](Self::check) every `config.interval` until stopped
    pub fn start_background(self: &Arc<Self>) -> Result<(), MonitorError> {
        let mut background = self.background.lock();
        if background.as_ref().is_some_and(ScheduledTask::is_running) {
            return Err(MonitorError::AlreadyRunning);
        }

        let monitor = Arc::clone(self);
        *background = Some(ScheduledTask::spawn(
            "alert-monitor",
            self.config.interval,
            move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    // Failures are already logged and recorded in the status
                    let _ = monitor.check().await;
                }
            },
        )?);

        log::info!(
            "Background monitoring started every {:?} at Pc >= {:.0e}",
            self.config.interval,
            self.config.probability_threshold
        );
        Ok(())
    }

    /// Stop the background loop; returns false if it was not running
    pub async fn stop(&self) -> bool {
        let task = self.background.lock().take();
        match task {
            Some(task) => {
                task.stop().await;
                log::info!("Background monitoring stopped");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObjectRef;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Replays one scripted batch per fetch
    struct ScriptedFeed {
        batches: Mutex<VecDeque<Result<Vec<ConjunctionAssessment>, String>>>,
    }

    impl ScriptedFeed {
        fn new(batches: Vec<Result<Vec<ConjunctionAssessment>, String>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
            })
        }
    }

    #[async_trait]
    impl ConjunctionFeed for ScriptedFeed {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(
            &self,
            _hours_ahead: u32,
            _limit: usize,
        ) -> Result<Vec<ConjunctionAssessment>, FeedError> {
            match self.batches.lock().pop_front() {
                Some(Ok(batch)) => Ok(batch),
                Some(Err(e)) => Err(FeedError::Unavailable(e)),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Holds every fetch until the gate is opened once per fetch
    #[derive(Default)]
    struct GatedFeed {
        gate: Notify,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ConjunctionFeed for GatedFeed {
        fn name(&self) -> &str {
            "gated"
        }

        async fn fetch(
            &self,
            _hours_ahead: u32,
            _limit: usize,
        ) -> Result<Vec<ConjunctionAssessment>, FeedError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(vec![assessment("cdm-1", 2e-4, false)])
        }
    }

    async fn wait_for_fetches(feed: &GatedFeed, n: usize) {
        while feed.fetches.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, assessment: &ConjunctionAssessment) -> Result<(), SinkError> {
            self.seen.lock().push(assessment.id.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn notify(&self, _assessment: &ConjunctionAssessment) -> Result<(), SinkError> {
            Err(SinkError::Delivery("connection refused".into()))
        }
    }

    fn assessment(id: &str, probability: f64, emergency: bool) -> ConjunctionAssessment {
        ConjunctionAssessment {
            id: id.to_string(),
            created: None,
            object_a: ObjectRef::new("44713"),
            object_b: ObjectRef::new("49863"),
            tca: Utc::now() + Duration::hours(12),
            miss_distance_km: 0.4,
            probability,
            relative_speed_kms: None,
            emergency,
        }
    }

    fn single(id: &str, probabilities: &[f64]) -> Vec<Result<Vec<ConjunctionAssessment>, String>> {
        probabilities
            .iter()
            .map(|&p| Ok(vec![assessment(id, p, false)]))
            .collect()
    }

    fn monitor(
        batches: Vec<Result<Vec<ConjunctionAssessment>, String>>,
    ) -> (AlertMonitor, RecordingSink) {
        let sink = RecordingSink::default();
        let mut monitor = AlertMonitor::new(ScriptedFeed::new(batches), MonitorConfig::default());
        monitor.add_sink(Box::new(sink.clone()));
        (monitor, sink)
    }

    fn cycle_times(start: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> {
        (0..).map(move |i| start + Duration::minutes(15 * i))
    }

    #[tokio::test]
    async fn test_fires_after_second_cycle_only() {
        let (monitor, sink) = monitor(single("cdm-1", &[2e-4, 2e-4, 2e-4]));
        let mut times = cycle_times(Utc::now());

        let first = monitor.check_at(times.next().unwrap()).await.unwrap();
        assert_eq!(first.new_alerts, 0);
        assert!(sink.seen.lock().is_empty());

        let second = monitor.check_at(times.next().unwrap()).await.unwrap();
        assert_eq!(second.new_alerts, 1);
        assert_eq!(second.new_high, 1);
        assert_eq!(second.hysteresis.active_alerts, 1);

        let third = monitor.check_at(times.next().unwrap()).await.unwrap();
        assert_eq!(third.new_alerts, 0);
        assert_eq!(*sink.seen.lock(), vec!["cdm-1".to_string()]);
    }

    #[tokio::test]
    async fn test_clears_on_third_below_cycle() {
        let (monitor, _sink) = monitor(single("cdm-1", &[2e-4, 2e-4, 1e-7, 1e-7, 1e-7]));
        let mut times = cycle_times(Utc::now());

        let mut summaries = Vec::new();
        for _ in 0..5 {
            summaries.push(monitor.check_at(times.next().unwrap()).await.unwrap());
        }

        assert_eq!(summaries[3].cleared_alerts, 0);
        assert_eq!(summaries[3].hysteresis.active_alerts, 1);
        assert_eq!(summaries[4].cleared_alerts, 1);
        assert_eq!(summaries[4].hysteresis.active_alerts, 0);
    }

    #[tokio::test]
    async fn test_oscillating_probability_is_suppressed() {
        let (monitor, sink) = monitor(single("cdm-1", &[2e-5, 6e-6, 2e-5, 6e-6, 2e-5, 2e-5]));
        let mut times = cycle_times(Utc::now());

        let mut last = None;
        for _ in 0..6 {
            last = Some(monitor.check_at(times.next().unwrap()).await.unwrap());
        }
        let last = last.unwrap();

        assert_eq!(last.new_alerts, 0);
        assert_eq!(last.hysteresis.suppressed_oscillating, 1);
        assert!(sink.seen.lock().is_empty());

        let states = monitor.alert_states().await;
        assert_eq!(states[0].trend(), Trend::Oscillating);
    }

    #[tokio::test]
    async fn test_stale_states_are_evicted() {
        let (monitor, _sink) = monitor(vec![
            Ok(vec![assessment("old", 2e-4, false)]),
            Ok(vec![assessment("old", 2e-4, false)]),
            Ok(vec![assessment("new", 2e-4, false)]),
        ]);
        let start = Utc::now();

        monitor.check_at(start).await.unwrap();
        monitor.check_at(start + Duration::minutes(15)).await.unwrap();
        assert_eq!(monitor.status().known_alerts_count, 1);

        let summary = monitor.check_at(start + Duration::hours(25)).await.unwrap();
        assert_eq!(summary.hysteresis.tracked_states, 1);
        assert_eq!(monitor.status().known_alerts_count, 0);

        let ids: Vec<String> = monitor.alert_states().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[tokio::test]
    async fn test_feed_error_leaves_state_untouched() {
        let (monitor, sink) = monitor(vec![
            Ok(vec![assessment("cdm-1", 2e-4, false)]),
            Err("space-track down".into()),
            Ok(vec![assessment("cdm-1", 2e-4, false)]),
        ]);
        let start = Utc::now();

        monitor.check_at(start).await.unwrap();
        let err = monitor.check_at(start + Duration::hours(30)).await.unwrap_err();
        assert!(matches!(err, MonitorError::Feed(_)));

        let status = monitor.status();
        assert!(matches!(status.last_result, Some(CycleReport::Error { .. })));
        assert_eq!(status.last_check, Some(start));

        // Neither evicted nor reset by the failed cycle
        let states = monitor.alert_states().await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].consecutive_above(), 1);
        assert_eq!(states[0].last_seen, start);

        let summary = monitor.check_at(start + Duration::minutes(30)).await.unwrap();
        assert_eq!(summary.new_alerts, 1);
        assert_eq!(sink.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let sink = RecordingSink::default();
        let mut monitor = AlertMonitor::new(
            ScriptedFeed::new(vec![
                Ok(vec![assessment("cdm-9", 5e-3, true)]),
                Ok(vec![assessment("cdm-9", 5e-3, true)]),
            ]),
            MonitorConfig::default(),
        );
        monitor.add_sink(Box::new(FailingSink));
        monitor.add_sink(Box::new(sink.clone()));

        let start = Utc::now();
        monitor.check_at(start).await.unwrap();
        let summary = monitor
            .check_at(start + Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(summary.new_critical, 1);
        assert_eq!(summary.critical[0].id, "cdm-9");
        assert_eq!(*sink.seen.lock(), vec!["cdm-9".to_string()]);
    }

    #[tokio::test]
    async fn test_cycle_report_serializes_with_status_tag() {
        let (monitor, _sink) = monitor(vec![Ok(vec![]), Err("timeout".into())]);

        monitor.check().await.unwrap();
        let ok = serde_json::to_value(monitor.status().last_result.unwrap()).unwrap();
        assert_eq!(ok["status"], "OK");
        assert_eq!(ok["hysteresis"]["fire_threshold"], 2);

        monitor.check().await.unwrap_err();
        let err = serde_json::to_value(monitor.status().last_result.unwrap()).unwrap();
        assert_eq!(err["status"], "ERROR");
        assert!(err["error"].as_str().unwrap().contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refuses_second_start() {
        let (monitor, _sink) = monitor(single("cdm-1", &[2e-4, 2e-4]));
        let monitor = Arc::new(monitor);

        monitor.start_background().unwrap();
        assert!(matches!(
            monitor.start_background(),
            Err(MonitorError::AlreadyRunning)
        ));
        assert!(monitor.status().monitoring_active);

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(monitor.status().last_check.is_some());

        assert!(monitor.stop().await);
        assert!(!monitor.status().monitoring_active);
        assert!(!monitor.stop().await);
    }

    #[tokio::test]
    async fn test_background_rejects_zero_interval() {
        let monitor = Arc::new(AlertMonitor::new(
            ScriptedFeed::new(vec![]),
            MonitorConfig {
                interval: std::time::Duration::ZERO,
                ..MonitorConfig::default()
            },
        ));

        assert!(matches!(
            monitor.start_background(),
            Err(MonitorError::Schedule(ScheduleError::ZeroPeriod(_)))
        ));
        assert!(!monitor.is_running());
        assert!(!monitor.stop().await);
    }

    #[tokio::test]
    async fn test_concurrent_checks_run_one_at_a_time() {
        let feed = Arc::new(GatedFeed::default());
        let sink = RecordingSink::default();
        let mut monitor = AlertMonitor::new(feed.clone(), MonitorConfig::default());
        monitor.add_sink(Box::new(sink.clone()));
        let monitor = Arc::new(monitor);
        let mut times = cycle_times(Utc::now());

        let first = {
            let monitor = Arc::clone(&monitor);
            let at = times.next().unwrap();
            tokio::spawn(async move { monitor.check_at(at).await })
        };
        wait_for_fetches(&feed, 1).await;

        let second = {
            let monitor = Arc::clone(&monitor);
            let at = times.next().unwrap();
            tokio::spawn(async move { monitor.check_at(at).await })
        };
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // The second cycle is parked on the cycle lock, not inside the feed
        assert_eq!(feed.fetches.load(Ordering::SeqCst), 1);
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        feed.gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.new_alerts, 0);

        wait_for_fetches(&feed, 2).await;
        feed.gate.notify_one();
        let second = second.await.unwrap().unwrap();
        assert_eq!(second.new_alerts, 1);

        let states = monitor.alert_states().await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].consecutive_above(), 2);
        assert_eq!(*sink.seen.lock(), vec!["cdm-1".to_string()]);
    }
}
