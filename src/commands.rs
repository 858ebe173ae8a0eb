use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use orbitwatch::analysis::{
    visible_stations, AltitudeBand, DensityGrid, GroundStation, PassPredictor, RiskAnalyzer,
    ShellSpec, VisibleStation,
};
use orbitwatch::data::TleFileSource;
use orbitwatch::monitor::{AlertMonitor, JsonFileFeed, LogSink, MonitorConfig, WebhookSink};
use orbitwatch::propagation::{GeoPoint, PropagationService};
use orbitwatch::scheduler::ScheduledTask;
use orbitwatch::synthetic::{PathPoint, SyntheticConstellation};

#[derive(Args, Debug, Clone)]
pub struct RiskArgs {
    /// Catalog id of the object to analyze
    pub target: String,
    /// Scan horizon in hours (capped at 24 for target reports)
    #[arg(long, default_value_t = 24)]
    pub hours: u32,
    /// Re-read the element file and repeat the analysis every N minutes
    #[arg(long)]
    pub watch_minutes: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct TcaArgs {
    pub id_a: String,
    pub id_b: String,
    /// Scan horizon in hours
    #[arg(long, default_value_t = 24)]
    pub hours: u32,
    /// Scan step in seconds
    #[arg(long, default_value_t = 60)]
    pub step_seconds: u32,
}

#[derive(Args, Debug, Clone)]
pub struct DensityArgs {
    /// Shell altitude in km
    #[arg(long, default_value_t = 550.0)]
    pub altitude: f64,
    /// Half-width of the shell in km
    #[arg(long, default_value_t = 50.0)]
    pub tolerance: f64,
}

#[derive(Args, Debug, Clone)]
pub struct HotspotArgs {
    /// Latitude zone size in degrees
    #[arg(long, default_value_t = 5.0)]
    pub lat_step: f64,
    /// Altitude band size in km
    #[arg(long, default_value_t = 50.0)]
    pub alt_step: f64,
}

#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    /// Catalog id, or a STARLINK-<n> id of the synthetic constellation
    pub id: String,
    /// Track length in hours
    #[arg(long, default_value_t = 2)]
    pub hours: u32,
    /// Number of points
    #[arg(long, default_value_t = 100)]
    pub steps: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ProximityArgs {
    /// Lowest risk score reported, 0 to 1
    #[arg(long, default_value_t = 0.3)]
    pub min_risk: f64,
    /// Alerts reported
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..=100))]
    pub limit: u16,
}

#[derive(Args, Debug, Clone)]
pub struct PassArgs {
    /// Catalog id of the object
    pub id: String,
    /// Ground station name (case-insensitive)
    #[arg(long, default_value = "Svalbard (SvalSat)")]
    pub station: String,
    /// Prediction window in hours
    #[arg(long, default_value_t = 24)]
    pub hours: u32,
    /// Sampling step in minutes
    #[arg(long, default_value_t = 1)]
    pub step_minutes: u32,
}

#[derive(Args, Debug, Clone)]
pub struct VisibilityArgs {
    /// Catalog id of the object
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// JSON file of CDM records (plain or .gz), re-read every cycle
    #[arg(long)]
    pub cdm: PathBuf,
    /// Minutes between cycles
    #[arg(long, default_value_t = 15)]
    pub interval_minutes: u64,
    /// Probability of collision that counts as significant
    #[arg(long, default_value_t = 1e-5)]
    pub threshold: f64,
    /// Consecutive significant cycles before an alert fires
    #[arg(long, default_value_t = 2)]
    pub fire_threshold: u32,
    /// Consecutive quiet cycles before a fired alert clears
    #[arg(long, default_value_t = 3)]
    pub clear_threshold: u32,
    /// Feed window in hours
    #[arg(long, default_value_t = 72)]
    pub hours: u32,
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
    /// POST fired alerts to this URL
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    pub webhook: Option<String>,
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("Failed to write output")?;
    writeln!(out)?;
    Ok(())
}

async fn load_service(tle: Option<&Path>) -> Result<Arc<PropagationService>> {
    let path = tle.ok_or_else(|| anyhow!("an element file is required (--tle or ORBITWATCH_TLE)"))?;
    let service = Arc::new(PropagationService::new());
    let summary = service
        .refresh(&TleFileSource::new(path))
        .await
        .with_context(|| format!("Failed to load element sets from {:?}", path))?;
    if summary.loaded == 0 {
        bail!("no usable element sets in {:?}", path);
    }
    Ok(service)
}

/// Current positions from the element file, or the synthetic constellation
async fn population(tle: Option<&Path>) -> Vec<GeoPoint> {
    if let Some(path) = tle {
        match load_service(Some(path)).await {
            Ok(service) => {
                let points: Vec<GeoPoint> = service
                    .snapshot(Utc::now())
                    .iter()
                    .map(|s| s.geo_point())
                    .collect();
                if !points.is_empty() {
                    return points;
                }
                log::warn!("No element set propagated to the current time");
            }
            Err(e) => log::warn!("{:#}", e),
        }
    }

    log::info!("Using the synthetic constellation");
    SyntheticConstellation::default()
        .all_positions()
        .iter()
        .map(|p| p.geo_point())
        .collect()
}

pub async fn run_risk(tle: Option<&Path>, args: RiskArgs) -> Result<()> {
    let service = load_service(tle).await?;

    let Some(minutes) = args.watch_minutes else {
        return analyze_with_progress(&RiskAnalyzer::new(service), &args);
    };

    let path = tle.ok_or_else(|| anyhow!("an element file is required"))?;
    let period = StdDuration::from_secs(minutes.max(1) * 60);
    let refresh = service.spawn_refresh(Arc::new(TleFileSource::new(path)), period)?;

    let analyzer = Arc::new(RiskAnalyzer::new(service));
    let watch = ScheduledTask::spawn("risk-watch", period, move || {
        let analyzer = Arc::clone(&analyzer);
        let args = args.clone();
        async move {
            let result = tokio::task::spawn_blocking(move || {
                let report = analyzer.analyze_target(&args.target, args.hours)?;
                emit(&report)
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Risk analysis failed: {:#}", e),
                Err(e) => log::error!("Risk analysis task failed: {}", e),
            }
        }
    })?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log::info!("Shutting down");

    watch.stop().await;
    refresh.stop().await;
    Ok(())
}

fn analyze_with_progress(analyzer: &RiskAnalyzer, args: &RiskArgs) -> Result<()> {
    let start = Utc::now();
    let config = analyzer.config();

    let neighbors = analyzer.find_neighbors_at(&args.target, config.altitude_band_km, start)?;
    let analyzed = neighbors.len().min(config.max_neighbors) as u64;
    log::info!(
        "{} neighbors of {} in band, analyzing {}",
        neighbors.len(),
        args.target,
        analyzed
    );

    let progress = ProgressBar::new(analyzed);
    progress.set_style(
        ProgressStyle::with_template("{elapsed_precise} {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("##-"),
    );

    let report = analyzer.analyze_target_with(&args.target, args.hours, start, |id| {
        progress.set_message(id.to_string());
        progress.inc(1);
    })?;
    progress.finish_and_clear();

    emit(&report)
}

#[derive(Serialize)]
struct TcaOutput {
    estimate: orbitwatch::analysis::TcaEstimate,
    assessment: orbitwatch::data::ConjunctionAssessment,
    risk_level: orbitwatch::data::RiskLevel,
}

pub async fn run_tca(tle: Option<&Path>, args: TcaArgs) -> Result<()> {
    let service = load_service(tle).await?;
    let analyzer = RiskAnalyzer::new(service);

    let estimate = analyzer.calculate_tca(&args.id_a, &args.id_b, args.hours, args.step_seconds)?;
    let assessment = estimate.clone().into_assessment();
    let risk_level = assessment.risk_level();

    emit(&TcaOutput {
        estimate,
        assessment,
        risk_level,
    })
}

pub async fn run_density(tle: Option<&Path>, args: DensityArgs) -> Result<()> {
    let grid = DensityGrid::new(population(tle).await);
    emit(&grid.analyze_density(args.altitude, args.tolerance))
}

pub async fn run_distribution(tle: Option<&Path>) -> Result<()> {
    let grid = DensityGrid::new(population(tle).await);
    emit(&grid.altitude_distribution(&AltitudeBand::defaults()))
}

pub async fn run_hotspots(tle: Option<&Path>, args: HotspotArgs) -> Result<()> {
    if args.lat_step <= 0.0 || args.alt_step <= 0.0 {
        bail!("grid steps must be > 0");
    }
    let grid = DensityGrid::new(population(tle).await);
    emit(&grid.hotspots(args.lat_step, args.alt_step))
}

/// Total span and step of a track of `steps` points over `hours`
fn track_window(hours: u32, steps: usize) -> Result<(Duration, Duration)> {
    let count = i32::try_from(steps)
        .with_context(|| format!("{} steps is more than a track can hold", steps))?;
    if count == 0 {
        bail!("steps must be > 0");
    }
    let step = Duration::milliseconds(i64::from(hours) * 3_600_000 / i64::from(count));
    Ok((step * count, step))
}

pub async fn run_track(tle: Option<&Path>, args: TrackArgs) -> Result<()> {
    if args.steps == 0 {
        bail!("steps must be > 0");
    }

    if let Some(path) = tle {
        let service = load_service(Some(path)).await?;
        if service.element(&args.id).is_some() {
            let (total, step) = track_window(args.hours, args.steps)?;
            let track: Vec<PathPoint> = service
                .propagate_series(&args.id, Utc::now(), total, step)?
                .map(|s| PathPoint {
                    t: s.timestamp,
                    latitude: s.geodetic.latitude,
                    longitude: s.geodetic.longitude,
                    altitude_km: s.geodetic.altitude_km,
                })
                .collect();
            return emit(&track);
        }
        log::info!("{} not in {:?}, trying the synthetic constellation", args.id, path);
    }

    let constellation = SyntheticConstellation::default();
    let track = constellation
        .orbit_path(&args.id, args.hours, args.steps)
        .ok_or_else(|| anyhow!("unknown object {}", args.id))?;
    emit(track.as_ref())
}

pub async fn run_health(tle: Option<&Path>) -> Result<()> {
    let shells = ShellSpec::starlink();

    if let Some(path) = tle {
        match load_service(Some(path)).await {
            Ok(service) => {
                let grid = DensityGrid::from_states(&service.snapshot(Utc::now()));
                if !grid.is_empty() {
                    let health = grid
                        .constellation_health(&shells)
                        .with_names(|id| service.name(id));
                    return emit(&health);
                }
                log::warn!("No element set propagated to the current time");
            }
            Err(e) => log::warn!("{:#}", e),
        }
    }

    let grid = DensityGrid::new(population(None).await);
    emit(&grid.constellation_health(&shells))
}

pub async fn run_proximity(tle: Option<&Path>, args: ProximityArgs) -> Result<()> {
    let analyzer = RiskAnalyzer::new(load_service(tle).await?);
    let report = analyzer.proximity_sweep(args.min_risk, usize::from(args.limit))?;
    emit(&report)
}

pub async fn run_passes(tle: Option<&Path>, args: PassArgs) -> Result<()> {
    let stations = GroundStation::defaults();
    let station = GroundStation::find(&stations, &args.station).ok_or_else(|| {
        let known: Vec<&str> = stations.iter().map(|s| s.name.as_str()).collect();
        anyhow!("unknown station {:?}, expected one of {:?}", args.station, known)
    })?;

    let predictor = PassPredictor::new(load_service(tle).await?);
    let passes = predictor.next_passes(&args.id, station, args.hours, args.step_minutes)?;
    emit(&passes)
}

#[derive(Serialize)]
struct VisibilityOutput {
    position: GeoPoint,
    stations: Vec<VisibleStation>,
}

pub async fn run_visibility(tle: Option<&Path>, args: VisibilityArgs) -> Result<()> {
    let service = load_service(tle).await?;
    let position = service.propagate_now(&args.id)?.geo_point();
    let stations = visible_stations(&position, &GroundStation::defaults());
    emit(&VisibilityOutput { position, stations })
}

pub async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let config = MonitorConfig {
        fire_threshold: args.fire_threshold,
        clear_threshold: args.clear_threshold,
        probability_threshold: args.threshold,
        hours_ahead: args.hours,
        interval: StdDuration::from_secs(args.interval_minutes.max(1) * 60),
        ..MonitorConfig::default()
    };

    let mut monitor = AlertMonitor::new(Arc::new(JsonFileFeed::new(&args.cdm)), config);
    monitor.add_sink(Box::new(LogSink));
    if let Some(url) = &args.webhook {
        monitor.add_sink(Box::new(WebhookSink::new(url.as_str())?));
        log::info!("Webhook notifications enabled");
    }
    let monitor = Arc::new(monitor);

    if args.once {
        let summary = monitor.check().await?;
        return emit(&summary);
    }

    monitor.start_background()?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log::info!("Shutting down");

    monitor.stop().await;
    emit(&monitor.status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_window() {
        let (total, step) = track_window(2, 100).unwrap();
        assert_eq!(step, Duration::seconds(72));
        assert_eq!(total, Duration::hours(2));

        assert!(track_window(2, 0).is_err());
        assert!(track_window(2, i32::MAX as usize + 1).is_err());
    }
}
