//! Spatial density over a position snapshot
//!
//! Everything here is rebuilt from scratch per query; the grid holds only the
//! snapshot it was built from.

use std::collections::HashMap;
use std::f64::consts::PI;

use serde::Serialize;

use crate::propagation::{GeoPoint, StateVector, EARTH_RADIUS_KM};

const MAX_DENSITY_SAMPLES: usize = 100;
const MAX_CELL_SAMPLES: usize = 5;
const HOTSPOT_MIN_COUNT: usize = 10;
const MAX_HOTSPOTS: usize = 20;

/// A `[low, high)` altitude band in km
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeBand {
    pub name: String,
    pub low_km: f64,
    pub high_km: f64,
}

impl AltitudeBand {
    pub fn new(name: impl Into<String>, low_km: f64, high_km: f64) -> Self {
        Self {
            name: name.into(),
            low_km,
            high_km,
        }
    }

    pub fn contains(&self, altitude_km: f64) -> bool {
        self.low_km <= altitude_km && altitude_km < self.high_km
    }

    /// The five LEO/MEO bands used by default
    pub fn defaults() -> Vec<AltitudeBand> {
        vec![
            AltitudeBand::new("LEO-Low", 200.0, 400.0),
            AltitudeBand::new("LEO-Mid", 400.0, 600.0),
            AltitudeBand::new("LEO-High", 600.0, 800.0),
            AltitudeBand::new("LEO-Upper", 800.0, 1200.0),
            AltitudeBand::new("MEO-Low", 1200.0, 2000.0),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DensityReport {
    pub target_altitude_km: f64,
    pub tolerance_km: f64,
    pub count: usize,
    /// Objects per 1000 km² of the shell surface at the target altitude
    pub density_per_1000km2: f64,
    /// Up to 100 members, snapshot order
    pub objects: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BandCount {
    pub band: AltitudeBand,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AltitudeDistribution {
    pub total: usize,
    pub bands: Vec<BandCount>,
}

/// One latitude-zone × altitude-band cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCell {
    pub latitude_zone: f64,
    pub altitude_band_km: f64,
    pub count: usize,
    /// Up to five member ids, first come first kept
    pub sample_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotReport {
    pub total: usize,
    pub grid_cells: usize,
    pub hotspots: Vec<DensityCell>,
}

/// Round to the nearest multiple of `step`, ties to even, as a multiple index
fn quantize(value: f64, step: f64) -> i64 {
    (value / step).round_ties_even() as i64
}

/// Grid key of a position: nearest latitude and altitude multiples
pub fn grid_key(latitude: f64, altitude_km: f64, lat_step_deg: f64, alt_step_km: f64) -> (f64, f64) {
    (
        quantize(latitude, lat_step_deg) as f64 * lat_step_deg,
        quantize(altitude_km, alt_step_km) as f64 * alt_step_km,
    )
}

/// Round to two decimals
pub(super) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Density queries over one position snapshot
#[derive(Debug, Clone, Default)]
pub struct DensityGrid {
    points: Vec<GeoPoint>,
}

impl DensityGrid {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    pub fn from_states(states: &[StateVector]) -> Self {
        Self::new(states.iter().map(StateVector::geo_point).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Objects within `tolerance_km` of a target altitude
    pub fn analyze_density(&self, target_altitude_km: f64, tolerance_km: f64) -> DensityReport {
        let members: Vec<&GeoPoint> = self
            .points
            .iter()
            .filter(|p| (p.altitude_km - target_altitude_km).abs() <= tolerance_km)
            .collect();

        let shell_radius = EARTH_RADIUS_KM + target_altitude_km;
        let area_per_1000km2 = 4.0 * PI * shell_radius * shell_radius / 1e6;
        let density = if area_per_1000km2 > 0.0 {
            members.len() as f64 / area_per_1000km2
        } else {
            0.0
        };

        DensityReport {
            target_altitude_km,
            tolerance_km,
            count: members.len(),
            density_per_1000km2: density,
            objects: members
                .into_iter()
                .take(MAX_DENSITY_SAMPLES)
                .cloned()
                .collect(),
        }
    }

    /// Count and share of objects per altitude band
    pub fn altitude_distribution(&self, bands: &[AltitudeBand]) -> AltitudeDistribution {
        let total = self.points.len();

        let bands = bands
            .iter()
            .map(|band| {
                let count = self
                    .points
                    .iter()
                    .filter(|p| band.contains(p.altitude_km))
                    .count();
                let percentage = if total > 0 {
                    round2(count as f64 / total as f64 * 100.0)
                } else {
                    0.0
                };
                BandCount {
                    band: band.clone(),
                    count,
                    percentage,
                }
            })
            .collect();

        AltitudeDistribution { total, bands }
    }

    /// Densest latitude/altitude cells
    ///
    /// Cells with at least ten members, busiest first (ties by latitude then
    /// altitude), at most twenty.
    pub fn hotspots(&self, lat_step_deg: f64, alt_step_km: f64) -> HotspotReport {
        let mut grid: HashMap<(i64, i64), DensityCell> = HashMap::new();

        for point in &self.points {
            let key = (
                quantize(point.latitude, lat_step_deg),
                quantize(point.altitude_km, alt_step_km),
            );
            let cell = grid.entry(key).or_insert_with(|| DensityCell {
                latitude_zone: key.0 as f64 * lat_step_deg,
                altitude_band_km: key.1 as f64 * alt_step_km,
                count: 0,
                sample_ids: Vec::new(),
            });

            cell.count += 1;
            if cell.sample_ids.len() < MAX_CELL_SAMPLES {
                cell.sample_ids.push(point.id.clone());
            }
        }

        let grid_cells = grid.len();
        let mut hotspots: Vec<((i64, i64), DensityCell)> = grid
            .into_iter()
            .filter(|(_, cell)| cell.count >= HOTSPOT_MIN_COUNT)
            .collect();
        hotspots.sort_by(|(ka, a), (kb, b)| b.count.cmp(&a.count).then(ka.cmp(kb)));
        hotspots.truncate(MAX_HOTSPOTS);

        HotspotReport {
            total: self.points.len(),
            grid_cells,
            hotspots: hotspots.into_iter().map(|(_, cell)| cell).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(id: &str, latitude: f64, altitude_km: f64) -> GeoPoint {
        GeoPoint {
            id: id.to_string(),
            latitude,
            longitude: 0.0,
            altitude_km,
        }
    }

    #[test]
    fn test_distribution_over_default_bands() {
        let grid = DensityGrid::new(
            [350.0, 450.0, 550.0, 650.0, 1300.0]
                .iter()
                .enumerate()
                .map(|(i, &alt)| point(&i.to_string(), 0.0, alt))
                .collect(),
        );

        // 450 and 550 both fall in LEO-Mid; nothing lands in LEO-Upper
        let dist = grid.altitude_distribution(&AltitudeBand::defaults());
        assert_eq!(dist.total, 5);
        let counts: Vec<usize> = dist.bands.iter().map(|b| b.count).collect();
        let percentages: Vec<f64> = dist.bands.iter().map(|b| b.percentage).collect();
        assert_eq!(counts, vec![1, 2, 1, 0, 1]);
        assert_eq!(percentages, vec![20.0, 40.0, 20.0, 0.0, 20.0]);
    }

    #[test]
    fn test_distribution_bounds_and_rounding() {
        let grid = DensityGrid::new(vec![
            point("a", 0.0, 400.0),
            point("b", 0.0, 599.9),
            point("c", 0.0, 600.0),
        ]);
        let dist = grid.altitude_distribution(&[AltitudeBand::new("mid", 400.0, 600.0)]);

        assert_eq!(dist.bands[0].count, 2);
        assert_eq!(dist.bands[0].percentage, 66.67);
    }

    #[test]
    fn test_empty_population_is_zero_percent() {
        let dist = DensityGrid::default().altitude_distribution(&AltitudeBand::defaults());
        assert_eq!(dist.total, 0);
        assert!(dist.bands.iter().all(|b| b.count == 0 && b.percentage == 0.0));

        let density = DensityGrid::default().analyze_density(550.0, 50.0);
        assert_eq!(density.count, 0);
        assert_eq!(density.density_per_1000km2, 0.0);
    }

    #[test]
    fn test_grid_key() {
        assert_eq!(grid_key(12.3, 543.0, 5.0, 50.0), (10.0, 550.0));
        assert_eq!(grid_key(-12.3, 524.0, 5.0, 50.0), (-10.0, 500.0));
        // Ties go to the even multiple
        assert_eq!(grid_key(12.5, 575.0, 5.0, 50.0), (10.0, 600.0));
    }

    #[test]
    fn test_density_membership_and_cap() {
        let mut points: Vec<GeoPoint> = (0..150)
            .map(|i| point(&format!("in-{}", i), 0.0, 540.0 + (i % 20) as f64))
            .collect();
        points.push(point("edge", 0.0, 600.0));
        points.push(point("out", 0.0, 600.1));
        let grid = DensityGrid::new(points);

        let report = grid.analyze_density(550.0, 50.0);
        assert_eq!(report.count, 151);
        assert_eq!(report.objects.len(), 100);

        let area = 4.0 * PI * (EARTH_RADIUS_KM + 550.0).powi(2) / 1e6;
        assert_relative_eq!(report.density_per_1000km2, 151.0 / area, epsilon = 1e-12);
    }

    #[test]
    fn test_hotspots() {
        let mut points = Vec::new();
        for i in 0..12 {
            points.push(point(&format!("a{}", i), 12.3, 543.0));
        }
        for i in 0..15 {
            points.push(point(&format!("b{}", i), -40.0, 1000.0));
        }
        for i in 0..9 {
            points.push(point(&format!("c{}", i), 70.0, 800.0));
        }
        let report = DensityGrid::new(points).hotspots(5.0, 50.0);

        assert_eq!(report.total, 36);
        assert_eq!(report.grid_cells, 3);
        assert_eq!(report.hotspots.len(), 2);

        let top = &report.hotspots[0];
        assert_eq!((top.latitude_zone, top.altitude_band_km), (-40.0, 1000.0));
        assert_eq!(top.count, 15);
        assert_eq!(top.sample_ids, vec!["b0", "b1", "b2", "b3", "b4"]);

        let second = &report.hotspots[1];
        assert_eq!((second.latitude_zone, second.altitude_band_km), (10.0, 550.0));
        assert_eq!(second.count, 12);
    }

    #[test]
    fn test_hotspots_capped_at_twenty() {
        let points: Vec<GeoPoint> = (0..25)
            .flat_map(|cell| {
                (0..10).map(move |i| point(&format!("{}-{}", cell, i), 0.0, 300.0 + cell as f64 * 50.0))
            })
            .collect();
        let report = DensityGrid::new(points).hotspots(5.0, 50.0);

        assert_eq!(report.grid_cells, 25);
        assert_eq!(report.hotspots.len(), 20);
        // Equal counts fall back to key order
        assert_eq!(report.hotspots[0].altitude_band_km, 300.0);
    }
}
