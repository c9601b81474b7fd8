//! Desikan-Killiany atlas reduction.
//!
//! The region axis is fixed: 34 left-hemisphere regions followed by the same
//! 34 in the right hemisphere, named `<region>-lh` / `<region>-rh`.
use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{PipelineError, Result};
use crate::inverse::{EstimateOrigin, SourceEstimate};
use crate::provenance::ProcessingLog;

/// Number of regions per hemisphere.
pub const REGIONS_PER_HEMISPHERE: usize = 34;

/// Total number of atlas regions.
pub const N_REGIONS: usize = 2 * REGIONS_PER_HEMISPHERE;

/// Units of the region time courses.
pub const UNITS: &str = "A⋅m";

/// Atlas version tag written with every result.
pub const ATLAS_VERSION: &str = "desikan_killiany_68";

/// Region names without hemisphere suffix, in output order.
pub const REGION_BASENAMES: [&str; REGIONS_PER_HEMISPHERE] = [
    "bankssts",
    "caudalanteriorcingulate",
    "caudalmiddlefrontal",
    "cuneus",
    "entorhinal",
    "fusiform",
    "inferiorparietal",
    "inferiortemporal",
    "isthmuscingulate",
    "lateraloccipital",
    "lateralorbitofrontal",
    "lingual",
    "medialorbitofrontal",
    "middletemporal",
    "parahippocampal",
    "paracentral",
    "parsopercularis",
    "parsorbitalis",
    "parstriangularis",
    "pericalcarine",
    "postcentral",
    "posteriorcingulate",
    "precentral",
    "precuneus",
    "rostralanteriorcingulate",
    "rostralmiddlefrontal",
    "superiorfrontal",
    "superiorparietal",
    "superiortemporal",
    "supramarginal",
    "frontalpole",
    "temporalpole",
    "transversetemporal",
    "insula",
];

/// All 68 region names: every `-lh` region, then every `-rh` region.
pub fn region_names() -> Vec<String> {
    ["lh", "rh"]
        .iter()
        .flat_map(|hemi| REGION_BASENAMES.iter().map(move |r| format!("{r}-{hemi}")))
        .collect()
}

/// Where the region time courses came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtlasOrigin {
    Genuine,
    Simulated,
}

impl AtlasOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genuine => "genuine",
            Self::Simulated => "simulated",
        }
    }
}

/// Region-level time courses.
#[derive(Debug, Clone)]
pub struct AtlasTimeSeries {
    /// `[68, T, E]`.
    pub data: Array3<f64>,
    pub region_names: Vec<String>,
    pub units: &'static str,
    pub atlas_version: &'static str,
    pub origin: AtlasOrigin,
    pub sfreq: f64,
    pub tmin: f64,
}

impl AtlasTimeSeries {
    pub fn n_regions(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_epochs(&self) -> usize {
        self.data.dim().2
    }

    /// `(left, right)` region counts.
    pub fn hemisphere_counts(&self) -> (usize, usize) {
        let lh = self.region_names.iter().filter(|n| n.ends_with("-lh")).count();
        let rh = self.region_names.iter().filter(|n| n.ends_with("-rh")).count();
        (lh, rh)
    }
}

/// Reduce a source estimate to the 68 atlas regions.
///
/// Genuine estimates are averaged per region; a region without sources
/// stays at zero and is logged as a warning. Simulated estimates already
/// have one row per region and pass through.
///
/// # Errors
///
/// [`PipelineError::Atlas`] if the labels do not match the source count or a
/// simulated estimate does not have 68 rows.
pub fn aggregate(estimate: SourceEstimate, log: &mut ProcessingLog) -> Result<AtlasTimeSeries> {
    let (n_src, n_t, n_e) = estimate.data.dim();
    let (data, origin) = match estimate.origin {
        EstimateOrigin::Genuine { labels } => {
            if labels.len() != n_src {
                return Err(PipelineError::Atlas(format!(
                    "{} labels for {n_src} sources",
                    labels.len()
                )));
            }
            let mut out = Array3::<f64>::zeros((N_REGIONS, n_t, n_e));
            let mut counts = [0usize; N_REGIONS];
            for (src, &region) in labels.iter().enumerate() {
                if region >= N_REGIONS {
                    return Err(PipelineError::Atlas(format!(
                        "source {src} carries label {region}, atlas has {N_REGIONS} regions"
                    )));
                }
                let mut row = out.index_axis_mut(Axis(0), region);
                row += &estimate.data.slice(s![src, .., ..]);
                counts[region] += 1;
            }
            let names = region_names();
            for (region, &count) in counts.iter().enumerate() {
                if count == 0 {
                    log.warn("Region has no sources", json!({ "region": names[region] }));
                } else {
                    out.index_axis_mut(Axis(0), region).mapv_inplace(|v| v / count as f64);
                }
            }
            (out, AtlasOrigin::Genuine)
        }
        EstimateOrigin::Simulated { .. } => {
            if n_src != N_REGIONS {
                return Err(PipelineError::Atlas(format!(
                    "simulated estimate has {n_src} rows, expected {N_REGIONS}"
                )));
            }
            (estimate.data, AtlasOrigin::Simulated)
        }
    };

    let series = AtlasTimeSeries {
        data,
        region_names: region_names(),
        units: UNITS,
        atlas_version: ATLAS_VERSION,
        origin,
        sfreq: estimate.sfreq,
        tmin: estimate.tmin,
    };
    log.record(
        "Extracted atlas time courses",
        json!({
            "n_regions": series.n_regions(),
            "n_times": series.n_times(),
            "n_epochs": series.n_epochs(),
            "origin": origin.as_str(),
        }),
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(data: Array3<f64>, origin: EstimateOrigin) -> SourceEstimate {
        SourceEstimate { data, origin, sfreq: 250.0, tmin: 0.0 }
    }

    #[test]
    fn names_are_hemisphere_ordered() {
        let names = region_names();
        assert_eq!(names.len(), N_REGIONS);
        assert_eq!(names[0], "bankssts-lh");
        assert_eq!(names[33], "insula-lh");
        assert_eq!(names[34], "bankssts-rh");
        assert_eq!(names[67], "insula-rh");
    }

    #[test]
    fn genuine_estimate_is_averaged_per_region() {
        // Two sources per region, values 1 and 3 → mean 2.
        let labels: Vec<usize> = (0..N_REGIONS).flat_map(|r| [r, r]).collect();
        let data = Array3::from_shape_fn((2 * N_REGIONS, 5, 2), |(s, _, _)| {
            if s % 2 == 0 { 1.0 } else { 3.0 }
        });
        let mut log = ProcessingLog::new();
        let atlas = aggregate(estimate(data, EstimateOrigin::Genuine { labels }), &mut log).unwrap();
        assert_eq!(atlas.data.dim(), (N_REGIONS, 5, 2));
        assert_eq!(atlas.hemisphere_counts(), (34, 34));
        assert!(atlas.data.iter().all(|&v| (v - 2.0).abs() < 1e-12));
        assert_eq!(log.warnings().count(), 0);
    }

    #[test]
    fn empty_region_stays_zero_with_warning() {
        let labels: Vec<usize> = (1..N_REGIONS).collect();
        let data = Array3::from_elem((N_REGIONS - 1, 3, 1), 1.0);
        let mut log = ProcessingLog::new();
        let atlas = aggregate(estimate(data, EstimateOrigin::Genuine { labels }), &mut log).unwrap();
        assert!(atlas.data.slice(s![0, .., ..]).iter().all(|&v| v == 0.0));
        assert!(log.contains("Region has no sources"));
    }

    #[test]
    fn simulated_must_have_68_rows() {
        let data = Array3::zeros((10, 3, 1));
        let origin = EstimateOrigin::Simulated { reason: "test".into() };
        assert!(matches!(
            aggregate(estimate(data, origin), &mut ProcessingLog::new()),
            Err(PipelineError::Atlas(_))
        ));
    }
}
