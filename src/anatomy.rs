//! Template anatomy: source space, head model and region labels.
//!
//! Subject-specific anatomy is not supported; every recording is localized
//! on the same template. The built-in [`SphericalTemplate`] places the 68
//! Desikan-Killiany regions on a cortical shell inside a homogeneous
//! conducting sphere.
use anyhow::{ensure, Result};

use crate::atlas::{N_REGIONS, REGIONS_PER_HEMISPHERE};
use crate::montage::HEAD_RADIUS;

/// Radius of the cortical shell carrying the sources, in metres.
pub const CORTEX_RADIUS: f64 = 0.07;

/// Conductivity of the homogeneous head, in S/m.
pub const HEAD_CONDUCTIVITY: f64 = 0.33;

/// Sources generated per region.
pub const SOURCES_PER_REGION: usize = 12;

/// Tangential spread of the sources around their region centre, in metres.
pub const REGION_SPREAD: f64 = 0.008;

/// Left-hemisphere region centres in MNI-like millimetres, in
/// [`REGION_BASENAMES`](crate::atlas::REGION_BASENAMES) order. The right
/// hemisphere mirrors `x`.
const LEFT_CENTROIDS_MM: [[f64; 3]; REGIONS_PER_HEMISPHERE] = [
    [-53.0, -45.0, 10.0],
    [-5.0, 18.0, 30.0],
    [-37.0, 10.0, 45.0],
    [-8.0, -80.0, 20.0],
    [-25.0, -8.0, -32.0],
    [-35.0, -45.0, -18.0],
    [-42.0, -65.0, 35.0],
    [-50.0, -30.0, -22.0],
    [-8.0, -45.0, 18.0],
    [-32.0, -85.0, 0.0],
    [-25.0, 30.0, -15.0],
    [-15.0, -70.0, -5.0],
    [-7.0, 40.0, -15.0],
    [-58.0, -28.0, -8.0],
    [-25.0, -30.0, -15.0],
    [-8.0, -25.0, 60.0],
    [-48.0, 13.0, 15.0],
    [-42.0, 38.0, -10.0],
    [-45.0, 28.0, 5.0],
    [-12.0, -82.0, 5.0],
    [-42.0, -25.0, 50.0],
    [-6.0, -15.0, 38.0],
    [-38.0, -12.0, 50.0],
    [-10.0, -58.0, 40.0],
    [-6.0, 35.0, 5.0],
    [-33.0, 42.0, 20.0],
    [-12.0, 25.0, 50.0],
    [-25.0, -60.0, 55.0],
    [-52.0, -15.0, 0.0],
    [-50.0, -40.0, 32.0],
    [-8.0, 62.0, -10.0],
    [-30.0, 12.0, -35.0],
    [-43.0, -22.0, 10.0],
    [-36.0, 0.0, 3.0],
];

/// Dipole locations and orientations.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpace {
    /// Positions in metres, head coordinates.
    pub positions: Vec<[f64; 3]>,
    /// Unit outward normals.
    pub normals: Vec<[f64; 3]>,
}

impl SourceSpace {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Single-shell spherical conductor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadModel {
    pub radius: f64,
    pub conductivity: f64,
}

impl Default for HeadModel {
    fn default() -> Self {
        Self { radius: HEAD_RADIUS, conductivity: HEAD_CONDUCTIVITY }
    }
}

/// Everything the forward model needs from the template subject.
#[derive(Debug, Clone)]
pub struct TemplateAnatomy {
    pub subject: String,
    pub source_space: SourceSpace,
    pub head_model: HeadModel,
    /// Atlas region index of every source.
    pub labels: Vec<usize>,
}

impl TemplateAnatomy {
    /// Mean position of the sources of `region`, if it has any.
    pub fn region_centroid(&self, region: usize) -> Option<[f64; 3]> {
        let mut acc = [0.0; 3];
        let mut n = 0usize;
        for (p, _) in self.source_space.positions.iter().zip(&self.labels).filter(|(_, l)| **l == region) {
            for k in 0..3 {
                acc[k] += p[k];
            }
            n += 1;
        }
        (n > 0).then(|| acc.map(|v| v / n as f64))
    }
}

/// Source of template anatomy.
pub trait AnatomyProvider {
    /// Template subject name.
    fn subject(&self) -> &str;

    /// Build or fetch the template.
    fn load(&self) -> Result<TemplateAnatomy>;
}

/// Built-in analytic template (`fsaverage` layout on a sphere).
#[derive(Debug, Clone)]
pub struct SphericalTemplate {
    subject: String,
    sources_per_region: usize,
}

impl Default for SphericalTemplate {
    fn default() -> Self {
        Self { subject: "fsaverage".into(), sources_per_region: SOURCES_PER_REGION }
    }
}

impl SphericalTemplate {
    pub fn with_sources_per_region(mut self, n: usize) -> Self {
        self.sources_per_region = n;
        self
    }
}

impl AnatomyProvider for SphericalTemplate {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn load(&self) -> Result<TemplateAnatomy> {
        ensure!(self.sources_per_region > 0, "template needs at least one source per region");
        let n = self.sources_per_region;
        let offsets = fibonacci_sphere(n);

        let mut positions = Vec::with_capacity(N_REGIONS * n);
        let mut normals = Vec::with_capacity(N_REGIONS * n);
        let mut labels = Vec::with_capacity(N_REGIONS * n);

        for region in 0..N_REGIONS {
            let mut c = LEFT_CENTROIDS_MM[region % REGIONS_PER_HEMISPHERE];
            if region >= REGIONS_PER_HEMISPHERE {
                c[0] = -c[0];
            }
            let centre = unit(c);
            for u in &offsets {
                // Tangential part of the offset, then back onto the shell.
                let along = dot(*u, centre);
                let p = [
                    centre[0] * CORTEX_RADIUS + REGION_SPREAD * (u[0] - along * centre[0]),
                    centre[1] * CORTEX_RADIUS + REGION_SPREAD * (u[1] - along * centre[1]),
                    centre[2] * CORTEX_RADIUS + REGION_SPREAD * (u[2] - along * centre[2]),
                ];
                let nrm = unit(p);
                positions.push(nrm.map(|v| v * CORTEX_RADIUS));
                normals.push(nrm);
                labels.push(region);
            }
        }

        tracing::debug!(subject = %self.subject, n_sources = positions.len(), "template anatomy built");
        Ok(TemplateAnatomy {
            subject: self.subject.clone(),
            source_space: SourceSpace { positions, normals },
            head_model: HeadModel::default(),
            labels,
        })
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn unit(p: [f64; 3]) -> [f64; 3] {
    let n = dot(p, p).sqrt();
    p.map(|v| v / n)
}

/// `n` roughly uniform unit vectors (golden-angle spiral).
fn fibonacci_sphere(n: usize) -> Vec<[f64; 3]> {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    (0..n)
        .map(|k| {
            let z = 1.0 - (2 * k + 1) as f64 / n as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden * k as f64;
            [r * phi.cos(), r * phi.sin(), z]
        })
        .collect()
}
