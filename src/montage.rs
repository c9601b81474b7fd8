//! Standard electrode montages on an idealised spherical head.
//!
//! Axes: `x` right, `y` anterior, `z` up, origin at the head centre.
//! Positions are placed by azimuth ψ (from +x toward +y) and elevation above
//! the `Fpz–T7–Oz–T8` equator, then scaled to [`HEAD_RADIUS`].
//!
//! ```text
//!   midline      Fpz 0°  AFz 22.5°  Fz 45°  FCz 67.5°  Cz 90°  (front, ψ = 90°)
//!                Oz  0°  POz 22.5°  Pz 45°  CPz 67.5°          (back,  ψ = 270°)
//!   lateral rows X7 ──great circle── Xz ──great circle── X8
//!                     X5  X3  X1          X2  X4  X6
//! ```
use crate::error::ForwardFailure;

/// Radius of the template head in metres.
pub const HEAD_RADIUS: f64 = 0.095;

/// Montage names understood by [`Montage::standard`].
pub const KNOWN_MONTAGES: [&str; 2] = ["standard_1020", "standard_1010"];

/// Named 3-D electrode positions in metres.
#[derive(Debug, Clone)]
pub struct Montage {
    name: String,
    positions: Vec<(String, [f64; 3])>,
}

impl Montage {
    /// Resolve a standard montage by name (case-insensitive).
    pub fn standard(name: &str) -> Result<Self, ForwardFailure> {
        let key = name.to_ascii_lowercase();
        if !KNOWN_MONTAGES.contains(&key.as_str()) {
            return Err(ForwardFailure::UnknownMontage(name.to_string()));
        }
        let positions = ten_ten_unit()
            .into_iter()
            .map(|(n, p)| (n, scale(p, HEAD_RADIUS)))
            .collect();
        Ok(Self { name: key, positions })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn ch_names(&self) -> impl Iterator<Item = &str> {
        self.positions.iter().map(|(n, _)| n.as_str())
    }

    /// Position of the channel called exactly `name`.
    pub fn position(&self, name: &str) -> Option<[f64; 3]> {
        self.positions.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    }

    /// Canonical spelling of `name` when it matches a montage channel up to
    /// case.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let upper = name.to_uppercase();
        self.positions
            .iter()
            .find(|(n, _)| n.to_uppercase() == upper)
            .map(|(n, _)| n.as_str())
    }
}

// ── Geometry ────────────────────────────────────────────────────────────────

/// Unit vector at azimuth `psi` and elevation `elev`, both in degrees.
fn sph(psi: f64, elev: f64) -> [f64; 3] {
    let (p, e) = (psi.to_radians(), elev.to_radians());
    [e.cos() * p.cos(), e.cos() * p.sin(), e.sin()]
}

fn scale(p: [f64; 3], k: f64) -> [f64; 3] {
    [p[0] * k, p[1] * k, p[2] * k]
}

/// Spherical linear interpolation between unit vectors.
fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let dot = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]).clamp(-1.0, 1.0);
    let omega = dot.acos();
    if omega.abs() < 1e-12 {
        return a;
    }
    let (wa, wb) = (((1.0 - t) * omega).sin() / omega.sin(), (t * omega).sin() / omega.sin());
    [wa * a[0] + wb * b[0], wa * a[1] + wb * b[1], wa * a[2] + wb * b[2]]
}

const EQUATOR: [(&str, f64); 20] = [
    ("T8", 0.0), ("FT8", 18.0), ("F8", 36.0), ("AF8", 54.0), ("Fp2", 72.0),
    ("Fpz", 90.0), ("Fp1", 108.0), ("AF7", 126.0), ("F7", 144.0), ("FT7", 162.0),
    ("T7", 180.0), ("TP7", 198.0), ("P7", 216.0), ("PO7", 234.0), ("O1", 252.0),
    ("Oz", 270.0), ("O2", 288.0), ("PO8", 306.0), ("P8", 324.0), ("TP8", 342.0),
];

const MIDLINE: [(&str, f64, f64); 7] = [
    ("AFz", 90.0, 22.5), ("Fz", 90.0, 45.0), ("FCz", 90.0, 67.5), ("Cz", 90.0, 90.0),
    ("CPz", 270.0, 67.5), ("Pz", 270.0, 45.0), ("POz", 270.0, 22.5),
];

const LOWER_RING: [(&str, f64); 12] = [
    ("Nz", 90.0), ("F10", 36.0), ("FT10", 18.0), ("T10", 0.0), ("TP10", 342.0), ("P10", 324.0),
    ("Iz", 270.0), ("P9", 216.0), ("TP9", 198.0), ("T9", 180.0), ("FT9", 162.0), ("F9", 144.0),
];

const LOWER_RING_ELEVATION: f64 = -22.5;

/// Lateral rows: (left end, midline, right end, names left→right between them).
const ROWS: [(&str, &str, &str, [&str; 3], [&str; 3]); 5] = [
    ("F7", "Fz", "F8", ["F5", "F3", "F1"], ["F2", "F4", "F6"]),
    ("FT7", "FCz", "FT8", ["FC5", "FC3", "FC1"], ["FC2", "FC4", "FC6"]),
    ("T7", "Cz", "T8", ["C5", "C3", "C1"], ["C2", "C4", "C6"]),
    ("TP7", "CPz", "TP8", ["CP5", "CP3", "CP1"], ["CP2", "CP4", "CP6"]),
    ("P7", "Pz", "P8", ["P5", "P3", "P1"], ["P2", "P4", "P6"]),
];

/// Short rows with one electrode per side, halfway to the midline.
const HALF_ROWS: [(&str, &str, &str, &str, &str); 2] = [
    ("AF7", "AFz", "AF8", "AF3", "AF4"),
    ("PO7", "POz", "PO8", "PO3", "PO4"),
];

/// Legacy 10-20 names and the 10-10 position they share.
const ALIASES: [(&str, &str); 4] = [("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

/// The 10-10 set on the unit sphere.
fn ten_ten_unit() -> Vec<(String, [f64; 3])> {
    let mut out: Vec<(String, [f64; 3])> = Vec::with_capacity(96);
    for (name, psi) in EQUATOR {
        out.push((name.into(), sph(psi, 0.0)));
    }
    for (name, psi, elev) in MIDLINE {
        out.push((name.into(), sph(psi, elev)));
    }

    let lookup = |out: &[(String, [f64; 3])], name: &str| {
        out.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    };

    for (left, mid, right, lnames, rnames) in ROWS {
        let (Some(l), Some(m), Some(r)) = (lookup(&out, left), lookup(&out, mid), lookup(&out, right))
        else {
            continue;
        };
        for (k, name) in lnames.iter().enumerate() {
            out.push(((*name).into(), slerp(l, m, 0.25 * (k + 1) as f64)));
        }
        for (k, name) in rnames.iter().enumerate() {
            out.push(((*name).into(), slerp(m, r, 0.25 * (k + 1) as f64)));
        }
    }
    for (left, mid, right, lname, rname) in HALF_ROWS {
        let (Some(l), Some(m), Some(r)) = (lookup(&out, left), lookup(&out, mid), lookup(&out, right))
        else {
            continue;
        };
        out.push((lname.into(), slerp(l, m, 0.5)));
        out.push((rname.into(), slerp(m, r, 0.5)));
    }
    for (name, psi) in LOWER_RING {
        out.push((name.into(), sph(psi, LOWER_RING_ELEVATION)));
    }
    for (alias, target) in ALIASES {
        if let Some(p) = lookup(&out, target) {
            out.push((alias.into(), p));
        }
    }
    out
}
