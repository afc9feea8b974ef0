//! Configuration Error Taxonomy
//!
//! Every way a fully-parsed simulation description can be rejected at
//! init. Nothing in the time-stepping loop returns these; numerical
//! invariants inside a step assert instead.

use thiserror::Error;

use crate::bbox::Bbox;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bounding box {0:?} is not normal (lo > hi)")]
    MalformedBbox(Bbox),

    #[error("bounding box {bbox:?} is not within the mesh {mesh:?}")]
    BboxOutsideMesh { bbox: Bbox, mesh: Bbox },

    #[error("bounding box {bbox:?} has wrong dimensionality for {context}")]
    BboxDimensionality { bbox: Bbox, context: &'static str },

    #[error("unknown medium \"{0}\"")]
    UnknownMedium(String),

    #[error("unknown boundary \"{0}\"")]
    UnknownBoundary(String),

    #[error("unknown waveform \"{0}\"")]
    UnknownWaveform(String),

    #[error("unknown wire \"{0}\"")]
    UnknownWire(String),

    #[error("Debye medium \"{name}\" pole {pole} has positive real part")]
    UnstableDebyePole { name: String, pole: usize },

    #[error("SIBC boundary \"{0}\" scattering matrix is not passive")]
    NonPassiveScatteringMatrix(String),

    #[error("Courant number {0} must be in (0, 1)")]
    CourantNumber(f64),

    #[error("periodic boundary on {0} face is unpaired")]
    UnpairedPeriodicFace(&'static str),

    #[error("mesh must have at least two lines per axis, got {0}")]
    DegenerateMesh(usize),

    #[error("mesh line coordinates along {axis} are not strictly increasing")]
    NonMonotoneMeshLines { axis: &'static str },

    #[error("external waveform table \"{name}\" is not strictly increasing in time")]
    NonMonotoneWaveformTable { name: String },

    #[error("external waveform table \"{name}\" needs at least two samples")]
    ShortWaveformTable { name: String },

    #[error("pole-residue model for \"{name}\" must be 2x2 or 4x4, got {rows}x{cols}")]
    PoleResidueShape { name: String, rows: usize, cols: usize },

    #[error("malformed pole-residue data for \"{name}\": {detail}")]
    PoleResidueData { name: String, detail: String },

    #[error("indexed coefficient storage requires the unscaled field convention")]
    IndexedStorageNeedsUnscaled,

    #[error("plane wave incidence angles out of range: theta={theta}, phi={phi}")]
    PlaneWaveAngles { theta: f64, phi: f64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
