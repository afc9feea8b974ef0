//! FieldLab Core - 3D FDTD Electromagnetic Solver
//!
//! Full-vector electromagnetic field solver integrating Maxwell's curl
//! equations on a structured 3D Yee lattice: non-uniform meshes, CPML
//! absorbing boundaries, first-order Mur, total-field/scattered-field
//! plane-wave injection, Debye dispersive blocks, surface-impedance
//! sheets, lumped sources and in-memory observers.
//!
//! The solver consumes a fully-populated [`config::SimulationConfig`]
//! (deck parsing and file output belong to front-ends) and drives the
//! time loop through [`solver::Solver`], emitting per-step observer
//! callbacks.
//!
//! Author: Mehmet Gümüş (github.com/SpaceEngineerSS)

pub mod bbox;
pub mod block;
pub mod boundary;
pub mod config;
pub mod debye;
pub mod error;
pub mod filter;
pub mod grid;
pub mod medium;
pub mod mesh;
pub mod mur;
pub mod observer;
pub mod planewave;
pub mod pml;
pub mod sibc;
pub mod solver;
pub mod source;
pub mod types;
pub mod waveform;

pub use bbox::{Bbox, FaceMask};
pub use config::{
    BoundaryKind, BoundaryRecord, CoefficientStorageKind, FieldScaling, MediumRecord,
    ObserverKind, ObserverRecord, PlaneWaveRecord, PmlParameters, SibcModel, SimulationConfig,
    SolverOptions, SourceKind, SourceRecord, SurfaceRecord, WaveformKind, WaveformRecord,
};
pub use error::{ConfigError, Result};
pub use medium::MediumKind;
pub use mesh::{GridKind, MeshLines};
pub use observer::{FieldView, Observers, Probe, SpectrumAnalyzer};
pub use solver::Solver;
pub use types::{Axis, Face, FieldComponent, Real, C0, EPS0, ETA0, MU0};

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
