//! Simulation Description
//!
//! The fully-populated material and topology description the solver
//! consumes. A front-end parser produces these records; the core only
//! resolves names to indices and validates. All bounding boxes are in
//! mesh (inner-grid) node coordinates.

use crate::bbox::{Bbox, FaceMask};
use crate::filter::PoleResidueMatrix;
use crate::medium::MediumKind;
use crate::types::{Axis, FieldComponent, Real};

/// Field storage convention, fixed for the lifetime of a solver.
///
/// Scaled storage folds the local edge length into each stored sample so
/// curl differences are plain subtractions; unscaled storage keeps
/// physical values and multiplies by reciprocal edge lengths in the curl.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldScaling {
    Scaled,
    Unscaled,
}

/// Update-coefficient storage strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoefficientStorageKind {
    /// Three real arrays per field component.
    Dense,
    /// One medium index per field component, dereferenced through the
    /// medium table. Saves memory but forbids per-cell averaging and
    /// requires the unscaled field convention.
    Indexed,
}

/// Solver-wide numerical options.
#[derive(Clone, Copy, Debug)]
pub struct SolverOptions {
    pub scaling: FieldScaling,
    pub storage: CoefficientStorageKind,
    /// Initialise fields to a sentinel and assert single-write coverage
    /// for one step. Sources and plane waves are suppressed while
    /// active.
    pub limit_checking: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            scaling: FieldScaling::Scaled,
            storage: CoefficientStorageKind::Dense,
            limit_checking: false,
        }
    }
}

/// External boundary variants.
#[derive(Clone, Debug)]
pub enum BoundaryKind {
    Pec,
    Pmc,
    FreeSpace,
    Periodic,
    Mur,
    Pml(PmlParameters),
    Sibc(SibcModel),
}

/// PML grading parameters.
#[derive(Clone, Copy, Debug)]
pub struct PmlParameters {
    pub num_layers: usize,
    /// Polynomial grading order.
    pub order: u32,
    /// Effective refractive index of the dominant modes.
    pub n_eff: Real,
    /// Theoretical reflection-coefficient target; non-positive selects
    /// the optimal profile instead.
    pub ref_coeff: Real,
    pub kappa_max: Real,
}

impl Default for PmlParameters {
    fn default() -> Self {
        PmlParameters {
            num_layers: 10,
            order: 4,
            n_eff: 1.0,
            ref_coeff: -1.0,
            kappa_max: 1.0,
        }
    }
}

/// How an SIBC boundary's transfer function is supplied.
#[derive(Clone, Debug)]
pub enum SibcModel {
    /// 2x2 scattering matrices per mode with free-space port impedances.
    /// Converted to an asymptotic impedance matrix at init; rejected if
    /// not passive.
    ScatteringMatrix {
        s_tm: [[Real; 2]; 2],
        s_te: [[Real; 2]; 2],
    },
    /// A 2x2 (isotropic) or 4x4 (anisotropic) pole-residue matrix.
    PoleResidue(PoleResidueMatrix),
    /// Pole-residue matrix read from an ASCII file at init.
    PoleResidueFile(String),
}

#[derive(Clone, Debug)]
pub struct BoundaryRecord {
    pub name: String,
    pub kind: BoundaryKind,
}

#[derive(Clone, Debug)]
pub struct MediumRecord {
    pub name: String,
    pub kind: MediumKind,
}

/// Material block painted onto the grid at init.
#[derive(Clone, Debug)]
pub struct BlockRecord {
    pub bbox: Bbox,
    pub medium: String,
    /// Faces whose boundary fields are included when painting.
    pub mask: FaceMask,
}

/// Internal surface carrying a named boundary model.
#[derive(Clone, Debug)]
pub struct SurfaceRecord {
    pub bbox: Bbox,
    pub boundary: String,
    /// +1 or -1: which side of the sheet its local frame faces.
    pub orientation: i8,
    /// In-plane rotation of the principal axes [degrees].
    pub angle: Real,
}

/// Thin-wire material variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireKind {
    Pec,
    FreeSpace,
}

#[derive(Clone, Debug)]
pub struct WireRecord {
    pub name: String,
    pub kind: WireKind,
    pub radius: Real,
}

/// Treatment of a wire end point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireEnd {
    Free,
    Grounded,
}

/// Straight wire segment along one mesh line.
#[derive(Clone, Debug)]
pub struct LineRecord {
    pub bbox: Bbox,
    pub wire: String,
    pub low_end: WireEnd,
    pub high_end: WireEnd,
}

/// Waveform variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveformKind {
    GaussianPulse,
    NarrowGaussianPulse,
    DifferentiatedGaussianPulse,
    RickerWavelet,
    ModulatedGaussianPulse,
    CompactPulse,
    DifferentiatedCompactPulse,
    ModulatedCompactPulse,
    RampedSinusoid,
    External,
}

/// Waveform description. Unset parameters take per-variant defaults
/// proportional to the time step.
#[derive(Clone, Debug)]
pub struct WaveformRecord {
    pub name: String,
    pub kind: WaveformKind,
    pub amplitude: Option<Real>,
    pub width: Option<Real>,
    pub delay: Option<Real>,
    pub frequency: Option<Real>,
    /// `(t, value)` table for the external variant.
    pub samples: Option<Vec<[f64; 2]>>,
}

impl WaveformRecord {
    pub fn with_defaults(name: &str, kind: WaveformKind) -> WaveformRecord {
        WaveformRecord {
            name: name.to_string(),
            kind,
            amplitude: None,
            width: None,
            delay: None,
            frequency: None,
            samples: None,
        }
    }
}

/// Source variants. All are canonicalised at init to either a direct
/// field drive or a current-density drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    ElectricField,
    MagneticField,
    ElectricCurrentDensity,
    MagneticCurrentDensity,
    ElectricSurfaceCurrentDensity,
    MagneticSurfaceCurrentDensity,
    ElectricCurrent,
    MagneticCurrent,
    ElectricCurrentMoment,
    MagneticCurrentMoment,
    Voltage,
    TheveninVoltage,
    NortonCurrent,
}

impl SourceKind {
    pub fn is_electric(self) -> bool {
        !matches!(
            self,
            SourceKind::MagneticField
                | SourceKind::MagneticCurrentDensity
                | SourceKind::MagneticSurfaceCurrentDensity
                | SourceKind::MagneticCurrent
                | SourceKind::MagneticCurrentMoment
        )
    }
}

#[derive(Clone, Debug)]
pub struct SourceRecord {
    pub name: String,
    pub bbox: Bbox,
    pub kind: SourceKind,
    pub polarisation: Axis,
    pub waveform: String,
    pub amplitude: Real,
    pub delay: Real,
    /// Soft adds to the field, hard replaces it.
    pub is_soft: bool,
    /// Source resistance for the Thevenin/Norton variants [ohm].
    pub resistance: Real,
}

/// TF/SF plane-wave description.
#[derive(Clone, Debug)]
pub struct PlaneWaveRecord {
    pub name: String,
    pub bbox: Bbox,
    pub waveform: String,
    /// Polar incidence angle [degrees].
    pub theta: Real,
    /// Azimuthal incidence angle [degrees].
    pub phi: Real,
    /// Polarisation angle [degrees].
    pub eta: Real,
    pub amplitude: Real,
    pub delay: Real,
    /// Faces of the TF/SF box on which corrections are applied.
    pub faces: FaceMask,
}

/// Observer variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverKind {
    /// Record a time series of one component at the bbox corner.
    Time,
    /// Record a time series and reduce it to a magnitude spectrum.
    Spectrum { fft_size: usize },
}

#[derive(Clone, Debug)]
pub struct ObserverRecord {
    pub name: String,
    pub bbox: Bbox,
    pub field: FieldComponent,
    pub kind: ObserverKind,
}

/// The complete description the solver consumes.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub mesh: crate::mesh::MeshLines,
    /// Boundary models referenced by the external surfaces and internal
    /// surface records.
    pub boundaries: Vec<BoundaryRecord>,
    /// Boundary name per external face; `None` selects the default PML.
    pub external_surfaces: [Option<String>; 6],
    pub media: Vec<MediumRecord>,
    pub blocks: Vec<BlockRecord>,
    pub surfaces: Vec<SurfaceRecord>,
    pub wires: Vec<WireRecord>,
    pub lines: Vec<LineRecord>,
    pub waveforms: Vec<WaveformRecord>,
    pub sources: Vec<SourceRecord>,
    pub plane_waves: Vec<PlaneWaveRecord>,
    pub observers: Vec<ObserverRecord>,
    pub num_steps: u64,
    /// Courant stability factor in (0, 1); `None` selects sqrt(3)/2.
    pub courant_number: Option<Real>,
    pub options: SolverOptions,
}

impl SimulationConfig {
    /// Minimal description: the given mesh, all faces PEC, no content.
    pub fn new(mesh: crate::mesh::MeshLines) -> SimulationConfig {
        SimulationConfig {
            mesh,
            boundaries: vec![BoundaryRecord {
                name: "pec".to_string(),
                kind: BoundaryKind::Pec,
            }],
            external_surfaces: std::array::from_fn(|_| Some("pec".to_string())),
            media: Vec::new(),
            blocks: Vec::new(),
            surfaces: Vec::new(),
            wires: Vec::new(),
            lines: Vec::new(),
            waveforms: Vec::new(),
            sources: Vec::new(),
            plane_waves: Vec::new(),
            observers: Vec::new(),
            num_steps: 0,
            courant_number: None,
            options: SolverOptions::default(),
        }
    }

    /// Assign one boundary name to every external face.
    pub fn set_external_surfaces(&mut self, name: &str) {
        self.external_surfaces = std::array::from_fn(|_| Some(name.to_string()));
    }
}
