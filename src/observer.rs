//! Observers and Probes
//!
//! The read-only surface the driver exposes each step, point probes
//! recording unscaled field samples, and a Hann-windowed FFT spectrum
//! analyser for reducing recorded series to magnitude spectra. File
//! output lives outside the core; everything here stays in memory.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::{ObserverKind, ObserverRecord};
use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::types::{Axis, FieldComponent, Real};

/// Read-only accessor handed to observer callbacks. Coordinates are
/// inner-grid (mesh) cell indices; values are physical (unscaled).
pub struct FieldView<'a> {
    grid: &'a Grid,
}

impl<'a> FieldView<'a> {
    pub(crate) fn new(grid: &'a Grid) -> FieldView<'a> {
        FieldView { grid }
    }

    /// Physical field sample at a mesh cell.
    pub fn get(&self, comp: FieldComponent, i: usize, j: usize, k: usize) -> Real {
        let gibox = &self.grid.extents.gibox;
        self.grid.physical(
            comp,
            gibox.lo(Axis::X) + i,
            gibox.lo(Axis::Y) + j,
            gibox.lo(Axis::Z) + k,
        )
    }

    /// Total electromagnetic energy over the mesh [J].
    pub fn total_energy(&self) -> f64 {
        self.grid.total_energy()
    }

    pub fn time_step(&self) -> Real {
        self.grid.dt
    }
}

/// A point probe recording one component every step.
pub struct Probe {
    pub name: String,
    component: FieldComponent,
    /// Mesh cell indices.
    position: [usize; 3],
    samples: Vec<Real>,
    kind: ObserverKind,
}

impl Probe {
    pub fn record(&mut self, view: &FieldView<'_>) {
        self.samples.push(view.get(
            self.component,
            self.position[0],
            self.position[1],
            self.position[2],
        ));
    }

    pub fn samples(&self) -> &[Real] {
        &self.samples
    }

    pub fn last(&self) -> Real {
        self.samples.last().copied().unwrap_or(0.0)
    }

    pub fn peak(&self) -> Real {
        self.samples.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// Reduce the recorded series to a spectrum when the observer asked
    /// for one.
    pub fn spectrum(&self) -> Option<Vec<Real>> {
        match self.kind {
            ObserverKind::Time => None,
            ObserverKind::Spectrum { fft_size } => {
                let mut analyzer = SpectrumAnalyzer::new(fft_size);
                Some(analyzer.compute(&self.samples))
            }
        }
    }
}

/// The observer set driven by the solver each step.
pub struct Observers {
    probes: Vec<Probe>,
}

impl Observers {
    pub fn new(records: &[ObserverRecord], grid: &Grid) -> Result<Observers> {
        let mut probes = Vec::with_capacity(records.len());
        let mesh_cells = [
            grid.extents.gibox.hi(Axis::X) - grid.extents.gibox.lo(Axis::X),
            grid.extents.gibox.hi(Axis::Y) - grid.extents.gibox.lo(Axis::Y),
            grid.extents.gibox.hi(Axis::Z) - grid.extents.gibox.lo(Axis::Z),
        ];
        for record in records {
            if !record.bbox.is_normal() {
                return Err(ConfigError::MalformedBbox(record.bbox));
            }
            let position = [
                record.bbox.lo(Axis::X),
                record.bbox.lo(Axis::Y),
                record.bbox.lo(Axis::Z),
            ];
            for axis in Axis::ALL {
                if position[axis.index()] > mesh_cells[axis.index()] {
                    return Err(ConfigError::BboxOutsideMesh {
                        bbox: record.bbox,
                        mesh: grid.extents.gibox,
                    });
                }
            }
            probes.push(Probe {
                name: record.name.clone(),
                component: record.field,
                position,
                samples: Vec::new(),
                kind: record.kind,
            });
        }
        Ok(Observers { probes })
    }

    pub fn record_all(&mut self, view: &FieldView<'_>) {
        for probe in &mut self.probes {
            probe.record(view);
        }
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probe(&self, name: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// Hann-windowed FFT reduction of a recorded field series to an
/// amplitude spectrum.
///
/// Bins are calibrated through the window's coherent gain so a
/// steady sinusoidal field component of amplitude `A` reads
/// `20*log10(A)` in its bin, i.e. dB relative to one unit of the
/// recorded field. The clamp floor is the field storage precision:
/// below one `Real` ulp of a unit field the magnitude carries no
/// information.
pub struct SpectrumAnalyzer {
    size: usize,
    window: Vec<f64>,
    /// Amplitude calibration: 2 / (sum of the window), folding the
    /// positive/negative frequency split back together.
    amplitude_scale: f64,
    spectrum: Vec<Real>,
    scratch: Vec<Complex<f64>>,
}

/// Smallest meaningful spectral amplitude for a unit-order field in the
/// configured `Real` precision, and its dB clamp.
fn amplitude_floor() -> (f64, Real) {
    let floor = Real::EPSILON as f64;
    (floor, (20.0 * floor.log10()) as Real)
}

impl SpectrumAnalyzer {
    /// `size` is rounded up to the next power of two.
    pub fn new(size: usize) -> SpectrumAnalyzer {
        let size = size.next_power_of_two().max(2);
        let mut window = vec![0.0f64; size];
        let mut window_sum = 0.0f64;
        for (i, w) in window.iter_mut().enumerate() {
            *w = 0.5
                * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos());
            window_sum += *w;
        }
        SpectrumAnalyzer {
            size,
            window,
            amplitude_scale: 2.0 / window_sum,
            spectrum: vec![0.0; size / 2],
            scratch: vec![Complex::new(0.0, 0.0); size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Amplitude spectrum of a recorded series, in dB relative to one
    /// unit of the recorded field component, clamped at the `Real`
    /// precision floor. Input shorter than the FFT size is zero-padded.
    pub fn compute(&mut self, samples: &[Real]) -> Vec<Real> {
        let n = self.size.min(samples.len());
        for i in 0..self.size {
            self.scratch[i] = if i < n {
                Complex::new(samples[i] as f64 * self.window[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.size);
        fft.process(&mut self.scratch);

        let (floor, floor_db) = amplitude_floor();
        for i in 0..self.size / 2 {
            let amplitude = self.scratch[i].norm() * self.amplitude_scale;
            self.spectrum[i] = if amplitude > floor {
                (20.0 * amplitude.log10()) as Real
            } else {
                floor_db
            };
        }
        self.spectrum.clone()
    }

    /// Index of the strongest bin.
    pub fn find_peak_bin(&self) -> usize {
        let mut max_value = Real::NEG_INFINITY;
        let mut max_index = 0;
        for (i, &value) in self.spectrum.iter().enumerate() {
            if value > max_value {
                max_value = value;
                max_index = i;
            }
        }
        max_index
    }

    /// Convert a bin index to a frequency in hertz given the sample
    /// interval.
    pub fn bin_to_frequency(&self, bin: usize, dt: Real) -> Real {
        bin as Real / (self.size as Real * dt)
    }
}
