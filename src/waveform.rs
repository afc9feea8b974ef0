//! Time-Domain Excitation Waveforms
//!
//! The closed set of source waveforms: Gaussian family, compact-support
//! family, ramped sinusoid and externally tabulated data interpolated
//! with natural cubic splines. Unset parameters are filled with
//! per-variant defaults proportional to the time step.

use std::collections::HashMap;

use log::warn;

use crate::config::{WaveformKind, WaveformRecord};
use crate::error::{ConfigError, Result};
use crate::types::Real;

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// A fully-initialised waveform ready for evaluation.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub name: String,
    pub kind: WaveformKind,
    pub amplitude: Real,
    pub width: Real,
    pub delay: Real,
    pub frequency: Real,
    spline: Option<CubicSpline>,
}

impl Waveform {
    /// Evaluate at time `t` with an additional caller delay (sources and
    /// plane waves carry their own).
    pub fn value(&self, t: Real, extra_delay: Real) -> Real {
        let time = (t - extra_delay - self.delay) as f64;
        let width = self.width as f64;
        let frequency = self.frequency as f64;
        let value = match self.kind {
            WaveformKind::GaussianPulse | WaveformKind::NarrowGaussianPulse => {
                gaussian_pulse(time, width)
            }
            WaveformKind::DifferentiatedGaussianPulse => {
                differentiated_gaussian_pulse(time, width)
            }
            WaveformKind::RickerWavelet => ricker_wavelet(time, width),
            WaveformKind::ModulatedGaussianPulse => {
                gaussian_pulse(time, width) * (TWO_PI * frequency * time).sin()
            }
            WaveformKind::CompactPulse => compact_pulse(time, width),
            WaveformKind::DifferentiatedCompactPulse => {
                differentiated_compact_pulse(time, width)
            }
            WaveformKind::ModulatedCompactPulse => {
                compact_pulse(time, width) * (TWO_PI * frequency * time).sin()
            }
            WaveformKind::RampedSinusoid => {
                let ramp = if time <= 0.0 {
                    0.0
                } else if time < width {
                    compact_pulse(time, width)
                } else {
                    1.0
                };
                ramp * (TWO_PI * frequency * time).sin()
            }
            WaveformKind::External => self
                .spline
                .as_ref()
                .map(|s| s.eval(time))
                .unwrap_or(0.0),
        };
        self.amplitude * value as Real
    }
}

fn gaussian_pulse(time: f64, width: f64) -> f64 {
    (-0.5 * (time / width).powi(2)).exp()
}

fn differentiated_gaussian_pulse(time: f64, width: f64) -> f64 {
    -time / width * (-0.5 * (time / width).powi(2)).exp()
}

fn ricker_wavelet(time: f64, width: f64) -> f64 {
    (1.0 - (time / width).powi(2)) * (-0.5 * (time / width).powi(2)).exp()
}

/// Compact pulse: a cosine-sum window with exactly `2*width` support.
fn compact_pulse(time: f64, width: f64) -> f64 {
    if time <= 0.0 || time >= 2.0 * width {
        0.0
    } else {
        let u = std::f64::consts::PI / width * time;
        (10.0 - 15.0 * u.cos() + 6.0 * (2.0 * u).cos() - (3.0 * u).cos()) / 32.0
    }
}

fn differentiated_compact_pulse(time: f64, width: f64) -> f64 {
    if time <= 0.0 || time >= 2.0 * width {
        0.0
    } else {
        let u = std::f64::consts::PI / width * time;
        (15.0 * u.sin() - 12.0 * (2.0 * u).sin() + 3.0 * (3.0 * u).sin()) / 32.0
    }
}

/// Natural cubic spline over a strictly increasing sample table.
/// Out-of-range queries return zero.
#[derive(Clone, Debug)]
struct CubicSpline {
    t: Vec<f64>,
    y: Vec<f64>,
    y2: Vec<f64>,
}

impl CubicSpline {
    fn new(samples: &[[f64; 2]]) -> CubicSpline {
        let n = samples.len();
        let t: Vec<f64> = samples.iter().map(|s| s[0]).collect();
        let y: Vec<f64> = samples.iter().map(|s| s[1]).collect();

        // Tridiagonal solve for the second derivatives, natural ends.
        let mut y2 = vec![0.0f64; n];
        let mut u = vec![0.0f64; n];
        for i in 1..n - 1 {
            let sig = (t[i] - t[i - 1]) / (t[i + 1] - t[i - 1]);
            let p = sig * y2[i - 1] + 2.0;
            y2[i] = (sig - 1.0) / p;
            let d = (y[i + 1] - y[i]) / (t[i + 1] - t[i])
                - (y[i] - y[i - 1]) / (t[i] - t[i - 1]);
            u[i] = (6.0 * d / (t[i + 1] - t[i - 1]) - sig * u[i - 1]) / p;
        }
        for i in (0..n - 1).rev() {
            y2[i] = y2[i] * y2[i + 1] + u[i];
        }

        CubicSpline { t, y, y2 }
    }

    fn eval(&self, time: f64) -> f64 {
        let n = self.t.len();
        if time < self.t[0] || time > self.t[n - 1] {
            return 0.0;
        }
        let hi = match self.t.binary_search_by(|probe| probe.total_cmp(&time)) {
            Ok(index) => return self.y[index],
            Err(index) => index.min(n - 1).max(1),
        };
        let lo = hi - 1;
        let h = self.t[hi] - self.t[lo];
        let a = (self.t[hi] - time) / h;
        let b = (time - self.t[lo]) / h;
        a * self.y[lo]
            + b * self.y[hi]
            + ((a * a * a - a) * self.y2[lo] + (b * b * b - b) * self.y2[hi]) * h * h / 6.0
    }
}

/// The ordered waveform table plus the init-time name index.
#[derive(Debug)]
pub struct WaveformTable {
    waveforms: Vec<Waveform>,
    by_name: HashMap<String, usize>,
}

impl WaveformTable {
    pub fn new(records: &[WaveformRecord], dt: Real) -> Result<WaveformTable> {
        let mut waveforms = Vec::with_capacity(records.len());
        let mut by_name = HashMap::new();

        for record in records {
            if by_name.contains_key(&record.name) {
                return Err(ConfigError::Other(format!(
                    "waveform \"{}\" defined more than once",
                    record.name
                )));
            }

            let (default_width, default_delay, default_frequency) = defaults(record.kind, dt);
            let mut waveform = Waveform {
                name: record.name.clone(),
                kind: record.kind,
                amplitude: record.amplitude.unwrap_or(1.0),
                width: record.width.unwrap_or(default_width),
                delay: record.delay.unwrap_or(default_delay),
                frequency: record.frequency.unwrap_or(default_frequency),
                spline: None,
            };

            if record.kind == WaveformKind::External {
                let samples = record.samples.as_deref().unwrap_or(&[]);
                if samples.len() < 2 {
                    return Err(ConfigError::ShortWaveformTable {
                        name: record.name.clone(),
                    });
                }
                let mut max_gap = 0.0f64;
                for pair in samples.windows(2) {
                    let gap = pair[1][0] - pair[0][0];
                    if gap <= 0.0 {
                        return Err(ConfigError::NonMonotoneWaveformTable {
                            name: record.name.clone(),
                        });
                    }
                    max_gap = max_gap.max(gap);
                }
                if max_gap > 3.0 * dt as f64 {
                    warn!(
                        "external waveform \"{}\": max sample spacing {:.3e} s exceeds 3*dt = {:.3e} s",
                        record.name,
                        max_gap,
                        3.0 * dt as f64
                    );
                } else if max_gap > 1.5 * dt as f64 {
                    warn!(
                        "external waveform \"{}\": max sample spacing {:.3e} s above the ideal 1.5*dt",
                        record.name, max_gap
                    );
                }
                waveform.spline = Some(CubicSpline::new(samples));
            }

            by_name.insert(record.name.clone(), waveforms.len());
            waveforms.push(waveform);
        }

        Ok(WaveformTable { waveforms, by_name })
    }

    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownWaveform(name.to_string()))
    }

    #[inline]
    pub fn value(&self, index: usize, t: Real, extra_delay: Real) -> Real {
        self.waveforms[index].value(t, extra_delay)
    }

    pub fn get(&self, index: usize) -> &Waveform {
        &self.waveforms[index]
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }
}

/// Load an external waveform table from an ASCII file of `t value` pairs.
pub fn load_external_table(path: &str) -> Result<Vec<[f64; 2]>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Other(format!("cannot read waveform file {path}: {e}")))?;
    let mut samples = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let t = parts.next().and_then(|s| s.parse::<f64>().ok());
        let v = parts.next().and_then(|s| s.parse::<f64>().ok());
        match (t, v) {
            (Some(t), Some(v)) => samples.push([t, v]),
            _ => {
                return Err(ConfigError::Other(format!(
                    "malformed waveform sample at {path}:{}",
                    line_number + 1
                )))
            }
        }
    }
    Ok(samples)
}

fn defaults(kind: WaveformKind, dt: Real) -> (Real, Real, Real) {
    let sqrt2 = (2.0 as Real).sqrt();
    match kind {
        WaveformKind::GaussianPulse
        | WaveformKind::DifferentiatedGaussianPulse
        | WaveformKind::RickerWavelet => (5.0 * sqrt2 * dt, 40.0 * dt, 0.0),
        WaveformKind::NarrowGaussianPulse => (8.0 * dt, 12.0 * dt, 0.0),
        WaveformKind::ModulatedGaussianPulse => (20.0 * sqrt2 * dt, 120.0 * dt, 0.05 / dt),
        WaveformKind::CompactPulse | WaveformKind::DifferentiatedCompactPulse => {
            (20.0 * dt, 0.0, 0.0)
        }
        WaveformKind::ModulatedCompactPulse => (80.0 * dt, 0.0, 0.05 / dt),
        WaveformKind::RampedSinusoid => (20.0 * dt, 0.0, 0.05 / dt),
        WaveformKind::External => (1.0, 0.0, 0.0),
    }
}
