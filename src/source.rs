//! Lumped Excitation Sources
//!
//! Field, current, current-density, current-moment and voltage sources
//! over a bounding box. Every variant is canonicalised at init to either
//! a direct field drive or a current-density drive; geometric factors
//! come from the local edge-length arrays. Soft sources add to the
//! field, hard sources replace it.

use log::debug;

use crate::bbox::{field_limits, FaceMask, FieldLimits, INCLUDE_ALL};
use crate::config::{SourceKind, SourceRecord};
use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::medium::{MediaTable, MEDIUM_PEC};
use crate::types::{Axis, FieldComponent, Real};
use crate::waveform::WaveformTable;

/// Resistance below which a voltage source degenerates to an ideal
/// (PEC-backed) drive.
const MIN_RESISTANCE: Real = 1e-2;

/// Canonical source forms after init-time conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Canonical {
    ElectricField,
    MagneticField,
    ElectricCurrentDensity,
    MagneticCurrentDensity,
}

pub struct Source {
    pub name: String,
    canonical: Canonical,
    component: FieldComponent,
    flim: FieldLimits,
    waveform: usize,
    delay: Real,
    /// Canonical drive amplitude after geometric conversion.
    size: Real,
    /// 1 for soft (additive), 0 for hard (replacing).
    soft: Real,
}

/// Sum of the primary/secondary edge spans of a source box, in the
/// layout of the distributed electric source: drive length along the
/// polarisation from primary edges, cross-section from secondary spans.
fn electric_source_size(grid: &Grid, gbbox: &crate::bbox::Bbox, pol: Axis) -> (Real, Real, [Real; 3]) {
    let mut side = [0.0 as Real; 3];
    let mut length = 0.0 as Real;
    for axis in Axis::ALL {
        let a = axis.index();
        if axis == pol {
            for i in gbbox.lo(axis)..gbbox.hi(axis) {
                length += grid.edges.de[a][i];
            }
        } else {
            for i in gbbox.range(axis) {
                side[a] += grid.edges.dh[a][i];
            }
        }
    }
    let (u, v) = (pol.next(), pol.prev());
    (length, side[u.index()] * side[v.index()], side)
}

/// Dual layout for distributed magnetic sources.
fn magnetic_source_size(grid: &Grid, gbbox: &crate::bbox::Bbox, pol: Axis) -> (Real, Real, [Real; 3]) {
    let mut side = [0.0 as Real; 3];
    let mut length = 0.0 as Real;
    for axis in Axis::ALL {
        let a = axis.index();
        if axis == pol {
            for i in gbbox.range(axis) {
                length += grid.edges.dh[a][i];
            }
        } else {
            for i in gbbox.lo(axis)..gbbox.hi(axis) {
                side[a] += grid.edges.de[a][i];
            }
        }
    }
    let (u, v) = (pol.next(), pol.prev());
    (length, side[u.index()] * side[v.index()], side)
}

impl Source {
    /// Canonicalise one source record. Resistive voltage sources patch a
    /// private conductive medium onto the grid; ideal ones paint PEC.
    pub fn new(
        record: &SourceRecord,
        number: usize,
        grid: &mut Grid,
        media: &mut MediaTable,
        waveforms: &WaveformTable,
    ) -> Result<Source> {
        if !record.bbox.is_normal() {
            return Err(ConfigError::MalformedBbox(record.bbox));
        }
        let gbbox = record.bbox.offset_by(&grid.extents.gibox);
        if !gbbox.is_within(&grid.extents.gibox) {
            return Err(ConfigError::BboxOutsideMesh {
                bbox: record.bbox,
                mesh: grid.extents.gibox,
            });
        }
        let waveform = waveforms.lookup(&record.waveform)?;
        let flim = field_limits(&gbbox, &INCLUDE_ALL);
        let pol = record.polarisation;
        let component = if record.kind.is_electric() {
            FieldComponent::electric(pol)
        } else {
            FieldComponent::magnetic(pol)
        };

        let mut size = record.amplitude;
        let canonical = match record.kind {
            SourceKind::ElectricField => Canonical::ElectricField,
            SourceKind::MagneticField => Canonical::MagneticField,
            SourceKind::ElectricCurrentDensity => Canonical::ElectricCurrentDensity,
            SourceKind::MagneticCurrentDensity => Canonical::MagneticCurrentDensity,
            SourceKind::ElectricSurfaceCurrentDensity => {
                let normal = gbbox
                    .direction()
                    .ok_or(ConfigError::BboxDimensionality {
                        bbox: record.bbox,
                        context: "surface current source",
                    })?;
                let (_, _, side) = electric_source_size(grid, &gbbox, pol);
                size /= side[normal.index()];
                Canonical::ElectricCurrentDensity
            }
            SourceKind::MagneticSurfaceCurrentDensity => {
                let normal = gbbox
                    .direction()
                    .ok_or(ConfigError::BboxDimensionality {
                        bbox: record.bbox,
                        context: "surface current source",
                    })?;
                let (_, _, side) = magnetic_source_size(grid, &gbbox, pol);
                size /= side[normal.index()];
                Canonical::MagneticCurrentDensity
            }
            SourceKind::ElectricCurrent => {
                let (_, area, _) = electric_source_size(grid, &gbbox, pol);
                size /= area;
                Canonical::ElectricCurrentDensity
            }
            SourceKind::MagneticCurrent => {
                let (_, area, _) = magnetic_source_size(grid, &gbbox, pol);
                size /= area;
                Canonical::MagneticCurrentDensity
            }
            SourceKind::ElectricCurrentMoment => {
                let (length, area, _) = electric_source_size(grid, &gbbox, pol);
                size /= area * length;
                Canonical::ElectricCurrentDensity
            }
            SourceKind::MagneticCurrentMoment => {
                let (length, area, _) = magnetic_source_size(grid, &gbbox, pol);
                size /= area * length;
                Canonical::MagneticCurrentDensity
            }
            SourceKind::Voltage => {
                let (length, _, _) = electric_source_size(grid, &gbbox, pol);
                size = -size / length;
                Canonical::ElectricField
            }
            SourceKind::TheveninVoltage | SourceKind::NortonCurrent => {
                if record.kind == SourceKind::NortonCurrent {
                    // Norton to Thevenin.
                    size *= record.resistance;
                }
                let (length, area, _) = electric_source_size(grid, &gbbox, pol);
                if record.resistance > MIN_RESISTANCE {
                    // Resistive source: current-density drive plus a
                    // private conductive medium over the box.
                    size = size / area / record.resistance;
                    let sigma = length / (area * record.resistance);
                    let medium = media.add_simple(
                        format!("__vr_rs_{}__", number + 1),
                        1.0,
                        sigma,
                        1.0,
                    )?;
                    grid.set_medium_on_grid(&gbbox, medium, FaceMask::ALL, media);
                    Canonical::ElectricCurrentDensity
                } else {
                    // Ideal voltage source over a PEC cell. Zero
                    // resistance against PEC is documented behaviour,
                    // not an error.
                    size = -0.5 * size / length;
                    grid.set_medium_on_grid(&gbbox, MEDIUM_PEC, FaceMask::ALL, media);
                    Canonical::ElectricField
                }
            }
        };

        debug!(
            "source \"{}\": {:?} {:?}, size {:.4e}, soft {}",
            record.name, canonical, component, size as f64, record.is_soft
        );

        Ok(Source {
            name: record.name.clone(),
            canonical,
            component,
            flim,
            waveform,
            delay: record.delay,
            size,
            soft: if record.is_soft { 1.0 } else { 0.0 },
        })
    }

    /// Apply the electric-phase drive at field time `t_e`.
    pub fn update_e(&self, grid: &mut Grid, waveforms: &WaveformTable, t_e: Real) {
        let drive = self.size * waveforms.value(self.waveform, t_e, self.delay);
        let axis = self.component.axis();
        let lim = *self.flim.get(self.component);
        let soft = self.soft;
        match self.canonical {
            Canonical::ElectricField => {
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let index = [i, j, k][axis.index()];
                            let value = grid.scale_e(axis, drive, index);
                            let e = grid.field_mut(self.component).at_mut(i, j, k);
                            *e = soft * *e + value;
                        }
                    }
                }
            }
            Canonical::ElectricCurrentDensity => {
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let (_, beta) = grid.alpha_beta_e(axis, i, j, k);
                            let value = beta * grid.scale_j(axis, drive, i, j, k);
                            let e = grid.field_mut(self.component).at_mut(i, j, k);
                            *e = soft * *e - value;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Apply the magnetic-phase drive at field time `t_h`.
    pub fn update_h(&self, grid: &mut Grid, waveforms: &WaveformTable, t_h: Real) {
        let drive = self.size * waveforms.value(self.waveform, t_h, self.delay);
        let axis = self.component.axis();
        let lim = *self.flim.get(self.component);
        let soft = self.soft;
        match self.canonical {
            Canonical::MagneticField => {
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let index = [i, j, k][axis.index()];
                            let value = grid.scale_h(axis, drive, index);
                            let h = grid.field_mut(self.component).at_mut(i, j, k);
                            *h = soft * *h + value;
                        }
                    }
                }
            }
            Canonical::MagneticCurrentDensity => {
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let gamma = grid.gamma_h(axis, i, j, k);
                            let value = gamma * grid.scale_jm(axis, drive, i, j, k);
                            let h = grid.field_mut(self.component).at_mut(i, j, k);
                            *h = soft * *h - value;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
