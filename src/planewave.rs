//! Total-Field / Scattered-Field Plane-Wave Injector
//!
//! Injects an incident plane wave inside a rectangular box so the box
//! interior carries the total field and the exterior only the scattered
//! field. Each face correction reads exactly one incident sample one
//! cell across the TF/SF interface.
//!
//! Incident-field evaluation depends on the grid: cubic grids step a 1D
//! auxiliary incident grid (leapfrogged against the main grid, with a
//! fixed-depth CPML back-end) and sample it by linear interpolation;
//! uniform grids evaluate analytically at the numerical phase velocity;
//! non-uniform grids fall back to the vacuum speed.

use log::debug;

use crate::bbox::{field_limits, Bbox, FieldLimits};
use crate::boundary::{ExternalBoundaries, OuterSurface};
use crate::config::{FieldScaling, PlaneWaveRecord};
use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::mesh::{numerical_phase_velocity, GridKind};
use crate::types::{Axis, Face, FieldComponent, Real, C0, EPS0, ETA0, MU0};
use crate::waveform::WaveformTable;

/// Auxiliary-grid sample node of the hard source.
const M0: usize = 2;
/// Auxiliary-grid back-end CPML depth.
const NPML: usize = 10;

/// 1D incident-field grid for cubic meshes.
struct AuxGrid {
    beta_eyi: Real,
    gamma_hzi: Real,
    nx: usize,
    /// First index of the CPML back-end.
    xb: usize,
    eyi: Vec<Real>,
    hzi: Vec<Real>,
    pyi: Vec<Real>,
    ppyi: Vec<Real>,
    bzi: Vec<Real>,
    adx: Vec<Real>,
    bdx: Vec<Real>,
    ahx: Vec<Real>,
    bhx: Vec<Real>,
}

impl AuxGrid {
    fn new(gbbox: &Bbox, d: Real, dt: Real, rel_phase_velocity: f64) -> AuxGrid {
        // Free-space update coefficients, slowed to the main grid's
        // numerical phase velocity in the incidence direction.
        let beta_eyi = (dt as f64 / (EPS0 as f64 * d as f64) / rel_phase_velocity) as Real;
        let gamma_hzi = (dt as f64 / (MU0 as f64 * d as f64) / rel_phase_velocity) as Real;

        let diag = Axis::ALL
            .iter()
            .map(|&axis| {
                let span = (gbbox.hi(axis) - gbbox.lo(axis)) as f64;
                span * span
            })
            .sum::<f64>()
            .sqrt();
        let nx = 6 + NPML + diag as usize;
        let xb = nx - NPML;

        // Graded back-end absorber: fourth-order polynomial sigma at the
        // optimal magnitude for the auxiliary spacing.
        let mut adx = vec![0.0 as Real; NPML];
        let mut bdx = vec![0.0 as Real; NPML];
        let mut ahx = vec![0.0 as Real; NPML];
        let mut bhx = vec![0.0 as Real; NPML];
        let sigma_max = 4.0 * 5.0 / (5.0 * ETA0 as f64 * d as f64);
        let half_dt_eps = 0.5 * dt as f64 / EPS0 as f64;
        for layer in 0..NPML {
            let depth = layer as f64 / NPML as f64;
            let gamma = half_dt_eps * sigma_max * depth.powi(4);
            bdx[layer] = (1.0 / (1.0 + gamma)) as Real;
            adx[layer] = ((1.0 - gamma) / (1.0 + gamma)) as Real;

            let depth = (layer as f64 + 0.5) / NPML as f64;
            let gamma = half_dt_eps * sigma_max * depth.powi(4);
            bhx[layer] = (1.0 / (1.0 + gamma)) as Real;
            ahx[layer] = ((1.0 - gamma) / (1.0 + gamma)) as Real;
        }

        AuxGrid {
            beta_eyi,
            gamma_hzi,
            nx,
            xb,
            eyi: vec![0.0; nx + 1],
            hzi: vec![0.0; nx + 1],
            pyi: vec![0.0; NPML],
            ppyi: vec![0.0; NPML],
            bzi: vec![0.0; NPML],
            adx,
            bdx,
            ahx,
            bhx,
        }
    }

    /// Advance the incident E line one step and impose the source node.
    fn update_e(&mut self, excitation: Real) {
        for i in 1..self.xb {
            self.eyi[i] += self.beta_eyi * (self.hzi[i - 1] - self.hzi[i]);
        }
        // CPML back-end; the line ends on an implicit PEC.
        for i in self.xb..self.nx {
            let layer = i - self.xb;
            let old_pp = self.ppyi[layer];
            self.ppyi[layer] += self.beta_eyi * (self.hzi[i - 1] - self.hzi[i]);
            let old_p = self.pyi[layer];
            self.pyi[layer] += self.ppyi[layer] - old_pp;
            self.eyi[i] =
                self.adx[layer] * self.eyi[i] + self.bdx[layer] * (self.pyi[layer] - old_p);
        }
        self.eyi[M0 - 2] = excitation;
    }

    /// Advance the incident H line one step.
    fn update_h(&mut self) {
        for i in 0..self.xb {
            self.hzi[i] += self.gamma_hzi * (self.eyi[i] - self.eyi[i + 1]);
        }
        for i in self.xb..self.nx {
            let layer = i - self.xb;
            let old_b = self.bzi[layer];
            self.bzi[layer] = self.ahx[layer] * self.bzi[layer]
                + self.gamma_hzi * self.bhx[layer] * (self.eyi[i] - self.eyi[i + 1]);
            self.hzi[i] += self.bzi[layer] - old_b;
        }
    }

    /// Linearly interpolate the line at projected distance `d` (grid
    /// units). E samples live on integer nodes, H on half nodes with the
    /// free-space impedance folded back in.
    fn sample(&self, comp: FieldComponent, d: f64) -> Real {
        if comp.is_electric() {
            let id = d.floor();
            let dp = (d - id) as Real;
            let base = (M0 as i64 + id as i64) as usize;
            (1.0 - dp) * self.eyi[base] + dp * self.eyi[base + 1]
        } else {
            let id = (d + 0.5).floor();
            let dp = (d + 0.5 - id) as Real;
            let base = (M0 as i64 - 1 + id as i64) as usize;
            ETA0 * ((1.0 - dp) * self.hzi[base] + dp * self.hzi[base + 1])
        }
    }
}

enum IncidentEval {
    AuxGrid(AuxGrid),
    Analytic { phase_velocity: Real },
}

/// One TF/SF plane wave.
pub struct PlaneWave {
    pub name: String,
    gbbox: Bbox,
    active: [bool; 6],
    waveform: usize,
    delay: Real,
    kinc: [f64; 3],
    finc: [Real; 6],
    /// Origin corner in grid-index units.
    ijk0: [f64; 3],
    /// Origin in physical units.
    r0: [Real; 3],
    /// Per-face correction limits.
    flim: [FieldLimits; 6],
    eval: IncidentEval,
}

/// Incident direction and field vectors from the incidence and
/// polarisation angles (all degrees).
fn incident_vectors(theta: f64, phi: f64, eta: f64, amplitude: Real) -> ([f64; 3], [Real; 6]) {
    let theta = theta.to_radians();
    let phi = phi.to_radians();
    let eta = eta.to_radians();

    let kinc = [
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    ];
    let a = amplitude as f64;
    let finc = [
        (a * (eta.cos() * phi.sin() - eta.sin() * theta.cos() * phi.cos())) as Real,
        (a * (-eta.cos() * phi.cos() - eta.sin() * theta.cos() * phi.sin())) as Real,
        (a * (eta.sin() * theta.sin())) as Real,
        (a / ETA0 as f64 * (eta.sin() * phi.sin() + eta.cos() * theta.cos() * phi.cos())) as Real,
        (a / ETA0 as f64 * (-eta.sin() * phi.cos() + eta.cos() * theta.cos() * phi.sin())) as Real,
        (a / ETA0 as f64 * (-eta.cos() * theta.sin())) as Real,
    ];
    (kinc, finc)
}

/// Pick the TF/SF box corner every interior point projects positively
/// from along the incidence direction.
fn origin_corner(gbbox: &Bbox, theta: f64, phi: f64) -> Result<[usize; 3]> {
    if !(0.0..=180.0).contains(&theta) || !(0.0..360.0).contains(&phi) {
        return Err(ConfigError::PlaneWaveAngles { theta, phi });
    }
    let x = if phi <= 90.0 || phi > 270.0 {
        gbbox.lo(Axis::X)
    } else {
        gbbox.hi(Axis::X)
    };
    let y = if phi <= 180.0 {
        gbbox.lo(Axis::Y)
    } else {
        gbbox.hi(Axis::Y)
    };
    let z = if theta <= 90.0 {
        gbbox.lo(Axis::Z)
    } else {
        gbbox.hi(Axis::Z)
    };
    Ok([x, y, z])
}

impl PlaneWave {
    pub fn new(
        record: &PlaneWaveRecord,
        grid: &Grid,
        surfaces: &ExternalBoundaries,
        waveforms: &WaveformTable,
    ) -> Result<PlaneWave> {
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
        let (kinc, finc) = incident_vectors(
            record.theta as f64,
            record.phi as f64,
            record.eta as f64,
            record.amplitude,
        );
        let corner = origin_corner(&gbbox, record.theta as f64, record.phi as f64)?;
        let ijk0 = [corner[0] as f64, corner[1] as f64, corner[2] as f64];
        let r0 = grid.node_location(corner[0], corner[1], corner[2]);

        let active = record.faces.to_flags();

        // Keep edge fields active where the box touches a mirroring
        // external surface.
        let mut edge_active = active;
        for face in Face::ALL {
            if gbbox.face(face) == grid.extents.gibox.face(face)
                && matches!(
                    surfaces.surface(face),
                    OuterSurface::Pmc | OuterSurface::Periodic
                )
            {
                edge_active[face.index()] = true;
            }
        }

        // Per-face one-cell slabs straddling the TF/SF interface.
        let flim: [FieldLimits; 6] = std::array::from_fn(|f| {
            let face = Face::ALL[f];
            let axis = face.axis();
            let mut slab = gbbox;
            let mut include = edge_active;
            if face.is_low() {
                slab.set_face(Face::high(axis), gbbox.lo(axis));
                slab.set_face(Face::low(axis), gbbox.lo(axis) - 1);
                include[Face::low(axis).index()] = false;
                include[Face::high(axis).index()] = true;
            } else {
                slab.set_face(Face::low(axis), gbbox.hi(axis));
                slab.set_face(Face::high(axis), gbbox.hi(axis) + 1);
                include[Face::low(axis).index()] = true;
                include[Face::high(axis).index()] = false;
            }
            field_limits(&slab, &include)
        });

        let eval = match grid.kind {
            GridKind::Cubic => {
                let rel = numerical_phase_velocity(&grid.duni, grid.dt, 0.0, 0.0) as f64
                    / numerical_phase_velocity(
                        &grid.duni,
                        grid.dt,
                        (record.theta as f64).to_radians(),
                        (record.phi as f64).to_radians(),
                    ) as f64;
                debug!(
                    "plane wave \"{}\": auxiliary grid, relative phase velocity {:.6}",
                    record.name, rel
                );
                IncidentEval::AuxGrid(AuxGrid::new(&gbbox, grid.duni[0], grid.dt, rel))
            }
            GridKind::Uniform => {
                let vp = numerical_phase_velocity(
                    &grid.duni,
                    grid.dt,
                    (record.theta as f64).to_radians(),
                    (record.phi as f64).to_radians(),
                );
                debug!(
                    "plane wave \"{}\": analytic incident field at {:.6}*c0",
                    record.name,
                    vp / C0
                );
                IncidentEval::Analytic { phase_velocity: vp }
            }
            GridKind::NonUniform => IncidentEval::Analytic { phase_velocity: C0 },
        };

        Ok(PlaneWave {
            name: record.name.clone(),
            gbbox,
            active,
            waveform,
            delay: record.delay,
            kinc,
            finc,
            ijk0,
            r0,
            flim,
            eval,
        })
    }

    pub fn bbox(&self) -> &Bbox {
        &self.gbbox
    }

    fn grid_units_location(&self, comp: FieldComponent, i: usize, j: usize, k: usize) -> [f64; 3] {
        let mut r = [i as f64, j as f64, k as f64];
        let axis = comp.axis();
        for a in Axis::ALL {
            let half = if comp.is_electric() {
                a == axis
            } else {
                a != axis
            };
            if half {
                r[a.index()] += 0.5;
            }
        }
        r
    }
}

/// All plane waves plus the shared update entry points.
pub struct PlaneWaves {
    items: Vec<PlaneWave>,
}

impl PlaneWaves {
    pub fn new(
        records: &[PlaneWaveRecord],
        grid: &Grid,
        surfaces: &ExternalBoundaries,
        waveforms: &WaveformTable,
    ) -> Result<PlaneWaves> {
        let items = records
            .iter()
            .map(|record| PlaneWave::new(record, grid, surfaces, waveforms))
            .collect::<Result<Vec<_>>>()?;
        Ok(PlaneWaves { items })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// E-phase corrections: advance the auxiliary grids, then add the
    /// incident-H terms on every active face.
    pub fn update_e(&mut self, grid: &mut Grid, waveforms: &WaveformTable, t_e: Real) {
        for wave in &mut self.items {
            if let IncidentEval::AuxGrid(aux) = &mut wave.eval {
                let excitation = waveforms.value(wave.waveform, t_e, wave.delay);
                aux.update_e(excitation);
            }

            for face in Face::ALL {
                if !wave.active[face.index()] {
                    continue;
                }
                let axis = face.axis();
                let offset: isize = if face.is_low() { -1 } else { 0 };
                for u in [axis.next(), axis.prev()] {
                    let v = if u == axis.next() { axis.prev() } else { axis.next() };
                    let sign_base: Real = if u == axis.next() { 1.0 } else { -1.0 };
                    let sign = if face.is_low() { sign_base } else { -sign_base };
                    let e_comp = FieldComponent::electric(u);
                    let h_comp = FieldComponent::magnetic(v);
                    let lim = *wave.flim[face.index()].get(e_comp);

                    for i in lim.range(Axis::X) {
                        for j in lim.range(Axis::Y) {
                            for k in lim.range(Axis::Z) {
                                let mut s = [i, j, k];
                                s[axis.index()] = (s[axis.index()] as isize + offset) as usize;
                                let inc = incident_field(
                                    wave, grid, h_comp, s[0], s[1], s[2], t_e, waveforms,
                                );
                                let scaled =
                                    grid.scale_h(v, inc, s[v.index()]);
                                let deriv = match grid.scaling() {
                                    FieldScaling::Scaled => scaled,
                                    FieldScaling::Unscaled => {
                                        grid.edges.idh[axis.index()][[i, j, k][axis.index()]]
                                            * scaled
                                    }
                                };
                                let (_, beta) = grid.alpha_beta_e(u, i, j, k);
                                *grid.field_mut(e_comp).at_mut(i, j, k) += sign * beta * deriv;
                            }
                        }
                    }
                }
            }
        }
    }

    /// H-phase corrections: advance the auxiliary H lines, then add the
    /// incident-E terms on every active face.
    pub fn update_h(&mut self, grid: &mut Grid, waveforms: &WaveformTable, t_h: Real) {
        for wave in &mut self.items {
            if let IncidentEval::AuxGrid(aux) = &mut wave.eval {
                aux.update_h();
            }

            for face in Face::ALL {
                if !wave.active[face.index()] {
                    continue;
                }
                let axis = face.axis();
                let offset: isize = if face.is_low() { 1 } else { 0 };
                for u in [axis.next(), axis.prev()] {
                    let v = if u == axis.next() { axis.prev() } else { axis.next() };
                    let sign_base: Real = if u == axis.next() { -1.0 } else { 1.0 };
                    let sign = if face.is_low() { sign_base } else { -sign_base };
                    let h_comp = FieldComponent::magnetic(u);
                    let e_comp = FieldComponent::electric(v);
                    let lim = *wave.flim[face.index()].get(h_comp);

                    for i in lim.range(Axis::X) {
                        for j in lim.range(Axis::Y) {
                            for k in lim.range(Axis::Z) {
                                let mut s = [i, j, k];
                                s[axis.index()] = (s[axis.index()] as isize + offset) as usize;
                                let inc = incident_field(
                                    wave, grid, e_comp, s[0], s[1], s[2], t_h, waveforms,
                                );
                                let scaled = grid.scale_e(v, inc, s[v.index()]);
                                let deriv = match grid.scaling() {
                                    FieldScaling::Scaled => scaled,
                                    FieldScaling::Unscaled => {
                                        grid.edges.ide[axis.index()][[i, j, k][axis.index()]]
                                            * scaled
                                    }
                                };
                                let gamma = grid.gamma_h(u, i, j, k);
                                *grid.field_mut(h_comp).at_mut(i, j, k) += sign * gamma * deriv;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Incident field for one component at one sample point.
fn incident_field(
    wave: &PlaneWave,
    grid: &Grid,
    comp: FieldComponent,
    i: usize,
    j: usize,
    k: usize,
    t: Real,
    waveforms: &WaveformTable,
) -> Real {
    match &wave.eval {
        IncidentEval::AuxGrid(aux) => {
            let r = wave.grid_units_location(comp, i, j, k);
            let d = wave.kinc[0] * (r[0] - wave.ijk0[0])
                + wave.kinc[1] * (r[1] - wave.ijk0[1])
                + wave.kinc[2] * (r[2] - wave.ijk0[2]);
            wave.finc[comp.index()] * aux.sample(comp, d)
        }
        IncidentEval::Analytic { phase_velocity } => {
            let r = grid.field_physical_location(comp, i, j, k);
            let d = wave.kinc[0] * (r[0] - wave.r0[0]) as f64
                + wave.kinc[1] * (r[1] - wave.r0[1]) as f64
                + wave.kinc[2] * (r[2] - wave.r0[2]) as f64;
            let retarded = t - (d / *phase_velocity as f64) as Real;
            wave.finc[comp.index()] * waveforms.value(wave.waveform, retarded, wave.delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::FaceMask;
    use crate::boundary::{BoundaryTable, ExternalBoundaries};
    use crate::config::{
        BoundaryKind, BoundaryRecord, SolverOptions, WaveformKind, WaveformRecord,
    };
    use crate::medium::{MediaTable, MEDIUM_FREE_SPACE};
    use crate::mesh::{default_courant_number, time_step, CellEdges, GridExtents, MeshLines};

    #[test]
    fn test_incident_vectors_axial() {
        // theta = 0, phi = 0, eta = 0: E along -y, H along +x, k = +z.
        let (kinc, finc) = incident_vectors(0.0, 0.0, 0.0, 1.0);
        assert!((kinc[2] - 1.0).abs() < 1e-12);
        assert!(kinc[0].abs() < 1e-12 && kinc[1].abs() < 1e-12);
        assert!((finc[FieldComponent::Ey.index()] + 1.0).abs() < 1e-6);
        assert!(finc[FieldComponent::Ex.index()].abs() < 1e-6);
        assert!((finc[FieldComponent::Hx.index()] - 1.0 / ETA0).abs() < 1e-9);
        // E x H points along k.
        let e = [finc[0] as f64, finc[1] as f64, finc[2] as f64];
        let h = [finc[3] as f64, finc[4] as f64, finc[5] as f64];
        let poynting_z = e[0] * h[1] - e[1] * h[0];
        assert!(poynting_z > 0.0);
    }

    #[test]
    fn test_origin_corner_selection() {
        let gbbox = Bbox::from_nodes(4, 10, 4, 10, 4, 10);
        assert_eq!(origin_corner(&gbbox, 0.0, 0.0).unwrap(), [4, 4, 4]);
        assert_eq!(origin_corner(&gbbox, 120.0, 200.0).unwrap(), [10, 10, 10]);
        assert_eq!(origin_corner(&gbbox, 45.0, 300.0).unwrap(), [4, 10, 4]);
        assert!(origin_corner(&gbbox, 200.0, 0.0).is_err());
    }

    #[test]
    fn test_aux_grid_propagates() {
        let gbbox = Bbox::from_nodes(2, 10, 2, 10, 2, 10);
        let d = 1e-3 as Real;
        let dt = d / (2.0 * C0);
        let mut aux = AuxGrid::new(&gbbox, d, dt, 1.0);
        // Drive a Gaussian at the source node and watch it arrive a few
        // nodes downstream at roughly the right delay.
        let mut arrival = None;
        for step in 0..200 {
            let t = step as f64;
            aux.update_e(((-(t - 15.0) * (t - 15.0) / 16.0).exp()) as Real);
            aux.update_h();
            if arrival.is_none() && aux.eyi[M0 + 8].abs() > 0.3 {
                arrival = Some(step);
            }
        }
        // 8 cells at half the Courant speed: about 16 steps after the
        // pulse peak enters.
        let arrival = arrival.expect("pulse never arrived");
        assert!(arrival > 20 && arrival < 60, "arrival at step {arrival}");
        // The back-end absorber keeps the line quiet afterwards.
        let tail: Real = aux.eyi[..aux.xb].iter().map(|v| v.abs()).fold(0.0, Real::max);
        assert!(tail < 5e-2, "tail {tail}");
    }

    fn tfsf_setup() -> (PlaneWaves, Grid, WaveformTable, ExternalBoundaries) {
        let records = vec![BoundaryRecord {
            name: "pec".to_string(),
            kind: BoundaryKind::Pec,
        }];
        let table = BoundaryTable::new(&records).unwrap();
        let names: [Option<String>; 6] = std::array::from_fn(|_| Some("pec".to_string()));
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();

        let lines = MeshLines::cubic(16, 1e-3);
        let extents = GridExtents::new(lines.num_lines(), surfaces.layers());
        let edges = CellEdges::new(&lines, &extents);
        let dt = time_step(default_courant_number(), &edges.dmin).unwrap();
        let media = MediaTable::new(&[], dt).unwrap();
        let options = SolverOptions::default();
        let mut grid = Grid::new(
            lines,
            extents,
            edges,
            dt,
            &options,
            surfaces.inner_include_flags(),
            media.len(),
        )
        .unwrap();
        let paint = grid.extents.gobox;
        grid.set_medium_on_grid(&paint, MEDIUM_FREE_SPACE, FaceMask::ALL, &media);
        surfaces.paint_pec_faces(&mut grid, &media);

        let waveforms = WaveformTable::new(
            &[WaveformRecord::with_defaults("gp", WaveformKind::GaussianPulse)],
            dt,
        )
        .unwrap();

        let wave_records = vec![PlaneWaveRecord {
            name: "pw".to_string(),
            bbox: Bbox::from_nodes(4, 12, 4, 12, 4, 12),
            waveform: "gp".to_string(),
            theta: 0.0,
            phi: 0.0,
            eta: 0.0,
            amplitude: 1.0,
            delay: 0.0,
            faces: FaceMask::ALL,
        }];
        let waves = PlaneWaves::new(&wave_records, &grid, &surfaces, &waveforms).unwrap();
        (waves, grid, waveforms, surfaces)
    }

    #[test]
    fn test_tfsf_cancellation() {
        let (mut waves, mut grid, waveforms, surfaces) = tfsf_setup();
        let dt = grid.dt;
        let lo = grid.extents.gibox.lo(Axis::X);
        let inside = lo + 8;
        let outside = lo + 1;

        let mut max_inside = 0.0 as Real;
        let mut max_outside = 0.0 as Real;
        for step in 0..220u32 {
            let t_e = step as Real * dt;
            let t_h = (step as Real + 0.5) * dt;
            grid.update_e();
            waves.update_e(&mut grid, &waveforms, t_e);
            surfaces.update_ghost_e(&mut grid);
            grid.update_h();
            waves.update_h(&mut grid, &waveforms, t_h);
            surfaces.update_ghost_h(&mut grid);

            max_inside =
                max_inside.max(grid.physical(FieldComponent::Ey, inside, inside, inside).abs());
            max_outside =
                max_outside.max(grid.physical(FieldComponent::Ey, outside, inside, inside).abs());
        }
        assert!(grid.is_stable());
        assert!(max_inside > 0.1, "incident field missing: {max_inside}");
        assert!(
            max_outside < 1e-3 * max_inside,
            "leak {max_outside} vs inside {max_inside}"
        );
    }
}
