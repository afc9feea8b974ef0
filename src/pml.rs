//! Convolutional Perfectly Matched Layer
//!
//! Complex-frequency-shifted CPML absorbing regions on the external
//! faces. Each active face owns a region box spanning its outer-grid
//! layers, with three auxiliary integrator arrays per field component
//! and per-axis 1D graded loss profiles evaluated at both integer and
//! half-integer depths.
//!
//! Reference: Roden & Gedney (2000) - Convolution PML (CPML).

use log::debug;

use crate::bbox::{field_limits, Bbox, FieldLimits};
use crate::boundary::ExternalBoundaries;
use crate::config::PmlParameters;
use crate::grid::{Arr3, Grid, INITIAL_FIELD_VALUE, VISITED_FIELD_VALUE};
use crate::types::{Axis, Face, FieldComponent, Real, EPS0, ETA0};

/// Per-face inclusion flags for stepping each region: every face is
/// included except the interface with the inner grid, which the main
/// stepper owns. Together the six tables tile the PML cells exactly.
fn step_include(face: Face) -> [bool; 6] {
    let mut include = [true; 6];
    include[face.opposite().index()] = false;
    include
}

/// Inclusion flags for the material carry-in: the region's own axis
/// faces are excluded, the transverse faces included.
fn carry_include(face: Face) -> [bool; 6] {
    let mut include = [true; 6];
    include[Face::low(face.axis()).index()] = false;
    include[Face::high(face.axis()).index()] = false;
    include
}

/// One active PML region with its auxiliary integrators.
struct PmlRegion {
    flim: FieldLimits,
    /// First-stage E integrators (one per E component), region-local.
    pp: [Arr3; 3],
    /// Second-stage E integrators.
    p: [Arr3; 3],
    /// H integrators (one per H component).
    b: [Arr3; 3],
}

impl PmlRegion {
    fn new(flim: FieldLimits) -> PmlRegion {
        let alloc = |comp: FieldComponent| Arr3::for_bbox(flim.get(comp), 0.0 as Real);
        PmlRegion {
            flim,
            pp: [
                alloc(FieldComponent::Ex),
                alloc(FieldComponent::Ey),
                alloc(FieldComponent::Ez),
            ],
            p: [
                alloc(FieldComponent::Ex),
                alloc(FieldComponent::Ey),
                alloc(FieldComponent::Ez),
            ],
            b: [
                alloc(FieldComponent::Hx),
                alloc(FieldComponent::Hy),
                alloc(FieldComponent::Hz),
            ],
        }
    }

    fn clear(&mut self) {
        for arr in self.pp.iter_mut().chain(self.p.iter_mut()).chain(self.b.iter_mut()) {
            arr.fill(0.0);
        }
    }
}

/// Per-axis profile samples: `a`, `b` and their inverse-denominator
/// cache, at integer (`d`) and half-integer (`h`) staggering, plus the
/// raw loss and stretching samples.
struct AxisProfiles {
    ad: Vec<Real>,
    bd: Vec<Real>,
    ibd: Vec<Real>,
    ah: Vec<Real>,
    bh: Vec<Real>,
    ibh: Vec<Real>,
    gd: Vec<Real>,
    kd: Vec<Real>,
    gh: Vec<Real>,
    kh: Vec<Real>,
}

impl AxisProfiles {
    fn neutral(n: usize) -> AxisProfiles {
        AxisProfiles {
            ad: vec![1.0; n],
            bd: vec![1.0; n],
            ibd: vec![1.0; n],
            ah: vec![1.0; n],
            bh: vec![1.0; n],
            ibh: vec![1.0; n],
            gd: vec![0.0; n],
            kd: vec![1.0; n],
            gh: vec![0.0; n],
            kh: vec![1.0; n],
        }
    }
}

/// The CPML subsystem: profiles on all three axes and up to six regions.
pub struct Pml {
    profiles: [AxisProfiles; 3],
    /// Region cell boxes, defined for every face (degenerate when the
    /// face has no layers).
    pbox: [Bbox; 6],
    regions: [Option<PmlRegion>; 6],
}

/// Polynomial loss profile. `x = 0` at the PML-vacuum interface, `x = 1`
/// at the PML-PEC backing.
fn sigma_profile(x: f64, total_depth: f64, mesh_size: f64, params: &PmlParameters) -> f64 {
    let order = params.order as f64;
    let sigma_max = if params.ref_coeff > 0.0 {
        -(order + 1.0) / (2.0 * ETA0 as f64 * params.n_eff as f64 * total_depth)
            * (params.ref_coeff as f64).ln()
    } else {
        // Optimal profile: |R| ~ exp(-16) at 10 layers.
        4.0 * (order + 1.0) / (5.0 * ETA0 as f64 * params.n_eff as f64 * mesh_size)
    };
    sigma_max * x.powf(order)
}

fn kappa_profile(x: f64, params: &PmlParameters) -> f64 {
    1.0 + (params.kappa_max as f64 - 1.0) * x.powf(params.order as f64)
}

impl Pml {
    pub fn new(surfaces: &ExternalBoundaries, grid: &Grid) -> Pml {
        let extents = &grid.extents;
        let gibox = extents.gibox;
        let gobox = extents.gobox;

        // Region cell boxes. A face region spans its outer-grid layers
        // along its own axis; X regions take the full transverse outer
        // extent, Y regions the full z extent only, Z regions neither.
        // The tiling gives every PML cell exactly one owner.
        let mut pbox = [gobox; 6];
        for face in Face::ALL {
            let axis = face.axis();
            let mut bbox = gobox;
            if face.is_low() {
                bbox.set_face(Face::high(axis), gibox.lo(axis));
            } else {
                bbox.set_face(Face::low(axis), gibox.hi(axis));
            }
            match axis {
                Axis::X => {}
                Axis::Y => {
                    bbox.set_face(Face::XLo, gibox.lo(Axis::X));
                    bbox.set_face(Face::XHi, gibox.hi(Axis::X));
                }
                Axis::Z => {
                    bbox.set_face(Face::XLo, gibox.lo(Axis::X));
                    bbox.set_face(Face::XHi, gibox.hi(Axis::X));
                    bbox.set_face(Face::YLo, gibox.lo(Axis::Y));
                    bbox.set_face(Face::YHi, gibox.hi(Axis::Y));
                }
            }
            pbox[face.index()] = bbox;
        }

        let mut profiles: [AxisProfiles; 3] =
            std::array::from_fn(|a| AxisProfiles::neutral(extents.num_cells[a]));

        let mut regions: [Option<PmlRegion>; 6] = Default::default();
        for face in Face::ALL {
            if let crate::boundary::OuterSurface::Pml(params) = surfaces.surface(face) {
                let axis = face.axis();
                debug!(
                    "PML {}: {} layers, order {}, kappa_max {}",
                    face.label(),
                    params.num_layers,
                    params.order,
                    params.kappa_max
                );
                set_profile(
                    &mut profiles[axis.index()],
                    &grid.edges.de[axis.index()],
                    &grid.edges.dh[axis.index()],
                    grid.dt,
                    face,
                    gibox,
                    gobox,
                    params,
                );
                let flim = field_limits(&pbox[face.index()], &step_include(face));
                regions[face.index()] = Some(PmlRegion::new(flim));
            }
        }

        Pml {
            profiles,
            pbox,
            regions,
        }
    }

    pub fn is_active(&self) -> bool {
        self.regions.iter().any(|r| r.is_some())
    }

    pub fn clear(&mut self) {
        for region in self.regions.iter_mut().flatten() {
            region.clear();
        }
    }

    /// Carry the inner-grid boundary materials into the PML layers so
    /// tangential fields step correctly for whatever medium touches each
    /// face. The Z faces run first so the side regions subsequently pick
    /// the carried values up from the strips they overlap.
    pub fn carry_materials(&self, grid: &mut Grid) {
        let gibox = grid.extents.gibox;
        let order = [
            Face::ZLo,
            Face::ZHi,
            Face::YLo,
            Face::YHi,
            Face::XLo,
            Face::XHi,
        ];
        for face in order {
            let axis = face.axis();
            let f = gibox.face(face);
            // First sample strictly inside the mesh for components
            // staggered half a cell along the region axis.
            let interior = if face.is_low() { f } else { f - 1 };
            let flim = field_limits(&self.pbox[face.index()], &carry_include(face));

            for comp_axis in Axis::ALL {
                let comp = FieldComponent::electric(comp_axis);
                let source = if comp_axis == axis { interior } else { f };
                let lim = *flim.get(comp);
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let mut src = [i, j, k];
                            src[axis.index()] = source;
                            grid.copy_e_coefficients(comp_axis, [i, j, k], src);
                        }
                    }
                }

                let comp = FieldComponent::magnetic(comp_axis);
                let source = if comp_axis == axis { f } else { interior };
                let lim = *flim.get(comp);
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let mut src = [i, j, k];
                            src[axis.index()] = source;
                            grid.copy_h_coefficients(comp_axis, [i, j, k], src);
                        }
                    }
                }
            }
        }
    }

    /// Step the electric fields in every active region.
    ///
    /// Per component with axis `n` (transverse axes `u = next(n)`,
    /// `v = prev(n)`):
    /// ```text
    /// PP' = alpha*PP + beta*curl(H)
    /// P'  = ad(u)*P + bd(u)*(PP' - PP)
    /// E'  = ad(v)*E + bd(v)*ibh(n)*(P' - ah(n)*P)
    /// ```
    pub fn update_e(&mut self, grid: &mut Grid) {
        let mut split = grid.split();
        for face in Face::ALL {
            let Some(region) = self.regions[face.index()].as_mut() else {
                continue;
            };
            for n in Axis::ALL {
                let comp = FieldComponent::electric(n);
                let lim = *region.flim.get(comp);
                if lim.lo(Axis::X) > lim.hi(Axis::X) {
                    continue;
                }
                let u = n.next();
                let v = n.prev();
                let pu = &self.profiles[u.index()];
                let pv = &self.profiles[v.index()];
                let pn = &self.profiles[n.index()];
                let pp = &mut region.pp[n.index()];
                let p = &mut region.p[n.index()];
                let checking = split.checking;

                for i in lim.range(Axis::X) {
                    let ir = i - lim.lo(Axis::X);
                    for j in lim.range(Axis::Y) {
                        let jr = j - lim.lo(Axis::Y);
                        for k in lim.range(Axis::Z) {
                            let kr = k - lim.lo(Axis::Z);
                            let curl = split.curl_h(n, i, j, k);
                            let (alpha, beta) = split.coefs.alpha_beta_e(n, i, j, k);

                            let iu = [i, j, k][u.index()];
                            let iv = [i, j, k][v.index()];
                            let inn = [i, j, k][n.index()];

                            let old_pp = pp.at(ir, jr, kr);
                            let new_pp = alpha * old_pp + beta * curl;
                            *pp.at_mut(ir, jr, kr) = new_pp;

                            let old_p = p.at(ir, jr, kr);
                            let new_p = pu.ad[iu] * old_p + pu.bd[iu] * (new_pp - old_pp);
                            *p.at_mut(ir, jr, kr) = new_p;

                            let e = split.e_mut(n).at_mut(i, j, k);
                            if checking {
                                assert_eq!(
                                    *e, INITIAL_FIELD_VALUE,
                                    "PML E double write at [{i}][{j}][{k}]"
                                );
                                *e = VISITED_FIELD_VALUE;
                            } else {
                                *e = pv.ad[iv] * *e
                                    + pv.bd[iv] * pn.ibh[inn] * (new_p - pn.ah[inn] * old_p);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Step the magnetic fields in every active region (dual of
    /// `update_e` with the `h` and `d` profiles exchanged).
    pub fn update_h(&mut self, grid: &mut Grid) {
        let mut split = grid.split();
        for face in Face::ALL {
            let Some(region) = self.regions[face.index()].as_mut() else {
                continue;
            };
            for n in Axis::ALL {
                let comp = FieldComponent::magnetic(n);
                let lim = *region.flim.get(comp);
                if lim.lo(Axis::X) > lim.hi(Axis::X) {
                    continue;
                }
                let u = n.next();
                let v = n.prev();
                let pu = &self.profiles[u.index()];
                let pv = &self.profiles[v.index()];
                let pn = &self.profiles[n.index()];
                let b = &mut region.b[n.index()];
                let checking = split.checking;

                for i in lim.range(Axis::X) {
                    let ir = i - lim.lo(Axis::X);
                    for j in lim.range(Axis::Y) {
                        let jr = j - lim.lo(Axis::Y);
                        for k in lim.range(Axis::Z) {
                            let kr = k - lim.lo(Axis::Z);
                            let curl = split.curl_e(n, i, j, k);
                            let gamma = split.coefs.gamma_h(n, i, j, k);

                            let iu = [i, j, k][u.index()];
                            let iv = [i, j, k][v.index()];
                            let inn = [i, j, k][n.index()];

                            let old_b = b.at(ir, jr, kr);
                            let new_b = pu.ah[iu] * old_b + gamma * pu.bh[iu] * curl;
                            *b.at_mut(ir, jr, kr) = new_b;

                            let h = split.h_mut(n).at_mut(i, j, k);
                            if checking {
                                assert_eq!(
                                    *h, INITIAL_FIELD_VALUE,
                                    "PML H double write at [{i}][{j}][{k}]"
                                );
                                *h = VISITED_FIELD_VALUE;
                            } else {
                                *h = pv.ah[iv] * *h
                                    + pv.bh[iv] * pn.ibd[inn] * (new_b - pn.ad[inn] * old_b);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Fill one axis's profile arrays over the layer span of one face.
///
/// The `d` (integer-depth) samples feed the E updates transversally and
/// the `h` (half-depth) samples feed H, with the component-axis arrays
/// swapped as the update equations require. Each sample carries
/// `gamma = 0.5*dt*sigma/eps0` and the coefficient triplet
/// `b = 1/(kappa+gamma)`, `a = (kappa-gamma)/(kappa+gamma)`,
/// `ib = kappa+gamma`.
#[allow(clippy::too_many_arguments)]
fn set_profile(
    profiles: &mut AxisProfiles,
    de: &[Real],
    dh: &[Real],
    dt: Real,
    face: Face,
    gibox: Bbox,
    gobox: Bbox,
    params: &PmlParameters,
) {
    let axis = face.axis();
    let (low, high, dir) = if face.is_low() {
        (gobox.lo(axis), gibox.lo(axis) - 1, -1.0f64)
    } else {
        (gibox.hi(axis), gobox.hi(axis) - 1, 1.0f64)
    };

    let mut total_depth = 0.0f64;
    for i in low..=high {
        total_depth += de[i] as f64;
    }
    let mesh_size = de[low] as f64;
    let half_dt_eps = 0.5 * dt as f64 / EPS0 as f64;

    let (mut depth_e, mut depth_h) = if dir < 0.0 {
        (total_depth, total_depth - 0.5 * de[low] as f64)
    } else {
        (0.0, 0.5 * de[low] as f64)
    };

    for i in low..=high {
        let x = depth_e / total_depth;
        let gamma = half_dt_eps * sigma_profile(x, total_depth, mesh_size, params);
        let kappa = kappa_profile(x, params);
        profiles.gh[i] = gamma as Real;
        profiles.kh[i] = kappa as Real;
        profiles.bd[i] = (1.0 / (kappa + gamma)) as Real;
        profiles.ibd[i] = (kappa + gamma) as Real;
        profiles.ad[i] = ((kappa - gamma) / (kappa + gamma)) as Real;
        depth_e += dir * de[i] as f64;
    }

    if dir > 0.0 {
        // The PEC backing node of a high-side PML.
        let x = (depth_e / total_depth).min(1.0);
        let gamma = half_dt_eps * sigma_profile(x, total_depth, mesh_size, params);
        let kappa = kappa_profile(x, params);
        profiles.gh[high + 1] = gamma as Real;
        profiles.kh[high + 1] = kappa as Real;
        profiles.bd[high + 1] = (1.0 / (kappa + gamma)) as Real;
        profiles.ibd[high + 1] = (kappa + gamma) as Real;
        profiles.ad[high + 1] = ((kappa - gamma) / (kappa + gamma)) as Real;
    }

    for i in low..=high {
        let x = (depth_h / total_depth).clamp(0.0, 1.0);
        let gamma = half_dt_eps * sigma_profile(x, total_depth, mesh_size, params);
        let kappa = kappa_profile(x, params);
        profiles.gd[i] = gamma as Real;
        profiles.kd[i] = kappa as Real;
        profiles.bh[i] = (1.0 / (kappa + gamma)) as Real;
        profiles.ibh[i] = (kappa + gamma) as Real;
        profiles.ah[i] = ((kappa - gamma) / (kappa + gamma)) as Real;
        depth_h += dir * dh[i] as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::FaceMask;
    use crate::boundary::{BoundaryTable, ExternalBoundaries};
    use crate::config::{BoundaryKind, BoundaryRecord, SolverOptions};
    use crate::medium::{MediaTable, MEDIUM_FREE_SPACE};
    use crate::mesh::{default_courant_number, time_step, CellEdges, GridExtents, MeshLines};

    fn pml_setup() -> (Pml, Grid, MediaTable, ExternalBoundaries) {
        let records = vec![BoundaryRecord {
            name: "absorber".to_string(),
            kind: BoundaryKind::Pml(PmlParameters::default()),
        }];
        let table = BoundaryTable::new(&records).unwrap();
        let names: [Option<String>; 6] = std::array::from_fn(|_| Some("absorber".to_string()));
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();

        let lines = MeshLines::cubic(8, 1e-3);
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
        let pml = Pml::new(&surfaces, &grid);
        pml.carry_materials(&mut grid);
        surfaces.paint_pec_faces(&mut grid, &media);
        (pml, grid, media, surfaces)
    }

    #[test]
    fn test_profile_grading_monotone() {
        let (pml, grid, _media, _surfaces) = pml_setup();
        let p = &pml.profiles[0];
        let olo = grid.extents.gobox.lo(Axis::X);
        let ilo = grid.extents.gibox.lo(Axis::X);
        // Loss grows towards the outer PEC backing, so `a` falls towards
        // the boundary and is neutral at the interface.
        assert!(p.ad[olo] < p.ad[ilo - 1]);
        assert!((p.ad[ilo] - 1.0).abs() < 1e-6);
        assert!((p.bd[ilo] - 1.0).abs() < 1e-6);
        assert!(p.gh[olo] > 0.0);
    }

    #[test]
    fn test_regions_tile_without_overlap() {
        let (pml, grid, _media, _surfaces) = pml_setup();
        // Every Ex sample in the outer-but-not-inner volume is stepped by
        // exactly one region; inner samples by none.
        let mut count = Arr3::<u32>::new(grid.extents.num_cells, 0u32);
        for face in Face::ALL {
            let region = pml.regions[face.index()].as_ref().unwrap();
            let lim = region.flim.get(FieldComponent::Ex);
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        *count.at_mut(i, j, k) += 1;
                    }
                }
            }
        }
        let inner = field_limits(&grid.extents.gibox, &[true; 6]);
        let outer = field_limits(&grid.extents.gobox, &[true; 6]);
        let inner_ex = inner.get(FieldComponent::Ex);
        let outer_ex = outer.get(FieldComponent::Ex);
        for i in outer_ex.range(Axis::X) {
            for j in outer_ex.range(Axis::Y) {
                for k in outer_ex.range(Axis::Z) {
                    let in_inner = inner_ex.range(Axis::X).contains(&i)
                        && inner_ex.range(Axis::Y).contains(&j)
                        && inner_ex.range(Axis::Z).contains(&k);
                    let expected = if in_inner { 0 } else { 1 };
                    assert_eq!(
                        count.at(i, j, k),
                        expected,
                        "Ex[{i}][{j}][{k}] stepped {} times",
                        count.at(i, j, k)
                    );
                }
            }
        }
    }

    #[test]
    fn test_pml_absorbs_pulse() {
        let (mut pml, mut grid, _media, surfaces) = pml_setup();
        let c = grid.extents.gibox.lo(Axis::X) + 4;
        // Drive a short zero-mean pulse (a soft injection with net area
        // would leave a permanent electrostatic remnant at the source)
        // and step long enough for it to hit the boundary and, without
        // absorption, come back.
        let mut peak_in = 0.0 as Real;
        for step in 0..160 {
            let u = (step as f64 - 20.0) / 6.0;
            let drive = ((1.0 - u * u) * (-0.5 * u * u).exp()) as Real;
            pml.update_e(&mut grid);
            grid.update_e();
            let scaled = grid.scale_e(Axis::Z, drive, c);
            *grid.ez.at_mut(c, c, c) += scaled;
            surfaces.update_ghost_e(&mut grid);
            pml.update_h(&mut grid);
            grid.update_h();
            surfaces.update_ghost_h(&mut grid);
            if step < 60 {
                peak_in = peak_in.max(grid.physical(FieldComponent::Ez, c, c, c).abs());
            }
        }
        assert!(grid.is_stable());
        // Long after the pulse has left, the interior is quiet.
        let residual = grid.physical(FieldComponent::Ez, c, c, c).abs();
        assert!(
            residual < 1e-2 * peak_in,
            "residual {residual} vs peak {peak_in}"
        );
    }
}
