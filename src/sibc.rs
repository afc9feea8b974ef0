//! Surface-Impedance Boundary Condition Surfaces
//!
//! Internal planar sheets whose tangential E is produced from the
//! surrounding tangential H through a 4x4 matrix of pole-residue
//! recursive-convolution filters (two TM ports by two TE ports). The
//! sheet itself is painted PEC so the grid never steps its tangential E;
//! the E-phase caches the filter outputs per face cell and the H-phase
//! feeds them back into the neighbouring magnetic fields.

use log::debug;

use crate::bbox::{Bbox, BboxKind};
use crate::boundary::ExternalBoundaries;
use crate::config::{FieldScaling, SibcModel, SurfaceRecord};
use crate::error::{ConfigError, Result};
use crate::filter::{
    PoleResidue, PoleResidueMatrix, RecConvMatrix, RecConvStateMatrix,
};
use crate::grid::Grid;
use crate::types::{Axis, FieldComponent, Real, ETA0};

/// Pre-rotation matrices: mesh tangential H into the principal frame,
/// for +/- orientation, cosine and sine parts.
const A_COS_POS: [[Real; 4]; 4] = [
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, -1.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
];
const A_COS_NEG: [[Real; 4]; 4] = [
    [0.0, 0.0, 0.0, -1.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0, 0.0],
];
const A_SIN_POS: [[Real; 4]; 4] = [
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];
const A_SIN_NEG: [[Real; 4]; 4] = [
    [0.0, 1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0, 0.0],
];

/// Post-rotation matrices: principal-frame E back onto the mesh.
const B_COS_POS: [[Real; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];
const B_COS_NEG: [[Real; 4]; 4] = [
    [0.0, 1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 0.0],
];
const B_SIN_POS: [[Real; 4]; 4] = [
    [0.0, 0.0, -1.0, 0.0],
    [0.0, 0.0, 0.0, -1.0],
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
];
const B_SIN_NEG: [[Real; 4]; 4] = [
    [0.0, 0.0, 0.0, -1.0],
    [0.0, 0.0, -1.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0, 0.0],
];

fn mat_comb(a: Real, ma: &[[Real; 4]; 4], b: Real, mb: &[[Real; 4]; 4]) -> [[Real; 4]; 4] {
    let mut out = [[0.0; 4]; 4];
    for p in 0..4 {
        for q in 0..4 {
            out[p][q] = a * ma[p][q] + b * mb[p][q];
        }
    }
    out
}

fn mat_vec(m: &[[Real; 4]; 4], x: &[Real; 4]) -> [Real; 4] {
    let mut y = [0.0; 4];
    for p in 0..4 {
        for q in 0..4 {
            y[p] += m[p][q] * x[q];
        }
    }
    y
}

/// Add a gamma-weighted correction to one H sample.
fn apply_h(grid: &mut Grid, comp_axis: Axis, at: [usize; 3], delta: Real) {
    let gamma = grid.gamma_h(comp_axis, at[0], at[1], at[2]);
    let comp = FieldComponent::magnetic(comp_axis);
    *grid.field_mut(comp).at_mut(at[0], at[1], at[2]) += gamma * delta;
}

/// Elementwise positivity of `I - S^H S`; rejects active sheets.
pub fn is_passive_scattering(s: &[[Real; 2]; 2]) -> bool {
    let e00 = 1.0 - (s[0][0] * s[0][0] + s[1][0] * s[1][0]);
    let e01 = s[0][0] * s[0][1] - s[1][0] * s[1][1];
    let e10 = s[0][1] * s[0][0] - s[1][1] * s[1][0];
    let e11 = 1.0 - (s[0][1] * s[0][1] + s[1][1] * s[1][1]);
    e00 >= 0.0 && e01 >= 0.0 && e10 >= 0.0 && e11 >= 0.0
}

/// Convert a 2x2 scattering matrix with free-space port impedances to an
/// impedance matrix. Fails when the matrix has no impedance
/// representation (a perfectly transparent sheet).
pub fn scattering_to_impedance(s: &[[Real; 2]; 2], name: &str) -> Result<[[Real; 2]; 2]> {
    let delta =
        (1.0 - s[0][0] as f64) * (1.0 - s[1][1] as f64) - s[0][1] as f64 * s[1][0] as f64;
    if delta.abs() < 1e-12 {
        return Err(ConfigError::Other(format!(
            "scattering matrix of SIBC boundary \"{name}\" has no impedance representation"
        )));
    }
    let eta = ETA0 as f64;
    Ok([
        [
            ((((1.0 + s[0][0] as f64) * (1.0 - s[1][1] as f64))
                + s[0][1] as f64 * s[1][0] as f64)
                / delta
                * eta) as Real,
            (2.0 * s[0][1] as f64 * eta / delta) as Real,
        ],
        [
            (2.0 * s[1][0] as f64 * eta / delta) as Real,
            ((((1.0 - s[0][0] as f64) * (1.0 + s[1][1] as f64))
                + s[0][1] as f64 * s[1][0] as f64)
                / delta
                * eta) as Real,
        ],
    ])
}

/// Build the 4x4 pole-residue matrix of one SIBC boundary model.
pub fn boundary_pole_residue_matrix(model: &SibcModel, name: &str) -> Result<PoleResidueMatrix> {
    let expand_isotropic = |prm: &PoleResidueMatrix| -> PoleResidueMatrix {
        let mut out = PoleResidueMatrix::filled(4, 4, PoleResidue::constant(0.0));
        for row in 0..2 {
            for col in 0..2 {
                out.set(row, col, prm.get(row, col).clone());
                out.set(row + 2, col + 2, prm.get(row, col).clone());
            }
        }
        out
    };

    match model {
        SibcModel::ScatteringMatrix { s_tm, s_te } => {
            if !is_passive_scattering(s_tm) || !is_passive_scattering(s_te) {
                return Err(ConfigError::NonPassiveScatteringMatrix(name.to_string()));
            }
            let z_tm = scattering_to_impedance(s_tm, name)?;
            let z_te = scattering_to_impedance(s_te, name)?;
            let mut out = PoleResidueMatrix::filled(4, 4, PoleResidue::constant(0.0));
            for row in 0..2 {
                for col in 0..2 {
                    out.set(row, col, PoleResidue::constant(z_tm[row][col] as f64));
                    out.set(
                        row + 2,
                        col + 2,
                        PoleResidue::constant(z_te[row][col] as f64),
                    );
                }
            }
            Ok(out)
        }
        SibcModel::PoleResidue(prm) => match (prm.rows, prm.cols) {
            (4, 4) => Ok(prm.clone()),
            (2, 2) => Ok(expand_isotropic(prm)),
            (rows, cols) => Err(ConfigError::PoleResidueShape {
                name: name.to_string(),
                rows,
                cols,
            }),
        },
        SibcModel::PoleResidueFile(path) => {
            let prm = PoleResidueMatrix::from_file(path)?;
            boundary_pole_residue_matrix(&SibcModel::PoleResidue(prm), name)
        }
    }
}

/// One SIBC surface instance.
pub struct SibcSurface {
    /// Face-cell box: the surface bbox with one added on the normal high
    /// side, looped half-open, so each iteration is one face cell.
    gbbox: Bbox,
    normal: Axis,
    cos_a: Real,
    sin_a: Real,
    orientation: i8,
    /// Index into the shared filter-matrix list.
    model: usize,
    /// RC filter states per face cell.
    states: Vec<RecConvStateMatrix>,
    /// Cached tangential E per face cell:
    /// `[E_u side A, E_u side B, E_v side A, E_v side B]`.
    etan: Vec<[Real; 4]>,
    /// Perpendicular-face adjacency per face cell, side A (normal-1):
    /// `[u-face at edge, u-face at +u edge, v-face at edge, v-face at +v edge]`.
    adj_a: Vec<[bool; 4]>,
    /// Same for side B (at the normal index).
    adj_b: Vec<[bool; 4]>,
    /// Face-cell counts per axis (half-open).
    dims: [usize; 3],
}

impl SibcSurface {
    fn cell_index(&self, ir: usize, jr: usize, kr: usize) -> usize {
        (ir * self.dims[1] + jr) * self.dims[2] + kr
    }
}

/// All SIBC surfaces plus their shared filter matrices.
pub struct SibcSurfaces {
    models: Vec<RecConvMatrix>,
    surfaces: Vec<SibcSurface>,
}

impl SibcSurfaces {
    /// Assemble from the internal-surface records that reference SIBC
    /// boundaries. `resolved` pairs each record with its filter matrix
    /// index into `models`.
    pub fn new(
        resolved: Vec<(&SurfaceRecord, usize)>,
        models: Vec<RecConvMatrix>,
        grid: &Grid,
    ) -> Result<SibcSurfaces> {
        let mut surfaces = Vec::with_capacity(resolved.len());

        for (record, model) in &resolved {
            if !record.bbox.is_normal() {
                return Err(ConfigError::MalformedBbox(record.bbox));
            }
            let mut gbbox = record.bbox.offset_by(&grid.extents.gibox);
            if !gbbox.is_within(&grid.extents.gibox) {
                return Err(ConfigError::BboxOutsideMesh {
                    bbox: record.bbox,
                    mesh: grid.extents.gibox,
                });
            }
            if gbbox.kind() != BboxKind::Surface {
                return Err(ConfigError::BboxDimensionality {
                    bbox: record.bbox,
                    context: "SIBC surface",
                });
            }
            let normal = gbbox.direction().expect("surface has a normal");
            // One added on the normal high side so the face-cell loops
            // run half-open on every axis.
            gbbox.set_face(
                crate::types::Face::high(normal),
                gbbox.hi(normal) + 1,
            );

            let dims = [
                gbbox.hi(Axis::X) - gbbox.lo(Axis::X),
                gbbox.hi(Axis::Y) - gbbox.lo(Axis::Y),
                gbbox.hi(Axis::Z) - gbbox.lo(Axis::Z),
            ];
            let cells = dims[0] * dims[1] * dims[2];
            debug!(
                "SIBC surface on {:?}, normal {:?}, {} face cells",
                record.bbox, normal, cells
            );

            let states = (0..cells)
                .map(|_| RecConvStateMatrix::new(&models[*model]))
                .collect();

            let angle = (record.angle as f64).to_radians();
            surfaces.push(SibcSurface {
                gbbox,
                normal,
                cos_a: angle.cos() as Real,
                sin_a: angle.sin() as Real,
                orientation: record.orientation,
                model: *model,
                states,
                etan: vec![[0.0; 4]; cells],
                adj_a: vec![[false; 4]; cells],
                adj_b: vec![[false; 4]; cells],
                dims,
            });
        }

        let mut this = SibcSurfaces { models, surfaces };
        this.set_adjacency(grid);
        Ok(this)
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Mark, for every face cell, whether the perpendicular faces
    /// touching each of its four edges belong to some SIBC surface.
    fn set_adjacency(&mut self, grid: &Grid) {
        let dims = grid.extents.num_cells;
        let mut occupied = vec![[false; 3]; dims[0] * dims[1] * dims[2]];
        let flat = |i: usize, j: usize, k: usize| (i * dims[1] + j) * dims[2] + k;

        for surface in &self.surfaces {
            let b = &surface.gbbox;
            for i in b.lo(Axis::X)..b.hi(Axis::X) {
                for j in b.lo(Axis::Y)..b.hi(Axis::Y) {
                    for k in b.lo(Axis::Z)..b.hi(Axis::Z) {
                        occupied[flat(i, j, k)][surface.normal.index()] = true;
                    }
                }
            }
        }

        for surface in &mut self.surfaces {
            let n = surface.normal;
            let u = n.next();
            let v = n.prev();
            let b = surface.gbbox;
            for i in b.lo(Axis::X)..b.hi(Axis::X) {
                for j in b.lo(Axis::Y)..b.hi(Axis::Y) {
                    for k in b.lo(Axis::Z)..b.hi(Axis::Z) {
                        let base = [i, j, k];
                        let mut side_a = base;
                        side_a[n.index()] -= 1;
                        let mut plus_u = base;
                        plus_u[u.index()] += 1;
                        let mut side_a_plus_u = side_a;
                        side_a_plus_u[u.index()] += 1;
                        let mut plus_v = base;
                        plus_v[v.index()] += 1;
                        let mut side_a_plus_v = side_a;
                        side_a_plus_v[v.index()] += 1;

                        let ir = i - b.lo(Axis::X);
                        let jr = j - b.lo(Axis::Y);
                        let kr = k - b.lo(Axis::Z);
                        let cell = surface.cell_index(ir, jr, kr);
                        surface.adj_a[cell] = [
                            occupied[flat(side_a[0], side_a[1], side_a[2])][u.index()],
                            occupied[flat(
                                side_a_plus_u[0],
                                side_a_plus_u[1],
                                side_a_plus_u[2],
                            )][u.index()],
                            occupied[flat(side_a[0], side_a[1], side_a[2])][v.index()],
                            occupied[flat(
                                side_a_plus_v[0],
                                side_a_plus_v[1],
                                side_a_plus_v[2],
                            )][v.index()],
                        ];
                        surface.adj_b[cell] = [
                            occupied[flat(base[0], base[1], base[2])][u.index()],
                            occupied[flat(plus_u[0], plus_u[1], plus_u[2])][u.index()],
                            occupied[flat(base[0], base[1], base[2])][v.index()],
                            occupied[flat(plus_v[0], plus_v[1], plus_v[2])][v.index()],
                        ];
                    }
                }
            }
        }
    }

    /// E-phase: gather the surrounding tangential H per face cell,
    /// rotate, step the 16 filters, rotate back, cache the tangential E.
    /// The sheet's grid E samples are forced to zero.
    pub fn update_e(&mut self, grid: &mut Grid) {
        let SibcSurfaces { models, surfaces } = self;
        for surface in surfaces.iter_mut() {
            let rcm = &models[surface.model];
            let n = surface.normal;
            let u = n.next();
            let v = n.prev();

            let (a_mat, b_mat) = match surface.orientation {
                1 => (
                    mat_comb(surface.cos_a, &A_COS_POS, surface.sin_a, &A_SIN_POS),
                    mat_comb(surface.cos_a, &B_COS_POS, surface.sin_a, &B_SIN_POS),
                ),
                _ => (
                    mat_comb(surface.cos_a, &A_COS_NEG, surface.sin_a, &A_SIN_NEG),
                    mat_comb(surface.cos_a, &B_COS_NEG, surface.sin_a, &B_SIN_NEG),
                ),
            };

            let b = surface.gbbox;
            for i in b.lo(Axis::X)..b.hi(Axis::X) {
                for j in b.lo(Axis::Y)..b.hi(Axis::Y) {
                    for k in b.lo(Axis::Z)..b.hi(Axis::Z) {
                        let base = [i, j, k];
                        let ir = i - b.lo(Axis::X);
                        let jr = j - b.lo(Axis::Y);
                        let kr = k - b.lo(Axis::Z);
                        let cell = surface.cell_index(ir, jr, kr);

                        // Zero the sheet's tangential E: E_u at base and
                        // base+v, E_v at base and base+u.
                        for (comp_axis, offset_axis) in [(u, v), (v, u)] {
                            let comp = FieldComponent::electric(comp_axis);
                            let mut other = base;
                            other[offset_axis.index()] += 1;
                            *grid.field_mut(comp).at_mut(base[0], base[1], base[2]) = 0.0;
                            *grid.field_mut(comp).at_mut(other[0], other[1], other[2]) = 0.0;
                        }

                        // Tangential H averaged to the face centre, each
                        // side weighted up where a perpendicular SIBC
                        // face shares the edge.
                        let mut side_a = base;
                        side_a[n.index()] -= 1;
                        let adj_a = surface.adj_a[cell];
                        let adj_b = surface.adj_b[cell];

                        let gather = |grid: &Grid, comp_axis: Axis, at: [usize; 3]| -> Real {
                            let comp = FieldComponent::magnetic(comp_axis);
                            let mut shifted = at;
                            let raw = grid.field(comp).at(at[0], at[1], at[2]);
                            let first =
                                grid.unscale_h(comp_axis, raw, at[comp_axis.index()]);
                            shifted[comp_axis.index()] += 1;
                            let raw = grid.field(comp).at(shifted[0], shifted[1], shifted[2]);
                            let second =
                                grid.unscale_h(comp_axis, raw, shifted[comp_axis.index()]);
                            first + second
                        };

                        let htan = [
                            0.5 * (1.0 + adj_a[0] as u8 as Real + adj_a[1] as u8 as Real)
                                * gather(grid, u, side_a),
                            0.5 * (1.0 + adj_b[0] as u8 as Real + adj_b[1] as u8 as Real)
                                * gather(grid, u, base),
                            0.5 * (1.0 + adj_a[2] as u8 as Real + adj_a[3] as u8 as Real)
                                * gather(grid, v, side_a),
                            0.5 * (1.0 + adj_b[2] as u8 as Real + adj_b[3] as u8 as Real)
                                * gather(grid, v, base),
                        ];

                        let h_in = mat_vec(&a_mat, &htan);
                        let mut e_out = [0.0 as Real; 4];
                        let states = &mut surface.states[cell];
                        for p in 0..4 {
                            let mut acc = 0.0f64;
                            for q in 0..4 {
                                acc += rcm
                                    .get(p, q)
                                    .step(states.get_mut(p, q), h_in[q] as f64);
                            }
                            e_out[p] = acc as Real;
                        }
                        surface.etan[cell] = mat_vec(&b_mat, &e_out);
                    }
                }
            }
        }
    }

    /// H-phase: feed the cached tangential E back into the neighbouring
    /// H samples, then force the sheet's normal H to zero.
    pub fn update_h(&mut self, grid: &mut Grid, externals: &ExternalBoundaries) {
        let unscaled = grid.scaling() == FieldScaling::Unscaled;
        for surface in &self.surfaces {
            let n = surface.normal;
            let u = n.next();
            let v = n.prev();
            let b = surface.gbbox;

            for i in b.lo(Axis::X)..b.hi(Axis::X) {
                for j in b.lo(Axis::Y)..b.hi(Axis::Y) {
                    for k in b.lo(Axis::Z)..b.hi(Axis::Z) {
                        let base = [i, j, k];
                        let ir = i - b.lo(Axis::X);
                        let jr = j - b.lo(Axis::Y);
                        let kr = k - b.lo(Axis::Z);
                        let cell = surface.cell_index(ir, jr, kr);
                        let etan = surface.etan[cell];
                        let adj_a = surface.adj_a[cell];
                        let adj_b = surface.adj_b[cell];

                        // Edge weights double contributions on mirroring
                        // external edges.
                        let w_u = [
                            0.5 * (1.0
                                + externals.is_pmc_edge(grid, u, base[u.index()]) as u8 as Real),
                            0.5 * (1.0
                                + externals.is_pmc_edge(grid, u, base[u.index()] + 1) as u8
                                    as Real),
                        ];
                        let w_v = [
                            0.5 * (1.0
                                + externals.is_pmc_edge(grid, v, base[v.index()]) as u8 as Real),
                            0.5 * (1.0
                                + externals.is_pmc_edge(grid, v, base[v.index()] + 1) as u8
                                    as Real),
                        ];

                        // Scaled cached E samples and their n-derivative
                        // factors on each side of the sheet.
                        let scale_pair = |grid: &Grid, comp_axis: Axis, value: Real| -> Real {
                            grid.scale_e(comp_axis, value, base[comp_axis.index()])
                        };
                        let e_u = [
                            scale_pair(grid, u, etan[0]),
                            scale_pair(grid, u, etan[1]),
                        ];
                        let e_v = [
                            scale_pair(grid, v, etan[2]),
                            scale_pair(grid, v, etan[3]),
                        ];
                        let n_a = base[n.index()] - 1;
                        let n_b = base[n.index()];
                        let deriv = |grid: &Grid, value: Real, at: usize| -> Real {
                            if unscaled {
                                grid.edges.ide[n.index()][at] * value
                            } else {
                                value
                            }
                        };

                        // Standard edge corrections: H_u from E_v across
                        // the sheet, H_v from E_u, four samples each.
                        for (pair, weight) in [(0usize, w_u[0]), (1usize, w_u[1])] {
                            // H_u samples sit at +pair along u.
                            let mut at_a = base;
                            at_a[n.index()] = n_a;
                            at_a[u.index()] += pair;
                            let mut at_b = base;
                            at_b[u.index()] += pair;
                            let da = deriv(grid, e_v[0], n_a);
                            let db = deriv(grid, e_v[1], n_b);
                            apply_h(grid, u, at_a, weight * da);
                            apply_h(grid, u, at_b, -weight * db);
                        }
                        for (pair, weight) in [(0usize, w_v[0]), (1usize, w_v[1])] {
                            let mut at_a = base;
                            at_a[n.index()] = n_a;
                            at_a[v.index()] += pair;
                            let mut at_b = base;
                            at_b[v.index()] += pair;
                            let da = deriv(grid, e_u[0], n_a);
                            let db = deriv(grid, e_u[1], n_b);
                            apply_h(grid, v, at_a, -weight * da);
                            apply_h(grid, v, at_b, weight * db);
                        }

                        // Parallel-H corrections just beyond the sheet
                        // edges, gated off where an adjacent SIBC face
                        // carries the edge itself.
                        let da_v = deriv(grid, e_v[0], n_a);
                        let db_v = deriv(grid, e_v[1], n_b);
                        let da_u = deriv(grid, e_u[0], n_a);
                        let db_u = deriv(grid, e_u[1], n_b);

                        if base[u.index()] + 1 < grid.extents.ggbox.hi(u) {
                            let mut at = base;
                            at[u.index()] += 1;
                            let delta = (!adj_a[1]) as u8 as Real * da_v
                                + (!adj_b[1]) as u8 as Real * db_v;
                            apply_h(grid, n, at, -0.5 * w_u[1] * delta);
                        }
                        if base[u.index()] >= 1 {
                            let mut at = base;
                            at[u.index()] -= 1;
                            let delta = (!adj_a[0]) as u8 as Real * da_v
                                + (!adj_b[0]) as u8 as Real * db_v;
                            apply_h(grid, n, at, 0.5 * w_u[0] * delta);
                        }
                        if base[v.index()] + 1 < grid.extents.ggbox.hi(v) {
                            let mut at = base;
                            at[v.index()] += 1;
                            let delta = (!adj_a[3]) as u8 as Real * da_u
                                + (!adj_b[3]) as u8 as Real * db_u;
                            apply_h(grid, n, at, -0.5 * w_v[1] * delta);
                        }
                        if base[v.index()] >= 1 {
                            let mut at = base;
                            at[v.index()] -= 1;
                            let delta = (!adj_a[2]) as u8 as Real * da_u
                                + (!adj_b[2]) as u8 as Real * db_u;
                            apply_h(grid, n, at, 0.5 * w_v[0] * delta);
                        }
                    }
                }
            }
        }

        // The sheet carries no normal H; re-impose after the corrections
        // above may have written into surface cells.
        for surface in &self.surfaces {
            let comp = FieldComponent::magnetic(surface.normal);
            let b = surface.gbbox;
            for i in b.lo(Axis::X)..b.hi(Axis::X) {
                for j in b.lo(Axis::Y)..b.hi(Axis::Y) {
                    for k in b.lo(Axis::Z)..b.hi(Axis::Z) {
                        *grid.field_mut(comp).at_mut(i, j, k) = 0.0;
                    }
                }
            }
        }
    }
}
