//! Mesh Geometry
//!
//! Non-uniform mesh-line coordinates, the derived primary/secondary edge
//! length arrays with cached reciprocals, grid extents (inner / outer /
//! ghost boxes), time-step selection and grid-type classification.
//!
//! Edge arrays are indexed in *grid* coordinates: the ghost box starts at
//! index 0, the outer box at 1, and the inner (physical) mesh at
//! `1 + pml_layers` per face. PML cells reuse the adjacent inner-mesh
//! spacing; ghost cells reuse the outermost outer-grid spacing.

use crate::bbox::Bbox;
use crate::error::{ConfigError, Result};
use crate::types::{Axis, Real, C0};

/// One ghost cell on each side of the outer grid.
pub const NUM_GHOST_CELLS: usize = 1;

/// Tolerance on edge-length differences when classifying the grid.
const GRID_TYPE_TOL: Real = 1e-5 as Real;

/// Mesh-line coordinate sequences along each axis [m].
#[derive(Clone, Debug)]
pub struct MeshLines {
    pub x: Vec<Real>,
    pub y: Vec<Real>,
    pub z: Vec<Real>,
}

impl MeshLines {
    /// Uniform mesh with `n` lines spaced `d` apart per axis.
    pub fn uniform(n: [usize; 3], d: [Real; 3]) -> MeshLines {
        let build = |count: usize, del: Real| -> Vec<Real> {
            (0..count).map(|i| i as Real * del).collect()
        };
        MeshLines {
            x: build(n[0], d[0]),
            y: build(n[1], d[1]),
            z: build(n[2], d[2]),
        }
    }

    /// Cubic mesh: `n + 1` lines per axis with spacing `d`.
    pub fn cubic(n: usize, d: Real) -> MeshLines {
        MeshLines::uniform([n + 1, n + 1, n + 1], [d, d, d])
    }

    pub fn axis(&self, axis: Axis) -> &[Real] {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    pub fn num_lines(&self) -> [usize; 3] {
        [self.x.len(), self.y.len(), self.z.len()]
    }

    pub fn validate(&self) -> Result<()> {
        for axis in Axis::ALL {
            let lines = self.axis(axis);
            if lines.len() < 2 {
                return Err(ConfigError::DegenerateMesh(lines.len()));
            }
            if lines.windows(2).any(|w| w[1] <= w[0]) {
                return Err(ConfigError::NonMonotoneMeshLines {
                    axis: axis.label(),
                });
            }
        }
        Ok(())
    }
}

/// The three nested cell regions of the grid plus allocation extents.
#[derive(Clone, Copy, Debug)]
pub struct GridExtents {
    /// Inner grid: the physical mesh volume.
    pub gibox: Bbox,
    /// Outer grid: inner grid plus PML layers.
    pub gobox: Bbox,
    /// Ghost grid: outer grid plus one mirror cell per face.
    pub ggbox: Bbox,
    /// Allocated cells per axis (outer extent plus two ghosts).
    pub num_cells: [usize; 3],
}

impl GridExtents {
    /// Build the nested boxes from mesh line counts and per-face PML
    /// layer counts (zero for non-PML faces).
    pub fn new(num_lines: [usize; 3], layers: [usize; 6]) -> GridExtents {
        let mut gibox = [0usize; 6];
        let mut gobox = [0usize; 6];
        let mut ggbox = [0usize; 6];
        let mut num_cells = [0usize; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            ggbox[2 * a] = 0;
            gobox[2 * a] = NUM_GHOST_CELLS;
            gibox[2 * a] = gobox[2 * a] + layers[2 * a];
            gibox[2 * a + 1] = gibox[2 * a] + num_lines[a] - 1;
            gobox[2 * a + 1] = gibox[2 * a + 1] + layers[2 * a + 1];
            ggbox[2 * a + 1] = gobox[2 * a + 1] + 1;
            num_cells[a] = gobox[2 * a + 1] - gobox[2 * a] + 2 * NUM_GHOST_CELLS;
        }
        GridExtents {
            gibox: Bbox(gibox),
            gobox: Bbox(gobox),
            ggbox: Bbox(ggbox),
            num_cells,
        }
    }
}

/// Per-axis edge-length arrays with cached reciprocals.
#[derive(Clone, Debug)]
pub struct CellEdges {
    /// Primary edges (cell widths), per axis.
    pub de: [Vec<Real>; 3],
    /// Secondary edges (dual-cell widths), per axis.
    pub dh: [Vec<Real>; 3],
    /// Reciprocal primary edges.
    pub ide: [Vec<Real>; 3],
    /// Reciprocal secondary edges.
    pub idh: [Vec<Real>; 3],
    /// Minimum edge length per axis over primary and secondary grids.
    pub dmin: [Real; 3],
    /// Maximum edge length per axis.
    pub dmax: [Real; 3],
}

impl CellEdges {
    pub fn new(lines: &MeshLines, extents: &GridExtents) -> CellEdges {
        let mut de: [Vec<Real>; 3] = Default::default();
        let mut dh: [Vec<Real>; 3] = Default::default();
        let mut ide: [Vec<Real>; 3] = Default::default();
        let mut idh: [Vec<Real>; 3] = Default::default();
        let mut dmin = [Real::MAX; 3];
        let mut dmax = [0.0 as Real; 3];

        for axis in Axis::ALL {
            let a = axis.index();
            let v = lines.axis(axis);
            let n = extents.num_cells[a];
            let ilo = extents.gibox.lo(axis);
            let ihi = extents.gibox.hi(axis);
            let olo = extents.gobox.lo(axis);
            let ohi = extents.gobox.hi(axis);

            let mut d = vec![0.0 as Real; n];
            // PML layers below the mesh reuse the first spacing.
            for i in olo..ilo {
                d[i] = v[1] - v[0];
            }
            for i in ilo..ihi {
                d[i] = v[i - ilo + 1] - v[i - ilo];
            }
            // PML layers above the mesh reuse the last spacing.
            for i in ihi..ohi {
                d[i] = v[ihi - ilo] - v[ihi - ilo - 1];
            }
            d[olo - 1] = d[olo];
            d[ohi] = d[ohi - 1];

            let mut id = vec![0.0 as Real; n];
            for i in (olo - 1)..=ohi {
                id[i] = 1.0 / d[i];
                dmin[a] = dmin[a].min(d[i]);
                dmax[a] = dmax[a].max(d[i]);
            }

            let mut dual = vec![0.0 as Real; n];
            let mut idual = vec![0.0 as Real; n];
            for i in olo..=ohi {
                dual[i] = 0.5 * (d[i] + d[i - 1]);
            }
            dual[olo - 1] = dual[olo];
            for i in olo..=ohi {
                idual[i] = 1.0 / dual[i];
                dmin[a] = dmin[a].min(dual[i]);
                dmax[a] = dmax[a].max(dual[i]);
            }
            idual[olo - 1] = idual[olo];

            de[a] = d;
            ide[a] = id;
            dh[a] = dual;
            idh[a] = idual;
        }

        CellEdges {
            de,
            dh,
            ide,
            idh,
            dmin,
            dmax,
        }
    }

    #[inline]
    pub fn de(&self, axis: Axis, i: usize) -> Real {
        self.de[axis.index()][i]
    }

    #[inline]
    pub fn dh(&self, axis: Axis, i: usize) -> Real {
        self.dh[axis.index()][i]
    }

    #[inline]
    pub fn ide(&self, axis: Axis, i: usize) -> Real {
        self.ide[axis.index()][i]
    }

    #[inline]
    pub fn idh(&self, axis: Axis, i: usize) -> Real {
        self.idh[axis.index()][i]
    }
}

/// Time step from the Courant number and minimum edge lengths. Rejects
/// `CFLN` outside `(0, 1)`.
pub fn time_step(cfln: Real, dmin: &[Real; 3]) -> Result<Real> {
    if !(cfln > 0.0 && cfln < 1.0) {
        return Err(ConfigError::CourantNumber(cfln as f64));
    }
    let sum: f64 = dmin
        .iter()
        .map(|&d| {
            let inv = 1.0 / d as f64;
            inv * inv
        })
        .sum();
    Ok((cfln as f64 / (C0 as f64 * sum.sqrt())) as Real)
}

/// Default Courant stability factor.
pub fn default_courant_number() -> Real {
    (3.0 as Real).sqrt() / 2.0
}

/// Grid classification used to select the plane-wave evaluation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKind {
    Cubic,
    Uniform,
    NonUniform,
}

/// Classify the inner grid and return the uniform spacing per axis when
/// it exists (negative sentinel otherwise, matching the unset state).
pub fn classify_grid(edges: &CellEdges, gibox: &Bbox) -> (GridKind, [Real; 3]) {
    let mut uniform = [true; 3];
    for axis in Axis::ALL {
        let a = axis.index();
        for i in (gibox.lo(axis) + 1)..gibox.hi(axis) {
            if (edges.de[a][i] - edges.de[a][i - 1]).abs() > GRID_TYPE_TOL {
                uniform[a] = false;
            }
        }
    }
    if uniform.iter().all(|&u| u) {
        let d = [
            edges.de[0][gibox.lo(Axis::X)],
            edges.de[1][gibox.lo(Axis::Y)],
            edges.de[2][gibox.lo(Axis::Z)],
        ];
        let cubic = (d[0] - d[1]).abs() < GRID_TYPE_TOL && (d[1] - d[2]).abs() < GRID_TYPE_TOL;
        if cubic {
            (GridKind::Cubic, d)
        } else {
            (GridKind::Uniform, d)
        }
    } else {
        (GridKind::NonUniform, [-1.0, -1.0, -1.0])
    }
}

/// Numerical phase velocity in direction `(theta, phi)` on a uniform
/// grid, by Newton-Raphson iteration on the discrete dispersion relation.
///
/// The reference frequency is taken as `1/(23*dt)`, a heuristic choice of
/// a "representative" resolvable frequency inherited from practice rather
/// than derived; callers needing a specific band should not rely on it.
pub fn numerical_phase_velocity(duni: &[Real; 3], dt: Real, theta: f64, phi: f64) -> Real {
    let d = [duni[0] as f64, duni[1] as f64, duni[2] as f64];
    let dt = dt as f64;
    let c0 = C0 as f64;
    let w = 2.0 * std::f64::consts::PI / (23.0 * dt);

    let a = [
        0.5 * d[0] * theta.sin() * phi.cos(),
        0.5 * d[1] * theta.sin() * phi.sin(),
        0.5 * d[2] * theta.cos(),
    ];
    let b = (0.5 * w * dt).sin() / (c0 * dt);

    let mut k = w / c0;
    for _ in 0..10 {
        let s = [
            (a[0] * k).sin() / d[0],
            (a[1] * k).sin() / d[1],
            (a[2] * k).sin() / d[2],
        ];
        let func = s[0] * s[0] + s[1] * s[1] + s[2] * s[2] - b * b;
        let derivative = a[0] * (2.0 * a[0] * k).sin() / (d[0] * d[0])
            + a[1] * (2.0 * a[1] * k).sin() / (d[1] * d[1])
            + a[2] * (2.0 * a[2] * k).sin() / (d[2] * d[2]);
        k -= func / derivative;
    }

    (w / k) as Real
}
