//! Yee Grid and Field Stepper
//!
//! The six field arrays, per-cell update coefficients, and the curl
//! update loops over the inner grid's field-limit boxes. Fields live in
//! flat 1D buffers in row-major `(i, j, k)` order for cache-friendly
//! access.
//!
//! Two storage conventions are supported and fixed at init: *scaled*
//! fields fold the local edge length into each stored sample so the curl
//! is a plain four-term sum, while *unscaled* fields keep physical values
//! and the curl multiplies by reciprocal edge lengths. Coefficients can
//! be stored dense (three reals per component cell) or as medium indices
//! dereferenced through a small table.

use log::{debug, warn};

use crate::bbox::{field_limits, Bbox, FaceMask, FieldLimits, IncludeBoundary};
use crate::config::{CoefficientStorageKind, FieldScaling, SolverOptions};
use crate::error::{ConfigError, Result};
use crate::medium::MediaTable;
use crate::mesh::{CellEdges, GridExtents, GridKind, MeshLines};
use crate::types::{Axis, FieldComponent, Real, EPS0, MU0};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Sentinel a field holds before its first write in limit-checking mode.
pub const INITIAL_FIELD_VALUE: Real = -1.0;
/// Sentinel a field holds after being stepped in limit-checking mode.
pub const VISITED_FIELD_VALUE: Real = 0.0;

/// Flat 3D array with stride-based indexing.
#[derive(Clone, Debug)]
pub struct Arr3<T = Real> {
    data: Vec<T>,
    ny: usize,
    nz: usize,
}

impl<T: Copy> Arr3<T> {
    pub fn new(dims: [usize; 3], fill: T) -> Arr3<T> {
        Arr3 {
            data: vec![fill; dims[0] * dims[1] * dims[2]],
            ny: dims[1],
            nz: dims[2],
        }
    }

    /// Array sized to a closed bounding box; index with box-relative
    /// coordinates.
    pub fn for_bbox(bbox: &Bbox, fill: T) -> Arr3<T> {
        let dims = [
            bbox.hi(Axis::X) - bbox.lo(Axis::X) + 1,
            bbox.hi(Axis::Y) - bbox.lo(Axis::Y) + 1,
            bbox.hi(Axis::Z) - bbox.lo(Axis::Z) + 1,
        ];
        Arr3::new(dims, fill)
    }

    #[inline(always)]
    fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.ny + j) * self.nz + k
    }

    #[inline(always)]
    pub fn at(&self, i: usize, j: usize, k: usize) -> T {
        self.data[self.idx(i, j, k)]
    }

    #[inline(always)]
    pub fn at_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        let idx = self.idx(i, j, k);
        &mut self.data[idx]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn raw(&self) -> &[T] {
        &self.data
    }

    pub fn slab_len(&self) -> usize {
        self.ny * self.nz
    }
}

/// Run `body(i, slab)` over the destination array's outer-index slabs,
/// in parallel when the `parallel` feature is enabled. Iterations write
/// disjoint slabs, so there is no aliasing between them.
macro_rules! run_slabs {
    ($dst:expr, $ilo:expr, $ihi:expr, $body:expr) => {{
        let slab = $dst.slab_len();
        #[cfg(feature = "parallel")]
        {
            $dst.data[$ilo * slab..($ihi + 1) * slab]
                .par_chunks_mut(slab)
                .enumerate()
                .for_each(|(d, chunk)| ($body)($ilo + d, chunk));
        }
        #[cfg(not(feature = "parallel"))]
        {
            for i in $ilo..=$ihi {
                ($body)(i, &mut $dst.data[i * slab..(i + 1) * slab]);
            }
        }
    }};
}

/// Update-coefficient storage behind the dense/indexed strategy choice.
#[derive(Debug)]
pub(crate) enum Coefficients {
    Dense {
        alpha_e: [Arr3; 3],
        beta_e: [Arr3; 3],
        gamma_h: [Arr3; 3],
    },
    Indexed {
        medium_e: [Arr3<u32>; 3],
        medium_h: [Arr3<u32>; 3],
        /// `[alpha, beta, gamma]` per medium, refreshed after any
        /// init-time medium patch.
        table: Vec<[Real; 3]>,
    },
}

impl Coefficients {
    #[inline(always)]
    pub(crate) fn alpha_beta_e(&self, axis: Axis, i: usize, j: usize, k: usize) -> (Real, Real) {
        match self {
            Coefficients::Dense {
                alpha_e, beta_e, ..
            } => (
                alpha_e[axis.index()].at(i, j, k),
                beta_e[axis.index()].at(i, j, k),
            ),
            Coefficients::Indexed {
                medium_e, table, ..
            } => {
                let m = medium_e[axis.index()].at(i, j, k) as usize;
                (table[m][0], table[m][1])
            }
        }
    }

    #[inline(always)]
    pub(crate) fn gamma_h(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        match self {
            Coefficients::Dense { gamma_h, .. } => gamma_h[axis.index()].at(i, j, k),
            Coefficients::Indexed {
                medium_h, table, ..
            } => table[medium_h[axis.index()].at(i, j, k) as usize][2],
        }
    }
}

/// Mutable view of the grid with the fields split apart, for boundary
/// subsystems that step some components while reading others.
pub(crate) struct GridSplit<'a> {
    pub ex: &'a mut Arr3,
    pub ey: &'a mut Arr3,
    pub ez: &'a mut Arr3,
    pub hx: &'a mut Arr3,
    pub hy: &'a mut Arr3,
    pub hz: &'a mut Arr3,
    pub coefs: &'a Coefficients,
    pub edges: &'a CellEdges,
    pub scaling: FieldScaling,
    pub checking: bool,
}

impl<'a> GridSplit<'a> {
    /// Curl of H feeding the E component along `axis`, in the active
    /// scaling convention.
    #[inline(always)]
    pub fn curl_h(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        let idh = &self.edges.idh;
        match (axis, self.scaling) {
            (Axis::X, FieldScaling::Scaled) => {
                self.hz.at(i, j, k) - self.hz.at(i, j - 1, k) + self.hy.at(i, j, k - 1)
                    - self.hy.at(i, j, k)
            }
            (Axis::X, FieldScaling::Unscaled) => {
                idh[1][j] * (self.hz.at(i, j, k) - self.hz.at(i, j - 1, k))
                    + idh[2][k] * (self.hy.at(i, j, k - 1) - self.hy.at(i, j, k))
            }
            (Axis::Y, FieldScaling::Scaled) => {
                self.hx.at(i, j, k) - self.hx.at(i, j, k - 1) + self.hz.at(i - 1, j, k)
                    - self.hz.at(i, j, k)
            }
            (Axis::Y, FieldScaling::Unscaled) => {
                idh[2][k] * (self.hx.at(i, j, k) - self.hx.at(i, j, k - 1))
                    + idh[0][i] * (self.hz.at(i - 1, j, k) - self.hz.at(i, j, k))
            }
            (Axis::Z, FieldScaling::Scaled) => {
                self.hy.at(i, j, k) - self.hy.at(i - 1, j, k) + self.hx.at(i, j - 1, k)
                    - self.hx.at(i, j, k)
            }
            (Axis::Z, FieldScaling::Unscaled) => {
                idh[0][i] * (self.hy.at(i, j, k) - self.hy.at(i - 1, j, k))
                    + idh[1][j] * (self.hx.at(i, j - 1, k) - self.hx.at(i, j, k))
            }
        }
    }

    /// Curl of E feeding the H component along `axis`.
    #[inline(always)]
    pub fn curl_e(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        let ide = &self.edges.ide;
        match (axis, self.scaling) {
            (Axis::X, FieldScaling::Scaled) => {
                self.ey.at(i, j, k + 1) - self.ey.at(i, j, k) + self.ez.at(i, j, k)
                    - self.ez.at(i, j + 1, k)
            }
            (Axis::X, FieldScaling::Unscaled) => {
                ide[2][k] * (self.ey.at(i, j, k + 1) - self.ey.at(i, j, k))
                    + ide[1][j] * (self.ez.at(i, j, k) - self.ez.at(i, j + 1, k))
            }
            (Axis::Y, FieldScaling::Scaled) => {
                self.ez.at(i + 1, j, k) - self.ez.at(i, j, k) + self.ex.at(i, j, k)
                    - self.ex.at(i, j, k + 1)
            }
            (Axis::Y, FieldScaling::Unscaled) => {
                ide[0][i] * (self.ez.at(i + 1, j, k) - self.ez.at(i, j, k))
                    + ide[2][k] * (self.ex.at(i, j, k) - self.ex.at(i, j, k + 1))
            }
            (Axis::Z, FieldScaling::Scaled) => {
                self.ex.at(i, j + 1, k) - self.ex.at(i, j, k) + self.ey.at(i, j, k)
                    - self.ey.at(i + 1, j, k)
            }
            (Axis::Z, FieldScaling::Unscaled) => {
                ide[1][j] * (self.ex.at(i, j + 1, k) - self.ex.at(i, j, k))
                    + ide[0][i] * (self.ey.at(i, j, k) - self.ey.at(i + 1, j, k))
            }
        }
    }

    #[inline(always)]
    pub fn e_mut(&mut self, axis: Axis) -> &mut Arr3 {
        match axis {
            Axis::X => &mut *self.ex,
            Axis::Y => &mut *self.ey,
            Axis::Z => &mut *self.ez,
        }
    }

    #[inline(always)]
    pub fn h_mut(&mut self, axis: Axis) -> &mut Arr3 {
        match axis {
            Axis::X => &mut *self.hx,
            Axis::Y => &mut *self.hy,
            Axis::Z => &mut *self.hz,
        }
    }
}

/// The Yee grid: fields, coefficients, geometry and limits.
pub struct Grid {
    pub extents: GridExtents,
    pub edges: CellEdges,
    pub lines: MeshLines,
    pub kind: GridKind,
    /// Uniform spacing per axis (negative when non-uniform).
    pub duni: [Real; 3],
    pub dt: Real,
    scaling: FieldScaling,
    limit_checking: bool,

    pub ex: Arr3,
    pub ey: Arr3,
    pub ez: Arr3,
    pub hx: Arr3,
    pub hy: Arr3,
    pub hz: Arr3,

    coefs: Coefficients,

    /// Field limits over the inner grid (Mur faces excluded).
    pub flim_inner: FieldLimits,
    /// Field limits over the outer grid (coverage checking).
    pub flim_outer: FieldLimits,

    /// Cached node coordinates per axis, extrapolated through PML and
    /// ghost cells with the boundary spacing.
    node_coords: [Vec<Real>; 3],
}

impl Grid {
    pub fn new(
        lines: MeshLines,
        extents: GridExtents,
        edges: CellEdges,
        dt: Real,
        options: &SolverOptions,
        include_inner: IncludeBoundary,
        media_count: usize,
    ) -> Result<Grid> {
        if options.storage == CoefficientStorageKind::Indexed
            && options.scaling == FieldScaling::Scaled
        {
            return Err(ConfigError::IndexedStorageNeedsUnscaled);
        }

        let dims = extents.num_cells;
        let (kind, duni) = crate::mesh::classify_grid(&edges, &extents.gibox);
        debug!(
            "grid {:?}, cells {:?}, dt = {:.4e} s",
            kind, dims, dt as f64
        );

        let coefs = match options.storage {
            CoefficientStorageKind::Dense => Coefficients::Dense {
                alpha_e: std::array::from_fn(|_| Arr3::new(dims, 0.0)),
                beta_e: std::array::from_fn(|_| Arr3::new(dims, 0.0)),
                gamma_h: std::array::from_fn(|_| Arr3::new(dims, 0.0)),
            },
            CoefficientStorageKind::Indexed => Coefficients::Indexed {
                medium_e: std::array::from_fn(|_| Arr3::new(dims, 0u32)),
                medium_h: std::array::from_fn(|_| Arr3::new(dims, 0u32)),
                table: vec![[0.0; 3]; media_count],
            },
        };

        let mut node_coords: [Vec<Real>; 3] = Default::default();
        for axis in Axis::ALL {
            let a = axis.index();
            let lo = extents.gibox.lo(axis);
            let n = dims[a] + 1;
            let mut coords = vec![0.0 as Real; n];
            coords[lo] = lines.axis(axis)[0];
            for i in (0..lo).rev() {
                coords[i] = coords[i + 1] - edges.de[a][i];
            }
            for i in lo..n - 1 {
                coords[i + 1] = coords[i] + edges.de[a][i];
            }
            node_coords[a] = coords;
        }

        let initial = if options.limit_checking {
            INITIAL_FIELD_VALUE
        } else {
            0.0
        };

        let flim_inner = field_limits(&extents.gibox, &include_inner);
        let flim_outer = field_limits(&extents.gobox, &[true; 6]);

        Ok(Grid {
            extents,
            edges,
            lines,
            kind,
            duni,
            dt,
            scaling: options.scaling,
            limit_checking: options.limit_checking,
            ex: Arr3::new(dims, initial),
            ey: Arr3::new(dims, initial),
            ez: Arr3::new(dims, initial),
            hx: Arr3::new(dims, initial),
            hy: Arr3::new(dims, initial),
            hz: Arr3::new(dims, initial),
            coefs,
            flim_inner,
            flim_outer,
            node_coords,
        })
    }

    pub(crate) fn split(&mut self) -> GridSplit<'_> {
        GridSplit {
            ex: &mut self.ex,
            ey: &mut self.ey,
            ez: &mut self.ez,
            hx: &mut self.hx,
            hy: &mut self.hy,
            hz: &mut self.hz,
            coefs: &self.coefs,
            edges: &self.edges,
            scaling: self.scaling,
            checking: self.limit_checking,
        }
    }

    #[inline]
    pub fn scaling(&self) -> FieldScaling {
        self.scaling
    }

    #[inline]
    pub fn limit_checking(&self) -> bool {
        self.limit_checking
    }

    pub fn field(&self, comp: FieldComponent) -> &Arr3 {
        match comp {
            FieldComponent::Ex => &self.ex,
            FieldComponent::Ey => &self.ey,
            FieldComponent::Ez => &self.ez,
            FieldComponent::Hx => &self.hx,
            FieldComponent::Hy => &self.hy,
            FieldComponent::Hz => &self.hz,
        }
    }

    pub fn field_mut(&mut self, comp: FieldComponent) -> &mut Arr3 {
        match comp {
            FieldComponent::Ex => &mut self.ex,
            FieldComponent::Ey => &mut self.ey,
            FieldComponent::Ez => &mut self.ez,
            FieldComponent::Hx => &mut self.hx,
            FieldComponent::Hy => &mut self.hy,
            FieldComponent::Hz => &mut self.hz,
        }
    }

    /// Reset every field over the allocated extent (sentinel in
    /// limit-checking mode, zero otherwise).
    pub fn clear(&mut self) {
        let initial = if self.limit_checking {
            INITIAL_FIELD_VALUE
        } else {
            0.0
        };
        self.ex.fill(initial);
        self.ey.fill(initial);
        self.ez.fill(initial);
        self.hx.fill(initial);
        self.hy.fill(initial);
        self.hz.fill(initial);
    }

    // ------------------------------------------------------------------
    // Coefficient access
    // ------------------------------------------------------------------

    #[inline(always)]
    pub fn alpha_beta_e(&self, axis: Axis, i: usize, j: usize, k: usize) -> (Real, Real) {
        self.coefs.alpha_beta_e(axis, i, j, k)
    }

    #[inline(always)]
    pub fn gamma_h(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        self.coefs.gamma_h(axis, i, j, k)
    }

    /// Refresh the indexed-storage coefficient table from the medium
    /// table (after init-time medium patches). No-op for dense storage.
    pub fn refresh_medium_table(&mut self, media: &MediaTable) {
        if let Coefficients::Indexed { table, .. } = &mut self.coefs {
            table.clear();
            for medium in media.iter() {
                let c = &medium.coefficients;
                table.push([c.alpha, c.beta, c.gamma]);
            }
        }
    }

    /// Edge-length scale factor folded into a stored beta coefficient.
    #[inline]
    fn beta_scale(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => 1.0,
            FieldScaling::Scaled => {
                let e = &self.edges;
                match axis {
                    Axis::X => e.de[0][i] * e.idh[1][j] * e.idh[2][k],
                    Axis::Y => e.idh[0][i] * e.de[1][j] * e.idh[2][k],
                    Axis::Z => e.idh[0][i] * e.idh[1][j] * e.de[2][k],
                }
            }
        }
    }

    /// Edge-length scale factor folded into a stored gamma coefficient.
    #[inline]
    fn gamma_scale(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => 1.0,
            FieldScaling::Scaled => {
                let e = &self.edges;
                match axis {
                    Axis::X => e.dh[0][i] * e.ide[1][j] * e.ide[2][k],
                    Axis::Y => e.ide[0][i] * e.dh[1][j] * e.ide[2][k],
                    Axis::Z => e.ide[0][i] * e.ide[1][j] * e.dh[2][k],
                }
            }
        }
    }

    /// Paint a medium's coefficients over a cell bounding box (grid
    /// coordinates), honouring the face inclusion mask.
    pub fn set_medium_on_grid(
        &mut self,
        gbbox: &Bbox,
        medium: usize,
        mask: FaceMask,
        media: &MediaTable,
    ) {
        let include = mask.to_flags();
        let flim = field_limits(gbbox, &include);
        let c = media.coefficients(medium);
        let (alpha, beta, gamma) = (c.alpha, c.beta, c.gamma);

        for axis in Axis::ALL {
            let lim = *flim.get(FieldComponent::electric(axis));
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        let scaled_beta = self.beta_scale(axis, i, j, k) * beta;
                        match &mut self.coefs {
                            Coefficients::Dense {
                                alpha_e, beta_e, ..
                            } => {
                                *alpha_e[axis.index()].at_mut(i, j, k) = alpha;
                                *beta_e[axis.index()].at_mut(i, j, k) = scaled_beta;
                            }
                            Coefficients::Indexed { medium_e, .. } => {
                                *medium_e[axis.index()].at_mut(i, j, k) = medium as u32;
                            }
                        }
                    }
                }
            }

            let lim = *flim.get(FieldComponent::magnetic(axis));
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        let scaled_gamma = self.gamma_scale(axis, i, j, k) * gamma;
                        match &mut self.coefs {
                            Coefficients::Dense { gamma_h, .. } => {
                                *gamma_h[axis.index()].at_mut(i, j, k) = scaled_gamma;
                            }
                            Coefficients::Indexed { medium_h, .. } => {
                                *medium_h[axis.index()].at_mut(i, j, k) = medium as u32;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Verify a bbox still carries the coefficients of `medium`. Used by
    /// the external-surface consistency check after all painting.
    pub fn check_medium_on_grid(&self, gbbox: &Bbox, medium: usize, media: &MediaTable) -> bool {
        let flim = field_limits(gbbox, &[true; 6]);
        let c = media.coefficients(medium);
        for axis in Axis::ALL {
            let lim = flim.get(FieldComponent::electric(axis));
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        let (alpha, beta) = self.alpha_beta_e(axis, i, j, k);
                        let expect = match &self.coefs {
                            Coefficients::Dense { .. } => self.beta_scale(axis, i, j, k) * c.beta,
                            Coefficients::Indexed { .. } => c.beta,
                        };
                        let tol = expect.abs().max(1.0) * 1e-5;
                        if alpha != c.alpha || (beta - expect).abs() > tol {
                            return false;
                        }
                    }
                }
            }
            let lim = flim.get(FieldComponent::magnetic(axis));
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        let gamma = self.gamma_h(axis, i, j, k);
                        let expect = match &self.coefs {
                            Coefficients::Dense { .. } => self.gamma_scale(axis, i, j, k) * c.gamma,
                            Coefficients::Indexed { .. } => c.gamma,
                        };
                        if (gamma - expect).abs() > expect.abs().max(1.0) * 1e-5 {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Copy the E coefficients of one cell onto another (PML material
    /// carry-in; operates on the stored, possibly scaled values).
    pub fn copy_e_coefficients(&mut self, axis: Axis, dst: [usize; 3], src: [usize; 3]) {
        match &mut self.coefs {
            Coefficients::Dense {
                alpha_e, beta_e, ..
            } => {
                let a = alpha_e[axis.index()].at(src[0], src[1], src[2]);
                *alpha_e[axis.index()].at_mut(dst[0], dst[1], dst[2]) = a;
                let b = beta_e[axis.index()].at(src[0], src[1], src[2]);
                *beta_e[axis.index()].at_mut(dst[0], dst[1], dst[2]) = b;
            }
            Coefficients::Indexed { medium_e, .. } => {
                let m = medium_e[axis.index()].at(src[0], src[1], src[2]);
                *medium_e[axis.index()].at_mut(dst[0], dst[1], dst[2]) = m;
            }
        }
    }

    /// Copy the H coefficient of one cell onto another.
    pub fn copy_h_coefficients(&mut self, axis: Axis, dst: [usize; 3], src: [usize; 3]) {
        match &mut self.coefs {
            Coefficients::Dense { gamma_h, .. } => {
                let g = gamma_h[axis.index()].at(src[0], src[1], src[2]);
                *gamma_h[axis.index()].at_mut(dst[0], dst[1], dst[2]) = g;
            }
            Coefficients::Indexed { medium_h, .. } => {
                let m = medium_h[axis.index()].at(src[0], src[1], src[2]);
                *medium_h[axis.index()].at_mut(dst[0], dst[1], dst[2]) = m;
            }
        }
    }

    // ------------------------------------------------------------------
    // Scaling transitions
    // ------------------------------------------------------------------

    /// Scale a physical E sample into storage units.
    #[inline]
    pub fn scale_e(&self, axis: Axis, value: Real, index: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => self.edges.de[axis.index()][index] * value,
        }
    }

    /// Scale a physical H sample into storage units.
    #[inline]
    pub fn scale_h(&self, axis: Axis, value: Real, index: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => self.edges.dh[axis.index()][index] * value,
        }
    }

    /// Recover a physical E sample from storage units.
    #[inline]
    pub fn unscale_e(&self, axis: Axis, value: Real, index: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => self.edges.ide[axis.index()][index] * value,
        }
    }

    /// Recover a physical H sample from storage units.
    #[inline]
    pub fn unscale_h(&self, axis: Axis, value: Real, index: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => self.edges.idh[axis.index()][index] * value,
        }
    }

    /// Scale an electric current density into storage units.
    #[inline]
    pub fn scale_j(&self, axis: Axis, value: Real, i: usize, j: usize, k: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => {
                let e = &self.edges;
                match axis {
                    Axis::X => e.dh[1][j] * e.dh[2][k] * value,
                    Axis::Y => e.dh[0][i] * e.dh[2][k] * value,
                    Axis::Z => e.dh[0][i] * e.dh[1][j] * value,
                }
            }
        }
    }

    /// Scale a magnetic current density into storage units.
    #[inline]
    pub fn scale_jm(&self, axis: Axis, value: Real, i: usize, j: usize, k: usize) -> Real {
        match self.scaling {
            FieldScaling::Unscaled => value,
            FieldScaling::Scaled => {
                let e = &self.edges;
                match axis {
                    Axis::X => e.de[1][j] * e.de[2][k] * value,
                    Axis::Y => e.de[0][i] * e.de[2][k] * value,
                    Axis::Z => e.de[0][i] * e.de[1][j] * value,
                }
            }
        }
    }

    /// Physical (unscaled) value of any field component at a grid cell.
    pub fn physical(&self, comp: FieldComponent, i: usize, j: usize, k: usize) -> Real {
        let raw = self.field(comp).at(i, j, k);
        let index = match comp.axis() {
            Axis::X => i,
            Axis::Y => j,
            Axis::Z => k,
        };
        if comp.is_electric() {
            self.unscale_e(comp.axis(), raw, index)
        } else {
            self.unscale_h(comp.axis(), raw, index)
        }
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    /// Node coordinate along an axis in metres, valid through the PML
    /// and ghost layers.
    #[inline]
    pub fn node_coord(&self, axis: Axis, index: usize) -> Real {
        self.node_coords[axis.index()][index]
    }

    pub fn node_location(&self, i: usize, j: usize, k: usize) -> [Real; 3] {
        [
            self.node_coord(Axis::X, i),
            self.node_coord(Axis::Y, j),
            self.node_coord(Axis::Z, k),
        ]
    }

    /// Physical sample location of a field component (Yee staggering).
    pub fn field_physical_location(
        &self,
        comp: FieldComponent,
        i: usize,
        j: usize,
        k: usize,
    ) -> [Real; 3] {
        let mut r = self.node_location(i, j, k);
        for axis in Self::half_offset_axes(comp) {
            let a = axis.index();
            let index = [i, j, k][a];
            r[a] += 0.5 * self.edges.de[a][index];
        }
        r
    }

    /// Sample location in fractional grid-index units.
    pub fn field_index_location(
        &self,
        comp: FieldComponent,
        i: usize,
        j: usize,
        k: usize,
    ) -> [f64; 3] {
        let mut r = [i as f64, j as f64, k as f64];
        for axis in Self::half_offset_axes(comp) {
            r[axis.index()] += 0.5;
        }
        r
    }

    fn half_offset_axes(comp: FieldComponent) -> impl Iterator<Item = Axis> {
        let axis = comp.axis();
        let electric = comp.is_electric();
        Axis::ALL
            .into_iter()
            .filter(move |&a| if electric { a == axis } else { a != axis })
    }

    // ------------------------------------------------------------------
    // Curl updates
    // ------------------------------------------------------------------

    /// Step all inner-grid electric fields: `E = alpha*E + beta*curl(H)`.
    pub fn update_e(&mut self) {
        for axis in Axis::ALL {
            let lim = *self.flim_inner.get(FieldComponent::electric(axis));
            self.update_e_box(axis, &lim);
        }
    }

    /// Step all inner-grid magnetic fields: `H = H + gamma*curl(E)`.
    pub fn update_h(&mut self) {
        for axis in Axis::ALL {
            let lim = *self.flim_inner.get(FieldComponent::magnetic(axis));
            self.update_h_box(axis, &lim);
        }
    }

    /// Electric update of one component over an explicit box.
    pub fn update_e_box(&mut self, axis: Axis, lim: &Bbox) {
        let (ilo, ihi) = (lim.lo(Axis::X), lim.hi(Axis::X));
        if ilo > ihi {
            return;
        }
        let (jlo, jhi) = (lim.lo(Axis::Y), lim.hi(Axis::Y));
        let (klo, khi) = (lim.lo(Axis::Z), lim.hi(Axis::Z));
        let scaling = self.scaling;
        let checking = self.limit_checking;

        match axis {
            Axis::X => {
                let Grid {
                    ex,
                    hy,
                    hz,
                    coefs,
                    edges,
                    ..
                } = self;
                let (hy, hz, coefs) = (&*hy, &*hz, &*coefs);
                let (idhy, idhz) = (&edges.idh[1], &edges.idh[2]);
                let nz = ex.nz;
                run_slabs!(ex, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    hz.at(i, j, k) - hz.at(i, j - 1, k) + hy.at(i, j, k - 1)
                                        - hy.at(i, j, k)
                                }
                                FieldScaling::Unscaled => {
                                    idhy[j] * (hz.at(i, j, k) - hz.at(i, j - 1, k))
                                        + idhz[k] * (hy.at(i, j, k - 1) - hy.at(i, j, k))
                                }
                            };
                            let (a, b) = coefs.alpha_beta_e(Axis::X, i, j, k);
                            let e = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *e, INITIAL_FIELD_VALUE,
                                    "Ex[{i}][{j}][{k}] double write"
                                );
                                *e = VISITED_FIELD_VALUE;
                            } else {
                                *e = a * *e + b * curl;
                            }
                        }
                    }
                });
            }
            Axis::Y => {
                let Grid {
                    ey,
                    hx,
                    hz,
                    coefs,
                    edges,
                    ..
                } = self;
                let (hx, hz, coefs) = (&*hx, &*hz, &*coefs);
                let (idhx, idhz) = (&edges.idh[0], &edges.idh[2]);
                let nz = ey.nz;
                run_slabs!(ey, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    hx.at(i, j, k) - hx.at(i, j, k - 1) + hz.at(i - 1, j, k)
                                        - hz.at(i, j, k)
                                }
                                FieldScaling::Unscaled => {
                                    idhz[k] * (hx.at(i, j, k) - hx.at(i, j, k - 1))
                                        + idhx[i] * (hz.at(i - 1, j, k) - hz.at(i, j, k))
                                }
                            };
                            let (a, b) = coefs.alpha_beta_e(Axis::Y, i, j, k);
                            let e = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *e, INITIAL_FIELD_VALUE,
                                    "Ey[{i}][{j}][{k}] double write"
                                );
                                *e = VISITED_FIELD_VALUE;
                            } else {
                                *e = a * *e + b * curl;
                            }
                        }
                    }
                });
            }
            Axis::Z => {
                let Grid {
                    ez,
                    hx,
                    hy,
                    coefs,
                    edges,
                    ..
                } = self;
                let (hx, hy, coefs) = (&*hx, &*hy, &*coefs);
                let (idhx, idhy) = (&edges.idh[0], &edges.idh[1]);
                let nz = ez.nz;
                run_slabs!(ez, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    hy.at(i, j, k) - hy.at(i - 1, j, k) + hx.at(i, j - 1, k)
                                        - hx.at(i, j, k)
                                }
                                FieldScaling::Unscaled => {
                                    idhx[i] * (hy.at(i, j, k) - hy.at(i - 1, j, k))
                                        + idhy[j] * (hx.at(i, j - 1, k) - hx.at(i, j, k))
                                }
                            };
                            let (a, b) = coefs.alpha_beta_e(Axis::Z, i, j, k);
                            let e = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *e, INITIAL_FIELD_VALUE,
                                    "Ez[{i}][{j}][{k}] double write"
                                );
                                *e = VISITED_FIELD_VALUE;
                            } else {
                                *e = a * *e + b * curl;
                            }
                        }
                    }
                });
            }
        }
    }

    /// Magnetic update of one component over an explicit box.
    pub fn update_h_box(&mut self, axis: Axis, lim: &Bbox) {
        let (ilo, ihi) = (lim.lo(Axis::X), lim.hi(Axis::X));
        if ilo > ihi {
            return;
        }
        let (jlo, jhi) = (lim.lo(Axis::Y), lim.hi(Axis::Y));
        let (klo, khi) = (lim.lo(Axis::Z), lim.hi(Axis::Z));
        let scaling = self.scaling;
        let checking = self.limit_checking;

        match axis {
            Axis::X => {
                let Grid {
                    hx,
                    ey,
                    ez,
                    coefs,
                    edges,
                    ..
                } = self;
                let (ey, ez, coefs) = (&*ey, &*ez, &*coefs);
                let (idey, idez) = (&edges.ide[1], &edges.ide[2]);
                let nz = hx.nz;
                run_slabs!(hx, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    ey.at(i, j, k + 1) - ey.at(i, j, k) + ez.at(i, j, k)
                                        - ez.at(i, j + 1, k)
                                }
                                FieldScaling::Unscaled => {
                                    idez[k] * (ey.at(i, j, k + 1) - ey.at(i, j, k))
                                        + idey[j] * (ez.at(i, j, k) - ez.at(i, j + 1, k))
                                }
                            };
                            let g = coefs.gamma_h(Axis::X, i, j, k);
                            let h = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *h, INITIAL_FIELD_VALUE,
                                    "Hx[{i}][{j}][{k}] double write"
                                );
                                *h = VISITED_FIELD_VALUE;
                            } else {
                                *h += g * curl;
                            }
                        }
                    }
                });
            }
            Axis::Y => {
                let Grid {
                    hy,
                    ex,
                    ez,
                    coefs,
                    edges,
                    ..
                } = self;
                let (ex, ez, coefs) = (&*ex, &*ez, &*coefs);
                let (idex, idez) = (&edges.ide[0], &edges.ide[2]);
                let nz = hy.nz;
                run_slabs!(hy, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    ez.at(i + 1, j, k) - ez.at(i, j, k) + ex.at(i, j, k)
                                        - ex.at(i, j, k + 1)
                                }
                                FieldScaling::Unscaled => {
                                    idex[i] * (ez.at(i + 1, j, k) - ez.at(i, j, k))
                                        + idez[k] * (ex.at(i, j, k) - ex.at(i, j, k + 1))
                                }
                            };
                            let g = coefs.gamma_h(Axis::Y, i, j, k);
                            let h = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *h, INITIAL_FIELD_VALUE,
                                    "Hy[{i}][{j}][{k}] double write"
                                );
                                *h = VISITED_FIELD_VALUE;
                            } else {
                                *h += g * curl;
                            }
                        }
                    }
                });
            }
            Axis::Z => {
                let Grid {
                    hz,
                    ex,
                    ey,
                    coefs,
                    edges,
                    ..
                } = self;
                let (ex, ey, coefs) = (&*ex, &*ey, &*coefs);
                let (idex, idey) = (&edges.ide[0], &edges.ide[1]);
                let nz = hz.nz;
                run_slabs!(hz, ilo, ihi, |i: usize, chunk: &mut [Real]| {
                    for j in jlo..=jhi {
                        for k in klo..=khi {
                            let curl = match scaling {
                                FieldScaling::Scaled => {
                                    ex.at(i, j + 1, k) - ex.at(i, j, k) + ey.at(i, j, k)
                                        - ey.at(i + 1, j, k)
                                }
                                FieldScaling::Unscaled => {
                                    idey[j] * (ex.at(i, j + 1, k) - ex.at(i, j, k))
                                        + idex[i] * (ey.at(i, j, k) - ey.at(i + 1, j, k))
                                }
                            };
                            let g = coefs.gamma_h(Axis::Z, i, j, k);
                            let h = &mut chunk[j * nz + k];
                            if checking {
                                assert_eq!(
                                    *h, INITIAL_FIELD_VALUE,
                                    "Hz[{i}][{j}][{k}] double write"
                                );
                                *h = VISITED_FIELD_VALUE;
                            } else {
                                *h += g * curl;
                            }
                        }
                    }
                });
            }
        }
    }

    /// The value the standard E update would produce at one cell, without
    /// storing it. Mur evaluates this one cell in from its face.
    pub fn e_step_value(&self, axis: Axis, i: usize, j: usize, k: usize) -> Real {
        let (a, b) = self.alpha_beta_e(axis, i, j, k);
        let idh = &self.edges.idh;
        let curl = match (axis, self.scaling) {
            (Axis::X, FieldScaling::Scaled) => {
                self.hz.at(i, j, k) - self.hz.at(i, j - 1, k) + self.hy.at(i, j, k - 1)
                    - self.hy.at(i, j, k)
            }
            (Axis::X, FieldScaling::Unscaled) => {
                idh[1][j] * (self.hz.at(i, j, k) - self.hz.at(i, j - 1, k))
                    + idh[2][k] * (self.hy.at(i, j, k - 1) - self.hy.at(i, j, k))
            }
            (Axis::Y, FieldScaling::Scaled) => {
                self.hx.at(i, j, k) - self.hx.at(i, j, k - 1) + self.hz.at(i - 1, j, k)
                    - self.hz.at(i, j, k)
            }
            (Axis::Y, FieldScaling::Unscaled) => {
                idh[2][k] * (self.hx.at(i, j, k) - self.hx.at(i, j, k - 1))
                    + idh[0][i] * (self.hz.at(i - 1, j, k) - self.hz.at(i, j, k))
            }
            (Axis::Z, FieldScaling::Scaled) => {
                self.hy.at(i, j, k) - self.hy.at(i - 1, j, k) + self.hx.at(i, j - 1, k)
                    - self.hx.at(i, j, k)
            }
            (Axis::Z, FieldScaling::Unscaled) => {
                idh[0][i] * (self.hy.at(i, j, k) - self.hy.at(i - 1, j, k))
                    + idh[1][j] * (self.hx.at(i, j - 1, k) - self.hx.at(i, j, k))
            }
        };
        let e = self.field(FieldComponent::electric(axis)).at(i, j, k);
        a * e + b * curl
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Total electromagnetic energy over the inner grid [J], from the
    /// physical field values. Accumulated in f64 regardless of the field
    /// precision.
    pub fn total_energy(&self) -> f64 {
        let gibox = &self.extents.gibox;
        let mut energy = 0.0f64;
        for i in gibox.lo(Axis::X)..gibox.hi(Axis::X) {
            for j in gibox.lo(Axis::Y)..gibox.hi(Axis::Y) {
                for k in gibox.lo(Axis::Z)..gibox.hi(Axis::Z) {
                    let vol =
                        (self.edges.de[0][i] * self.edges.de[1][j] * self.edges.de[2][k]) as f64;
                    let mut e2 = 0.0f64;
                    for comp in FieldComponent::ELECTRIC {
                        let v = self.physical(comp, i, j, k) as f64;
                        e2 += v * v;
                    }
                    let mut h2 = 0.0f64;
                    for comp in FieldComponent::MAGNETIC {
                        let v = self.physical(comp, i, j, k) as f64;
                        h2 += v * v;
                    }
                    energy += 0.5 * (EPS0 as f64 * e2 + MU0 as f64 * h2) * vol;
                }
            }
        }
        energy
    }

    /// False if any field sample is NaN or infinite.
    pub fn is_stable(&self) -> bool {
        for comp in FieldComponent::ALL {
            if self.field(comp).raw().iter().any(|v| !v.is_finite()) {
                return false;
            }
        }
        true
    }

    /// Sweep the outer-grid field limits after a limit-checking step and
    /// count cells never written. Any non-zero count is a coverage bug.
    pub fn check_coverage(&self) -> usize {
        let mut errors = 0usize;
        for comp in FieldComponent::ALL {
            let lim = self.flim_outer.get(comp);
            let arr = self.field(comp);
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        if arr.at(i, j, k) != VISITED_FIELD_VALUE {
                            warn!(
                                "{}[{i}][{j}][{k}] = {} was not updated",
                                comp.label(),
                                arr.at(i, j, k)
                            );
                            errors += 1;
                        }
                    }
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverOptions;
    use crate::medium::MediaTable;
    use crate::mesh::{default_courant_number, time_step, GridExtents, MeshLines};

    fn build_grid(options: SolverOptions) -> (Grid, MediaTable) {
        let lines = MeshLines::cubic(8, 1e-3);
        let extents = GridExtents::new(lines.num_lines(), [0; 6]);
        let edges = CellEdges::new(&lines, &extents);
        let dt = time_step(default_courant_number(), &edges.dmin).unwrap();
        let media = MediaTable::new(&[], dt).unwrap();
        let mut grid = Grid::new(lines, extents, edges, dt, &options, [true; 6], media.len())
            .unwrap();
        let paint = grid.extents.gobox;
        grid.set_medium_on_grid(&paint, crate::medium::MEDIUM_FREE_SPACE, FaceMask::ALL, &media);
        grid.refresh_medium_table(&media);
        (grid, media)
    }

    #[test]
    fn test_indexed_storage_requires_unscaled() {
        let options = SolverOptions {
            storage: CoefficientStorageKind::Indexed,
            scaling: FieldScaling::Scaled,
            ..Default::default()
        };
        let lines = MeshLines::cubic(4, 1e-3);
        let extents = GridExtents::new(lines.num_lines(), [0; 6]);
        let edges = CellEdges::new(&lines, &extents);
        let dt = time_step(default_courant_number(), &edges.dmin).unwrap();
        assert!(matches!(
            Grid::new(lines, extents, edges, dt, &options, [true; 6], 2),
            Err(ConfigError::IndexedStorageNeedsUnscaled)
        ));
    }

    #[test]
    fn test_point_excitation_spreads() {
        let (mut grid, _media) = build_grid(SolverOptions::default());
        let c = grid.extents.gibox.lo(Axis::X) + 4;
        let scaled = grid.scale_e(Axis::Z, 1.0, c);
        *grid.ez.at_mut(c, c, c) = scaled;
        for _ in 0..4 {
            grid.update_h();
            grid.update_e();
        }
        assert!(grid.is_stable());
        // Energy reached neighbouring cells.
        assert!(grid.physical(FieldComponent::Ez, c + 2, c, c).abs() > 0.0);
        assert!(grid.total_energy() > 0.0);
    }

    #[test]
    fn test_pec_cell_clamps_to_zero() {
        let (mut grid, media) = build_grid(SolverOptions::default());
        let c = grid.extents.gibox.lo(Axis::X) + 4;
        let cell = Bbox::from_nodes(c, c + 1, c, c + 1, c, c + 1);
        grid.set_medium_on_grid(&cell, crate::medium::MEDIUM_PEC, FaceMask::ALL, &media);
        *grid.ez.at_mut(c, c, c) = 1.0;
        // alpha = -1, beta = 0: one step negates, the next restores, and
        // the curl feed is suppressed, so the magnitude never grows.
        grid.update_e();
        assert_eq!(grid.ez.at(c, c, c), -1.0);
        grid.update_e();
        assert_eq!(grid.ez.at(c, c, c), 1.0);
    }

    fn scaling_run(scaling: FieldScaling) -> Vec<f64> {
        let (mut grid, _media) = build_grid(SolverOptions {
            scaling,
            ..Default::default()
        });
        let c = grid.extents.gibox.lo(Axis::X) + 4;
        let scaled = grid.scale_e(Axis::Z, 1.0, c);
        *grid.ez.at_mut(c, c, c) = scaled;
        let mut samples = Vec::new();
        for _ in 0..6 {
            grid.update_h();
            grid.update_e();
            samples.push(grid.physical(FieldComponent::Ez, c + 1, c, c) as f64);
            samples.push(grid.physical(FieldComponent::Hx, c, c, c) as f64);
        }
        samples
    }

    #[test]
    fn test_scaled_and_unscaled_agree() {
        // Smoke level for 32-bit fields; the f64-fields build checks the
        // tight tolerance below.
        let scaled = scaling_run(FieldScaling::Scaled);
        let unscaled = scaling_run(FieldScaling::Unscaled);
        for (a, b) in scaled.iter().zip(&unscaled) {
            let denom = a.abs().max(b.abs()).max(1e-30);
            assert!((a - b).abs() / denom < 1e-4, "scaled {a} vs unscaled {b}");
        }
    }

    /// With 64-bit fields the two conventions agree to 1e-6 relative.
    #[cfg(feature = "f64-fields")]
    #[test]
    fn test_scaled_and_unscaled_agree_tightly() {
        let scaled = scaling_run(FieldScaling::Scaled);
        let unscaled = scaling_run(FieldScaling::Unscaled);
        for (a, b) in scaled.iter().zip(&unscaled) {
            let denom = a.abs().max(b.abs()).max(1e-30);
            assert!((a - b).abs() / denom < 1e-6, "scaled {a} vs unscaled {b}");
        }
    }

    #[test]
    fn test_dense_and_indexed_agree() {
        let run = |storage: CoefficientStorageKind| -> f64 {
            let (mut grid, _media) = build_grid(SolverOptions {
                storage,
                scaling: FieldScaling::Unscaled,
                ..Default::default()
            });
            let c = grid.extents.gibox.lo(Axis::X) + 4;
            *grid.ez.at_mut(c, c, c) = 1.0;
            for _ in 0..5 {
                grid.update_h();
                grid.update_e();
            }
            grid.physical(FieldComponent::Ez, c + 1, c + 1, c) as f64
        };
        let dense = run(CoefficientStorageKind::Dense);
        let indexed = run(CoefficientStorageKind::Indexed);
        assert!((dense - indexed).abs() <= 1e-12 * dense.abs().max(1.0));
    }

    #[test]
    fn test_limit_checking_coverage() {
        let (mut grid, _media) = build_grid(SolverOptions {
            limit_checking: true,
            ..Default::default()
        });
        // Only the inner update runs: with no PML layers the inner and
        // outer limits coincide, so one full E+H step covers everything.
        grid.update_e();
        grid.update_h();
        assert_eq!(grid.check_coverage(), 0);
    }

    #[test]
    fn test_field_locations() {
        let (grid, _media) = build_grid(SolverOptions::default());
        let lo = grid.extents.gibox.lo(Axis::X);
        // Node at the mesh origin.
        let r = grid.node_location(lo, lo, lo);
        assert!(r[0].abs() < 1e-9);
        // Ex is half a cell along x only.
        let r = grid.field_physical_location(FieldComponent::Ex, lo, lo, lo);
        assert!((r[0] - 0.5e-3).abs() < 1e-9);
        assert!(r[1].abs() < 1e-9);
        // Hx is half a cell along y and z.
        let r = grid.field_physical_location(FieldComponent::Hx, lo, lo, lo);
        assert!(r[0].abs() < 1e-9);
        assert!((r[1] - 0.5e-3).abs() < 1e-9);
        assert!((r[2] - 0.5e-3).abs() < 1e-9);
        // Ghost coordinate extrapolates below the mesh.
        assert!(grid.node_coord(Axis::X, lo - 1) < 0.0);
    }
}
