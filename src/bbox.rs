//! Bounding Boxes and Field-Limit Computation
//!
//! Cuboid index regions on the grid, face masks, and the derivation of
//! per-component field loop limits from a cell bounding box. The
//! field-limit rules here are shared verbatim by the grid stepper, PML,
//! plane-wave injector, Debye blocks, sources and SIBC surfaces; they
//! must agree exactly or cells get double-stepped or skipped.

use crate::types::{Axis, Face, FieldComponent};

/// Closed cell-index bounding box `[xlo, xhi, ylo, yhi, zlo, zhi]`.
///
/// Stored in face order so `bbox[face]` reads naturally. Degenerate axes
/// (`lo == hi`) describe surfaces, lines and points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bbox(pub [usize; 6]);

/// Dimensionality of a bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BboxKind {
    Point,
    Line,
    Surface,
    Volume,
}

impl Bbox {
    pub fn from_nodes(
        ilo: usize,
        ihi: usize,
        jlo: usize,
        jhi: usize,
        klo: usize,
        khi: usize,
    ) -> Bbox {
        Bbox([ilo, ihi, jlo, jhi, klo, khi])
    }

    #[inline]
    pub fn lo(&self, axis: Axis) -> usize {
        self.0[2 * axis.index()]
    }

    #[inline]
    pub fn hi(&self, axis: Axis) -> usize {
        self.0[2 * axis.index() + 1]
    }

    #[inline]
    pub fn face(&self, face: Face) -> usize {
        self.0[face.index()]
    }

    #[inline]
    pub fn set_face(&mut self, face: Face, value: usize) {
        self.0[face.index()] = value;
    }

    /// True if `lo <= hi` on all three axes.
    pub fn is_normal(&self) -> bool {
        Axis::ALL.iter().all(|&axis| self.lo(axis) <= self.hi(axis))
    }

    /// True if `self` lies entirely within `other`. Both must be normal.
    pub fn is_within(&self, other: &Bbox) -> bool {
        Axis::ALL.iter().all(|&axis| {
            self.lo(axis) >= other.lo(axis) && self.hi(axis) <= other.hi(axis)
        })
    }

    /// True if the box spans at most one cell on every axis.
    pub fn is_elemental(&self) -> bool {
        Axis::ALL
            .iter()
            .all(|&axis| self.hi(axis) - self.lo(axis) <= 1)
    }

    /// Translate a mesh-relative box by the lower corner of `origin`.
    pub fn offset_by(&self, origin: &Bbox) -> Bbox {
        let mut out = [0usize; 6];
        for axis in Axis::ALL {
            out[2 * axis.index()] = self.lo(axis) + origin.lo(axis);
            out[2 * axis.index() + 1] = self.hi(axis) + origin.lo(axis);
        }
        Bbox(out)
    }

    /// The degenerate box covering one face of this box.
    pub fn face_box(&self, face: Face) -> Bbox {
        let mut out = *self;
        let value = self.face(face);
        out.set_face(Face::low(face.axis()), value);
        out.set_face(Face::high(face.axis()), value);
        out
    }

    pub fn kind(&self) -> BboxKind {
        let degenerate = Axis::ALL
            .iter()
            .filter(|&&axis| self.lo(axis) == self.hi(axis))
            .count();
        match degenerate {
            0 => BboxKind::Volume,
            1 => BboxKind::Surface,
            2 => BboxKind::Line,
            _ => BboxKind::Point,
        }
    }

    /// Normal axis of a surface box, or direction of a line box.
    pub fn direction(&self) -> Option<Axis> {
        match self.kind() {
            BboxKind::Surface => Axis::ALL
                .iter()
                .copied()
                .find(|&axis| self.lo(axis) == self.hi(axis)),
            BboxKind::Line => Axis::ALL
                .iter()
                .copied()
                .find(|&axis| self.lo(axis) != self.hi(axis)),
            _ => None,
        }
    }

    /// Inclusive index range along one axis.
    #[inline]
    pub fn range(&self, axis: Axis) -> std::ops::RangeInclusive<usize> {
        self.lo(axis)..=self.hi(axis)
    }

    /// Number of cells spanned (closed count per axis).
    pub fn node_count(&self) -> usize {
        Axis::ALL
            .iter()
            .map(|&axis| self.hi(axis) - self.lo(axis) + 1)
            .product()
    }
}

/// Per-face inclusion flags, usually decoded from a face mask.
pub type IncludeBoundary = [bool; 6];

pub const INCLUDE_ALL: IncludeBoundary = [true; 6];
pub const INCLUDE_NONE: IncludeBoundary = [false; 6];

/// Six-bit face activity mask, bit order XLo..ZHi.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceMask(pub u8);

impl FaceMask {
    pub const ALL: FaceMask = FaceMask(0x3f);
    pub const NONE: FaceMask = FaceMask(0);

    #[inline]
    pub fn is_active(&self, face: Face) -> bool {
        self.0 & (1 << face.index()) != 0
    }

    pub fn to_flags(&self) -> IncludeBoundary {
        let mut flags = [false; 6];
        for face in Face::ALL {
            flags[face.index()] = self.is_active(face);
        }
        flags
    }

    pub fn from_flags(flags: &IncludeBoundary) -> FaceMask {
        let mut mask = 0u8;
        for face in Face::ALL {
            if flags[face.index()] {
                mask |= 1 << face.index();
            }
        }
        FaceMask(mask)
    }
}

/// Per-component loop limits derived from a cell bounding box.
#[derive(Clone, Copy, Debug)]
pub struct FieldLimits(pub [Bbox; 6]);

impl FieldLimits {
    #[inline]
    pub fn get(&self, field: FieldComponent) -> &Bbox {
        &self.0[field.index()]
    }
}

/// Derive the index box each field component is stepped over, given a cell
/// bounding box and per-face inclusion flags.
///
/// Components sampled in a face plane (tangential E, normal H) take the
/// face index when the face is included and step one cell inward when it
/// is excluded. Components sampled half a cell off the plane always stop
/// one short of the high face (open range on the high side).
pub fn field_limits(bbox: &Bbox, include: &IncludeBoundary) -> FieldLimits {
    let mut limits = [*bbox; 6];
    for field in FieldComponent::ALL {
        let lim = &mut limits[field.index()];
        for face in Face::ALL {
            let value = if field.lies_in_boundary(face) {
                if include[face.index()] {
                    bbox.face(face)
                } else if face.is_low() {
                    bbox.face(face) + 1
                } else {
                    bbox.face(face) - 1
                }
            } else if face.is_low() {
                bbox.face(face)
            } else {
                bbox.face(face) - 1
            };
            lim.set_face(face, value);
        }
    }
    FieldLimits(limits)
}
