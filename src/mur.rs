//! First-Order Mur Absorbing Boundary
//!
//! One-sided advection update for the tangential electric fields on each
//! Mur face, using the standard grid update evaluated one cell inward as
//! the advanced sample. Runs before the grid E update so the inward old
//! values are still available. Edges shared by two Mur faces are left
//! out of both updates and behave as a PEC seam.

use crate::bbox::{field_limits, FieldLimits};
use crate::boundary::ExternalBoundaries;
use crate::grid::{Grid, INITIAL_FIELD_VALUE, VISITED_FIELD_VALUE};
use crate::types::{Axis, Face, FieldComponent, Real, C0};

pub struct Mur {
    /// Reflection factor per face: `(c*dt - d)/(c*dt + d)` with the
    /// face-local edge length.
    zeta: [Real; 6],
    /// Field limits per active face, adjacent Mur edges deselected.
    flim: [Option<FieldLimits>; 6],
}

impl Mur {
    pub fn new(surfaces: &ExternalBoundaries, grid: &Grid) -> Mur {
        let gibox = grid.extents.gibox;
        let mut zeta = [0.0 as Real; 6];
        let mut flim: [Option<FieldLimits>; 6] = Default::default();

        for face in Face::ALL {
            if !surfaces.surface(face).is_mur() {
                continue;
            }
            let axis = face.axis();
            let f = gibox.face(face);
            let d = if face.is_low() {
                grid.edges.de[axis.index()][f]
            } else {
                grid.edges.de[axis.index()][f - 1]
            };
            zeta[face.index()] = (C0 * grid.dt - d) / (C0 * grid.dt + d);

            let mut include = [true; 6];
            for other in Face::ALL {
                if other.axis() != axis && surfaces.surface(other).is_mur() {
                    include[other.index()] = false;
                }
            }
            flim[face.index()] = Some(field_limits(&gibox.face_box(face), &include));
        }

        Mur { zeta, flim }
    }

    pub fn is_active(&self) -> bool {
        self.flim.iter().any(|f| f.is_some())
    }

    /// Advect the tangential E fields on every Mur face. Must run before
    /// the grid E update.
    pub fn update_e(&self, grid: &mut Grid) {
        for face in Face::ALL {
            let Some(flim) = &self.flim[face.index()] else {
                continue;
            };
            let axis = face.axis();
            let zeta = self.zeta[face.index()];
            let inward: isize = if face.is_low() { 1 } else { -1 };

            for tangent in [axis.next(), axis.prev()] {
                let comp = FieldComponent::electric(tangent);
                let lim = *flim.get(comp);
                for i in lim.range(Axis::X) {
                    for j in lim.range(Axis::Y) {
                        for k in lim.range(Axis::Z) {
                            let mut inner = [i, j, k];
                            inner[axis.index()] =
                                (inner[axis.index()] as isize + inward) as usize;
                            let advanced =
                                grid.e_step_value(tangent, inner[0], inner[1], inner[2]);
                            let e_inner = grid
                                .field(comp)
                                .at(inner[0], inner[1], inner[2]);
                            let checking = grid.limit_checking();
                            let e = grid.field_mut(comp).at_mut(i, j, k);
                            if checking {
                                assert_eq!(
                                    *e, INITIAL_FIELD_VALUE,
                                    "Mur E double write at [{i}][{j}][{k}]"
                                );
                                *e = VISITED_FIELD_VALUE;
                            } else {
                                *e = e_inner + zeta * (advanced - *e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Refresh the normal H on every Mur face with the standard update.
    /// The boundary behaviour does not depend on these samples; they are
    /// kept current so observers averaging across the face read sensible
    /// values.
    pub fn update_h(&self, grid: &mut Grid) {
        for face in Face::ALL {
            let Some(flim) = &self.flim[face.index()] else {
                continue;
            };
            let comp = FieldComponent::magnetic(face.axis());
            let lim = *flim.get(comp);
            grid.update_h_box(face.axis(), &lim);
        }
    }
}
