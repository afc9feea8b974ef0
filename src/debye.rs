//! Debye Dispersive Blocks
//!
//! Recursive-convolution auxiliary polarisation currents for blocks of
//! Debye media. Each block keeps one complex current per E sample per
//! pole plus a cache of the previous E sample; the correction is applied
//! right after the standard grid E update and consumes the post-update
//! field.

use num_complex::Complex64;

use crate::bbox::{field_limits, Bbox, FaceMask, FieldLimits};
use crate::grid::{Arr3, Grid};
use crate::medium::MediaTable;
use crate::types::{Axis, FieldComponent, Real};

/// One Debye block: auxiliary currents for the three E components over
/// the block's field-limit boxes.
pub struct DebyeBlock {
    medium: usize,
    flim: FieldLimits,
    /// Complex pole currents, `[component][cell-major][pole]`.
    currents: [Vec<Complex64>; 3],
    /// Previous E sample per component cell (stored value, scaled
    /// convention included).
    last: [Arr3; 3],
    num_poles: usize,
}

impl DebyeBlock {
    pub fn new(gbbox: &Bbox, mask: FaceMask, medium: usize, media: &MediaTable) -> DebyeBlock {
        let include = mask.to_flags();
        let flim = field_limits(gbbox, &include);
        let num_poles = media.get(medium).num_poles();

        let currents = std::array::from_fn(|a| {
            let lim = flim.get(FieldComponent::electric(Axis::ALL[a]));
            vec![Complex64::new(0.0, 0.0); lim.node_count() * num_poles]
        });
        let last = std::array::from_fn(|a| {
            Arr3::for_bbox(flim.get(FieldComponent::electric(Axis::ALL[a])), 0.0 as Real)
        });

        DebyeBlock {
            medium,
            flim,
            currents,
            last,
            num_poles,
        }
    }

    pub fn clear(&mut self) {
        for c in &mut self.currents {
            c.fill(Complex64::new(0.0, 0.0));
        }
        for l in &mut self.last {
            l.fill(0.0);
        }
    }

    /// Apply the polarisation correction and advance the pole currents.
    /// Runs after the grid E update over the same cells.
    pub fn update_e(&mut self, grid: &mut Grid, media: &MediaTable) {
        let coefficients = media.coefficients(self.medium);
        let dalpha = &coefficients.dalpha;
        let dbeta = &coefficients.dbeta;
        let np = self.num_poles;
        if np == 0 {
            return;
        }

        for axis in Axis::ALL {
            let comp = FieldComponent::electric(axis);
            let lim = *self.flim.get(comp);
            let currents = &mut self.currents[axis.index()];
            let last = &mut self.last[axis.index()];

            let mut cell = 0usize;
            for i in lim.range(Axis::X) {
                for j in lim.range(Axis::Y) {
                    for k in lim.range(Axis::Z) {
                        let ir = i - lim.lo(Axis::X);
                        let jr = j - lim.lo(Axis::Y);
                        let kr = k - lim.lo(Axis::Z);

                        let bank = &mut currents[cell * np..(cell + 1) * np];
                        let mut jsum = Complex64::new(0.0, 0.0);
                        for (p, current) in bank.iter().enumerate() {
                            jsum += (Complex64::new(1.0, 0.0) + dalpha[p]) * current;
                        }

                        let (_, beta) = grid.alpha_beta_e(axis, i, j, k);
                        let correction =
                            beta * grid.scale_j(axis, jsum.re as Real, i, j, k);
                        let e_new = {
                            let e = grid.field_mut(comp).at_mut(i, j, k);
                            *e -= correction;
                            *e
                        };

                        let index = match axis {
                            Axis::X => i,
                            Axis::Y => j,
                            Axis::Z => k,
                        };
                        let delta =
                            grid.unscale_e(axis, e_new - last.at(ir, jr, kr), index) as f64;
                        for (p, current) in bank.iter_mut().enumerate() {
                            *current = dalpha[p] * *current + dbeta[p] * delta;
                        }
                        *last.at_mut(ir, jr, kr) = e_new;

                        cell += 1;
                    }
                }
            }
        }
    }
}
