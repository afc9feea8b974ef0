//! External Boundaries and Ghost Fill
//!
//! Resolution of per-face boundary records (PEC, PMC, periodic, Mur,
//! PML), their consistency validation, PEC painting of external faces
//! and PML backings, and the one-cell ghost-layer fill performed before
//! each half-step.

use std::collections::HashMap;

use log::warn;

use crate::bbox::FaceMask;
use crate::config::{BoundaryKind, BoundaryRecord, PmlParameters};
use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::medium::{MediaTable, MEDIUM_FREE_SPACE, MEDIUM_PEC};
use crate::types::{Axis, Face};

/// Name-indexed boundary records.
#[derive(Debug)]
pub struct BoundaryTable {
    records: Vec<BoundaryRecord>,
    by_name: HashMap<String, usize>,
}

impl BoundaryTable {
    pub fn new(records: &[BoundaryRecord]) -> Result<BoundaryTable> {
        let mut by_name = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if by_name.insert(record.name.clone(), index).is_some() {
                return Err(ConfigError::Other(format!(
                    "boundary \"{}\" defined more than once",
                    record.name
                )));
            }
        }
        Ok(BoundaryTable {
            records: records.to_vec(),
            by_name,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<&BoundaryRecord> {
        self.by_name
            .get(name)
            .map(|&index| &self.records[index])
            .ok_or_else(|| ConfigError::UnknownBoundary(name.to_string()))
    }
}

/// Boundary variant resolved onto one external face.
#[derive(Clone, Debug)]
pub enum OuterSurface {
    Pec,
    Pmc,
    Periodic,
    Mur,
    Pml(PmlParameters),
}

impl OuterSurface {
    pub fn is_pml(&self) -> bool {
        matches!(self, OuterSurface::Pml(_))
    }

    pub fn is_mur(&self) -> bool {
        matches!(self, OuterSurface::Mur)
    }

    pub fn num_layers(&self) -> usize {
        match self {
            OuterSurface::Pml(p) => p.num_layers,
            _ => 0,
        }
    }
}

/// The six resolved external surfaces.
#[derive(Debug)]
pub struct ExternalBoundaries {
    surfaces: [OuterSurface; 6],
}

impl ExternalBoundaries {
    /// Resolve the per-face boundary names against the table. A missing
    /// assignment selects the default PML; non-PML faces with layer
    /// counts are reset with a warning; periodic faces must pair up.
    pub fn resolve(
        table: &BoundaryTable,
        assignment: &[Option<String>; 6],
    ) -> Result<ExternalBoundaries> {
        let mut surfaces: [OuterSurface; 6] =
            std::array::from_fn(|_| OuterSurface::Pml(PmlParameters::default()));

        for face in Face::ALL {
            let surface = match &assignment[face.index()] {
                None => OuterSurface::Pml(PmlParameters::default()),
                Some(name) => match &table.lookup(name)?.kind {
                    BoundaryKind::Pec => OuterSurface::Pec,
                    BoundaryKind::Pmc => OuterSurface::Pmc,
                    BoundaryKind::Periodic => OuterSurface::Periodic,
                    BoundaryKind::Mur => OuterSurface::Mur,
                    BoundaryKind::Pml(params) => {
                        if params.num_layers < 1 {
                            return Err(ConfigError::Other(format!(
                                "PML on {} face has no layers",
                                face.label()
                            )));
                        }
                        OuterSurface::Pml(*params)
                    }
                    BoundaryKind::FreeSpace | BoundaryKind::Sibc(_) => {
                        return Err(ConfigError::Other(format!(
                            "boundary \"{name}\" cannot be used on an external face"
                        )));
                    }
                },
            };
            surfaces[face.index()] = surface;
        }

        for face in Face::ALL {
            if matches!(surfaces[face.index()], OuterSurface::Periodic)
                && !matches!(surfaces[face.opposite().index()], OuterSurface::Periodic)
            {
                return Err(ConfigError::UnpairedPeriodicFace(face.label()));
            }
        }

        Ok(ExternalBoundaries { surfaces })
    }

    #[inline]
    pub fn surface(&self, face: Face) -> &OuterSurface {
        &self.surfaces[face.index()]
    }

    /// PML layer count per face, in face order.
    pub fn layers(&self) -> [usize; 6] {
        std::array::from_fn(|f| self.surfaces[f].num_layers())
    }

    /// Per-face flags excluding Mur faces from the inner-grid update.
    pub fn inner_include_flags(&self) -> [bool; 6] {
        std::array::from_fn(|f| !self.surfaces[f].is_mur())
    }

    /// True if the inner-grid edge at `index` along `axis` lies on a PMC
    /// or periodic face (SIBC edge weighting).
    pub fn is_pmc_edge(&self, grid: &Grid, axis: Axis, index: usize) -> bool {
        let lo = Face::low(axis);
        let hi = Face::high(axis);
        let mirror_lo = matches!(
            self.surface(lo),
            OuterSurface::Pmc | OuterSurface::Periodic
        );
        let mirror_hi = matches!(
            self.surface(hi),
            OuterSurface::Pmc | OuterSurface::Periodic
        );
        (mirror_lo && index == grid.extents.gibox.lo(axis))
            || (mirror_hi && index == grid.extents.gibox.hi(axis))
    }

    /// Paint PEC coefficients over every external face whose boundary
    /// maps onto the PEC medium: explicit PEC faces and the back face of
    /// every PML. Applied after all material painting so it wins.
    pub fn paint_pec_faces(&self, grid: &mut Grid, media: &MediaTable) {
        for face in Face::ALL {
            let is_pec_backed = matches!(
                self.surface(face),
                OuterSurface::Pec | OuterSurface::Pml(_)
            );
            if is_pec_backed {
                let bbox = grid.extents.gobox.face_box(face);
                grid.set_medium_on_grid(&bbox, MEDIUM_PEC, FaceMask::ALL, media);
            }
        }
    }

    /// Verify boundary material consistency after init: PEC faces and
    /// PML backings must still be PEC, Mur faces must sit in free space.
    pub fn check(&self, grid: &Grid, media: &MediaTable) {
        for face in Face::ALL {
            match self.surface(face) {
                OuterSurface::Pec | OuterSurface::Pml(_) => {
                    let bbox = grid.extents.gobox.face_box(face);
                    if !grid.check_medium_on_grid(&bbox, MEDIUM_PEC, media) {
                        warn!(
                            "{} face PEC backing has been overwritten by material painting",
                            face.label()
                        );
                    }
                }
                OuterSurface::Mur => {
                    let bbox = grid.extents.gibox.face_box(face);
                    if !grid.check_medium_on_grid(&bbox, MEDIUM_FREE_SPACE, media) {
                        warn!(
                            "Mur boundary on {} face is not in free space",
                            face.label()
                        );
                    }
                }
                _ => {}
            }
        }
    }

    /// Fill the ghost-layer electric fields: PEC copies, PMC negates,
    /// periodic wraps to the opposite inner column.
    pub fn update_ghost_e(&self, grid: &mut Grid) {
        let gobox = grid.extents.gobox;
        let lo = [
            gobox.lo(Axis::X),
            gobox.lo(Axis::Y),
            gobox.lo(Axis::Z),
        ];
        let hi = [
            gobox.hi(Axis::X),
            gobox.hi(Axis::Y),
            gobox.hi(Axis::Z),
        ];

        for face in Face::ALL {
            let sign = match self.surface(face) {
                OuterSurface::Pec => 1.0,
                OuterSurface::Pmc => -1.0,
                OuterSurface::Periodic => 0.0, // handled below
                _ => continue,
            };
            let axis = face.axis();
            let comp = crate::types::FieldComponent::electric(axis);
            let periodic = matches!(self.surface(face), OuterSurface::Periodic);

            let (dst, src) = if face.is_low() {
                let dst = lo[axis.index()] - 1;
                let src = if periodic {
                    hi[axis.index()] - 1
                } else {
                    lo[axis.index()]
                };
                (dst, src)
            } else {
                let dst = hi[axis.index()];
                let src = if periodic {
                    lo[axis.index()]
                } else {
                    hi[axis.index()] - 1
                };
                (dst, src)
            };
            let sign = if periodic { 1.0 } else { sign };

            let (u, v) = (axis.next(), axis.prev());
            let arr = grid.field_mut(comp);
            for a in lo[u.index()] - 1..=hi[u.index()] {
                for b in lo[v.index()] - 1..=hi[v.index()] {
                    let mut dst_ijk = [0usize; 3];
                    let mut src_ijk = [0usize; 3];
                    dst_ijk[axis.index()] = dst;
                    src_ijk[axis.index()] = src;
                    dst_ijk[u.index()] = a;
                    src_ijk[u.index()] = a;
                    dst_ijk[v.index()] = b;
                    src_ijk[v.index()] = b;
                    let value = sign * arr.at(src_ijk[0], src_ijk[1], src_ijk[2]);
                    *arr.at_mut(dst_ijk[0], dst_ijk[1], dst_ijk[2]) = value;
                }
            }
        }
    }

    /// Fill the ghost-layer tangential magnetic fields.
    pub fn update_ghost_h(&self, grid: &mut Grid) {
        let gobox = grid.extents.gobox;
        let lo = [
            gobox.lo(Axis::X),
            gobox.lo(Axis::Y),
            gobox.lo(Axis::Z),
        ];
        let hi = [
            gobox.hi(Axis::X),
            gobox.hi(Axis::Y),
            gobox.hi(Axis::Z),
        ];

        for face in Face::ALL {
            let (sign, periodic) = match self.surface(face) {
                OuterSurface::Pec => (1.0, false),
                OuterSurface::Pmc => (-1.0, false),
                OuterSurface::Periodic => (1.0, true),
                _ => continue,
            };
            let axis = face.axis();

            let (dst, src) = if face.is_low() {
                let dst = lo[axis.index()] - 1;
                let src = if periodic {
                    hi[axis.index()] - 1
                } else {
                    lo[axis.index()]
                };
                (dst, src)
            } else {
                let dst = hi[axis.index()];
                let src = if periodic {
                    lo[axis.index()]
                } else {
                    hi[axis.index()] - 1
                };
                (dst, src)
            };

            // Both tangential H components mirror across the face.
            for tangent in [axis.next(), axis.prev()] {
                let comp = crate::types::FieldComponent::magnetic(tangent);
                let (u, v) = (axis.next(), axis.prev());
                let arr = grid.field_mut(comp);
                for a in lo[u.index()] - 1..=hi[u.index()] {
                    for b in lo[v.index()] - 1..=hi[v.index()] {
                        let mut dst_ijk = [0usize; 3];
                        let mut src_ijk = [0usize; 3];
                        dst_ijk[axis.index()] = dst;
                        src_ijk[axis.index()] = src;
                        dst_ijk[u.index()] = a;
                        src_ijk[u.index()] = a;
                        dst_ijk[v.index()] = b;
                        src_ijk[v.index()] = b;
                        let value = sign * arr.at(src_ijk[0], src_ijk[1], src_ijk[2]);
                        *arr.at_mut(dst_ijk[0], dst_ijk[1], dst_ijk[2]) = value;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::FaceMask;
    use crate::config::SolverOptions;
    use crate::mesh::{default_courant_number, time_step, CellEdges, GridExtents, MeshLines};
    use crate::types::FieldComponent;

    fn boundary_records() -> Vec<BoundaryRecord> {
        vec![
            BoundaryRecord {
                name: "pec".to_string(),
                kind: BoundaryKind::Pec,
            },
            BoundaryRecord {
                name: "pmc".to_string(),
                kind: BoundaryKind::Pmc,
            },
            BoundaryRecord {
                name: "periodic".to_string(),
                kind: BoundaryKind::Periodic,
            },
            BoundaryRecord {
                name: "absorber".to_string(),
                kind: BoundaryKind::Pml(PmlParameters::default()),
            },
        ]
    }

    fn assignment(names: [&str; 6]) -> [Option<String>; 6] {
        std::array::from_fn(|f| Some(names[f].to_string()))
    }

    fn test_grid(surfaces: &ExternalBoundaries) -> (Grid, MediaTable) {
        let lines = MeshLines::cubic(6, 1e-3);
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
        (grid, media)
    }

    #[test]
    fn test_unpaired_periodic_rejected() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment(["periodic", "pec", "pec", "pec", "pec", "pec"]);
        assert!(matches!(
            ExternalBoundaries::resolve(&table, &names),
            Err(ConfigError::UnpairedPeriodicFace(_))
        ));
        let names = assignment(["periodic", "periodic", "pec", "pec", "pec", "pec"]);
        assert!(ExternalBoundaries::resolve(&table, &names).is_ok());
    }

    #[test]
    fn test_unknown_boundary_name() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment(["nope", "pec", "pec", "pec", "pec", "pec"]);
        assert!(matches!(
            ExternalBoundaries::resolve(&table, &names),
            Err(ConfigError::UnknownBoundary(_))
        ));
    }

    #[test]
    fn test_default_is_pml() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let surfaces =
            ExternalBoundaries::resolve(&table, &std::array::from_fn(|_| None)).unwrap();
        assert_eq!(surfaces.layers(), [10; 6]);
    }

    #[test]
    fn test_pmc_ghost_negates_tangential_h() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment(["pmc", "pec", "pec", "pec", "pec", "pec"]);
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();
        let (mut grid, _media) = test_grid(&surfaces);
        let lo = grid.extents.gobox.lo(Axis::X);
        let j = lo + 2;
        let k = lo + 3;
        *grid.hy.at_mut(lo, j, k) = 0.75;
        *grid.hz.at_mut(lo, j, k) = -0.25;
        surfaces.update_ghost_h(&mut grid);
        assert_eq!(grid.hy.at(lo - 1, j, k), -0.75);
        assert_eq!(grid.hz.at(lo - 1, j, k), 0.25);
    }

    #[test]
    fn test_pec_ghost_copies_e(){
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment(["pec", "pec", "pec", "pec", "pec", "pec"]);
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();
        let (mut grid, _media) = test_grid(&surfaces);
        let lo = grid.extents.gobox.lo(Axis::X);
        *grid.ex.at_mut(lo, lo + 1, lo + 1) = 0.5;
        surfaces.update_ghost_e(&mut grid);
        assert_eq!(grid.ex.at(lo - 1, lo + 1, lo + 1), 0.5);
    }

    #[test]
    fn test_periodic_ghost_wraps() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment([
            "periodic", "periodic", "pec", "pec", "pec", "pec",
        ]);
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();
        let (mut grid, _media) = test_grid(&surfaces);
        let lo = grid.extents.gobox.lo(Axis::X);
        let hi = grid.extents.gobox.hi(Axis::X);
        let j = lo + 2;
        *grid.hy.at_mut(hi - 1, j, j) = 1.5;
        *grid.hy.at_mut(lo, j, j) = -2.5;
        surfaces.update_ghost_h(&mut grid);
        // Low ghost takes the last inner column, high ghost the first.
        assert_eq!(grid.hy.at(lo - 1, j, j), 1.5);
        assert_eq!(grid.hy.at(hi, j, j), -2.5);
    }

    #[test]
    fn test_pec_painting_and_check() {
        let table = BoundaryTable::new(&boundary_records()).unwrap();
        let names = assignment(["pec", "pec", "pec", "pec", "pec", "pec"]);
        let surfaces = ExternalBoundaries::resolve(&table, &names).unwrap();
        let (mut grid, media) = test_grid(&surfaces);
        surfaces.paint_pec_faces(&mut grid, &media);
        for face in Face::ALL {
            let bbox = grid.extents.gobox.face_box(face);
            assert!(grid.check_medium_on_grid(&bbox, MEDIUM_PEC, &media));
        }
        surfaces.check(&grid, &media);
    }
}
