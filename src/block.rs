//! Material Blocks and Thin-Wire Lines
//!
//! Init-time painting of media onto the grid: volume blocks with face
//! inclusion masks, and straight PEC (or free-space) wire segments along
//! mesh edges. Blocks of Debye media additionally report back so the
//! solver can attach auxiliary-current state to them.

use std::collections::HashMap;

use log::debug;

use crate::bbox::{Bbox, BboxKind, FaceMask};
use crate::config::{BlockRecord, LineRecord, WireKind, WireRecord};
use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::medium::{MediaTable, MediumKind, MEDIUM_FREE_SPACE, MEDIUM_PEC};

/// A painted block whose medium is Debye-dispersive; the solver turns
/// these into auxiliary-current blocks.
pub struct DispersiveBlock {
    pub gbbox: Bbox,
    pub mask: FaceMask,
    pub medium: usize,
}

/// Paint every material block onto the grid, returning the dispersive
/// ones.
pub fn init_blocks(
    records: &[BlockRecord],
    grid: &mut Grid,
    media: &MediaTable,
) -> Result<Vec<DispersiveBlock>> {
    let mut dispersive = Vec::new();
    for record in records {
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
        let medium = media.lookup(&record.medium)?;
        debug!(
            "block {:?}: medium \"{}\" (#{medium})",
            record.bbox, record.medium
        );
        grid.set_medium_on_grid(&gbbox, medium, record.mask, media);

        if matches!(media.get(medium).kind, MediumKind::Debye { .. }) {
            dispersive.push(DispersiveBlock {
                gbbox,
                mask: record.mask,
                medium,
            });
        }
    }
    Ok(dispersive)
}

/// Name-indexed wire records.
pub struct WireTable {
    records: Vec<WireRecord>,
    by_name: HashMap<String, usize>,
}

impl WireTable {
    pub fn new(records: &[WireRecord]) -> Result<WireTable> {
        let mut by_name = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if by_name.insert(record.name.clone(), index).is_some() {
                return Err(ConfigError::Other(format!(
                    "wire \"{}\" defined more than once",
                    record.name
                )));
            }
        }
        Ok(WireTable {
            records: records.to_vec(),
            by_name,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<&WireRecord> {
        self.by_name
            .get(name)
            .map(|&index| &self.records[index])
            .ok_or_else(|| ConfigError::UnknownWire(name.to_string()))
    }
}

/// Paint every wire line onto the grid. A line must be a degenerate
/// one-dimensional box along a mesh edge; its wire material decides the
/// medium painted on those edges.
pub fn init_lines(
    records: &[LineRecord],
    wires: &WireTable,
    grid: &mut Grid,
    media: &MediaTable,
) -> Result<()> {
    for record in records {
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
        if gbbox.kind() != BboxKind::Line {
            return Err(ConfigError::BboxDimensionality {
                bbox: record.bbox,
                context: "wire line",
            });
        }
        let wire = wires.lookup(&record.wire)?;
        let medium = match wire.kind {
            WireKind::Pec => MEDIUM_PEC,
            WireKind::FreeSpace => MEDIUM_FREE_SPACE,
        };
        debug!(
            "line {:?}: wire \"{}\" -> medium #{medium}",
            record.bbox, record.wire
        );
        grid.set_medium_on_grid(&gbbox, medium, FaceMask::ALL, media);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MediumRecord, SolverOptions, WireEnd};
    use crate::medium::MediumKind;
    use crate::mesh::{default_courant_number, time_step, CellEdges, GridExtents, MeshLines};
    use crate::types::Axis;
    use num_complex::Complex64;

    fn block_setup() -> (Grid, MediaTable) {
        let lines = MeshLines::cubic(8, 1e-3);
        let extents = GridExtents::new(lines.num_lines(), [0; 6]);
        let edges = CellEdges::new(&lines, &extents);
        let dt = time_step(default_courant_number(), &edges.dmin).unwrap();
        let records = vec![
            MediumRecord {
                name: "glass".to_string(),
                kind: MediumKind::Simple {
                    eps_r: 2.25,
                    sigma: 0.0,
                    mu_r: 1.0,
                },
            },
            MediumRecord {
                name: "water".to_string(),
                kind: MediumKind::Debye {
                    eps_inf: 4.0,
                    sigma: 0.0,
                    mu_r: 1.0,
                    poles: vec![Complex64::new(-1e10, 0.0)],
                    residues: vec![Complex64::new(7e11, 0.0)],
                },
            },
        ];
        let media = MediaTable::new(&records, dt).unwrap();
        let options = SolverOptions::default();
        let mut grid = Grid::new(lines, extents, edges, dt, &options, [true; 6], media.len())
            .unwrap();
        let paint = grid.extents.gobox;
        grid.set_medium_on_grid(&paint, MEDIUM_FREE_SPACE, FaceMask::ALL, &media);
        (grid, media)
    }

    #[test]
    fn test_block_painting_and_dispersive_report() {
        let (mut grid, media) = block_setup();
        let records = vec![
            BlockRecord {
                bbox: Bbox::from_nodes(1, 3, 1, 3, 1, 3),
                medium: "glass".to_string(),
                mask: FaceMask::ALL,
            },
            BlockRecord {
                bbox: Bbox::from_nodes(4, 6, 4, 6, 4, 6),
                medium: "water".to_string(),
                mask: FaceMask::ALL,
            },
        ];
        let dispersive = init_blocks(&records, &mut grid, &media).unwrap();
        assert_eq!(dispersive.len(), 1);
        assert_eq!(dispersive[0].medium, media.lookup("water").unwrap());
        // Glass cells carry the glass coefficients.
        let glass = media.lookup("glass").unwrap();
        let gbbox = records[0].bbox.offset_by(&grid.extents.gibox);
        assert!(grid.check_medium_on_grid(&gbbox, glass, &media));
    }

    #[test]
    fn test_unknown_medium_rejected() {
        let (mut grid, media) = block_setup();
        let records = vec![BlockRecord {
            bbox: Bbox::from_nodes(1, 3, 1, 3, 1, 3),
            medium: "nope".to_string(),
            mask: FaceMask::ALL,
        }];
        assert!(matches!(
            init_blocks(&records, &mut grid, &media),
            Err(ConfigError::UnknownMedium(_))
        ));
    }

    #[test]
    fn test_pec_line_painting() {
        let (mut grid, media) = block_setup();
        let wires = WireTable::new(&[WireRecord {
            name: "w1".to_string(),
            kind: WireKind::Pec,
            radius: 1e-4,
        }])
        .unwrap();
        let lines = vec![LineRecord {
            bbox: Bbox::from_nodes(2, 6, 3, 3, 3, 3),
            wire: "w1".to_string(),
            low_end: WireEnd::Free,
            high_end: WireEnd::Grounded,
        }];
        init_lines(&lines, &wires, &mut grid, &media).unwrap();
        let lo = grid.extents.gibox.lo(Axis::X);
        // Edge Ex samples along the line are PEC (alpha = -1, beta = 0).
        let (alpha, beta) = grid.alpha_beta_e(Axis::X, lo + 3, lo + 3, lo + 3);
        assert_eq!(alpha, -1.0);
        assert_eq!(beta, 0.0);
    }

    #[test]
    fn test_line_dimensionality_enforced() {
        let (mut grid, media) = block_setup();
        let wires = WireTable::new(&[WireRecord {
            name: "w1".to_string(),
            kind: WireKind::Pec,
            radius: 1e-4,
        }])
        .unwrap();
        let lines = vec![LineRecord {
            bbox: Bbox::from_nodes(2, 6, 3, 5, 3, 3),
            wire: "w1".to_string(),
            low_end: WireEnd::Free,
            high_end: WireEnd::Free,
        }];
        assert!(matches!(
            init_lines(&lines, &wires, &mut grid, &media),
            Err(ConfigError::BboxDimensionality { .. })
        ));
    }
}
