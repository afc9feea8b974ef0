//! Material System
//!
//! Medium variants (free space, PEC, simple lossy dielectric, Debye
//! dispersive), the update-coefficient derivation for each, and the
//! medium table the grid dereferences when coefficients are stored
//! indexed. Media 0 and 1 are always free space and PEC with exact
//! coefficients.

use std::collections::HashMap;

use num_complex::Complex64;

use crate::config::MediumRecord;
use crate::error::{ConfigError, Result};
use crate::types::{Real, EPS0, MU0};

/// Reserved medium indices.
pub const MEDIUM_FREE_SPACE: usize = 0;
pub const MEDIUM_PEC: usize = 1;

/// Material variants. A closed set; all dispatch is on this tag.
#[derive(Clone, Debug)]
pub enum MediumKind {
    FreeSpace,
    Pec,
    /// Simple medium with relative permittivity, conductivity [S/m] and
    /// relative permeability.
    Simple {
        eps_r: Real,
        sigma: Real,
        mu_r: Real,
    },
    /// Debye-dispersive medium: high-frequency permittivity plus a sum of
    /// first-order poles with complex residues.
    Debye {
        eps_inf: Real,
        sigma: Real,
        mu_r: Real,
        poles: Vec<Complex64>,
        residues: Vec<Complex64>,
    },
}

/// Per-medium update coefficients.
///
/// `E_new = alpha * E_old + beta * curl(H)` and
/// `H_new = H_old + gamma * curl(E)`, before any edge-length scaling.
/// Debye media additionally carry per-pole recursion coefficients for
/// their polarisation currents.
#[derive(Clone, Debug)]
pub struct MediumCoefficients {
    pub alpha: Real,
    pub beta: Real,
    pub gamma: Real,
    pub dalpha: Vec<Complex64>,
    pub dbeta: Vec<Complex64>,
}

#[derive(Clone, Debug)]
pub struct Medium {
    pub name: String,
    pub kind: MediumKind,
    pub coefficients: MediumCoefficients,
}

impl Medium {
    pub fn num_poles(&self) -> usize {
        match &self.kind {
            MediumKind::Debye { poles, .. } => poles.len(),
            _ => 0,
        }
    }
}

/// Derive update coefficients from material parameters at time step `dt`.
///
/// For Debye media the pole recursions contribute their real conductance
/// sum to the base coefficients, so the grid update and the polarisation
/// correction stay consistent.
pub fn coefficients_from_parameters(
    dt: Real,
    eps_r: Real,
    sigma: Real,
    mu_r: Real,
    poles: &[Complex64],
    residues: &[Complex64],
) -> MediumCoefficients {
    let dtd = dt as f64;
    let mut dalpha = Vec::with_capacity(poles.len());
    let mut dbeta = Vec::with_capacity(poles.len());
    let mut sum = 0.0f64;
    for (pole, residue) in poles.iter().zip(residues) {
        let denom = Complex64::new(1.0, 0.0) - 0.5 * dtd * pole;
        let da = (Complex64::new(1.0, 0.0) + 0.5 * dtd * pole) / denom;
        let db = EPS0 as f64 * residue / denom;
        sum += db.re;
        dalpha.push(da);
        dbeta.push(db);
    }

    let two_eps = 2.0 * eps_r as f64 * EPS0 as f64 + 2.0 * sum * dtd;
    let loss = dtd * sigma as f64;
    MediumCoefficients {
        alpha: ((two_eps - loss) / (two_eps + loss)) as Real,
        beta: (2.0 * dtd / (two_eps + loss)) as Real,
        gamma: (dtd / (mu_r as f64 * MU0 as f64)) as Real,
        dalpha,
        dbeta,
    }
}

/// The ordered medium table plus the init-time name index.
#[derive(Debug)]
pub struct MediaTable {
    media: Vec<Medium>,
    by_name: HashMap<String, usize>,
    dt: Real,
}

impl MediaTable {
    /// Build the table: free space and PEC first, then the user records
    /// in definition order. Rejects unstable Debye poles.
    pub fn new(records: &[MediumRecord], dt: Real) -> Result<MediaTable> {
        let mut table = MediaTable {
            media: Vec::with_capacity(records.len() + 2),
            by_name: HashMap::new(),
            dt,
        };

        table.push("free_space".to_string(), MediumKind::FreeSpace)?;
        table.push("pec".to_string(), MediumKind::Pec)?;
        for record in records {
            table.push(record.name.clone(), record.kind.clone())?;
        }

        // Media 0 and 1 carry exact free-space and PEC coefficients. A
        // beta of exactly zero with alpha -1 is what makes PEC cells
        // clamp to zero after one step.
        table.media[MEDIUM_FREE_SPACE].coefficients = MediumCoefficients {
            alpha: 1.0,
            beta: dt / EPS0,
            gamma: dt / MU0,
            dalpha: Vec::new(),
            dbeta: Vec::new(),
        };
        table.media[MEDIUM_PEC].coefficients = MediumCoefficients {
            alpha: -1.0,
            beta: 0.0,
            gamma: dt / MU0,
            dalpha: Vec::new(),
            dbeta: Vec::new(),
        };

        Ok(table)
    }

    fn push(&mut self, name: String, kind: MediumKind) -> Result<usize> {
        if self.by_name.contains_key(&name) {
            return Err(ConfigError::Other(format!(
                "medium \"{name}\" defined more than once"
            )));
        }
        let coefficients = match &kind {
            MediumKind::FreeSpace => {
                coefficients_from_parameters(self.dt, 1.0, 0.0, 1.0, &[], &[])
            }
            MediumKind::Pec => coefficients_from_parameters(self.dt, 1.0, 0.0, 1.0, &[], &[]),
            MediumKind::Simple { eps_r, sigma, mu_r } => {
                coefficients_from_parameters(self.dt, *eps_r, *sigma, *mu_r, &[], &[])
            }
            MediumKind::Debye {
                eps_inf,
                sigma,
                mu_r,
                poles,
                residues,
            } => {
                for (p, pole) in poles.iter().enumerate() {
                    if pole.re > 0.0 {
                        return Err(ConfigError::UnstableDebyePole {
                            name: name.clone(),
                            pole: p,
                        });
                    }
                }
                coefficients_from_parameters(self.dt, *eps_inf, *sigma, *mu_r, poles, residues)
            }
        };
        let index = self.media.len();
        self.by_name.insert(name.clone(), index);
        self.media.push(Medium {
            name,
            kind,
            coefficients,
        });
        Ok(index)
    }

    /// Register a private simple medium (used by resistive voltage
    /// sources at init).
    pub fn add_simple(&mut self, name: String, eps_r: Real, sigma: Real, mu_r: Real) -> Result<usize> {
        self.push(name, MediumKind::Simple { eps_r, sigma, mu_r })
    }

    /// Re-derive a simple medium's parameters and coefficients in place.
    /// Only the voltage-source initialiser calls this.
    pub fn update_simple(&mut self, index: usize, eps_r: Real, sigma: Real, mu_r: Real) {
        let medium = &mut self.media[index];
        medium.kind = MediumKind::Simple { eps_r, sigma, mu_r };
        medium.coefficients =
            coefficients_from_parameters(self.dt, eps_r, sigma, mu_r, &[], &[]);
    }

    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownMedium(name.to_string()))
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Medium {
        &self.media[index]
    }

    #[inline]
    pub fn coefficients(&self, index: usize) -> &MediumCoefficients {
        &self.media[index].coefficients
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Medium> {
        self.media.iter()
    }
}
