//! Pole-Residue Models and Recursive-Convolution Filters
//!
//! A pole-residue transfer function is realised in the time domain as a
//! bank of one-pole IIR sections updated by recursive convolution. SIBC
//! surfaces use 4x4 matrices of these filters (two TM ports by two TE
//! ports), one state per filter element per face cell.

use num_complex::Complex64;

use crate::error::{ConfigError, Result};

/// One pole-residue transfer function
/// `H(s) = asymptote + sum_k residue_k / (s - pole_k)`.
#[derive(Clone, Debug)]
pub struct PoleResidue {
    pub asymptote: f64,
    pub poles: Vec<Complex64>,
    pub residues: Vec<Complex64>,
}

impl PoleResidue {
    pub fn constant(asymptote: f64) -> PoleResidue {
        PoleResidue {
            asymptote,
            poles: Vec::new(),
            residues: Vec::new(),
        }
    }

    pub fn num_poles(&self) -> usize {
        self.poles.len()
    }
}

/// A dense matrix of pole-residue functions, row-major.
#[derive(Clone, Debug)]
pub struct PoleResidueMatrix {
    pub rows: usize,
    pub cols: usize,
    pub elements: Vec<PoleResidue>,
}

impl PoleResidueMatrix {
    pub fn filled(rows: usize, cols: usize, element: PoleResidue) -> PoleResidueMatrix {
        PoleResidueMatrix {
            rows,
            cols,
            elements: vec![element; rows * cols],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &PoleResidue {
        &self.elements[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: PoleResidue) {
        self.elements[row * self.cols + col] = value;
    }

    /// Parse the ASCII pole-residue matrix format: a header `m n`, then
    /// for each element a line `numPoles asymptote` followed by
    /// `numPoles` lines of `Re(pole) Im(pole) Re(residue) Im(residue)`.
    pub fn parse(text: &str, name: &str) -> Result<PoleResidueMatrix> {
        let mut tokens = text
            .split_whitespace()
            .filter(|t| !t.is_empty());
        let mut next_f64 = |what: &str| -> Result<f64> {
            tokens
                .next()
                .ok_or_else(|| ConfigError::PoleResidueData {
                    name: name.to_string(),
                    detail: format!("unexpected end of data reading {what}"),
                })?
                .parse::<f64>()
                .map_err(|e| ConfigError::PoleResidueData {
                    name: name.to_string(),
                    detail: format!("bad {what}: {e}"),
                })
        };

        let rows = next_f64("row count")? as usize;
        let cols = next_f64("column count")? as usize;
        if rows == 0 || cols == 0 {
            return Err(ConfigError::PoleResidueData {
                name: name.to_string(),
                detail: "empty matrix".to_string(),
            });
        }

        let mut elements = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let num_poles = next_f64("pole count")? as usize;
            let asymptote = next_f64("asymptote")?;
            let mut poles = Vec::with_capacity(num_poles);
            let mut residues = Vec::with_capacity(num_poles);
            for _ in 0..num_poles {
                let pole_re = next_f64("pole real part")?;
                let pole_im = next_f64("pole imaginary part")?;
                let residue_re = next_f64("residue real part")?;
                let residue_im = next_f64("residue imaginary part")?;
                poles.push(Complex64::new(pole_re, pole_im));
                residues.push(Complex64::new(residue_re, residue_im));
            }
            elements.push(PoleResidue {
                asymptote,
                poles,
                residues,
            });
        }

        Ok(PoleResidueMatrix {
            rows,
            cols,
            elements,
        })
    }

    pub fn from_file(path: &str) -> Result<PoleResidueMatrix> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::PoleResidueData {
            name: path.to_string(),
            detail: format!("cannot read file: {e}"),
        })?;
        PoleResidueMatrix::parse(&text, path)
    }
}

/// Recursive-convolution coefficients of one pole-residue function,
/// discretised at time step `dt`.
#[derive(Clone, Debug)]
pub struct RecConv {
    pub asymptote: f64,
    q0: Vec<Complex64>,
    q1: Vec<Complex64>,
    q2: Vec<Complex64>,
}

impl RecConv {
    pub fn from_pole_residue(pr: &PoleResidue, dt: f64) -> RecConv {
        let mut q0 = Vec::with_capacity(pr.num_poles());
        let mut q1 = Vec::with_capacity(pr.num_poles());
        let mut q2 = Vec::with_capacity(pr.num_poles());
        for (pole, residue) in pr.poles.iter().zip(&pr.residues) {
            let alpha = residue / pole;
            let beta = pole * dt;
            let ebeta = beta.exp();
            q0.push(ebeta);
            q1.push(alpha / beta * (Complex64::new(1.0, 0.0) + (beta - 1.0) * ebeta));
            q2.push(alpha / beta * (ebeta - beta - 1.0));
        }
        RecConv {
            asymptote: pr.asymptote,
            q0,
            q1,
            q2,
        }
    }

    pub fn num_poles(&self) -> usize {
        self.q0.len()
    }

    /// Advance the filter one sample. Only the real part of the section
    /// sum feeds the output; the states stay complex to preserve pole
    /// phases.
    #[inline]
    pub fn step(&self, state: &mut RecConvState, x: f64) -> f64 {
        let mut y = self.asymptote * x;
        for k in 0..self.q0.len() {
            state.zeta[k] = self.q0[k] * state.zeta[k] + self.q1[k] * state.old + self.q2[k] * x;
            y += state.zeta[k].re;
        }
        state.old = x;
        y
    }

    /// Run a whole series through a fresh state (model verification).
    pub fn filter_series(&self, x: &[f64]) -> Vec<f64> {
        let mut state = RecConvState::new(self);
        x.iter().map(|&sample| self.step(&mut state, sample)).collect()
    }
}

/// Per-site state of one RC filter.
#[derive(Clone, Debug)]
pub struct RecConvState {
    zeta: Vec<Complex64>,
    old: f64,
}

impl RecConvState {
    pub fn new(filter: &RecConv) -> RecConvState {
        RecConvState {
            zeta: vec![Complex64::new(0.0, 0.0); filter.num_poles()],
            old: 0.0,
        }
    }
}

/// Matrix of RC filters, row-major.
#[derive(Clone, Debug)]
pub struct RecConvMatrix {
    pub rows: usize,
    pub cols: usize,
    pub filters: Vec<RecConv>,
}

impl RecConvMatrix {
    pub fn from_pole_residue_matrix(prm: &PoleResidueMatrix, dt: f64) -> RecConvMatrix {
        RecConvMatrix {
            rows: prm.rows,
            cols: prm.cols,
            filters: prm
                .elements
                .iter()
                .map(|pr| RecConv::from_pole_residue(pr, dt))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &RecConv {
        &self.filters[row * self.cols + col]
    }
}

/// Matrix of filter states matching a `RecConvMatrix`.
#[derive(Clone, Debug)]
pub struct RecConvStateMatrix {
    pub states: Vec<RecConvState>,
    cols: usize,
}

impl RecConvStateMatrix {
    pub fn new(matrix: &RecConvMatrix) -> RecConvStateMatrix {
        RecConvStateMatrix {
            states: matrix.filters.iter().map(RecConvState::new).collect(),
            cols: matrix.cols,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut RecConvState {
        &mut self.states[row * self.cols + col]
    }
}
