//! Phase signal and temporal interpolation weights.
//!
//! A phase is a position in the breathing cycle, in `[0, 1)`. Each
//! projection has a phase (the [`PhaseSignal`]) and a row of non-negative
//! weights over the reconstructed phases (the [`TemporalWeights`]).

use nalgebra::DMatrix;
use crate::error::{ReconError, Result};

/// One phase value per projection, in cycle units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseSignal {
    values: Vec<f64>,
}

impl PhaseSignal {
    /// Build a signal; every value must be finite.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(ReconError::invalid_configuration(format!(
                "phase signal value {} is not finite ({})",
                i, values[i]
            )));
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Phase of projection `i`, wrapped into `[0, 1)`.
    pub fn phase(&self, i: usize) -> Option<f64> {
        self.values.get(i).map(|v| wrap_phase(*v))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Wrap a phase into `[0, 1)`.
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Dense `#projections × #phases` interpolation weights.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalWeights {
    matrix: DMatrix<f32>,
}

impl TemporalWeights {
    /// Wrap a weight matrix; entries must be finite and non-negative.
    pub fn new(matrix: DMatrix<f32>) -> Result<Self> {
        if matrix.ncols() == 0 {
            return Err(ReconError::invalid_configuration("temporal weights have no phase column"));
        }
        if let Some(bad) = matrix.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ReconError::invalid_configuration(format!(
                "temporal weight {} is not a finite non-negative value",
                bad
            )));
        }
        Ok(Self { matrix })
    }

    /// Build from one row per projection; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let phases = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != phases) {
            return Err(ReconError::dimension_mismatch(format!(
                "weights row {} has {} entries, expected {}",
                i,
                row.len(),
                phases
            )));
        }
        Self::new(DMatrix::from_fn(rows.len(), phases, |r, c| rows[r][c]))
    }

    /// Cyclic linear interpolation weights from a phase signal.
    ///
    /// Projection `p` at phase `s` gets weight `1 - w` on phase `floor(s·T)`
    /// and `w` on the next phase (wrapping to phase 0), with `w` the
    /// fractional part of `s·T`.
    pub fn from_signal(signal: &PhaseSignal, phases: usize) -> Result<Self> {
        if phases == 0 {
            return Err(ReconError::invalid_configuration("at least one phase is required"));
        }
        let mut matrix = DMatrix::<f32>::zeros(signal.len(), phases);
        for (p, value) in signal.values().iter().enumerate() {
            let position = crate::displacement::FramePosition::from_phase(*value, phases);
            matrix[(p, position.lower)] += (1.0 - position.weight) as f32;
            matrix[(p, position.upper)] += position.weight as f32;
        }
        Self::new(matrix)
    }

    pub fn projections(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn phases(&self) -> usize {
        self.matrix.ncols()
    }

    /// Weights row of projection `p`.
    pub fn row(&self, p: usize) -> Option<Vec<f32>> {
        (p < self.matrix.nrows()).then(|| self.matrix.row(p).iter().copied().collect())
    }

    pub fn matrix(&self) -> &DMatrix<f32> {
        &self.matrix
    }
}
