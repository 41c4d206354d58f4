//! Reshaping of model predictions returned by the training service.
//!
//! The service returns, per dataset, `pred_y` of shape `[TR, subTR, 2]` and an
//! error estimate `euc_pred` of shape `[TR, subTR]`.  Two views are derived:
//!
//! * **median**: one row per TR, NaN-aware median across sub-TRs
//!   (`X, Y, Uncertainty`);
//! * **sub-TR**: the TR × sub-TR grid flattened in TR-major order
//!   (`X, Y, pred_error`).
//!
//! The flattened sub-TR series of a subject covers all runs back to back; it
//! is split into equal per-run segments before scoring.
use anyhow::Result;
use ndarray::{Array2, Array3};

use crate::drift::median;
use crate::error::PipelineError;
use crate::io::TsvTable;

/// Prediction for one dataset (subject).  Treated as read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// `[TR, subTR, 2]` predicted gaze (dva).
    pub pred_y: Array3<f64>,
    /// `[TR, subTR]` predicted error.
    pub euc_pred: Array2<f64>,
}

impl Evaluation {
    pub fn new(pred_y: Array3<f64>, euc_pred: Array2<f64>) -> Result<Self> {
        let (n_tr, n_sub, n_ax) = pred_y.dim();
        if n_ax != 2 || euc_pred.dim() != (n_tr, n_sub) {
            return Err(PipelineError::Alignment(format!(
                "pred_y {:?} does not match euc_pred {:?}",
                pred_y.dim(),
                euc_pred.dim()
            ))
            .into());
        }
        Ok(Self { pred_y, euc_pred })
    }

    pub fn n_tr(&self) -> usize {
        self.pred_y.dim().0
    }
}

/// Per-TR median prediction: columns `X, Y, Uncertainty`.
pub fn median_per_tr(ev: &Evaluation) -> Array2<f64> {
    let (n_tr, n_sub, _) = ev.pred_y.dim();
    let mut out = Array2::<f64>::zeros((n_tr, 3));
    for tr in 0..n_tr {
        for col in 0..3 {
            let vals: Vec<f64> = (0..n_sub)
                .map(|s| if col < 2 { ev.pred_y[[tr, s, col]] } else { ev.euc_pred[[tr, s]].abs() })
                .filter(|v| !v.is_nan())
                .collect();
            out[[tr, col]] = median(&vals).unwrap_or(f64::NAN);
        }
    }
    out
}

/// Table form of [`median_per_tr`]: columns `X, Y, Uncertainty`.
pub fn median_table(median: &Array2<f64>) -> TsvTable {
    let mut table = TsvTable::new();
    for (i, name) in ["X", "Y", "Uncertainty"].into_iter().enumerate() {
        table.push_column(name, median.column(i).to_vec());
    }
    table
}

/// Flattened sub-TR predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct SubTrPrediction {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub pred_error: Vec<f64>,
}

impl SubTrPrediction {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn to_table(&self) -> TsvTable {
        let mut table = TsvTable::new();
        table.push_column("X", self.x.clone());
        table.push_column("Y", self.y.clone());
        table.push_column("pred_error", self.pred_error.clone());
        table
    }

    /// Read back a table written by [`SubTrPrediction::to_table`].
    pub fn from_table(table: &TsvTable) -> Result<Self> {
        let col = |name: &str| {
            table
                .column(name)
                .map(<[f64]>::to_vec)
                .ok_or_else(|| PipelineError::Alignment(format!("prediction table has no '{name}' column")))
        };
        Ok(Self { x: col("X")?, y: col("Y")?, pred_error: col("pred_error")? })
    }

    /// Split into `n` equal contiguous segments of `len / n` samples each,
    /// one per run.  A remainder shorter than one segment is dropped.
    pub fn split_runs(&self, n: usize) -> Result<Vec<SubTrPrediction>> {
        if n == 0 || self.len() < n {
            return Err(PipelineError::Alignment(format!(
                "cannot split {} predictions into {n} runs",
                self.len()
            ))
            .into());
        }
        let seg = self.len() / n;
        Ok((0..n)
            .map(|i| {
                let r = i * seg..(i + 1) * seg;
                SubTrPrediction {
                    x: self.x[r.clone()].to_vec(),
                    y: self.y[r.clone()].to_vec(),
                    pred_error: self.pred_error[r].to_vec(),
                }
            })
            .collect())
    }
}

/// Flatten `[TR, subTR]` into a TR-major series.
pub fn flatten_subtr(ev: &Evaluation) -> SubTrPrediction {
    let (n_tr, n_sub, _) = ev.pred_y.dim();
    let n = n_tr * n_sub;
    let mut out = SubTrPrediction {
        x: Vec::with_capacity(n),
        y: Vec::with_capacity(n),
        pred_error: Vec::with_capacity(n),
    };
    for tr in 0..n_tr {
        for s in 0..n_sub {
            out.x.push(ev.pred_y[[tr, s, 0]]);
            out.y.push(ev.pred_y[[tr, s, 1]]);
            out.pred_error.push(ev.euc_pred[[tr, s]].abs());
        }
    }
    out
}
