// Convergence check over a log-likelihood trace.
//
// Compares the last value against the value `window` iterations earlier and
// scales the change by the mean magnitude over that window, so the same
// tolerance works for corpora of very different sizes.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCriteria {
    /// Trailing iterations compared
    pub window: usize,
    /// Largest relative change still considered converged
    pub tolerance: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            window: 10,
            tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub converged: bool,
    /// trace[n-1] - trace[n-1-w], where w = min(window, n-1)
    pub last_delta: f64,
    /// |last_delta| relative to the mean |value| over the window
    pub relative_change: f64,
    pub iterations: usize,
}

pub fn evaluate(trace: &[f64], criteria: &ConvergenceCriteria) -> ConvergenceReport {
    let n = trace.len();
    if n < 2 {
        return ConvergenceReport {
            converged: false,
            last_delta: 0.0,
            relative_change: 0.0,
            iterations: n,
        };
    }

    let window = criteria.window.max(1);
    let w = window.min(n - 1);
    let tail = &trace[n - 1 - w..];
    let last_delta = trace[n - 1] - trace[n - 1 - w];

    let scale = tail.iter().map(|v| v.abs()).sum::<f64>() / tail.len() as f64;
    let relative_change = if scale > 0.0 {
        last_delta.abs() / scale
    } else if last_delta == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };

    let finite = trace.iter().all(|v| v.is_finite());
    ConvergenceReport {
        converged: n > window && finite && relative_change < criteria.tolerance,
        last_delta,
        relative_change,
        iterations: n,
    }
}
