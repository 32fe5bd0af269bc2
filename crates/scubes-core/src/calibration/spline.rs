use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScubesError};

/// Behaviour of a spline evaluated outside its node range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridExtrapolation {
    /// Clamp the argument to the node range (FITPACK `bispev` behaviour).
    #[default]
    Clamp,
    /// Extend the outermost cubic pieces.
    Extend,
}

impl std::fmt::Display for GridExtrapolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clamp => write!(f, "Clamp"),
            Self::Extend => write!(f, "Extend"),
        }
    }
}

/// Interpolating cubic spline with not-a-knot end conditions, which is what
/// an `s = 0` FITPACK fit of degree 3 produces.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the nodes.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn not_a_knot(x: &[f64], y: &[f64]) -> Result<Self> {
        let n = x.len();
        if n < 4 || y.len() != n {
            return Err(ScubesError::MissingCalibrationData(format!(
                "spline needs at least 4 matching nodes, got {} and {}",
                n,
                y.len()
            )));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ScubesError::MissingCalibrationData(
                "spline nodes must be strictly increasing".into(),
            ));
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let mut a = vec![vec![0.0; n]; n];
        let mut rhs = vec![0.0; n];

        // Continuous third derivative across the second and penultimate nodes.
        a[0][0] = -h[1];
        a[0][1] = h[0] + h[1];
        a[0][2] = -h[0];
        a[n - 1][n - 3] = -h[n - 2];
        a[n - 1][n - 2] = h[n - 3] + h[n - 2];
        a[n - 1][n - 1] = -h[n - 3];

        for i in 1..n - 1 {
            a[i][i - 1] = h[i - 1];
            a[i][i] = 2.0 * (h[i - 1] + h[i]);
            a[i][i + 1] = h[i];
            rhs[i] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }

        let m = solve_dense(a, rhs)?;
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Evaluate the spline. Outside the node range the end pieces are
    /// extended.
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let k = match self.x.partition_point(|&xi| xi <= t) {
            0 => 0,
            p => (p - 1).min(n - 2),
        };
        let (x0, x1) = (self.x[k], self.x[k + 1]);
        let h = x1 - x0;
        let (a, b) = (x1 - t, t - x0);
        self.m[k] * a.powi(3) / (6.0 * h)
            + self.m[k + 1] * b.powi(3) / (6.0 * h)
            + (self.y[k] / h - self.m[k] * h / 6.0) * a
            + (self.y[k + 1] / h - self.m[k + 1] * h / 6.0) * b
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-300 {
            return Err(ScubesError::MissingCalibrationData(
                "singular spline system".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Tensor-product bicubic interpolant over a rectangular grid. `z[[i, j]]`
/// is the value at `(x[i], y[j])`.
#[derive(Clone, Debug)]
pub struct BicubicSpline {
    x: Vec<f64>,
    /// One spline along `y` for every row of the grid.
    rows: Vec<CubicSpline>,
    extrapolation: GridExtrapolation,
}

impl BicubicSpline {
    pub fn new(x: &[f64], y: &[f64], z: &Array2<f64>, extrapolation: GridExtrapolation) -> Result<Self> {
        if z.dim() != (x.len(), y.len()) {
            return Err(ScubesError::MissingCalibrationData(format!(
                "grid shape {:?} does not match {} x {} nodes",
                z.dim(),
                x.len(),
                y.len()
            )));
        }
        let rows = z
            .outer_iter()
            .map(|row| CubicSpline::not_a_knot(y, &row.to_vec()))
            .collect::<Result<Vec<_>>>()?;
        // Validates the x nodes.
        CubicSpline::not_a_knot(x, &vec![0.0; x.len()])?;
        Ok(Self {
            x: x.to_vec(),
            rows,
            extrapolation,
        })
    }

    /// Node range along the first and second axes.
    pub fn domain(&self) -> ((f64, f64), (f64, f64)) {
        let xr = (self.x[0], self.x[self.x.len() - 1]);
        let yr = self.rows[0].domain();
        (xr, yr)
    }

    pub fn contains(&self, u: f64, v: f64) -> bool {
        let ((x0, x1), (y0, y1)) = self.domain();
        (x0..=x1).contains(&u) && (y0..=y1).contains(&v)
    }

    /// Evaluate at (`u`, `v`), `u` along the first grid axis.
    pub fn eval(&self, u: f64, v: f64) -> Result<f64> {
        let ((x0, x1), (y0, y1)) = self.domain();
        let (u, v) = match self.extrapolation {
            GridExtrapolation::Clamp => (u.clamp(x0, x1), v.clamp(y0, y1)),
            GridExtrapolation::Extend => (u, v),
        };
        let column: Vec<f64> = self.rows.iter().map(|row| row.eval(v)).collect();
        Ok(CubicSpline::not_a_knot(&self.x, &column)?.eval(u))
    }
}
