use ndarray::Array2;

/// Mean and population standard deviation.
pub fn mean_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Sky level and noise estimated by iterative sigma clipping.
pub fn sigma_clipped_stats(data: &Array2<f64>, sigma: f64, iterations: usize) -> (f64, f64) {
    let mut values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let (mut mean, mut std) = mean_stddev(&values);
    for _ in 0..iterations {
        let before = values.len();
        values.retain(|v| (v - mean).abs() <= sigma * std);
        if values.is_empty() || values.len() == before {
            break;
        }
        (mean, std) = mean_stddev(&values);
    }
    (mean, std)
}

/// Linearly interpolated percentile (`q` in 0..=100) of the finite values,
/// matching numpy's default method.
pub fn percentile(data: &Array2<f64>, q: f64) -> Option<f64> {
    let mut values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let rank = q.clamp(0.0, 100.0) / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(values[lo] + (values[hi] - values[lo]) * (rank - lo as f64))
}
