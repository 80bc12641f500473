//! Regression metrics

/// Root mean squared error; NaN for empty input
pub fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    assert_eq!(predictions.len(), targets.len());
    if targets.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();
    (sse / targets.len() as f64).sqrt()
}

/// Coefficient of determination.
///
/// `None` when the targets have no variance, where R² is undefined.
pub fn r2(predictions: &[f64], targets: &[f64]) -> Option<f64> {
    assert_eq!(predictions.len(), targets.len());
    if targets.is_empty() {
        return None;
    }
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    let ss_tot: f64 = targets.iter().map(|y| (y - mean) * (y - mean)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (y - p) * (y - p))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}
