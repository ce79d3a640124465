//! Shared statistics helpers used across the pipeline

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::{EngineError, Result};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Linear-interpolation quantile, q in [0, 1]
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Pearson correlation coefficient; 0.0 when either side is constant
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        cov += (a - mx) * (b - my);
        var_x += (a - mx).powi(2);
        var_y += (b - my).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    if denom > f64::EPSILON {
        cov / denom
    } else {
        0.0
    }
}

/// Two-sided p-value for H0: rho = 0, via the t transform of r
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let r = r.clamp(-0.999_999, 0.999_999);
    let t = r * (df / (1.0 - r * r)).sqrt();
    two_sided_t_p(t, df)
}

fn two_sided_t_p(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Paired t-test on two equally sized samples; returns (t, p)
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Result<(f64, f64)> {
    if a.len() != b.len() || a.len() < 2 {
        return Err(EngineError::ValidationError(
            "paired t-test requires two equally sized samples of at least 2".to_string(),
        ));
    }
    let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
    let sd = std_dev(&diffs);
    if sd < f64::EPSILON {
        // All differences identical; significant iff they are nonzero
        let p = if mean(&diffs).abs() > f64::EPSILON {
            0.0
        } else {
            1.0
        };
        return Ok((0.0, p));
    }
    let t = mean(&diffs) / (sd / (diffs.len() as f64).sqrt());
    Ok((t, two_sided_t_p(t, (diffs.len() - 1) as f64)))
}

/// Welch's two-sample t-test; returns (t, p)
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<(f64, f64)> {
    if a.len() < 2 || b.len() < 2 {
        return Err(EngineError::ValidationError(
            "Welch t-test requires at least 2 points per segment".to_string(),
        ));
    }
    let va = variance(a) / a.len() as f64;
    let vb = variance(b) / b.len() as f64;
    let pooled = va + vb;
    if pooled < f64::EPSILON {
        let p = if (mean(a) - mean(b)).abs() > f64::EPSILON {
            0.0
        } else {
            1.0
        };
        return Ok((0.0, p));
    }
    let t = (mean(a) - mean(b)) / pooled.sqrt();
    // Welch-Satterthwaite degrees of freedom
    let df = pooled.powi(2)
        / (va.powi(2) / (a.len() - 1) as f64 + vb.powi(2) / (b.len() - 1) as f64);
    Ok((t, two_sided_t_p(t, df)))
}

/// Upper-tail p-value for an F statistic
pub fn f_test_p(f: f64, df1: f64, df2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => (1.0 - dist.cdf(f)).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Ordinary least squares via the normal equations.
///
/// `rows` are observations including any intercept column the caller added.
/// Fails with a math error when the design matrix is singular, which the
/// fitter treats as a failed candidate.
pub fn ols_solve(rows: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>> {
    if rows.is_empty() || rows.len() != y.len() {
        return Err(EngineError::MathError(
            "OLS requires a non-empty design matrix matching the target length".to_string(),
        ));
    }
    let k = rows[0].len();
    if rows.len() < k {
        return Err(EngineError::MathError(format!(
            "OLS underdetermined: {} observations for {} coefficients",
            rows.len(),
            k
        )));
    }

    // X'X and X'y
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y.iter()) {
        if row.len() != k {
            return Err(EngineError::MathError(
                "ragged design matrix".to_string(),
            ));
        }
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    gaussian_solve(&mut xtx, &mut xty)
}

/// Solve A x = b in place with partial pivoting
fn gaussian_solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-10 {
            return Err(EngineError::MathError(
                "singular design matrix".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for j in (row + 1)..n {
            sum -= a[row][j] * x[j];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}

/// Coefficient of determination; can be negative for models worse than the mean
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return 0.0;
    }
    let m = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot < f64::EPSILON {
        return if ss_res < f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Mean absolute percentage error; skips near-zero actuals
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, p) in actual.iter().zip(predicted.iter()) {
        if a.abs() > 1e-8 {
            sum += ((a - p) / a).abs();
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64 * 100.0
    }
}

/// Mean signed prediction error
pub fn mean_bias(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| p - a)
        .sum::<f64>()
        / actual.len() as f64
}

/// Akaike information criterion from a residual sum of squares
pub fn aic(n: usize, sse: f64, n_params: usize) -> f64 {
    let n = n as f64;
    n * (sse.max(1e-12) / n).ln() + 2.0 * n_params as f64
}

/// Bayesian information criterion from a residual sum of squares
pub fn bic(n: usize, sse: f64, n_params: usize) -> f64 {
    let n = n as f64;
    n * (sse.max(1e-12) / n).ln() + n_params as f64 * n.ln()
}

/// Contiguous k-fold split of n indices; returns (train, test) index sets.
/// Folds are contiguous so temporally adjacent points stay together.
pub fn kfold_indices(n: usize, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.max(2).min(n);
    let mut folds = Vec::with_capacity(k);
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    for fold in 0..k {
        let size = base + if fold < extra { 1 } else { 0 };
        let test: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..n).filter(|i| !(start..start + size).contains(i)).collect();
        folds.push((train, test));
        start += size;
    }
    folds
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_basic_moments() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_approx_eq!(mean(&values), 3.0);
        assert_approx_eq!(variance(&values), 2.5);
        assert_approx_eq!(median(&values), 3.0);
    }

    #[test]
    fn test_quantiles() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_approx_eq!(quantile(&values, 0.0), 1.0);
        assert_approx_eq!(quantile(&values, 1.0), 4.0);
        assert_approx_eq!(quantile(&values, 0.5), 2.5);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert_approx_eq!(pearson(&x, &y), 1.0);
        let inv: Vec<f64> = y.iter().map(|v| -v).collect();
        assert_approx_eq!(pearson(&x, &inv), -1.0);
    }

    #[test]
    fn test_ols_recovers_coefficients() {
        // y = 1 + 2a + 3b
        let rows: Vec<Vec<f64>> = vec![
            vec![1.0, 1.0, 1.0],
            vec![1.0, 2.0, 1.0],
            vec![1.0, 3.0, 2.0],
            vec![1.0, 4.0, 3.0],
            vec![1.0, 5.0, 5.0],
        ];
        let y: Vec<f64> = rows.iter().map(|r| 1.0 + 2.0 * r[1] + 3.0 * r[2]).collect();
        let coefs = ols_solve(&rows, &y).unwrap();
        assert_approx_eq!(coefs[0], 1.0, 1e-6);
        assert_approx_eq!(coefs[1], 2.0, 1e-6);
        assert_approx_eq!(coefs[2], 3.0, 1e-6);
    }

    #[test]
    fn test_ols_singular_matrix_fails() {
        // Second column duplicates the first
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![1.0, i as f64, i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();
        assert!(ols_solve(&rows, &y).is_err());
    }

    #[test]
    fn test_r_squared_bounds() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert_approx_eq!(r_squared(&actual, &actual), 1.0);
        let mean_pred = [2.5, 2.5, 2.5, 2.5];
        assert_approx_eq!(r_squared(&actual, &mean_pred), 0.0);
    }

    #[test]
    fn test_kfold_covers_all_indices() {
        let folds = kfold_indices(12, 5);
        assert_eq!(folds.len(), 5);
        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, test)| test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), 12);
        }
    }

    #[test]
    fn test_paired_t_test_detects_shift() {
        let a = [1.1, 1.2, 1.05, 1.15, 1.1, 1.2];
        let b = [0.5, 0.55, 0.45, 0.5, 0.52, 0.48];
        let (t, p) = paired_t_test(&a, &b).unwrap();
        assert!(t > 0.0);
        assert!(p < 0.01);
    }
}
