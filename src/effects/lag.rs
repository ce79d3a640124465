//! Lag detection via cross-correlation corroborated by Granger causality

use crate::config::EffectConfig;
use crate::error::Result;
use crate::models::FeatureMatrix;
use crate::stats;

use super::{confidence_from_p, Effect, EffectKind};

/// Detect lag effects per factor.
///
/// For each lag 1..=L the factor is shifted against the target; lags with
/// |cross-correlation| above the cutoff, a significant correlation test, and
/// a significant Granger F-test at the same lag are retained. The strongest
/// lag per factor wins.
pub(super) fn detect(
    features: &FeatureMatrix,
    target: &[f64],
    config: &EffectConfig,
) -> Result<Vec<Effect>> {
    let n = target.len();
    let mut effects = Vec::new();

    for (index, name) in features.names().iter().enumerate() {
        let column = features.column(index);
        let mut best: Option<Effect> = None;

        let max_lag = config.max_lag.min(n.saturating_sub(5));
        for lag in 1..=max_lag {
            let shifted_x = &column[..n - lag];
            let shifted_y = &target[lag..];
            let r = stats::pearson(shifted_x, shifted_y);
            if r.abs() < config.lag_correlation_threshold {
                continue;
            }
            let p_corr = stats::correlation_p_value(r, shifted_x.len());
            if p_corr >= config.significance_level {
                continue;
            }
            // A singular auxiliary regression corroborates nothing; the lag
            // candidate is skipped rather than failing the decomposition
            let p_granger = match granger_p_value(&column, target, lag) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if p_granger >= config.significance_level {
                continue;
            }

            let candidate = Effect {
                kind: EffectKind::Lag,
                factors: vec![name.clone()],
                magnitude: r,
                confidence: confidence_from_p(p_corr.max(p_granger)),
                threshold: None,
                lag: Some(lag),
            };
            if best
                .as_ref()
                .map_or(true, |b| candidate.magnitude.abs() > b.magnitude.abs())
            {
                best = Some(candidate);
            }
        }
        if let Some(effect) = best {
            effects.push(effect);
        }
    }
    Ok(effects)
}

/// Granger-causality p-value at a single lag.
///
/// Compares a restricted autoregression of the target on its own lag against
/// the unrestricted model that adds the factor's lag, via an F-test on the
/// residual sums of squares.
pub fn granger_p_value(factor: &[f64], target: &[f64], lag: usize) -> Result<f64> {
    let n = target.len();
    if n <= lag + 4 {
        return Ok(1.0);
    }

    let mut restricted_rows = Vec::new();
    let mut unrestricted_rows = Vec::new();
    let mut response = Vec::new();
    for t in lag..n {
        restricted_rows.push(vec![1.0, target[t - lag]]);
        unrestricted_rows.push(vec![1.0, target[t - lag], factor[t - lag]]);
        response.push(target[t]);
    }

    let sse = |rows: &[Vec<f64>]| -> Result<f64> {
        let coefs = stats::ols_solve(rows, &response)?;
        Ok(rows
            .iter()
            .zip(response.iter())
            .map(|(row, y)| {
                let fitted: f64 = row.iter().zip(coefs.iter()).map(|(x, c)| x * c).sum();
                (y - fitted).powi(2)
            })
            .sum())
    };

    let sse_restricted = sse(&restricted_rows)?;
    let sse_unrestricted = sse(&unrestricted_rows)?;

    let n_obs = response.len() as f64;
    let df2 = n_obs - 3.0;
    if df2 <= 0.0 || sse_unrestricted < 1e-12 {
        // A perfect unrestricted fit is the strongest possible signal
        return Ok(if sse_restricted > sse_unrestricted + 1e-12 {
            0.0
        } else {
            1.0
        });
    }
    let f = (sse_restricted - sse_unrestricted).max(0.0) / (sse_unrestricted / df2);
    Ok(stats::f_test_p(f, 1.0, df2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granger_flags_a_true_lagged_driver() {
        let x: Vec<f64> = (0..40).map(|i| ((i * 7) % 13) as f64 / 13.0).collect();
        let mut y = vec![0.0, 0.0];
        for t in 2..40 {
            y.push(3.0 * x[t - 2] + 0.1 * y[t - 1]);
        }
        let p = granger_p_value(&x, &y, 2).unwrap();
        assert!(p < 0.05, "p = {}", p);
    }

    #[test]
    fn an_affine_factor_does_not_abort_detection() {
        // target = 2x + 1 makes the unrestricted Granger design collinear
        let x: Vec<f64> = (0..24).map(|i| ((i * 7) % 12) as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let rows: Vec<Vec<f64>> = x.iter().map(|&v| vec![v]).collect();
        let features = FeatureMatrix::new(vec!["spend".to_string()], rows).unwrap();

        let effects = detect(&features, &y, &crate::config::EffectConfig::default());
        assert!(effects.is_ok());
    }

    #[test]
    fn granger_passes_on_unrelated_series() {
        let x: Vec<f64> = (0..40).map(|i| ((i * 7) % 13) as f64 / 13.0).collect();
        let y: Vec<f64> = (0..40).map(|i| ((i * 11) % 17) as f64 / 17.0).collect();
        let p = granger_p_value(&x, &y, 1).unwrap();
        assert!(p > 0.05, "p = {}", p);
    }
}
