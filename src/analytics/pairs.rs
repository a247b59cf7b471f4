/// Pairs-trading statistics over two aligned price series
///
/// Pure functions, no I/O, safe to call concurrently. Series are plain
/// `&[f64]` slices ordered oldest to newest.
use crate::error::{PipelineError, Result};
use crate::types::PairSnapshot;

fn mean(series: &[f64]) -> f64 {
    series.iter().sum::<f64>() / series.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(series: &[f64]) -> f64 {
    let m = mean(series);
    let ss: f64 = series.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (series.len() - 1) as f64).sqrt()
}

/// OLS slope of `y` on `x` with an intercept term.
///
/// Mismatched lengths are reconciled by keeping the most recent
/// observations of each (drop from the front).
pub fn hedge_ratio(y: &[f64], x: &[f64]) -> Result<f64> {
    let n = y.len().min(x.len());
    if n == 0 {
        return Err(PipelineError::InsufficientData(
            "no overlapping observations for hedge ratio".to_string(),
        ));
    }
    let y = &y[y.len() - n..];
    let x = &x[x.len() - n..];

    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        cov += dx * (y[i] - mean_y);
        var_x += dx * dx;
    }

    if var_x.abs() < f64::EPSILON {
        return Err(PipelineError::ZeroVariance(
            "regressor series is constant".to_string(),
        ));
    }
    Ok(cov / var_x)
}

/// `s1 - hedge * s2`, element-wise
pub fn spread(s1: &[f64], s2: &[f64], hedge: f64) -> Vec<f64> {
    s1.iter().zip(s2).map(|(a, b)| a - hedge * b).collect()
}

/// Standardize a series against its own full-sample mean and stddev.
///
/// A static statistic: every call re-anchors to the provided window.
pub fn zscore(series: &[f64]) -> Result<Vec<f64>> {
    if series.len() < 2 {
        return Err(PipelineError::InsufficientData(
            "zscore needs at least 2 observations".to_string(),
        ));
    }

    let m = mean(series);
    let sd = sample_std(series);
    if sd < f64::EPSILON {
        return Err(PipelineError::ZeroVariance(
            "zscore of a constant series is undefined".to_string(),
        ));
    }

    Ok(series.iter().map(|v| (v - m) / sd).collect())
}

/// Pearson correlation over each trailing window of length `window`.
///
/// Undefined (None) for the first `window - 1` positions, and wherever a
/// window has zero variance on either side.
pub fn rolling_corr(s1: &[f64], s2: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = s1.len().min(s2.len());
    let s1 = &s1[s1.len() - n..];
    let s2 = &s2[s2.len() - n..];

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if window < 2 || i + 1 < window {
            out.push(None);
            continue;
        }
        let w1 = &s1[i + 1 - window..=i];
        let w2 = &s2[i + 1 - window..=i];
        out.push(pearson(w1, w2));
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let mean_a = mean(a);
    let mean_b = mean(b);
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..a.len() {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        None
    } else {
        Some(cov / denom)
    }
}

/// Augmented Dickey-Fuller unit-root test with an intercept.
///
/// Regresses the first difference on the lagged level and AIC-selected
/// lagged differences (lag order searched up to Schwert's bound), takes the
/// t-statistic on the level coefficient, and maps it to an approximate
/// p-value through an interpolated asymptotic quantile table. Returns
/// `(statistic, p_value)`; thresholding against 0.05 is the caller's call.
pub fn adf_test(series: &[f64]) -> Result<(f64, f64)> {
    let y: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = y.len();
    if n < 10 {
        return Err(PipelineError::InsufficientData(format!(
            "ADF needs at least 10 observations, got {}",
            n
        )));
    }

    // Schwert's rule for the lag search upper bound
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let max_lag = schwert.min(n / 2 - 3);

    let diff: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(f64, DfFit)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = df_regression(&y, &diff, lag) else {
            continue;
        };
        let m = fit.nobs as f64;
        let p = fit.nparams as f64;
        let aic = m * (fit.rss / m).max(f64::MIN_POSITIVE).ln() + 2.0 * p;
        if best.as_ref().map_or(true, |(best_aic, _)| aic < *best_aic) {
            best = Some((aic, fit));
        }
    }

    let (_, fit) = best.ok_or_else(|| {
        PipelineError::InsufficientData("ADF regression is degenerate".to_string())
    })?;

    let stat = fit.t_stat;
    Ok((stat, df_p_value(stat)))
}

struct DfFit {
    t_stat: f64,
    rss: f64,
    nobs: usize,
    nparams: usize,
}

/// dy_t = c + gamma * y_{t-1} + sum_i phi_i * dy_{t-i}; returns the fit
/// with the t-statistic on gamma
fn df_regression(y: &[f64], diff: &[f64], lag: usize) -> Option<DfFit> {
    let nparams = 2 + lag;
    let nobs = diff.len().checked_sub(lag)?;
    if nobs <= nparams {
        return None;
    }

    let mut rows = Vec::with_capacity(nobs);
    let mut target = Vec::with_capacity(nobs);
    for t in lag..diff.len() {
        let mut row = Vec::with_capacity(nparams);
        row.push(1.0);
        row.push(y[t]); // level lagged one step behind diff[t]
        for i in 1..=lag {
            row.push(diff[t - i]);
        }
        rows.push(row);
        target.push(diff[t]);
    }

    let fit = ols(&rows, &target)?;
    let dof = (fit.nobs - nparams) as f64;
    let sigma2 = fit.rss / dof;
    let se = (sigma2 * fit.xtx_inv[1][1]).sqrt();
    if se < f64::EPSILON {
        return None;
    }

    Some(DfFit {
        t_stat: fit.coef[1] / se,
        rss: fit.rss,
        nobs: fit.nobs,
        nparams,
    })
}

struct OlsFit {
    coef: Vec<f64>,
    rss: f64,
    xtx_inv: Vec<Vec<f64>>,
    nobs: usize,
}

/// Least squares via normal equations; fine for the handful of regressors
/// the ADF search ever uses
fn ols(rows: &[Vec<f64>], y: &[f64]) -> Option<OlsFit> {
    let m = rows.len();
    if m == 0 {
        return None;
    }
    let p = rows[0].len();
    if m <= p {
        return None;
    }

    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for (row, &yi) in rows.iter().zip(y) {
        for i in 0..p {
            xty[i] += row[i] * yi;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let xtx_inv = invert(&xtx)?;
    let coef: Vec<f64> = (0..p)
        .map(|i| (0..p).map(|j| xtx_inv[i][j] * xty[j]).sum())
        .collect();

    let mut rss = 0.0;
    for (row, &yi) in rows.iter().zip(y) {
        let fitted: f64 = row.iter().zip(&coef).map(|(a, b)| a * b).sum();
        let resid = yi - fitted;
        rss += resid * resid;
    }

    Some(OlsFit {
        coef,
        rss,
        xtx_inv,
        nobs: m,
    })
}

/// Gauss-Jordan inverse with partial pivoting
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut aug: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| {
            aug[a][col]
                .abs()
                .partial_cmp(&aug[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if aug[pivot][col].abs() < 1e-12 {
            return None;
        }
        aug.swap(col, pivot);

        let pivot_val = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot_val;
        }
        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..2 * n {
                aug[row][k] -= factor * pivot_row[k];
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Approximate asymptotic quantiles of the Dickey-Fuller distribution
/// (regression with constant), interpolated linearly between entries
const DF_QUANTILES: &[(f64, f64)] = &[
    (0.001, -3.96),
    (0.01, -3.43),
    (0.025, -3.12),
    (0.05, -2.86),
    (0.10, -2.57),
    (0.25, -2.10),
    (0.50, -1.57),
    (0.75, -1.04),
    (0.90, -0.44),
    (0.95, -0.07),
    (0.99, 0.60),
];

fn df_p_value(t_stat: f64) -> f64 {
    if t_stat <= DF_QUANTILES[0].1 {
        return DF_QUANTILES[0].0;
    }
    for pair in DF_QUANTILES.windows(2) {
        let (p_lo, c_lo) = pair[0];
        let (p_hi, c_hi) = pair[1];
        if t_stat <= c_hi {
            let frac = (t_stat - c_lo) / (c_hi - c_lo);
            return p_lo + frac * (p_hi - p_lo);
        }
    }
    0.999
}

/// Full pairs snapshot over two aligned close-price series.
///
/// The ADF test runs on the hedged spread, matching how the statistics are
/// consumed together downstream.
pub fn pair_snapshot(p1: &[f64], p2: &[f64], window: usize) -> Result<PairSnapshot> {
    let n = p1.len().min(p2.len());
    let p1 = &p1[p1.len() - n..];
    let p2 = &p2[p2.len() - n..];

    let hedge = hedge_ratio(p1, p2)?;
    let spr = spread(p1, p2, hedge);
    let zs = zscore(&spr)?;
    let corr = rolling_corr(p1, p2, window);
    let (adf_stat, adf_pvalue) = adf_test(&spr)?;

    Ok(PairSnapshot {
        hedge_ratio: hedge,
        spread: spr,
        zscore: zs,
        rolling_corr: corr,
        adf_stat,
        adf_pvalue,
    })
}
