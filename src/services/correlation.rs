use polars::prelude::*;

use crate::error::AppError;
use crate::models::{CorrelationMatrix, SignificantPair, DATE_KEY};

/// Columns offered for correlation: numeric dtypes, never the merge key.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|series| series.name() != DATE_KEY && series.dtype().is_numeric())
        .map(|series| series.name().to_string())
        .collect()
}

/// Resolves the user's selection against the table, keeping selection order.
///
/// `None` selects every numeric column. Repeated names are kept once.
pub fn resolve_selection(
    df: &DataFrame,
    selected: Option<&[String]>,
) -> Result<Vec<String>, AppError> {
    let numeric = numeric_columns(df);
    let Some(selected) = selected else {
        return Ok(numeric);
    };

    let mut resolved: Vec<String> = Vec::with_capacity(selected.len());
    for name in selected {
        if !numeric.contains(name) {
            return Err(AppError::InvalidInput(format!(
                "'{}' is not a numeric column of the merged table",
                name
            )));
        }
        if !resolved.contains(name) {
            resolved.push(name.clone());
        }
    }
    Ok(resolved)
}

/// Pearson correlation over pairwise-complete rows for the given columns.
pub fn correlation_matrix(df: &DataFrame, columns: &[String]) -> Result<CorrelationMatrix, AppError> {
    let data = columns
        .iter()
        .map(|name| column_values(df, name))
        .collect::<Result<Vec<_>, _>>()?;

    let n = columns.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        values[i][i] = pearson(&data[i], &data[i]).map(|_| 1.0);
        for j in (i + 1)..n {
            let r = pearson(&data[i], &data[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    tracing::debug!("Computed {}x{} correlation matrix", n, n);
    Ok(CorrelationMatrix {
        columns: columns.to_vec(),
        values,
    })
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, AppError> {
    let series = df
        .column(name)
        .map_err(|_| AppError::InvalidInput(format!("unknown column '{}'", name)))?;
    let floats = series.cast(&DataType::Float64)?;
    let values = floats.f64()?.into_iter().collect();
    Ok(values)
}

/// Pearson r over rows where both sides are present and finite.
///
/// `None` when fewer than two such rows exist or either side has no variance.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .collect();

    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Upper-triangle pairs whose coefficient magnitude reaches `threshold`.
pub fn significant_pairs(matrix: &CorrelationMatrix, threshold: f64) -> Vec<SignificantPair> {
    let mut pairs = Vec::new();
    for i in 0..matrix.len() {
        for j in (i + 1)..matrix.len() {
            if let Some(r) = matrix.get(i, j) {
                if r.abs() >= threshold {
                    pairs.push(SignificantPair {
                        variable_1: matrix.columns[i].clone(),
                        variable_2: matrix.columns[j].clone(),
                        correlation: r,
                    });
                }
            }
        }
    }
    pairs
}
