use std::collections::HashSet;
use polars::prelude::*;

use crate::error::AppError;
use crate::models::DATE_KEY;
use crate::services::tabular::utils::{millis_to_date_text, parse_date_millis, unique_name};
use crate::services::tabular::NormalizedTable;

/// Outer-joins every table onto the first one, on the `date` column.
///
/// Same-named value columns from later tables get a numeric suffix
/// (`temp`, `temp_1`, ...). When more than one table is merged the result is
/// ordered by `date`. If the tables disagree on the key type (a date column
/// in one file, a text column in another) every key is compared as
/// `%Y-%m-%d` text instead.
pub fn merge_tables(tables: &[NormalizedTable]) -> Result<DataFrame, AppError> {
    let frames = aligned_frames(tables)?;
    let (first, rest) = frames.split_first().ok_or(AppError::NoTables)?;

    let mut merged = first.clone();
    for (table, right) in tables.iter().skip(1).zip(rest) {
        let right = rename_collisions(&merged, right)?;
        tracing::debug!(
            "Outer-joining {} ({} rows) onto {} accumulated rows",
            table.source,
            right.height(),
            merged.height()
        );

        let joined = merged
            .outer_join(&right, [DATE_KEY], [DATE_KEY])
            .map_err(|e| AppError::MergeError(format!("{}: {}", table.source, e)))?;
        merged = coalesce_join_key(joined)?;
    }

    if !rest.is_empty() {
        merged = merged.sort([DATE_KEY], false, false)?;
    }

    tracing::info!(
        "Merged {} tables into {} rows x {} columns",
        tables.len(),
        merged.height(),
        merged.width()
    );
    Ok(merged)
}

/// Prepares each table for the fold: frees the join's reserved column name
/// and, when key types differ, turns every key into text.
fn aligned_frames(tables: &[NormalizedTable]) -> Result<Vec<DataFrame>, AppError> {
    let dtypes = tables
        .iter()
        .map(join_key_dtype)
        .collect::<Result<Vec<_>, _>>()?;
    let keys_as_text = dtypes.windows(2).any(|pair| pair[0] != pair[1]);

    if keys_as_text {
        if let Some((table, dtype)) = tables
            .iter()
            .zip(&dtypes)
            .find(|(_, dtype)| !matches!(dtype, DataType::String | DataType::Datetime(_, _)))
        {
            return Err(AppError::MergeError(format!(
                "'{}' in {} is {}, which cannot be matched against the other files' keys",
                DATE_KEY, table.source, dtype
            )));
        }
        tracing::warn!("Join keys differ in type ({:?}), matching them as text", dtypes);
    }

    tables
        .iter()
        .map(|table| -> Result<DataFrame, AppError> {
            let mut df = release_reserved_name(&table.dataframe)?;
            if keys_as_text {
                let key = key_as_text(df.column(DATE_KEY)?)?;
                df.with_column(key)?;
            }
            Ok(df)
        })
        .collect()
}

/// Date keys become `%Y-%m-%d` text; text keys that parse as dates are
/// rewritten the same way so both sides line up. Anything else is kept as is.
fn key_as_text(key: &Series) -> Result<Series, AppError> {
    let values: Vec<Option<String>> = match key.dtype() {
        DataType::Datetime(_, _) => key
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|millis| millis.and_then(millis_to_date_text))
            .collect(),
        _ => key
            .str()?
            .into_iter()
            .map(|raw| {
                raw.map(|raw| {
                    parse_date_millis(raw)
                        .and_then(millis_to_date_text)
                        .unwrap_or_else(|| raw.to_string())
                })
            })
            .collect(),
    };
    Ok(Series::new(DATE_KEY, values))
}

/// Moves a user column out of the name the join uses for its right-hand key.
fn release_reserved_name(df: &DataFrame) -> Result<DataFrame, AppError> {
    let reserved = right_key_name();
    let mut df = df.clone();
    if df.get_column_names().contains(&reserved.as_str()) {
        let mut taken: HashSet<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let new_name = unique_name(reserved.clone(), &mut taken);
        tracing::debug!("Renaming column {} to {}", reserved, new_name);
        df.rename(&reserved, &new_name)?;
    }
    Ok(df)
}

fn join_key_dtype(table: &NormalizedTable) -> Result<DataType, AppError> {
    table
        .dataframe
        .column(DATE_KEY)
        .map(|series| series.dtype().clone())
        .map_err(|_| AppError::MissingJoinKey { file: table.source.clone() })
}

fn rename_collisions(left: &DataFrame, right: &DataFrame) -> Result<DataFrame, AppError> {
    let left_names: HashSet<String> = left
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut taken = left_names.clone();
    taken.extend(right.get_column_names().iter().map(|s| s.to_string()));
    taken.insert(right_key_name());

    let mut renamed = right.clone();
    for name in right.get_column_names() {
        if name != DATE_KEY && left_names.contains(name) {
            let new_name = unique_name(name.to_string(), &mut taken);
            tracing::debug!("Renaming colliding column {} to {}", name, new_name);
            renamed.rename(name, &new_name)?;
        }
    }
    Ok(renamed)
}

fn right_key_name() -> String {
    format!("{}_right", DATE_KEY)
}

/// Folds a separate right-hand key column (if the join kept one) back into `date`.
fn coalesce_join_key(mut df: DataFrame) -> Result<DataFrame, AppError> {
    let right_key = right_key_name();
    if !df.get_column_names().contains(&right_key.as_str()) {
        return Ok(df);
    }

    let left = df.column(DATE_KEY)?.clone();
    let right = df.column(&right_key)?.clone();
    let keep_left = left.is_not_null();
    let key = left.zip_with(&keep_left, &right)?;

    df.with_column(key)?;
    Ok(df.drop(&right_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(source: &str, df: DataFrame) -> NormalizedTable {
        NormalizedTable { source: source.to_string(), dataframe: df }
    }

    fn dates(df: &DataFrame) -> Vec<Option<String>> {
        df.column(DATE_KEY)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|d| d.map(str::to_string))
            .collect()
    }

    #[test]
    fn row_set_is_the_union_of_dates() {
        let a = df!(
            "date" => &["2024-01-01", "2024-01-02", "2024-01-03"],
            "temp" => &[1.0, 2.0, 3.0]
        ).unwrap();
        let b = df!(
            "date" => &["2024-01-02", "2024-01-03", "2024-01-04"],
            "humidity" => &[20.0, 30.0, 40.0]
        ).unwrap();

        let merged = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap();

        assert_eq!(merged.height(), 4);
        assert_eq!(merged.get_column_names(), vec!["date", "temp", "humidity"]);
        assert_eq!(
            dates(&merged),
            vec![
                Some("2024-01-01".to_string()),
                Some("2024-01-02".to_string()),
                Some("2024-01-03".to_string()),
                Some("2024-01-04".to_string()),
            ]
        );
        assert_eq!(merged.column("temp").unwrap().null_count(), 1);
        assert_eq!(merged.column("humidity").unwrap().null_count(), 1);
    }

    #[test]
    fn single_table_passes_through() {
        let a = df!("date" => &["2024-01-02", "2024-01-01"], "temp" => &[1, 2]).unwrap();
        let merged = merge_tables(&[table("a.csv", a.clone())]).unwrap();
        assert!(merged.equals(&a));
    }

    #[test]
    fn duplicate_dates_multiply_rows() {
        let a = df!("date" => &["d", "d"], "x" => &[1.0, 2.0]).unwrap();
        let b = df!("date" => &["d", "d"], "y" => &[3.0, 4.0]).unwrap();

        let merged = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap();
        assert_eq!(merged.height(), 4);
    }

    #[test]
    fn colliding_columns_are_suffixed_across_many_files() {
        let make = |v: f64| df!("date" => &["2024-01-01"], "temp" => &[v]).unwrap();
        let tables = vec![
            table("a.csv", make(1.0)),
            table("b.csv", make(2.0)),
            table("c.csv", make(3.0)),
        ];

        let merged = merge_tables(&tables).unwrap();
        assert_eq!(merged.get_column_names(), vec!["date", "temp", "temp_1", "temp_2"]);
        assert_eq!(merged.height(), 1);
    }

    #[test]
    fn missing_date_column_is_a_named_error() {
        let a = df!("date" => &["2024-01-01"], "temp" => &[1.0]).unwrap();
        let b = df!("day" => &["2024-01-01"], "humidity" => &[1.0]).unwrap();

        let err = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap_err();
        match err {
            AppError::MissingJoinKey { file } => assert_eq!(file, "b.csv"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nothing_to_merge_is_a_named_error() {
        assert!(matches!(merge_tables(&[]), Err(AppError::NoTables)));
    }

    fn datetime_dates(days: &[&str]) -> Series {
        let millis: Vec<i64> = days.iter().map(|d| parse_date_millis(d).unwrap()).collect();
        Series::new(DATE_KEY, millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap()
    }

    #[test]
    fn stray_key_value_falls_back_to_text_keys() {
        let a = DataFrame::new(vec![
            datetime_dates(&["2024-01-01", "2024-01-02", "2024-01-03"]),
            Series::new("temp", &[10.0, 12.0, 15.0]),
        ])
        .unwrap();
        let b = df!(
            "date" => &["2024-01-01", "2024-01-02", "unknown"],
            "hum" => &[80.0, 70.0, 65.0]
        ).unwrap();

        let merged = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap();

        assert_eq!(merged.height(), 4);
        assert_eq!(
            dates(&merged),
            vec![
                Some("2024-01-01".to_string()),
                Some("2024-01-02".to_string()),
                Some("2024-01-03".to_string()),
                Some("unknown".to_string()),
            ]
        );
        assert_eq!(merged.column("temp").unwrap().null_count(), 1);
        assert_eq!(merged.column("hum").unwrap().null_count(), 1);
    }

    #[test]
    fn user_column_named_like_the_right_key_is_kept() {
        let a = df!("date" => &["2024-01-01", "2024-01-02"], "temp" => &[1.0, 2.0]).unwrap();
        let b = df!(
            "date" => &["2024-01-01", "2024-01-02"],
            "date_right" => &["x", "y"],
            "hum" => &[3.0, 4.0]
        ).unwrap();

        let merged = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap();

        assert_eq!(merged.get_column_names(), vec!["date", "temp", "date_right_1", "hum"]);
        assert_eq!(
            dates(&merged),
            vec![Some("2024-01-01".to_string()), Some("2024-01-02".to_string())]
        );
    }

    #[test]
    fn mismatched_key_types_are_rejected() {
        let a = df!("date" => &["2024-01-01"], "temp" => &[1.0]).unwrap();
        let b = df!("date" => &[20240101i64], "humidity" => &[1.0]).unwrap();

        let err = merge_tables(&[table("a.csv", a), table("b.csv", b)]).unwrap_err();
        assert!(matches!(err, AppError::MergeError(_)));
    }
}
