use std::io::Cursor;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use polars::prelude::*;

use super::types::{ColumnKind, FileFormat, NormalizedTable};
use super::utils::*;
use crate::error::AppError;
use crate::models::{TablePreview, UploadedFile};

/// Parses uploads into normalized polars tables.
#[derive(Debug, Clone)]
pub struct TableReader {
    max_file_size: usize,
}

impl TableReader {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn read(&self, file: &UploadedFile) -> Result<NormalizedTable, AppError> {
        let format = FileFormat::from_file_name(&file.name)
            .ok_or_else(|| AppError::UnsupportedFileType(file.name.clone()))?;

        if file.data.len() > self.max_file_size {
            return Err(AppError::InvalidInput(format!(
                "file is {} bytes, limit is {}",
                file.data.len(),
                self.max_file_size
            )));
        }

        tracing::debug!("Parsing {} as {:?} ({} bytes)", file.name, format, file.data.len());
        let (raw_headers, rows) = match format {
            FileFormat::Csv => read_csv_rows(&file.data)?,
            FileFormat::Xlsx => read_xlsx_rows(&file.data)?,
        };

        let headers = normalize_headers(raw_headers.iter().map(String::as_str));
        let dataframe = create_dataframe(&headers, &rows)?;
        tracing::info!(
            "Parsed {}: {} rows x {} columns",
            file.name,
            dataframe.height(),
            dataframe.width()
        );

        Ok(NormalizedTable {
            source: file.name.clone(),
            dataframe,
        })
    }
}

fn read_csv_rows(data: &[u8]) -> Result<(Vec<String>, Vec<Vec<Data>>), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let headers = raw_header_names(reader.headers()?.iter().map(str::to_string));
    if headers.is_empty() {
        return Err(AppError::ParseError("file has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(guess_cell).collect());
    }
    Ok((headers, rows))
}

fn read_xlsx_rows(data: &[u8]) -> Result<(Vec<String>, Vec<Vec<Data>>), AppError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| raw_header_names(row.iter().map(|cell| match cell {
            Data::Empty => String::new(),
            other => other.to_string(),
        })))
        .ok_or_else(|| AppError::FileProcessingError(format!("Sheet {} is empty", sheet_name)))?;

    Ok((headers, rows.map(|row| row.to_vec()).collect()))
}

fn raw_header_names<I>(cells: I) -> Vec<String>
where
    I: Iterator<Item = String>,
{
    cells
        .enumerate()
        .map(|(idx, name)| {
            if name.trim().is_empty() {
                format!("unnamed_{}", idx)
            } else {
                name
            }
        })
        .collect()
}

fn create_dataframe(headers: &[String], rows: &[Vec<Data>]) -> Result<DataFrame, AppError> {
    let mut columns = Vec::with_capacity(headers.len());

    for (col_idx, header) in headers.iter().enumerate() {
        let values: Vec<Data> = rows
            .iter()
            .map(|row| row.get(col_idx).cloned().unwrap_or(Data::Empty))
            .collect();

        let series = match detect_column_type(&values) {
            ColumnKind::Integer => {
                let ints: Vec<Option<i64>> = values.iter().map(|v| match v {
                    Data::Int(i) => Some(*i),
                    _ => None,
                }).collect();
                Series::new(header, ints)
            }
            ColumnKind::Float => {
                let nums: Vec<Option<f64>> = values.iter().map(cell_to_f64).collect();
                Series::new(header, nums)
            }
            ColumnKind::Date => {
                let millis: Vec<Option<i64>> = values.iter().map(cell_to_millis).collect();
                Series::new(header, millis)
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            }
            ColumnKind::Boolean => {
                let flags: Vec<Option<bool>> = values.iter().map(|v| match v {
                    Data::Bool(b) => Some(*b),
                    _ => None,
                }).collect();
                Series::new(header, flags)
            }
            ColumnKind::Text => {
                let strings: Vec<Option<String>> = values.iter().map(|v| match v {
                    Data::Empty => None,
                    other => Some(other.to_string()),
                }).collect();
                Series::new(header, strings)
            }
        };

        columns.push(series);
    }

    DataFrame::new(columns)
        .map_err(|e| AppError::DataFrameError(format!("Failed to create DataFrame: {}", e)))
}

/// Renders the first `rows` rows of a table as strings.
pub fn preview(df: &DataFrame, rows: usize) -> Result<TablePreview, AppError> {
    let head = df.head(Some(rows));

    let mut sample = Vec::with_capacity(head.height());
    for row_idx in 0..head.height() {
        let row = head
            .get_columns()
            .iter()
            .map(|series| series.get(row_idx).map(format_value))
            .collect::<PolarsResult<Vec<_>>>()?;
        sample.push(row);
    }

    Ok(TablePreview {
        columns: df.get_column_names().iter().map(|s| s.to_string()).collect(),
        dtypes: df.dtypes().iter().map(|d| d.to_string()).collect(),
        row_count: df.height(),
        rows: sample,
    })
}

fn format_value(value: AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READINGS_XLSX: &[u8] = include_bytes!("../../../tests/fixtures/readings.xlsx");

    fn reader() -> TableReader {
        TableReader::new(1024 * 1024)
    }

    #[test]
    fn csv_headers_are_normalized_and_dates_inferred() {
        let file = UploadedFile::new("a.csv", "Date, Avg Temp ,Station\n2024-01-01,1.5,north\n2024-01-02,2,south\n");
        let table = reader().read(&file).unwrap();
        let df = &table.dataframe;

        assert_eq!(df.get_column_names(), vec!["date", "avg_temp", "station"]);
        assert_eq!(
            df.column("date").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(df.column("avg_temp").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("station").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn blank_csv_cells_become_nulls() {
        let file = UploadedFile::new("gaps.csv", "date,value\n2024-01-01,1\n2024-01-02,\n2024-01-03,3\n");
        let table = reader().read(&file).unwrap();
        let value = table.dataframe.column("value").unwrap();

        assert_eq!(value.dtype(), &DataType::Int64);
        assert_eq!(value.null_count(), 1);
    }

    #[test]
    fn ragged_csv_is_a_parse_error() {
        let file = UploadedFile::new("broken.csv", "date,value\n2024-01-01,1,extra\n");
        let err = reader().read(&file).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn extension_is_checked_by_suffix() {
        let file = UploadedFile::new("notes.txt", "date,value\n");
        assert!(matches!(reader().read(&file), Err(AppError::UnsupportedFileType(_))));

        let upper = UploadedFile::new("DATA.CSV", "date,value\n");
        assert!(matches!(reader().read(&upper), Err(AppError::UnsupportedFileType(_))));
    }

    #[test]
    fn oversized_files_are_rejected() {
        let file = UploadedFile::new("big.csv", "date,value\n2024-01-01,1\n");
        let err = TableReader::new(8).read(&file).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn garbage_xlsx_is_a_processing_error() {
        let file = UploadedFile::new("fake.xlsx", "this is not a zip archive");
        let err = reader().read(&file).unwrap_err();
        assert!(matches!(err, AppError::FileProcessingError(_)));
    }

    #[test]
    fn xlsx_first_sheet_is_read() {
        let file = UploadedFile::new("readings.xlsx", READINGS_XLSX);
        let table = reader().read(&file).unwrap();
        let df = &table.dataframe;

        assert_eq!(df.get_column_names(), vec!["date", "wind_speed"]);
        assert_eq!(df.height(), 3);
        assert_eq!(
            df.column("date").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }

    #[test]
    fn preview_takes_leading_rows_as_text() {
        let file = UploadedFile::new("a.csv", "date,temp,site\n2024-01-01,1,a\n2024-01-02,,b\n2024-01-03,3,c\n");
        let table = reader().read(&file).unwrap();
        let preview = preview(&table.dataframe, 2).unwrap();

        assert_eq!(preview.columns, vec!["date", "temp", "site"]);
        assert_eq!(preview.row_count, 3);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[0][2], "a");
        assert_eq!(preview.rows[1][1], "");
        assert!(preview.rows[0][0].starts_with("2024-01-01"));
    }
}
