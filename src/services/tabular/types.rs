use polars::prelude::DataFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Date,
    Boolean,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Picks the format from the filename suffix; contents are not sniffed.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".csv") {
            Some(FileFormat::Csv)
        } else if name.ends_with(".xlsx") {
            Some(FileFormat::Xlsx)
        } else {
            None
        }
    }
}

/// A successfully parsed upload with normalized column names.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub source: String,
    pub dataframe: DataFrame,
}
