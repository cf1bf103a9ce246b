use bytes::Bytes;
use serde::Serialize;

/// Merge key every uploaded table must carry after normalization.
pub const DATE_KEY: &str = "date";

/// Coefficient magnitude at which a pair counts as significant.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.5;

pub const TOO_FEW_COLUMNS_WARNING: &str =
    "Please select at least two variables for correlation analysis.";

pub const NO_SIGNIFICANT_PAIRS_INFO: &str = "No significant correlations found.";

/// One uploaded file, held in memory until it has been parsed.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { name: name.into(), data: data.into() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub dtypes: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub name: String,
    pub preview: TablePreview,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Warning,
    Info,
}

/// A banner shown to the user alongside the results.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }
}

/// Square correlation matrix in column-selection order.
///
/// `None` marks a coefficient that is undefined (fewer than two paired
/// observations, or a column without variance).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied().flatten()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignificantPair {
    pub variable_1: String,
    pub variable_2: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Black,
    White,
}

impl TextColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextColor::Black => "black",
            TextColor::White => "white",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeatmapCell {
    pub x: String,
    pub y: String,
    pub value: Option<f64>,
    pub text: String,
    pub text_color: TextColor,
    pub fill: String,
    pub hover: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Heatmap {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub colorbar_title: String,
    pub color_scale: String,
    pub zmin: f64,
    pub zmax: f64,
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub z: Vec<Vec<Option<f64>>>,
    pub cells: Vec<HeatmapCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationSection {
    pub matrix: CorrelationMatrix,
    pub significant_pairs: Vec<SignificantPair>,
    pub heatmap: Heatmap,
}

/// Everything one interaction produces, recomputed from scratch per request.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CorrelationReport {
    pub files: Vec<FilePreview>,
    pub notices: Vec<Notice>,
    pub merged: Option<TablePreview>,
    pub numeric_columns: Vec<String>,
    pub selected_columns: Vec<String>,
    pub correlation: Option<CorrelationSection>,
}

impl CorrelationReport {
    /// First error or warning that kept the correlation from being computed.
    pub fn blocking_notice(&self) -> Option<&Notice> {
        self.notices
            .iter()
            .find(|n| n.level == NoticeLevel::Error)
            .or_else(|| self.notices.iter().find(|n| n.level == NoticeLevel::Warning))
    }
}
