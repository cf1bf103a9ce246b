pub mod reader;
pub mod types;
pub mod utils;

pub use reader::{preview, TableReader};
pub use types::NormalizedTable;
