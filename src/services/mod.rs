pub mod correlation;
pub mod heatmap;
pub mod merge;
pub mod pipeline;
pub mod tabular;
