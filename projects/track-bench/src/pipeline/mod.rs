// Bulk evaluation pipeline: matrix, runs, analysis and outputs

pub mod finalize;
pub mod matrix;
pub mod orchestrator;
pub mod quality;
pub mod report;
pub mod resolver;
pub mod streaks;
pub mod types;
