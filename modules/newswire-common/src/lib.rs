pub mod config;
pub mod error;
pub mod urls;

pub use config::{PipelineConfig, QueryWeights};
pub use error::{FetchError, PipelineError, Result};
