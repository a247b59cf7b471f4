pub mod analytics;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod types;

pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use types::*;
