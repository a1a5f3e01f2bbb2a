pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod table;

pub use config::Config;
pub use error::{CleanseError, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use table::{Cell, Column, RecordTable};
