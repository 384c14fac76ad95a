pub mod analyzer;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod generator;
pub mod group;
pub mod merge;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod record;
pub mod run_buffer;
pub mod run_cursor;
pub mod run_dir;
pub mod run_flusher;
pub mod wide;

pub use error::*;
pub use pipeline::{Search, SearchSummary};
pub use record::{Record, RecordLayout};
