//! Log watching and parsing.

pub mod log_parser;
pub mod matchers;
pub mod session_tracker;
pub mod tailer;
pub mod timestamp;

pub use log_parser::{EventParser, ParseStats};
pub use matchers::LineMatcher;
pub use session_tracker::{AnomalyCounters, Applied, SessionTracker};
pub use tailer::{FileTailer, TailConfig, TailError, TailItem};
