pub mod config;
pub mod monitor;
pub mod session;

pub use config::SessionConfig;
pub use monitor::{watch_run, RunSummary};
pub use session::{PipelineState, PollUpdate, RecordTable, Session, SessionError};
