//! Async polling of a running engine.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::session::{PollUpdate, Session, SessionError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub polls: usize,
    pub records: usize,
    pub exit_code: Option<i32>,
}

/// Poll `session` every `period` until the engine has finished, forwarding
/// each non-empty update and the final one. A closed receiver does not stop
/// the loop; a full one makes it wait.
pub async fn watch_run(
    session: &mut Session,
    period: Duration,
    updates: mpsc::Sender<PollUpdate>,
) -> Result<RunSummary, SessionError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut summary = RunSummary::default();

    loop {
        ticker.tick().await;
        let update = session.poll()?;
        summary.polls += 1;
        summary.records += update.new_records.len();

        let finished = update.finished;
        if finished {
            summary.exit_code = update.exit_code;
        }
        if (finished || !update.is_empty()) && updates.send(update).await.is_err() {
            debug!("run monitor receiver dropped");
        }
        if finished {
            return Ok(summary);
        }
    }
}
