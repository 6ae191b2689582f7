// Eventi emessi dal poller verso la superficie utente
use crate::client::surface::SurfaceMessage;
use crate::common::payload::ResultRow;

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Replace the single message line.
    Message(SurfaceMessage),
    /// Append rows to the results table.
    Rows(Vec<ResultRow>),
    /// Start/stop affordances should be toggled.
    ControlChanged { running: bool, action: Option<String> },
    /// A cycle finished rendering; `rescheduled` tells whether another one follows.
    CycleFinished { action: String, rescheduled: bool },
}
