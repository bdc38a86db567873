//! Selection orchestration: which articles are in view and which reports
//! can be requested from them.
//!
//! - [`state`] - Pure mode/working-set/picks state machine with
//!   generation-tagged fetch tickets
//! - [`orchestrator`] - Spawns fetches, applies their results and gates
//!   report requests
//! - [`report`] - [`ReportGenerator`] seam and report types

mod orchestrator;
mod report;
mod state;

pub use orchestrator::{Orchestrator, SelectionError, SelectionEvent, Settings};
pub use report::{
    AlertKind, CitedArticle, DigestGenerator, GenerationError, Report, ReportGenerator, ReportKind,
    ReportRequest,
};
pub use state::{
    take_window, FetchTarget, FetchTicket, LoadState, Mode, SelectionState, ValidationError,
};
