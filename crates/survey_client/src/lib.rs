//! Client core of the coloring-book survey: page sequencing with resumption,
//! per-page action logs, and buffered delivery of finished sessions.

pub mod clock;
pub mod command_log;
pub mod config;
pub mod connectivity;
pub mod forms;
pub mod paging;
pub mod render;
pub mod runtime;
pub mod session;
pub mod transfer;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command_log::{Command, CommandKind, CommandLog};
pub use connectivity::{ConnectivityEvent, ConnectivityFsm, ConnectivityState};
pub use paging::{PagingEvent, PagingFsm, PagingState};
pub use render::PageRenderer;
pub use runtime::{ShutdownReport, SurveyCommand, SurveyEvent, SurveyHandle, SurveyRuntime};
pub use session::SessionContext;
pub use transfer::{TransferFsm, TransferState};
pub use transport::{BatchUploader, HttpTransport, LivenessProbe, SurveySource, TransportError};

#[cfg(test)]
#[path = "tests/support.rs"]
mod tests_support;
