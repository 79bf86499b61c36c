mod orchestrator;
mod orchestrator_command;
mod orchestrator_config;
mod orchestrator_event;
mod orchestrator_handle;
mod session_event;
mod session_view;
mod swap;

pub use orchestrator::*;
pub(crate) use orchestrator_command::*;
pub use orchestrator_config::*;
pub(crate) use orchestrator_event::*;
pub use orchestrator_handle::*;
pub use session_event::*;
pub use session_view::*;
pub use swap::SwapId;
pub use swap::SwapReport;
pub(crate) use swap::{PendingSwap, SwapReply};
