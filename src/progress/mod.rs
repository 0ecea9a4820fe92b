//! Progress and lifecycle event reporting

mod handler;
mod logging;

pub use handler::{
    CollectingHandler, EventHandler, EventKind, NoOpHandler, ProgressStage, ProgressUpdate,
    SdkEvent,
};
pub use logging::LoggingHandler;
