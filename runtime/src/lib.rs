pub mod config;
pub mod error;
pub mod gate;
pub mod runtime;
pub mod server;

pub use error::{status_from_error, HttpError, RuntimeError};
pub use gate::{ConcurrencyGate, Ticket};
pub use runtime::{Runtime, RuntimeOptions, DEBUG_PATH_PREFIX};
