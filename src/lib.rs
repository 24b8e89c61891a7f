//! deskpilot
//!
//! Desktop automation over pluggable backends, with isolated sessions that
//! can run side by side.
//!
//! - [`backend`] - the backend contract, the factory, and the baseline and
//!   native backends
//! - [`session`] - [`Session`]: owned directories, counters, event callbacks
//! - [`config`] - environment-driven defaults
//! - [`logging`] - tracing subscriber setup
//!
//! ```rust,ignore
//! deskpilot::logging::init();
//! let mut session = deskpilot::Session::from_env()?;
//! let shot = session.screenshot(true)?;
//! println!("{}", shot);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use backend::{Backend, BackendKind, BackgroundBackend, CapabilityDescriptor, Outcome};
pub use config::AutomationConfig;
pub use error::{Error, Result};
pub use session::{EventKind, Session, SessionBuilder, SessionEvent, SessionOptions, SessionStats};
