pub mod config;
mod controller;
mod polling;
pub mod session;

pub use controller::{
    Clock, RefreshReport, SessionController, SessionError, SessionEvent, SessionSettings,
    SystemClock,
};
pub use polling::PollingHandle;
pub use session::{Observed, Provenance, SessionRecord, WriteKind};
