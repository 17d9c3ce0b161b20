//! # prism-engine
//!
//! The publishing-session state machine: per-platform tracks, the session
//! aggregator with its single `apply_event` entry point, the event reducer,
//! and the two drivers that feed it (local simulation, remote channel).

#![deny(unsafe_code)]

pub mod dispatch;
pub mod driver;
pub mod error;
pub mod handle;
pub mod log;
pub mod observer;
pub mod session;
pub mod track;

pub use dispatch::{IgnoreReason, Reduction};
pub use driver::{
    Driver, DriverPlan, EventSink, RemoteChannelDriver, RemoteConfig, SimulationConfig, SimulationDriver,
};
pub use error::{DriverError, SessionError};
pub use handle::{start_session, AttachOptions, EngineConfig, SessionHandle};
pub use log::{ActionLog, ActionLogEntry, LogKind};
pub use observer::{SessionObservers, Subscription, Topic};
pub use session::{Session, SessionPhase, SessionSnapshot};
pub use track::{PlatformTrack, TrackSnapshot, TrackStatus};
