pub mod adapter;
pub mod errors;
pub mod events;
pub mod ids;
pub mod platform;
pub mod policy;
pub mod results;
pub mod wire;

pub use adapter::{AdaptedContent, ContentAdapter};
pub use errors::{StartError, WireError};
pub use events::PublishEvent;
pub use ids::{LogEntryId, SessionId};
pub use platform::{Platform, UnsupportedPlatform};
pub use policy::{CompletionPolicy, DriverMode};
pub use results::{Engagement, FlatReport, Outcome, PlatformResult};
