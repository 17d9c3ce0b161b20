pub mod api;
pub mod client;
pub mod error;
pub mod event_bridge;
pub mod handlers;
pub mod publish;
pub mod server;

pub use api::{ApiResponse, PublishAccepted, PublishRequest};
pub use error::ServerError;
pub use publish::{PublishOrchestrator, RunState};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
