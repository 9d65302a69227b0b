pub mod builder;
pub mod client;
pub mod request;
pub mod response;
pub mod serialization;
pub mod types;

// Re-export commonly used types for convenient access
pub use builder::{RequestPlan, resolve_url};
pub use client::Client;
pub use request::{HeaderLayerKind, HeaderStack, Request, RequestBody};
pub use response::Response;
pub use types::{Method, NetworkFailure, Status};
