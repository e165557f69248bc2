//! HTTP integration: caller identification, the throttling middleware and
//! the host server.

mod identifier;
mod middleware;
mod server;

pub use identifier::{client_identifier, IDENTIFIER_HEADERS};
pub use middleware::{protect, throttle, ThrottleState};
pub use server::{app, HttpServer};
