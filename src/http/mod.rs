//! HTTP surface: identity derivation, the 429 middleware, and a small
//! check server for reverse proxies.

mod identity;
mod middleware;
mod server;

pub use identity::{client_identity, FORWARDED_FOR, UNKNOWN_IDENTITY};
pub use middleware::{enforce_rate_limit, GuardState, TOO_MANY_REQUESTS_BODY};
pub use server::{router, HttpServer};
