//! The axum HTTP surface: router assembly, access-log middleware, the bearer-credential guard,
//! and one handler module per endpoint.
//!
//! Grounded on the teacher's `server/router.rs` (`PolluxState`, `access_log`, router assembly)
//! and `server/guards/auth.rs` (typed-header bearer extraction), generalized from a fixed set of
//! provider sub-routers to the proxy's seven endpoints.

pub mod guards;
pub mod router;
pub mod routes;
pub mod state;

pub use router::build_router;
pub use state::RelayState;
