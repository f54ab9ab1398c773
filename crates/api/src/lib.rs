//! HTTP surface of the relay.
//!
//! - `GET /`           liveness text with uptime
//! - `GET /ping`       JSON liveness check, also the keep-alive target
//! - `GET /stats`      delivery counters since boot
//! - `POST /test-push` send a test push to one user

pub mod keepalive;
pub mod routes;
pub mod state;
