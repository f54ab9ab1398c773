//! Push delivery.
//!
//! [`transport::PushTransport`] is the seam to the delivery backend
//! ([`fcm::FcmTransport`] in production, [`memory::MemoryTransport`] in
//! tests). [`provider::PushProvider`] wraps a transport, classifies failures,
//! and reclaims device tokens the backend reports as stale.

pub mod fcm;
pub mod memory;
pub mod provider;
pub mod transport;

pub use fcm::FcmTransport;
pub use memory::MemoryTransport;
pub use provider::{PushProvider, SendOutcome};
pub use transport::{DisplayHints, PushError, PushMessage, PushPayload, PushTransport};
