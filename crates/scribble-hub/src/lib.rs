//! Connection hub for Scribble sessions.
//!
//! Each session runs one hub actor that owns the set of live client
//! connections. Callers talk to it through a [`HubHandle`]:
//!
//! - [`HubHandle::register`] / [`HubHandle::unregister`]: add or drop a
//!   connection; dropping closes its outbound buffer exactly once.
//! - [`HubHandle::broadcast`]: fan a frame out to everyone. A connection
//!   whose bounded buffer is full is evicted rather than waited on.
//! - [`HubHandle::send_to`]: best-effort unicast with a bounded wait.
//!
//! The control loop never waits on a peer. A unicast to a backed-up
//! connection waits up to [`HubConfig::send_timeout`] on its own task.

mod config;
mod error;
mod hub;

pub use config::HubConfig;
pub use error::HubError;
pub use hub::{Frame, HubHandle, spawn_hub};
