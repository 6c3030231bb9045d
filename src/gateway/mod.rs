//! Request forwarding: the loop that wires the transformers into a timed,
//! cancellable, failover-aware proxy.

pub mod disconnect;
pub mod forward;

pub use forward::forward;
