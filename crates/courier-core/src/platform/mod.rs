//! Platform abstractions: the request port the engine calls out through, and
//! the event model adapters deliver into it.

pub mod port;
pub mod throttled;
pub mod types;
