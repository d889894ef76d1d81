//! Concrete [`Adapter`](crate::adapter::Adapter) implementations over real
//! byte-oriented transports. Grounded on `jpe::transport`'s split between
//! transport-specific modules (one per concrete I/O type) and the generic
//! `Transport`/`BufClear` traits they each implement.

#[cfg(feature = "sync")]
pub mod serial;
pub mod tcp;

pub mod loopback;
