//! Wire-level building blocks shared across the GRP relay stack.
//!
//! This crate provides:
//! - Bit-packed packet framing and validation ([`packet`])
//! - A bounds-checked reader for untrusted handshake payloads ([`reader`])
//! - Free-list object pools for the datagram hot path ([`pool`])
//! - Protocol type definitions and constants ([`types`])
//!
//! Nothing here performs I/O; parsing failures are reported as `bool`/
//! `Option` sentinels, never as errors or panics.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod packet;
pub mod pool;
pub mod reader;
pub mod types;

pub use packet::{Packet, PacketProperty};
pub use pool::{PacketPool, Pool, Poolable, ReaderPool};
pub use reader::ByteReader;
pub use types::RejectionReason;
