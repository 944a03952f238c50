//! `skink` is a symmetric CoAP endpoint over UDP.
//!
//! One [`core::Core`] plays both protocol roles. As a **server** it
//! exposes three resources: `/buttons` (observable, RFC 7641),
//! `/actuators` (GET/PUT) and `/file` (block-wise GET per RFC 7959
//! Block2, iPATCH append and FETCH line ranges per RFC 8132). As a
//! **client** it subscribes, issues requests and reassembles pushed
//! block transfers. Both roles share one message engine: a
//! confirmable-message retransmission table with exponential backoff,
//! duplicate-ID windows with response replay, and the Observe and
//! Block2 state machines.
//!
//! ## Collaborators
//! The runtime is generic over its environment:
//! - [`net::Socket`]: a datagram transport (`std::net::UdpSocket`
//!   provided)
//! - [`time::Clock`]: a monotonic `u64` clock ([`crate::std::Clock`]
//!   provided)
//! - [`fs::FileSystem`]: byte-oriented file storage
//!   ([`crate::std::DirFs`] provided)
//!
//! ## Driving it
//! Call [`core::Core::poll`] in a loop; it services one datagram,
//! runs the retransmission tick and the subscriber prune pass, and
//! yields [`core::Event`]s for the hosting environment to react to.
//! Host-side state changes flow in through `set_button`,
//! `notify_byte` / `notify_text` and `push_file`.

#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]

/// Block2 transfer state machines
pub mod block;

/// configuring runtime behavior
pub mod config;

/// the endpoint runtime
pub mod core;

/// recent-message-ID windows & response replay
pub mod dedup;

/// file system abstractions
pub mod fs;

/// network abstractions
pub mod net;

/// Observe subscriber registry
pub mod observe;

/// the confirmable-message retransmission table
pub mod reliability;

/// response codes
pub mod resp;

/// customizable retrying of fallible operations
pub mod retry;

/// time abstractions
pub mod time;

/// `std` implementations of the socket, clock and file system seams
pub mod std;

pub(crate) mod logging;

#[cfg(test)]
pub(crate) mod test;

pub use skink_msg;

#[doc(inline)]
pub use crate::core::{Core, Event, COAP_PORT};
