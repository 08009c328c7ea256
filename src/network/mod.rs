//! Peer networking seams.
//!
//! The service never talks to sockets for block download itself; it drives a
//! [`PeerGroup`] supplied by a networking library and feeds it addresses through
//! [`CompositeDiscovery`].

pub mod discovery;
pub mod dry_run;
pub mod rendezvous;
pub mod session;
pub mod types;

pub use discovery::{CompositeDiscovery, DiscoverySource, TrustedPeer};
pub use session::{PeerGroup, PeerGroupFactory, PeerSession, SessionSettings};
pub use types::*;
