use crate::chain::BlockHeader;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A connected remote peer as reported by the peer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
	pub addr: SocketAddr,
	pub user_agent: Option<String>,
	pub best_height: u32,
	pub ping_ms: Option<u64>,
}

/// Identifies one peer session; events from stale sessions are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Callbacks from the peer group, delivered as messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
	Connected {
		session: SessionId,
		peer: PeerInfo,
		peer_count: usize,
	},
	Disconnected {
		session: SessionId,
		addr: SocketAddr,
		peer_count: usize,
	},
	BlocksDownloaded {
		session: SessionId,
		header: BlockHeader,
		blocks_left: u32,
	},
}

impl PeerEvent {
	pub fn session(&self) -> SessionId {
		match self {
			PeerEvent::Connected { session, .. }
			| PeerEvent::Disconnected { session, .. }
			| PeerEvent::BlocksDownloaded { session, .. } => *session,
		}
	}
}

/// Listener handle given to a peer group; stamps every event with its session.
#[derive(Debug, Clone)]
pub struct PeerEventSender {
	session: SessionId,
	tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSender {
	pub fn new(session: SessionId, tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
		Self { session, tx }
	}

	pub fn session(&self) -> SessionId {
		self.session
	}

	/// Returns `false` once the service side has gone away.
	pub fn connected(&self, peer: PeerInfo, peer_count: usize) -> bool {
		self.tx
			.send(PeerEvent::Connected {
				session: self.session,
				peer,
				peer_count,
			})
			.is_ok()
	}

	pub fn disconnected(&self, addr: SocketAddr, peer_count: usize) -> bool {
		self.tx
			.send(PeerEvent::Disconnected {
				session: self.session,
				addr,
				peer_count,
			})
			.is_ok()
	}

	pub fn blocks_downloaded(&self, header: BlockHeader, blocks_left: u32) -> bool {
		self.tx
			.send(PeerEvent::BlocksDownloaded {
				session: self.session,
				header,
				blocks_left,
			})
			.is_ok()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
	#[error("Failed to resolve {host}: {source}")]
	Resolve {
		host: String,
		#[source]
		source: std::io::Error,
	},

	#[error("Discovery timed out after {0:?}")]
	Timeout(std::time::Duration),

	#[error("No seed could be resolved")]
	NoSeeds,

	#[error("Rendezvous error: {0}")]
	Rendezvous(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
	#[error("Peer group failed to start: {0}")]
	StartFailed(String),

	#[error("Discovery error: {0}")]
	Discovery(#[from] DiscoveryError),
}
