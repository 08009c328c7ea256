use crate::service::types::{BlockchainState, PeerState, StatusEvent};

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::trace;

const EVENT_CAPACITY: usize = 64;

/// Publishes status events.
///
/// Every event goes out on a broadcast channel. The latest peer and chain
/// state are additionally kept in watch channels so late subscribers still
/// see them, until [`StatusBroadcaster::remove_sticky`] clears them.
#[derive(Clone)]
pub struct StatusBroadcaster {
	events: broadcast::Sender<StatusEvent>,
	peers: Arc<watch::Sender<Option<PeerState>>>,
	blockchain: Arc<watch::Sender<Option<BlockchainState>>>,
}

impl StatusBroadcaster {
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		let (peers, _) = watch::channel(None);
		let (blockchain, _) = watch::channel(None);
		Self {
			events,
			peers: Arc::new(peers),
			blockchain: Arc::new(blockchain),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
		self.events.subscribe()
	}

	pub fn watch_peers(&self) -> watch::Receiver<Option<PeerState>> {
		self.peers.subscribe()
	}

	pub fn watch_blockchain(&self) -> watch::Receiver<Option<BlockchainState>> {
		self.blockchain.subscribe()
	}

	pub fn latest_peers(&self) -> Option<PeerState> {
		*self.peers.borrow()
	}

	pub fn latest_blockchain(&self) -> Option<BlockchainState> {
		self.blockchain.borrow().clone()
	}

	pub fn publish(&self, event: StatusEvent) {
		match &event {
			StatusEvent::Peers(state) => {
				self.peers.send_replace(Some(*state));
			}
			StatusEvent::Blockchain(state) => {
				self.blockchain.send_replace(Some(state.clone()));
			}
			_ => {}
		}
		// No subscribers is fine.
		if self.events.send(event).is_err() {
			trace!("status event dropped, no subscribers");
		}
	}

	pub fn remove_sticky(&self) {
		self.peers.send_replace(None);
		self.blockchain.send_replace(None);
	}
}

impl Default for StatusBroadcaster {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::service::types::DownloadStatus;
	use chrono::DateTime;

	#[tokio::test]
	async fn sticky_state_survives_until_removed() {
		let broadcaster = StatusBroadcaster::new();
		let mut events = broadcaster.subscribe();

		broadcaster.publish(StatusEvent::Peers(PeerState { num_peers: 3 }));
		let state = BlockchainState {
			chain_date: DateTime::from_timestamp(1_317_972_665, 0).unwrap_or_default(),
			chain_height: 0,
			replaying: false,
			download: DownloadStatus::OK,
		};
		broadcaster.publish(StatusEvent::Blockchain(state.clone()));

		assert_eq!(
			events.recv().await.unwrap(),
			StatusEvent::Peers(PeerState { num_peers: 3 })
		);
		assert_eq!(broadcaster.latest_peers(), Some(PeerState { num_peers: 3 }));
		assert_eq!(*broadcaster.watch_blockchain().borrow(), Some(state));

		broadcaster.remove_sticky();
		assert_eq!(broadcaster.latest_peers(), None);
		assert_eq!(broadcaster.latest_blockchain(), None);
	}
}
