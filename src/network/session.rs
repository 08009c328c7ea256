//! Peer session: the live networking object that only exists while the device
//! has connectivity, power and storage.

use crate::chain::StoredHeader;
use crate::config::NetworkId;
use crate::network::discovery::CompositeDiscovery;
use crate::network::types::{NetworkError, PeerEvent, PeerEventSender, PeerInfo, SessionId};
use crate::wallet::{Transaction, Wallet};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The peer-to-peer networking primitive, supplied by a networking library.
///
/// A peer group reports back exclusively through the [`PeerEventSender`]
/// installed with `add_event_listener`.
#[async_trait::async_trait]
pub trait PeerGroup: Send + Sync {
	fn add_wallet(&self, wallet: Arc<dyn Wallet>);

	fn remove_wallet(&self, wallet: &Arc<dyn Wallet>);

	fn add_event_listener(&self, listener: PeerEventSender);

	fn remove_event_listener(&self);

	fn set_max_connections(&self, max: usize);

	fn add_peer_discovery(&self, discovery: Arc<CompositeDiscovery>);

	/// Starts connecting. Implementations whose start blocks must move the
	/// blocking part onto their own worker.
	async fn start(&self) -> Result<(), NetworkError>;

	/// Begins downloading headers on top of `head`.
	fn start_blockchain_download(&self, head: StoredHeader);

	fn broadcast_transaction(&self, tx: &Transaction);

	fn connected_peers(&self) -> Vec<PeerInfo>;

	/// Stops and waits until every connection has been closed.
	async fn stop(&self);
}

pub trait PeerGroupFactory: Send + Sync {
	fn create(&self, network: NetworkId, user_agent: &str) -> Box<dyn PeerGroup>;
}

/// Everything needed to bring up one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
	pub network: NetworkId,
	pub user_agent: String,
	pub max_connections: usize,
	pub discovery: CompositeDiscovery,
}

pub struct PeerSession {
	id: SessionId,
	group: Box<dyn PeerGroup>,
	wallet: Arc<dyn Wallet>,
}

impl PeerSession {
	/// Creates, configures and starts a peer group.
	///
	/// Either a fully running session is returned or the half-built group is
	/// unwound again before the error is returned.
	pub async fn start(
		factory: &dyn PeerGroupFactory,
		id: SessionId,
		wallet: Arc<dyn Wallet>,
		settings: SessionSettings,
		events: mpsc::UnboundedSender<PeerEvent>,
		head: StoredHeader,
	) -> Result<Self, NetworkError> {
		info!(
			"Starting peer group (session {}, max {} connections{})",
			id.0,
			settings.max_connections,
			if settings.discovery.is_trusted_only() {
				", trusted peer only"
			} else {
				""
			}
		);

		let group = factory.create(settings.network, &settings.user_agent);
		group.add_wallet(wallet.clone());
		group.add_event_listener(PeerEventSender::new(id, events));
		group.set_max_connections(settings.max_connections);
		group.add_peer_discovery(Arc::new(settings.discovery));

		if let Err(e) = group.start().await {
			warn!("Peer group failed to start: {}", e);
			group.remove_event_listener();
			group.remove_wallet(&wallet);
			group.stop().await;
			return Err(e);
		}

		group.start_blockchain_download(head);
		Ok(Self { id, group, wallet })
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn broadcast_transaction(&self, tx: &Transaction) {
		self.group.broadcast_transaction(tx);
	}

	pub fn connected_peers(&self) -> Vec<PeerInfo> {
		self.group.connected_peers()
	}

	/// Detaches listener and wallet, then stops the group and waits for it.
	pub async fn stop(self) {
		info!("Stopping peer group (session {})", self.id.0);
		self.group.remove_event_listener();
		self.group.remove_wallet(&self.wallet);
		self.group.stop().await;
		info!("Peer group stopped (session {})", self.id.0);
	}
}
