use crate::chain::StoredHeader;
use crate::config::NetworkId;
use crate::network::discovery::CompositeDiscovery;
use crate::network::session::{PeerGroup, PeerGroupFactory};
use crate::network::types::{NetworkError, PeerEventSender, PeerInfo};
use crate::wallet::{Transaction, Wallet};

use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Peer group that runs discovery and logs the addresses it would dial,
/// without opening any connection.
pub struct DryRunPeerGroup {
	network: NetworkId,
	user_agent: String,
	discovery_timeout: Duration,
	state: Mutex<DryRunState>,
	candidates: Arc<Mutex<Vec<SocketAddr>>>,
}

#[derive(Default)]
struct DryRunState {
	discovery: Option<Arc<CompositeDiscovery>>,
	listener: Option<PeerEventSender>,
	max_connections: usize,
	task: Option<JoinHandle<()>>,
}

impl DryRunPeerGroup {
	pub fn new(network: NetworkId, user_agent: &str, discovery_timeout: Duration) -> Self {
		Self {
			network,
			user_agent: user_agent.to_string(),
			discovery_timeout,
			state: Mutex::new(DryRunState::default()),
			candidates: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Addresses picked by the last discovery round.
	pub fn candidates(&self) -> Vec<SocketAddr> {
		self.candidates
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

#[async_trait::async_trait]
impl PeerGroup for DryRunPeerGroup {
	fn add_wallet(&self, _wallet: Arc<dyn Wallet>) {}

	fn remove_wallet(&self, _wallet: &Arc<dyn Wallet>) {}

	fn add_event_listener(&self, listener: PeerEventSender) {
		self.state.lock().unwrap_or_else(PoisonError::into_inner).listener = Some(listener);
	}

	fn remove_event_listener(&self) {
		let listener = self
			.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.listener
			.take();
		if let Some(listener) = listener {
			debug!("Dry run: detached listener of session {}", listener.session().0);
		}
	}

	fn set_max_connections(&self, max: usize) {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.max_connections = max;
	}

	fn add_peer_discovery(&self, discovery: Arc<CompositeDiscovery>) {
		self.state.lock().unwrap_or_else(PoisonError::into_inner).discovery = Some(discovery);
	}

	async fn start(&self) -> Result<(), NetworkError> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		let discovery = state
			.discovery
			.clone()
			.ok_or_else(|| NetworkError::StartFailed("no peer discovery installed".to_string()))?;

		let max_connections = state.max_connections;
		let timeout = self.discovery_timeout;
		let candidates = self.candidates.clone();
		let network = self.network;
		let user_agent = self.user_agent.clone();

		state.task = Some(tokio::spawn(async move {
			let mut peers = discovery.get_peers(timeout).await;
			peers.shuffle(&mut rand::rng());
			peers.truncate(max_connections);
			for peer in &peers {
				info!("[{:?}] {} would connect to {}", network, user_agent, peer);
			}
			*candidates.lock().unwrap_or_else(PoisonError::into_inner) = peers;
		}));
		Ok(())
	}

	fn start_blockchain_download(&self, head: StoredHeader) {
		debug!(
			"Dry run: blockchain download would start at height {} ({})",
			head.height, head.hash
		);
	}

	fn broadcast_transaction(&self, tx: &Transaction) {
		info!("Dry run: not broadcasting transaction {}", tx.hash);
	}

	fn connected_peers(&self) -> Vec<PeerInfo> {
		Vec::new()
	}

	async fn stop(&self) {
		let task = self
			.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.task
			.take();
		if let Some(task) = task {
			task.abort();
			let _ = task.await;
		}
	}
}

pub struct DryRunPeerGroupFactory {
	discovery_timeout: Duration,
}

impl DryRunPeerGroupFactory {
	pub fn new(discovery_timeout: Duration) -> Self {
		Self { discovery_timeout }
	}
}

impl PeerGroupFactory for DryRunPeerGroupFactory {
	fn create(&self, network: NetworkId, user_agent: &str) -> Box<dyn PeerGroup> {
		Box::new(DryRunPeerGroup::new(
			network,
			user_agent,
			self.discovery_timeout,
		))
	}
}
