#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

use wallet_chain_sync::chain::{BlockHash, BlockHeader, StoredHeader};
use wallet_chain_sync::config::{NetworkId, ServiceConfig};
use wallet_chain_sync::network::{
	CompositeDiscovery, NetworkError, PeerEvent, PeerEventSender, PeerGroup, PeerGroupFactory,
	PeerInfo,
};
use wallet_chain_sync::preferences::{MemoryPreferencesRepository, Preferences};
use wallet_chain_sync::service::{
	ProcessLock, ResourceGuard, ServiceDeps, StatusBroadcaster, StatusEvent, SyncOrchestrator,
};
use wallet_chain_sync::wallet::{MemoryWallet, Transaction, TxHash, Wallet, WalletEvent};

/// What every recording peer group did, shared across groups of one factory.
#[derive(Default)]
pub struct GroupLog {
	pub created: usize,
	pub live: usize,
	pub max_live: usize,
	pub listeners: Vec<PeerEventSender>,
	pub max_connections: Vec<usize>,
	pub discoveries: Vec<Arc<CompositeDiscovery>>,
	pub downloads_from: Vec<StoredHeader>,
	pub broadcasts: Vec<TxHash>,
	pub wallets_attached: usize,
}

#[derive(Clone, Default)]
pub struct RecordingFactory {
	pub log: Arc<Mutex<GroupLog>>,
	pub fail_start: Arc<Mutex<bool>>,
}

impl RecordingFactory {
	pub fn log(&self) -> std::sync::MutexGuard<'_, GroupLog> {
		self.log.lock().unwrap()
	}

	pub fn last_listener(&self) -> PeerEventSender {
		self.log().listeners.last().cloned().unwrap()
	}
}

impl PeerGroupFactory for RecordingFactory {
	fn create(&self, _network: NetworkId, _user_agent: &str) -> Box<dyn PeerGroup> {
		self.log().created += 1;
		Box::new(RecordingPeerGroup {
			log: self.log.clone(),
			fail_start: *self.fail_start.lock().unwrap(),
			started: Mutex::new(false),
		})
	}
}

pub struct RecordingPeerGroup {
	log: Arc<Mutex<GroupLog>>,
	fail_start: bool,
	started: Mutex<bool>,
}

#[async_trait::async_trait]
impl PeerGroup for RecordingPeerGroup {
	fn add_wallet(&self, _wallet: Arc<dyn Wallet>) {
		self.log.lock().unwrap().wallets_attached += 1;
	}

	fn remove_wallet(&self, _wallet: &Arc<dyn Wallet>) {
		self.log.lock().unwrap().wallets_attached -= 1;
	}

	fn add_event_listener(&self, listener: PeerEventSender) {
		self.log.lock().unwrap().listeners.push(listener);
	}

	fn remove_event_listener(&self) {}

	fn set_max_connections(&self, max: usize) {
		self.log.lock().unwrap().max_connections.push(max);
	}

	fn add_peer_discovery(&self, discovery: Arc<CompositeDiscovery>) {
		self.log.lock().unwrap().discoveries.push(discovery);
	}

	async fn start(&self) -> Result<(), NetworkError> {
		if self.fail_start {
			return Err(NetworkError::StartFailed("refused by test".to_string()));
		}
		*self.started.lock().unwrap() = true;
		let mut log = self.log.lock().unwrap();
		log.live += 1;
		log.max_live = log.max_live.max(log.live);
		Ok(())
	}

	fn start_blockchain_download(&self, head: StoredHeader) {
		self.log.lock().unwrap().downloads_from.push(head);
	}

	fn broadcast_transaction(&self, tx: &Transaction) {
		self.log.lock().unwrap().broadcasts.push(tx.hash);
	}

	fn connected_peers(&self) -> Vec<PeerInfo> {
		vec![PeerInfo {
			addr: peer_addr(1),
			user_agent: Some("/test:0.1/".to_string()),
			best_height: 10,
			ping_ms: Some(20),
		}]
	}

	async fn stop(&self) {
		let mut started = self.started.lock().unwrap();
		if *started {
			*started = false;
			self.log.lock().unwrap().live -= 1;
		}
	}
}

pub fn peer_addr(last: u8) -> SocketAddr {
	SocketAddr::from(([127, 0, 0, last], 9333))
}

pub fn test_config(dir: &TempDir) -> ServiceConfig {
	ServiceConfig {
		network: NetworkId::MainNet,
		data_dir: dir.path().to_path_buf(),
		store_capacity: 100,
		fixed_peers: vec![peer_addr(1), peer_addr(2)],
		..ServiceConfig::default()
	}
}

/// Headers extending `parent`, one per call of the iterator.
pub fn headers_after(parent: &BlockHeader, count: usize) -> Vec<BlockHeader> {
	let mut headers = Vec::with_capacity(count);
	let mut prev = *parent;
	for n in 0..count {
		let header = BlockHeader {
			version: 1,
			prev_block: prev.hash(),
			merkle_root: BlockHash([n as u8 + 1; 32]),
			time: prev.time + 150,
			bits: prev.bits,
			nonce: n as u32,
		};
		headers.push(header);
		prev = header;
	}
	headers
}

pub struct Harness {
	pub dir: TempDir,
	pub config: ServiceConfig,
	pub wallet: Arc<MemoryWallet>,
	pub groups: RecordingFactory,
	pub prefs: MemoryPreferencesRepository,
	pub broadcaster: StatusBroadcaster,
	pub wake: Arc<ProcessLock>,
	pub keep_alive: Arc<ProcessLock>,
	pub status: broadcast::Receiver<StatusEvent>,
	pub peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
	pub wallet_rx: mpsc::UnboundedReceiver<WalletEvent>,
}

impl Harness {
	pub fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		let config = test_config(&dir);
		Self::with(dir, config, MemoryPreferencesRepository::new())
	}

	pub fn with(dir: TempDir, config: ServiceConfig, prefs: MemoryPreferencesRepository) -> Self {
		let broadcaster = StatusBroadcaster::new();
		let status = broadcaster.subscribe();
		let (_, peer_rx) = mpsc::unbounded_channel();
		let (_, wallet_rx) = mpsc::unbounded_channel();
		Self {
			dir,
			config,
			wallet: Arc::new(MemoryWallet::new()),
			groups: RecordingFactory::default(),
			prefs,
			broadcaster,
			wake: Arc::new(ProcessLock::new("wake")),
			keep_alive: Arc::new(ProcessLock::new("keep-alive")),
			status,
			peer_rx,
			wallet_rx,
		}
	}

	pub fn chain_file(&self) -> PathBuf {
		self.config.chain_file_path()
	}

	pub async fn deps(&self) -> ServiceDeps {
		ServiceDeps {
			wallet: self.wallet.clone(),
			preferences: Preferences::open(Arc::new(self.prefs.clone())).await.unwrap(),
			peer_groups: Arc::new(self.groups.clone()),
			resources: ResourceGuard::new(self.wake.clone(), self.keep_alive.clone()),
			broadcaster: self.broadcaster.clone(),
		}
	}

	/// Initializes an orchestrator wired to this harness' channels.
	pub async fn orchestrator(&mut self) -> SyncOrchestrator {
		self.try_orchestrator().await.unwrap()
	}

	pub async fn try_orchestrator(
		&mut self,
	) -> Result<SyncOrchestrator, wallet_chain_sync::service::SyncServiceError> {
		let (peer_tx, peer_rx) = mpsc::unbounded_channel();
		let (wallet_tx, wallet_rx) = mpsc::unbounded_channel();
		self.peer_rx = peer_rx;
		self.wallet_rx = wallet_rx;
		let deps = self.deps().await;
		SyncOrchestrator::initialize(self.config.clone(), deps, peer_tx, wallet_tx).await
	}

	/// Status events published so far.
	pub fn drain_status(&mut self) -> Vec<StatusEvent> {
		let mut events = Vec::new();
		while let Ok(event) = self.status.try_recv() {
			events.push(event);
		}
		events
	}

	pub fn drain_blockchain_heights(&mut self) -> Vec<u32> {
		self.drain_status()
			.into_iter()
			.filter_map(|event| match event {
				StatusEvent::Blockchain(state) => Some(state.chain_height),
				_ => None,
			})
			.collect()
	}
}
