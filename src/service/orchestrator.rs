//! Sync orchestrator.
//!
//! `SyncOrchestrator` owns the chain store, the peer session and the
//! collaborators the service publishes through. It is the single place that
//! decides whether networking runs. All of its methods are driven one at a
//! time by the service loop in [`runner`](crate::service::runner), so session
//! start and stop can never interleave.

use crate::chain::{AddOutcome, BlockChain, BlockHeader, ChainStore, HeaderInfo, copy_chain_snapshot};
use crate::config::{COIN_DECIMALS, ServiceConfig};
use crate::network::{
	CompositeDiscovery, PeerEvent, PeerGroupFactory, PeerInfo, PeerSession, SessionId,
	SessionSettings, TrustedPeer,
};
use crate::preferences::{Preferences, keys};
use crate::service::broadcaster::StatusBroadcaster;
use crate::service::environment::EnvironmentState;
use crate::service::notification::{AmountFormat, NotificationAggregator, PendingReceipts};
use crate::service::resources::ResourceGuard;
use crate::service::throttle::Debouncer;
use crate::service::types::{
	BlockchainState, ConnectivityNotification, PeerState, ServiceIntent, ServiceRequest,
	StatusEvent, StopReason, SyncServiceError, WidgetUpdate,
};
use crate::utils::format_signed_coin_amount;
use crate::wallet::{
	BalanceType, ConfidenceType, ListenerId, Transaction, Wallet, WalletEvent, WalletEventSender,
};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Collaborators handed to the orchestrator at startup.
pub struct ServiceDeps {
	pub wallet: Arc<dyn Wallet>,
	pub preferences: Preferences,
	pub peer_groups: Arc<dyn PeerGroupFactory>,
	pub resources: ResourceGuard,
	pub broadcaster: StatusBroadcaster,
}

pub struct SyncOrchestrator {
	config: ServiceConfig,
	chain: BlockChain,
	chain_file: PathBuf,
	wallet: Arc<dyn Wallet>,
	wallet_listener: Option<ListenerId>,
	preferences: Preferences,
	peer_groups: Arc<dyn PeerGroupFactory>,
	resources: ResourceGuard,
	broadcaster: StatusBroadcaster,

	environment: EnvironmentState,
	session: Option<PeerSession>,
	sessions_started: u64,
	peer_events: mpsc::UnboundedSender<PeerEvent>,
	peer_count: usize,
	best_height_ever: u32,

	state_throttle: Debouncer,
	widget_throttle: Debouncer,
	notifications: NotificationAggregator,
	reset_on_shutdown: bool,
}

impl SyncOrchestrator {
	/// Opens (or creates) the chain store and wires the chain to the wallet.
	///
	/// A missing store file means a first run or a reset: the wallet's
	/// transactions are cleared and the packaged snapshot, if any, is copied
	/// in. A store that cannot be opened is deleted and the error returned.
	pub async fn initialize(
		config: ServiceConfig,
		deps: ServiceDeps,
		peer_events: mpsc::UnboundedSender<PeerEvent>,
		wallet_events: WalletEventSender,
	) -> Result<Self, SyncServiceError> {
		let ServiceDeps {
			wallet,
			preferences,
			peer_groups,
			resources,
			broadcaster,
		} = deps;

		let best_height_ever =
			u32::try_from(preferences.get_int(keys::BEST_CHAIN_HEIGHT_EVER, 0)).unwrap_or(0);

		broadcaster.publish(StatusEvent::Peers(PeerState::default()));

		tokio::fs::create_dir_all(&config.data_dir).await?;
		let chain_file = config.chain_file_path();

		if !tokio::fs::try_exists(&chain_file).await? {
			info!("blockchain does not exist, resetting wallet");
			wallet.clear_transactions(0);

			if let Some(snapshot) = &config.snapshot_path {
				if let Err(e) = copy_chain_snapshot(snapshot, &chain_file).await {
					debug!("no snapshot seed: {}", e);
				}
			}
		}

		let genesis = config.network.genesis_header();
		let store = match ChainStore::open(&chain_file, config.store_capacity, &genesis) {
			Ok(store) => store,
			Err(e) => {
				error!("chain store {:?} cannot be opened: {}", chain_file, e);
				if let Err(remove) = tokio::fs::remove_file(&chain_file).await {
					warn!("failed to remove chain store {:?}: {}", chain_file, remove);
				}
				return Err(SyncServiceError::StoreCorrupt(e));
			}
		};

		let chain = BlockChain::new(store, wallet.clone())
			.map_err(|e| SyncServiceError::ChainInit(e.to_string()))?;

		let wallet_listener = Some(wallet.add_event_listener(wallet_events));

		Ok(Self {
			state_throttle: Debouncer::new(config.state_broadcast_throttle()),
			widget_throttle: Debouncer::new(config.widget_throttle()),
			config,
			chain,
			chain_file,
			wallet,
			wallet_listener,
			preferences,
			peer_groups,
			resources,
			broadcaster,
			environment: EnvironmentState::default(),
			session: None,
			sessions_started: 0,
			peer_events,
			peer_count: 0,
			best_height_ever,
			notifications: NotificationAggregator::new(),
			reset_on_shutdown: false,
		})
	}

	pub fn has_session(&self) -> bool {
		self.session.is_some()
	}

	pub fn session_id(&self) -> Option<SessionId> {
		self.session.as_ref().map(PeerSession::id)
	}

	pub fn environment(&self) -> EnvironmentState {
		self.environment
	}

	pub fn best_height(&self) -> u32 {
		self.chain.best_height()
	}

	pub fn best_height_ever(&self) -> u32 {
		self.best_height_ever
	}

	pub fn is_replaying(&self) -> bool {
		self.chain.best_height() < self.best_height_ever
	}

	pub fn peer_count(&self) -> usize {
		self.peer_count
	}

	pub fn pending_receipts(&self) -> PendingReceipts {
		self.notifications.snapshot()
	}

	pub fn reset_requested(&self) -> bool {
		self.reset_on_shutdown
	}

	/// Reconciles the peer session with the environment and publishes the
	/// resulting chain state immediately.
	pub async fn on_environment_changed(&mut self, state: EnvironmentState) {
		self.environment = state;
		let has_everything = state.has_everything();

		if has_everything && self.session.is_none() {
			self.start_session().await;
		} else if !has_everything && self.session.is_some() {
			self.stop_session().await;
		}

		self.publish_blockchain_state();
		self.state_throttle.record_fire(Instant::now());
	}

	async fn start_session(&mut self) {
		self.resources.acquire_wake_lock();

		self.sessions_started += 1;
		let id = SessionId(self.sessions_started);
		let settings = self.session_settings();

		info!("starting peergroup");
		match PeerSession::start(
			self.peer_groups.as_ref(),
			id,
			self.wallet.clone(),
			settings,
			self.peer_events.clone(),
			*self.chain.chain_head(),
		)
		.await
		{
			Ok(session) => self.session = Some(session),
			Err(e) => {
				warn!("peergroup could not be started: {}", e);
				self.resources.release_wake_lock();
			}
		}
	}

	async fn stop_session(&mut self) {
		let Some(session) = self.session.take() else {
			return;
		};
		info!("stopping peergroup");
		session.stop().await;

		self.resources.release_wake_lock();
		self.on_peer_count_changed(0);
	}

	fn session_settings(&self) -> SessionSettings {
		let network = self.config.network;
		let host = self.preferences.get_string(keys::TRUSTED_PEER, "");
		let trusted = (!host.is_empty()).then(|| TrustedPeer {
			host,
			port: u16::try_from(
				self.preferences
					.get_int(keys::TRUSTED_PEER_PORT, i64::from(network.port())),
			)
			.unwrap_or(network.port()),
		});
		let trusted_only =
			trusted.is_some() && self.preferences.get_bool(keys::TRUSTED_PEER_ONLY, false);
		let max_connected_peers = self.config.max_connected_peers;

		SessionSettings {
			network,
			user_agent: self.config.user_agent.clone(),
			max_connections: if trusted_only { 1 } else { max_connected_peers },
			discovery: CompositeDiscovery::new(
				trusted,
				trusted_only,
				self.config.general_discovery(),
				max_connected_peers,
			),
		}
	}

	/// Handles a callback from the peer group. Events stamped with anything
	/// but the live session are dropped.
	pub fn handle_peer_event(&mut self, event: PeerEvent) {
		if self.session_id() != Some(event.session()) {
			debug!("ignoring event from stale session {}", event.session().0);
			return;
		}

		match event {
			PeerEvent::Connected {
				peer, peer_count, ..
			} => {
				debug!("peer connected: {} ({} total)", peer.addr, peer_count);
				self.on_peer_count_changed(peer_count);
			}
			PeerEvent::Disconnected {
				addr, peer_count, ..
			} => {
				debug!("peer disconnected: {} ({} total)", addr, peer_count);
				self.on_peer_count_changed(peer_count);
			}
			PeerEvent::BlocksDownloaded {
				header,
				blocks_left,
				..
			} => self.on_blocks_downloaded(header, blocks_left),
		}
	}

	fn on_peer_count_changed(&mut self, num_peers: usize) {
		self.peer_count = num_peers;

		let enabled = self
			.preferences
			.get_bool(keys::CONNECTIVITY_NOTIFICATION, true);
		let notification = (enabled && num_peers > 0).then(|| ConnectivityNotification::new(num_peers));
		self.broadcaster
			.publish(StatusEvent::Connectivity(notification));
		self.broadcaster
			.publish(StatusEvent::Peers(PeerState { num_peers }));
	}

	/// Connects a downloaded header and schedules a throttled state broadcast.
	pub fn on_blocks_downloaded(&mut self, header: BlockHeader, blocks_left: u32) {
		match self.chain.add(header) {
			Ok(AddOutcome::Orphan) => debug!("orphan header {} dropped", header.hash()),
			Ok(_) => {}
			Err(e) => warn!("failed to connect header {}: {}", header.hash(), e),
		}

		let height = self.chain.best_height();
		if height > self.best_height_ever {
			self.best_height_ever = height;
		}
		trace!("chain at {}, {} blocks left", height, blocks_left);

		self.state_throttle.schedule(Instant::now());
	}

	pub fn on_wallet_event(&mut self, event: WalletEvent) {
		match event {
			WalletEvent::CoinsReceived {
				tx_hash,
				from,
				amount,
				confidence,
			} => {
				debug!(
					"coins received in {}: {}",
					tx_hash,
					format_signed_coin_amount(amount, COIN_DECIMALS, COIN_DECIMALS)
				);
				let taken = self.notifications.on_incoming(
					from.as_ref(),
					amount,
					confidence == ConfidenceType::Building,
					self.is_replaying(),
				);
				if taken {
					let rendered = self.notifications.render(&self.amount_format());
					self.broadcaster
						.publish(StatusEvent::CoinsReceived(rendered));
				}
			}
			WalletEvent::Changed => self.widget_throttle.schedule(Instant::now()),
		}
	}

	fn amount_format(&self) -> AmountFormat {
		let precision = self
			.preferences
			.get_int(keys::LTC_PRECISION, i64::from(COIN_DECIMALS))
			.clamp(0, i64::from(COIN_DECIMALS));
		AmountFormat {
			precision: u32::try_from(precision).unwrap_or(COIN_DECIMALS),
			suffix: self.config.network.display_suffix().to_string(),
		}
	}

	/// Earliest pending throttled emission.
	pub fn next_deadline(&self) -> Option<Instant> {
		match (self.state_throttle.deadline(), self.widget_throttle.deadline()) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(a, b) => a.or(b),
		}
	}

	/// Fires whichever throttled emissions are due at `now`.
	pub fn poll_throttled(&mut self, now: Instant) {
		if self.state_throttle.poll_due(now) {
			self.publish_blockchain_state();
		}
		if self.widget_throttle.poll_due(now) {
			self.notify_widgets();
		}
	}

	pub fn blockchain_state(&self) -> BlockchainState {
		let head = self.chain.chain_head();
		BlockchainState {
			chain_date: head.timestamp(),
			chain_height: head.height,
			replaying: head.height < self.best_height_ever,
			download: self.environment.download_status(),
		}
	}

	fn publish_blockchain_state(&self) {
		let state = self.blockchain_state();
		debug!(
			"blockchain state: height {} at {}, replaying {}, download {}",
			state.chain_height, state.chain_date, state.replaying, state.download
		);
		self.broadcaster.publish(StatusEvent::Blockchain(state));
	}

	/// Applies an inbound command. Returns a stop reason when the service
	/// should wind down.
	pub fn handle_intent(&mut self, intent: ServiceIntent) -> Option<StopReason> {
		if intent == ServiceIntent::CancelCoinsReceived {
			self.cancel_coins_received();
		}

		if intent == ServiceIntent::HoldKeepAlive {
			self.resources.hold_keep_alive();
		} else {
			self.resources.release_keep_alive();
		}

		if intent == ServiceIntent::ResetBlockchain {
			self.request_reset();
			return Some(StopReason::Reset);
		}
		None
	}

	pub fn handle_request(&mut self, request: ServiceRequest) {
		match request {
			ServiceRequest::BroadcastTransaction(tx) => {
				self.broadcast_transaction(&tx);
			}
			ServiceRequest::ConnectedPeers(reply) => {
				let _ = reply.send(self.connected_peers());
			}
			ServiceRequest::RecentBlocks { max_count, reply } => {
				let _ = reply.send(self.recent_blocks(max_count));
			}
			ServiceRequest::NotifyWidgets => self.notify_widgets(),
		}
	}

	/// Marks the chain store for deletion once the service has shut down.
	pub fn request_reset(&mut self) {
		info!("blockchain reset requested, store will be removed on shutdown");
		self.reset_on_shutdown = true;
	}

	pub fn cancel_coins_received(&mut self) {
		self.notifications.clear();
		self.broadcaster.publish(StatusEvent::CoinsReceived(None));
	}

	/// Hands the transaction to the live session. Returns `false` when there
	/// is none.
	pub fn broadcast_transaction(&self, tx: &Transaction) -> bool {
		match &self.session {
			Some(session) => {
				info!("broadcasting transaction {}", tx.hash);
				session.broadcast_transaction(tx);
				true
			}
			None => {
				warn!("no peergroup, transaction {} not broadcast", tx.hash);
				false
			}
		}
	}

	/// `None` while no session exists.
	pub fn connected_peers(&self) -> Option<Vec<PeerInfo>> {
		self.session.as_ref().map(PeerSession::connected_peers)
	}

	pub fn recent_blocks(&self, max_count: usize) -> Vec<HeaderInfo> {
		self.chain
			.recent_headers(max_count)
			.iter()
			.map(HeaderInfo::from)
			.collect()
	}

	pub fn notify_widgets(&self) {
		let estimated_balance = self.wallet.balance(BalanceType::Estimated);
		self.broadcaster
			.publish(StatusEvent::Widgets(WidgetUpdate { estimated_balance }));
	}

	/// Tears everything down in order and closes the chain store.
	///
	/// Locks are released and the wallet saved even when closing the store
	/// fails; the close error is returned afterwards.
	pub async fn shutdown(mut self) -> Result<(), SyncServiceError> {
		info!("shutting down sync service");

		if let Some(id) = self.wallet_listener.take() {
			self.wallet.remove_event_listener(id);
		}

		if let Some(session) = self.session.take() {
			session.stop().await;
			info!("peergroup stopped");
		}

		self.broadcaster.publish(StatusEvent::Connectivity(None));
		self.broadcaster.remove_sticky();

		self.preferences
			.put_int(keys::BEST_CHAIN_HEIGHT_EVER, i64::from(self.best_height_ever));
		if let Err(e) = self.preferences.commit().await {
			warn!("failed to persist preferences: {}", e);
		}

		self.state_throttle.cancel();
		self.widget_throttle.cancel();

		let closed = self.chain.close();
		if let Err(e) = &closed {
			error!("failed to close chain store: {}", e);
		}

		if let Err(e) = self.wallet.save() {
			warn!("failed to save wallet: {}", e);
		}

		self.resources.release_all();

		if self.reset_on_shutdown {
			info!("removing blockchain {:?}", self.chain_file);
			if let Err(e) = tokio::fs::remove_file(&self.chain_file).await {
				warn!("failed to remove {:?}: {}", self.chain_file, e);
			}
		}

		closed.map_err(SyncServiceError::StoreClose)
	}
}
