//! The service loop.
//!
//! Every event source (commands, device signals, peer callbacks, wallet
//! callbacks, throttle deadlines and the periodic tick) is funneled into one
//! `select!` loop, so the orchestrator only ever sees one event at a time.

use crate::chain::HeaderInfo;
use crate::config::ServiceConfig;
use crate::network::{PeerEvent, PeerInfo};
use crate::service::broadcaster::StatusBroadcaster;
use crate::service::environment::{EnvironmentSignal, EnvironmentWatcher};
use crate::service::idle::IdleDetector;
use crate::service::orchestrator::{ServiceDeps, SyncOrchestrator};
use crate::service::types::{
	ServiceEvent, ServiceIntent, ServiceRequest, StatusEvent, StopReason, SyncServiceError,
};
use crate::wallet::{Transaction, WalletEvent};

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

const COMMAND_CAPACITY: usize = 64;

pub struct SyncService {
	orchestrator: SyncOrchestrator,
	watcher: EnvironmentWatcher,
	idle: IdleDetector,
	events: mpsc::Receiver<ServiceEvent>,
	peer_events: mpsc::UnboundedReceiver<PeerEvent>,
	wallet_events: mpsc::UnboundedReceiver<WalletEvent>,
	tick_interval: Duration,
}

impl SyncService {
	/// Initializes the orchestrator and returns the service together with a
	/// handle for talking to it once it runs.
	pub async fn start(
		config: ServiceConfig,
		deps: ServiceDeps,
	) -> Result<(Self, SyncServiceHandle), SyncServiceError> {
		let (peer_tx, peer_events) = mpsc::unbounded_channel();
		let (wallet_tx, wallet_events) = mpsc::unbounded_channel();
		let (tx, events) = mpsc::channel(COMMAND_CAPACITY);

		let broadcaster = deps.broadcaster.clone();
		let idle = IdleDetector::new(config.idle_window, config.idle_timeout_ticks);
		let tick_interval = config.tick_interval();
		let orchestrator = SyncOrchestrator::initialize(config, deps, peer_tx, wallet_tx).await?;

		let service = Self {
			orchestrator,
			watcher: EnvironmentWatcher::new(),
			idle,
			events,
			peer_events,
			wallet_events,
			tick_interval,
		};
		Ok((service, SyncServiceHandle { tx, broadcaster }))
	}

	/// Runs until a stop trigger, then shuts the orchestrator down.
	pub async fn run(mut self) -> Result<StopReason, SyncServiceError> {
		let mut ticks =
			tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
		ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let reason = loop {
			let deadline = self.orchestrator.next_deadline();

			tokio::select! {
				biased;

				event = self.events.recv() => match event {
					Some(event) => {
						if let Some(reason) = self.handle_event(event).await {
							break reason;
						}
					}
					None => break StopReason::Shutdown,
				},
				Some(event) = self.peer_events.recv() => self.orchestrator.handle_peer_event(event),
				Some(event) = self.wallet_events.recv() => self.orchestrator.on_wallet_event(event),
				_ = sleep_until(deadline) => self.orchestrator.poll_throttled(Instant::now()),
				_ = ticks.tick() => {
					if self.idle.on_tick(self.orchestrator.best_height()) {
						info!("end of block download detected, stopping service");
						break StopReason::Idle;
					}
				}
			}
		};

		info!("sync service stopping ({:?})", reason);
		self.orchestrator.shutdown().await?;
		Ok(reason)
	}

	async fn handle_event(&mut self, event: ServiceEvent) -> Option<StopReason> {
		match event {
			ServiceEvent::Environment(signal) => {
				let state = self.watcher.apply(&signal);
				self.orchestrator.on_environment_changed(state).await;
				None
			}
			ServiceEvent::Intent(intent) => self.orchestrator.handle_intent(intent),
			ServiceEvent::Request(request) => {
				self.orchestrator.handle_request(request);
				None
			}
			ServiceEvent::LowMemory => {
				warn!("low memory detected, stopping service");
				Some(StopReason::LowMemory)
			}
			ServiceEvent::Shutdown => Some(StopReason::Shutdown),
		}
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

/// Cloneable front end of a running [`SyncService`].
#[derive(Clone)]
pub struct SyncServiceHandle {
	tx: mpsc::Sender<ServiceEvent>,
	broadcaster: StatusBroadcaster,
}

impl SyncServiceHandle {
	async fn send(&self, event: ServiceEvent) -> Result<(), SyncServiceError> {
		self.tx
			.send(event)
			.await
			.map_err(|_| SyncServiceError::ChannelClosed)
	}

	async fn request<T>(
		&self,
		build: impl FnOnce(oneshot::Sender<T>) -> ServiceRequest,
	) -> Result<T, SyncServiceError> {
		let (reply, response) = oneshot::channel();
		self.send(ServiceEvent::Request(build(reply))).await?;
		response.await.map_err(|_| SyncServiceError::ChannelClosed)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
		self.broadcaster.subscribe()
	}

	pub fn broadcaster(&self) -> &StatusBroadcaster {
		&self.broadcaster
	}

	pub async fn broadcast_transaction(&self, tx: Transaction) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Request(ServiceRequest::BroadcastTransaction(tx)))
			.await
	}

	/// `None` while the service has no peer session.
	pub async fn connected_peers(&self) -> Result<Option<Vec<PeerInfo>>, SyncServiceError> {
		self.request(ServiceRequest::ConnectedPeers).await
	}

	pub async fn recent_blocks(&self, max_count: usize) -> Result<Vec<HeaderInfo>, SyncServiceError> {
		self.request(|reply| ServiceRequest::RecentBlocks { max_count, reply })
			.await
	}

	pub async fn notify_widgets(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Request(ServiceRequest::NotifyWidgets))
			.await
	}

	pub async fn cancel_coins_received(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Intent(ServiceIntent::CancelCoinsReceived))
			.await
	}

	pub async fn hold_keep_alive(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Intent(ServiceIntent::HoldKeepAlive))
			.await
	}

	/// Plain start command; releases a held keep-alive lock.
	pub async fn start(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Intent(ServiceIntent::Start)).await
	}

	/// Stops the service and removes the chain store once it is down.
	pub async fn reset_blockchain(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Intent(ServiceIntent::ResetBlockchain))
			.await
	}

	pub async fn environment(&self, signal: EnvironmentSignal) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Environment(signal)).await
	}

	pub async fn low_memory(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::LowMemory).await
	}

	pub async fn shutdown(&self) -> Result<(), SyncServiceError> {
		self.send(ServiceEvent::Shutdown).await
	}
}
