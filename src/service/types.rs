use crate::chain::{ChainStoreError, HeaderInfo};
use crate::network::{NetworkError, PeerInfo};
use crate::preferences::PreferencesError;
use crate::service::environment::EnvironmentSignal;
use crate::wallet::Transaction;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Download problems reported alongside the chain state, one bit per cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadStatus(u8);

impl DownloadStatus {
	pub const OK: DownloadStatus = DownloadStatus(0);
	pub const NETWORK_PROBLEM: DownloadStatus = DownloadStatus(1);
	pub const POWER_PROBLEM: DownloadStatus = DownloadStatus(2);
	pub const STORAGE_PROBLEM: DownloadStatus = DownloadStatus(4);

	pub fn bits(&self) -> u8 {
		self.0
	}

	pub fn is_ok(&self) -> bool {
		self.0 == 0
	}

	pub fn contains(&self, other: DownloadStatus) -> bool {
		self.0 & other.0 == other.0
	}
}

impl std::ops::BitOr for DownloadStatus {
	type Output = DownloadStatus;

	fn bitor(self, rhs: Self) -> Self::Output {
		DownloadStatus(self.0 | rhs.0)
	}
}

impl std::ops::BitOrAssign for DownloadStatus {
	fn bitor_assign(&mut self, rhs: Self) {
		self.0 |= rhs.0;
	}
}

impl fmt::Display for DownloadStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_ok() {
			return f.write_str("ok");
		}
		let mut parts = Vec::new();
		if self.contains(Self::NETWORK_PROBLEM) {
			parts.push("network");
		}
		if self.contains(Self::POWER_PROBLEM) {
			parts.push("power");
		}
		if self.contains(Self::STORAGE_PROBLEM) {
			parts.push("storage");
		}
		write!(f, "{} problem", parts.join("+"))
	}
}

/// Snapshot of the local chain as published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainState {
	pub chain_date: DateTime<Utc>,
	pub chain_height: u32,
	/// The chain is behind the best height ever seen.
	pub replaying: bool,
	pub download: DownloadStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
	pub num_peers: usize,
}

/// Ongoing "connected to N peers" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityNotification {
	pub num_peers: usize,
	pub icon_level: usize,
}

impl ConnectivityNotification {
	pub fn new(num_peers: usize) -> Self {
		Self {
			num_peers,
			icon_level: num_peers.min(4),
		}
	}
}

/// Rendered summary of payments received since the last acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinsReceivedNotification {
	/// The latest single amount.
	pub ticker: String,
	/// The accumulated amount.
	pub title: String,
	pub text: String,
	/// Badge number; zero while only one payment is pending.
	pub number: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetUpdate {
	pub estimated_balance: u64,
}

/// Everything the service publishes to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
	Peers(PeerState),
	Blockchain(BlockchainState),
	/// `None` cancels the notification.
	Connectivity(Option<ConnectivityNotification>),
	/// `None` cancels the notification.
	CoinsReceived(Option<CoinsReceivedNotification>),
	Widgets(WidgetUpdate),
}

/// Fire-and-forget commands. Every intent other than `HoldKeepAlive`
/// releases the network keep-alive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceIntent {
	CancelCoinsReceived,
	HoldKeepAlive,
	ResetBlockchain,
	Start,
}

/// Queries and actions that go through the running orchestrator.
#[derive(Debug)]
pub enum ServiceRequest {
	BroadcastTransaction(Transaction),
	/// Answered with `None` while no peer session exists.
	ConnectedPeers(oneshot::Sender<Option<Vec<PeerInfo>>>),
	RecentBlocks {
		max_count: usize,
		reply: oneshot::Sender<Vec<HeaderInfo>>,
	},
	NotifyWidgets,
}

/// Inbound message to the service loop.
#[derive(Debug)]
pub enum ServiceEvent {
	Environment(EnvironmentSignal),
	Intent(ServiceIntent),
	Request(ServiceRequest),
	LowMemory,
	Shutdown,
}

/// Why the service loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
	Idle,
	Reset,
	LowMemory,
	Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncServiceError {
	#[error("Chain store is corrupt and was removed: {0}")]
	StoreCorrupt(#[source] ChainStoreError),

	#[error("Chain cannot be created: {0}")]
	ChainInit(String),

	#[error("Failed to close chain store: {0}")]
	StoreClose(#[source] ChainStoreError),

	#[error("Preferences error: {0}")]
	Preferences(#[from] PreferencesError),

	#[error("Network error: {0}")]
	Network(#[from] NetworkError),

	#[error("Service channel closed")]
	ChannelClosed,

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
