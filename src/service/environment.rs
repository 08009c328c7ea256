use crate::service::types::DownloadStatus;

use tracing::info;

/// Device broadcast relevant to syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentSignal {
	Connectivity {
		connected: bool,
		reason: Option<String>,
	},
	Battery {
		level: u32,
		scale: u32,
		plugged: bool,
	},
	StorageLow,
	StorageOk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentState {
	pub connectivity: bool,
	pub power: bool,
	pub storage_ok: bool,
}

impl EnvironmentState {
	pub const EVERYTHING: EnvironmentState = EnvironmentState {
		connectivity: true,
		power: true,
		storage_ok: true,
	};

	pub fn has_everything(&self) -> bool {
		self.connectivity && self.power && self.storage_ok
	}

	pub fn download_status(&self) -> DownloadStatus {
		let mut status = DownloadStatus::OK;
		if !self.connectivity {
			status |= DownloadStatus::NETWORK_PROBLEM;
		}
		if !self.power {
			status |= DownloadStatus::POWER_PROBLEM;
		}
		if !self.storage_ok {
			status |= DownloadStatus::STORAGE_PROBLEM;
		}
		status
	}
}

impl Default for EnvironmentState {
	/// Nothing is known about connectivity or power yet; storage is assumed fine.
	fn default() -> Self {
		Self {
			connectivity: false,
			power: false,
			storage_ok: true,
		}
	}
}

/// Folds device broadcasts into an [`EnvironmentState`].
#[derive(Debug, Default)]
pub struct EnvironmentWatcher {
	state: EnvironmentState,
}

impl EnvironmentWatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> EnvironmentState {
		self.state
	}

	/// Applies a signal and returns the resulting state.
	pub fn apply(&mut self, signal: &EnvironmentSignal) -> EnvironmentState {
		match signal {
			EnvironmentSignal::Connectivity { connected, reason } => {
				self.state.connectivity = *connected;
				match reason {
					Some(reason) => info!(
						"network is {}: {}",
						if *connected { "up" } else { "down" },
						reason
					),
					None => info!("network is {}", if *connected { "up" } else { "down" }),
				}
			}
			EnvironmentSignal::Battery {
				level,
				scale,
				plugged,
			} => {
				self.state.power = *plugged || *level > *scale / 10;
				info!(
					"battery changed: level={}/{} plugged={}",
					level, scale, plugged
				);
			}
			EnvironmentSignal::StorageLow => {
				self.state.storage_ok = false;
				info!("device storage low");
			}
			EnvironmentSignal::StorageOk => {
				self.state.storage_ok = true;
				info!("device storage ok");
			}
		}
		self.state
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn battery(level: u32, plugged: bool) -> EnvironmentSignal {
		EnvironmentSignal::Battery {
			level,
			scale: 100,
			plugged,
		}
	}

	#[test]
	fn starts_with_storage_assumed_ok() {
		let watcher = EnvironmentWatcher::new();
		assert_eq!(
			watcher.state().download_status(),
			DownloadStatus::NETWORK_PROBLEM | DownloadStatus::POWER_PROBLEM
		);
	}

	#[test]
	fn power_needs_plug_or_more_than_a_tenth_of_charge() {
		let mut watcher = EnvironmentWatcher::new();
		assert!(!watcher.apply(&battery(10, false)).power);
		assert!(watcher.apply(&battery(11, false)).power);
		assert!(watcher.apply(&battery(0, true)).power);
	}

	#[test]
	fn storage_latches_until_ok() {
		let mut watcher = EnvironmentWatcher::new();
		watcher.apply(&EnvironmentSignal::Connectivity {
			connected: true,
			reason: None,
		});
		watcher.apply(&battery(80, false));
		assert!(watcher.state().has_everything());

		watcher.apply(&EnvironmentSignal::StorageLow);
		assert!(!watcher.apply(&battery(90, true)).has_everything());
		assert_eq!(
			watcher.state().download_status(),
			DownloadStatus::STORAGE_PROBLEM
		);

		assert!(watcher.apply(&EnvironmentSignal::StorageOk).has_everything());
	}
}
