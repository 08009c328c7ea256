//! Persistent user preferences.
//!
//! A flat key/value map with typed accessors, loaded once and written back on
//! [`Preferences::commit`]. Storage is delegated to a [`PreferencesRepository`].

pub mod repository;

pub use repository::{FilePreferencesRepository, MemoryPreferencesRepository, PreferencesRepository};

use serde_json::{Map, Value};
use std::sync::Arc;

/// Preference keys read or written by the service.
pub mod keys {
	pub const TRUSTED_PEER: &str = "trusted_peer";
	pub const TRUSTED_PEER_PORT: &str = "trusted_peer_port";
	pub const TRUSTED_PEER_ONLY: &str = "trusted_peer_only";
	pub const BEST_CHAIN_HEIGHT_EVER: &str = "best_chain_height_ever";
	pub const CONNECTIVITY_NOTIFICATION: &str = "connectivity_notification";
	pub const LTC_PRECISION: &str = "ltc_precision";
}

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub struct Preferences {
	values: Map<String, Value>,
	repository: Arc<dyn PreferencesRepository>,
	dirty: bool,
}

impl Preferences {
	pub async fn open(repository: Arc<dyn PreferencesRepository>) -> Result<Self, PreferencesError> {
		let values = repository.load().await?;
		Ok(Self {
			values,
			repository,
			dirty: false,
		})
	}

	/// String values are returned trimmed; numbers and booleans are not coerced.
	pub fn get_string(&self, key: &str, default: &str) -> String {
		match self.values.get(key) {
			Some(Value::String(value)) => value.trim().to_string(),
			_ => default.to_string(),
		}
	}

	/// Accepts both numbers and numeric strings.
	pub fn get_int(&self, key: &str, default: i64) -> i64 {
		match self.values.get(key) {
			Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
			Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
			_ => default,
		}
	}

	pub fn get_bool(&self, key: &str, default: bool) -> bool {
		match self.values.get(key) {
			Some(Value::Bool(value)) => *value,
			_ => default,
		}
	}

	pub fn put_string(&mut self, key: &str, value: &str) {
		self.put(key, Value::String(value.to_string()));
	}

	pub fn put_int(&mut self, key: &str, value: i64) {
		self.put(key, Value::from(value));
	}

	pub fn put_bool(&mut self, key: &str, value: bool) {
		self.put(key, Value::Bool(value));
	}

	fn put(&mut self, key: &str, value: Value) {
		if self.values.get(key) != Some(&value) {
			self.values.insert(key.to_string(), value);
			self.dirty = true;
		}
	}

	/// Writes pending changes; a no-op when nothing changed.
	pub async fn commit(&mut self) -> Result<(), PreferencesError> {
		if !self.dirty {
			return Ok(());
		}
		self.repository.save(&self.values).await?;
		self.dirty = false;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn typed_accessors_fall_back_to_defaults() {
		let repository = MemoryPreferencesRepository::new();
		let mut prefs = Preferences::open(Arc::new(repository.clone())).await.unwrap();

		assert_eq!(prefs.get_string(keys::TRUSTED_PEER, ""), "");
		assert_eq!(prefs.get_int(keys::BEST_CHAIN_HEIGHT_EVER, 0), 0);
		assert!(prefs.get_bool(keys::CONNECTIVITY_NOTIFICATION, true));

		prefs.put_string(keys::TRUSTED_PEER, "  node.example.org ");
		prefs.put_string(keys::TRUSTED_PEER_PORT, "19333");
		prefs.put_int(keys::BEST_CHAIN_HEIGHT_EVER, 420);
		assert_eq!(prefs.get_string(keys::TRUSTED_PEER, ""), "node.example.org");
		assert_eq!(prefs.get_int(keys::TRUSTED_PEER_PORT, 0), 19333);
		assert!(repository.snapshot().is_empty());

		prefs.commit().await.unwrap();
		assert_eq!(repository.snapshot().len(), 3);
	}

	#[tokio::test]
	async fn file_repository_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let repository = Arc::new(FilePreferencesRepository::new(dir.path().join("prefs.json")));

		let mut prefs = Preferences::open(repository.clone()).await.unwrap();
		prefs.put_bool(keys::TRUSTED_PEER_ONLY, true);
		prefs.put_int(keys::BEST_CHAIN_HEIGHT_EVER, 1234);
		prefs.commit().await.unwrap();

		let reopened = Preferences::open(repository).await.unwrap();
		assert!(reopened.get_bool(keys::TRUSTED_PEER_ONLY, false));
		assert_eq!(reopened.get_int(keys::BEST_CHAIN_HEIGHT_EVER, 0), 1234);
	}
}
