use crate::preferences::PreferencesError;

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Backing storage for [`Preferences`](crate::preferences::Preferences).
#[async_trait::async_trait]
pub trait PreferencesRepository: Send + Sync {
	async fn load(&self) -> Result<Map<String, Value>, PreferencesError>;
	async fn save(&self, values: &Map<String, Value>) -> Result<(), PreferencesError>;
}

/// File-based implementation of PreferencesRepository
pub struct FilePreferencesRepository {
	path: PathBuf,
}

impl FilePreferencesRepository {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}
}

#[async_trait::async_trait]
impl PreferencesRepository for FilePreferencesRepository {
	async fn load(&self) -> Result<Map<String, Value>, PreferencesError> {
		let content = match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No preferences at {:?}, starting empty", self.path);
				return Ok(Map::new());
			}
			Err(e) => return Err(PreferencesError::Io(e)),
		};

		let values: Map<String, Value> = serde_json::from_str(&content)?;
		debug!("Loaded {} preferences from {:?}", values.len(), self.path);
		Ok(values)
	}

	async fn save(&self, values: &Map<String, Value>) -> Result<(), PreferencesError> {
		let content = serde_json::to_string_pretty(values)?;

		// Write to a sibling file first so a crash never leaves half a file behind.
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, content).await?;
		tokio::fs::rename(&tmp, &self.path).await?;

		info!("Saved {} preferences to {:?}", values.len(), self.path);
		Ok(())
	}
}

/// In-memory repository; clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryPreferencesRepository {
	values: Arc<Mutex<Map<String, Value>>>,
}

impl MemoryPreferencesRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> Map<String, Value> {
		self.values
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

#[async_trait::async_trait]
impl PreferencesRepository for MemoryPreferencesRepository {
	async fn load(&self) -> Result<Map<String, Value>, PreferencesError> {
		Ok(self.snapshot())
	}

	async fn save(&self, values: &Map<String, Value>) -> Result<(), PreferencesError> {
		*self.values.lock().unwrap_or_else(PoisonError::into_inner) = values.clone();
		Ok(())
	}
}
