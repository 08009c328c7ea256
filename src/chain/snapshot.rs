use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("Failed to copy chain snapshot {source_path:?}: {source}")]
pub struct SnapshotCopyError {
	pub source_path: PathBuf,
	#[source]
	pub source: std::io::Error,
}

/// Seeds a fresh chain file from a pre-packaged snapshot.
///
/// On failure any partially written target is removed so the store is created
/// from genesis instead.
pub async fn copy_chain_snapshot(snapshot: &Path, target: &Path) -> Result<u64, SnapshotCopyError> {
	let started = Instant::now();
	info!("Copying chain snapshot {:?}", snapshot);

	match tokio::fs::copy(snapshot, target).await {
		Ok(bytes) => {
			info!(
				"Finished copying {} bytes, took {} ms",
				bytes,
				started.elapsed().as_millis()
			);
			Ok(bytes)
		}
		Err(source) => {
			warn!("Failed copying chain snapshot, starting from genesis: {}", source);
			if let Err(e) = tokio::fs::remove_file(target).await {
				if e.kind() != std::io::ErrorKind::NotFound {
					warn!("Failed to remove partial chain file {:?}: {}", target, e);
				}
			}
			Err(SnapshotCopyError {
				source_path: snapshot.to_path_buf(),
				source,
			})
		}
	}
}
