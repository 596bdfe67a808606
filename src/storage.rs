use crate::downloads::recount;
use crate::errors::PersistenceError;
use crate::models::StatsData;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Reads the stats file. A missing file is not an error and yields `None`.
pub async fn try_load_data(path: &Path) -> Result<Option<StatsData>, PersistenceError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Load {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let mut data: StatsData =
        serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    recount(&mut data);
    Ok(Some(data))
}

/// Loads the stats file, falling back to an empty state on any failure. A
/// file that does not decode is moved to `<path>.corrupt` first so the next
/// save cannot overwrite it.
pub async fn load_data(path: &Path) -> StatsData {
    match try_load_data(path).await {
        Ok(Some(data)) => data,
        Ok(None) => StatsData::default(),
        Err(err @ PersistenceError::Decode { .. }) => {
            let aside = sibling(path, "corrupt");
            match fs::rename(path, &aside).await {
                Ok(()) => warn!("{err}; kept as {}, starting from empty stats", aside.display()),
                Err(move_err) => warn!(
                    "{err}; could not move it to {}: {move_err}; starting from empty stats",
                    aside.display()
                ),
            }
            StatsData::default()
        }
        Err(err) => {
            warn!("{err}; starting from empty stats");
            StatsData::default()
        }
    }
}

/// Writes to `<path>.tmp` and renames it over `path`, so a failed write never
/// leaves a truncated stats file behind.
pub async fn persist_data(path: &Path, data: &StatsData) -> Result<(), PersistenceError> {
    let payload = serde_json::to_vec_pretty(data).map_err(PersistenceError::Encode)?;
    let temp_path = sibling(path, "tmp");
    let save_error = |source| PersistenceError::Save {
        path: path.to_path_buf(),
        source,
    };

    if let Err(source) = fs::write(&temp_path, payload).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(save_error(source));
    }
    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(save_error(source));
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
