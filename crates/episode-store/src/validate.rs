use crate::episode::{episode_index_from_name, io_err, EpisodeFile, RawEpisode};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Collect candidate episode files from a source directory.
///
/// Directory entries and names outside the `episode_<n>.npz` convention are
/// skipped without being opened. Candidates come back ordered by episode
/// index; two files mapping to the same index is fatal.
pub fn scan_episode_dir(dir: &Path) -> Result<Vec<EpisodeFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, &e))? {
        let entry = entry.map_err(|e| io_err(dir, &e))?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(index) = episode_index_from_name(name) else {
            continue;
        };
        files.push(EpisodeFile { index, path });
    }
    files.sort_by_key(|f| f.index);
    for pair in files.windows(2) {
        if pair[0].index == pair[1].index {
            return Err(Error::DuplicateDemoIndex {
                index: pair[0].index,
            });
        }
    }
    tracing::debug!(dir = %dir.display(), candidates = files.len(), "scanned episode directory");
    Ok(files)
}

/// Open and shape-check every candidate before any output exists.
///
/// The first failure aborts the run; a partial or corrupt capture must not
/// produce a partial dataset.
pub fn validate_episodes(files: &[EpisodeFile], cameras: &[String]) -> Result<()> {
    for file in files {
        RawEpisode::load(&file.path, cameras)?;
        tracing::debug!(episode = file.index, path = %file.path.display(), "validated");
    }
    tracing::info!(episodes = files.len(), "all episodes validated");
    Ok(())
}
