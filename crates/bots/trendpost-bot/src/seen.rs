use std::collections::HashSet;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "trendpost_bot::seen";

pub const DEFAULT_SEEN_FILE: &str = "seen_items.json";

#[derive(Debug, Snafu)]
pub enum SeenStoreError {
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    Read { path: PathBuf, source: io::Error },
    #[snafu(display("Malformed seen set in {}: {source}", path.display()))]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to encode seen set: {source}"))]
    Encode { source: serde_json::Error },
    #[snafu(display("Failed to write seen set next to {}: {source}", path.display()))]
    Write { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to replace {}: {source}", path.display()))]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

pub type SeenStoreResult<T> = std::result::Result<T, SeenStoreError>;

/// Ids of items that were already published. Ids are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet(HashSet<String>);

impl SeenSet {
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns `true` if the id was not present before.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl<S> FromIterator<S> for SeenSet
where
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// JSON file holding the [`SeenSet`] as an array of strings.
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the seen set, treating missing or malformed storage as empty
    pub fn load(&self) -> SeenSet {
        match self.try_load() {
            Ok(Some(seen)) => {
                info!(target: LOG_TARGET, path = %self.path.display(), count = seen.len(), "Loaded seen set");
                seen
            }
            Ok(None) => {
                info!(target: LOG_TARGET, path = %self.path.display(), "No seen set on disk, starting empty");
                SeenSet::default()
            }
            Err(err) => {
                warn!(target: LOG_TARGET, error = %err, "Ignoring unusable seen set, starting empty");
                SeenSet::default()
            }
        }
    }

    /// Like [`Self::load`], but reports why storage could not be used.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn try_load(&self) -> SeenStoreResult<Option<SeenSet>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SeenStoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let ids: Vec<String> =
            serde_json::from_slice(&bytes).context(DecodeSnafu { path: &self.path })?;

        Ok(Some(ids.into_iter().collect()))
    }

    /// Replace the stored set with `seen`.
    ///
    /// Content goes to a temporary file in the same directory which is then
    /// renamed over the target, so readers see either the old or the new set.
    pub fn save(&self, seen: &SeenSet) -> SeenStoreResult<()> {
        let json = serde_json::to_vec_pretty(&seen.sorted_ids()).context(EncodeSnafu)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).context(WriteSnafu { path: &self.path })?;
        tmp.write_all(&json)
            .context(WriteSnafu { path: &self.path })?;
        tmp.as_file()
            .sync_all()
            .context(WriteSnafu { path: &self.path })?;
        tmp.persist(&self.path)
            .context(PersistSnafu { path: &self.path })?;

        debug!(target: LOG_TARGET, path = %self.path.display(), count = seen.len(), "Saved seen set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join(DEFAULT_SEEN_FILE));

        assert!(store.try_load().unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SEEN_FILE);
        std::fs::write(&path, b"{not json at all").unwrap();
        let store = SeenStore::new(&path);

        assert!(matches!(
            store.try_load(),
            Err(SeenStoreError::Decode { .. })
        ));
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_wrong_shape_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SEEN_FILE);
        std::fs::write(&path, br#"{"ids": [1, 2]}"#).unwrap();

        assert!(SeenStore::new(&path).load().is_empty());
    }

    #[test]
    fn saved_ids_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SEEN_FILE);

        let mut seen = SeenSet::default();
        assert!(seen.insert("42"));
        assert!(!seen.insert("42"));
        seen.insert("7");
        SeenStore::new(&path).save(&seen).unwrap();

        let reloaded = SeenStore::new(&path).load();
        assert_eq!(reloaded, seen);
        assert!(reloaded.contains("42"));
        assert!(reloaded.contains("7"));
        assert!(!reloaded.contains("8"));
    }

    #[test]
    fn save_writes_sorted_json_array_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SEEN_FILE);
        let store = SeenStore::new(&path);

        store.save(&SeenSet::from_iter(["b", "a"])).unwrap();
        store.save(&SeenSet::from_iter(["c", "b", "a"])).unwrap();

        let ids: Vec<String> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("nope").join(DEFAULT_SEEN_FILE));

        assert!(matches!(
            store.save(&SeenSet::from_iter(["1"])),
            Err(SeenStoreError::Write { .. })
        ));
    }

    #[test]
    fn logs_under_module_target() {
        assert!(module_path!().starts_with(LOG_TARGET));
    }
}
