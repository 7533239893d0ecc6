use crate::federation::container::RemoteContainer;
use anyhow::{anyhow, Context, Result};
use libloading::{Library, Symbol};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

/// Path of the remote entry artifact relative to a plugin's base URL.
pub const REMOTE_ENTRY_PATH: &str = "assets/remoteEntry";
/// Symbol every remote entry library exports.
pub const REMOTE_ENTRY_SYMBOL: &str = "remote_entry";

/// Signature of [`REMOTE_ENTRY_SYMBOL`].
pub type RemoteEntryFn = unsafe extern "C" fn() -> *mut Arc<dyn RemoteContainer>;

/// Canonical entry URL for a plugin base URL.
pub fn remote_entry_url(base: &str) -> String {
    format!(
        "{}/{}.{}",
        base.trim_end_matches('/'),
        REMOTE_ENTRY_PATH,
        std::env::consts::DLL_EXTENSION
    )
}

/// Turns an entry URL into a container object.
pub trait ContainerFetcher: Send + Sync {
    fn fetch(&self, entry_url: &str) -> Result<Arc<dyn RemoteContainer>>;
}

// Libraries stay mapped until the process exits. Components handed out by a
// container point into its code, and the component cache can be cleared while
// cells still hold them.
static OPENED_LIBRARIES: Lazy<Mutex<Vec<Library>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Downloads remote entry libraries and opens them with `libloading`.
pub struct HttpContainerFetcher {
    client: Client,
    cache_dir: PathBuf,
}

impl HttpContainerFetcher {
    /// Build the fetcher and drop artifacts left behind by earlier sessions.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<std::time::Duration>)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let fetcher = Self {
            client,
            cache_dir: cache_dir.as_ref().to_path_buf(),
        };
        let removed = fetcher.prune_cache();
        if removed > 0 {
            tracing::debug!(removed, dir = %fetcher.cache_dir.display(), "stale plugin artifacts removed");
        }
        Ok(fetcher)
    }

    /// Delete every cached artifact in the cache directory. Returns how many
    /// files were removed.
    pub fn prune_cache(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.cache_dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_artifact(p))
            .filter(|p| match std::fs::remove_file(p) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(path = %p.display(), "cannot remove cached artifact: {e}");
                    false
                }
            })
            .count()
    }

    /// Write downloaded bytes under a content-addressed name.
    ///
    /// An existing file with the same name already holds these bytes and is
    /// reused. It may be mapped by a live library, so it is never rewritten.
    pub fn store_artifact(&self, entry_url: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("create {}", self.cache_dir.display()))?;
        let path = self.cache_dir.join(artifact_file_name(entry_url, bytes));
        if path.is_file() {
            tracing::debug!(path = %path.display(), "reusing cached remote entry");
            return Ok(path);
        }
        let tmp = path.with_extension("part");
        std::fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("rename {}", tmp.display()))?;
        Ok(path)
    }

    fn download(&self, entry_url: &str) -> Result<PathBuf> {
        let url = Url::parse(entry_url).with_context(|| format!("invalid entry url {entry_url}"))?;
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map_err(|_| anyhow!("entry url {entry_url} is not a local path"));
        }
        let bytes = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request for {entry_url} failed"))?
            .error_for_status()?
            .bytes()?;
        let path = self.store_artifact(entry_url, &bytes)?;
        tracing::debug!(url = entry_url, path = %path.display(), bytes = bytes.len(), "remote entry downloaded");
        Ok(path)
    }

    /// Open a downloaded artifact, deleting it when it is not a usable entry.
    pub fn open_cached(&self, path: &Path) -> Result<Arc<dyn RemoteContainer>> {
        let opened = open_remote_entry(path);
        if opened.is_err() && path.starts_with(&self.cache_dir) {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "cannot remove rejected artifact: {e}");
            }
        }
        opened
    }
}

impl ContainerFetcher for HttpContainerFetcher {
    fn fetch(&self, entry_url: &str) -> Result<Arc<dyn RemoteContainer>> {
        let path = self.download(entry_url)?;
        self.open_cached(&path)
    }
}

/// Open a remote entry library and call its entry point.
pub fn open_remote_entry(path: &Path) -> Result<Arc<dyn RemoteContainer>> {
    // SAFETY: loading a dynamic library runs its initialisers; remote entries
    // are trusted by the host and run with full privileges.
    let lib = unsafe { Library::new(path) }
        .with_context(|| format!("failed to load remote entry from {}", path.display()))?;

    let container = {
        // SAFETY: the symbol type is the documented remote entry ABI.
        let entry: Symbol<RemoteEntryFn> = unsafe {
            lib.get(REMOTE_ENTRY_SYMBOL.as_bytes()).with_context(|| {
                format!(
                    "missing entry symbol `{}` in {}",
                    REMOTE_ENTRY_SYMBOL,
                    path.display()
                )
            })?
        };
        // SAFETY: entry point is trusted by ABI contract; null checked below.
        let raw = unsafe { entry() };
        if raw.is_null() {
            return Err(anyhow!(
                "remote entry {} returned a null container",
                path.display()
            ));
        }
        // SAFETY: the pointer was produced by `Box::into_raw` in `export_remote_entry!`.
        *unsafe { Box::from_raw(raw) }
    };

    OPENED_LIBRARIES
        .lock()
        .map_err(|_| anyhow!("library table lock poisoned"))?
        .push(lib);
    Ok(container)
}

fn artifact_file_name(entry_url: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "{}-{}.{}",
        slug::slugify(entry_url),
        &hex::encode(digest)[..16],
        std::env::consts::DLL_EXTENSION
    )
}

fn is_artifact(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == std::env::consts::DLL_EXTENSION || e == "part")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_url_strips_trailing_slashes() {
        let ext = std::env::consts::DLL_EXTENSION;
        assert_eq!(
            remote_entry_url("https://cdn.example.com/clock/"),
            format!("https://cdn.example.com/clock/assets/remoteEntry.{ext}")
        );
        assert_eq!(
            remote_entry_url("https://cdn.example.com/clock"),
            format!("https://cdn.example.com/clock/assets/remoteEntry.{ext}")
        );
    }

    #[test]
    fn missing_local_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpContainerFetcher::new(dir.path()).unwrap();
        let missing = dir.path().join("nope");
        let url = Url::from_directory_path(&missing).unwrap();
        let entry = remote_entry_url(url.as_str());
        assert!(fetcher.fetch(&entry).is_err());
    }

    #[test]
    fn identical_downloads_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpContainerFetcher::new(dir.path()).unwrap();
        let url = "https://cdn.example.com/clock/assets/remoteEntry.so";
        let first = fetcher.store_artifact(url, b"v1").unwrap();
        let again = fetcher.store_artifact(url, b"v1").unwrap();
        assert_eq!(first, again);
        let changed = fetcher.store_artifact(url, b"v2").unwrap();
        assert_ne!(first, changed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn rejected_artifact_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpContainerFetcher::new(dir.path()).unwrap();
        let path = fetcher
            .store_artifact("https://cdn.example.com/bad", b"not a library")
            .unwrap();
        assert!(path.exists());
        assert!(fetcher.open_cached(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn earlier_artifacts_are_pruned_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        std::fs::write(dir.path().join(format!("old-1234.{ext}")), b"x").unwrap();
        std::fs::write(dir.path().join("half.part"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        HttpContainerFetcher::new(dir.path()).unwrap();
        let left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, vec!["notes.txt".to_string()]);
    }

    #[test]
    fn non_library_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("garbage.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"not a library").unwrap();
        assert!(open_remote_entry(&path).is_err());
    }
}
