use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write asset to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("asset {0} not found in cache or bundled directory and no download URL is configured")]
    NotFound(String),
    #[error("asset file {0} does not exist")]
    MissingFile(PathBuf),
}

/// A runtime asset the detector needs (model weights, typically).
///
/// Identity is the `name`: two specs with the same name are the same asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bundled_dir: Option<PathBuf>,
    /// Exact file to use. Bypasses the cache, the bundled dir and the URL.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AssetSpec {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: None,
            bundled_dir: None,
            path: None,
        }
    }

    /// Spec pinned to `path`, named after its file name.
    pub fn at_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Some(Self {
            path: Some(path.to_path_buf()),
            ..Self::named(name)
        })
    }
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Locates (and if needed downloads) one asset on disk.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, spec: &AssetSpec) -> Result<PathBuf, AssetError>;
}

/// Load-once registry keyed by asset name.
///
/// A name that resolved once is never fetched again for the lifetime of the
/// registry, across any number of sessions sharing it. Failures are not
/// remembered, so a later `ensure` retries.
pub struct AssetRegistry {
    fetcher: Box<dyn AssetFetcher>,
    loaded: Mutex<HashMap<String, PathBuf>>,
}

impl AssetRegistry {
    pub fn new(fetcher: Box<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn ensure(&self, spec: &AssetSpec) -> Result<PathBuf, AssetError> {
        // Held across the fetch so concurrent callers of the same asset wait
        // for the first one instead of downloading twice.
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = loaded.get(&spec.name) {
            return Ok(path.clone());
        }
        log::info!("Resolving asset: {}", spec.name);
        let path = self.fetcher.fetch(spec)?;
        loaded.insert(spec.name.clone(), path.clone());
        Ok(path)
    }

    pub fn ensure_all(&self, specs: &[AssetSpec]) -> Result<Vec<PathBuf>, AssetError> {
        specs.iter().map(|spec| self.ensure(spec)).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

/// Resolves assets from the user cache, then the bundled directory, then the
/// asset's download URL.
pub struct HttpAssetFetcher {
    cache_dir: Option<PathBuf>,
    progress: Option<ProgressFn>,
}

impl HttpAssetFetcher {
    pub fn new(progress: Option<ProgressFn>) -> Self {
        Self {
            cache_dir: None,
            progress,
        }
    }

    /// Uses `dir` instead of the platform cache directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    fn cache_dir(&self) -> Result<PathBuf, AssetError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => asset_cache_dir(),
        }
    }
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AssetFetcher for HttpAssetFetcher {
    fn fetch(&self, spec: &AssetSpec) -> Result<PathBuf, AssetError> {
        if let Some(path) = &spec.path {
            return if path.exists() {
                Ok(path.clone())
            } else {
                Err(AssetError::MissingFile(path.clone()))
            };
        }

        let cache_dir = self.cache_dir()?;
        let cached_path = cache_dir.join(&spec.name);
        if cached_path.exists() {
            return Ok(cached_path);
        }

        if let Some(dir) = &spec.bundled_dir {
            let bundled_path = dir.join(&spec.name);
            if bundled_path.exists() {
                return Ok(bundled_path);
            }
        }

        let Some(url) = &spec.url else {
            return Err(AssetError::NotFound(spec.name.clone()));
        };
        fs::create_dir_all(&cache_dir).map_err(AssetError::CacheDir)?;
        download(url, &cached_path, self.progress.as_ref())?;
        Ok(cached_path)
    }
}

/// Platform-specific asset cache directory.
///
/// - macOS: `~/Library/Application Support/FaceCapture/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceCapture/models/` or `~/.cache/FaceCapture/models/`
/// - Windows: `%LOCALAPPDATA%/FaceCapture/models/`
pub fn asset_cache_dir() -> Result<PathBuf, AssetError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceCapture").join("models"))
            .ok_or(AssetError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceCapture").join("models"))
            .ok_or(AssetError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), AssetError> {
    let download_err = |source| AssetError::Download {
        url: url.to_string(),
        source,
    };
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;

    let total = response.content_length().unwrap_or(0);
    let bytes = response.bytes().map_err(download_err)?;

    // Write to a temp file first, then rename, so a failed download never
    // leaves something that looks like a cached asset.
    let temp_path = dest.with_extension("part");
    let write_err = |source| AssetError::Write {
        path: temp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;

    let mut downloaded: u64 = 0;
    for chunk in bytes.chunks(1024 * 1024) {
        file.write_all(chunk).map_err(write_err)?;
        downloaded += chunk.len() as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|source| AssetError::Write {
        path: dest.to_path_buf(),
        source,
    })
}
