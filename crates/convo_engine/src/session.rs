use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_info};
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};
use crate::surface::{Cookie, StorageMap, UiError, UiSurface};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file write failed: {0}")]
    Persist(#[from] PersistError),
    #[error("session file is not valid json: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Ui(#[from] UiError),
}

/// Cookies and local storage of one site, kept as JSON in the profile directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    site: String,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, site: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            site: site.into(),
        }
    }

    fn cookies_name(&self) -> String {
        format!("{}_cookies.json", self.site)
    }

    fn storage_name(&self) -> String {
        format!("{}_storage.json", self.site)
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.dir.join(self.cookies_name())
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.join(self.storage_name())
    }

    pub async fn save(&self, surface: &dyn UiSurface) -> Result<(), SessionError> {
        let cookies = surface.cookies().await?;
        let storage = surface.local_storage().await?;
        let writer = AtomicFileWriter::new(&self.dir);
        writer.write(&self.cookies_name(), &serde_json::to_string_pretty(&cookies)?)?;
        writer.write(&self.storage_name(), &serde_json::to_string_pretty(&storage)?)?;
        engine_debug!(
            "Saved {} cookies and {} storage keys for {}",
            cookies.len(),
            storage.len(),
            self.site
        );
        Ok(())
    }

    /// Applies whatever was saved; missing files are not an error. The page must already
    /// be on the site's origin.
    pub async fn restore(&self, surface: &dyn UiSurface) -> Result<bool, SessionError> {
        let cookies: Option<Vec<Cookie>> = read_json(&self.cookies_path())?;
        let storage: Option<StorageMap> = read_json(&self.storage_path())?;
        let restored = cookies.is_some() || storage.is_some();
        if let Some(cookies) = cookies {
            surface.add_cookies(&cookies).await?;
        }
        if let Some(storage) = storage {
            surface.set_local_storage(&storage).await?;
        }
        if restored {
            engine_info!("Restored saved session for {}", self.site);
        }
        Ok(restored)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, SessionError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SessionError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
