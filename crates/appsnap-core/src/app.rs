//! App model.
//!
//! An app is a project with a stable external id, a display name and one
//! working directory. Its metadata lives next to the working directory, never
//! inside it, so renaming an app does not show up as a file change:
//! ```text
//! <apps_dir>/
//!   app_01hq....json    # metadata
//!   app_01hq.../        # working directory (snapshot history inside)
//! ```

use crate::error::{CoreError, CoreResult};
use appsnap_util::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An app known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Stable external id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Working directory.
    pub workdir: PathBuf,
    /// When the app was created.
    pub created_at: DateTime<Utc>,
    /// When the metadata last changed.
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// Describe an app rooted at `workdir`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            workdir: workdir.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A new app with a fresh id under `apps_dir`.
    pub fn allocate(apps_dir: &Path, name: impl Into<String>) -> Self {
        let id = Identifier::app();
        let workdir = apps_dir.join(&id);
        Self::new(id, name, workdir)
    }

    /// Describe the existing app `id` under `apps_dir`.
    ///
    /// Fails if the id could escape `apps_dir`.
    pub fn locate(apps_dir: &Path, id: &str) -> CoreResult<Self> {
        if !Identifier::is_path_safe(id) {
            return Err(CoreError::AppNotFound(id.to_string()));
        }
        Ok(Self::new(id, id, apps_dir.join(id)))
    }

    /// Metadata file for this app.
    pub fn metadata_path(&self) -> PathBuf {
        let mut name = self.workdir.file_name().unwrap_or_default().to_os_string();
        name.push(".json");
        self.workdir.with_file_name(name)
    }

    /// Read saved metadata, keeping the working directory of `self`.
    pub async fn load_metadata(&self) -> CoreResult<Option<Self>> {
        let path = self.metadata_path();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut saved: App = serde_json::from_slice(&content)?;
        saved.workdir = self.workdir.clone();
        Ok(Some(saved))
    }

    /// Write metadata atomically (temp file, then rename).
    pub async fn save_metadata(&self) -> CoreResult<()> {
        let path = self.metadata_path();
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn allocate_places_workdir_under_apps_dir() {
        let app = App::allocate(Path::new("/srv/apps"), "Todo list");
        assert!(app.id.starts_with("app_"));
        assert_eq!(app.workdir, Path::new("/srv/apps").join(&app.id));
        assert_eq!(
            app.metadata_path(),
            Path::new("/srv/apps").join(format!("{}.json", app.id))
        );
    }

    #[test]
    fn locate_rejects_path_escapes() {
        assert!(App::locate(Path::new("/srv/apps"), "../etc").is_err());
        assert!(App::locate(Path::new("/srv/apps"), "a/b").is_err());
        assert!(App::locate(Path::new("/srv/apps"), "app_1").is_ok());
    }

    #[tokio::test]
    async fn metadata_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let app = App::allocate(dir.path(), "Landing page");
        assert!(app.load_metadata().await.unwrap().is_none());

        let renamed = app.renamed("Marketing site");
        renamed.save_metadata().await.unwrap();

        let loaded = app.load_metadata().await.unwrap().unwrap();
        assert_eq!(loaded.name, "Marketing site");
        assert_eq!(loaded.id, app.id);
        assert!(!dir.path().join(format!("{}.json.tmp", app.id)).exists());
    }
}
