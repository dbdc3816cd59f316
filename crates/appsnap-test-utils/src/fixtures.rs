//! Test fixtures for creating reproducible app directories.

use appsnap_core::{App, Engine, EngineConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary app directory with a configurable file tree.
///
/// The layout mirrors a real apps directory: the temp dir plays `apps_dir`
/// and the app's working directory is `<apps_dir>/<id>`.
///
/// # Example
///
/// ```rust
/// use appsnap_test_utils::fixtures::TestApp;
///
/// let app = TestApp::new()
///     .with_file("index.html", "<h1>hi</h1>")
///     .with_file("src/app.js", "run()")
///     .build();
///
/// assert!(app.path().join("src/app.js").exists());
/// ```
pub struct TestApp {
    temp_dir: TempDir,
    id: String,
    name: String,
    files: BTreeMap<PathBuf, Vec<u8>>,
    config: EngineConfig,
}

impl TestApp {
    /// Create a new test app builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            id: "app_test".to_string(),
            name: "Test app".to_string(),
            files: BTreeMap::new(),
            config: EngineConfig::default(),
        }
    }

    /// Use a specific app id (also the directory name).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a text file. Parent directories are created automatically.
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.with_bytes(path, contents.into().into_bytes())
    }

    /// Add a file with arbitrary bytes.
    pub fn with_bytes(mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Add a .gitignore file.
    pub fn with_gitignore(self, contents: &str) -> Self {
        self.with_file(".gitignore", contents)
    }

    /// Override engine configuration. `apps_dir` is always the temp dir.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the working directory and its files.
    pub fn build(self) -> BuiltTestApp {
        let workdir = self.temp_dir.path().join(&self.id);
        fs::create_dir_all(&workdir)
            .unwrap_or_else(|e| panic!("Failed to create {}: {}", workdir.display(), e));

        for (path, contents) in &self.files {
            let full_path = workdir.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        let config = EngineConfig {
            apps_dir: Some(self.temp_dir.path().to_path_buf()),
            ..self.config
        };

        BuiltTestApp {
            app: App::new(self.id, self.name, workdir),
            config,
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test app with files on disk.
///
/// The temporary directory is removed when this is dropped.
pub struct BuiltTestApp {
    temp_dir: TempDir,
    app: App,
    config: EngineConfig,
}

impl BuiltTestApp {
    /// The app's working directory.
    pub fn path(&self) -> &Path {
        &self.app.workdir
    }

    /// Directory holding the app (and any app created by the engine).
    pub fn apps_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn id(&self) -> &str {
        &self.app.id
    }

    /// Engine configuration pointing at this fixture's apps directory.
    pub fn config(&self) -> EngineConfig {
        self.config.clone()
    }

    /// An engine with this app registered and initialized.
    pub async fn engine(&self) -> Engine {
        let engine = Engine::new(self.config());
        engine
            .register(self.app.clone())
            .await
            .expect("Failed to register test app");
        engine
            .ensure_initialized(self.id())
            .await
            .expect("Failed to initialize test app");
        engine
    }

    /// Read a file from the working directory.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.path().join(path.as_ref());
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Check if a file exists in the working directory.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path.as_ref()).exists()
    }

    /// Write a file (for modifying the tree during tests).
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents)
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Delete a file from the working directory.
    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let full_path = self.path().join(path.as_ref());
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("Failed to delete file {}: {}", full_path.display(), e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_writes_files_under_app_id() {
        let app = TestApp::new()
            .with_id("app_fixture")
            .with_file("nested/a.txt", "hello")
            .with_bytes("bin.dat", vec![0u8, 159, 146, 150])
            .build();

        assert!(app.path().ends_with("app_fixture"));
        assert_eq!(app.read_file("nested/a.txt"), "hello");
        assert!(app.file_exists("bin.dat"));
        assert_eq!(app.config().apps_dir.as_deref(), Some(app.apps_dir()));
    }

    #[test]
    fn write_and_delete_files() {
        let app = TestApp::new().build();
        app.write_file("x/y.txt", "1");
        assert_eq!(app.read_file("x/y.txt"), "1");
        app.delete_file("x/y.txt");
        assert!(!app.file_exists("x/y.txt"));
    }
}
