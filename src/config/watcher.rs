//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::stack::ConfigView;

/// Watches the files of reload-enabled sources and re-merges the view on change.
///
/// Parent directories are watched rather than the files themselves so that
/// optional files created after startup, and editors that replace files on
/// save, are both picked up.
pub struct ConfigWatcher {
    view: ConfigView,
    files: Vec<PathBuf>,
}

impl ConfigWatcher {
    pub fn new(view: ConfigView) -> Self {
        let files = view
            .watch_paths()
            .into_iter()
            .map(|path| canonical(&path))
            .collect();
        Self { view, files }
    }

    /// Whether any source asked to be watched.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Start watching in the background.
    ///
    /// The returned watcher stops when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let view = self.view.clone();
        let files = self.files.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove())
                        && event.paths.iter().any(|path| files.contains(&canonical(path)));
                    if relevant {
                        tracing::info!(paths = ?event.paths, "Config file change detected, reloading...");
                        if let Err(e) = view.reload() {
                            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let mut directories: Vec<PathBuf> = Vec::new();
        for file in &self.files {
            let directory = file
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            if !directories.contains(&directory) {
                directories.push(directory);
            }
        }
        for directory in &directories {
            watcher.watch(directory, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(files = ?self.files, "Config watcher started");
        Ok(watcher)
    }
}

/// Resolve symlinks and `..` in the directory part of `path`.
///
/// The file itself may not exist yet, so only its parent is canonicalized.
fn canonical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_resolves_dot_dot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("conf")).unwrap();
        let direct = canonical(&dir.path().join("Sage.toml"));
        let roundabout = canonical(&dir.path().join("conf/../Sage.toml"));
        assert_eq!(direct, roundabout);
        assert_eq!(direct.file_name().unwrap(), "Sage.toml");
    }

    #[cfg(unix)]
    #[test]
    fn test_canonical_resolves_symlinked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert_eq!(canonical(&link.join("Sage.toml")), canonical(&real.join("Sage.toml")));
    }

    #[test]
    fn test_canonical_keeps_missing_directory() {
        let path = Path::new("/definitely/not/here/Sage.toml");
        assert_eq!(canonical(path), path);
    }
}
