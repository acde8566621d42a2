// Shader hot reload
//
// Watches the configured shader files and raises a flag the app polls
// once per frame; the response is a geometry rebake.

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ShaderWatcher {
    // Held for its side effect; dropping it stops the watch
    _watcher: RecommendedWatcher,
    dirty: Arc<AtomicBool>,
}

impl ShaderWatcher {
    /// Watch the given files. Fails if any of them does not exist.
    pub fn new(paths: &[&Path]) -> Result<Self> {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = dirty.clone();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                match result {
                    Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                        flag.store(true, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Shader watch error: {e}"),
                }
            })?;

        for path in paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch shader file {:?}", path))?;
            log::info!("Watching {:?} for changes", path);
        }

        Ok(Self {
            _watcher: watcher,
            dirty,
        })
    }

    /// True exactly once per batch of edits since the last call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let file = std::env::temp_dir().join("kestrel-watch-test.spv");
        std::fs::write(&file, b"spv").unwrap();

        let watcher = ShaderWatcher::new(&[file.as_path()]).unwrap();
        assert!(!watcher.take_dirty());

        let _ = std::fs::remove_file(&file);
    }

    #[test]
    fn missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("kestrel-watch-missing.spv");
        let _ = std::fs::remove_file(&missing);
        assert!(ShaderWatcher::new(&[missing.as_path()]).is_err());
    }
}
