use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Changed markdown notes, as vault-relative paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesChanged(pub Vec<String>);

/// Watches a vault directory for note edits made outside `tsync`.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<NotesChanged>,
}

impl VaultWatcher {
    /// Start watching `root` recursively
    pub fn start(root: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let root_owned = root.to_path_buf();
        // Event paths may arrive canonicalized (e.g. through symlinked temp dirs)
        let root_canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "watch error");
                        return;
                    }
                };

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
                    _ => return,
                }

                let mut relevant: Vec<String> = event
                    .paths
                    .iter()
                    .filter_map(|p| {
                        relative_note_path(&root_owned, p)
                            .or_else(|| relative_note_path(&root_canonical, p))
                    })
                    .collect();
                relevant.dedup();

                if !relevant.is_empty() {
                    let _ = tx.send(NotesChanged(relevant));
                }
            },
            Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(VaultWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Non-blocking poll: every path reported since the last call,
    /// deduplicated, in arrival order.
    pub fn poll(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        while let Ok(NotesChanged(batch)) = self.rx.try_recv() {
            for path in batch {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }

    /// Block up to `timeout` for the first batch, then drain the rest
    pub fn wait(&self, timeout: Duration) -> Vec<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(NotesChanged(mut first)) => {
                for path in self.poll() {
                    if !first.contains(&path) {
                        first.push(path);
                    }
                }
                first
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Vault-relative `.md` path for an event path, skipping anything inside a
/// dot directory (settings, lock file, editor state).
pub fn relative_note_path(root: &Path, path: &Path) -> Option<String> {
    let rel: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    if rel.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component.as_os_str().to_str()?;
        if part.starts_with('.') {
            return None;
        }
        parts.push(part);
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_note_path_filters() {
        let root = Path::new("/vault");
        assert_eq!(
            relative_note_path(root, Path::new("/vault/Tasks/Buy milk.md")),
            Some("Tasks/Buy milk.md".to_string())
        );
        assert_eq!(relative_note_path(root, Path::new("/vault/Bases/Tasks.base")), None);
        assert_eq!(relative_note_path(root, Path::new("/vault/.tasksync/x.md")), None);
        assert_eq!(relative_note_path(root, Path::new("/elsewhere/a.md")), None);
    }
}
