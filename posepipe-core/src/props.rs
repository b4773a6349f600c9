//! Process-wide, rarely changing configuration shared across pipelines

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const WORKING_DIR: &str = "WORKING_DIR";

/// Injected configuration context. Cloning shares the same store; reads may
/// run concurrently, writes are serialized by the lock.
#[derive(Debug, Clone)]
pub struct GlobalProps {
    props: Arc<RwLock<HashMap<String, Value>>>,
}

impl GlobalProps {
    /// Initialise with the process's current directory as working directory
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_working_dir(cwd)
    }

    pub fn with_working_dir(dir: impl AsRef<Path>) -> Self {
        let props = Self {
            props: Arc::new(RwLock::new(HashMap::new())),
        };
        props.set_working_dir(dir);
        props
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.props.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.write().insert(key.into(), value.into());
    }

    pub fn working_dir(&self) -> PathBuf {
        self.props
            .read()
            .get(WORKING_DIR)
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn set_working_dir(&self, dir: impl AsRef<Path>) {
        self.set(WORKING_DIR, dir.as_ref().to_string_lossy().into_owned());
    }

    /// Resolve `path` against the working directory unless already absolute
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir().join(path)
        }
    }

    /// Copy every property into `target`
    pub fn save(&self, target: &mut Map<String, Value>) {
        for (key, value) in self.props.read().iter() {
            target.insert(key.clone(), value.clone());
        }
    }

    /// Restore properties previously written by [`GlobalProps::save`]
    pub fn restore(&self, source: &Map<String, Value>) {
        let mut props = self.props.write();
        for (key, value) in source {
            props.insert(key.clone(), value.clone());
        }
        debug!("Restored {} global properties", source.len());
    }
}

impl Default for GlobalProps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_dir_round_trip() {
        let props = GlobalProps::with_working_dir("/tmp/posepipe");
        assert_eq!(props.working_dir(), PathBuf::from("/tmp/posepipe"));
        assert_eq!(props.resolve("out.jsonl"), PathBuf::from("/tmp/posepipe/out.jsonl"));
        assert_eq!(props.resolve("/abs/out.jsonl"), PathBuf::from("/abs/out.jsonl"));
    }

    #[test]
    fn test_clones_share_state() {
        let props = GlobalProps::with_working_dir("/a");
        let other = props.clone();
        other.set_working_dir("/b");
        assert_eq!(props.working_dir(), PathBuf::from("/b"));
    }

    #[test]
    fn test_save_restore() {
        let props = GlobalProps::with_working_dir("/data");
        props.set("theme", "dark");
        let mut saved = Map::new();
        props.save(&mut saved);

        let restored = GlobalProps::with_working_dir("/elsewhere");
        restored.restore(&saved);
        assert_eq!(restored.working_dir(), PathBuf::from("/data"));
        assert_eq!(restored.get("theme"), Some(Value::from("dark")));
    }

    #[test]
    fn test_concurrent_reads() {
        let props = GlobalProps::with_working_dir("/shared");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let props = props.clone();
                std::thread::spawn(move || props.working_dir())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), PathBuf::from("/shared"));
        }
    }
}
