//! Kind name to constructor registry for transformers

use crate::model::ModelRegistry;
use crate::param::ParamSpec;
use crate::transformer::{Role, Transformer};
use parking_lot::RwLock;
use posepipe_bridge::Publisher;
use posepipe_core::{Error, GlobalProps, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Everything a factory may need. Passed explicitly; transformers never
/// reach for process-wide state on their own.
#[derive(Clone)]
pub struct BuildContext {
    pub props: GlobalProps,
    pub models: Arc<ModelRegistry>,
    pub publisher: Option<Publisher>,
}

impl BuildContext {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            props,
            models: Arc::new(ModelRegistry::with_builtins()),
            publisher: None,
        }
    }

    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = models;
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(GlobalProps::default())
    }
}

pub type Factory = fn(&BuildContext) -> Result<Box<dyn Transformer>>;

/// Static description of a registered kind, for listings and UIs
#[derive(Debug, Clone, Serialize)]
pub struct KindInfo {
    pub kind: &'static str,
    pub description: &'static str,
    pub role: Role,
    pub parameters: Vec<ParamSpec>,
}

struct Entry {
    info: KindInfo,
    factory: Factory,
}

/// Filled once at startup; only read afterwards
pub struct TransformerRegistry {
    entries: RwLock<BTreeMap<&'static str, Entry>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry holding every built-in kind
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        crate::transformers::register_builtins(&registry)?;
        Ok(registry)
    }

    pub fn register(&self, info: KindInfo, factory: Factory) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(info.kind) {
            return Err(Error::config(format!(
                "Transformer kind '{}' is already registered",
                info.kind
            )));
        }
        info!("Registered transformer kind: {}", info.kind);
        entries.insert(info.kind, Entry { info, factory });
        Ok(())
    }

    pub fn create(&self, kind: &str, ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        let factory = self
            .entries
            .read()
            .get(kind)
            .map(|entry| entry.factory)
            .ok_or_else(|| Error::config(format!("Unknown transformer kind '{}'", kind)))?;
        factory(ctx)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.read().contains_key(kind)
    }

    pub fn info(&self, kind: &str) -> Option<KindInfo> {
        self.entries.read().get(kind).map(|e| e.info.clone())
    }

    /// All kinds, sorted by name
    pub fn kinds(&self) -> Vec<KindInfo> {
        self.entries.read().values().map(|e| e.info.clone()).collect()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
