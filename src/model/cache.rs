use crate::{
    core::separation::{ModelHandle, SeparationBackend},
    error::Result,
};

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::info;

type Slot = Arc<OnceCell<ModelHandle>>;

/// Loaded models by name. Each name is constructed at most once, even when
/// several requests ask for it at the same time; nothing is ever evicted.
pub struct ModelCache {
    backend: Arc<dyn SeparationBackend>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ModelCache {
    pub fn new(backend: Arc<dyn SeparationBackend>) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &dyn SeparationBackend {
        self.backend.as_ref()
    }

    pub fn get(&self, name: &str) -> Result<ModelHandle> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            slots.entry(name.to_string()).or_default().clone()
        };

        // The map lock is released; only callers for this name wait here.
        let handle = slot.get_or_try_init(|| {
            let started = Instant::now();
            info!(model = name, "loading model");
            let handle = self.backend.load(name)?;
            info!(
                model = name,
                sources = ?handle.sources(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model loaded"
            );
            Ok::<_, crate::error::StemError>(handle)
        })?;
        Ok(handle.clone())
    }

    /// Names whose construction has completed.
    pub fn cached(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
