use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Registry of loaded detector backends.
///
/// This is the model-loading side of the pipeline: a backend present here is
/// "ready". Instances are handed out by value because the detection loop needs
/// exclusive ownership of its model; a taken backend is no longer registered.
pub struct DetectorRegistry {
    backends: HashMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("detector backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Take a backend by name and warm it up.
    ///
    /// `Ok(None)` means the model is not loaded; the detection loop stays dormant.
    /// A warm-up error is a backend failure.
    pub fn take(&mut self, name: &str) -> Result<Option<Box<dyn DetectorBackend>>> {
        let Some(mut backend) = self.backends.remove(name) else {
            return Ok(None);
        };
        if self.default_name.as_deref() == Some(name) {
            self.default_name = None;
        }
        backend
            .warm_up()
            .map_err(|e| anyhow!("detector backend '{}' failed to warm up: {}", name, e))?;
        Ok(Some(backend))
    }

    /// Take the default backend, if any.
    pub fn take_default(&mut self) -> Result<Option<Box<dyn DetectorBackend>>> {
        match self.default_name.clone() {
            Some(name) => self.take(&name),
            None => Ok(None),
        }
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
