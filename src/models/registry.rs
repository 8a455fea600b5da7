//! Ordered set of model families available for fitting.

use std::sync::Arc;

use crate::error::{Result, SarError};
use crate::models::{ModelKind, ModelSpec};

/// Model families in a fixed order.
///
/// Collections and averages list models in this order, whatever order the
/// fits finish in.
#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<Arc<dyn ModelSpec>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }

    /// All built-in families.
    pub fn standard() -> Self {
        Self {
            models: ModelKind::ALL
                .iter()
                .map(|&kind| Arc::new(kind) as Arc<dyn ModelSpec>)
                .collect(),
        }
    }

    pub fn all(&self) -> &[Arc<dyn ModelSpec>] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name()).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ModelSpec>> {
        self.models
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| {
                let known = self.names().join(", ");
                SarError::config("model", name, format!("unknown model; known: {known}"))
            })
    }

    /// Append a family. Names must be unique.
    pub fn register(&mut self, spec: Arc<dyn ModelSpec>) -> Result<()> {
        if self.models.iter().any(|m| m.name() == spec.name()) {
            return Err(SarError::config(
                "model",
                spec.name(),
                "a model with this name is already registered",
            ));
        }
        if spec.param_names().len() != spec.bounds().len() || spec.param_names().is_empty() {
            return Err(SarError::config(
                "model",
                spec.name(),
                "needs at least one parameter and one bound per parameter",
            ));
        }
        self.models.push(spec);
        Ok(())
    }

    /// A registry holding only `names`, in the order given.
    pub fn subset(&self, names: &[&str]) -> Result<Registry> {
        let mut out = Registry::empty();
        for name in names {
            out.register(self.lookup(name)?)?;
        }
        Ok(out)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}
