//! Probe registration

use std::collections::HashSet;
use std::sync::Arc;

use crate::contracts::Probe;
use crate::error::{AuditError, Result};

/// Probes in registration order; names are unique
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: Vec<Arc<dyn Probe>>,
    names: HashSet<String>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Probe + 'static>(&mut self, probe: P) -> Result<()> {
        self.register_arc(Arc::new(probe))
    }

    pub fn register_arc(&mut self, probe: Arc<dyn Probe>) -> Result<()> {
        let name = probe.name().to_string();
        if name.is_empty() {
            return Err(AuditError::config("probe name must not be empty"));
        }
        if !self.names.insert(name.clone()) {
            return Err(AuditError::config(format!("probe already registered: {}", name)));
        }
        tracing::debug!(probe = %name, "Registered probe");
        self.probes.push(probe);
        Ok(())
    }

    pub fn probes(&self) -> &[Arc<dyn Probe>] {
        &self.probes
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Probe>> {
        self.probes.iter().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
