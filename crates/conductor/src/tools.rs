//! Capability-indexed Tool Registry.
//!
//! # Design
//!
//! Tools are registered once at startup and indexed by the capabilities
//! they advertise. Resolution walks the required/optional capability sets
//! and looks each one up; duplicate providers for the same capability keep
//! whichever was registered first (no caller-preference API yet, see
//! DESIGN.md's open-question note).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConductorError, ConductorResult};

#[derive(Debug, Clone)]
pub struct ToolManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub config_keys: Vec<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> &[String];
    fn manifest(&self) -> ToolManifest;
    async fn health_check(&self) -> bool;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    by_capability: HashMap<String, String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            by_capability: HashMap::new(),
        }
    }

    /// Fails if `name` is already bound. Indexes the tool under each
    /// capability it declares; first-registered wins on a collision.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> ConductorResult<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ConductorError::Internal(format!(
                "tool '{name}' already registered"
            )));
        }
        for cap in tool.capabilities() {
            self.by_capability
                .entry(cap.clone())
                .or_insert_with(|| name.clone());
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get_by_capability(&self, capability: &str) -> Option<Arc<dyn Tool>> {
        self.by_capability
            .get(capability)
            .and_then(|name| self.tools.get(name))
            .cloned()
    }

    /// Resolves a mapping `capability -> tool` for the required and
    /// optional capability sets. Fails with `Capability` when any required
    /// capability is unprovided; missing optional capabilities are fine.
    pub fn resolve(
        &self,
        required: &[String],
        optional: &[String],
    ) -> ConductorResult<HashMap<String, Arc<dyn Tool>>> {
        let mut resolved = HashMap::new();
        for cap in required {
            match self.get_by_capability(cap) {
                Some(tool) => {
                    resolved.insert(cap.clone(), tool);
                }
                None => return Err(ConductorError::Capability(cap.clone())),
            }
        }
        for cap in optional {
            if let Some(tool) = self.get_by_capability(cap) {
                resolved.insert(cap.clone(), tool);
            }
        }
        Ok(resolved)
    }

    pub async fn health_probe(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, tool) in &self.tools {
            results.insert(name.clone(), tool.health_check().await);
        }
        results
    }
}

/// A tool that only needs to exist for capability resolution. The actual
/// LLM/web-search/shell backend it represents is a contract-only
/// collaborator injected by the deployment, not by this crate.
struct ContractTool {
    name: String,
    capabilities: Vec<String>,
}

#[async_trait]
impl Tool for ContractTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    fn manifest(&self) -> ToolManifest {
        ToolManifest {
            name: self.name.clone(),
            version: "0.1.0".to_string(),
            description: format!("contract tool for {:?}", self.capabilities),
            capabilities: self.capabilities.clone(),
            config_keys: Vec::new(),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Builds a registry with one contract tool per capability the built-in
/// instruments require (`reasoning`, `web_search`, `synthesis`, `analysis`,
/// `vision`, `shell_execution`). Used to satisfy the Instrument Registry's
/// construction-time resolvability invariant wherever a real provider
/// hasn't been wired in yet.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for capability in [
        "reasoning",
        "web_search",
        "synthesis",
        "analysis",
        "vision",
        "shell_execution",
    ] {
        registry
            .register(Arc::new(ContractTool {
                name: format!("{capability}-contract"),
                capabilities: vec![capability.to_string()],
            }))
            .expect("capability names are unique");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTool {
        name: String,
        capabilities: Vec<String>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn capabilities(&self) -> &[String] {
            &self.capabilities
        }
        fn manifest(&self) -> ToolManifest {
            ToolManifest {
                name: self.name.clone(),
                version: "1.0".into(),
                description: "stub".into(),
                capabilities: self.capabilities.clone(),
                config_keys: vec![],
            }
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn tool(name: &str, caps: &[&str]) -> Arc<dyn Tool> {
        Arc::new(StubTool {
            name: name.into(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn resolve_fails_on_missing_required_capability() {
        let registry = ToolRegistry::new();
        let err = registry
            .resolve(&["reasoning".to_string()], &[])
            .unwrap_err();
        assert!(matches!(err, ConductorError::Capability(_)));
    }

    #[test]
    fn first_registered_wins_on_capability_collision() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("primary", &["reasoning"])).unwrap();
        registry
            .register(tool("secondary", &["reasoning"]))
            .unwrap();
        let resolved = registry.get_by_capability("reasoning").unwrap();
        assert_eq!(resolved.name(), "primary");
    }

    #[test]
    fn duplicate_name_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("dup", &["reasoning"])).unwrap();
        assert!(registry.register(tool("dup", &["vision"])).is_err());
    }
}
