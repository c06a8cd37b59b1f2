//! Capability registry — maps instance names to `Capability` implementations.
//!
//! Steps address a capability either by explicit instance name or by type
//! alone, in which case the first enabled instance of that type (in
//! registration order) is used.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{Capability, CapabilityError, HealthStatus, InvokeResult};

/// One registered instance.
#[derive(Clone)]
pub struct CapabilityInstance {
    pub name: String,
    pub enabled: bool,
    pub capability: Arc<dyn Capability>,
}

impl CapabilityInstance {
    pub fn capability_type(&self) -> &str {
        self.capability.capability_type()
    }
}

impl std::fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityInstance")
            .field("name", &self.name)
            .field("type", &self.capability_type())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Health report for one instance, as returned by [`CapabilityRegistry::check_all_health`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHealth {
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub status: HealthStatus,
}

/// Registry of every capability instance known to the process.
///
/// Built once at start-up and shared behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    instances: Vec<CapabilityInstance>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance. A later registration with the same name replaces
    /// the earlier one in place, keeping its position.
    pub fn register(&mut self, name: impl Into<String>, enabled: bool, capability: Arc<dyn Capability>) {
        let instance = CapabilityInstance {
            name: name.into(),
            enabled,
            capability,
        };
        match self.instances.iter_mut().find(|i| i.name == instance.name) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }

    pub fn instances(&self) -> &[CapabilityInstance] {
        &self.instances
    }

    /// Resolve the instance a step should dispatch to.
    ///
    /// # Errors
    /// - [`CapabilityError::UnknownInstance`] if `name` is given but not registered.
    /// - [`CapabilityError::NoInstance`] if no enabled instance of `capability_type` exists.
    pub fn resolve(
        &self,
        capability_type: &str,
        name: Option<&str>,
    ) -> Result<&CapabilityInstance, CapabilityError> {
        match name {
            Some(name) => self
                .instances
                .iter()
                .find(|i| i.name == name)
                .ok_or_else(|| CapabilityError::UnknownInstance(name.to_owned())),
            None => self
                .instances
                .iter()
                .find(|i| i.enabled && i.capability_type() == capability_type)
                .ok_or_else(|| CapabilityError::NoInstance {
                    capability_type: capability_type.to_owned(),
                }),
        }
    }

    /// Resolve an instance and invoke `action` on it.
    ///
    /// Returns the instance name alongside the result so callers can log it.
    pub async fn invoke(
        &self,
        capability_type: &str,
        name: Option<&str>,
        action: &str,
        params: Value,
    ) -> Result<(String, InvokeResult), CapabilityError> {
        let instance = self.resolve(capability_type, name)?;

        let actions = instance.capability.supported_actions();
        if !actions.is_empty() && !actions.iter().any(|a| a == action) {
            return Err(CapabilityError::UnsupportedAction {
                instance: instance.name.clone(),
                action: action.to_owned(),
            });
        }

        debug!("invoking '{}' on instance '{}'", action, instance.name);
        let result = instance.capability.invoke(action, params).await?;
        Ok((instance.name.clone(), result))
    }

    /// Probe one instance by name.
    pub async fn check_health(&self, name: &str) -> Result<HealthStatus, CapabilityError> {
        let instance = self
            .instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| CapabilityError::UnknownInstance(name.to_owned()))?;
        Ok(probe(instance).await)
    }

    /// Probe every registered instance concurrently.
    pub async fn check_all_health(&self) -> Vec<InstanceHealth> {
        let probes = self.instances.iter().map(|instance| async move {
            InstanceHealth {
                name: instance.name.clone(),
                capability_type: instance.capability_type().to_owned(),
                enabled: instance.enabled,
                status: probe(instance).await,
            }
        });
        join_all(probes).await
    }
}

async fn probe(instance: &CapabilityInstance) -> HealthStatus {
    if !instance.enabled {
        return HealthStatus::unhealthy("disabled");
    }
    let started = Instant::now();
    let mut status = instance.capability.check_health().await;
    if status.response_time_ms.is_none() {
        status.response_time_ms = Some(started.elapsed().as_millis() as u64);
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCapability;
    use serde_json::json;

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register("pw-disabled", false, Arc::new(MockCapability::returning("playwright", json!(1))));
        registry.register("pw-1", true, Arc::new(MockCapability::returning("playwright", json!(2))));
        registry.register("pw-2", true, Arc::new(MockCapability::returning("playwright", json!(3))));
        registry.register("chat-1", true, Arc::new(MockCapability::returning("chat", json!("hi"))));
        registry
    }

    #[test]
    fn auto_selection_picks_first_enabled_instance_of_type() {
        let registry = registry();
        let instance = registry.resolve("playwright", None).expect("should resolve");
        assert_eq!(instance.name, "pw-1");
    }

    #[test]
    fn explicit_name_wins_over_type() {
        let registry = registry();
        let instance = registry.resolve("playwright", Some("pw-2")).expect("should resolve");
        assert_eq!(instance.name, "pw-2");
    }

    #[test]
    fn missing_type_is_reported() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("notify", None),
            Err(CapabilityError::NoInstance { capability_type }) if capability_type == "notify"
        ));
    }

    #[test]
    fn unknown_name_is_reported() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("playwright", Some("ghost")),
            Err(CapabilityError::UnknownInstance(name)) if name == "ghost"
        ));
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut registry = registry();
        registry.register("pw-1", false, Arc::new(MockCapability::returning("playwright", json!(9))));
        assert_eq!(registry.instances().len(), 4);
        assert_eq!(registry.resolve("playwright", None).unwrap().name, "pw-2");
    }

    #[tokio::test]
    async fn invoke_rejects_unadvertised_action() {
        let mut registry = CapabilityRegistry::new();
        registry.register(
            "strict",
            true,
            Arc::new(MockCapability::returning("strict", json!({})).with_actions(&["fetch"])),
        );

        let err = registry.invoke("strict", None, "delete", json!({})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::UnsupportedAction { .. }));

        let (name, result) = registry.invoke("strict", None, "fetch", json!({})).await.unwrap();
        assert_eq!(name, "strict");
        assert!(result.success);
    }

    #[tokio::test]
    async fn disabled_instances_report_unhealthy() {
        let registry = registry();
        let report = registry.check_all_health().await;
        assert_eq!(report.len(), 4);
        assert!(!report[0].status.healthy);
        assert_eq!(report[0].status.message.as_deref(), Some("disabled"));
        assert!(report[1].status.healthy);
    }
}
