//! Node capability budget

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::proposal::Requirements;

/// Resources this node offers to the swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub cpu: f64,
    pub memory: f64,
    pub bandwidth: f64,
    pub storage: f64,

    /// Upper bound on tasks executing at once
    #[serde(rename = "max-concurrent-tasks", alias = "maxConcurrentTasks")]
    pub max_concurrent_tasks: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            cpu: 4.0,
            memory: 8192.0,
            bandwidth: 100.0,
            storage: 100.0,
            max_concurrent_tasks: 5,
        }
    }
}

/// Partial capability update; only provided fields change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesUpdate {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub bandwidth: Option<f64>,
    pub storage: Option<f64>,
    pub max_concurrent_tasks: Option<usize>,
}

impl Capabilities {
    /// Feasibility gate: every requirement fits and a task slot is free
    pub fn can_handle(&self, requirements: &Requirements, active_tasks: usize) -> bool {
        let fits = requirements.cpu <= self.cpu
            && requirements.memory <= self.memory
            && requirements.bandwidth <= self.bandwidth
            && requirements.storage <= self.storage;
        let has_slot = active_tasks < self.max_concurrent_tasks;
        debug!(fits, has_slot, active_tasks, "Capabilities::can_handle");
        fits && has_slot
    }

    pub fn merge(&mut self, update: CapabilitiesUpdate) {
        if let Some(cpu) = update.cpu {
            self.cpu = cpu;
        }
        if let Some(memory) = update.memory {
            self.memory = memory;
        }
        if let Some(bandwidth) = update.bandwidth {
            self.bandwidth = bandwidth;
        }
        if let Some(storage) = update.storage {
            self.storage = storage;
        }
        if let Some(max) = update.max_concurrent_tasks {
            self.max_concurrent_tasks = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let caps = Capabilities::default();
        assert_eq!(caps.cpu, 4.0);
        assert_eq!(caps.memory, 8192.0);
        assert_eq!(caps.bandwidth, 100.0);
        assert_eq!(caps.storage, 100.0);
        assert_eq!(caps.max_concurrent_tasks, 5);
    }

    #[test]
    fn test_default_requirements_fit_default_capabilities() {
        assert!(Capabilities::default().can_handle(&Requirements::default(), 0));
    }

    #[test]
    fn test_zero_cpu_node_rejects() {
        let caps = Capabilities {
            cpu: 0.0,
            ..Capabilities::default()
        };
        assert!(!caps.can_handle(&Requirements::default(), 0));
    }

    #[test]
    fn test_full_slots_reject() {
        let caps = Capabilities::default();
        assert!(!caps.can_handle(&Requirements::default(), 5));
        assert!(caps.can_handle(&Requirements::default(), 4));
    }

    #[test]
    fn test_merge_partial() {
        let mut caps = Capabilities::default();
        caps.merge(CapabilitiesUpdate {
            cpu: Some(16.0),
            max_concurrent_tasks: Some(1),
            ..Default::default()
        });
        assert_eq!(caps.cpu, 16.0);
        assert_eq!(caps.memory, 8192.0);
        assert_eq!(caps.max_concurrent_tasks, 1);
    }

    #[test]
    fn test_yaml_keys() {
        let caps: Capabilities = serde_yaml::from_str("cpu: 2\nmax-concurrent-tasks: 9\n").unwrap();
        assert_eq!(caps.cpu, 2.0);
        assert_eq!(caps.memory, 8192.0);
        assert_eq!(caps.max_concurrent_tasks, 9);
    }

    fn requirement() -> impl Strategy<Value = f64> {
        0.0f64..200.0
    }

    proptest! {
        #[test]
        fn prop_gate_matches_fieldwise_comparison(
            cpu in requirement(),
            memory in 0.0f64..10_000.0,
            bandwidth in requirement(),
            storage in requirement(),
            active in 0usize..10,
        ) {
            let caps = Capabilities::default();
            let req = Requirements { cpu, memory, bandwidth, storage };
            let expected = cpu <= caps.cpu
                && memory <= caps.memory
                && bandwidth <= caps.bandwidth
                && storage <= caps.storage
                && active < caps.max_concurrent_tasks;
            prop_assert_eq!(caps.can_handle(&req, active), expected);
        }

        #[test]
        fn prop_any_field_over_budget_rejects(over in 0.001f64..1000.0, field in 0usize..4) {
            let caps = Capabilities::default();
            let mut req = Requirements::default();
            match field {
                0 => req.cpu = caps.cpu + over,
                1 => req.memory = caps.memory + over,
                2 => req.bandwidth = caps.bandwidth + over,
                _ => req.storage = caps.storage + over,
            }
            prop_assert!(!caps.can_handle(&req, 0));
        }
    }
}
