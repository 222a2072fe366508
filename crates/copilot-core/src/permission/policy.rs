//! The immutable policy snapshot and effective-policy computation
//! (`spec.md` §3, §4.1 step 4).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::groups::ToolGroup;

/// One group's stored policy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyValue {
    Off,
    #[default]
    Ask,
    Always,
}

/// The developer override, applied only to the four dangerous groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeveloperOverride {
    #[default]
    None,
    Off,
    Ask,
    Always,
}

impl DeveloperOverride {
    fn as_policy_value(self) -> Option<PolicyValue> {
        match self {
            DeveloperOverride::None => Option::None,
            DeveloperOverride::Off => Some(PolicyValue::Off),
            DeveloperOverride::Ask => Some(PolicyValue::Ask),
            DeveloperOverride::Always => Some(PolicyValue::Always),
        }
    }
}

/// Immutable value holding per-group policies for all six tool groups, plus
/// the developer override and the master memory toggle. A new snapshot
/// entirely replaces the prior one; readers observe one consistent
/// snapshot per read (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySnapshot {
    groups: HashMap<ToolGroup, PolicyValue>,
    pub developer_override: DeveloperOverride,
    pub memory_enabled: bool,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        let mut groups = HashMap::new();
        for group in ToolGroup::all() {
            groups.insert(*group, PolicyValue::Ask);
        }
        Self {
            groups,
            developer_override: DeveloperOverride::None,
            memory_enabled: true,
        }
    }
}

impl PolicySnapshot {
    pub fn with_group(mut self, group: ToolGroup, value: PolicyValue) -> Self {
        self.groups.insert(group, value);
        self
    }

    pub fn stored_value(&self, group: ToolGroup) -> PolicyValue {
        self.groups.get(&group).copied().unwrap_or_default()
    }

    /// Compute the effective policy for `group`, applying the developer
    /// override (for dangerous groups) and the master memory toggle
    /// (for memory groups), per `spec.md` §4.1 step 4.
    ///
    /// Invariant: when master memory is disabled, both memory groups
    /// behave as `Off` regardless of their stored value or any override.
    pub fn effective_policy(&self, group: ToolGroup) -> PolicyValue {
        if group.is_memory() && !self.memory_enabled {
            return PolicyValue::Off;
        }
        if group.is_dangerous() {
            if let Some(overridden) = self.developer_override.as_policy_value() {
                return overridden;
            }
        }
        self.stored_value(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_asks_for_every_group() {
        let snap = PolicySnapshot::default();
        for group in ToolGroup::all() {
            assert_eq!(snap.effective_policy(*group), PolicyValue::Ask);
        }
    }

    #[test]
    fn memory_off_dominates_stored_always_and_override() {
        let snap = PolicySnapshot::default()
            .with_group(ToolGroup::MemoryRead, PolicyValue::Always)
            .with_group(ToolGroup::MemoryWrite, PolicyValue::Always);
        let snap = PolicySnapshot {
            memory_enabled: false,
            developer_override: DeveloperOverride::Always,
            ..snap
        };
        assert_eq!(
            snap.effective_policy(ToolGroup::MemoryRead),
            PolicyValue::Off
        );
        assert_eq!(
            snap.effective_policy(ToolGroup::MemoryWrite),
            PolicyValue::Off
        );
    }

    #[test]
    fn developer_override_wins_for_dangerous_groups() {
        let snap = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Off);
        let snap = PolicySnapshot {
            developer_override: DeveloperOverride::Always,
            ..snap
        };
        assert_eq!(snap.effective_policy(ToolGroup::Web), PolicyValue::Always);
    }

    #[test]
    fn developer_override_none_falls_through_to_stored_value() {
        let snap = PolicySnapshot::default().with_group(ToolGroup::Files, PolicyValue::Off);
        assert_eq!(snap.effective_policy(ToolGroup::Files), PolicyValue::Off);
    }

    #[test]
    fn developer_override_does_not_apply_to_memory_groups() {
        let snap = PolicySnapshot::default().with_group(ToolGroup::MemoryRead, PolicyValue::Off);
        let snap = PolicySnapshot {
            developer_override: DeveloperOverride::Always,
            ..snap
        };
        // Override only applies to the four dangerous groups, not memory.
        assert_eq!(
            snap.effective_policy(ToolGroup::MemoryRead),
            PolicyValue::Off
        );
    }

    #[test]
    fn serde_round_trip_preserves_all_fields() {
        let snap = PolicySnapshot::default()
            .with_group(ToolGroup::Web, PolicyValue::Always)
            .with_group(ToolGroup::System, PolicyValue::Off);
        let snap = PolicySnapshot {
            developer_override: DeveloperOverride::Ask,
            memory_enabled: false,
            ..snap
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: PolicySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
