use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Group every spawn without an explicit group belongs to. Always active.
pub const DEFAULT_GROUP_ID: u32 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnGroupFlags {
    /// Engine-owned group that can't be toggled.
    pub system: bool,
    /// Starts inactive; only an explicit trigger activates it.
    pub manual_spawn: bool,
    pub escort_quest_npc: bool,
    pub despawn_on_condition_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnGroupTemplate {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flags: SpawnGroupFlags,
    /// Activation is re-evaluated against the condition evaluator on respawn checks.
    #[serde(default)]
    pub has_condition: bool,
}

impl SpawnGroupTemplate {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: SpawnGroupFlags::default(),
            has_condition: false,
        }
    }

    fn default_group() -> Self {
        let mut template = Self::new(DEFAULT_GROUP_ID, "default");
        template.flags.system = true;
        template
    }

    pub fn auto_active(&self) -> bool {
        !self.flags.manual_spawn
    }
}

/// Immutable group definitions shared by every map.
pub type SpawnGroupTemplates = Arc<BTreeMap<u32, SpawnGroupTemplate>>;

pub fn build_templates(groups: impl IntoIterator<Item = SpawnGroupTemplate>) -> SpawnGroupTemplates {
    let mut templates: BTreeMap<u32, SpawnGroupTemplate> = groups
        .into_iter()
        .map(|template| (template.id, template))
        .collect();
    templates
        .entry(DEFAULT_GROUP_ID)
        .or_insert_with(SpawnGroupTemplate::default_group);
    Arc::new(templates)
}

/// Per-map activation state over the shared templates.
///
/// Only groups toggled away from their static default are stored.
#[derive(Debug, Clone)]
pub struct SpawnGroupRegistry {
    templates: SpawnGroupTemplates,
    toggled: HashSet<u32>,
}

impl SpawnGroupRegistry {
    pub fn new(templates: SpawnGroupTemplates) -> Self {
        Self {
            templates,
            toggled: HashSet::new(),
        }
    }

    pub fn template(&self, group_id: u32) -> Option<&SpawnGroupTemplate> {
        self.templates.get(&group_id)
    }

    /// Unknown groups read as inactive.
    pub fn is_active(&self, group_id: u32) -> bool {
        let Some(template) = self.templates.get(&group_id) else {
            return false;
        };
        if template.flags.system {
            return true;
        }
        template.auto_active() != self.toggled.contains(&group_id)
    }

    pub fn set_active(&mut self, group_id: u32, active: bool) -> Result<(), String> {
        let template = self
            .templates
            .get(&group_id)
            .ok_or_else(|| format!("unknown spawn group {}", group_id))?;
        if template.flags.system {
            return Err(format!("spawn group {} is a system group", group_id));
        }
        if active == template.auto_active() {
            self.toggled.remove(&group_id);
        } else {
            self.toggled.insert(group_id);
        }
        Ok(())
    }

    pub fn is_escort_group(&self, group_id: u32) -> bool {
        self.template(group_id)
            .map_or(false, |template| template.flags.escort_quest_npc)
    }

    /// Groups whose activation follows an external condition. Manual groups are excluded.
    pub fn conditional_groups(&self) -> Vec<&SpawnGroupTemplate> {
        self.templates
            .values()
            .filter(|template| {
                template.has_condition && !template.flags.system && !template.flags.manual_spawn
            })
            .collect()
    }

    pub fn templates(&self) -> &SpawnGroupTemplates {
        &self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SpawnGroupRegistry {
        let mut manual = SpawnGroupTemplate::new(2, "event");
        manual.flags.manual_spawn = true;
        let mut conditional = SpawnGroupTemplate::new(3, "night");
        conditional.has_condition = true;
        conditional.flags.despawn_on_condition_failure = true;
        SpawnGroupRegistry::new(build_templates([
            SpawnGroupTemplate::new(1, "camp"),
            manual,
            conditional,
        ]))
    }

    #[test]
    fn defaults_follow_manual_flag() {
        let registry = registry();
        assert!(registry.is_active(DEFAULT_GROUP_ID));
        assert!(registry.is_active(1));
        assert!(!registry.is_active(2));
        assert!(!registry.is_active(99));
    }

    #[test]
    fn toggling_round_trips_to_default() {
        let mut registry = registry();
        registry.set_active(1, false).unwrap();
        assert!(!registry.is_active(1));
        registry.set_active(1, true).unwrap();
        assert!(registry.is_active(1));
        registry.set_active(2, true).unwrap();
        assert!(registry.is_active(2));
    }

    #[test]
    fn system_and_unknown_groups_cannot_be_toggled() {
        let mut registry = registry();
        assert!(registry.set_active(DEFAULT_GROUP_ID, false).is_err());
        assert!(registry.set_active(42, true).is_err());
        assert!(registry.is_active(DEFAULT_GROUP_ID));
    }

    #[test]
    fn state_is_per_registry() {
        let first = registry();
        let mut second = SpawnGroupRegistry::new(Arc::clone(first.templates()));
        second.set_active(1, false).unwrap();
        assert!(first.is_active(1));
        assert!(!second.is_active(1));
    }

    #[test]
    fn conditional_groups_skip_manual() {
        let registry = registry();
        let ids: Vec<u32> = registry.conditional_groups().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3]);
    }
}
