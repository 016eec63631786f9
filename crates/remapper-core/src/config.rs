use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Plain-name prefixes whose types are ignored in the old mapping.
    #[serde(default)]
    pub excluded_packages: Vec<String>,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    #[serde(default = "default_true")]
    pub name_anonymous_classes: bool,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            excluded_packages: Vec::new(),
            collector: CollectorSettings::default(),
            max_cycles: default_max_cycles(),
            name_anonymous_classes: true,
        }
    }
}

/// How many pending matches the vote collector commits per cycle: for each
/// kind, `max(min, pending / fraction_divisor)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_min_types")]
    pub min_types: usize,
    #[serde(default = "default_min_methods")]
    pub min_methods: usize,
    #[serde(default = "default_min_fields")]
    pub min_fields: usize,
    #[serde(default = "default_fraction_divisor")]
    pub fraction_divisor: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            min_types: default_min_types(),
            min_methods: default_min_methods(),
            min_fields: default_min_fields(),
            fraction_divisor: default_fraction_divisor(),
        }
    }
}

impl CollectorSettings {
    pub fn quota(&self, min: usize, pending: usize) -> usize {
        let share = pending / self.fraction_divisor.max(1);
        pending.min(min.max(share))
    }
}

fn default_max_cycles() -> u32 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_min_types() -> usize {
    20
}
fn default_min_methods() -> usize {
    50
}
fn default_min_fields() -> usize {
    20
}
fn default_fraction_divisor() -> usize {
    10
}

impl MergeSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: MergeSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
