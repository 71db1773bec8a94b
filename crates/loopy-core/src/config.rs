//! Generation settings.

use crate::error::Result;
use crate::solution_set::SolutionChannels;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the rule generation pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Enumerate face values in rule inputs
    pub face_values: bool,
    /// Record sector knowledge in rule outputs
    pub sectors: bool,
    /// Record face color duals in rule outputs
    pub face_colors: bool,
    /// Mine rules that assume the puzzle has a unique solution
    pub highlander: bool,
    /// Most edges fixed black or red in one enumerated input
    pub max_fixed_edges: usize,
    /// New rules found between two compactions of the rule pool
    pub compaction_interval: usize,
    /// Stop after this many new rules
    pub max_rules: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            face_values: true,
            sectors: true,
            face_colors: true,
            highlander: false,
            max_fixed_edges: 2,
            compaction_interval: 100,
            max_rules: None,
        }
    }
}

impl GenerationConfig {
    /// Edges only, one fixed edge: finishes in seconds on small boards.
    pub fn quick() -> Self {
        Self {
            face_values: true,
            sectors: false,
            face_colors: false,
            highlander: false,
            max_fixed_edges: 1,
            compaction_interval: 50,
            max_rules: Some(500),
        }
    }

    pub fn thorough() -> Self {
        Self {
            face_values: true,
            sectors: true,
            face_colors: true,
            highlander: false,
            max_fixed_edges: 3,
            compaction_interval: 250,
            max_rules: None,
        }
    }

    pub fn highlander() -> Self {
        Self {
            highlander: true,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Solution channels the pipelines record.
    pub fn channels(&self) -> SolutionChannels {
        SolutionChannels {
            sectors: self.sectors,
            face_colors: self.face_colors,
        }
    }

    /// Whether `count` new rules reach the cap.
    pub fn is_full(&self, count: usize) -> bool {
        self.max_rules.is_some_and(|max| count >= max)
    }
}
