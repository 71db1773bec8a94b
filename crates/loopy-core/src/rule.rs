//! PatternRule: "if the input features hold, the output features hold too".
//!
//! The output always contains the input. A rule whose output adds nothing
//! is trivial; every other rule must keep the solution count of its input
//! unchanged when the output is asserted (or, for highlander rules, hold on
//! every solution that survives the uniqueness filter).

use crate::board::{PatternBoard, PatternBoardDescriptor};
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::feature_set::{FeatureSet, FeatureSetJson};
use crate::solution_set::{indeterminate_edges, SolutionChannels, SolutionSet};
use crate::solver::count_solutions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// How a rule relates to a live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    /// The input contradicts the state
    Incompatible,
    /// The state already implies the output
    Inconsequential,
    /// The input is not yet implied by the state
    Dormant,
    /// The input holds and the output adds something
    Actionable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternRule {
    input: FeatureSet,
    output: FeatureSet,
    highlander: bool,
}

/// JSON form of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRuleJson {
    pub pattern_board: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub highlander: bool,
    pub input: FeatureSetJson,
    pub output: FeatureSetJson,
}

impl PatternRule {
    /// Build a rule, normalizing the output to `input + output`. `None` if
    /// the two contradict.
    pub fn new(input: FeatureSet, output: FeatureSet, highlander: bool) -> Option<Self> {
        debug_assert_eq!(input.board().id(), output.board().id());
        let output = input.union(&output)?;
        Some(PatternRule { input, output, highlander })
    }

    /// Solve `input` and keep whatever holds in every solution. Highlander
    /// rules first drop solutions that are not unique as seen from outside.
    pub fn get_basic_rule(input: &FeatureSet, highlander: bool, channels: SolutionChannels) -> Option<Self> {
        let solutions = SolutionSet::from_feature_set(input, channels)?;
        let solutions = if highlander {
            solutions.with_filtered_highlander_solutions(&indeterminate_edges(input))?
        } else {
            solutions
        };
        let output = solutions.add_to_feature_set(input)?;
        PatternRule::new(input.clone(), output, highlander)
    }

    pub fn board(&self) -> &Arc<PatternBoard> {
        self.input.board()
    }

    pub fn input(&self) -> &FeatureSet {
        &self.input
    }

    pub fn output(&self) -> &FeatureSet {
        &self.output
    }

    pub fn is_highlander(&self) -> bool {
        self.highlander
    }

    /// The output says nothing the input does not.
    pub fn is_trivial(&self) -> bool {
        self.output.is_subset_of(&self.input)
    }

    /// Carry the rule into another board. The input must embed faithfully;
    /// output features without a faithful image are dropped.
    pub fn embedded(&self, embedding: &Embedding, target: &Arc<PatternBoard>) -> Option<PatternRule> {
        let input = self.input.embedded(embedding, target)?;
        let output = self.output.embedded_lossy(embedding, target)?;
        PatternRule::new(input, output, self.highlander)
    }

    /// Every non-trivial image of this rule under `embeddings`.
    pub fn embedded_rules(&self, embeddings: &[Embedding], target: &Arc<PatternBoard>) -> Vec<PatternRule> {
        embeddings
            .iter()
            .filter_map(|e| self.embedded(e, target))
            .filter(|r| !r.is_trivial())
            .collect()
    }

    pub fn get_match_state(&self, state: &FeatureSet) -> MatchState {
        if self.input.is_subset_of(state) {
            if self.output.is_subset_of(state) {
                MatchState::Inconsequential
            } else {
                MatchState::Actionable
            }
        } else if !self.input.is_compatible_with(state) {
            MatchState::Incompatible
        } else if self.output.is_subset_of(state) {
            MatchState::Inconsequential
        } else {
            MatchState::Dormant
        }
    }

    /// Merge the output into `state`. Only valid when actionable.
    pub fn apply(&self, state: &FeatureSet) -> Result<FeatureSet> {
        debug_assert_eq!(self.get_match_state(state), MatchState::Actionable, "applying a rule that is not actionable");
        state.union(&self.output).ok_or_else(|| {
            Error::IncompatibleFeature(format!("rule {} contradicts state {}", self, state))
        })
    }

    /// Whether applying `rules` to this rule's input until nothing fires
    /// already reaches this rule's output. All rules must live on this
    /// rule's board.
    pub fn is_redundant(&self, rules: &[PatternRule]) -> bool {
        let mut state = self.input.clone();
        let mut pending: Vec<&PatternRule> = rules.iter().collect();
        loop {
            if self.output.is_subset_of(&state) {
                return true;
            }
            let mut fired = false;
            let mut dormant = Vec::with_capacity(pending.len());
            for rule in pending {
                debug_assert_eq!(rule.board().id(), self.board().id());
                match rule.get_match_state(&state) {
                    MatchState::Actionable => match rule.apply(&state) {
                        Ok(next) => {
                            state = next;
                            fired = true;
                        }
                        Err(err) => {
                            trace!(%err, "rule pool contradicts candidate input");
                            return true;
                        }
                    },
                    MatchState::Dormant => dormant.push(rule),
                    // Incompatible rules stay incompatible as the state grows
                    MatchState::Incompatible | MatchState::Inconsequential => {}
                }
            }
            if !fired {
                return self.output.is_subset_of(&state);
            }
            pending = dormant;
        }
    }

    /// Whether some automorphism carries `self` onto `other`.
    pub fn is_isomorphic_to(&self, other: &PatternRule, automorphisms: &[Embedding]) -> bool {
        if self.board().id() != other.board().id() || self.highlander != other.highlander {
            return false;
        }
        let board = self.board();
        automorphisms.iter().any(|a| {
            self.input.embedded(a, board).as_ref() == Some(&other.input)
                && self.output.embedded(a, board).as_ref() == Some(&other.output)
        })
    }

    /// Ground truth by brute force: the output removes no solution of the
    /// input. Highlander rules only need to hold on solutions of the input
    /// that survive the uniqueness filter over the face-value clues alone.
    pub fn is_correct_slow(&self) -> bool {
        if self.highlander {
            let clues: Vec<Feature> =
                self.input.face_values().map(|(face, value)| Feature::FaceValue { face, value }).collect();
            let Some(clues) = FeatureSet::from_features(self.board(), &clues) else {
                return true;
            };
            let Some(solutions) = SolutionSet::from_feature_set(&clues, SolutionChannels::edges_only()) else {
                return true;
            };
            let Some(unique) = solutions.with_filtered_highlander_solutions(&indeterminate_edges(&clues)) else {
                return true;
            };
            (0..unique.len())
                .map(|i| unique.solution_edges(i))
                .all(|edges| !self.input.is_satisfied_by(&edges) || self.output.is_satisfied_by(&edges))
        } else {
            count_solutions(&self.input) == count_solutions(&self.output)
        }
    }

    pub fn to_json(&self) -> PatternRuleJson {
        PatternRuleJson {
            pattern_board: self.board().to_descriptor_string(),
            highlander: self.highlander,
            input: self.input.to_json(),
            output: self.output.to_json(),
        }
    }

    /// Parse a rule onto an existing board, which must have the same
    /// descriptor.
    pub fn from_json_with_board(json: &PatternRuleJson, board: &Arc<PatternBoard>) -> Result<Self> {
        let descriptor = PatternBoardDescriptor::from_compact_string(&json.pattern_board)?;
        if &descriptor != board.descriptor() {
            return Err(Error::InvalidDescriptor(format!(
                "rule board {} does not match {}",
                json.pattern_board,
                board.to_descriptor_string()
            )));
        }
        let input = FeatureSet::from_json(board, &json.input)?;
        let output = FeatureSet::from_json(board, &json.output)?;
        PatternRule::new(input, output, json.highlander)
            .ok_or_else(|| Error::IncompatibleFeature(format!("rule output contradicts input on {}", json.pattern_board)))
    }

    /// Parse a rule onto a freshly built board.
    pub fn from_json(json: &PatternRuleJson) -> Result<Self> {
        let board = Arc::new(PatternBoard::from_descriptor_string(&json.pattern_board)?);
        Self::from_json_with_board(json, &board)
    }

    /// Key identifying the rule's content regardless of board identity.
    pub fn content_key(&self) -> String {
        let keys = |set: &FeatureSet| {
            set.features().iter().map(|f| f.canonical_key()).collect::<Vec<_>>().join(" ")
        };
        format!(
            "{}|{}|{}|{}",
            self.board().to_descriptor_string(),
            self.highlander,
            keys(&self.input),
            keys(&self.output)
        )
    }
}

impl fmt::Display for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let added = self.output.without_implied_by(&self.input);
        let added: Vec<String> = added.iter().map(|x| x.to_string()).collect();
        write!(
            f,
            "{}{} => [{}]",
            if self.highlander { "(highlander) " } else { "" },
            self.input,
            added.join(", ")
        )
    }
}
