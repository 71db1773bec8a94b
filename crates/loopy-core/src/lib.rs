//! Loop-puzzle rule engine
//!
//! Mines local deduction rules for Slitherlink-style puzzles from small
//! pattern boards, checks them against exhaustive solution enumeration, and
//! packs them into a byte format that can be scanned against a live board.

pub mod binary;
pub mod board;
pub mod codec;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fca;
pub mod feature;
pub mod feature_set;
pub mod generation;
pub mod rule;
pub mod sat;
pub mod solution_set;
pub mod solver;

pub use binary::{BinaryRuleCollection, BinaryRuleCollectionJson, BoardFeatureState, FeatureSetState};
pub use board::{standard, BoardId, PatternBoard, PatternBoardDescriptor};
pub use config::GenerationConfig;
pub use embedding::{compute_embeddings, Embedding, EmbeddingCache};
pub use error::{Error, Result};
pub use feature::{EdgeState, FaceColorDual, Feature, SectorMask};
pub use feature_set::FeatureSet;
pub use generation::{compact_rules, generate_enumerated_rules, generate_implied_rules};
pub use rule::{MatchState, PatternRule, PatternRuleJson};
pub use solution_set::{SolutionChannels, SolutionSet};
pub use solver::{count_solutions, has_solution, PatternBoardSolver};
