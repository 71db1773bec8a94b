//! Rule generation pipelines.
//!
//! Both pipelines walk candidate inputs from small to large, derive rules
//! from the solutions of each input, and keep a rule only when the rules
//! already known (prior collection, earlier finds and their symmetric
//! images) cannot reach its output on their own.

use crate::binary::BinaryRuleCollection;
use crate::board::{BoardId, PatternBoard};
use crate::config::GenerationConfig;
use crate::embedding::EmbeddingCache;
use crate::error::Result;
use crate::feature::Feature;
use crate::feature_set::FeatureSet;
use crate::rule::PatternRule;
use crate::solution_set::{indeterminate_edges, SolutionSet};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Rules found so far on one board, with the embedded pool used for
/// redundancy checks.
struct RulePool<'c> {
    board: Arc<PatternBoard>,
    prior: Vec<PatternRule>,
    found: Vec<PatternRule>,
    embedded: Vec<PatternRule>,
    since_compaction: usize,
    compaction_interval: usize,
    cache: &'c mut EmbeddingCache,
}

impl<'c> RulePool<'c> {
    fn new(
        board: &Arc<PatternBoard>,
        prior: &BinaryRuleCollection,
        config: &GenerationConfig,
        cache: &'c mut EmbeddingCache,
    ) -> Result<Self> {
        // Highlander rules assume uniqueness and cannot vouch for general ones
        let prior: Vec<PatternRule> = prior
            .embedded_rules_for(board, cache)?
            .into_iter()
            .filter(|r| config.highlander || !r.is_highlander())
            .collect();
        debug!(board = %board.id(), prior = prior.len(), "rule pool seeded");
        Ok(RulePool {
            board: Arc::clone(board),
            embedded: prior.clone(),
            prior,
            found: Vec::new(),
            since_compaction: 0,
            compaction_interval: config.compaction_interval.max(1),
            cache,
        })
    }

    /// Keep `rule` unless it is trivial or the pool already derives it.
    fn offer(&mut self, rule: PatternRule) -> bool {
        if rule.is_trivial() || rule.is_redundant(&self.embedded) {
            trace!(rule = %rule, "redundant");
            return false;
        }
        trace!(rule = %rule, "new rule");
        let automorphisms = self.cache.get_automorphisms(&self.board);
        self.embedded.extend(rule.embedded_rules(&automorphisms, &self.board));
        self.found.push(rule);
        self.since_compaction += 1;
        if self.since_compaction >= self.compaction_interval {
            self.compact();
        }
        true
    }

    /// Drop finds that later finds made redundant and rebuild the pool.
    fn compact(&mut self) {
        let before = self.found.len();
        let (found, embedded) = filter_against(&self.board, self.prior.clone(), &self.found, self.cache);
        self.found = found;
        self.embedded = embedded;
        self.since_compaction = 0;
        debug!(board = %self.board.id(), before, after = self.found.len(), "compacted rule pool");
    }

    fn len(&self) -> usize {
        self.found.len()
    }

    fn finish(mut self, highlander: bool) -> Result<BinaryRuleCollection> {
        self.compact();
        BinaryRuleCollection::from_rules(&self.found, highlander)
    }
}

fn rule_order(rule: &PatternRule) -> (usize, usize, usize, String) {
    (rule.board().edges.len(), rule.input().size(), rule.output().size(), rule.content_key())
}

/// Greedy pass over `rules` (all on `board`) in size order, keeping the ones
/// `base` and the already kept rules cannot derive. Returns the kept rules
/// and the final pool.
fn filter_against(
    board: &Arc<PatternBoard>,
    base: Vec<PatternRule>,
    rules: &[PatternRule],
    cache: &mut EmbeddingCache,
) -> (Vec<PatternRule>, Vec<PatternRule>) {
    let mut sorted: Vec<&PatternRule> = rules.iter().collect();
    sorted.sort_by_cached_key(|r| rule_order(r));
    let automorphisms = cache.get_automorphisms(board);
    let mut pool = base;
    let mut kept = Vec::new();
    for rule in sorted {
        if rule.is_trivial() || rule.is_redundant(&pool) {
            continue;
        }
        pool.extend(rule.embedded_rules(&automorphisms, board));
        kept.push(rule.clone());
    }
    (kept, pool)
}

/// Reduce `rules` (possibly over several boards) to a subset from which
/// the rest follow. Rules on smaller boards are considered first so their
/// embedded images can cover rules on larger boards.
pub fn compact_rules(rules: &[PatternRule], cache: &mut EmbeddingCache) -> Vec<PatternRule> {
    let mut sorted: Vec<&PatternRule> = rules.iter().collect();
    sorted.sort_by_cached_key(|r| rule_order(r));

    let mut kept: Vec<PatternRule> = Vec::new();
    let mut pools: HashMap<BoardId, (Arc<PatternBoard>, Vec<PatternRule>)> = HashMap::new();
    for rule in sorted {
        let board = rule.board();
        let (_, pool) = match pools.entry(board.id()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut pool = Vec::new();
                for k in &kept {
                    let embeddings = cache.get_embeddings(k.board(), board);
                    pool.extend(k.embedded_rules(&embeddings, board));
                }
                entry.insert((Arc::clone(board), pool))
            }
        };
        if rule.is_trivial() || rule.is_redundant(pool) {
            trace!(rule = %rule, "compacted away");
            continue;
        }
        for (target, pool) in pools.values_mut() {
            let embeddings = cache.get_embeddings(rule.board(), target);
            pool.extend(rule.embedded_rules(&embeddings, target));
        }
        kept.push(rule.clone());
    }
    info!(before = rules.len(), after = kept.len(), "compacted rules");
    kept
}

/// Single features a candidate input is built from. Features sharing a
/// slot (one face, or one edge) never appear together.
struct InputAtoms {
    features: Vec<Feature>,
    slots: Vec<usize>,
    is_edge: Vec<bool>,
}

impl InputAtoms {
    fn new(board: &PatternBoard, face_values: bool, edges: bool) -> Self {
        let mut atoms = InputAtoms { features: Vec::new(), slots: Vec::new(), is_edge: Vec::new() };
        if face_values {
            for face in board.non_exit_faces() {
                for value in 0..=face.edges.len() {
                    atoms.push(Feature::FaceValue { face: face.index, value }, face.index, false);
                }
            }
        }
        if edges {
            for edge in 0..board.edges.len() {
                let slot = board.faces.len() + edge;
                atoms.push(Feature::BlackEdge(edge), slot, true);
                atoms.push(Feature::RedEdge(edge), slot, true);
            }
        }
        atoms
    }

    fn push(&mut self, feature: Feature, slot: usize, is_edge: bool) {
        self.features.push(feature);
        self.slots.push(slot);
        self.is_edge.push(is_edge);
    }

    /// Visit every combination of `size` atoms with distinct slots and at
    /// most `max_edges` edge atoms.
    fn for_each_of_size(
        &self,
        size: usize,
        max_edges: usize,
        visit: &mut dyn FnMut(&[Feature]) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let mut chosen = Vec::with_capacity(size);
        self.choose(0, size, max_edges, &mut chosen, visit)
    }

    fn choose(
        &self,
        start: usize,
        remaining: usize,
        edges_left: usize,
        chosen: &mut Vec<usize>,
        visit: &mut dyn FnMut(&[Feature]) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if remaining == 0 {
            let features: Vec<Feature> = chosen.iter().map(|&i| self.features[i].clone()).collect();
            return visit(&features);
        }
        for i in start..self.features.len() {
            if self.features.len() - i < remaining {
                break;
            }
            if self.is_edge[i] && edges_left == 0 {
                continue;
            }
            if chosen.iter().any(|&c| self.slots[c] == self.slots[i]) {
                continue;
            }
            chosen.push(i);
            let edges_left = if self.is_edge[i] { edges_left - 1 } else { edges_left };
            let flow = self.choose(i + 1, remaining - 1, edges_left, chosen, visit);
            chosen.pop();
            if flow.is_break() {
                return flow;
            }
        }
        ControlFlow::Continue(())
    }
}

/// Basic rules of every small input: combinations of face values and up to
/// `max_fixed_edges` fixed edges, fewest features first.
pub fn generate_enumerated_rules(
    board: &Arc<PatternBoard>,
    prior: &BinaryRuleCollection,
    config: &GenerationConfig,
    cache: &mut EmbeddingCache,
) -> Result<BinaryRuleCollection> {
    info!(board = %board.to_descriptor_string(), highlander = config.highlander, "enumerated rule generation");
    let atoms = InputAtoms::new(board, config.face_values, config.max_fixed_edges > 0);
    let faces = if config.face_values { board.non_exit_faces().count() } else { 0 };
    let max_size = faces + config.max_fixed_edges;
    let channels = config.channels();
    let mut pool = RulePool::new(board, prior, config, cache)?;

    for size in 0..=max_size {
        let mut inputs = 0usize;
        let flow = atoms.for_each_of_size(size, config.max_fixed_edges, &mut |features| {
            let Some(input) = FeatureSet::from_features(board, features) else {
                return ControlFlow::Continue(());
            };
            inputs += 1;
            if let Some(rule) = PatternRule::get_basic_rule(&input, config.highlander, channels) {
                if pool.offer(rule) && config.is_full(pool.len()) {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        debug!(size, inputs, rules = pool.len(), "enumerated input size");
        if flow.is_break() {
            info!(rules = pool.len(), "rule cap reached");
            break;
        }
    }

    let collection = pool.finish(config.highlander)?;
    info!(rules = collection.size(), "enumerated rule generation finished");
    Ok(collection)
}

/// Rules read off the formal context of each face-value assignment.
pub fn generate_implied_rules(
    board: &Arc<PatternBoard>,
    prior: &BinaryRuleCollection,
    config: &GenerationConfig,
    cache: &mut EmbeddingCache,
) -> Result<BinaryRuleCollection> {
    info!(board = %board.to_descriptor_string(), highlander = config.highlander, "implied rule generation");
    let atoms = InputAtoms::new(board, config.face_values, false);
    let faces = if config.face_values { board.non_exit_faces().count() } else { 0 };
    let channels = config.channels();
    let mut pool = RulePool::new(board, prior, config, cache)?;
    let mut failure = None;

    for size in 0..=faces {
        let flow = atoms.for_each_of_size(size, 0, &mut |features| {
            let Some(input) = FeatureSet::from_features(board, features) else {
                return ControlFlow::Continue(());
            };
            let Some(solutions) = SolutionSet::from_feature_set(&input, channels) else {
                return ControlFlow::Continue(());
            };
            let solutions = if config.highlander {
                match solutions.with_filtered_highlander_solutions(&indeterminate_edges(&input)) {
                    Some(filtered) => filtered,
                    None => return ControlFlow::Continue(()),
                }
            } else {
                solutions
            };
            let mut rules = match solutions.get_implied_rules(&input, config.highlander) {
                Ok(rules) => rules,
                Err(err) => {
                    failure = Some(err);
                    return ControlFlow::Break(());
                }
            };
            rules.sort_by_cached_key(rule_order);
            trace!(input = %input, candidates = rules.len(), "implications");
            for rule in rules {
                if pool.offer(rule) && config.is_full(pool.len()) {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        debug!(size, rules = pool.len(), "face value assignments done");
        if let Some(err) = failure.take() {
            return Err(err);
        }
        if flow.is_break() {
            info!(rules = pool.len(), "rule cap reached");
            break;
        }
    }

    let collection = pool.finish(config.highlander)?;
    info!(rules = collection.size(), "implied rule generation finished");
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::standard;
    use crate::solution_set::SolutionChannels;

    fn square() -> Arc<PatternBoard> {
        Arc::new(PatternBoard::new(standard::square()).unwrap())
    }

    fn edges_config() -> GenerationConfig {
        GenerationConfig { max_rules: None, ..GenerationConfig::quick() }
    }

    #[test]
    fn test_atoms_respect_slots_and_edge_limit() {
        let board = square();
        let atoms = InputAtoms::new(&board, true, true);
        let mut seen = 0;
        let _ = atoms.for_each_of_size(2, 1, &mut |features| {
            seen += 1;
            let edges = features.iter().filter(|f| !matches!(f, Feature::FaceValue { .. })).count();
            assert!(edges <= 1);
            assert!(features.iter().filter(|f| matches!(f, Feature::FaceValue { .. })).count() <= 1);
            ControlFlow::Continue(())
        });
        // one face value (5 choices) with one of 8 edges in two states
        assert_eq!(seen, 5 * 16);
    }

    #[test]
    fn test_enumerated_rules_are_sound_and_cover_zero() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let collection =
            generate_enumerated_rules(&board, &BinaryRuleCollection::empty(false), &edges_config(), &mut cache).unwrap();
        let rules = collection.rules().unwrap();
        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(rule.is_correct_slow(), "unsound rule {}", rule);
            assert!(!rule.is_trivial());
        }
        let zero = FeatureSet::empty(&board).with_face_value(0, 0).unwrap();
        let zero_rule = PatternRule::get_basic_rule(&zero, false, SolutionChannels::edges_only()).unwrap();
        assert!(zero_rule.is_redundant(&rules));
    }

    #[test]
    fn test_prior_rules_suppress_rediscovery() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let config = edges_config();
        let first = generate_enumerated_rules(&board, &BinaryRuleCollection::empty(false), &config, &mut cache).unwrap();
        let second = generate_enumerated_rules(&board, &first, &config, &mut cache).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_rule_cap() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let config = GenerationConfig { max_rules: Some(1), ..GenerationConfig::quick() };
        let collection =
            generate_enumerated_rules(&board, &BinaryRuleCollection::empty(false), &config, &mut cache).unwrap();
        assert_eq!(collection.size(), 1);
    }

    #[test]
    fn test_implied_rules_are_sound() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let collection =
            generate_implied_rules(&board, &BinaryRuleCollection::empty(false), &edges_config(), &mut cache).unwrap();
        assert!(collection.size() > 0);
        for rule in collection.rules().unwrap() {
            assert!(rule.is_correct_slow(), "unsound rule {}", rule);
        }
    }

    #[test]
    fn test_compact_drops_symmetric_copies() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let input = FeatureSet::empty(&board).with_face_value(0, 3).unwrap();
        let rule = PatternRule::get_basic_rule(&input, false, SolutionChannels::default()).unwrap();
        let automorphisms = cache.get_automorphisms(&board);
        let mut rules = rule.embedded_rules(&automorphisms, &board);
        rules.push(rule);
        let compacted = compact_rules(&rules, &mut cache);
        assert_eq!(compacted.len(), 1);
    }

    #[test]
    fn test_compact_across_boards() {
        let square = square();
        let domino = Arc::new(PatternBoard::new(standard::domino()).unwrap());
        let mut cache = EmbeddingCache::new();
        let small = FeatureSet::empty(&square).with_face_value(0, 0).unwrap();
        let small_rule = PatternRule::get_basic_rule(&small, false, SolutionChannels::edges_only()).unwrap();
        let large = FeatureSet::empty(&domino).with_face_value(0, 0).unwrap();
        let large_rule = PatternRule::get_basic_rule(&large, false, SolutionChannels::edges_only()).unwrap();
        let compacted = compact_rules(&[large_rule, small_rule.clone()], &mut cache);
        assert_eq!(compacted, vec![small_rule]);
    }

    fn assert_highlander_rules_sound(collection: &BinaryRuleCollection) {
        assert!(collection.is_highlander());
        for rule in collection.rules().unwrap() {
            assert!(rule.is_highlander());
            assert!(rule.is_correct_slow(), "unsound highlander rule {}", rule);
        }
    }

    #[test]
    fn test_highlander_rules_are_sound() {
        let boards = [
            (square(), None),
            (Arc::new(PatternBoard::new(standard::corner_square()).unwrap()), None),
            (Arc::new(PatternBoard::new(standard::square_2x2()).unwrap()), Some(20)),
        ];
        for (board, max_rules) in boards {
            let config = GenerationConfig { highlander: true, max_rules, ..GenerationConfig::quick() };
            let mut cache = EmbeddingCache::new();
            let prior = BinaryRuleCollection::empty(true);

            let implied = generate_implied_rules(&board, &prior, &config, &mut cache).unwrap();
            assert!(implied.size() > 0, "no implied rules on {}", board.to_descriptor_string());
            assert_highlander_rules_sound(&implied);

            let enumerated = generate_enumerated_rules(&board, &prior, &config, &mut cache).unwrap();
            assert!(enumerated.size() > 0, "no enumerated rules on {}", board.to_descriptor_string());
            assert_highlander_rules_sound(&enumerated);
        }
    }

    #[test]
    fn test_plain_generation_skips_highlander_prior() {
        let board = square();
        let mut cache = EmbeddingCache::new();
        let config = GenerationConfig { highlander: true, ..edges_config() };
        let highlander = generate_enumerated_rules(&board, &BinaryRuleCollection::empty(true), &config, &mut cache).unwrap();
        let plain = generate_enumerated_rules(&board, &highlander, &edges_config(), &mut cache).unwrap();
        let fresh =
            generate_enumerated_rules(&board, &BinaryRuleCollection::empty(false), &edges_config(), &mut cache).unwrap();
        assert_eq!(plain.size(), fresh.size());
        for rule in plain.rules().unwrap() {
            assert!(!rule.is_highlander());
            assert!(rule.is_correct_slow(), "unsound rule {}", rule);
        }
    }
}
