//! SolutionSet: every solution of a (board, features) pair, bit-packed.
//!
//! Each solution becomes a fixed-width record:
//!
//! - 3 bits per edge: black, certainly red, original black,
//! - 3 bits per sector (if requested): count 0 / 1 / 2 impossible,
//! - 2 bits per connected face pair (if requested): same / opposite color.
//!
//! ANDing all records gives the facts true in every solution, which is how
//! a feature set is strengthened. Transformations return new sets, or
//! `None` when nothing survives.

use crate::board::PatternBoard;
use crate::error::Result;
use crate::fca::{FormalContext, PatternAttributeSetMapping};
use crate::feature::{EdgeState, FaceColorDual, Feature, SectorMask};
use crate::feature_set::FeatureSet;
use crate::rule::PatternRule;
use crate::solver::PatternBoardSolver;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Which optional channels a solution set records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SolutionChannels {
    pub sectors: bool,
    pub face_colors: bool,
}

impl Default for SolutionChannels {
    fn default() -> Self {
        SolutionChannels { sectors: true, face_colors: true }
    }
}

impl SolutionChannels {
    pub fn edges_only() -> Self {
        SolutionChannels { sectors: false, face_colors: false }
    }
}

/// Bit layout of one solution record.
#[derive(Debug, Clone)]
pub struct SolutionShape {
    channels: SolutionChannels,
    num_edges: usize,
    num_sectors: usize,
    face_pairs: Vec<(usize, usize)>,
    sector_offset: usize,
    face_offset: usize,
    num_bits: usize,
    words: usize,
}

impl SolutionShape {
    pub fn new(board: &PatternBoard, channels: SolutionChannels) -> Self {
        let num_edges = board.edges.len();
        let num_sectors = if channels.sectors { board.sectors.len() } else { 0 };
        let face_pairs = if channels.face_colors {
            board.face_connectivity().pairs.clone()
        } else {
            Vec::new()
        };
        let sector_offset = 3 * num_edges;
        let face_offset = sector_offset + 3 * num_sectors;
        let num_bits = face_offset + 2 * face_pairs.len();
        SolutionShape {
            channels,
            num_edges,
            num_sectors,
            face_pairs,
            sector_offset,
            face_offset,
            num_bits,
            words: num_bits.div_ceil(64).max(1),
        }
    }

    pub fn channels(&self) -> SolutionChannels {
        self.channels
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn face_pairs(&self) -> &[(usize, usize)] {
        &self.face_pairs
    }

    pub fn edge_black_bit(&self, edge: usize) -> usize {
        3 * edge
    }

    pub fn edge_red_bit(&self, edge: usize) -> usize {
        3 * edge + 1
    }

    pub fn edge_original_bit(&self, edge: usize) -> usize {
        3 * edge + 2
    }

    pub fn sector_not_bit(&self, sector: usize, count: usize) -> usize {
        self.sector_offset + 3 * sector + count
    }

    pub fn face_pair_bit(&self, pair: usize, opposite: bool) -> usize {
        self.face_offset + 2 * pair + usize::from(opposite)
    }

    /// Pack one edge assignment into a record.
    fn encode(&self, board: &PatternBoard, edges: &[bool]) -> Vec<u64> {
        let mut record = vec![0u64; self.words];
        let mut set = |bit: usize| record[bit / 64] |= 1 << (bit % 64);

        for edge in &board.edges {
            let e = edge.index;
            if edges[e] {
                set(self.edge_black_bit(e));
                set(self.edge_original_bit(e));
            } else if !edge.is_exit || exit_inner_degree(board, edge.index, edges) == 2 {
                // An exit with no strand reaching it could still hide two
                // black edges behind it
                set(self.edge_red_bit(e));
            }
        }

        for sector in 0..self.num_sectors {
            let [a, b] = board.sectors[sector].edges;
            let count = usize::from(edges[a]) + usize::from(edges[b]);
            for k in (0..=2).filter(|&k| k != count) {
                set(self.sector_not_bit(sector, k));
            }
        }

        if !self.face_pairs.is_empty() {
            let connectivity = board.face_connectivity();
            for (pair, path) in connectivity.paths.iter().enumerate() {
                let odd = path.iter().filter(|&&e| edges[e]).count() % 2 == 1;
                set(self.face_pair_bit(pair, odd));
            }
        }
        record
    }
}

/// Black non-exit edges at the vertex an exit edge hangs off.
fn exit_inner_degree(board: &PatternBoard, exit_edge: usize, edges: &[bool]) -> usize {
    match board.edges[exit_edge].exit_vertex {
        Some(v) => board.vertices[v].edges.iter().filter(|&&e| edges[e]).count(),
        None => 0,
    }
}

#[derive(Debug, Clone)]
pub struct SolutionSet {
    board: Arc<PatternBoard>,
    shape: Arc<SolutionShape>,
    /// `len * shape.words` words, one record after another
    data: Vec<u64>,
    len: usize,
}

impl SolutionSet {
    /// Enumerate and pack every solution. `None` if there are none.
    pub fn from_feature_set(features: &FeatureSet, channels: SolutionChannels) -> Option<SolutionSet> {
        let board = Arc::clone(features.board());
        let shape = Arc::new(SolutionShape::new(&board, channels));
        let mut data = Vec::new();
        let mut len = 0;
        PatternBoardSolver::new(features).for_each_solution(|edges| {
            data.extend(shape.encode(&board, edges));
            len += 1;
        });
        debug!(board = %board.id(), solutions = len, "enumerated solutions");
        if len == 0 {
            return None;
        }
        Some(SolutionSet { board, shape, data, len })
    }

    pub fn board(&self) -> &Arc<PatternBoard> {
        &self.board
    }

    pub fn shape(&self) -> &SolutionShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn record(&self, index: usize) -> &[u64] {
        let words = self.shape.words;
        &self.data[index * words..(index + 1) * words]
    }

    fn bit(record: &[u64], bit: usize) -> bool {
        record[bit / 64] & (1 << (bit % 64)) != 0
    }

    /// The edge assignment of one solution.
    pub fn solution_edges(&self, index: usize) -> Vec<bool> {
        let record = self.record(index);
        (0..self.shape.num_edges)
            .map(|e| Self::bit(record, self.shape.edge_original_bit(e)))
            .collect()
    }

    /// Keep the solutions whose records pass `keep`.
    fn with_records(&self, keep: impl Fn(usize, &[u64]) -> bool) -> Option<SolutionSet> {
        let mut data = Vec::new();
        let mut len = 0;
        for i in 0..self.len {
            let record = self.record(i);
            if keep(i, record) {
                data.extend_from_slice(record);
                len += 1;
            }
        }
        (len > 0).then(|| SolutionSet {
            board: Arc::clone(&self.board),
            shape: Arc::clone(&self.shape),
            data,
            len,
        })
    }

    /// Keep the solutions whose edge assignment passes `keep`.
    pub fn with_filter(&self, keep: impl Fn(&[bool]) -> bool) -> Option<SolutionSet> {
        self.with_records(|i, _| keep(&self.solution_edges(i)))
    }

    pub fn with_face_value(&self, face: usize, value: usize) -> Option<SolutionSet> {
        let edges = self.board.faces[face].edges.clone();
        self.with_records(|_, record| {
            edges
                .iter()
                .filter(|&&e| Self::bit(record, self.shape.edge_original_bit(e)))
                .count()
                == value
        })
    }

    /// One solution set per face value that occurs, in increasing value.
    pub fn partitioned_by_face_value(&self, face: usize) -> Vec<(usize, SolutionSet)> {
        (0..=self.board.faces[face].edges.len())
            .filter_map(|value| self.with_face_value(face, value).map(|s| (value, s)))
            .collect()
    }

    /// Keep only solutions that nothing outside the pattern could tell
    /// apart from another one: solutions sharing their indeterminate edges
    /// and their exit-to-exit strand pairing are all dropped.
    pub fn with_filtered_highlander_solutions(&self, indeterminate_edges: &[usize]) -> Option<SolutionSet> {
        let keys: Vec<(Vec<bool>, Vec<(Port, Port)>)> = (0..self.len)
            .map(|i| {
                let edges = self.solution_edges(i);
                let visible = indeterminate_edges.iter().map(|&e| edges[e]).collect();
                (visible, loop_connections(&self.board, &edges))
            })
            .collect();
        let mut counts: HashMap<&(Vec<bool>, Vec<(Port, Port)>), usize> = HashMap::new();
        for key in &keys {
            *counts.entry(key).or_insert(0) += 1;
        }
        self.with_records(|i, _| counts.get(&keys[i]) == Some(&1))
    }

    /// Add to `features` everything true in every solution. `None` if the
    /// result contradicts `features`.
    pub fn add_to_feature_set(&self, features: &FeatureSet) -> Option<FeatureSet> {
        let shape = &self.shape;
        let mut all = vec![u64::MAX; shape.words];
        for i in 0..self.len {
            for (word, r) in all.iter_mut().zip(self.record(i)) {
                *word &= r;
            }
        }

        let mut set = features.clone();
        for e in 0..shape.num_edges {
            if Self::bit(&all, shape.edge_black_bit(e)) {
                set.insert(&Feature::BlackEdge(e))?;
            }
            if Self::bit(&all, shape.edge_red_bit(e)) {
                set.insert(&Feature::RedEdge(e))?;
            }
        }

        for sector in 0..shape.num_sectors {
            let mut mask = SectorMask::ALL;
            for count in 0..=2 {
                if Self::bit(&all, shape.sector_not_bit(sector, count)) {
                    mask = mask.intersection(SectorMask::from_bits(!(1u8 << count)));
                }
            }
            if mask != SectorMask::ALL {
                for feature in mask.minimal_features(sector, SectorMask::ALL) {
                    set.insert(&feature)?;
                }
            }
        }

        if !shape.face_pairs.is_empty() {
            let connectivity = self.board.face_connectivity();
            for (pair, &(a, b)) in shape.face_pairs.iter().enumerate() {
                let same = Self::bit(&all, shape.face_pair_bit(pair, false));
                let opposite = Self::bit(&all, shape.face_pair_bit(pair, true));
                if !same && !opposite {
                    continue;
                }
                // Already pinned down by known edges on the path
                let path = &connectivity.paths[pair];
                if path.iter().all(|&e| set.edge_state(e) != EdgeState::White) {
                    continue;
                }
                let dual = if opposite {
                    FaceColorDual::new(vec![a], vec![b])
                } else {
                    FaceColorDual::new(vec![a, b], vec![])
                };
                if let Some(dual) = dual {
                    set.insert(&Feature::FaceColorDual(dual))?;
                }
            }
        }
        Some(set)
    }

    /// Rules read off the stem base of the solutions' formal context. Each
    /// implication becomes `input + antecedent => input + closure`.
    pub fn get_implied_rules(&self, input: &FeatureSet, highlander: bool) -> Result<Vec<PatternRule>> {
        let mapping = PatternAttributeSetMapping::new(&self.board, &self.shape);
        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        for i in 0..self.len {
            for object in mapping.objects_for_record(&self.shape, self.record(i))? {
                if seen.insert(object.clone()) {
                    objects.push(object);
                }
            }
        }
        let context = FormalContext::new(mapping.num_attributes(), objects);
        let (intents, implications) = context.get_intents_and_implications();
        debug!(
            board = %self.board.id(),
            attributes = context.num_attributes(),
            objects = context.objects().len(),
            intents = intents.len(),
            implications = implications.len(),
            "formal context analysed"
        );

        let mut rules = Vec::new();
        for implication in implications {
            if !context.is_realized(&implication.antecedent) {
                continue;
            }
            let antecedent = mapping.features(&self.shape, &implication.antecedent);
            let consequent = mapping.features(&self.shape, &implication.consequent);
            let Some(rule_input) = with_features(input, &antecedent) else { continue };
            let Some(rule_output) = with_features(&rule_input, &consequent) else { continue };
            if let Some(rule) = PatternRule::new(rule_input, rule_output, highlander) {
                if !rule.is_trivial() {
                    rules.push(rule);
                }
            }
        }
        Ok(rules)
    }
}

fn with_features(base: &FeatureSet, features: &[Feature]) -> Option<FeatureSet> {
    let mut set = base.clone();
    for feature in features {
        set.insert(feature)?;
    }
    Some(set)
}

/// One loose end of a strand inside the pattern: the far side of an edge
/// end that has no vertex in the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    pub edge: usize,
    pub end: usize,
}

/// Which loose ends are joined by the same strand, as sorted port pairs.
pub fn loop_connections(board: &PatternBoard, edges: &[bool]) -> Vec<(Port, Port)> {
    let num_vertices = board.vertices.len();
    let port_node = |port: Port| num_vertices + 2 * port.edge + port.end;
    let mut parent: Vec<usize> = (0..num_vertices + 2 * board.edges.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut ports = Vec::new();
    for edge in board.edges.iter().filter(|e| edges[e.index]) {
        let mut ends: Vec<usize> = edge.vertices.clone();
        while ends.len() < 2 {
            let port = Port { edge: edge.index, end: ends.len() };
            ports.push(port);
            ends.push(port_node(port));
        }
        let (a, b) = (find(&mut parent, ends[0]), find(&mut parent, ends[1]));
        parent[a] = b;
    }

    let mut by_component: HashMap<usize, Vec<Port>> = HashMap::new();
    for &port in &ports {
        let root = find(&mut parent, port_node(port));
        by_component.entry(root).or_default().push(port);
    }
    let mut pairs: Vec<(Port, Port)> = by_component
        .into_values()
        .filter_map(|mut ends| {
            ends.sort();
            match ends.as_slice() {
                [a, b] => Some((*a, *b)),
                _ => None,
            }
        })
        .collect();
    pairs.sort();
    pairs
}

/// Edges whose state can be seen from outside the pattern: exit edges, and
/// non-exit edges next to an exit face or a face without a value.
pub fn indeterminate_edges(features: &FeatureSet) -> Vec<usize> {
    let board = features.board();
    board
        .edges
        .iter()
        .filter(|edge| {
            edge.is_exit
                || edge
                    .faces
                    .iter()
                    .any(|&f| board.faces[f].is_exit || features.face_value(f).is_none())
        })
        .map(|edge| edge.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{standard, PatternBoardDescriptor};

    fn square() -> Arc<PatternBoard> {
        Arc::new(PatternBoard::new(standard::square()).unwrap())
    }

    #[test]
    fn test_two_in_a_square_forces_nothing() {
        let board = square();
        let input = FeatureSet::empty(&board).with_face_value(0, 2).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::default()).unwrap();
        assert_eq!(solutions.len(), 6);
        let output = solutions.add_to_feature_set(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_zero_in_a_square_forces_red() {
        let board = square();
        let input = FeatureSet::empty(&board).with_face_value(0, 0).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::default()).unwrap();
        let output = solutions.add_to_feature_set(&input).unwrap();
        for &e in &board.faces[0].edges {
            assert!(output.implies_feature(&Feature::RedEdge(e)));
        }
        // Exit edges stay open: two black edges could meet behind each corner
        for edge in board.edges.iter().filter(|e| e.is_exit) {
            assert_eq!(output.edge_state(edge.index), EdgeState::White);
        }
        assert_eq!(output.features().len(), 5);
    }

    #[test]
    fn test_three_in_a_corner() {
        let board = Arc::new(PatternBoard::new(standard::corner_square()).unwrap());
        let input = FeatureSet::empty(&board).with_face_value(0, 3).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::default()).unwrap();
        let output = solutions.add_to_feature_set(&input).unwrap();
        // Both edges at the puzzle corner must be on the loop
        let corner_edges: Vec<usize> = board.vertices[0].edges.clone();
        assert_eq!(corner_edges.len(), 2);
        for e in corner_edges {
            assert!(output.implies_feature(&Feature::BlackEdge(e)));
        }
    }

    #[test]
    fn test_fold_never_loses_solutions() {
        let board = square();
        let input = FeatureSet::empty(&board).with_face_value(0, 3).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::default()).unwrap();
        let output = solutions.add_to_feature_set(&input).unwrap();
        let resolved = SolutionSet::from_feature_set(&output, SolutionChannels::default()).unwrap();
        assert_eq!(resolved.len(), solutions.len());
    }

    #[test]
    fn test_partition_by_face_value() {
        let board = square();
        let solutions = SolutionSet::from_feature_set(&FeatureSet::empty(&board), SolutionChannels::edges_only())
            .unwrap();
        let parts = solutions.partitioned_by_face_value(0);
        let sizes: Vec<(usize, usize)> = parts.iter().map(|(v, s)| (*v, s.len())).collect();
        assert_eq!(sizes, vec![(0, 1), (1, 4), (2, 6), (3, 4), (4, 1)]);
    }

    #[test]
    fn test_highlander_filter() {
        let board = Arc::new(PatternBoard::new(PatternBoardDescriptor::Edge).unwrap());
        let solutions = SolutionSet::from_feature_set(&FeatureSet::empty(&board), SolutionChannels::edges_only())
            .unwrap();
        assert_eq!(solutions.len(), 2);
        // Off has no strand, on joins the two ends of the edge
        assert_eq!(solutions.with_filtered_highlander_solutions(&[]).map(|s| s.len()), Some(2));

        let square = square();
        let input = FeatureSet::empty(&square).with_face_value(0, 2).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::edges_only()).unwrap();
        let filtered = solutions.with_filtered_highlander_solutions(&[]);
        let expected: usize = {
            let mut counts: HashMap<Vec<(Port, Port)>, usize> = HashMap::new();
            for i in 0..solutions.len() {
                *counts.entry(loop_connections(&square, &solutions.solution_edges(i))).or_insert(0) += 1;
            }
            counts.values().filter(|&&c| c == 1).count()
        };
        assert_eq!(filtered.map(|s| s.len()).unwrap_or(0), expected);
    }

    #[test]
    fn test_highlander_filter_drops_shared_signatures() {
        let square = square();
        let input = FeatureSet::empty(&square).with_face_value(0, 2).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::edges_only()).unwrap();
        assert_eq!(solutions.len(), 6);

        // Two adjacent sides leave one strand between the opposite corners,
        // the same strand as the other two sides. Opposite sides give two
        // strands, each pairing differently.
        let kept = solutions.with_filtered_highlander_solutions(&[]).unwrap();
        assert_eq!(kept.len(), 2);
        for i in 0..kept.len() {
            let edges = kept.solution_edges(i);
            for vertex in &square.vertices {
                assert!(edges[vertex.exit_edge.unwrap()]);
            }
        }

        // Any one side tells each colliding pair apart
        let side = square.faces[0].edges[0];
        assert_eq!(solutions.with_filtered_highlander_solutions(&[side]).unwrap().len(), 6);
    }

    #[test]
    fn test_loop_connections() {
        let board = square();
        // Edge 0 joins vertices 0 and 1; both corners then need their exits
        let mut edges = vec![false; board.edges.len()];
        edges[0] = true;
        for v in [0, 1] {
            edges[board.vertices[v].exit_edge.unwrap()] = true;
        }
        let pairs = loop_connections(&board, &edges);
        assert_eq!(pairs.len(), 1);
        let (a, b) = pairs[0];
        assert_eq!(a.edge, board.vertices[0].exit_edge.unwrap());
        assert_eq!(b.edge, board.vertices[1].exit_edge.unwrap());
    }

    #[test]
    fn test_indeterminate_edges() {
        let board = square();
        let input = FeatureSet::empty(&board).with_face_value(0, 2).unwrap();
        // Every square edge borders an exit face
        assert_eq!(indeterminate_edges(&input).len(), board.edges.len());
    }

    #[test]
    fn test_implied_rules_hold() {
        let board = square();
        let input = FeatureSet::empty(&board).with_face_value(0, 3).unwrap();
        let solutions = SolutionSet::from_feature_set(&input, SolutionChannels::edges_only()).unwrap();
        let rules = solutions.get_implied_rules(&input, false).unwrap();
        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(rule.is_correct_slow(), "unsound rule {}", rule);
        }
    }
}
