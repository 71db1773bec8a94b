//! Formal concept analysis: attribute sets, the closure operator of a
//! context, NextClosure enumeration and the stem base of implications.
//!
//! The first half is independent of loop puzzles. [`PatternAttributeSetMapping`]
//! at the bottom translates solution-set bit channels into a compact
//! attribute universe and back into features.

use crate::board::PatternBoard;
use crate::error::{Error, Result};
use crate::feature::{FaceColorDual, Feature, SectorMask};
use crate::solution_set::SolutionShape;
use fixedbitset::FixedBitSet;
use std::fmt;

/// Each record expands into `2^n` objects for `n` ambiguous exit edges
const MAX_AMBIGUOUS_EXITS: usize = 20;

/// A subset of the attribute universe `0..len`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AttributeSet {
    bits: FixedBitSet,
}

impl AttributeSet {
    pub fn empty(len: usize) -> Self {
        AttributeSet { bits: FixedBitSet::with_capacity(len) }
    }

    pub fn full(len: usize) -> Self {
        let mut bits = FixedBitSet::with_capacity(len);
        bits.insert_range(..);
        AttributeSet { bits }
    }

    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = AttributeSet::empty(len);
        for i in indices {
            set.insert(i);
        }
        set
    }

    /// Size of the universe.
    pub fn universe(&self) -> usize {
        self.bits.len()
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones(..)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.count_ones(..) == 0
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.universe()
    }

    pub fn contains(&self, i: usize) -> bool {
        self.bits.contains(i)
    }

    pub fn insert(&mut self, i: usize) {
        self.bits.insert(i);
    }

    pub fn remove(&mut self, i: usize) {
        self.bits.set(i, false);
    }

    pub fn is_subset_of(&self, other: &AttributeSet) -> bool {
        self.bits.is_subset(&other.bits)
    }

    pub fn union_with(&mut self, other: &AttributeSet) {
        self.bits.union_with(&other.bits);
    }

    pub fn intersect_with(&mut self, other: &AttributeSet) {
        self.bits.intersect_with(&other.bits);
    }

    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.ones()
    }

    /// Keep only attributes below `i`.
    fn truncated(&self, i: usize) -> AttributeSet {
        let mut set = self.clone();
        set.bits.set_range(i.., false);
        set
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bits.ones()).finish()
    }
}

/// `antecedent -> consequent`, where the consequent is the full closure of
/// the antecedent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implication {
    pub antecedent: AttributeSet,
    pub consequent: AttributeSet,
}

/// Objects described by attribute sets over a shared universe.
#[derive(Debug, Clone)]
pub struct FormalContext {
    num_attributes: usize,
    objects: Vec<AttributeSet>,
}

impl FormalContext {
    pub fn new(num_attributes: usize, objects: Vec<AttributeSet>) -> Self {
        debug_assert!(objects.iter().all(|o| o.universe() == num_attributes));
        FormalContext { num_attributes, objects }
    }

    pub fn num_attributes(&self) -> usize {
        self.num_attributes
    }

    pub fn objects(&self) -> &[AttributeSet] {
        &self.objects
    }

    /// Whether some object has every attribute in `attrs`.
    pub fn is_realized(&self, attrs: &AttributeSet) -> bool {
        self.objects.iter().any(|o| attrs.is_subset_of(o))
    }

    /// Attributes shared by every object having `attrs`. With no such
    /// object this is the whole universe.
    pub fn get_closure(&self, attrs: &AttributeSet) -> AttributeSet {
        let mut closure = AttributeSet::full(self.num_attributes);
        for object in &self.objects {
            if attrs.is_subset_of(object) {
                closure.intersect_with(object);
            }
        }
        closure.union_with(attrs);
        closure
    }

    /// The lectically next closed set after `attrs`, or `None` after the last.
    pub fn get_next_closure(&self, attrs: &AttributeSet) -> Option<AttributeSet> {
        next_closure(self.num_attributes, attrs, |x| self.get_closure(x))
    }

    /// Every intent, in lectic order.
    pub fn get_intents(&self) -> Vec<AttributeSet> {
        let mut intents = Vec::new();
        let mut current = Some(self.get_closure(&AttributeSet::empty(self.num_attributes)));
        while let Some(intent) = current {
            current = self.get_next_closure(&intent);
            intents.push(intent);
        }
        intents
    }

    /// Intents plus the stem base: one implication per pseudo-intent, each
    /// with a minimal antecedent.
    pub fn get_intents_and_implications(&self) -> (Vec<AttributeSet>, Vec<Implication>) {
        let m = self.num_attributes;
        let mut intents = Vec::new();
        let mut implications: Vec<Implication> = Vec::new();
        let mut current = AttributeSet::empty(m);

        loop {
            let closure = self.get_closure(&current);
            if closure == current {
                intents.push(current.clone());
            } else {
                implications.push(Implication { antecedent: current.clone(), consequent: closure });
            }
            if current.is_full() {
                break;
            }
            match next_closure(m, &current, |x| implication_closure(&implications, x)) {
                Some(next) => current = next,
                None => break,
            }
        }
        (intents, implications)
    }
}

/// Smallest superset of `attrs` closed under every implication whose
/// antecedent is a strict subset.
fn implication_closure(implications: &[Implication], attrs: &AttributeSet) -> AttributeSet {
    let mut closed = attrs.clone();
    loop {
        let mut changed = false;
        for implication in implications {
            if implication.antecedent.is_subset_of(&closed)
                && implication.antecedent != closed
                && !implication.consequent.is_subset_of(&closed)
            {
                closed.union_with(&implication.consequent);
                changed = true;
            }
        }
        if !changed {
            return closed;
        }
    }
}

/// Ganter's NextClosure step for an arbitrary closure operator.
fn next_closure(
    m: usize,
    attrs: &AttributeSet,
    closure: impl Fn(&AttributeSet) -> AttributeSet,
) -> Option<AttributeSet> {
    for i in (0..m).rev() {
        if attrs.contains(i) {
            continue;
        }
        let mut candidate = attrs.truncated(i);
        candidate.insert(i);
        let closed = closure(&candidate);
        // New elements must not appear before i
        let prefix_ok = closed.ones().take_while(|&j| j < i).all(|j| attrs.contains(j));
        if prefix_ok {
            return Some(closed);
        }
    }
    None
}

// ==================== Pattern attributes ====================

/// Where one compacted attribute comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternAttribute {
    RedEdge(usize),
    BlackEdge(usize),
    /// Sector count `k` is impossible
    SectorNot { sector: usize, count: usize },
    /// Face pair (by index in the shape) is same- or opposite-colored
    FacePair { pair: usize, opposite: bool },
}

/// Re-indexes solution-set bits into a compact attribute universe. The
/// original-black channel is dropped, each edge gets its red attribute
/// before its black one, and a face pair split by a single non-exit edge
/// reuses that edge's attributes.
#[derive(Debug, Clone)]
pub struct PatternAttributeSetMapping {
    attributes: Vec<PatternAttribute>,
    /// Solution bit -> attribute
    bit_to_attribute: Vec<Option<usize>>,
    /// Exit edges whose red bit may be legitimately unset
    exit_edges: Vec<usize>,
}

impl PatternAttributeSetMapping {
    pub fn new(board: &PatternBoard, shape: &SolutionShape) -> Self {
        let mut attributes = Vec::new();
        let mut bit_to_attribute = vec![None; shape.num_bits()];
        let mut edge_attributes = vec![(0usize, 0usize); board.edges.len()];

        for edge in 0..board.edges.len() {
            let red = attributes.len();
            attributes.push(PatternAttribute::RedEdge(edge));
            let black = attributes.len();
            attributes.push(PatternAttribute::BlackEdge(edge));
            bit_to_attribute[shape.edge_red_bit(edge)] = Some(red);
            bit_to_attribute[shape.edge_black_bit(edge)] = Some(black);
            edge_attributes[edge] = (red, black);
        }

        if shape.channels().sectors {
            for sector in 0..board.sectors.len() {
                for count in 0..=2 {
                    bit_to_attribute[shape.sector_not_bit(sector, count)] = Some(attributes.len());
                    attributes.push(PatternAttribute::SectorNot { sector, count });
                }
            }
        }

        if shape.channels().face_colors {
            let connectivity = board.face_connectivity();
            for (pair, &(a, b)) in shape.face_pairs().iter().enumerate() {
                let single_edge = match connectivity.path(a, b) {
                    Some([e]) if !board.edges[*e].is_exit => Some(*e),
                    _ => None,
                };
                for opposite in [false, true] {
                    let bit = shape.face_pair_bit(pair, opposite);
                    bit_to_attribute[bit] = Some(match single_edge {
                        Some(e) if opposite => edge_attributes[e].1,
                        Some(e) => edge_attributes[e].0,
                        None => {
                            attributes.push(PatternAttribute::FacePair { pair, opposite });
                            attributes.len() - 1
                        }
                    });
                }
            }
        }

        let exit_edges = board.edges.iter().filter(|e| e.is_exit).map(|e| e.index).collect();
        PatternAttributeSetMapping { attributes, bit_to_attribute, exit_edges }
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, index: usize) -> PatternAttribute {
        self.attributes[index]
    }

    /// Attribute sets for one solution record. Exit edges left ambiguous
    /// (neither black nor certainly red) expand into both readings.
    pub fn objects_for_record(&self, shape: &SolutionShape, record: &[u64]) -> Result<Vec<AttributeSet>> {
        let mut base = AttributeSet::empty(self.num_attributes());
        for (bit, attribute) in self.bit_to_attribute.iter().enumerate() {
            if let Some(a) = attribute {
                if record[bit / 64] & (1 << (bit % 64)) != 0 {
                    base.insert(*a);
                }
            }
        }

        let ambiguous: Vec<usize> = self
            .exit_edges
            .iter()
            .copied()
            .filter(|&e| {
                let black = shape.edge_black_bit(e);
                let red = shape.edge_red_bit(e);
                record[black / 64] & (1 << (black % 64)) == 0 && record[red / 64] & (1 << (red % 64)) == 0
            })
            .collect();
        if ambiguous.len() > MAX_AMBIGUOUS_EXITS {
            return Err(Error::TooManyAmbiguousExits(ambiguous.len(), MAX_AMBIGUOUS_EXITS));
        }

        let mut objects = Vec::with_capacity(1 << ambiguous.len());
        for choice in 0u32..(1 << ambiguous.len()) {
            let mut object = base.clone();
            for (i, &edge) in ambiguous.iter().enumerate() {
                if choice & (1 << i) != 0 {
                    if let Some(a) = self.bit_to_attribute[shape.edge_red_bit(edge)] {
                        object.insert(a);
                    }
                }
            }
            objects.push(object);
        }
        Ok(objects)
    }

    /// The features an attribute set asserts, for a board and shape.
    pub fn features(&self, shape: &SolutionShape, attrs: &AttributeSet) -> Vec<Feature> {
        let mut features = Vec::new();
        let mut sector_masks: Vec<(usize, SectorMask)> = Vec::new();
        for index in attrs.ones() {
            match self.attributes[index] {
                PatternAttribute::RedEdge(e) => features.push(Feature::RedEdge(e)),
                PatternAttribute::BlackEdge(e) => features.push(Feature::BlackEdge(e)),
                PatternAttribute::SectorNot { sector, count } => {
                    let without = SectorMask::from_bits(SectorMask::ALL.bits() & !(1 << count));
                    match sector_masks.iter_mut().find(|(s, _)| *s == sector) {
                        Some((_, mask)) => *mask = mask.intersection(without),
                        None => sector_masks.push((sector, without)),
                    }
                }
                PatternAttribute::FacePair { pair, opposite } => {
                    let (a, b) = shape.face_pairs()[pair];
                    let dual = if opposite {
                        FaceColorDual::new(vec![a], vec![b])
                    } else {
                        FaceColorDual::new(vec![a, b], vec![])
                    };
                    if let Some(dual) = dual {
                        features.push(Feature::FaceColorDual(dual));
                    }
                }
            }
        }
        for (sector, mask) in sector_masks {
            features.extend(mask.minimal_features(sector, SectorMask::ALL));
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(m: usize, items: &[usize]) -> AttributeSet {
        AttributeSet::from_indices(m, items.iter().copied())
    }

    /// Classic toy context over attributes {0, 1, 2, 3}.
    fn toy_context() -> FormalContext {
        FormalContext::new(4, vec![set(4, &[0, 1]), set(4, &[0, 2]), set(4, &[0, 1, 3])])
    }

    #[test]
    fn test_closure_is_idempotent_and_extensive() {
        let context = toy_context();
        for bits in 0u32..16 {
            let attrs = set(4, &(0..4).filter(|&i| bits & (1 << i) != 0).collect::<Vec<_>>());
            let closure = context.get_closure(&attrs);
            assert!(attrs.is_subset_of(&closure));
            assert_eq!(context.get_closure(&closure), closure);
        }
    }

    #[test]
    fn test_closure_values() {
        let context = toy_context();
        // Every object has 0
        assert_eq!(context.get_closure(&set(4, &[])), set(4, &[0]));
        // 3 only shows up with 0 and 1
        assert_eq!(context.get_closure(&set(4, &[3])), set(4, &[0, 1, 3]));
        // Nothing has both 2 and 3
        assert!(context.get_closure(&set(4, &[2, 3])).is_full());
    }

    #[test]
    fn test_intents_in_lectic_order() {
        let context = toy_context();
        let intents = context.get_intents();
        assert_eq!(
            intents,
            vec![
                set(4, &[0]),
                set(4, &[0, 2]),
                set(4, &[0, 1]),
                set(4, &[0, 1, 3]),
                set(4, &[0, 1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_stem_base() {
        let context = toy_context();
        let (intents, implications) = context.get_intents_and_implications();
        assert_eq!(intents.len(), 5);
        for implication in &implications {
            assert_eq!(context.get_closure(&implication.antecedent), implication.consequent);
            assert!(!implication.consequent.is_subset_of(&implication.antecedent));
        }
        let antecedents: Vec<AttributeSet> = implications.iter().map(|i| i.antecedent.clone()).collect();
        assert!(antecedents.contains(&set(4, &[])));
        assert!(antecedents.contains(&set(4, &[0, 3])));
        assert!(antecedents.contains(&set(4, &[0, 1, 2])));
    }

    #[test]
    fn test_stem_base_is_complete() {
        // Closing any set under the implications gives its context closure
        let context = toy_context();
        let (_, implications) = context.get_intents_and_implications();
        for bits in 0u32..16 {
            let attrs = set(4, &(0..4).filter(|&i| bits & (1 << i) != 0).collect::<Vec<_>>());
            let mut closed = attrs.clone();
            loop {
                let before = closed.clone();
                for implication in &implications {
                    if implication.antecedent.is_subset_of(&closed) {
                        closed.union_with(&implication.consequent);
                    }
                }
                if closed == before {
                    break;
                }
            }
            assert_eq!(closed, context.get_closure(&attrs), "attrs {:?}", attrs);
        }
    }

    #[test]
    fn test_attribute_set_basics() {
        let mut a = AttributeSet::empty(70);
        assert!(a.is_empty());
        a.insert(3);
        a.insert(65);
        assert_eq!(a.count(), 2);
        assert!(a.contains(65));
        a.remove(3);
        assert_eq!(a.ones().collect::<Vec<_>>(), vec![65]);
        assert!(AttributeSet::full(70).is_full());
        assert_eq!(set(8, &[1, 5, 7]).truncated(5), set(8, &[1]));
    }

    /// A row of `n` squares; every vertex is an exit vertex.
    fn strip(n: usize) -> PatternBoard {
        let vertex_lists = (0..n).map(|i| vec![i, i + 1, n + 2 + i, n + 1 + i]).collect();
        PatternBoard::new(crate::board::PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 0,
            num_exit_vertices: 2 * (n + 1),
            vertex_lists,
        })
        .unwrap()
    }

    #[test]
    fn test_ambiguous_exits_expand_into_every_reading() {
        let board = PatternBoard::new(crate::board::standard::square()).unwrap();
        let shape = SolutionShape::new(&board, crate::solution_set::SolutionChannels::edges_only());
        let mapping = PatternAttributeSetMapping::new(&board, &shape);
        let record = vec![0u64; shape.num_bits().div_ceil(64).max(1)];
        assert_eq!(mapping.objects_for_record(&shape, &record).unwrap().len(), 16);
    }

    #[test]
    fn test_too_many_ambiguous_exits_is_an_error() {
        let board = strip(10);
        let shape = SolutionShape::new(&board, crate::solution_set::SolutionChannels::edges_only());
        let mapping = PatternAttributeSetMapping::new(&board, &shape);
        let record = vec![0u64; shape.num_bits().div_ceil(64).max(1)];
        assert!(matches!(
            mapping.objects_for_record(&shape, &record),
            Err(Error::TooManyAmbiguousExits(22, MAX_AMBIGUOUS_EXITS))
        ));
    }
}
