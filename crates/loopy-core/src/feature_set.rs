//! FeatureSet: a canonical, redundancy-free collection of features on one
//! pattern board.
//!
//! Features are not stored as a flat list. Edges, face values, sector masks
//! and color duals each get their own structure, and normalization happens
//! on insert:
//!
//! - a sector mask is always intersected with what its two edges allow and
//!   dropped once the edges say everything it does,
//! - overlapping color duals are merged into one,
//! - contradictions make the insert fail.
//!
//! [`FeatureSet::features`] then renders the minimal list of features.

use crate::board::PatternBoard;
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::feature::{DualMerge, EdgeState, FaceColorDual, Feature, SectorMask};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
pub struct FeatureSet {
    board: Arc<PatternBoard>,
    face_values: BTreeMap<usize, usize>,
    black_edges: BTreeSet<usize>,
    red_edges: BTreeSet<usize>,
    /// Sector masks strictly tighter than the edge states allow
    sectors: BTreeMap<usize, SectorMask>,
    /// Pairwise disjoint, sorted
    color_duals: Vec<FaceColorDual>,
}

/// JSON form: `{"features": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSetJson {
    pub features: Vec<Feature>,
}

impl FeatureSet {
    pub fn empty(board: &Arc<PatternBoard>) -> Self {
        FeatureSet {
            board: Arc::clone(board),
            face_values: BTreeMap::new(),
            black_edges: BTreeSet::new(),
            red_edges: BTreeSet::new(),
            sectors: BTreeMap::new(),
            color_duals: Vec::new(),
        }
    }

    /// Build from a list of features; `None` if they contradict each other.
    pub fn from_features(board: &Arc<PatternBoard>, features: &[Feature]) -> Option<Self> {
        let mut set = FeatureSet::empty(board);
        for feature in features {
            set.insert(feature)?;
        }
        Some(set)
    }

    pub fn board(&self) -> &Arc<PatternBoard> {
        &self.board
    }

    /// Add one feature in place. On `None` the set is left half-updated and
    /// should be discarded.
    pub(crate) fn insert(&mut self, feature: &Feature) -> Option<()> {
        match feature {
            Feature::FaceValue { face, value } => self.insert_face_value(*face, *value),
            Feature::BlackEdge(e) => self.insert_edge(*e, EdgeState::Black),
            Feature::RedEdge(e) => self.insert_edge(*e, EdgeState::Red),
            Feature::FaceColorDual(dual) => self.insert_color_dual(dual.clone()),
            _ => {
                let (sector, mask) = feature.sector_mask()?;
                self.insert_sector_mask(sector, mask)
            }
        }
    }

    /// Functional form of [`Self::insert`].
    pub fn with_feature(&self, feature: &Feature) -> Option<Self> {
        let mut set = self.clone();
        set.insert(feature)?;
        Some(set)
    }

    pub fn with_black_edge(&self, edge: usize) -> Option<Self> {
        self.with_feature(&Feature::BlackEdge(edge))
    }

    pub fn with_red_edge(&self, edge: usize) -> Option<Self> {
        self.with_feature(&Feature::RedEdge(edge))
    }

    pub fn with_face_value(&self, face: usize, value: usize) -> Option<Self> {
        self.with_feature(&Feature::FaceValue { face, value })
    }

    fn insert_face_value(&mut self, face: usize, value: usize) -> Option<()> {
        debug_assert!(face < self.board.faces.len());
        match self.face_values.get(&face) {
            Some(&existing) if existing != value => None,
            Some(_) => Some(()),
            None => {
                self.face_values.insert(face, value);
                Some(())
            }
        }
    }

    fn insert_edge(&mut self, edge: usize, state: EdgeState) -> Option<()> {
        debug_assert!(edge < self.board.edges.len());
        let (same, other) = match state {
            EdgeState::Black => (&mut self.black_edges, &self.red_edges),
            EdgeState::Red => (&mut self.red_edges, &self.black_edges),
            EdgeState::White => return Some(()),
        };
        if other.contains(&edge) {
            return None;
        }
        if !same.insert(edge) {
            return Some(());
        }
        let sectors = self.board.edges[edge].sectors.clone();
        for sector in sectors {
            if let Some(mask) = self.sectors.remove(&sector) {
                self.insert_sector_mask(sector, mask)?;
            }
        }
        Some(())
    }

    fn insert_sector_mask(&mut self, sector: usize, mask: SectorMask) -> Option<()> {
        debug_assert!(sector < self.board.sectors.len());
        let from_edges = self.edge_sector_mask(sector);
        let combined = self.sector_knowledge(sector).intersection(mask);
        if combined.is_empty() {
            return None;
        }
        if combined == from_edges {
            self.sectors.remove(&sector);
        } else {
            self.sectors.insert(sector, combined);
        }
        // An edge whose one state the mask rules out takes the other
        let [a, b] = self.board.sectors[sector].edges;
        for (edge, other) in [(a, b), (b, a)] {
            if self.edge_state(edge) != EdgeState::White {
                continue;
            }
            let knowledge = self.sector_knowledge(sector);
            let other = self.edge_state(other);
            if knowledge.intersection(SectorMask::from_edge_states(EdgeState::Black, other)).is_empty() {
                self.insert_edge(edge, EdgeState::Red)?;
            } else if knowledge.intersection(SectorMask::from_edge_states(EdgeState::Red, other)).is_empty() {
                self.insert_edge(edge, EdgeState::Black)?;
            }
        }
        Some(())
    }

    fn insert_color_dual(&mut self, dual: FaceColorDual) -> Option<()> {
        let mut current = dual;
        let mut remaining = Vec::with_capacity(self.color_duals.len());
        for existing in self.color_duals.drain(..) {
            match current.merge(&existing) {
                DualMerge::Disjoint => remaining.push(existing),
                DualMerge::Merged(merged) => current = merged,
                DualMerge::Conflict => return None,
            }
        }
        remaining.push(current);
        remaining.sort();
        self.color_duals = remaining;
        Some(())
    }

    pub fn edge_state(&self, edge: usize) -> EdgeState {
        if self.black_edges.contains(&edge) {
            EdgeState::Black
        } else if self.red_edges.contains(&edge) {
            EdgeState::Red
        } else {
            EdgeState::White
        }
    }

    /// What the sector's two edge states alone allow.
    pub fn edge_sector_mask(&self, sector: usize) -> SectorMask {
        let [a, b] = self.board.sectors[sector].edges;
        SectorMask::from_edge_states(self.edge_state(a), self.edge_state(b))
    }

    /// Everything known about a sector's black-edge count.
    pub fn sector_knowledge(&self, sector: usize) -> SectorMask {
        self.sectors
            .get(&sector)
            .copied()
            .unwrap_or_else(|| self.edge_sector_mask(sector))
    }

    pub fn face_value(&self, face: usize) -> Option<usize> {
        self.face_values.get(&face).copied()
    }

    pub fn face_values(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.face_values.iter().map(|(&f, &v)| (f, v))
    }

    pub fn black_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.black_edges.iter().copied()
    }

    pub fn red_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.red_edges.iter().copied()
    }

    pub fn color_duals(&self) -> &[FaceColorDual] {
        &self.color_duals
    }

    /// `Some(true)` if the faces are known to share a color, `Some(false)`
    /// if known opposite.
    pub fn face_color_relation(&self, a: usize, b: usize) -> Option<bool> {
        if a == b {
            return Some(true);
        }
        self.color_duals.iter().find_map(|d| d.relation(a, b))
    }

    /// The minimal features describing this set, in a stable order.
    pub fn features(&self) -> Vec<Feature> {
        let mut features = Vec::with_capacity(self.size());
        features.extend(self.face_values.iter().map(|(&face, &value)| Feature::FaceValue { face, value }));
        features.extend(self.black_edges.iter().map(|&e| Feature::BlackEdge(e)));
        features.extend(self.red_edges.iter().map(|&e| Feature::RedEdge(e)));
        for (&sector, &mask) in &self.sectors {
            features.extend(mask.minimal_features(sector, self.edge_sector_mask(sector)));
        }
        features.extend(self.color_duals.iter().cloned().map(Feature::FaceColorDual));
        features
    }

    pub fn size(&self) -> usize {
        let sector_features: usize = self
            .sectors
            .iter()
            .map(|(&s, &mask)| mask.minimal_features(s, self.edge_sector_mask(s)).len())
            .sum();
        self.face_values.len()
            + self.black_edges.len()
            + self.red_edges.len()
            + sector_features
            + self.color_duals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_values.is_empty()
            && self.black_edges.is_empty()
            && self.red_edges.is_empty()
            && self.sectors.is_empty()
            && self.color_duals.is_empty()
    }

    /// Whether this set already guarantees `feature`.
    pub fn implies_feature(&self, feature: &Feature) -> bool {
        match feature {
            Feature::FaceValue { face, value } => self.face_value(*face) == Some(*value),
            Feature::BlackEdge(e) => self.black_edges.contains(e),
            Feature::RedEdge(e) => self.red_edges.contains(e),
            Feature::FaceColorDual(dual) => self.color_duals.iter().any(|d| dual.is_implied_by(d)),
            _ => match feature.sector_mask() {
                Some((sector, mask)) => self.sector_knowledge(sector).is_subset_of(mask),
                None => false,
            },
        }
    }

    /// Whether every feature of `self` is implied by `other`.
    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        debug_assert_eq!(self.board.id(), other.board.id());
        self.face_values.iter().all(|(&f, &v)| other.face_value(f) == Some(v))
            && self.black_edges.iter().all(|e| other.black_edges.contains(e))
            && self.red_edges.iter().all(|e| other.red_edges.contains(e))
            && self
                .sectors
                .iter()
                .all(|(&s, &mask)| other.sector_knowledge(s).is_subset_of(mask))
            && self
                .color_duals
                .iter()
                .all(|dual| other.color_duals.iter().any(|d| dual.is_implied_by(d)))
    }

    /// Merge two sets; `None` if they contradict.
    pub fn union(&self, other: &FeatureSet) -> Option<FeatureSet> {
        debug_assert_eq!(self.board.id(), other.board.id());
        let mut set = self.clone();
        for (&face, &value) in &other.face_values {
            set.insert_face_value(face, value)?;
        }
        for &e in &other.black_edges {
            set.insert_edge(e, EdgeState::Black)?;
        }
        for &e in &other.red_edges {
            set.insert_edge(e, EdgeState::Red)?;
        }
        for (&sector, &mask) in &other.sectors {
            set.insert_sector_mask(sector, mask)?;
        }
        for dual in &other.color_duals {
            set.insert_color_dual(dual.clone())?;
        }
        Some(set)
    }

    /// A quick contradiction check: opposite edge colors, face values, sector
    /// bounds against known edges, face counts, and color duals. Passing
    /// does not mean a solution exists.
    pub fn is_compatible_with(&self, other: &FeatureSet) -> bool {
        if self.black_edges.iter().any(|e| other.red_edges.contains(e))
            || self.red_edges.iter().any(|e| other.black_edges.contains(e))
        {
            return false;
        }
        if self
            .face_values
            .iter()
            .any(|(f, v)| other.face_values.get(f).is_some_and(|w| w != v))
        {
            return false;
        }

        let combined_state = |e: usize| match (self.edge_state(e), other.edge_state(e)) {
            (EdgeState::White, s) | (s, EdgeState::White) => s,
            (s, _) => s,
        };

        let sectors: BTreeSet<usize> = self.sectors.keys().chain(other.sectors.keys()).copied().collect();
        for sector in sectors {
            let [a, b] = self.board.sectors[sector].edges;
            let mut mask = SectorMask::from_edge_states(combined_state(a), combined_state(b));
            for set in [self, other] {
                if let Some(&m) = set.sectors.get(&sector) {
                    mask = mask.intersection(m);
                }
            }
            if mask.is_empty() {
                return false;
            }
        }

        for (&face, &value) in self.face_values.iter().chain(other.face_values.iter()) {
            let edges = &self.board.faces[face].edges;
            let blacks = edges.iter().filter(|&&e| combined_state(e) == EdgeState::Black).count();
            let open = edges.iter().filter(|&&e| combined_state(e) != EdgeState::Red).count();
            if blacks > value || open < value {
                return false;
            }
        }

        self.color_duals
            .iter()
            .all(|a| other.color_duals.iter().all(|b| a.merge(b) != DualMerge::Conflict))
    }

    /// Carry the whole set through an embedding. Fails if any feature has no
    /// faithful image or the images contradict.
    pub fn embedded(&self, embedding: &Embedding, target: &Arc<PatternBoard>) -> Option<FeatureSet> {
        debug_assert_eq!(embedding.source(), self.board.id());
        debug_assert_eq!(embedding.target(), target.id());
        let mut set = FeatureSet::empty(target);
        for feature in self.features() {
            for image in feature.embedded(embedding)? {
                set.insert(&image)?;
            }
        }
        Some(set)
    }

    /// Like [`Self::embedded`], but features without a faithful image are
    /// dropped instead of failing the whole set. Used for rule outputs,
    /// where dropping only weakens the conclusion.
    pub fn embedded_lossy(&self, embedding: &Embedding, target: &Arc<PatternBoard>) -> Option<FeatureSet> {
        let mut set = FeatureSet::empty(target);
        for feature in self.features() {
            let Some(images) = feature.embedded(embedding) else {
                continue;
            };
            for image in images {
                set.insert(&image)?;
            }
        }
        Some(set)
    }

    /// Whether a concrete edge assignment meets every feature. Exit edges
    /// count as red whenever they are off.
    pub fn is_satisfied_by(&self, edges: &[bool]) -> bool {
        let board = &self.board;
        let black = |e: usize| edges[e];
        self.black_edges.iter().all(|&e| black(e))
            && self.red_edges.iter().all(|&e| !black(e))
            && self.face_values.iter().all(|(&face, &value)| {
                board.faces[face].edges.iter().filter(|&&e| black(e)).count() == value
            })
            && self.sectors.iter().all(|(&s, &mask)| {
                let [a, b] = board.sectors[s].edges;
                mask.allows(usize::from(black(a)) + usize::from(black(b)))
            })
            && self.color_duals.iter().all(|dual| {
                let connectivity = board.face_connectivity();
                dual.pairs().all(|(main, other, opposite)| match connectivity.path(main, other) {
                    Some(path) => (path.iter().filter(|&&e| black(e)).count() % 2 == 1) == opposite,
                    None => true,
                })
            })
    }

    /// Remove every feature of `self` already implied by `base`.
    pub fn without_implied_by(&self, base: &FeatureSet) -> Vec<Feature> {
        self.features().into_iter().filter(|f| !base.implies_feature(f)).collect()
    }

    pub fn to_json(&self) -> FeatureSetJson {
        FeatureSetJson { features: self.features() }
    }

    pub fn from_json(board: &Arc<PatternBoard>, json: &FeatureSetJson) -> Result<Self> {
        for feature in &json.features {
            check_indices(board, feature)?;
        }
        FeatureSet::from_features(board, &json.features)
            .ok_or_else(|| Error::IncompatibleFeature(format!("contradictory feature list {:?}", json.features)))
    }
}

/// Reject features pointing outside the board.
fn check_indices(board: &PatternBoard, feature: &Feature) -> Result<()> {
    let in_range = match feature {
        Feature::FaceValue { face, .. } => *face < board.faces.len(),
        Feature::BlackEdge(e) | Feature::RedEdge(e) => *e < board.edges.len(),
        Feature::FaceColorDual(d) => d.faces().all(|f| f < board.faces.len()),
        _ => feature.sector_mask().is_some_and(|(s, _)| s < board.sectors.len()),
    };
    if in_range {
        Ok(())
    } else {
        Err(Error::InvalidDescriptor(format!(
            "feature {} out of range for {}",
            feature,
            board.to_descriptor_string()
        )))
    }
}

impl PartialEq for FeatureSet {
    fn eq(&self, other: &Self) -> bool {
        self.board.id() == other.board.id()
            && self.face_values == other.face_values
            && self.black_edges == other.black_edges
            && self.red_edges == other.red_edges
            && self.sectors == other.sectors
            && self.color_duals == other.color_duals
    }
}

impl Eq for FeatureSet {}

impl Hash for FeatureSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.board.id().hash(state);
        self.face_values.hash(state);
        self.black_edges.hash(state);
        self.red_edges.hash(state);
        self.sectors.hash(state);
        self.color_duals.hash(state);
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSet")
            .field("board", &self.board.id())
            .field("features", &self.features())
            .finish()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.features().iter().map(|x| x.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::standard;

    fn square() -> Arc<PatternBoard> {
        Arc::new(PatternBoard::new(standard::square()).unwrap())
    }

    #[test]
    fn test_edge_conflict() {
        let board = square();
        let set = FeatureSet::empty(&board).with_black_edge(0).unwrap();
        assert!(set.with_red_edge(0).is_none());
        assert!(set.with_black_edge(0).is_some());
    }

    #[test]
    fn test_sector_implied_by_edges_is_dropped() {
        let board = square();
        let sector = board.sectors[0].index;
        let [a, _] = board.sectors[0].edges;
        let set = FeatureSet::from_features(
            &board,
            &[Feature::BlackEdge(a), Feature::SectorNotZero(sector)],
        )
        .unwrap();
        assert_eq!(set.features(), vec![Feature::BlackEdge(a)]);

        // Order of insertion does not matter
        let set2 = FeatureSet::from_features(
            &board,
            &[Feature::SectorNotZero(sector), Feature::BlackEdge(a)],
        )
        .unwrap();
        assert_eq!(set, set2);
    }

    #[test]
    fn test_sector_tightened_by_edges() {
        let board = square();
        let sector = 0;
        let [a, b] = board.sectors[sector].edges;
        let set = FeatureSet::from_features(&board, &[Feature::SectorOnlyOne(sector)]).unwrap();
        assert_eq!(set.features(), vec![Feature::SectorOnlyOne(sector)]);
        let set = set.with_black_edge(a).unwrap();
        // Only-one with a black edge is just "the other edge is red"
        assert!(set.implies_feature(&Feature::RedEdge(b)));
        assert_eq!(set.sector_knowledge(sector), SectorMask::ONLY_ONE);
        assert_eq!(set.features(), vec![Feature::BlackEdge(a), Feature::RedEdge(b)]);
        assert_eq!(set, FeatureSet::empty(&board).with_black_edge(a).unwrap().with_red_edge(b).unwrap());
        assert!(set.with_black_edge(b).is_none());

        // Same outcome with the mask arriving last
        let late = FeatureSet::from_features(&board, &[Feature::BlackEdge(a), Feature::SectorOnlyOne(sector)]).unwrap();
        assert_eq!(late, set);
    }

    #[test]
    fn test_sector_forces_edges() {
        let board = square();
        let sector = 0;
        let [a, b] = board.sectors[sector].edges;
        let not_one = FeatureSet::from_features(&board, &[Feature::SectorNotOne(sector), Feature::BlackEdge(a)]).unwrap();
        assert!(not_one.implies_feature(&Feature::BlackEdge(b)));
        let not_zero = FeatureSet::from_features(&board, &[Feature::RedEdge(b), Feature::SectorNotZero(sector)]).unwrap();
        assert!(not_zero.implies_feature(&Feature::BlackEdge(a)));
        let not_two = FeatureSet::from_features(&board, &[Feature::SectorNotTwo(sector), Feature::BlackEdge(b)]).unwrap();
        assert!(not_two.implies_feature(&Feature::RedEdge(a)));
    }

    #[test]
    fn test_redundancy_filter_is_idempotent() {
        let board = square();
        let set = FeatureSet::from_features(
            &board,
            &[
                Feature::FaceValue { face: 0, value: 2 },
                Feature::SectorNotOne(1),
                Feature::BlackEdge(board.sectors[1].edges[0]),
                Feature::SectorNotTwo(2),
            ],
        )
        .unwrap();
        let again = FeatureSet::from_features(&board, &set.features()).unwrap();
        assert_eq!(again, set);
        assert_eq!(again.size(), set.features().len());
    }

    #[test]
    fn test_subset_and_union() {
        let board = square();
        let small = FeatureSet::empty(&board).with_black_edge(0).unwrap();
        let big = small.with_red_edge(1).unwrap();
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        let union = small.union(&FeatureSet::empty(&board).with_red_edge(1).unwrap()).unwrap();
        assert_eq!(union, big);
        let clash = FeatureSet::empty(&board).with_red_edge(0).unwrap();
        assert!(small.union(&clash).is_none());
    }

    #[test]
    fn test_color_duals_merge_on_insert() {
        let board = square();
        let a = Feature::FaceColorDual(FaceColorDual::new(vec![0], vec![1]).unwrap());
        let b = Feature::FaceColorDual(FaceColorDual::new(vec![1], vec![2]).unwrap());
        let set = FeatureSet::from_features(&board, &[a, b]).unwrap();
        assert_eq!(set.color_duals().len(), 1);
        assert_eq!(set.face_color_relation(0, 2), Some(true));
        assert_eq!(set.face_color_relation(0, 1), Some(false));
        let c = Feature::FaceColorDual(FaceColorDual::new(vec![0], vec![2]).unwrap());
        assert!(set.with_feature(&c).is_none());
    }

    #[test]
    fn test_compatibility_checks_face_counts() {
        let board = square();
        let edges = board.faces[0].edges.clone();
        let zero = FeatureSet::empty(&board).with_face_value(0, 0).unwrap();
        let black = FeatureSet::empty(&board).with_black_edge(edges[0]).unwrap();
        assert!(!zero.is_compatible_with(&black));
        let one = FeatureSet::empty(&board).with_face_value(0, 1).unwrap();
        assert!(one.is_compatible_with(&black));
        let mut reds = FeatureSet::empty(&board);
        for &e in &edges[..3] {
            reds = reds.with_red_edge(e).unwrap();
        }
        let three = FeatureSet::empty(&board).with_face_value(0, 3).unwrap();
        assert!(!three.is_compatible_with(&reds));
    }

    #[test]
    fn test_json_round_trip_and_range_check() {
        let board = square();
        let set = FeatureSet::from_features(
            &board,
            &[Feature::FaceValue { face: 0, value: 3 }, Feature::RedEdge(2)],
        )
        .unwrap();
        let json = serde_json::to_string(&set.to_json()).unwrap();
        let parsed: FeatureSetJson = serde_json::from_str(&json).unwrap();
        assert_eq!(FeatureSet::from_json(&board, &parsed).unwrap(), set);

        let bad = FeatureSetJson { features: vec![Feature::BlackEdge(99)] };
        assert!(FeatureSet::from_json(&board, &bad).is_err());
    }
}
