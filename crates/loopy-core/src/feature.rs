//! Features: the atomic local constraints a rule talks about.
//!
//! A closed sum type with one match arm per operation (canonical key, embed,
//! sector mask). Sector bounds are handled through [`SectorMask`], the set
//! of black-edge counts (0, 1 or 2) a sector still allows.

use crate::embedding::Embedding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known state of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeState {
    #[default]
    White,
    Black,
    Red,
}

/// Allowed black-edge counts of a sector: bit `k` set means `k` is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectorMask(u8);

impl SectorMask {
    pub const NONE: SectorMask = SectorMask(0b000);
    pub const ALL: SectorMask = SectorMask(0b111);
    pub const NOT_ZERO: SectorMask = SectorMask(0b110);
    pub const NOT_ONE: SectorMask = SectorMask(0b101);
    pub const NOT_TWO: SectorMask = SectorMask(0b011);
    pub const ONLY_ONE: SectorMask = SectorMask(0b010);

    pub fn from_bits(bits: u8) -> Self {
        SectorMask(bits & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// The mask allowing exactly `count`.
    pub fn only(count: usize) -> Self {
        debug_assert!(count <= 2);
        SectorMask(1 << count)
    }

    /// Counts still possible given the states of the sector's two edges.
    pub fn from_edge_states(a: EdgeState, b: EdgeState) -> Self {
        let blacks = [a, b].iter().filter(|&&s| s == EdgeState::Black).count();
        let reds = [a, b].iter().filter(|&&s| s == EdgeState::Red).count();
        let mut bits = 0;
        for count in blacks..=(2 - reds) {
            bits |= 1 << count;
        }
        SectorMask(bits)
    }

    pub fn allows(self, count: usize) -> bool {
        count <= 2 && self.0 & (1 << count) != 0
    }

    pub fn intersection(self, other: SectorMask) -> SectorMask {
        SectorMask(self.0 & other.0)
    }

    pub fn is_subset_of(self, other: SectorMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The fewest sector features whose masks, intersected with `context`,
    /// give back `self`. `self` must be a subset of `context`.
    pub fn minimal_features(self, sector: usize, context: SectorMask) -> Vec<Feature> {
        debug_assert!(self.is_subset_of(context));
        let candidates = [
            (SectorMask::ONLY_ONE, Feature::SectorOnlyOne(sector)),
            (SectorMask::NOT_ZERO, Feature::SectorNotZero(sector)),
            (SectorMask::NOT_ONE, Feature::SectorNotOne(sector)),
            (SectorMask::NOT_TWO, Feature::SectorNotTwo(sector)),
        ];
        for (mask, feature) in &candidates {
            if mask.intersection(context) == self {
                return vec![feature.clone()];
            }
        }
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                let mask = candidates[i].0.intersection(candidates[j].0);
                if mask.intersection(context) == self {
                    return vec![candidates[i].1.clone(), candidates[j].1.clone()];
                }
            }
        }
        // Unreachable for non-empty masks: NOT_ONE + NOT_TWO covers {0}
        Vec::new()
    }
}

impl fmt::Display for SectorMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = (0..=2).filter(|&c| self.allows(c)).map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", counts.join(","))
    }
}

/// Faces split into two color classes: all primary faces share a color,
/// all secondary faces share the opposite color.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceColorDual {
    primary: Vec<usize>,
    secondary: Vec<usize>,
}

/// Outcome of merging two color duals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DualMerge {
    /// No face in common; both stay as they are
    Disjoint,
    Merged(FaceColorDual),
    /// Some face would need both colors
    Conflict,
}

impl FaceColorDual {
    /// Build a normalized dual. Fails if a face is on both sides or fewer
    /// than two faces are involved.
    pub fn new(primary: Vec<usize>, secondary: Vec<usize>) -> Option<Self> {
        let mut primary = primary;
        let mut secondary = secondary;
        primary.sort_unstable();
        primary.dedup();
        secondary.sort_unstable();
        secondary.dedup();
        if primary.iter().any(|f| secondary.binary_search(f).is_ok()) {
            return None;
        }
        if primary.len() + secondary.len() < 2 {
            return None;
        }
        // The smallest face always leads the primary side
        let swap = match (primary.first(), secondary.first()) {
            (None, _) => true,
            (Some(p), Some(s)) => s < p,
            (Some(_), None) => false,
        };
        if swap {
            std::mem::swap(&mut primary, &mut secondary);
        }
        Some(FaceColorDual { primary, secondary })
    }

    pub fn primary_faces(&self) -> &[usize] {
        &self.primary
    }

    pub fn secondary_faces(&self) -> &[usize] {
        &self.secondary
    }

    pub fn main_face(&self) -> usize {
        self.primary[0]
    }

    pub fn faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.primary.iter().chain(self.secondary.iter()).copied()
    }

    pub fn contains(&self, face: usize) -> bool {
        self.side(face).is_some()
    }

    /// `Some(true)` for primary, `Some(false)` for secondary.
    fn side(&self, face: usize) -> Option<bool> {
        if self.primary.binary_search(&face).is_ok() {
            Some(true)
        } else if self.secondary.binary_search(&face).is_ok() {
            Some(false)
        } else {
            None
        }
    }

    /// `Some(true)` if the faces share a color, `Some(false)` if opposite.
    pub fn relation(&self, a: usize, b: usize) -> Option<bool> {
        Some(self.side(a)? == self.side(b)?)
    }

    pub fn merge(&self, other: &FaceColorDual) -> DualMerge {
        let Some(shared) = self.faces().find(|&f| other.contains(f)) else {
            return DualMerge::Disjoint;
        };
        let aligned = self.side(shared) == other.side(shared);
        let (mut primary, mut secondary) = (self.primary.clone(), self.secondary.clone());
        if aligned {
            primary.extend(&other.primary);
            secondary.extend(&other.secondary);
        } else {
            primary.extend(&other.secondary);
            secondary.extend(&other.primary);
        }
        match FaceColorDual::new(primary, secondary) {
            Some(merged) => DualMerge::Merged(merged),
            None => DualMerge::Conflict,
        }
    }

    /// Whether `other` already forces every relation in `self`.
    pub fn is_implied_by(&self, other: &FaceColorDual) -> bool {
        let main = self.main_face();
        let Some(main_side) = other.side(main) else { return false };
        self.primary.iter().all(|&f| other.side(f) == Some(main_side))
            && self.secondary.iter().all(|&f| other.side(f) == Some(!main_side))
    }

    /// Map every face through an embedding. `None` if two faces of opposite
    /// colors land on the same target face; `Some(None)` if the result no
    /// longer relates two distinct faces.
    pub fn embedded(&self, embedding: &Embedding) -> Option<Option<FaceColorDual>> {
        let primary: Vec<usize> = self.primary.iter().map(|&f| embedding.map_face(f)).collect();
        let secondary: Vec<usize> = self.secondary.iter().map(|&f| embedding.map_face(f)).collect();
        if primary.iter().any(|f| secondary.contains(f)) {
            return None;
        }
        Some(FaceColorDual::new(primary, secondary))
    }

    /// Pairs `(main face, other face, opposite?)` the dual constrains.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, bool)> + '_ {
        let main = self.main_face();
        self.primary[1..]
            .iter()
            .map(move |&f| (main, f, false))
            .chain(self.secondary.iter().map(move |&f| (main, f, true)))
    }
}

/// One local constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "FeatureJson", try_from = "FeatureJson")]
pub enum Feature {
    FaceValue { face: usize, value: usize },
    BlackEdge(usize),
    RedEdge(usize),
    SectorNotZero(usize),
    SectorNotOne(usize),
    SectorNotTwo(usize),
    SectorOnlyOne(usize),
    FaceColorDual(FaceColorDual),
}

impl Feature {
    /// Stable string used for set membership and ordering in dumps.
    pub fn canonical_key(&self) -> String {
        match self {
            Feature::FaceValue { face, value } => format!("fv-{}-{}", face, value),
            Feature::BlackEdge(e) => format!("be-{}", e),
            Feature::RedEdge(e) => format!("re-{}", e),
            Feature::SectorNotZero(s) => format!("snz-{}", s),
            Feature::SectorNotOne(s) => format!("sno-{}", s),
            Feature::SectorNotTwo(s) => format!("snt-{}", s),
            Feature::SectorOnlyOne(s) => format!("soo-{}", s),
            Feature::FaceColorDual(d) => {
                let join = |v: &[usize]| v.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(",");
                format!("fcd-{}|{}", join(d.primary_faces()), join(d.secondary_faces()))
            }
        }
    }

    /// The sector and mask of a sector feature.
    pub fn sector_mask(&self) -> Option<(usize, SectorMask)> {
        match self {
            Feature::SectorNotZero(s) => Some((*s, SectorMask::NOT_ZERO)),
            Feature::SectorNotOne(s) => Some((*s, SectorMask::NOT_ONE)),
            Feature::SectorNotTwo(s) => Some((*s, SectorMask::NOT_TWO)),
            Feature::SectorOnlyOne(s) => Some((*s, SectorMask::ONLY_ONE)),
            _ => None,
        }
    }

    pub fn is_face_color(&self) -> bool {
        matches!(self, Feature::FaceColorDual(_))
    }

    /// Rebuild a sector feature of the same kind on another sector.
    fn with_sector(&self, sector: usize) -> Feature {
        match self {
            Feature::SectorNotZero(_) => Feature::SectorNotZero(sector),
            Feature::SectorNotOne(_) => Feature::SectorNotOne(sector),
            Feature::SectorNotTwo(_) => Feature::SectorNotTwo(sector),
            Feature::SectorOnlyOne(_) => Feature::SectorOnlyOne(sector),
            other => other.clone(),
        }
    }

    /// Carry the feature through an embedding. `None` means it has no
    /// faithful image there: a black exit edge that does not fan out to
    /// exactly one edge, or a color dual forced onto itself.
    pub fn embedded(&self, embedding: &Embedding) -> Option<Vec<Feature>> {
        match self {
            Feature::FaceValue { face, value } => {
                Some(vec![Feature::FaceValue { face: embedding.map_face(*face), value: *value }])
            }
            Feature::BlackEdge(e) => match embedding.map_edge(*e) {
                [target] => Some(vec![Feature::BlackEdge(*target)]),
                _ => None,
            },
            Feature::RedEdge(e) => Some(embedding.map_edge(*e).iter().map(|&t| Feature::RedEdge(t)).collect()),
            Feature::SectorNotZero(s)
            | Feature::SectorNotOne(s)
            | Feature::SectorNotTwo(s)
            | Feature::SectorOnlyOne(s) => Some(vec![self.with_sector(embedding.map_sector(*s))]),
            Feature::FaceColorDual(dual) => {
                let mapped = dual.embedded(embedding)?;
                Some(mapped.map(Feature::FaceColorDual).into_iter().collect())
            }
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::FaceValue { face, value } => write!(f, "face {} = {}", face, value),
            Feature::BlackEdge(e) => write!(f, "edge {} black", e),
            Feature::RedEdge(e) => write!(f, "edge {} red", e),
            Feature::SectorNotZero(s) => write!(f, "sector {} not 0", s),
            Feature::SectorNotOne(s) => write!(f, "sector {} not 1", s),
            Feature::SectorNotTwo(s) => write!(f, "sector {} not 2", s),
            Feature::SectorOnlyOne(s) => write!(f, "sector {} only 1", s),
            Feature::FaceColorDual(d) => {
                write!(f, "faces {:?} opposite {:?}", d.primary_faces(), d.secondary_faces())
            }
        }
    }
}

/// Wire shape of a feature: `{"type": "black-edge", "edge": 3}` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum FeatureJson {
    FaceValue { face: usize, value: usize },
    BlackEdge { edge: usize },
    RedEdge { edge: usize },
    SectorNotZero { sector: usize },
    SectorNotOne { sector: usize },
    SectorNotTwo { sector: usize },
    SectorOnlyOne { sector: usize },
    FaceColorDual { primary_faces: Vec<usize>, secondary_faces: Vec<usize> },
}

impl From<Feature> for FeatureJson {
    fn from(feature: Feature) -> Self {
        match feature {
            Feature::FaceValue { face, value } => FeatureJson::FaceValue { face, value },
            Feature::BlackEdge(edge) => FeatureJson::BlackEdge { edge },
            Feature::RedEdge(edge) => FeatureJson::RedEdge { edge },
            Feature::SectorNotZero(sector) => FeatureJson::SectorNotZero { sector },
            Feature::SectorNotOne(sector) => FeatureJson::SectorNotOne { sector },
            Feature::SectorNotTwo(sector) => FeatureJson::SectorNotTwo { sector },
            Feature::SectorOnlyOne(sector) => FeatureJson::SectorOnlyOne { sector },
            Feature::FaceColorDual(d) => FeatureJson::FaceColorDual {
                primary_faces: d.primary,
                secondary_faces: d.secondary,
            },
        }
    }
}

impl TryFrom<FeatureJson> for Feature {
    type Error = String;

    fn try_from(json: FeatureJson) -> Result<Self, Self::Error> {
        Ok(match json {
            FeatureJson::FaceValue { face, value } => Feature::FaceValue { face, value },
            FeatureJson::BlackEdge { edge } => Feature::BlackEdge(edge),
            FeatureJson::RedEdge { edge } => Feature::RedEdge(edge),
            FeatureJson::SectorNotZero { sector } => Feature::SectorNotZero(sector),
            FeatureJson::SectorNotOne { sector } => Feature::SectorNotOne(sector),
            FeatureJson::SectorNotTwo { sector } => Feature::SectorNotTwo(sector),
            FeatureJson::SectorOnlyOne { sector } => Feature::SectorOnlyOne(sector),
            FeatureJson::FaceColorDual { primary_faces, secondary_faces } => {
                let dual = FaceColorDual::new(primary_faces.clone(), secondary_faces.clone())
                    .ok_or_else(|| {
                        format!("invalid face-color-dual {:?} / {:?}", primary_faces, secondary_faces)
                    })?;
                Feature::FaceColorDual(dual)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_mask_from_edges() {
        use EdgeState::*;
        assert_eq!(SectorMask::from_edge_states(White, White), SectorMask::ALL);
        assert_eq!(SectorMask::from_edge_states(Black, White), SectorMask::NOT_ZERO);
        assert_eq!(SectorMask::from_edge_states(Red, White), SectorMask::NOT_TWO);
        assert_eq!(SectorMask::from_edge_states(Black, Red), SectorMask::ONLY_ONE);
        assert_eq!(SectorMask::from_edge_states(Black, Black), SectorMask::only(2));
        assert_eq!(SectorMask::from_edge_states(Red, Red), SectorMask::only(0));
    }

    #[test]
    fn test_minimal_sector_features() {
        assert_eq!(
            SectorMask::ONLY_ONE.minimal_features(3, SectorMask::ALL),
            vec![Feature::SectorOnlyOne(3)]
        );
        // {2} needs two features without edge context...
        assert_eq!(SectorMask::only(2).minimal_features(0, SectorMask::ALL).len(), 2);
        // ...but one when an edge is already known black
        assert_eq!(
            SectorMask::only(2).minimal_features(0, SectorMask::NOT_ZERO),
            vec![Feature::SectorNotOne(0)]
        );
        assert_eq!(SectorMask::only(0).minimal_features(0, SectorMask::ALL).len(), 2);
    }

    #[test]
    fn test_dual_rejects_overlap() {
        assert!(FaceColorDual::new(vec![1, 2], vec![2, 3]).is_none());
        assert!(FaceColorDual::new(vec![1], vec![]).is_none());
        let dual = FaceColorDual::new(vec![4], vec![1]).unwrap();
        // Normalized so the smallest face is primary
        assert_eq!(dual.primary_faces(), &[1]);
        assert_eq!(dual.secondary_faces(), &[4]);
    }

    #[test]
    fn test_dual_merge() {
        let a = FaceColorDual::new(vec![0, 1], vec![2]).unwrap();
        let b = FaceColorDual::new(vec![2, 3], vec![]).unwrap();
        match a.merge(&b) {
            DualMerge::Merged(m) => {
                assert_eq!(m.primary_faces(), &[0, 1]);
                assert_eq!(m.secondary_faces(), &[2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
        let c = FaceColorDual::new(vec![0, 2], vec![]).unwrap();
        assert_eq!(a.merge(&c), DualMerge::Conflict);
        let d = FaceColorDual::new(vec![5, 6], vec![]).unwrap();
        assert_eq!(a.merge(&d), DualMerge::Disjoint);
    }

    #[test]
    fn test_dual_implication() {
        let big = FaceColorDual::new(vec![0, 1], vec![2, 3]).unwrap();
        let small = FaceColorDual::new(vec![3], vec![1]).unwrap();
        assert!(small.is_implied_by(&big));
        let wrong = FaceColorDual::new(vec![0, 2], vec![]).unwrap();
        assert!(!wrong.is_implied_by(&big));
        assert!(!big.is_implied_by(&small));
    }

    #[test]
    fn test_feature_json_shape() {
        let json = serde_json::to_string(&Feature::BlackEdge(3)).unwrap();
        assert_eq!(json, r#"{"type":"black-edge","edge":3}"#);
        let dual = Feature::FaceColorDual(FaceColorDual::new(vec![0], vec![2]).unwrap());
        let json = serde_json::to_string(&dual).unwrap();
        assert!(json.contains("\"primaryFaces\":[0]"));
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dual);
        let bad = r#"{"type":"face-color-dual","primaryFaces":[1],"secondaryFaces":[1]}"#;
        assert!(serde_json::from_str::<Feature>(bad).is_err());
    }

    #[test]
    fn test_canonical_keys_are_distinct() {
        let features = [
            Feature::BlackEdge(1),
            Feature::RedEdge(1),
            Feature::SectorNotZero(1),
            Feature::SectorNotOne(1),
            Feature::SectorNotTwo(1),
            Feature::SectorOnlyOne(1),
            Feature::FaceValue { face: 1, value: 1 },
        ];
        let keys: std::collections::HashSet<String> = features.iter().map(|f| f.canonical_key()).collect();
        assert_eq!(keys.len(), features.len());
    }
}
