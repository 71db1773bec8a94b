//! BinaryRuleCollection: many rules over many boards packed into one byte
//! buffer, plus a scan that tests rules against live state straight from
//! the bytes.
//!
//! Layout of one rule:
//!
//! ```text
//! [board index] input features.. 0xFF output features.. 0xFF
//! ```
//!
//! Each non-color feature is one byte indexing the board's
//! [`BinaryFeatureTable`]. A face-color dual is a run: `0xFE`, the main
//! face, then one byte per other face, bare for the main face's color and
//! `0x80 | face` for the opposite color. Runs come after the single-byte
//! features of their section and end at the next `0xFE` or `0xFF`.
//!
//! The stored output leaves out features the input already implies.

use crate::board::{BoardId, PatternBoard};
use crate::codec;
use crate::embedding::{Embedding, EmbeddingCache};
use crate::error::{Error, Result};
use crate::feature::{EdgeState, FaceColorDual, Feature, SectorMask};
use crate::feature_set::FeatureSet;
use crate::rule::PatternRule;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, trace};

const END: u8 = 0xFF;
const COLOR_RUN: u8 = 0xFE;
const SECONDARY: u8 = 0x80;
/// Faces from here on would collide with the markers once flagged
const MAX_COLOR_FACE: usize = 0x7E;
const MAX_TABLE_ENTRIES: usize = 0xFE;
const MAX_BOARDS: usize = 0xFF;

/// Read access to a live board, indexed by target-board element.
pub trait BoardFeatureState {
    fn edge_state(&self, edge: usize) -> EdgeState;

    fn face_value(&self, face: usize) -> Option<usize>;

    /// Black-edge counts the sector still allows.
    fn sector_mask(&self, sector: usize) -> SectorMask;

    /// Color class id of a face. Faces with equal ids share a color.
    fn face_color(&self, face: usize) -> usize;

    /// The color id opposite to the face's color, if one is known.
    fn opposite_face_color(&self, face: usize) -> Option<usize>;
}

/// A [`BoardFeatureState`] snapshot of a feature set.
#[derive(Debug, Clone)]
pub struct FeatureSetState {
    edges: Vec<EdgeState>,
    face_values: Vec<Option<usize>>,
    sectors: Vec<SectorMask>,
    colors: Vec<usize>,
    opposite: Vec<Option<usize>>,
}

impl FeatureSetState {
    pub fn new(features: &FeatureSet) -> Self {
        let board = features.board();
        let duals = features.color_duals();
        // Faces outside every dual get a color of their own
        let mut colors: Vec<usize> = (0..board.faces.len()).map(|f| 2 * duals.len() + f).collect();
        let mut opposite = vec![None; board.faces.len()];
        for (k, dual) in duals.iter().enumerate() {
            for &f in dual.primary_faces() {
                colors[f] = 2 * k;
                opposite[f] = Some(2 * k + 1);
            }
            for &f in dual.secondary_faces() {
                colors[f] = 2 * k + 1;
                opposite[f] = Some(2 * k);
            }
        }
        FeatureSetState {
            edges: (0..board.edges.len()).map(|e| features.edge_state(e)).collect(),
            face_values: (0..board.faces.len()).map(|f| features.face_value(f)).collect(),
            sectors: (0..board.sectors.len()).map(|s| features.sector_knowledge(s)).collect(),
            colors,
            opposite,
        }
    }
}

impl BoardFeatureState for FeatureSetState {
    fn edge_state(&self, edge: usize) -> EdgeState {
        self.edges[edge]
    }

    fn face_value(&self, face: usize) -> Option<usize> {
        self.face_values[face]
    }

    fn sector_mask(&self, sector: usize) -> SectorMask {
        self.sectors[sector]
    }

    fn face_color(&self, face: usize) -> usize {
        self.colors[face]
    }

    fn opposite_face_color(&self, face: usize) -> Option<usize> {
        self.opposite[face]
    }
}

/// The single-byte features of one board.
#[derive(Debug)]
pub struct BinaryFeatureTable {
    features: Vec<Feature>,
    faces: usize,
    index: HashMap<Feature, u8>,
}

impl BinaryFeatureTable {
    pub fn new(board: &PatternBoard) -> Result<Self> {
        let mut features = Vec::new();
        for face in board.non_exit_faces() {
            for value in 0..=face.edges.len() {
                features.push(Feature::FaceValue { face: face.index, value });
            }
        }
        features.extend((0..board.edges.len()).map(Feature::BlackEdge));
        features.extend((0..board.edges.len()).map(Feature::RedEdge));
        for s in 0..board.sectors.len() {
            features.push(Feature::SectorNotZero(s));
            features.push(Feature::SectorNotOne(s));
            features.push(Feature::SectorNotTwo(s));
            features.push(Feature::SectorOnlyOne(s));
        }
        if features.len() > MAX_TABLE_ENTRIES {
            return Err(Error::FeatureTableOverflow {
                board: board.to_descriptor_string(),
                entries: features.len(),
            });
        }
        let index = features.iter().enumerate().map(|(i, f)| (f.clone(), i as u8)).collect();
        Ok(BinaryFeatureTable { features, faces: board.faces.len(), index })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn byte_for(&self, feature: &Feature) -> Option<u8> {
        self.index.get(feature).copied()
    }

    pub fn feature(&self, byte: u8) -> Option<&Feature> {
        self.features.get(byte as usize)
    }
}

/// One feature as seen by the scan.
#[derive(Debug, Clone, Copy)]
enum ScanItem<'a> {
    Single(&'a Feature),
    ColorRun { main: u8, faces: &'a [u8] },
}

impl ScanItem<'_> {
    /// Whether the state implies the embedded feature. `strict` is for
    /// inputs: a feature without a faithful image fails. Outputs drop such
    /// features, so they count as holding.
    fn holds(&self, embedding: &Embedding, state: &impl BoardFeatureState, strict: bool) -> bool {
        match *self {
            ScanItem::Single(feature) => match feature {
                Feature::FaceValue { face, value } => state.face_value(embedding.map_face(*face)) == Some(*value),
                Feature::BlackEdge(e) => match embedding.map_edge(*e) {
                    [target] => state.edge_state(*target) == EdgeState::Black,
                    _ => !strict,
                },
                Feature::RedEdge(e) => embedding.map_edge(*e).iter().all(|&t| state.edge_state(t) == EdgeState::Red),
                Feature::FaceColorDual(_) => !strict,
                _ => match feature.sector_mask() {
                    Some((sector, mask)) => state.sector_mask(embedding.map_sector(sector)).is_subset_of(mask),
                    None => !strict,
                },
            },
            ScanItem::ColorRun { main, faces } => {
                let image = |b: u8| embedding.map_face((b & !SECONDARY) as usize);
                let main = image(main);
                let same: Vec<usize> = faces.iter().filter(|&&b| b & SECONDARY == 0).map(|&b| image(b)).collect();
                let opposite: Vec<usize> = faces.iter().filter(|&&b| b & SECONDARY != 0).map(|&b| image(b)).collect();
                if opposite.iter().any(|&f| f == main || same.contains(&f)) {
                    // Opposite colors forced onto one face
                    return !strict;
                }
                let color = state.face_color(main);
                let opposite_color = state.opposite_face_color(main);
                same.iter().all(|&f| state.face_color(f) == color)
                    && opposite.iter().all(|&f| Some(state.face_color(f)) == opposite_color)
            }
        }
    }
}

/// Walks one section of a rule.
struct SectionCursor<'a> {
    data: &'a [u8],
    table: &'a BinaryFeatureTable,
    pos: usize,
    done: bool,
}

impl<'a> Iterator for SectionCursor<'a> {
    type Item = ScanItem<'a>;

    fn next(&mut self) -> Option<ScanItem<'a>> {
        if self.done {
            return None;
        }
        let byte = self.data[self.pos];
        match byte {
            END => {
                self.pos += 1;
                self.done = true;
                None
            }
            COLOR_RUN => {
                let main = self.data[self.pos + 1];
                let start = self.pos + 2;
                let mut end = start;
                while self.data[end] != END && self.data[end] != COLOR_RUN {
                    end += 1;
                }
                self.pos = end;
                Some(ScanItem::ColorRun { main, faces: &self.data[start..end] })
            }
            _ => {
                self.pos += 1;
                match self.table.feature(byte) {
                    Some(feature) => Some(ScanItem::Single(feature)),
                    None => panic!("binary rule byte {:#04x} is outside the feature table", byte),
                }
            }
        }
    }
}

/// JSON form of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryRuleCollectionJson {
    pub pattern_boards: Vec<String>,
    pub rules: String,
    pub highlander: bool,
}

#[derive(Debug, Clone)]
pub struct BinaryRuleCollection {
    boards: Vec<Arc<PatternBoard>>,
    tables: Vec<Arc<BinaryFeatureTable>>,
    data: Vec<u8>,
    rule_indices: Vec<usize>,
    highlander: bool,
}

impl BinaryRuleCollection {
    pub fn empty(highlander: bool) -> Self {
        BinaryRuleCollection {
            boards: Vec::new(),
            tables: Vec::new(),
            data: Vec::new(),
            rule_indices: Vec::new(),
            highlander,
        }
    }

    pub fn from_rules(rules: &[PatternRule], highlander: bool) -> Result<Self> {
        let mut collection = Self::empty(highlander);
        for rule in rules {
            collection.add_rule(rule)?;
        }
        Ok(collection)
    }

    pub fn size(&self) -> usize {
        self.rule_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_indices.is_empty()
    }

    pub fn is_highlander(&self) -> bool {
        self.highlander
    }

    pub fn boards(&self) -> &[Arc<PatternBoard>] {
        &self.boards
    }

    /// Raw bytes in use.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn board_index(&mut self, board: &Arc<PatternBoard>) -> Result<usize> {
        if let Some(i) = self.boards.iter().position(|b| b.id() == board.id()) {
            return Ok(i);
        }
        if self.boards.len() >= MAX_BOARDS {
            return Err(Error::MalformedRuleData {
                rule: self.size(),
                reason: format!("more than {} boards in one collection", MAX_BOARDS),
            });
        }
        self.tables.push(Arc::new(BinaryFeatureTable::new(board)?));
        self.boards.push(Arc::clone(board));
        Ok(self.boards.len() - 1)
    }

    pub fn add_rule(&mut self, rule: &PatternRule) -> Result<()> {
        if rule.is_highlander() && !self.highlander {
            return Err(Error::IncompatibleFeature(format!(
                "highlander rule {} in a non-highlander collection",
                rule
            )));
        }
        let board = self.board_index(rule.board())?;
        let start = self.data.len();
        let index = self.size();
        let table = Arc::clone(&self.tables[board]);

        self.data.push(board as u8);
        let encoded = encode_section(&table, &rule.input().features(), &mut self.data, index)
            .and_then(|_| encode_section(&table, &rule.output().without_implied_by(rule.input()), &mut self.data, index));
        if let Err(err) = encoded {
            self.data.truncate(start);
            return Err(err);
        }
        self.rule_indices.push(start);
        Ok(())
    }

    pub fn with_rules(&self, rules: &[PatternRule]) -> Result<Self> {
        let mut collection = self.clone();
        for rule in rules {
            collection.add_rule(rule)?;
        }
        Ok(collection)
    }

    pub fn get_rule(&self, index: usize) -> Result<PatternRule> {
        let start = *self.rule_indices.get(index).ok_or_else(|| Error::MalformedRuleData {
            rule: index,
            reason: format!("only {} rules", self.size()),
        })?;
        let (rule, _) = self.decode_rule(start, index)?;
        Ok(rule)
    }

    pub fn rules(&self) -> Result<Vec<PatternRule>> {
        (0..self.size()).map(|i| self.get_rule(i)).collect()
    }

    /// Parse the rule starting at `start`, returning it and where the next
    /// rule begins.
    fn decode_rule(&self, start: usize, index: usize) -> Result<(PatternRule, usize)> {
        let malformed = |reason: &str| Error::MalformedRuleData { rule: index, reason: reason.to_string() };
        let board_byte = *self.data.get(start).ok_or_else(|| malformed("missing board index"))?;
        let board = self.boards.get(board_byte as usize).ok_or_else(|| malformed("unknown board index"))?;
        let table = &self.tables[board_byte as usize];

        let mut pos = start + 1;
        let input_features = decode_section(table, &self.data, &mut pos, index)?;
        let output_features = decode_section(table, &self.data, &mut pos, index)?;

        let input = FeatureSet::from_features(board, &input_features)
            .ok_or_else(|| malformed("contradictory input"))?;
        let output = input
            .union(&FeatureSet::from_features(board, &output_features).ok_or_else(|| malformed("contradictory output"))?)
            .ok_or_else(|| malformed("output contradicts input"))?;
        let rule = PatternRule::new(input, output, self.highlander).ok_or_else(|| malformed("output contradicts input"))?;
        Ok((rule, pos))
    }

    pub fn serialize(&self) -> Result<BinaryRuleCollectionJson> {
        Ok(BinaryRuleCollectionJson {
            pattern_boards: self.boards.iter().map(|b| b.to_descriptor_string()).collect(),
            rules: codec::compress(&self.data)?,
            highlander: self.highlander,
        })
    }

    pub fn deserialize(json: &BinaryRuleCollectionJson) -> Result<Self> {
        Self::deserialize_with_boards(json, &[])
    }

    /// Like [`Self::deserialize`], but boards whose descriptor matches one
    /// of `known` reuse that board object instead of building a new one.
    pub fn deserialize_with_boards(json: &BinaryRuleCollectionJson, known: &[Arc<PatternBoard>]) -> Result<Self> {
        let mut collection = Self::empty(json.highlander);
        for descriptor in &json.pattern_boards {
            let board = match known.iter().find(|b| &b.to_descriptor_string() == descriptor) {
                Some(board) => Arc::clone(board),
                None => Arc::new(PatternBoard::from_descriptor_string(descriptor)?),
            };
            collection.tables.push(Arc::new(BinaryFeatureTable::new(&board)?));
            collection.boards.push(board);
        }
        collection.data = codec::decompress(&json.rules)?;

        let mut pos = 0;
        while pos < collection.data.len() {
            let index = collection.rule_indices.len();
            let (_, next) = collection.decode_rule(pos, index)?;
            collection.rule_indices.push(pos);
            pos = next;
        }
        debug!(
            boards = collection.boards.len(),
            rules = collection.size(),
            bytes = collection.data.len(),
            "loaded rule collection"
        );
        Ok(collection)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.serialize()?)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let json: BinaryRuleCollectionJson = serde_json::from_str(s)?;
        Self::deserialize(&json)
    }

    fn cursor(&self, pos: usize, board_byte: u8) -> SectionCursor<'_> {
        SectionCursor { data: &self.data, table: &self.tables[board_byte as usize], pos, done: false }
    }

    /// Whether rule `index`, placed by `embedding`, fires against `state`:
    /// every input feature holds and some output feature does not yet.
    pub fn is_actionable_embedding_from_data(
        &self,
        index: usize,
        embedding: &Embedding,
        state: &impl BoardFeatureState,
    ) -> bool {
        assert!(index < self.size(), "rule index {} out of range for {} rules", index, self.size());
        let start = self.rule_indices[index];
        let board_byte = self.data[start];
        let mut input = self.cursor(start + 1, board_byte);
        for item in input.by_ref() {
            if !item.holds(embedding, state, true) {
                return false;
            }
        }
        let mut output = self.cursor(input.pos, board_byte);
        output.any(|item| !item.holds(embedding, state, false))
    }

    /// The indices of `embeddings` under which rule `index` is actionable.
    /// Survivors are narrowed feature by feature between two buffers.
    pub fn get_actionable_embeddings_from_data(
        &self,
        index: usize,
        embeddings: &[Embedding],
        state: &impl BoardFeatureState,
    ) -> Vec<usize> {
        assert!(index < self.size(), "rule index {} out of range for {} rules", index, self.size());
        let start = self.rule_indices[index];
        let board_byte = self.data[start];
        let mut current: Vec<usize> = (0..embeddings.len()).collect();
        let mut next: Vec<usize> = Vec::with_capacity(embeddings.len());

        let mut input = self.cursor(start + 1, board_byte);
        for item in input.by_ref() {
            next.clear();
            next.extend(current.iter().copied().filter(|&i| item.holds(&embeddings[i], state, true)));
            std::mem::swap(&mut current, &mut next);
            if current.is_empty() {
                return Vec::new();
            }
        }

        let mut actionable = Vec::new();
        for item in self.cursor(input.pos, board_byte) {
            next.clear();
            for &i in &current {
                if item.holds(&embeddings[i], state, false) {
                    next.push(i);
                } else {
                    actionable.push(i);
                }
            }
            std::mem::swap(&mut current, &mut next);
            if current.is_empty() {
                break;
            }
        }
        actionable.sort_unstable();
        actionable
    }

    /// Every rule of the collection embedded into `target`.
    pub fn embedded_rules_for(&self, target: &Arc<PatternBoard>, cache: &mut EmbeddingCache) -> Result<Vec<PatternRule>> {
        let mut embedded = Vec::new();
        for rule in self.rules()? {
            let embeddings = cache.get_embeddings(rule.board(), target);
            embedded.extend(rule.embedded_rules(&embeddings, target));
        }
        Ok(embedded)
    }

    /// Add each rule unless the rules already present (and those added
    /// before it) make it redundant. The embedded pool is rebuilt only when
    /// the incoming rules switch boards.
    pub fn with_nonredundant_rules(&self, rules: &[PatternRule], cache: &mut EmbeddingCache) -> Result<Self> {
        let mut collection = self.clone();
        let mut pool_board: Option<BoardId> = None;
        let mut pool: Vec<PatternRule> = Vec::new();
        let mut added = 0;

        for rule in rules {
            let board = rule.board();
            if pool_board != Some(board.id()) {
                pool = collection.embedded_rules_for(board, cache)?;
                pool_board = Some(board.id());
            }
            if rule.is_trivial() || rule.is_redundant(&pool) {
                trace!(rule = %rule, "skipping redundant rule");
                continue;
            }
            let automorphisms = cache.get_automorphisms(board);
            pool.extend(rule.embedded_rules(&automorphisms, board));
            collection.add_rule(rule)?;
            added += 1;
        }
        debug!(offered = rules.len(), added, "non-redundant merge");
        Ok(collection)
    }

    /// Plain union: every rule of `other` appended.
    pub fn with_collection(&self, other: &BinaryRuleCollection) -> Result<Self> {
        self.with_rules(&other.rules()?)
    }

    pub fn with_collection_nonredundant(&self, other: &BinaryRuleCollection, cache: &mut EmbeddingCache) -> Result<Self> {
        self.with_nonredundant_rules(&other.rules()?, cache)
    }

    /// Rules of `self` whose content does not appear in `other`.
    pub fn without_collection(&self, other: &BinaryRuleCollection) -> Result<Self> {
        let remove: HashSet<String> = other.rules()?.iter().map(|r| r.content_key()).collect();
        let kept: Vec<PatternRule> = self
            .rules()?
            .into_iter()
            .filter(|r| !remove.contains(&r.content_key()))
            .collect();
        info!(before = self.size(), after = kept.len(), "collection difference");
        Self::from_rules(&kept, self.highlander)
    }
}

fn encode_section(table: &BinaryFeatureTable, features: &[Feature], out: &mut Vec<u8>, rule: usize) -> Result<()> {
    for feature in features.iter().filter(|f| !f.is_face_color()) {
        let byte = table.byte_for(feature).ok_or_else(|| Error::MalformedRuleData {
            rule,
            reason: format!("feature {} has no binary form", feature),
        })?;
        out.push(byte);
    }
    for feature in features {
        if let Feature::FaceColorDual(dual) = feature {
            encode_color_run(dual, out)?;
        }
    }
    out.push(END);
    Ok(())
}

fn encode_color_run(dual: &FaceColorDual, out: &mut Vec<u8>) -> Result<()> {
    if let Some(face) = dual.faces().find(|&f| f >= MAX_COLOR_FACE) {
        return Err(Error::FaceIndexOverflow(face));
    }
    out.push(COLOR_RUN);
    out.push(dual.main_face() as u8);
    out.extend(dual.primary_faces()[1..].iter().map(|&f| f as u8));
    out.extend(dual.secondary_faces().iter().map(|&f| SECONDARY | f as u8));
    Ok(())
}

fn decode_section(table: &BinaryFeatureTable, data: &[u8], pos: &mut usize, rule: usize) -> Result<Vec<Feature>> {
    let malformed = |reason: String| Error::MalformedRuleData { rule, reason };
    let mut features = Vec::new();
    loop {
        let byte = *data.get(*pos).ok_or_else(|| malformed("truncated rule".to_string()))?;
        *pos += 1;
        match byte {
            END => return Ok(features),
            COLOR_RUN => {
                let main = *data.get(*pos).ok_or_else(|| malformed("truncated color run".to_string()))?;
                if main & SECONDARY != 0 {
                    return Err(malformed(format!("color run main face byte {:#04x}", main)));
                }
                if main as usize >= table.faces {
                    return Err(malformed(format!("color run face {} outside the board", main)));
                }
                *pos += 1;
                let mut primary = vec![main as usize];
                let mut secondary = Vec::new();
                loop {
                    let b = *data.get(*pos).ok_or_else(|| malformed("truncated color run".to_string()))?;
                    if b == END || b == COLOR_RUN {
                        break;
                    }
                    if (b & !SECONDARY) as usize >= table.faces {
                        return Err(malformed(format!("color run face {} outside the board", b & !SECONDARY)));
                    }
                    if b & SECONDARY != 0 {
                        secondary.push((b & !SECONDARY) as usize);
                    } else {
                        primary.push(b as usize);
                    }
                    *pos += 1;
                }
                let dual = FaceColorDual::new(primary, secondary)
                    .ok_or_else(|| malformed("invalid color run".to_string()))?;
                features.push(Feature::FaceColorDual(dual));
            }
            _ => {
                let feature = table
                    .feature(byte)
                    .ok_or_else(|| malformed(format!("byte {:#04x} outside the feature table", byte)))?;
                features.push(feature.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::standard;
    use crate::embedding::compute_embeddings;
    use crate::rule::MatchState;
    use crate::solution_set::SolutionChannels;

    fn board(descriptor: crate::board::PatternBoardDescriptor) -> Arc<PatternBoard> {
        Arc::new(PatternBoard::new(descriptor).unwrap())
    }

    fn square_rules(board: &Arc<PatternBoard>) -> Vec<PatternRule> {
        (0..=3)
            .filter_map(|v| {
                let input = FeatureSet::empty(board).with_face_value(0, v).unwrap();
                PatternRule::get_basic_rule(&input, false, SolutionChannels::default())
            })
            .filter(|r| !r.is_trivial())
            .collect()
    }

    #[test]
    fn test_feature_table_size() {
        let square = board(standard::square());
        // 5 face values + 8 black + 8 red + 4 * 4 sector features
        assert_eq!(BinaryFeatureTable::new(&square).unwrap().len(), 37);
    }

    #[test]
    fn test_rules_round_trip_through_bytes() {
        let square = board(standard::square());
        let rules = square_rules(&square);
        assert!(!rules.is_empty());
        let collection = BinaryRuleCollection::from_rules(&rules, false).unwrap();
        assert_eq!(collection.size(), rules.len());
        for (i, rule) in rules.iter().enumerate() {
            assert_eq!(&collection.get_rule(i).unwrap(), rule);
        }
    }

    #[test]
    fn test_color_runs_round_trip() {
        let square = board(standard::square());
        let dual = FaceColorDual::new(vec![0, 2], vec![1, 3]).unwrap();
        let input = FeatureSet::empty(&square).with_face_value(0, 1).unwrap();
        let output = FeatureSet::from_features(&square, &[Feature::FaceColorDual(dual), Feature::RedEdge(5)]).unwrap();
        let rule = PatternRule::new(input, output, false).unwrap();
        let collection = BinaryRuleCollection::from_rules(std::slice::from_ref(&rule), false).unwrap();
        assert!(collection.data().contains(&COLOR_RUN));
        assert_eq!(collection.get_rule(0).unwrap(), rule);
    }

    #[test]
    fn test_serialize_round_trip() {
        let square = board(standard::square());
        let collection = BinaryRuleCollection::from_rules(&square_rules(&square), false).unwrap();
        let json = collection.serialize().unwrap();
        let back = BinaryRuleCollection::deserialize(&json).unwrap();
        assert_eq!(back.size(), collection.size());
        for i in 0..collection.size() {
            let a = serde_json::to_string(&collection.get_rule(i).unwrap().to_json()).unwrap();
            let b = serde_json::to_string(&back.get_rule(i).unwrap().to_json()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_corrupt_data_is_rejected() {
        let square = board(standard::square());
        let collection = BinaryRuleCollection::from_rules(&square_rules(&square), false).unwrap();
        let mut json = collection.serialize().unwrap();
        let mut bytes = codec::decompress(&json.rules).unwrap();
        bytes.pop();
        json.rules = codec::compress(&bytes).unwrap();
        assert!(matches!(
            BinaryRuleCollection::deserialize(&json),
            Err(Error::MalformedRuleData { .. })
        ));
        json.rules = "zz".to_string();
        assert!(matches!(BinaryRuleCollection::deserialize(&json), Err(Error::Decompression(_))));
    }

    #[test]
    fn test_color_run_face_outside_board_is_rejected() {
        let square = board(standard::square());
        let json = BinaryRuleCollectionJson {
            pattern_boards: vec![square.to_descriptor_string()],
            rules: codec::compress(&[0x00, 0xFF, 0xFE, 0x00, 0x7D, 0xFF]).unwrap(),
            highlander: false,
        };
        assert!(matches!(
            BinaryRuleCollection::deserialize(&json),
            Err(Error::MalformedRuleData { rule: 0, .. })
        ));

        let json = BinaryRuleCollectionJson {
            rules: codec::compress(&[0x00, 0xFF, 0xFE, 0x05, 0x81, 0xFF]).unwrap(),
            ..json
        };
        assert!(matches!(
            BinaryRuleCollection::deserialize(&json),
            Err(Error::MalformedRuleData { rule: 0, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_scan_of_unknown_rule_index_panics() {
        let square = board(standard::square());
        let collection = BinaryRuleCollection::from_rules(&square_rules(&square), false).unwrap();
        let embeddings = compute_embeddings(&square, &square);
        let state = FeatureSetState::new(&FeatureSet::empty(&square));
        collection.get_actionable_embeddings_from_data(collection.size(), &embeddings, &state);
    }

    #[test]
    fn test_highlander_rule_needs_highlander_collection() {
        let square = board(standard::square());
        let input = FeatureSet::empty(&square).with_face_value(0, 3).unwrap();
        let rule = PatternRule::get_basic_rule(&input, true, SolutionChannels::default()).unwrap();
        assert!(BinaryRuleCollection::from_rules(std::slice::from_ref(&rule), false).is_err());
        assert!(BinaryRuleCollection::from_rules(std::slice::from_ref(&rule), true).is_ok());
    }

    #[test]
    fn test_scan_agrees_with_match_state() {
        let square = board(standard::square());
        let domino = board(standard::domino());
        let rules = square_rules(&square);
        let collection = BinaryRuleCollection::from_rules(&rules, false).unwrap();
        let embeddings = compute_embeddings(&square, &domino);

        let empty = FeatureSet::empty(&domino);
        let states = vec![
            empty.clone(),
            empty.with_face_value(0, 0).unwrap(),
            empty.with_face_value(1, 3).unwrap(),
            empty.with_face_value(0, 3).unwrap().with_face_value(1, 3).unwrap(),
        ];
        for live in &states {
            let state = FeatureSetState::new(live);
            for i in 0..collection.size() {
                let rule = collection.get_rule(i).unwrap();
                let mut expected = Vec::new();
                for (k, embedding) in embeddings.iter().enumerate() {
                    let full = rule
                        .embedded(embedding, &domino)
                        .is_some_and(|r| r.get_match_state(live) == MatchState::Actionable);
                    assert_eq!(collection.is_actionable_embedding_from_data(i, embedding, &state), full);
                    if full {
                        expected.push(k);
                    }
                }
                assert_eq!(collection.get_actionable_embeddings_from_data(i, &embeddings, &state), expected);
            }
        }
    }

    #[test]
    fn test_nonredundant_merge_skips_symmetric_copies() {
        let square = board(standard::square());
        let mut cache = EmbeddingCache::new();
        let rules = square_rules(&square);
        let once = BinaryRuleCollection::empty(false).with_nonredundant_rules(&rules, &mut cache).unwrap();
        assert!(once.size() > 0);
        let twice = once.with_nonredundant_rules(&rules, &mut cache).unwrap();
        assert_eq!(twice.size(), once.size());
        assert_eq!(once.with_collection(&once).unwrap().size(), 2 * once.size());
    }

    #[test]
    fn test_difference() {
        let square = board(standard::square());
        let rules = square_rules(&square);
        let all = BinaryRuleCollection::from_rules(&rules, false).unwrap();
        let first = BinaryRuleCollection::from_rules(&rules[..1], false).unwrap();
        let rest = all.without_collection(&first).unwrap();
        assert_eq!(rest.size(), rules.len() - 1);
        assert!(all.without_collection(&all).unwrap().is_empty());
    }
}
