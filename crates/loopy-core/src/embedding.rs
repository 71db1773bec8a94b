//! Embeddings: structure-preserving placements of one pattern board inside
//! another (or inside itself, giving automorphisms).
//!
//! Face boards are matched face by face. The source faces are visited in an
//! order where every face after the anchor hangs off an already-placed edge
//! (one forced placement) or an already-placed vertex (a handful of target
//! faces times two orientations). Each branch works on its own copy of the
//! partial maps, so failure is just returning without a result.
//!
//! Vertex and edge boards are base cases matched directly against the
//! rotation of a target vertex or against a target edge.

use crate::board::{BoardId, PatternBoard, PatternBoardDescriptor, RotationRun};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Inverse maps, kept only for automorphisms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InverseMaps {
    vertex: Vec<usize>,
    edge: Vec<usize>,
    sector: Vec<usize>,
    face: Vec<usize>,
}

/// A total map from the elements of a source board into a target board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Embedding {
    source: BoardId,
    target: BoardId,
    vertex_map: Vec<usize>,
    /// Image of each non-exit edge; `None` for exit edges
    edge_map: Vec<Option<usize>>,
    /// Images of each exit edge (empty for non-exit edges)
    exit_edge_map: Vec<Vec<usize>>,
    sector_map: Vec<usize>,
    face_map: Vec<usize>,
    inverse: Option<InverseMaps>,
}

impl Embedding {
    pub fn source(&self) -> BoardId {
        self.source
    }

    pub fn target(&self) -> BoardId {
        self.target
    }

    pub fn is_automorphism(&self) -> bool {
        self.source == self.target
    }

    pub fn map_vertex(&self, vertex: usize) -> usize {
        self.vertex_map[vertex]
    }

    /// Image of a non-exit edge.
    pub fn map_non_exit_edge(&self, edge: usize) -> usize {
        match self.edge_map[edge] {
            Some(target) => target,
            None => panic!("edge {} is an exit edge and has no single image", edge),
        }
    }

    /// Image of any edge as a slice: one edge for non-exit edges, the fan-out
    /// for exit edges.
    pub fn map_edge(&self, edge: usize) -> &[usize] {
        match &self.edge_map[edge] {
            Some(target) => std::slice::from_ref(target),
            None => &self.exit_edge_map[edge],
        }
    }

    pub fn is_exit_edge(&self, edge: usize) -> bool {
        self.edge_map[edge].is_none()
    }

    pub fn map_exit_edges(&self, edge: usize) -> &[usize] {
        &self.exit_edge_map[edge]
    }

    pub fn map_sector(&self, sector: usize) -> usize {
        self.sector_map[sector]
    }

    pub fn map_face(&self, face: usize) -> usize {
        self.face_map[face]
    }

    pub fn inverse_map_vertex(&self, vertex: usize) -> Option<usize> {
        self.inverse.as_ref().map(|inv| inv.vertex[vertex])
    }

    pub fn inverse_map_edge(&self, edge: usize) -> Option<usize> {
        self.inverse.as_ref().map(|inv| inv.edge[edge])
    }

    pub fn inverse_map_sector(&self, sector: usize) -> Option<usize> {
        self.inverse.as_ref().map(|inv| inv.sector[sector])
    }

    pub fn inverse_map_face(&self, face: usize) -> Option<usize> {
        self.inverse.as_ref().map(|inv| inv.face[face])
    }

    /// Whether every element maps to itself.
    pub fn is_identity(&self) -> bool {
        self.is_automorphism()
            && self.vertex_map.iter().enumerate().all(|(i, &v)| i == v)
            && self.sector_map.iter().enumerate().all(|(i, &s)| i == s)
            && self.face_map.iter().enumerate().all(|(i, &f)| i == f)
            && (0..self.edge_map.len()).all(|e| self.map_edge(e) == [e])
    }

    fn with_inverse(mut self, board: &PatternBoard) -> Self {
        if !self.is_automorphism() {
            return self;
        }
        let invert = |map: &[usize], len: usize| {
            let mut inverse = vec![usize::MAX; len];
            for (source, &target) in map.iter().enumerate() {
                inverse[target] = source;
            }
            inverse
        };
        let mut edge = vec![usize::MAX; board.edges.len()];
        for e in 0..board.edges.len() {
            if let [target] = self.map_edge(e) {
                edge[*target] = e;
            }
        }
        self.inverse = Some(InverseMaps {
            vertex: invert(&self.vertex_map, board.vertices.len()),
            edge,
            sector: invert(&self.sector_map, board.sectors.len()),
            face: invert(&self.face_map, board.faces.len()),
        });
        self
    }
}

/// Embeddings cached per ordered (source, target) board pair.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<(BoardId, BoardId), Arc<Vec<Embedding>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All embeddings of `source` into `target`, computed once per pair.
    pub fn get_embeddings(&mut self, source: &PatternBoard, target: &PatternBoard) -> Arc<Vec<Embedding>> {
        self.entries
            .entry((source.id(), target.id()))
            .or_insert_with(|| Arc::new(compute_embeddings(source, target)))
            .clone()
    }

    pub fn get_automorphisms(&mut self, board: &PatternBoard) -> Arc<Vec<Embedding>> {
        self.get_embeddings(board, board)
    }

    /// Drop every entry that mentions this board.
    pub fn forget_board(&mut self, board: BoardId) {
        self.entries.retain(|&(s, t), _| s != board && t != board);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Compute every embedding of `source` into `target` (uncached).
pub fn compute_embeddings(source: &PatternBoard, target: &PatternBoard) -> Vec<Embedding> {
    let raw = match source.descriptor() {
        PatternBoardDescriptor::Faces { .. } => FaceSearch::new(source, target).run(),
        PatternBoardDescriptor::Edge => edge_embeddings(source, target),
        PatternBoardDescriptor::NonExitVertex { edge_count } => {
            non_exit_vertex_embeddings(source, target, *edge_count)
        }
        PatternBoardDescriptor::ExitVertex { spans, .. } => exit_vertex_embeddings(source, target, spans),
    };

    let mut seen = HashSet::new();
    let embeddings: Vec<Embedding> = raw
        .into_iter()
        .filter(|e| seen.insert((e.vertex_map.clone(), e.edge_map.clone(), e.face_map.clone())))
        .map(|e| e.with_inverse(target))
        .collect();

    trace!(
        source = %source.id(),
        target = %target.id(),
        count = embeddings.len(),
        "computed embeddings"
    );
    embeddings
}

// ==================== Face boards ====================

#[derive(Debug, Clone, Copy)]
enum Attachment {
    /// Try every target face
    Anchor,
    /// Placed across an already-mapped edge
    SharedEdge(usize),
    /// Placed around an already-mapped vertex
    SharedVertex(usize),
}

/// Partial maps for one search branch.
#[derive(Debug, Clone)]
struct PartialMap {
    vertex: Vec<Option<usize>>,
    edge: Vec<Option<usize>>,
    face: Vec<Option<usize>>,
    used_vertices: Vec<bool>,
    used_edges: Vec<bool>,
    used_faces: Vec<bool>,
}

struct FaceSearch<'a> {
    source: &'a PatternBoard,
    target: &'a PatternBoard,
    order: Vec<(usize, Attachment)>,
}

impl<'a> FaceSearch<'a> {
    fn new(source: &'a PatternBoard, target: &'a PatternBoard) -> Self {
        FaceSearch { source, target, order: visitation_order(source) }
    }

    fn run(&self) -> Vec<Embedding> {
        if self.order.is_empty() {
            return Vec::new();
        }
        let start = PartialMap {
            vertex: vec![None; self.source.vertices.len()],
            edge: vec![None; self.source.edges.len()],
            face: vec![None; self.source.faces.len()],
            used_vertices: vec![false; self.target.vertices.len()],
            used_edges: vec![false; self.target.edges.len()],
            used_faces: vec![false; self.target.faces.len()],
        };
        let mut results = Vec::new();
        self.extend(0, &start, &mut results);
        results
    }

    fn extend(&self, step: usize, state: &PartialMap, results: &mut Vec<Embedding>) {
        if step == self.order.len() {
            if let Some(embedding) = self.finish(state) {
                results.push(embedding);
            }
            return;
        }

        let (face, attachment) = self.order[step];
        let size = self.source.faces[face].edges.len();
        let fits = |f: usize| {
            let tf = &self.target.faces[f];
            !tf.is_exit && tf.edges.len() == size && !state.used_faces[f]
        };

        let candidates: Vec<usize> = match attachment {
            Attachment::Anchor => (0..self.target.faces.len()).filter(|&f| fits(f)).collect(),
            Attachment::SharedEdge(edge) => match state.edge[edge] {
                Some(te) => self.target.edges[te].faces.iter().copied().filter(|&f| fits(f)).collect(),
                None => Vec::new(),
            },
            Attachment::SharedVertex(vertex) => match state.vertex[vertex] {
                Some(tv) => self.target.vertices[tv].faces.iter().copied().filter(|&f| fits(f)).collect(),
                None => Vec::new(),
            },
        };

        for target_face in candidates {
            for reversed in [false, true] {
                for offset in 0..size {
                    if let Some(next) = self.try_map_face(state, face, target_face, offset, reversed) {
                        self.extend(step + 1, &next, results);
                    }
                }
            }
        }
    }

    /// Copy the state and place `face` onto `target_face` with the given
    /// rotation and orientation, or fail on the first conflict.
    fn try_map_face(
        &self,
        state: &PartialMap,
        face: usize,
        target_face: usize,
        offset: usize,
        reversed: bool,
    ) -> Option<PartialMap> {
        let sf = &self.source.faces[face];
        let tf = &self.target.faces[target_face];
        let n = sf.vertices.len();
        let mut next = state.clone();

        for i in 0..n {
            let (tv, te) = if reversed {
                let j = (offset + n - i) % n;
                (tf.vertices[j], tf.edges[(j + n - 1) % n])
            } else {
                let j = (offset + i) % n;
                (tf.vertices[j], tf.edges[j])
            };

            let sv = sf.vertices[i];
            match next.vertex[sv] {
                Some(existing) if existing != tv => return None,
                Some(_) => {}
                None => {
                    if next.used_vertices[tv] || !self.vertex_compatible(sv, tv) {
                        return None;
                    }
                    next.vertex[sv] = Some(tv);
                    next.used_vertices[tv] = true;
                }
            }

            let se = sf.edges[i];
            match next.edge[se] {
                Some(existing) if existing != te => return None,
                Some(_) => {}
                None => {
                    if next.used_edges[te] {
                        return None;
                    }
                    next.edge[se] = Some(te);
                    next.used_edges[te] = true;
                }
            }
        }

        next.face[face] = Some(target_face);
        next.used_faces[target_face] = true;
        Some(next)
    }

    /// A known-degree vertex can only land on a known vertex of equal degree.
    fn vertex_compatible(&self, source_vertex: usize, target_vertex: usize) -> bool {
        let sv = &self.source.vertices[source_vertex];
        let tv = &self.target.vertices[target_vertex];
        sv.is_exit || (!tv.is_exit && tv.edges.len() == sv.edges.len())
    }

    fn finish(&self, state: &PartialMap) -> Option<Embedding> {
        let source = self.source;
        let target = self.target;

        let vertex_map: Vec<usize> = state.vertex.iter().copied().collect::<Option<Vec<_>>>()?;

        let mut edge_map = vec![None; source.edges.len()];
        let mut exit_edge_map = vec![Vec::new(); source.edges.len()];
        for edge in &source.edges {
            if edge.is_exit {
                let vertex = edge.exit_vertex?;
                let tv = vertex_map[vertex];
                let claimed: Vec<usize> =
                    source.vertices[vertex].edges.iter().filter_map(|&e| state.edge[e]).collect();
                let mut images: Vec<usize> = target.vertices[tv]
                    .edges
                    .iter()
                    .copied()
                    .filter(|e| !claimed.contains(e))
                    .chain(target.vertices[tv].exit_edge)
                    .collect();
                images.sort_unstable();
                exit_edge_map[edge.index] = images;
            } else {
                edge_map[edge.index] = Some(state.edge[edge.index]?);
            }
        }

        let mut sector_map = Vec::with_capacity(source.sectors.len());
        for sector in &source.sectors {
            let [a, b] = sector.edges;
            let ts = target.sector_between(vertex_map[sector.vertex], edge_map[a]?, edge_map[b]?)?;
            sector_map.push(ts);
        }

        let mut face_map = Vec::with_capacity(source.faces.len());
        for face in &source.faces {
            if let Some(tf) = state.face[face.index] {
                face_map.push(tf);
                continue;
            }
            // Exit face: whatever lies across its edge from the mapped real face
            let edge = *face.edges.first()?;
            let interior = source.edges[edge].other_face(face.index)?;
            let t_interior = state.face[interior]?;
            face_map.push(target.edges[edge_map[edge]?].other_face(t_interior)?);
        }

        Some(Embedding {
            source: source.id(),
            target: target.id(),
            vertex_map,
            edge_map,
            exit_edge_map,
            sector_map,
            face_map,
            inverse: None,
        })
    }
}

/// Order the real faces so each one after the first attaches to the faces
/// before it by the most shared structure.
fn visitation_order(board: &PatternBoard) -> Vec<(usize, Attachment)> {
    let real: Vec<usize> = board.non_exit_faces().map(|f| f.index).collect();
    let mut order = Vec::with_capacity(real.len());
    let mut visited = vec![false; board.faces.len()];
    let mut known_edges = vec![false; board.edges.len()];
    let mut known_vertices = vec![false; board.vertices.len()];

    while order.len() < real.len() {
        let mut best: Option<(usize, usize, usize)> = None;
        for &f in real.iter().filter(|&&f| !visited[f]) {
            let face = &board.faces[f];
            let shared_edges = face.edges.iter().filter(|&&e| known_edges[e]).count();
            let shared_vertices = face.vertices.iter().filter(|&&v| known_vertices[v]).count();
            let better = match best {
                None => true,
                Some((_, be, bv)) => (shared_edges, shared_vertices) > (be, bv),
            };
            if better {
                best = Some((f, shared_edges, shared_vertices));
            }
        }
        let Some((f, _, _)) = best else { break };
        let face = &board.faces[f];

        let attachment = if let Some(&e) = face.edges.iter().find(|&&e| known_edges[e]) {
            Attachment::SharedEdge(e)
        } else if let Some(&v) = face.vertices.iter().find(|&&v| known_vertices[v]) {
            Attachment::SharedVertex(v)
        } else {
            Attachment::Anchor
        };

        visited[f] = true;
        for &e in &face.edges {
            known_edges[e] = true;
        }
        for &v in &face.vertices {
            known_vertices[v] = true;
        }
        order.push((f, attachment));
    }
    order
}

// ==================== Degenerate boards ====================

fn edge_embeddings(source: &PatternBoard, target: &PatternBoard) -> Vec<Embedding> {
    let mut results = Vec::new();
    for edge in target.non_exit_edges() {
        let [f0, f1] = [edge.faces[0], edge.faces[1]];
        for faces in [[f0, f1], [f1, f0]] {
            results.push(Embedding {
                source: source.id(),
                target: target.id(),
                vertex_map: Vec::new(),
                edge_map: vec![Some(edge.index)],
                exit_edge_map: vec![Vec::new()],
                sector_map: Vec::new(),
                face_map: faces.to_vec(),
                inverse: None,
            });
        }
    }
    results
}

/// One run of target edges around a vertex, viewed in a chosen direction.
struct OrientedRun<'a> {
    target: &'a PatternBoard,
    run: &'a RotationRun,
    closed: bool,
    reversed: bool,
}

impl OrientedRun<'_> {
    fn len(&self) -> usize {
        self.run.edges.len()
    }

    fn edge(&self, position: usize) -> usize {
        let n = self.len();
        if self.reversed {
            self.run.edges[n - 1 - position]
        } else {
            self.run.edges[position]
        }
    }

    /// Sector between positions `p` and `p + 1`, wrapping for closed runs.
    fn sector_after(&self, position: usize) -> Option<usize> {
        let n = self.len();
        if !self.closed && position + 1 >= n {
            return None;
        }
        if self.reversed {
            // Reversed position p is original n-1-p; the sector between
            // original (n-2-p, n-1-p) is sectors[n-2-p], wrapping to n-1.
            let original = (n - 1 - position + n - 1) % n;
            Some(self.run.sectors[original])
        } else {
            Some(self.run.sectors[position % n])
        }
    }

    fn sector_before(&self, position: usize) -> Option<usize> {
        let n = self.len();
        if position == 0 {
            if self.closed {
                self.sector_after(n - 1)
            } else {
                None
            }
        } else {
            self.sector_after(position - 1)
        }
    }

    /// Faces on the before/after side of the edge at `position`.
    fn side_faces(&self, position: usize) -> (usize, usize) {
        let edge = &self.target.edges[self.edge(position)];
        let before = self.sector_before(position).map(|s| self.target.sectors[s].face);
        let after = self.sector_after(position).map(|s| self.target.sectors[s].face);
        match (before, after) {
            (Some(b), Some(a)) => (b, a),
            (Some(b), None) => (b, edge.other_face(b).unwrap_or(b)),
            (None, Some(a)) => (edge.other_face(a).unwrap_or(a), a),
            (None, None) => {
                let (f0, f1) = (edge.faces[0], edge.faces[1]);
                if self.reversed {
                    (f1, f0)
                } else {
                    (f0, f1)
                }
            }
        }
    }
}

fn non_exit_vertex_embeddings(
    source: &PatternBoard,
    target: &PatternBoard,
    edge_count: usize,
) -> Vec<Embedding> {
    let mut results = Vec::new();
    let source_run = &source.rotation(0).runs[0];

    for tv in target.vertices.iter().filter(|v| !v.is_exit) {
        let rotation = target.rotation(tv.index);
        if !rotation.closed || rotation.runs[0].edges.len() != edge_count {
            continue;
        }
        for reversed in [false, true] {
            let oriented = OrientedRun { target, run: &rotation.runs[0], closed: true, reversed };
            for offset in 0..edge_count {
                let mut edge_map = vec![None; source.edges.len()];
                let mut sector_map = vec![0; source.sectors.len()];
                let mut face_map = vec![0; source.faces.len()];
                for i in 0..edge_count {
                    let position = (offset + i) % edge_count;
                    edge_map[source_run.edges[i]] = Some(oriented.edge(position));
                    let Some(ts) = oriented.sector_after(position) else { continue };
                    let ss = source_run.sectors[i];
                    sector_map[ss] = ts;
                    face_map[source.sectors[ss].face] = target.sectors[ts].face;
                }
                results.push(Embedding {
                    source: source.id(),
                    target: target.id(),
                    vertex_map: vec![tv.index],
                    edge_map,
                    exit_edge_map: vec![Vec::new(); source.edges.len()],
                    sector_map,
                    face_map,
                    inverse: None,
                });
            }
        }
    }
    results
}

/// Where one source span landed.
#[derive(Debug, Clone, Copy)]
struct SpanPlacement {
    run: usize,
    reversed: bool,
    start: usize,
}

fn exit_vertex_embeddings(source: &PatternBoard, target: &PatternBoard, spans: &[usize]) -> Vec<Embedding> {
    let mut results = Vec::new();
    // Spokes are numbered span by span; faces are outer, inner.., outer per span
    let spoke_start: Vec<usize> = spans
        .iter()
        .scan(0, |acc, &s| {
            let start = *acc;
            *acc += s;
            Some(start)
        })
        .collect();

    for tv in &target.vertices {
        let rotation = target.rotation(tv.index);
        let mut placements = Vec::new();
        let mut used = vec![false; target.edges.len()];
        place_spans(target, tv.index, spans, 0, &mut Vec::new(), &mut used, &mut placements);

        for placement in placements {
            let mut edge_map = vec![None; source.edges.len()];
            let mut sector_map = vec![0; source.sectors.len()];
            let mut face_map = vec![0; source.faces.len()];
            let mut face_cursor = 0;
            let mut sector_cursor = 0;
            let mut claimed = Vec::new();

            for (span_index, &span) in spans.iter().enumerate() {
                let p = placement[span_index];
                let oriented = OrientedRun {
                    target,
                    run: &rotation.runs[p.run],
                    closed: rotation.closed,
                    reversed: p.reversed,
                };
                let n = oriented.len();
                let position = |i: usize| (p.start + i) % n;

                for i in 0..span {
                    let te = oriented.edge(position(i));
                    edge_map[spoke_start[span_index] + i] = Some(te);
                    claimed.push(te);
                }
                face_map[face_cursor] = oriented.side_faces(position(0)).0;
                face_cursor += 1;
                for i in 0..span - 1 {
                    // Placement guarantees these sectors exist
                    let Some(ts) = oriented.sector_after(position(i)) else { continue };
                    sector_map[sector_cursor] = ts;
                    face_map[face_cursor] = target.sectors[ts].face;
                    sector_cursor += 1;
                    face_cursor += 1;
                }
                face_map[face_cursor] = oriented.side_faces(position(span - 1)).1;
                face_cursor += 1;
            }

            let exit_edge = source.vertices[0].exit_edge;
            let mut exit_edge_map = vec![Vec::new(); source.edges.len()];
            if let Some(exit_edge) = exit_edge {
                let mut images: Vec<usize> = tv
                    .edges
                    .iter()
                    .copied()
                    .filter(|e| !claimed.contains(e))
                    .chain(tv.exit_edge)
                    .collect();
                images.sort_unstable();
                exit_edge_map[exit_edge] = images;
            }

            results.push(Embedding {
                source: source.id(),
                target: target.id(),
                vertex_map: vec![tv.index],
                edge_map,
                exit_edge_map,
                sector_map,
                face_map,
                inverse: None,
            });
        }
    }
    results
}

/// Enumerate disjoint placements of each span as consecutive sector-linked
/// target edges around `vertex`.
fn place_spans(
    target: &PatternBoard,
    vertex: usize,
    spans: &[usize],
    index: usize,
    current: &mut Vec<SpanPlacement>,
    used: &mut Vec<bool>,
    out: &mut Vec<Vec<SpanPlacement>>,
) {
    if index == spans.len() {
        out.push(current.clone());
        return;
    }
    let rotation = target.rotation(vertex);
    let span = spans[index];

    for (run_index, run) in rotation.runs.iter().enumerate() {
        let n = run.edges.len();
        if span > n {
            continue;
        }
        let starts = if rotation.closed { n } else { n - span + 1 };
        // A single edge reads the same both ways only for the edge itself,
        // its outer faces still swap, so both orientations are kept.
        for reversed in [false, true] {
            let oriented = OrientedRun { target, run, closed: rotation.closed, reversed };
            for start in 0..starts {
                let edges: Vec<usize> = (0..span).map(|i| oriented.edge((start + i) % n)).collect();
                if edges.iter().any(|&e| used[e]) {
                    continue;
                }
                for &e in &edges {
                    used[e] = true;
                }
                current.push(SpanPlacement { run: run_index, reversed, start });
                place_spans(target, vertex, spans, index + 1, current, used, out);
                current.pop();
                for &e in &edges {
                    used[e] = false;
                }
            }
        }
    }
}
