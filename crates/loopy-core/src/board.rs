//! PatternBoard: the abstract local graph a rule is written against.
//!
//! Vertices, edges, sectors and faces live in owning vectors and refer to
//! each other by index. Exit elements stand for "whatever lies beyond this
//! patch": every exit vertex owns one synthetic exit edge bundling all of its
//! unknown outer edges, and every edge with fewer than two real faces gets an
//! exit face on its open side.
//!
//! Boards are immutable after construction and carry a process-unique
//! [`BoardId`], which is what the embedding cache and rule collections key on.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static NEXT_BOARD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one constructed board. Two structurally equal boards built
/// separately have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoardId(u64);

impl BoardId {
    fn fresh() -> Self {
        BoardId(NEXT_BOARD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "board#{}", self.0)
    }
}

/// How a pattern board is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PatternBoardDescriptor {
    /// Faces given as vertex loops. Vertices `0..num_non_exit_vertices` are
    /// non-exit, the next `num_exit_vertices` are exit vertices.
    Faces {
        num_non_exit_vertices: usize,
        num_exit_vertices: usize,
        vertex_lists: Vec<Vec<usize>>,
    },
    /// A single edge with an exit face on either side.
    Edge,
    /// One vertex whose spokes are all known.
    NonExitVertex { edge_count: usize },
    /// One vertex with known spokes grouped into contiguous spans; unknown
    /// edges may sit between spans.
    ExitVertex { edge_count: usize, spans: Vec<usize> },
}

impl PatternBoardDescriptor {
    pub fn num_non_exit_vertices(&self) -> usize {
        match self {
            PatternBoardDescriptor::Faces { num_non_exit_vertices, .. } => *num_non_exit_vertices,
            PatternBoardDescriptor::Edge => 0,
            PatternBoardDescriptor::NonExitVertex { .. } => 1,
            PatternBoardDescriptor::ExitVertex { .. } => 0,
        }
    }

    pub fn num_exit_vertices(&self) -> usize {
        match self {
            PatternBoardDescriptor::Faces { num_exit_vertices, .. } => *num_exit_vertices,
            PatternBoardDescriptor::Edge => 0,
            PatternBoardDescriptor::NonExitVertex { .. } => 0,
            PatternBoardDescriptor::ExitVertex { .. } => 1,
        }
    }

    /// Compact string form, e.g. `faces:0:4:0,1,2,3` or `exit-vertex:3:1,2`.
    pub fn to_compact_string(&self) -> String {
        match self {
            PatternBoardDescriptor::Faces {
                num_non_exit_vertices,
                num_exit_vertices,
                vertex_lists,
            } => {
                let loops: Vec<String> = vertex_lists
                    .iter()
                    .map(|l| l.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
                    .collect();
                format!("faces:{}:{}:{}", num_non_exit_vertices, num_exit_vertices, loops.join("/"))
            }
            PatternBoardDescriptor::Edge => "edge".to_string(),
            PatternBoardDescriptor::NonExitVertex { edge_count } => format!("vertex:{}", edge_count),
            PatternBoardDescriptor::ExitVertex { edge_count, spans } => {
                let spans: Vec<String> = spans.iter().map(|s| s.to_string()).collect();
                format!("exit-vertex:{}:{}", edge_count, spans.join(","))
            }
        }
    }

    /// Parse the compact string form produced by [`Self::to_compact_string`].
    pub fn from_compact_string(s: &str) -> Result<Self> {
        let bad = || Error::InvalidDescriptor(s.to_string());
        let parse_list = |part: &str| -> Result<Vec<usize>> {
            if part.is_empty() {
                return Ok(Vec::new());
            }
            part.split(',')
                .map(|n| n.trim().parse::<usize>().map_err(|_| bad()))
                .collect()
        };

        let mut parts = s.trim().splitn(4, ':');
        match parts.next() {
            Some("edge") => Ok(PatternBoardDescriptor::Edge),
            Some("vertex") => {
                let edge_count = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
                Ok(PatternBoardDescriptor::NonExitVertex { edge_count })
            }
            Some("exit-vertex") => {
                let edge_count = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
                let spans = parse_list(parts.next().ok_or_else(bad)?)?;
                Ok(PatternBoardDescriptor::ExitVertex { edge_count, spans })
            }
            Some("faces") => {
                let num_non_exit_vertices =
                    parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
                let num_exit_vertices = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
                let loops = parts.next().ok_or_else(bad)?;
                let vertex_lists = if loops.is_empty() {
                    Vec::new()
                } else {
                    loops.split('/').map(parse_list).collect::<Result<Vec<_>>>()?
                };
                Ok(PatternBoardDescriptor::Faces {
                    num_non_exit_vertices,
                    num_exit_vertices,
                    vertex_lists,
                })
            }
            _ => Err(bad()),
        }
    }

    /// Which construction shape this descriptor has.
    pub fn kind(&self) -> BoardKind {
        match self {
            PatternBoardDescriptor::Faces { .. } => BoardKind::Faces,
            PatternBoardDescriptor::Edge => BoardKind::Edge,
            PatternBoardDescriptor::NonExitVertex { .. } => BoardKind::NonExitVertex,
            PatternBoardDescriptor::ExitVertex { .. } => BoardKind::ExitVertex,
        }
    }
}

impl fmt::Display for PatternBoardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_compact_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardKind {
    Faces,
    Edge,
    NonExitVertex,
    ExitVertex,
}

#[derive(Debug, Clone)]
pub struct PatternVertex {
    pub index: usize,
    pub is_exit: bool,
    /// Non-exit edges touching this vertex
    pub edges: Vec<usize>,
    /// The synthetic exit edge of an exit vertex
    pub exit_edge: Option<usize>,
    pub sectors: Vec<usize>,
    pub faces: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PatternEdge {
    pub index: usize,
    pub is_exit: bool,
    /// Both endpoints for interior edges, only the center for spokes of
    /// vertex boards and for exit edges, none for the lone edge board.
    pub vertices: Vec<usize>,
    /// For exit edges, the exit vertex they hang off
    pub exit_vertex: Option<usize>,
    pub sectors: Vec<usize>,
    /// Exactly two faces for non-exit edges, none for exit edges
    pub faces: Vec<usize>,
}

impl PatternEdge {
    /// The face across this edge from `face`.
    pub fn other_face(&self, face: usize) -> Option<usize> {
        match self.faces.as_slice() {
            [a, b] if *a == face => Some(*b),
            [a, b] if *b == face => Some(*a),
            _ => None,
        }
    }
}

/// The corner between two consecutive edges around a vertex.
#[derive(Debug, Clone)]
pub struct PatternSector {
    pub index: usize,
    pub vertex: usize,
    pub edges: [usize; 2],
    pub face: usize,
}

#[derive(Debug, Clone)]
pub struct PatternFace {
    pub index: usize,
    pub is_exit: bool,
    /// For real faces, the loop order; `edges[i]` joins `vertices[i]` and
    /// `vertices[i + 1]`.
    pub vertices: Vec<usize>,
    pub edges: Vec<usize>,
    pub sectors: Vec<usize>,
}

/// A maximal run of edges around a vertex where each consecutive pair is
/// joined by a sector. `sectors[i]` sits between `edges[i]` and `edges[i + 1]`
/// (wrapping for closed rotations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRun {
    pub edges: Vec<usize>,
    pub sectors: Vec<usize>,
}

/// Cyclic structure of the non-exit edges around a vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexRotation {
    pub runs: Vec<RotationRun>,
    /// A single run that wraps all the way around
    pub closed: bool,
}

/// Shortest face-to-face paths across the face adjacency graph.
#[derive(Debug, Clone)]
pub struct FaceConnectivity {
    /// Connected face pairs `(a, b)` with `a < b`
    pub pairs: Vec<(usize, usize)>,
    /// Edges crossed walking from `a` to `b`, per pair
    pub paths: Vec<Vec<usize>>,
    pair_index: HashMap<(usize, usize), usize>,
}

impl FaceConnectivity {
    fn compute(board: &PatternBoard) -> Self {
        let num_faces = board.faces.len();
        // adjacency[f] = [(neighbor face, crossed edge)]
        let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_faces];
        for edge in &board.edges {
            if let [a, b] = edge.faces.as_slice() {
                adjacency[*a].push((*b, edge.index));
                adjacency[*b].push((*a, edge.index));
            }
        }

        let mut pairs = Vec::new();
        let mut paths = Vec::new();
        let mut pair_index = HashMap::new();

        for start in 0..num_faces {
            // BFS recording the edge used to reach each face
            let mut previous: Vec<Option<(usize, usize)>> = vec![None; num_faces];
            let mut seen = vec![false; num_faces];
            seen[start] = true;
            let mut queue = VecDeque::from([start]);
            while let Some(face) = queue.pop_front() {
                for &(next, edge) in &adjacency[face] {
                    if !seen[next] {
                        seen[next] = true;
                        previous[next] = Some((face, edge));
                        queue.push_back(next);
                    }
                }
            }

            for end in (start + 1)..num_faces {
                if !seen[end] {
                    continue;
                }
                let mut path = Vec::new();
                let mut cursor = end;
                while let Some((prev, edge)) = previous[cursor] {
                    path.push(edge);
                    cursor = prev;
                }
                path.reverse();
                pair_index.insert((start, end), pairs.len());
                pairs.push((start, end));
                paths.push(path);
            }
        }

        FaceConnectivity { pairs, paths, pair_index }
    }

    /// Index of the (unordered) face pair, if the two faces are connected.
    pub fn pair_index(&self, a: usize, b: usize) -> Option<usize> {
        let key = if a < b { (a, b) } else { (b, a) };
        self.pair_index.get(&key).copied()
    }

    /// Edges crossed between two connected faces.
    pub fn path(&self, a: usize, b: usize) -> Option<&[usize]> {
        self.pair_index(a, b).map(|i| self.paths[i].as_slice())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// An immutable local graph patch.
#[derive(Debug)]
pub struct PatternBoard {
    id: BoardId,
    descriptor: PatternBoardDescriptor,
    pub vertices: Vec<PatternVertex>,
    pub edges: Vec<PatternEdge>,
    pub sectors: Vec<PatternSector>,
    pub faces: Vec<PatternFace>,
    rotations: Vec<VertexRotation>,
    sector_lookup: HashMap<(usize, usize, usize), usize>,
    face_connectivity: OnceLock<FaceConnectivity>,
}

/// Incremental builder shared by the descriptor variants.
struct BoardBuilder {
    vertices: Vec<PatternVertex>,
    edges: Vec<PatternEdge>,
    sectors: Vec<PatternSector>,
    faces: Vec<PatternFace>,
}

impl BoardBuilder {
    fn new(num_non_exit: usize, num_exit: usize) -> Self {
        let vertices = (0..num_non_exit + num_exit)
            .map(|index| PatternVertex {
                index,
                is_exit: index >= num_non_exit,
                edges: Vec::new(),
                exit_edge: None,
                sectors: Vec::new(),
                faces: Vec::new(),
            })
            .collect();
        BoardBuilder { vertices, edges: Vec::new(), sectors: Vec::new(), faces: Vec::new() }
    }

    fn add_edge(&mut self, vertices: Vec<usize>) -> usize {
        let index = self.edges.len();
        for &v in &vertices {
            self.vertices[v].edges.push(index);
        }
        self.edges.push(PatternEdge {
            index,
            is_exit: false,
            vertices,
            exit_vertex: None,
            sectors: Vec::new(),
            faces: Vec::new(),
        });
        index
    }

    fn add_exit_edge(&mut self, vertex: usize) -> usize {
        let index = self.edges.len();
        self.vertices[vertex].exit_edge = Some(index);
        self.edges.push(PatternEdge {
            index,
            is_exit: true,
            vertices: vec![vertex],
            exit_vertex: Some(vertex),
            sectors: Vec::new(),
            faces: Vec::new(),
        });
        index
    }

    fn add_face(&mut self, is_exit: bool, vertices: Vec<usize>, edges: Vec<usize>) -> usize {
        let index = self.faces.len();
        for &v in &vertices {
            if !self.vertices[v].faces.contains(&index) {
                self.vertices[v].faces.push(index);
            }
        }
        for &e in &edges {
            self.edges[e].faces.push(index);
        }
        self.faces.push(PatternFace { index, is_exit, vertices, edges, sectors: Vec::new() });
        index
    }

    fn add_sector(&mut self, vertex: usize, edges: [usize; 2], face: usize) -> usize {
        let index = self.sectors.len();
        self.vertices[vertex].sectors.push(index);
        self.edges[edges[0]].sectors.push(index);
        self.edges[edges[1]].sectors.push(index);
        self.faces[face].sectors.push(index);
        self.sectors.push(PatternSector { index, vertex, edges, face });
        index
    }
}

impl PatternBoard {
    /// Build a board from its descriptor, validating the board invariants.
    pub fn new(descriptor: PatternBoardDescriptor) -> Result<Self> {
        let builder = match &descriptor {
            PatternBoardDescriptor::Faces {
                num_non_exit_vertices,
                num_exit_vertices,
                vertex_lists,
            } => Self::build_faces(*num_non_exit_vertices, *num_exit_vertices, vertex_lists)?,
            PatternBoardDescriptor::Edge => {
                let mut b = BoardBuilder::new(0, 0);
                let edge = b.add_edge(Vec::new());
                b.add_face(true, Vec::new(), vec![edge]);
                b.add_face(true, Vec::new(), vec![edge]);
                b
            }
            PatternBoardDescriptor::NonExitVertex { edge_count } => {
                if *edge_count < 2 {
                    return Err(Error::InvalidDescriptor(format!(
                        "non-exit vertex needs at least 2 edges, got {}",
                        edge_count
                    )));
                }
                Self::build_vertex(*edge_count, &[*edge_count], true)
            }
            PatternBoardDescriptor::ExitVertex { edge_count, spans } => {
                if spans.is_empty() || spans.contains(&0) || spans.iter().sum::<usize>() != *edge_count
                {
                    return Err(Error::InvalidDescriptor(format!(
                        "exit vertex spans {:?} do not partition {} edges",
                        spans, edge_count
                    )));
                }
                Self::build_vertex(*edge_count, spans, false)
            }
        };

        let BoardBuilder { vertices, edges, sectors, faces } = builder;
        let mut board = PatternBoard {
            id: BoardId::fresh(),
            descriptor,
            vertices,
            edges,
            sectors,
            faces,
            rotations: Vec::new(),
            sector_lookup: HashMap::new(),
            face_connectivity: OnceLock::new(),
        };
        for sector in &board.sectors {
            let [a, b] = sector.edges;
            board
                .sector_lookup
                .entry((sector.vertex, a.min(b), a.max(b)))
                .or_insert(sector.index);
        }
        board.rotations = (0..board.vertices.len()).map(|v| board.compute_rotation(v)).collect();
        debug_assert!(board.check_invariants());
        Ok(board)
    }

    /// Shorthand for building from a compact descriptor string.
    pub fn from_descriptor_string(s: &str) -> Result<Self> {
        Self::new(PatternBoardDescriptor::from_compact_string(s)?)
    }

    fn build_faces(
        num_non_exit: usize,
        num_exit: usize,
        vertex_lists: &[Vec<usize>],
    ) -> Result<BoardBuilder> {
        let num_vertices = num_non_exit + num_exit;
        let mut b = BoardBuilder::new(num_non_exit, num_exit);
        let mut edge_lookup: HashMap<(usize, usize), usize> = HashMap::new();

        for (face_number, list) in vertex_lists.iter().enumerate() {
            if list.len() < 3 {
                return Err(Error::InvalidDescriptor(format!(
                    "face {} has only {} vertices",
                    face_number,
                    list.len()
                )));
            }
            if let Some(&v) = list.iter().find(|&&v| v >= num_vertices) {
                return Err(Error::InvalidDescriptor(format!(
                    "face {} references vertex {} of {}",
                    face_number, v, num_vertices
                )));
            }
            let mut sorted = list.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != list.len() {
                return Err(Error::InvalidDescriptor(format!(
                    "face {} repeats a vertex",
                    face_number
                )));
            }

            let n = list.len();
            let mut face_edges = Vec::with_capacity(n);
            for i in 0..n {
                let (a, c) = (list[i], list[(i + 1) % n]);
                let key = (a.min(c), a.max(c));
                let edge = match edge_lookup.get(&key) {
                    Some(&e) => e,
                    None => {
                        let e = b.add_edge(vec![a, c]);
                        edge_lookup.insert(key, e);
                        e
                    }
                };
                if b.edges[edge].faces.len() >= 2 {
                    return Err(Error::InvalidDescriptor(format!(
                        "edge {}-{} borders more than two faces",
                        a, c
                    )));
                }
                face_edges.push(edge);
            }

            let face = b.add_face(false, list.clone(), face_edges.clone());
            for i in 0..n {
                let before = face_edges[(i + n - 1) % n];
                let after = face_edges[i];
                b.add_sector(list[i], [before, after], face);
            }
        }

        // Exit faces on every open side
        for edge in 0..b.edges.len() {
            while b.edges[edge].faces.len() < 2 {
                let vertices = b.edges[edge].vertices.clone();
                b.add_face(true, vertices, vec![edge]);
            }
        }

        for v in 0..num_vertices {
            if b.vertices[v].edges.is_empty() {
                return Err(Error::InvalidDescriptor(format!("vertex {} touches no face", v)));
            }
            if b.vertices[v].is_exit {
                b.add_exit_edge(v);
            }
        }

        Ok(b)
    }

    fn build_vertex(edge_count: usize, spans: &[usize], closed: bool) -> BoardBuilder {
        let mut b = BoardBuilder::new(usize::from(closed), usize::from(!closed));
        let spokes: Vec<usize> = (0..edge_count).map(|_| b.add_edge(vec![0])).collect();

        if closed {
            for i in 0..edge_count {
                let (e0, e1) = (spokes[i], spokes[(i + 1) % edge_count]);
                let face = b.add_face(true, vec![0], vec![e0, e1]);
                b.add_sector(0, [e0, e1], face);
            }
        } else {
            let mut start = 0;
            for &span in spans {
                let run = &spokes[start..start + span];
                b.add_face(true, vec![0], vec![run[0]]);
                for pair in run.windows(2) {
                    let face = b.add_face(true, vec![0], vec![pair[0], pair[1]]);
                    b.add_sector(0, [pair[0], pair[1]], face);
                }
                b.add_face(true, vec![0], vec![run[span - 1]]);
                start += span;
            }
            b.add_exit_edge(0);
        }
        b
    }

    fn compute_rotation(&self, vertex: usize) -> VertexRotation {
        let v = &self.vertices[vertex];
        let mut used = vec![false; self.sectors.len()];
        let mut runs = Vec::new();

        let links = |edge: usize| -> Vec<usize> {
            self.edges[edge]
                .sectors
                .iter()
                .copied()
                .filter(|&s| self.sectors[s].vertex == vertex)
                .collect()
        };

        // Open runs start at an edge with fewer than two sectors here
        let mut starts: Vec<usize> = v.edges.iter().copied().filter(|&e| links(e).len() < 2).collect();
        starts.extend(v.edges.iter().copied());

        let mut visited_edges = vec![false; self.edges.len()];
        let mut closed = false;
        for start in starts {
            if visited_edges[start] {
                continue;
            }
            let mut run = RotationRun { edges: vec![start], sectors: Vec::new() };
            visited_edges[start] = true;
            let mut current = start;
            loop {
                let next_sector = links(current).into_iter().find(|&s| !used[s]);
                let Some(sector) = next_sector else { break };
                used[sector] = true;
                let [a, b] = self.sectors[sector].edges;
                let next = if a == current { b } else { a };
                run.sectors.push(sector);
                if next == start {
                    closed = true;
                    break;
                }
                visited_edges[next] = true;
                run.edges.push(next);
                current = next;
            }
            runs.push(run);
        }

        let closed = closed && runs.len() == 1;
        VertexRotation { runs, closed }
    }

    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    fn check_invariants(&self) -> bool {
        self.edges.iter().all(|e| if e.is_exit { e.faces.is_empty() } else { e.faces.len() == 2 })
            && self
                .vertices
                .iter()
                .all(|v| v.is_exit == v.exit_edge.is_some())
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn descriptor(&self) -> &PatternBoardDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> BoardKind {
        self.descriptor.kind()
    }

    pub fn to_descriptor_string(&self) -> String {
        self.descriptor.to_compact_string()
    }

    pub fn rotation(&self, vertex: usize) -> &VertexRotation {
        &self.rotations[vertex]
    }

    /// The sector at `vertex` between edges `a` and `b`, if one exists.
    pub fn sector_between(&self, vertex: usize, a: usize, b: usize) -> Option<usize> {
        self.sector_lookup.get(&(vertex, a.min(b), a.max(b))).copied()
    }

    pub fn non_exit_faces(&self) -> impl Iterator<Item = &PatternFace> {
        self.faces.iter().filter(|f| !f.is_exit)
    }

    pub fn non_exit_edges(&self) -> impl Iterator<Item = &PatternEdge> {
        self.edges.iter().filter(|e| !e.is_exit)
    }

    /// Face-pair paths, computed on first use.
    pub fn face_connectivity(&self) -> &FaceConnectivity {
        self.face_connectivity.get_or_init(|| FaceConnectivity::compute(self))
    }

    /// Whether two edges share a vertex.
    pub fn edges_adjacent(&self, a: usize, b: usize) -> bool {
        self.edges[a].vertices.iter().any(|v| self.edges[b].vertices.contains(v))
    }
}

impl fmt::Display for PatternBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} vertices, {} edges, {} sectors, {} faces)",
            self.descriptor,
            self.vertices.len(),
            self.edges.len(),
            self.sectors.len(),
            self.faces.len()
        )
    }
}

/// Descriptors for a few boards that come up constantly in tests and demos.
pub mod standard {
    use super::PatternBoardDescriptor;

    /// One square face whose four corners are exit vertices.
    pub fn square() -> PatternBoardDescriptor {
        PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 0,
            num_exit_vertices: 4,
            vertex_lists: vec![vec![0, 1, 2, 3]],
        }
    }

    /// Two squares sharing an edge.
    pub fn domino() -> PatternBoardDescriptor {
        PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 0,
            num_exit_vertices: 6,
            vertex_lists: vec![vec![0, 1, 4, 3], vec![1, 2, 5, 4]],
        }
    }

    /// Four squares around one fully known interior vertex (vertex 0).
    pub fn square_2x2() -> PatternBoardDescriptor {
        // 1 2 3
        // 4 0 5
        // 6 7 8
        PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 1,
            num_exit_vertices: 8,
            vertex_lists: vec![
                vec![1, 2, 0, 4],
                vec![2, 3, 5, 0],
                vec![4, 0, 7, 6],
                vec![0, 5, 8, 7],
            ],
        }
    }

    /// A square sitting in the corner of the puzzle: vertex 0 is the board
    /// corner (degree two), the two outer sides are puzzle boundary.
    pub fn corner_square() -> PatternBoardDescriptor {
        PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 1,
            num_exit_vertices: 3,
            vertex_lists: vec![vec![0, 1, 2, 3]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_board_shape() {
        let board = PatternBoard::new(standard::square()).unwrap();
        assert_eq!(board.vertices.len(), 4);
        // 4 face edges + 4 exit edges
        assert_eq!(board.edges.len(), 8);
        assert_eq!(board.edges.iter().filter(|e| e.is_exit).count(), 4);
        assert_eq!(board.sectors.len(), 4);
        // 1 real face + 4 exit faces
        assert_eq!(board.faces.len(), 5);
        assert_eq!(board.non_exit_faces().count(), 1);
        for edge in board.non_exit_edges() {
            assert_eq!(edge.faces.len(), 2);
        }
    }

    #[test]
    fn test_shared_edges_are_reused() {
        let board = PatternBoard::new(standard::domino()).unwrap();
        assert_eq!(board.non_exit_edges().count(), 7);
        assert_eq!(board.non_exit_faces().count(), 2);
        let shared = board
            .non_exit_edges()
            .find(|e| e.faces.iter().all(|&f| !board.faces[f].is_exit))
            .unwrap();
        assert_eq!(shared.vertices.len(), 2);
    }

    #[test]
    fn test_interior_vertex_rotation_is_closed() {
        let board = PatternBoard::new(standard::square_2x2()).unwrap();
        let rotation = board.rotation(0);
        assert!(rotation.closed);
        assert_eq!(rotation.runs.len(), 1);
        assert_eq!(rotation.runs[0].edges.len(), 4);
        assert_eq!(rotation.runs[0].sectors.len(), 4);
        assert!(!board.vertices[0].is_exit);
        assert!(board.vertices[0].exit_edge.is_none());
    }

    #[test]
    fn test_exit_vertex_rotation_is_open() {
        let board = PatternBoard::new(standard::square()).unwrap();
        let rotation = board.rotation(0);
        assert!(!rotation.closed);
        assert_eq!(rotation.runs.len(), 1);
        assert_eq!(rotation.runs[0].edges.len(), 2);
        assert_eq!(rotation.runs[0].sectors.len(), 1);
    }

    #[test]
    fn test_vertex_boards() {
        let board = PatternBoard::new(PatternBoardDescriptor::NonExitVertex { edge_count: 4 }).unwrap();
        assert_eq!(board.edges.len(), 4);
        assert_eq!(board.sectors.len(), 4);
        assert_eq!(board.faces.len(), 4);
        assert!(board.rotation(0).closed);

        let board = PatternBoard::new(PatternBoardDescriptor::ExitVertex {
            edge_count: 3,
            spans: vec![1, 2],
        })
        .unwrap();
        // 3 spokes + exit edge
        assert_eq!(board.edges.len(), 4);
        assert_eq!(board.sectors.len(), 1);
        // span of 1: two outer faces, span of 2: two outer + one inner
        assert_eq!(board.faces.len(), 5);
        assert_eq!(board.rotation(0).runs.len(), 2);
    }

    #[test]
    fn test_edge_board() {
        let board = PatternBoard::new(PatternBoardDescriptor::Edge).unwrap();
        assert_eq!(board.edges.len(), 1);
        assert_eq!(board.faces.len(), 2);
        assert!(board.vertices.is_empty());
        assert_eq!(board.face_connectivity().len(), 1);
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(PatternBoard::new(PatternBoardDescriptor::Faces {
            num_non_exit_vertices: 0,
            num_exit_vertices: 3,
            vertex_lists: vec![vec![0, 1, 5]],
        })
        .is_err());
        assert!(PatternBoard::new(PatternBoardDescriptor::ExitVertex {
            edge_count: 3,
            spans: vec![1, 1],
        })
        .is_err());
        assert!(PatternBoard::new(PatternBoardDescriptor::NonExitVertex { edge_count: 1 }).is_err());
    }

    #[test]
    fn test_descriptor_string_round_trip() {
        for descriptor in [
            standard::square(),
            standard::square_2x2(),
            PatternBoardDescriptor::Edge,
            PatternBoardDescriptor::NonExitVertex { edge_count: 3 },
            PatternBoardDescriptor::ExitVertex { edge_count: 4, spans: vec![2, 2] },
        ] {
            let s = descriptor.to_compact_string();
            assert_eq!(PatternBoardDescriptor::from_compact_string(&s).unwrap(), descriptor);
        }
        assert!(PatternBoardDescriptor::from_compact_string("hexagon:3").is_err());
    }

    #[test]
    fn test_descriptor_json_tags() {
        let json = serde_json::to_string(&PatternBoardDescriptor::ExitVertex {
            edge_count: 2,
            spans: vec![2],
        })
        .unwrap();
        assert!(json.contains("\"type\":\"exit-vertex\""));
        assert!(json.contains("\"edgeCount\":2"));
    }

    #[test]
    fn test_face_connectivity_paths() {
        let board = PatternBoard::new(standard::domino()).unwrap();
        let connectivity = board.face_connectivity();
        let faces = board.faces.len();
        // Every pair of faces is connected on a face board
        assert_eq!(connectivity.len(), faces * (faces - 1) / 2);
        // The two real faces are one shared edge apart
        assert_eq!(connectivity.path(0, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_boards_get_distinct_ids() {
        let a = PatternBoard::new(standard::square()).unwrap();
        let b = PatternBoard::new(standard::square()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
