//! PatternBoardSolver: compiles a board plus a feature set into clauses and
//! enumerates the loop configurations that satisfy them.
//!
//! One variable per edge ("this edge is on the loop"). An exit edge stands
//! for the parity of the unknown edges behind its exit vertex, so the
//! even-degree rule treats it as just another edge of that vertex.

use crate::board::PatternBoard;
use crate::feature::SectorMask;
use crate::feature_set::FeatureSet;
use crate::sat::{add_at_most, add_exactly, add_xor, DpllSolver, Lit, SatEngine};
use std::sync::Arc;
use tracing::{trace, warn};

/// Enumerates solutions of one (board, features) pair. Each returned
/// solution is blocked before the next one is searched, so the solver is a
/// single pass: once it returns `None` it stays exhausted.
pub struct PatternBoardSolver<E: SatEngine = DpllSolver> {
    board: Arc<PatternBoard>,
    engine: E,
    /// Edge index -> variable
    edge_vars: Vec<usize>,
    exhausted: bool,
}

impl PatternBoardSolver<DpllSolver> {
    pub fn new(features: &FeatureSet) -> Self {
        Self::with_engine(features, DpllSolver::new())
    }
}

impl<E: SatEngine> PatternBoardSolver<E> {
    pub fn with_engine(features: &FeatureSet, engine: E) -> Self {
        let board = Arc::clone(features.board());
        let mut engine = engine;
        let edge_vars: Vec<usize> = (0..board.edges.len()).map(|_| engine.new_var()).collect();
        let mut solver = PatternBoardSolver { board, engine, edge_vars, exhausted: false };
        solver.add_structure();
        solver.add_features(features);
        solver
    }

    fn lit(&self, edge: usize, black: bool) -> Lit {
        Lit::new(self.edge_vars[edge], black)
    }

    /// Every vertex has loop degree 0 or 2.
    fn add_structure(&mut self) {
        for vertex in &self.board.vertices {
            let lits: Vec<Lit> = vertex
                .edges
                .iter()
                .chain(vertex.exit_edge.iter())
                .map(|&e| self.lit(e, true))
                .collect();
            add_at_most(&mut self.engine, &lits, 2);
            // No vertex of degree exactly one
            for (i, &lit) in lits.iter().enumerate() {
                let mut clause = vec![!lit];
                clause.extend(lits.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, &l)| l));
                self.engine.add_clause(&clause);
            }
        }
    }

    fn add_features(&mut self, features: &FeatureSet) {
        for edge in features.black_edges() {
            let lit = self.lit(edge, true);
            self.engine.add_clause(&[lit]);
        }
        for edge in features.red_edges() {
            let lit = self.lit(edge, false);
            self.engine.add_clause(&[lit]);
        }

        for sector in 0..self.board.sectors.len() {
            let mask = features.sector_knowledge(sector);
            if mask == features.edge_sector_mask(sector) {
                continue;
            }
            let [a, b] = self.board.sectors[sector].edges;
            self.add_sector_mask(a, b, mask);
        }

        for (face, value) in features.face_values() {
            if self.board.faces[face].is_exit {
                warn!(face, value, "face value on an exit face cannot be encoded, skipping");
                continue;
            }
            let lits: Vec<Lit> = self.board.faces[face].edges.iter().map(|&e| self.lit(e, true)).collect();
            add_exactly(&mut self.engine, &lits, value);
        }

        let connectivity = self.board.face_connectivity();
        for dual in features.color_duals() {
            for (main, other, opposite) in dual.pairs() {
                let Some(path) = connectivity.path(main, other) else {
                    warn!(main, other, "color dual relates disconnected faces, skipping");
                    continue;
                };
                let lits: Vec<Lit> = path.iter().map(|&e| Lit::positive(self.edge_vars[e])).collect();
                add_xor(&mut self.engine, &lits, opposite);
            }
        }
    }

    fn add_sector_mask(&mut self, a: usize, b: usize, mask: SectorMask) {
        let (a_on, a_off) = (self.lit(a, true), self.lit(a, false));
        let (b_on, b_off) = (self.lit(b, true), self.lit(b, false));
        if !mask.allows(0) {
            self.engine.add_clause(&[a_on, b_on]);
        }
        if !mask.allows(1) {
            self.engine.add_clause(&[a_on, b_off]);
            self.engine.add_clause(&[a_off, b_on]);
        }
        if !mask.allows(2) {
            self.engine.add_clause(&[a_off, b_off]);
        }
    }

    /// The next unseen solution as a per-edge "on the loop" vector.
    pub fn next_solution(&mut self) -> Option<Vec<bool>> {
        while !self.exhausted {
            if !self.engine.solve() {
                self.exhausted = true;
                break;
            }
            let edges: Vec<bool> = self.edge_vars.iter().map(|&v| self.engine.model_value(v)).collect();

            if let Some(cycle) = self.closed_cycle(&edges) {
                if edges.iter().filter(|&&b| b).count() > cycle.len() {
                    // A finished loop leaves no room for any other loop edge
                    trace!(cycle = ?cycle, "rejecting solution with a closed loop and extra edges");
                    for other in 0..edges.len() {
                        if !cycle.contains(&other) {
                            let mut clause: Vec<Lit> = cycle.iter().map(|&e| self.lit(e, false)).collect();
                            clause.push(self.lit(other, false));
                            self.engine.add_clause(&clause);
                        }
                    }
                    continue;
                }
            }

            let block: Vec<Lit> = edges.iter().enumerate().map(|(e, &on)| self.lit(e, !on)).collect();
            self.engine.add_clause(&block);
            return Some(edges);
        }
        None
    }

    /// A cycle made only of two-ended edges, if the solution has one.
    fn closed_cycle(&self, edges: &[bool]) -> Option<Vec<usize>> {
        let board = &self.board;
        let degree = |v: usize| {
            let vertex = &board.vertices[v];
            vertex.edges.iter().chain(vertex.exit_edge.iter()).filter(|&&e| edges[e]).count()
        };
        let mut visited = vec![false; board.edges.len()];

        for start in 0..board.edges.len() {
            if !edges[start] || visited[start] || board.edges[start].vertices.len() != 2 {
                continue;
            }
            // Walk the strand from `start`; it closes only if it returns
            let mut cycle = vec![start];
            visited[start] = true;
            let mut vertex = board.edges[start].vertices[1];
            let mut current = start;
            let closed = loop {
                if degree(vertex) != 2 {
                    break false;
                }
                let next = board.vertices[vertex]
                    .edges
                    .iter()
                    .chain(board.vertices[vertex].exit_edge.iter())
                    .copied()
                    .find(|&e| e != current && edges[e]);
                let Some(next) = next else { break false };
                if next == start {
                    break true;
                }
                if visited[next] || board.edges[next].vertices.len() != 2 {
                    break false;
                }
                visited[next] = true;
                cycle.push(next);
                let [a, b] = [board.edges[next].vertices[0], board.edges[next].vertices[1]];
                vertex = if a == vertex { b } else { a };
                current = next;
            };
            if closed {
                return Some(cycle);
            }
        }
        None
    }

    /// Drain every remaining solution.
    pub fn solutions(mut self) -> Vec<Vec<bool>> {
        let mut all = Vec::new();
        while let Some(solution) = self.next_solution() {
            all.push(solution);
        }
        all
    }

    /// Whether any solution remains.
    pub fn has_solution(mut self) -> bool {
        self.next_solution().is_some()
    }

    /// Stream the remaining solutions without collecting them.
    pub fn for_each_solution(&mut self, mut f: impl FnMut(&[bool])) {
        while let Some(solution) = self.next_solution() {
            f(&solution);
        }
    }

    pub fn board(&self) -> &Arc<PatternBoard> {
        &self.board
    }
}

pub fn has_solution(features: &FeatureSet) -> bool {
    PatternBoardSolver::new(features).has_solution()
}

pub fn count_solutions(features: &FeatureSet) -> usize {
    let mut count = 0;
    PatternBoardSolver::new(features).for_each_solution(|_| count += 1);
    count
}
