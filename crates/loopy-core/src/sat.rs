//! Boolean satisfiability: the engine contract the pattern solver needs and
//! a small DPLL engine that meets it.
//!
//! The contract is incremental in the weakest sense: clauses may be added
//! after a `solve`, and the next `solve` sees them. That is enough to
//! enumerate models with blocking clauses.

use std::fmt;

/// A literal: a variable index plus a sign, packed as `var * 2 + negated`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit(u32);

impl Lit {
    pub fn new(var: usize, positive: bool) -> Self {
        Lit(((var as u32) << 1) | u32::from(!positive))
    }

    pub fn positive(var: usize) -> Self {
        Lit::new(var, true)
    }

    pub fn negative(var: usize) -> Self {
        Lit::new(var, false)
    }

    pub fn var(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub fn is_positive(self) -> bool {
        self.0 & 1 == 0
    }

    fn code(self) -> usize {
        self.0 as usize
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit(self.0 ^ 1)
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_positive() {
            write!(f, "x{}", self.var())
        } else {
            write!(f, "!x{}", self.var())
        }
    }
}

/// What the pattern solver needs from a satisfiability engine.
pub trait SatEngine {
    /// Allocate a fresh variable and return its index.
    fn new_var(&mut self) -> usize;

    fn num_vars(&self) -> usize;

    /// Add a clause (a disjunction of literals). Allowed between solves.
    fn add_clause(&mut self, clause: &[Lit]);

    /// Whether the clauses added so far are satisfiable.
    fn solve(&mut self) -> bool;

    /// Value of `var` in the model found by the last successful `solve`.
    fn model_value(&self, var: usize) -> bool;
}

/// DPLL with two watched literals and chronological backtracking.
///
/// Each `solve` starts from an empty assignment, so clauses added between
/// solves need no special handling.
#[derive(Debug, Default, Clone)]
pub struct DpllSolver {
    num_vars: usize,
    clauses: Vec<Vec<Lit>>,
    units: Vec<Lit>,
    /// Clause indices watching each literal code
    watches: Vec<Vec<usize>>,
    has_empty_clause: bool,
    assignment: Vec<Option<bool>>,
    trail: Vec<Lit>,
    queue_head: usize,
    model: Vec<bool>,
}

/// One decision: its trail position and whether the other branch was tried.
#[derive(Debug, Clone, Copy)]
struct Decision {
    lit: Lit,
    trail_len: usize,
    flipped: bool,
}

impl DpllSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len() + self.units.len()
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.var()].map(|v| v == lit.is_positive())
    }

    /// Assign `lit` true. Returns false if it is already false.
    fn enqueue(&mut self, lit: Lit) -> bool {
        match self.value(lit) {
            Some(v) => v,
            None => {
                self.assignment[lit.var()] = Some(lit.is_positive());
                self.trail.push(lit);
                true
            }
        }
    }

    fn undo_to(&mut self, trail_len: usize) {
        for lit in self.trail.drain(trail_len..) {
            self.assignment[lit.var()] = None;
        }
        self.queue_head = self.queue_head.min(trail_len);
    }

    /// Unit propagation. Returns false on conflict.
    fn propagate(&mut self) -> bool {
        while self.queue_head < self.trail.len() {
            let false_lit = !self.trail[self.queue_head];
            self.queue_head += 1;

            let watchers = std::mem::take(&mut self.watches[false_lit.code()]);
            let mut kept = Vec::with_capacity(watchers.len());
            let mut conflict = false;

            for (position, &ci) in watchers.iter().enumerate() {
                if conflict {
                    kept.extend_from_slice(&watchers[position..]);
                    break;
                }
                if self.clauses[ci][0] == false_lit {
                    self.clauses[ci].swap(0, 1);
                }
                let first = self.clauses[ci][0];
                if self.value(first) == Some(true) {
                    kept.push(ci);
                    continue;
                }
                let replacement =
                    (2..self.clauses[ci].len()).find(|&k| self.value(self.clauses[ci][k]) != Some(false));
                if let Some(k) = replacement {
                    self.clauses[ci].swap(1, k);
                    let watch = self.clauses[ci][1];
                    self.watches[watch.code()].push(ci);
                    continue;
                }
                kept.push(ci);
                if !self.enqueue(first) {
                    conflict = true;
                }
            }

            self.watches[false_lit.code()] = kept;
            if conflict {
                return false;
            }
        }
        true
    }

    fn next_unassigned(&self) -> Option<usize> {
        self.assignment.iter().position(|a| a.is_none())
    }
}

impl SatEngine for DpllSolver {
    fn new_var(&mut self) -> usize {
        let var = self.num_vars;
        self.num_vars += 1;
        self.watches.push(Vec::new());
        self.watches.push(Vec::new());
        var
    }

    fn num_vars(&self) -> usize {
        self.num_vars
    }

    fn add_clause(&mut self, clause: &[Lit]) {
        let mut lits = clause.to_vec();
        lits.sort_unstable();
        lits.dedup();
        debug_assert!(lits.iter().all(|l| l.var() < self.num_vars), "clause uses an unallocated variable");
        // x and !x sort next to each other
        if lits.windows(2).any(|w| w[0].var() == w[1].var()) {
            return;
        }
        match lits.len() {
            0 => self.has_empty_clause = true,
            1 => self.units.push(lits[0]),
            _ => {
                let index = self.clauses.len();
                self.watches[lits[0].code()].push(index);
                self.watches[lits[1].code()].push(index);
                self.clauses.push(lits);
            }
        }
    }

    fn solve(&mut self) -> bool {
        self.assignment = vec![None; self.num_vars];
        self.trail.clear();
        self.queue_head = 0;
        if self.has_empty_clause {
            return false;
        }
        for i in 0..self.units.len() {
            if !self.enqueue(self.units[i]) {
                return false;
            }
        }

        let mut decisions: Vec<Decision> = Vec::new();
        let mut ok = self.propagate();
        loop {
            if !ok {
                // Flip the most recent unflipped decision
                loop {
                    let Some(decision) = decisions.pop() else {
                        return false;
                    };
                    self.undo_to(decision.trail_len);
                    if !decision.flipped {
                        let lit = !decision.lit;
                        decisions.push(Decision { lit, trail_len: self.trail.len(), flipped: true });
                        self.enqueue(lit);
                        break;
                    }
                }
                ok = self.propagate();
                continue;
            }

            let Some(var) = self.next_unassigned() else {
                self.model = self.assignment.iter().map(|a| a.unwrap_or(false)).collect();
                return true;
            };
            // Edges are more often off the loop than on it
            let lit = Lit::negative(var);
            decisions.push(Decision { lit, trail_len: self.trail.len(), flipped: false });
            self.enqueue(lit);
            ok = self.propagate();
        }
    }

    fn model_value(&self, var: usize) -> bool {
        self.model.get(var).copied().unwrap_or(false)
    }
}

/// Constrain the XOR of `lits` to `odd`. Long XORs are split with
/// auxiliary variables so no more than eight clauses come from any chunk.
pub fn add_xor<E: SatEngine + ?Sized>(engine: &mut E, lits: &[Lit], odd: bool) {
    if lits.len() <= 4 {
        add_xor_direct(engine, lits, odd);
        return;
    }
    // aux == lits[0] ^ lits[1] ^ lits[2]
    let aux = Lit::positive(engine.new_var());
    add_xor_direct(engine, &[lits[0], lits[1], lits[2], aux], false);
    let mut rest = vec![aux];
    rest.extend_from_slice(&lits[3..]);
    add_xor(engine, &rest, odd);
}

fn add_xor_direct<E: SatEngine + ?Sized>(engine: &mut E, lits: &[Lit], odd: bool) {
    let n = lits.len();
    if n == 0 {
        if odd {
            engine.add_clause(&[]);
        }
        return;
    }
    for assignment in 0u32..(1 << n) {
        if (assignment.count_ones() % 2 == 1) == odd {
            continue;
        }
        // Forbid this assignment
        let clause: Vec<Lit> = lits
            .iter()
            .enumerate()
            .map(|(i, &l)| if assignment & (1 << i) != 0 { !l } else { l })
            .collect();
        engine.add_clause(&clause);
    }
}

/// At most `k` of `lits` are true.
pub fn add_at_most<E: SatEngine + ?Sized>(engine: &mut E, lits: &[Lit], k: usize) {
    if k >= lits.len() {
        return;
    }
    for subset in combinations(lits.len(), k + 1) {
        let clause: Vec<Lit> = subset.iter().map(|&i| !lits[i]).collect();
        engine.add_clause(&clause);
    }
}

/// At least `k` of `lits` are true.
pub fn add_at_least<E: SatEngine + ?Sized>(engine: &mut E, lits: &[Lit], k: usize) {
    if k == 0 {
        return;
    }
    if k > lits.len() {
        engine.add_clause(&[]);
        return;
    }
    // Any n - k + 1 of them contain a true one
    for subset in combinations(lits.len(), lits.len() - k + 1) {
        let clause: Vec<Lit> = subset.iter().map(|&i| lits[i]).collect();
        engine.add_clause(&clause);
    }
}

pub fn add_exactly<E: SatEngine + ?Sized>(engine: &mut E, lits: &[Lit], k: usize) {
    add_at_most(engine, lits, k);
    add_at_least(engine, lits, k);
}

/// All `k`-element index subsets of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k > n {
        return result;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        result.push(current.clone());
        let Some(i) = (0..k).rev().find(|&i| current[i] != i + n - k) else {
            return result;
        };
        current[i] += 1;
        for j in (i + 1)..k {
            current[j] = current[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn engine_with_vars(n: usize) -> DpllSolver {
        let mut engine = DpllSolver::new();
        for _ in 0..n {
            engine.new_var();
        }
        engine
    }

    fn satisfies(clauses: &[Vec<Lit>], assignment: u32) -> bool {
        clauses.iter().all(|c| {
            c.iter().any(|l| ((assignment >> l.var()) & 1 == 1) == l.is_positive())
        })
    }

    /// Enumerate every model via blocking clauses.
    fn count_models(engine: &mut DpllSolver, vars: usize) -> usize {
        let mut count = 0;
        while engine.solve() {
            count += 1;
            let block: Vec<Lit> = (0..vars).map(|v| Lit::new(v, !engine.model_value(v))).collect();
            engine.add_clause(&block);
        }
        count
    }

    #[test]
    fn test_simple_sat_and_unsat() {
        let mut engine = engine_with_vars(2);
        engine.add_clause(&[Lit::positive(0), Lit::positive(1)]);
        engine.add_clause(&[Lit::negative(0)]);
        assert!(engine.solve());
        assert!(!engine.model_value(0));
        assert!(engine.model_value(1));
        engine.add_clause(&[Lit::negative(1)]);
        assert!(!engine.solve());
    }

    #[test]
    fn test_tautologies_are_ignored() {
        let mut engine = engine_with_vars(1);
        engine.add_clause(&[Lit::positive(0), Lit::negative(0)]);
        assert_eq!(engine.num_clauses(), 0);
        assert_eq!(count_models(&mut engine, 1), 2);
    }

    #[test]
    fn test_random_cnf_model_counts_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..60 {
            let vars = rng.gen_range(3..8);
            let clause_count = rng.gen_range(1..14);
            let clauses: Vec<Vec<Lit>> = (0..clause_count)
                .map(|_| {
                    let len = rng.gen_range(1..4);
                    (0..len)
                        .map(|_| Lit::new(rng.gen_range(0..vars), rng.gen_bool(0.5)))
                        .collect()
                })
                .collect();

            let expected = (0u32..(1 << vars)).filter(|&a| satisfies(&clauses, a)).count();
            let mut engine = engine_with_vars(vars);
            for c in &clauses {
                engine.add_clause(c);
            }
            assert_eq!(count_models(&mut engine, vars), expected);
        }
    }

    #[test]
    fn test_xor_constraints() {
        for n in 1..8 {
            for odd in [false, true] {
                let mut engine = engine_with_vars(n);
                let lits: Vec<Lit> = (0..n).map(Lit::positive).collect();
                add_xor(&mut engine, &lits, odd);
                // Auxiliary variables are functionally determined
                let mut count = 0;
                while engine.solve() {
                    let parity = (0..n).filter(|&v| engine.model_value(v)).count() % 2 == 1;
                    assert_eq!(parity, odd);
                    count += 1;
                    let block: Vec<Lit> = (0..n).map(|v| Lit::new(v, !engine.model_value(v))).collect();
                    engine.add_clause(&block);
                }
                assert_eq!(count, 1 << (n - 1));
            }
        }
    }

    #[test]
    fn test_cardinality() {
        for n in 1..6 {
            for k in 0..=n {
                let mut engine = engine_with_vars(n);
                let lits: Vec<Lit> = (0..n).map(Lit::positive).collect();
                add_exactly(&mut engine, &lits, k);
                let expected = combinations(n, k).len();
                assert_eq!(count_models(&mut engine, n), expected, "n={} k={}", n, k);
            }
        }
        let mut engine = engine_with_vars(2);
        add_at_least(&mut engine, &[Lit::positive(0), Lit::positive(1)], 3);
        assert!(!engine.solve());
    }

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(4, 2).len(), 6);
        assert_eq!(combinations(3, 0), vec![Vec::<usize>::new()]);
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert!(combinations(2, 3).is_empty());
    }
}
