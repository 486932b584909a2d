//! Ranked assignment enumeration (4.H): a Hungarian/LAP inner solver plus
//! Murty's partitioning scheme to walk out the k best solutions in
//! nondecreasing cost order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use ndarray::Array2;
use noisy_float::prelude::*;

/// Cost used internally to stand in for "forbidden" (`+inf`) entries.
/// Real infinities propagate to NaN under subtraction inside the shortest
/// augmenting-path relaxation, so forbidden edges are represented with a
/// large finite sentinel instead and only treated as truly infeasible when
/// a solution still touches one.
const BIG: f64 = 1e15;

fn clamp_forbidden(v: f64) -> f64 {
    if v.is_infinite() {
        BIG
    } else {
        v
    }
}

/// Solves the rectangular linear assignment problem for an `n x m` cost
/// matrix with `n <= m`: every row is assigned a distinct column minimizing
/// total cost. `forbidden` entries (originally `+inf`) are represented as
/// `BIG`; returns `None` if every row cannot be matched to a finite-cost
/// column (the true `+inf` entries leave no feasible assignment).
///
/// Classic O(n^2 m) successive-shortest-augmenting-path Hungarian
/// algorithm (the textbook "potentials" formulation).
pub fn hungarian(cost: &Array2<f64>) -> Option<(Vec<usize>, f64)> {
    let n = cost.nrows();
    let m = cost.ncols();
    if n == 0 {
        return Some((Vec::new(), 0.0));
    }
    assert!(n <= m, "hungarian: expected n_rows <= n_cols");

    let inf = f64::INFINITY;
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut p = vec![0usize; m + 1]; // p[j] = 1-indexed row assigned to column j
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![inf; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0usize;
            for j in 1..=m {
                if !used[j] {
                    let raw = clamp_forbidden(cost[[i0 - 1, j - 1]]);
                    let cur = raw - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            if !delta.is_finite() {
                // No augmenting path reaches an unassigned column: infeasible.
                return None;
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![0usize; n];
    for j in 1..=m {
        if p[j] > 0 {
            row_to_col[p[j] - 1] = j - 1;
        }
    }

    let mut total_cost = 0.0;
    for (row, &col) in row_to_col.iter().enumerate() {
        let c = cost[[row, col]];
        if c.is_infinite() {
            return None;
        }
        total_cost += c;
    }
    Some((row_to_col, total_cost))
}

/// A subproblem in Murty's partitioning scheme: a set of forced
/// `(row, col)` assignments, a set of forbidden `(row, col)` pairs, and the
/// resulting optimal solution over the remaining free rows.
struct Node {
    cost: f64,
    solution: Vec<usize>, // full row -> col assignment, length n
    fixed: Vec<(usize, usize)>,
    forbidden: HashSet<(usize, usize)>,
}

struct HeapEntry {
    cost: N64,
    node: Node,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Tie-break by lexicographic order of the assignment vector, per
        // spec §9's determinism requirement.
        self.cost
            .cmp(&other.cost)
            .then_with(|| self.node.solution.cmp(&other.node.solution))
    }
}

/// Solves the constrained LAP for a node: rows/cols in `fixed` are removed
/// from the free submatrix (their cost is added to the base), and
/// `forbidden` pairs are set to `+inf` within it.
fn solve_node(
    cost: &Array2<f64>,
    fixed: &[(usize, usize)],
    forbidden: &HashSet<(usize, usize)>,
) -> Option<Node> {
    let n = cost.nrows();
    let m = cost.ncols();
    let fixed_rows: HashSet<usize> = fixed.iter().map(|(r, _)| *r).collect();
    let fixed_cols: HashSet<usize> = fixed.iter().map(|(_, c)| *c).collect();

    let free_rows: Vec<usize> = (0..n).filter(|r| !fixed_rows.contains(r)).collect();
    let free_cols: Vec<usize> = (0..m).filter(|c| !fixed_cols.contains(c)).collect();

    let base_cost: f64 = fixed.iter().map(|(r, c)| cost[[*r, *c]]).sum();
    if fixed.iter().any(|(r, c)| cost[[*r, *c]].is_infinite()) {
        return None;
    }

    let mut solution = vec![0usize; n];
    for &(r, c) in fixed {
        solution[r] = c;
    }

    if free_rows.is_empty() {
        return Some(Node {
            cost: base_cost,
            solution,
            fixed: fixed.to_vec(),
            forbidden: forbidden.clone(),
        });
    }

    let mut sub = Array2::<f64>::from_elem((free_rows.len(), free_cols.len()), f64::INFINITY);
    for (si, &r) in free_rows.iter().enumerate() {
        for (sj, &c) in free_cols.iter().enumerate() {
            if forbidden.contains(&(r, c)) {
                continue;
            }
            sub[[si, sj]] = cost[[r, c]];
        }
    }

    let (sub_solution, sub_cost) = hungarian(&sub)?;
    for (si, &sj) in sub_solution.iter().enumerate() {
        solution[free_rows[si]] = free_cols[sj];
    }

    Some(Node {
        cost: base_cost + sub_cost,
        solution,
        fixed: fixed.to_vec(),
        forbidden: forbidden.clone(),
    })
}

/// Enumerates the `k` best assignments of `cost` (`n_rows <= n_cols`) in
/// nondecreasing total cost, returning `(assignment, cost)` pairs. Stops
/// early if fewer than `k` feasible assignments exist.
pub fn k_best(cost: &Array2<f64>, k: usize) -> Vec<(Vec<usize>, f64)> {
    let mut results = Vec::new();
    if k == 0 || cost.nrows() == 0 {
        return results;
    }

    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
    if let Some(root) = solve_node(cost, &[], &HashSet::new()) {
        heap.push(Reverse(HeapEntry {
            cost: n64(root.cost),
            node: root,
        }));
    }

    while results.len() < k {
        let Reverse(HeapEntry { node, .. }) = match heap.pop() {
            Some(entry) => entry,
            None => break,
        };
        results.push((node.solution.clone(), node.cost));

        // Partition over the free rows, in ascending row-index order, per
        // the canonical tie-breaking scheme of spec §9.
        let fixed_rows: HashSet<usize> = node.fixed.iter().map(|(r, _)| *r).collect();
        let free_rows: Vec<usize> = (0..node.solution.len())
            .filter(|r| !fixed_rows.contains(r))
            .collect();

        let mut running_fixed = node.fixed.clone();
        for &r in &free_rows {
            let mut forbidden = node.forbidden.clone();
            forbidden.insert((r, node.solution[r]));
            if let Some(child) = solve_node(cost, &running_fixed, &forbidden) {
                heap.push(Reverse(HeapEntry {
                    cost: n64(child.cost),
                    node: child,
                }));
            }
            running_fixed.push((r, node.solution[r]));
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hungarian_solves_textbook_square_matrix() {
        let cost = Array2::from_shape_vec((3, 3), vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0])
            .unwrap();
        let (_assignment, total) = hungarian(&cost).unwrap();
        assert_abs_diff_eq!(total, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn hungarian_respects_forbidden_entries() {
        let inf = f64::INFINITY;
        let cost = Array2::from_shape_vec((2, 2), vec![1.0, inf, inf, 1.0]).unwrap();
        let (assignment, total) = hungarian(&cost).unwrap();
        assert_eq!(assignment, vec![0, 1]);
        assert_abs_diff_eq!(total, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn hungarian_returns_none_when_infeasible() {
        let inf = f64::INFINITY;
        let cost = Array2::from_shape_vec((2, 2), vec![1.0, inf, 2.0, inf]).unwrap();
        assert!(hungarian(&cost).is_none());
    }

    #[test]
    fn k_best_first_solution_matches_hungarian_optimum() {
        let cost = Array2::from_shape_vec((3, 3), vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0])
            .unwrap();
        let (_, hungarian_cost) = hungarian(&cost).unwrap();
        let ranked = k_best(&cost, 5);
        assert_abs_diff_eq!(ranked[0].1, hungarian_cost, epsilon = 1e-9);
        for w in ranked.windows(2) {
            assert!(w[0].1 <= w[1].1 + 1e-9);
        }
    }

    #[test]
    fn k_best_rectangular_assigns_every_row() {
        let cost = Array2::from_shape_vec(
            (2, 4),
            vec![1.0, 5.0, 9.0, 2.0, 3.0, 1.0, 4.0, 6.0],
        )
        .unwrap();
        let ranked = k_best(&cost, 3);
        assert!(!ranked.is_empty());
        for (assignment, _) in &ranked {
            assert_eq!(assignment.len(), 2);
            assert_ne!(assignment[0], assignment[1]);
        }
    }

    #[test]
    fn k_best_stops_when_solutions_exhausted() {
        let inf = f64::INFINITY;
        // Only one feasible assignment exists.
        let cost = Array2::from_shape_vec((2, 2), vec![1.0, inf, inf, 1.0]).unwrap();
        let ranked = k_best(&cost, 10);
        assert_eq!(ranked.len(), 1);
    }
}
