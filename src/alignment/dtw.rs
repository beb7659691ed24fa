//! Dynamic time warping over cepstral frames.
//!
//! The cumulative cost of cell `(i, j)` is the local distance
//! `d(a[i], b[j])` plus the cheapest of its three predecessors:
//!
//! ```text
//!   (i-1, j-1)  diagonal
//!   (i-1, j)    vertical   (advance in `a` only)
//!   (i,   j-1)  horizontal (advance in `b` only)
//! ```
//!
//! Tie-break rule (v1): diagonal, then vertical, then horizontal. A later
//! candidate only wins when it is strictly cheaper. Changing this order changes
//! scores, so it must not be altered without bumping the rule version.
//!
//! Everything is tabulated in flat, index-addressed arrays; there is no
//! recursion, so path length is bounded only by memory.

use super::distance::frame_distance;

/// How a cell was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Step {
    Start = 0,
    Diagonal = 1,
    Vertical = 2,
    Horizontal = 3,
}

/// Monotonic frame correspondence, ordered from `(0, 0)` to `(N-1, M-1)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignmentPath {
    pairs: Vec<(usize, usize)>,
}

impl AlignmentPath {
    pub fn from_pairs(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn first(&self) -> Option<(usize, usize)> {
        self.pairs.first().copied()
    }

    pub fn last(&self) -> Option<(usize, usize)> {
        self.pairs.last().copied()
    }

    /// True when neither index ever decreases and each step advances by at
    /// most one frame on each side.
    pub fn is_monotonic(&self) -> bool {
        self.pairs.windows(2).all(|w| {
            let (i0, j0) = w[0];
            let (i1, j1) = w[1];
            i1 >= i0 && j1 >= j0 && i1 - i0 <= 1 && j1 - j0 <= 1 && (i1, j1) != (i0, j0)
        })
    }
}

/// Picks the cheapest predecessor, honouring the tie-break order.
#[inline(always)]
fn best_predecessor(diagonal: Option<f64>, vertical: Option<f64>, horizontal: Option<f64>) -> (f64, Step) {
    let mut best = (f64::INFINITY, Step::Start);
    for (candidate, step) in [
        (diagonal, Step::Diagonal),
        (vertical, Step::Vertical),
        (horizontal, Step::Horizontal),
    ] {
        if let Some(cost) = candidate {
            if best.1 == Step::Start || cost < best.0 {
                best = (cost, step);
            }
        }
    }
    best
}

/// Full N×M cumulative cost matrix with one backpointer per cell.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    cost: Vec<f64>,
    steps: Vec<Step>,
}

impl CostMatrix {
    /// Tabulates cumulative costs for `a` (rows) against `b` (columns).
    pub fn compute(a: &[&[f64]], b: &[&[f64]]) -> Self {
        let (rows, cols) = (a.len(), b.len());
        let mut cost = vec![0.0f64; rows * cols];
        let mut steps = vec![Step::Start; rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                let local = frame_distance(a[i], b[j]);
                let idx = i * cols + j;
                if i == 0 && j == 0 {
                    cost[idx] = local;
                    continue;
                }

                let diagonal = (i > 0 && j > 0).then(|| cost[idx - cols - 1]);
                let vertical = (i > 0).then(|| cost[idx - cols]);
                let horizontal = (j > 0).then(|| cost[idx - 1]);

                let (prev, step) = best_predecessor(diagonal, vertical, horizontal);
                cost[idx] = local + prev;
                steps[idx] = step;
            }
        }

        Self { rows, cols, cost, steps }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cost(&self, i: usize, j: usize) -> f64 {
        self.cost[i * self.cols + j]
    }

    pub fn step(&self, i: usize, j: usize) -> Step {
        self.steps[i * self.cols + j]
    }

    /// Minimum cumulative cost of reaching `(N-1, M-1)`, `None` for an empty matrix.
    pub fn total_cost(&self) -> Option<f64> {
        self.cost.last().copied()
    }

    /// Walks the backpointers from `(N-1, M-1)` back to `(0, 0)`.
    ///
    /// Each backpointer records the predecessor with the minimum cumulative
    /// cost under the tie-break order, so this is the backtrack of the optimal
    /// path.
    pub fn backtrack(&self) -> AlignmentPath {
        if self.rows == 0 || self.cols == 0 {
            return AlignmentPath::default();
        }

        let (mut i, mut j) = (self.rows - 1, self.cols - 1);
        let mut pairs = Vec::with_capacity(self.rows + self.cols - 1);
        pairs.push((i, j));

        loop {
            match self.step(i, j) {
                Step::Start => break,
                Step::Diagonal => {
                    i -= 1;
                    j -= 1;
                }
                Step::Vertical => i -= 1,
                Step::Horizontal => j -= 1,
            }
            pairs.push((i, j));
        }

        pairs.reverse();
        AlignmentPath { pairs }
    }
}

/// Score-only DTW result from [`rolling_cost`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingCost {
    pub total_cost: f64,
    pub path_length: usize,
}

/// DTW keeping only two rows of `(cumulative cost, path length)`.
///
/// Rows run along the longer sequence, so memory is O(min(N, M)). When that
/// means walking the grid transposed, the vertical and horizontal candidates
/// are swapped back before the tie-break, so the predecessor choice matches
/// [`CostMatrix::compute`] cell for cell: the total cost and the optimal
/// path's length are identical. The path itself is not recovered.
pub fn rolling_cost(a: &[&[f64]], b: &[&[f64]]) -> Option<RollingCost> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let transposed = b.len() > a.len();
    let (outer, inner) = if transposed { (b, a) } else { (a, b) };
    let cols = inner.len();

    let mut prev: Vec<(f64, usize)> = vec![(0.0, 0); cols];
    let mut curr: Vec<(f64, usize)> = vec![(0.0, 0); cols];

    for (r, frame) in outer.iter().enumerate() {
        for c in 0..cols {
            let local = if transposed {
                frame_distance(inner[c], frame)
            } else {
                frame_distance(frame, inner[c])
            };
            if r == 0 && c == 0 {
                curr[0] = (local, 1);
                continue;
            }

            let diagonal = (r > 0 && c > 0).then(|| prev[c - 1].0);
            let up = (r > 0).then(|| prev[c].0);
            let left = (c > 0).then(|| curr[c - 1].0);
            // `up` advances `a` unless the grid is transposed.
            let (vertical, horizontal) = if transposed { (left, up) } else { (up, left) };

            let (best, step) = best_predecessor(diagonal, vertical, horizontal);
            let length = match (step, transposed) {
                (Step::Diagonal, _) => prev[c - 1].1,
                (Step::Vertical, false) | (Step::Horizontal, true) => prev[c].1,
                (Step::Vertical, true) | (Step::Horizontal, false) => curr[c - 1].1,
                (Step::Start, _) => 0,
            };
            curr[c] = (local + best, length + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let (total_cost, path_length) = prev[cols - 1];
    Some(RollingCost { total_cost, path_length })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::distance::DB_SCALE;

    /// Deterministic pseudo-random frames (LCG), `dims` coefficients each.
    fn frames(seed: u64, len: usize, dims: usize) -> Vec<Vec<f64>> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..len)
            .map(|_| {
                (0..dims)
                    .map(|_| {
                        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        ((state >> 33) as f64 / (1u64 << 31) as f64) * 10.0 - 5.0
                    })
                    .collect()
            })
            .collect()
    }

    fn slices(frames: &[Vec<f64>]) -> Vec<&[f64]> {
        frames.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn test_hand_worked_example() {
        let a = [vec![0.0], vec![1.0], vec![2.0]];
        let b = [vec![0.0], vec![2.0]];
        let c = DB_SCALE * 2f64.sqrt();

        let matrix = CostMatrix::compute(&slices(&a), &slices(&b));

        let expected = [[0.0, 2.0 * c], [c, c], [3.0 * c, c]];
        for (i, row) in expected.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                assert!((matrix.cost(i, j) - value).abs() < 1e-12, "cell ({}, {})", i, j);
            }
        }

        assert_eq!(matrix.step(0, 1), Step::Horizontal);
        assert_eq!(matrix.step(1, 0), Step::Vertical);
        assert_eq!(matrix.step(1, 1), Step::Diagonal);
        // Diagonal and vertical tie at (2, 1): diagonal wins.
        assert_eq!(matrix.step(2, 1), Step::Diagonal);

        let path = matrix.backtrack();
        assert_eq!(path.pairs(), &[(0, 0), (1, 0), (2, 1)]);
    }

    #[test]
    fn test_tie_break_order() {
        assert_eq!(best_predecessor(Some(1.0), Some(1.0), Some(1.0)), (1.0, Step::Diagonal));
        assert_eq!(best_predecessor(Some(2.0), Some(1.0), Some(1.0)), (1.0, Step::Vertical));
        assert_eq!(best_predecessor(Some(2.0), Some(2.0), Some(1.0)), (1.0, Step::Horizontal));
        assert_eq!(best_predecessor(None, Some(3.0), None), (3.0, Step::Vertical));
        assert_eq!(best_predecessor(None, None, Some(4.0)), (4.0, Step::Horizontal));
    }

    #[test]
    fn test_identical_sequences_follow_the_diagonal() {
        let a = frames(7, 12, 4);
        let matrix = CostMatrix::compute(&slices(&a), &slices(&a));

        assert_eq!(matrix.total_cost(), Some(0.0));
        let path = matrix.backtrack();
        let diagonal: Vec<(usize, usize)> = (0..12).map(|i| (i, i)).collect();
        assert_eq!(path.pairs(), diagonal.as_slice());
    }

    #[test]
    fn test_path_validity() {
        for (n, m) in [(1, 1), (1, 7), (7, 1), (5, 9), (13, 4), (20, 20)] {
            let a = frames(n as u64, n, 3);
            let b = frames(100 + m as u64, m, 3);
            let path = CostMatrix::compute(&slices(&a), &slices(&b)).backtrack();

            assert_eq!(path.first(), Some((0, 0)), "{}x{}", n, m);
            assert_eq!(path.last(), Some((n - 1, m - 1)), "{}x{}", n, m);
            assert!(path.is_monotonic(), "{}x{}: {:?}", n, m, path);
            assert!(path.len() >= n.max(m) && path.len() <= n + m - 1);
        }
    }

    #[test]
    fn test_minimal_cost_is_transpose_invariant() {
        let a = frames(1, 15, 12);
        let b = frames(2, 23, 12);

        let ab = CostMatrix::compute(&slices(&a), &slices(&b));
        let ba = CostMatrix::compute(&slices(&b), &slices(&a));

        assert_eq!(ab.total_cost(), ba.total_cost());
        let reversed = ba.backtrack();
        assert_eq!(reversed.first(), Some((0, 0)));
        assert_eq!(reversed.last(), Some((22, 14)));
    }

    #[test]
    fn test_path_cost_matches_total_cost() {
        let a = frames(3, 10, 5);
        let b = frames(4, 14, 5);
        let (sa, sb) = (slices(&a), slices(&b));

        let matrix = CostMatrix::compute(&sa, &sb);
        let summed: f64 = matrix
            .backtrack()
            .pairs()
            .iter()
            .map(|&(i, j)| frame_distance(sa[i], sb[j]))
            .sum();
        let total = matrix.total_cost().unwrap();
        assert!((summed - total).abs() < 1e-9 * total.max(1.0));
    }

    #[test]
    fn test_rolling_rows_match_full_matrix() {
        for (n, m) in [(1, 1), (1, 6), (6, 1), (9, 17), (17, 9)] {
            let a = frames(10 + n as u64, n, 6);
            let b = frames(20 + m as u64, m, 6);
            let (sa, sb) = (slices(&a), slices(&b));

            let matrix = CostMatrix::compute(&sa, &sb);
            let rolling = rolling_cost(&sa, &sb).unwrap();

            assert_eq!(Some(rolling.total_cost), matrix.total_cost(), "{}x{}", n, m);
            assert_eq!(rolling.path_length, matrix.backtrack().len(), "{}x{}", n, m);
        }
    }

    #[test]
    fn test_rolling_rows_match_full_matrix_under_ties() {
        // Two-symbol alphabets make vertical and horizontal candidates tie often.
        let a: Vec<Vec<f64>> = [0.0, 1.0, 0.0, 1.0, 1.0, 0.0].iter().map(|&x| vec![x]).collect();
        let b: Vec<Vec<f64>> = [1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0]
            .iter()
            .map(|&x| vec![x])
            .collect();
        let (sa, sb) = (slices(&a), slices(&b));

        for (x, y) in [(&sa, &sb), (&sb, &sa)] {
            let matrix = CostMatrix::compute(x, y);
            let rolling = rolling_cost(x, y).unwrap();
            assert_eq!(Some(rolling.total_cost), matrix.total_cost());
            assert_eq!(rolling.path_length, matrix.backtrack().len());
        }
    }

    #[test]
    fn test_empty_inputs() {
        let a = frames(1, 3, 2);
        let empty: Vec<&[f64]> = Vec::new();

        let matrix = CostMatrix::compute(&empty, &slices(&a));
        assert_eq!(matrix.total_cost(), None);
        assert!(matrix.backtrack().is_empty());
        assert_eq!(rolling_cost(&slices(&a), &empty), None);
    }

    #[test]
    fn test_is_monotonic_rejects_bad_paths() {
        assert!(AlignmentPath::from_pairs(vec![(0, 0), (1, 1), (1, 2)]).is_monotonic());
        assert!(!AlignmentPath::from_pairs(vec![(0, 0), (1, 1), (0, 2)]).is_monotonic());
        assert!(!AlignmentPath::from_pairs(vec![(0, 0), (2, 1)]).is_monotonic());
        assert!(!AlignmentPath::from_pairs(vec![(0, 0), (0, 0)]).is_monotonic());
    }
}
