//! # Basis factor
//!
//! Maintains an invertible representation of the basis matrix `B`: an LU decomposition computed
//! with Markowitz pivoting, extended by a list of product-form updates as the basis changes
//! pivot by pivot. FTRAN and BTRAN dominate the runtime of the whole solver; both carry a
//! zero-skipping sparse path and a dense path, chosen from the expected density of the result.
//!
//! A singular basis does not fail the build. The columns for which no acceptable pivot exists
//! are patched with unit columns and reported through `no_pivot_row`/`no_pivot_col`, so the
//! driver can repair the basis by swapping in the logical variables of the missing pivot rows.
use log::{debug, trace};

use crate::data::linear_algebra::DENSITY_THRESHOLD;
use crate::data::linear_algebra::matrix::ColumnMatrix;
use crate::data::linear_algebra::SparseTuple;
use crate::data::linear_algebra::vector::WorkVector;

/// During elimination, values this small are treated as cancelled and dropped.
const ELIMINATION_DROP_TOLERANCE: f64 = 1e-14;
/// Number of eligible pivot candidates examined before the Markowitz search settles.
const MAX_SEARCH: usize = 8;
/// Product-form updates never trigger the synthetic clock before this many have accumulated.
const SYNTHETIC_CLOCK_MIN_UPDATES: usize = 50;

/// Feedback from a product-form update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateHint {
    Ok,
    /// The accumulated update work exceeds the cost of a fresh build; refactorize.
    Refactor,
}

/// LU factorization of the basis, plus product-form updates.
///
/// The factor stores the pivot order as two permutations (original row and basis position per
/// elimination step), the unit-diagonal `L` as per-step multiplier columns and `U` as per-step
/// off-diagonal rows keyed by basis position.
#[derive(Clone, Debug)]
pub struct Factor {
    num_row: usize,
    pivot_threshold: f64,
    pivot_tolerance: f64,

    // Elimination order, all of length `num_row` after a build.
    pivot_row: Vec<usize>,
    pivot_col: Vec<usize>,
    pivot_value: Vec<f64>,
    /// Inverse of `pivot_row`: original row to elimination step.
    row_step: Vec<usize>,
    /// Per step: `(original_row, multiplier)` entries of the `L` column.
    lower: Vec<Vec<SparseTuple>>,
    /// Per step: `(basis_position, value)` off-diagonal entries of the `U` row.
    upper: Vec<Vec<SparseTuple>>,

    updates: Vec<Eta>,

    rank_deficiency: usize,
    no_pivot_row: Vec<usize>,
    no_pivot_col: Vec<usize>,

    // Synthetic clock: effort of the last build vs. effort spent in updates since.
    build_tick: f64,
    update_tick: f64,

    scratch: Vec<f64>,
    scratch_touched: Vec<usize>,
}

/// One product-form update: the FTRANed entering column, normalized by its pivot element.
#[derive(Clone, Debug)]
struct Eta {
    pivot_position: usize,
    coefficients: Vec<SparseTuple>,
}

impl Factor {
    /// Set up a factor for bases of `num_row` rows.
    ///
    /// # Arguments
    ///
    /// * `pivot_threshold`: Relative Markowitz threshold in `(0, 1]`; candidates must reach
    ///   this fraction of the largest magnitude in their column.
    /// * `pivot_tolerance`: Absolute magnitude below which no value may pivot.
    #[must_use]
    pub fn setup(num_row: usize, pivot_threshold: f64, pivot_tolerance: f64) -> Self {
        debug_assert!(pivot_threshold > 0.0 && pivot_threshold <= 1.0);
        debug_assert!(pivot_tolerance >= 0.0);

        Self {
            num_row,
            pivot_threshold,
            pivot_tolerance,
            pivot_row: Vec::new(),
            pivot_col: Vec::new(),
            pivot_value: Vec::new(),
            row_step: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            updates: Vec::new(),
            rank_deficiency: 0,
            no_pivot_row: Vec::new(),
            no_pivot_col: Vec::new(),
            build_tick: 0.0,
            update_tick: 0.0,
            scratch: vec![0.0; num_row],
            scratch_touched: Vec::new(),
        }
    }

    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Number of product-form updates applied since the last build.
    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    pub fn rank_deficiency(&self) -> usize {
        self.rank_deficiency
    }

    /// Rows that provided no pivot during the last build, paired with `no_pivot_col`.
    pub fn no_pivot_row(&self) -> &[usize] {
        &self.no_pivot_row
    }

    /// Basis positions whose column provided no pivot during the last build.
    pub fn no_pivot_col(&self) -> &[usize] {
        &self.no_pivot_col
    }

    /// Raise or lower the Markowitz threshold, for recovery from numerical trouble.
    pub fn set_pivot_threshold(&mut self, pivot_threshold: f64) {
        debug_assert!(pivot_threshold > 0.0 && pivot_threshold <= 1.0);

        self.pivot_threshold = pivot_threshold;
    }

    /// Factorize `B`, the columns of the augmented matrix named by `basic_index`.
    ///
    /// # Return value
    ///
    /// The rank deficiency encountered: `0` for a nonsingular basis. When positive, the
    /// factor is still invertible (deficient columns were patched with unit columns) and
    /// `no_pivot_row`/`no_pivot_col` describe the patches.
    pub fn build(&mut self, columns: &ColumnMatrix, basic_index: &[usize]) -> usize {
        debug_assert_eq!(basic_index.len(), self.num_row);

        let m = self.num_row;
        self.pivot_row.clear();
        self.pivot_col.clear();
        self.pivot_value.clear();
        self.lower.clear();
        self.upper.clear();
        self.updates.clear();
        self.rank_deficiency = 0;
        self.no_pivot_row.clear();
        self.no_pivot_col.clear();
        self.row_step = vec![usize::MAX; m];
        self.build_tick = m as f64;
        self.update_tick = 0.0;

        // Load the basis columns into an active submatrix.
        let mut gather = WorkVector::new(m);
        let mut cols: Vec<Vec<SparseTuple>> = Vec::with_capacity(m);
        for &var in basic_index {
            gather.clear();
            columns.collect_column(&mut gather, var, 1.0);
            cols.push(gather.to_tuples());
        }
        let mut row_members: Vec<Vec<usize>> = vec![Vec::new(); m];
        let mut row_count = vec![0_usize; m];
        for (position, column) in cols.iter().enumerate() {
            for &(i, _) in column {
                row_members[i].push(position);
                row_count[i] += 1;
            }
            self.build_tick += column.len() as f64;
        }
        let mut col_active = vec![true; m];
        let mut row_active = vec![true; m];

        for _ in 0..m {
            match self.choose_pivot(&cols, &row_count, &col_active) {
                Some((row, position, value)) => {
                    let step = self.pivot_row.len();
                    self.eliminate(
                        row,
                        position,
                        value,
                        &mut cols,
                        &mut row_members,
                        &mut row_count,
                        &mut col_active,
                        &mut row_active,
                    );
                    self.row_step[row] = step;
                },
                None => break,
            }
        }

        // Anything still active is rank deficiency; patch with unit columns so the factor
        // stays invertible. Pairing the k-th unpivoted column with the k-th pivotless row
        // fixes which logical repairs which basis position.
        let remaining_cols: Vec<usize> = (0..m).filter(|&j| col_active[j]).collect();
        let remaining_rows: Vec<usize> = (0..m).filter(|&i| row_active[i]).collect();
        debug_assert_eq!(remaining_cols.len(), remaining_rows.len());
        self.rank_deficiency = remaining_cols.len();
        for (&position, &row) in remaining_cols.iter().zip(&remaining_rows) {
            let step = self.pivot_row.len();
            self.pivot_row.push(row);
            self.pivot_col.push(position);
            self.pivot_value.push(1.0);
            self.lower.push(Vec::new());
            self.upper.push(Vec::new());
            self.row_step[row] = step;
        }
        self.no_pivot_col = remaining_cols;
        self.no_pivot_row = remaining_rows;

        if self.rank_deficiency > 0 {
            debug!(
                "basis factorization is rank deficient: {} of {} pivots missing",
                self.rank_deficiency, m,
            );
        } else {
            trace!(
                "factorized basis of dimension {}: {} lower and {} upper nonzeros",
                m,
                self.lower.iter().map(Vec::len).sum::<usize>(),
                self.upper.iter().map(Vec::len).sum::<usize>(),
            );
        }
        self.rank_deficiency
    }

    /// Markowitz candidate search: among values passing the threshold test relative to their
    /// column's magnitude, minimize `(column count - 1) * (row count - 1)`. The search stops
    /// early once enough eligible columns have been examined, or immediately on a cost of
    /// zero. Ties prefer the larger magnitude.
    fn choose_pivot(
        &self,
        cols: &[Vec<SparseTuple>],
        row_count: &[usize],
        col_active: &[bool],
    ) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        let mut best_cost = usize::MAX;
        let mut best_magnitude = 0.0;
        let mut searched = 0;

        for position in (0..self.num_row).filter(|&j| col_active[j]) {
            let column = &cols[position];
            let magnitude_bound = column
                .iter()
                .map(|&(_, value)| value.abs())
                .fold(0.0, f64::max);
            if magnitude_bound < self.pivot_tolerance {
                continue;
            }
            let tolerance = f64::max(self.pivot_tolerance, self.pivot_threshold * magnitude_bound);

            let mut seen_eligible = false;
            for &(row, value) in column {
                if value.abs() < tolerance {
                    continue;
                }
                seen_eligible = true;
                let cost = (column.len() - 1) * (row_count[row] - 1);
                if cost < best_cost || (cost == best_cost && value.abs() > best_magnitude) {
                    best = Some((row, position, value));
                    best_cost = cost;
                    best_magnitude = value.abs();
                }
            }
            if seen_eligible {
                searched += 1;
                if best_cost == 0 || searched >= MAX_SEARCH {
                    break;
                }
            }
        }

        best
    }

    #[allow(clippy::too_many_arguments)]
    fn eliminate(
        &mut self,
        row: usize,
        position: usize,
        value: f64,
        cols: &mut [Vec<SparseTuple>],
        row_members: &mut [Vec<usize>],
        row_count: &mut [usize],
        col_active: &mut [bool],
        row_active: &mut [bool],
    ) {
        // The L column: multipliers of the pivot column below the pivot.
        let mut multipliers = Vec::new();
        for &(i, v) in &cols[position] {
            if i != row {
                multipliers.push((i, v / value));
                row_count[i] -= 1;
            }
        }

        // The U row: the pivot row's entries in the other active columns. Those entries are
        // final; remove them from the active submatrix and apply the elimination below them.
        let mut upper_row = Vec::new();
        let members = std::mem::take(&mut row_members[row]);
        for other in members {
            if other == position || !col_active[other] {
                continue;
            }
            let column = &mut cols[other];
            let Ok(data_index) = column.binary_search_by_key(&row, |&(i, _)| i) else {
                // Stale membership: the entry cancelled out earlier.
                continue;
            };
            let pivot_row_value = column.remove(data_index).1;
            upper_row.push((other, pivot_row_value));

            for &(i, multiplier) in &multipliers {
                let change = multiplier * pivot_row_value;
                match column.binary_search_by_key(&i, |&(ii, _)| ii) {
                    Ok(at) => {
                        column[at].1 -= change;
                        if column[at].1.abs() <= ELIMINATION_DROP_TOLERANCE {
                            column.remove(at);
                            row_count[i] -= 1;
                        }
                    },
                    Err(at) => {
                        if change.abs() > ELIMINATION_DROP_TOLERANCE {
                            column.insert(at, (i, -change));
                            row_members[i].push(other);
                            row_count[i] += 1;
                        }
                    },
                }
            }
            self.build_tick += (multipliers.len() + 1) as f64;
        }

        col_active[position] = false;
        row_active[row] = false;
        row_count[row] = 0;
        cols[position].clear();

        self.build_tick += multipliers.len() as f64;
        self.pivot_row.push(row);
        self.pivot_col.push(position);
        self.pivot_value.push(value);
        self.lower.push(multipliers);
        self.upper.push(upper_row);
    }

    /// FTRAN: `rhs <- B^-1 rhs`.
    ///
    /// The right-hand side is indexed by row on entry and by basis position on return (the two
    /// coincide as tableau coordinates). `expected_density` decides up front whether index
    /// maintenance is worth the trouble.
    pub fn ftran(&mut self, rhs: &mut WorkVector, expected_density: f64) {
        debug_assert_eq!(rhs.dim(), self.num_row);

        if expected_density > DENSITY_THRESHOLD {
            rhs.set_dense();
        }

        // Forward pass through L. After step k the value at the step's pivot row is final.
        for step in 0..self.pivot_row.len() {
            let y = rhs.get(self.pivot_row[step]);
            if y == 0.0 {
                continue;
            }
            for &(i, multiplier) in &self.lower[step] {
                rhs.add(i, -multiplier * y);
            }
        }

        // Backward pass through U, gathering the result by basis position in the scratch
        // array: writing in place would collide with still-unconsumed forward values.
        debug_assert!(self.scratch_touched.is_empty());
        for step in (0..self.pivot_row.len()).rev() {
            let mut value = rhs.get(self.pivot_row[step]);
            for &(j, w) in &self.upper[step] {
                value -= w * self.scratch[j];
            }
            value /= self.pivot_value[step];
            if value != 0.0 {
                self.scratch[self.pivot_col[step]] = value;
                self.scratch_touched.push(self.pivot_col[step]);
            }
        }
        let dense = rhs.is_dense();
        rhs.clear();
        if dense {
            rhs.set_dense();
        }
        for &j in &self.scratch_touched {
            let value = self.scratch[j];
            self.scratch[j] = 0.0;
            if value.abs() > ELIMINATION_DROP_TOLERANCE {
                rhs.add(j, value);
            }
        }
        self.scratch_touched.clear();

        // Product-form updates, oldest first.
        for eta in &self.updates {
            let y = rhs.get(eta.pivot_position);
            if y == 0.0 {
                continue;
            }
            for &(i, v) in &eta.coefficients {
                rhs.add(i, -v * y);
            }
        }
    }

    /// BTRAN: `rhs <- B^-T rhs`.
    ///
    /// The right-hand side is indexed by basis position on entry and by row on return.
    pub fn btran(&mut self, rhs: &mut WorkVector, expected_density: f64) {
        debug_assert_eq!(rhs.dim(), self.num_row);

        if expected_density > DENSITY_THRESHOLD {
            rhs.set_dense();
        }

        // Product-form updates, newest first.
        for eta in self.updates.iter().rev() {
            let mut dot = 0.0;
            for &(i, v) in &eta.coefficients {
                dot += v * rhs.get(i);
            }
            if dot != 0.0 {
                rhs.add(eta.pivot_position, -dot);
            }
        }

        // Forward pass through U transposed; intermediate values live per step.
        debug_assert!(self.scratch_touched.is_empty());
        for step in 0..self.pivot_row.len() {
            let value = rhs.get(self.pivot_col[step]);
            if value == 0.0 {
                self.scratch[step] = 0.0;
                continue;
            }
            let y = value / self.pivot_value[step];
            self.scratch[step] = y;
            for &(j, w) in &self.upper[step] {
                rhs.add(j, -w * y);
            }
        }

        // Backward pass through L transposed, in place in the scratch array.
        for step in (0..self.pivot_row.len()).rev() {
            let mut value = self.scratch[step];
            for &(i, multiplier) in &self.lower[step] {
                value -= multiplier * self.scratch[self.row_step[i]];
            }
            self.scratch[step] = value;
        }

        let dense = rhs.is_dense();
        rhs.clear();
        if dense {
            rhs.set_dense();
        }
        for step in 0..self.pivot_row.len() {
            let value = self.scratch[step];
            self.scratch[step] = 0.0;
            if value.abs() > ELIMINATION_DROP_TOLERANCE {
                rhs.add(self.pivot_row[step], value);
            }
        }
    }

    /// Apply a product-form update replacing the basis column at position `pivot_position`
    /// with `column`, the FTRANed entering column.
    ///
    /// # Return value
    ///
    /// A hint telling the driver whether continuing to update is still cheaper than a fresh
    /// build.
    pub fn update(&mut self, column: &WorkVector, pivot_position: usize) -> UpdateHint {
        debug_assert!(pivot_position < self.num_row);

        let pivot_value = column.get(pivot_position);
        debug_assert!(pivot_value != 0.0, "pivot element of the entering column must be nonzero");

        let mut coefficients = Vec::new();
        for (i, value) in column.to_tuples() {
            let coefficient = if i == pivot_position {
                (value - 1.0) / pivot_value
            } else {
                value / pivot_value
            };
            if coefficient != 0.0 {
                coefficients.push((i, coefficient));
            }
        }

        self.update_tick += 10.0 + coefficients.len() as f64;
        self.updates.push(Eta { pivot_position, coefficients });

        if self.updates.len() >= SYNTHETIC_CLOCK_MIN_UPDATES && self.update_tick >= self.build_tick
        {
            UpdateHint::Refactor
        } else {
            UpdateHint::Ok
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use crate::algorithm::simplex::factor::Factor;
    use crate::data::linear_algebra::matrix::ColumnMatrix;
    use crate::data::linear_algebra::vector::WorkVector;

    /// 2 x 2 structural matrix [[1, 1], [1, 2]]; variables 2 and 3 are the logicals.
    fn two_by_two() -> ColumnMatrix {
        ColumnMatrix::new(
            2,
            2,
            vec![0, 2, 4],
            vec![0, 1, 0, 1],
            vec![1.0, 1.0, 1.0, 2.0],
        )
    }

    fn solve_ftran(factor: &mut Factor, rhs: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
        let mut v = WorkVector::new(factor.num_row());
        v.fill(&rhs);
        factor.ftran(&mut v, 0.0);
        v.to_tuples()
    }

    fn solve_btran(factor: &mut Factor, rhs: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
        let mut v = WorkVector::new(factor.num_row());
        v.fill(&rhs);
        factor.btran(&mut v, 0.0);
        v.to_tuples()
    }

    #[test]
    fn logical_basis_is_identity() {
        let columns = two_by_two();
        let mut factor = Factor::setup(2, 0.1, 1e-10);
        assert_eq!(factor.build(&columns, &[2, 3]), 0);

        assert_eq!(solve_ftran(&mut factor, vec![(0, 3.0), (1, 5.0)]), vec![(0, 3.0), (1, 5.0)]);
        assert_eq!(solve_btran(&mut factor, vec![(1, 2.0)]), vec![(1, 2.0)]);
    }

    #[test]
    fn structural_basis_solves() {
        let columns = two_by_two();
        let mut factor = Factor::setup(2, 0.1, 1e-10);
        // B = [[1, 1], [1, 2]], B^-1 = [[2, -1], [-1, 1]].
        assert_eq!(factor.build(&columns, &[0, 1]), 0);

        let x = solve_ftran(&mut factor, vec![(0, 1.0), (1, 3.0)]);
        assert_eq!(x.len(), 2);
        assert_abs_diff_eq!(x[0].1, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1].1, 2.0, epsilon = 1e-12);

        // Row 1 of B^-1.
        let pi = solve_btran(&mut factor, vec![(1, 1.0)]);
        assert_eq!(pi.len(), 2);
        assert_abs_diff_eq!(pi[0].1, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pi[1].1, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn mixed_basis_with_logical() {
        let columns = two_by_two();
        let mut factor = Factor::setup(2, 0.1, 1e-10);
        // B = [a_0 | e_1] = [[1, 0], [1, 1]].
        assert_eq!(factor.build(&columns, &[0, 3]), 0);

        let x = solve_ftran(&mut factor, vec![(0, 2.0), (1, 5.0)]);
        // x = (2, 3): 2 * (1,1) + 3 * (0,1) = (2, 5).
        assert_eq!(x.len(), 2);
        assert_abs_diff_eq!(x[0].1, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1].1, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn product_form_update_tracks_rebuild() {
        let columns = two_by_two();

        // Start from the logical basis, then replace position 0 by structural column 1.
        let mut updated = Factor::setup(2, 0.1, 1e-10);
        assert_eq!(updated.build(&columns, &[2, 3]), 0);
        let mut entering = WorkVector::new(2);
        columns.collect_column(&mut entering, 1, 1.0);
        updated.ftran(&mut entering, 0.0);
        updated.update(&entering, 0);
        assert_eq!(updated.update_count(), 1);

        let mut rebuilt = Factor::setup(2, 0.1, 1e-10);
        assert_eq!(rebuilt.build(&columns, &[1, 3]), 0);

        for rhs in [vec![(0, 1.0)], vec![(1, 1.0)], vec![(0, 2.0), (1, -3.0)]] {
            let from_update = solve_ftran(&mut updated, rhs.clone());
            let from_rebuild = solve_ftran(&mut rebuilt, rhs.clone());
            assert_eq!(from_update.len(), from_rebuild.len());
            for (a, b) in from_update.iter().zip(&from_rebuild) {
                assert_eq!(a.0, b.0);
                assert_abs_diff_eq!(a.1, b.1, epsilon = 1e-12);
            }

            let from_update = solve_btran(&mut updated, rhs.clone());
            let from_rebuild = solve_btran(&mut rebuilt, rhs);
            assert_eq!(from_update.len(), from_rebuild.len());
            for (a, b) in from_update.iter().zip(&from_rebuild) {
                assert_eq!(a.0, b.0);
                assert_abs_diff_eq!(a.1, b.1, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn duplicate_columns_report_deficiency() {
        let columns = ColumnMatrix::new(
            2,
            2,
            vec![0, 2, 4],
            vec![0, 1, 0, 1],
            vec![1.0, 1.0, 1.0, 1.0],
        );
        let mut factor = Factor::setup(2, 0.1, 1e-10);
        // Both basis columns are (1, 1): rank 1.
        let deficiency = factor.build(&columns, &[0, 1]);
        assert_eq!(deficiency, 1);
        assert_eq!(factor.no_pivot_row().len(), 1);
        assert_eq!(factor.no_pivot_col().len(), 1);

        // The patched factor is still invertible: the deficient position acts as the logical
        // of the missing pivot row.
        let row = factor.no_pivot_row()[0];
        let x = solve_ftran(&mut factor, vec![(row, 1.0)]);
        assert!(!x.is_empty());
    }

    #[test]
    fn dense_path_matches_sparse_path() {
        let columns = two_by_two();
        let mut factor = Factor::setup(2, 0.1, 1e-10);
        factor.build(&columns, &[0, 1]);

        let mut sparse = WorkVector::new(2);
        sparse.fill(&[(0, 1.0), (1, 3.0)]);
        factor.ftran(&mut sparse, 0.0);

        let mut dense = WorkVector::new(2);
        dense.fill(&[(0, 1.0), (1, 3.0)]);
        factor.ftran(&mut dense, 1.0);
        assert!(dense.is_dense());

        assert_eq!(sparse.to_tuples(), dense.to_tuples());
    }
}
