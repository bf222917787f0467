//! # Constraint matrix store
//!
//! The coefficient matrix is kept in two orientations. The column-wise form is the ground
//! truth: it serves FTRAN right-hand sides and column-wise PRICE. The row-wise form exists for
//! PRICE only and is restricted to nonbasic columns: each row keeps its nonbasic entries in a
//! leading section that is repartitioned as variables enter and leave the basis, so a
//! hyper-sparse PRICE never touches coefficients of basic columns.
//!
//! Logical columns are not stored; they are unit columns `e_i` and are synthesised where
//! needed.
use crate::data::linear_algebra::DENSITY_THRESHOLD;
use crate::data::linear_algebra::vector::{Iteration, WorkVector};

/// Row-wise PRICE results denser than this abandon index maintenance mid-computation.
pub const ROW_PRICE_SWITCH_DENSITY: f64 = DENSITY_THRESHOLD;
/// Column-wise PRICE is preferred once the BTRAN result is denser than this.
pub const COLUMN_PRICE_DENSITY: f64 = 0.75;

/// Structural columns of the constraint matrix, column-wise.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMatrix {
    num_row: usize,
    num_col: usize,
    start: Vec<usize>,
    index: Vec<usize>,
    value: Vec<f64>,
}

impl ColumnMatrix {
    /// Create a column-wise store from compressed sparse column data.
    ///
    /// # Arguments
    ///
    /// * `start`: Offsets into `index`/`value` per column, of length `num_col + 1`.
    /// * `index`: Row indices, strictly increasing within a column.
    /// * `value`: Coefficients, parallel to `index`.
    #[must_use]
    pub fn new(
        num_row: usize,
        num_col: usize,
        start: Vec<usize>,
        index: Vec<usize>,
        value: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(start.len(), num_col + 1);
        debug_assert_eq!(index.len(), value.len());
        debug_assert_eq!(*start.last().unwrap(), index.len());
        debug_assert!(start.windows(2).all(|w| w[0] <= w[1]));
        debug_assert!(index.iter().all(|&i| i < num_row));
        debug_assert!((0..num_col).all(|j| {
            index[start[j]..start[j + 1]].windows(2).all(|w| w[0] < w[1])
        }));

        Self { num_row, num_col, start, index, value }
    }

    pub fn num_row(&self) -> usize {
        self.num_row
    }

    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// Row indices and values of structural column `j`.
    pub fn column(&self, j: usize) -> (&[usize], &[f64]) {
        debug_assert!(j < self.num_col);

        let range = self.start[j]..self.start[j + 1];
        (&self.index[range.clone()], &self.value[range])
    }

    /// Add `multiplier` times the augmented column of variable `var` into `dst`.
    ///
    /// Logical variables contribute `multiplier` on their row: the augmented system is
    /// `Ax + s = 0` with the logical bounds negated and swapped.
    pub fn collect_column(&self, dst: &mut WorkVector, var: usize, multiplier: f64) {
        debug_assert!(var < self.num_col + self.num_row);

        if var < self.num_col {
            let (index, value) = self.column(var);
            for (&i, &v) in index.iter().zip(value) {
                dst.add(i, multiplier * v);
            }
        } else {
            dst.add(var - self.num_col, multiplier);
        }
    }

    /// Column-wise PRICE: `row_ap[j] <- column_j . row_ep` for every structural column.
    ///
    /// The result is dense and includes components for basic columns; those are meaningless
    /// (the columns are in the basis) and the caller zeroes them.
    pub fn price_by_column(&self, row_ap: &mut WorkVector, row_ep: &WorkVector) {
        debug_assert_eq!(row_ap.dim(), self.num_col);
        debug_assert_eq!(row_ep.dim(), self.num_row);

        row_ap.clear();
        row_ap.set_dense();
        let pi = row_ep.values();
        for j in 0..self.num_col {
            let (index, value) = self.column(j);
            let mut dot = 0.0;
            for (&i, &v) in index.iter().zip(value) {
                dot += v * pi[i];
            }
            if dot != 0.0 {
                row_ap.add_dense(j, dot);
            }
        }
    }
}

/// Row-wise view of the structural columns, partitioned by basis membership.
///
/// Per row, entries in `[start[i], split[i])` belong to nonbasic columns and entries in
/// `[split[i], start[i + 1])` to basic columns. The partition is maintained by swaps on every
/// basis change, so no allocation happens during the solve.
#[derive(Clone, Debug)]
pub struct RowMatrix {
    start: Vec<usize>,
    split: Vec<usize>,
    index: Vec<usize>,
    value: Vec<f64>,
}

impl RowMatrix {
    /// Build the row-wise view.
    ///
    /// # Arguments
    ///
    /// * `nonbasic_flag`: Per augmented variable, nonzero iff the variable is nonbasic; only
    ///   the structural prefix is inspected.
    #[must_use]
    pub fn new(columns: &ColumnMatrix, nonbasic_flag: &[i8]) -> Self {
        debug_assert!(nonbasic_flag.len() >= columns.num_col);

        let num_row = columns.num_row;
        let mut counts = vec![0; num_row];
        for &i in &columns.index {
            counts[i] += 1;
        }
        let mut start = Vec::with_capacity(num_row + 1);
        start.push(0);
        for i in 0..num_row {
            start.push(start[i] + counts[i]);
        }
        let nnz = *start.last().unwrap();
        let mut index = vec![0; nnz];
        let mut value = vec![0.0; nnz];

        // Nonbasic entries fill forward from the row start, basic entries backward from the
        // row end; a reversal of the basic section keeps both sections column-ordered.
        let mut front: Vec<usize> = start[..num_row].to_vec();
        let mut back: Vec<usize> = start[1..].to_vec();
        for j in 0..columns.num_col {
            let (rows, values) = columns.column(j);
            for (&i, &v) in rows.iter().zip(values) {
                if nonbasic_flag[j] != 0 {
                    index[front[i]] = j;
                    value[front[i]] = v;
                    front[i] += 1;
                } else {
                    back[i] -= 1;
                    index[back[i]] = j;
                    value[back[i]] = v;
                }
            }
        }
        let split = front;
        for i in 0..num_row {
            index[split[i]..start[i + 1]].reverse();
            value[split[i]..start[i + 1]].reverse();
        }

        Self { start, split, index, value }
    }

    /// Move a structural variable's entries into the basic sections of its rows.
    pub fn to_basic(&mut self, var: usize, columns: &ColumnMatrix) {
        debug_assert!(var < columns.num_col());

        let (rows, _) = columns.column(var);
        for &i in rows {
            let section = self.start[i]..self.split[i];
            let position = self.index[section.clone()]
                .iter()
                .position(|&j| j == var)
                .map(|offset| section.start + offset);
            debug_assert!(position.is_some(), "entering variable must be in the nonbasic section");
            if let Some(position) = position {
                self.split[i] -= 1;
                self.index.swap(position, self.split[i]);
                self.value.swap(position, self.split[i]);
            }
        }
    }

    /// Move a structural variable's entries into the nonbasic sections of its rows.
    pub fn to_nonbasic(&mut self, var: usize, columns: &ColumnMatrix) {
        debug_assert!(var < columns.num_col());

        let (rows, _) = columns.column(var);
        for &i in rows {
            let section = self.split[i]..self.start[i + 1];
            let position = self.index[section.clone()]
                .iter()
                .position(|&j| j == var)
                .map(|offset| section.start + offset);
            debug_assert!(position.is_some(), "leaving variable must be in the basic section");
            if let Some(position) = position {
                self.index.swap(position, self.split[i]);
                self.value.swap(position, self.split[i]);
                self.split[i] += 1;
            }
        }
    }

    /// Hyper-sparse row-wise PRICE: `row_ap <- A' row_ep` over nonbasic structural columns.
    pub fn price(&self, row_ap: &mut WorkVector, row_ep: &WorkVector) {
        row_ap.clear();
        self.price_rows(row_ap, row_ep, f64::INFINITY);
    }

    /// Row-wise PRICE that starts hyper-sparse and abandons index maintenance once the result
    /// density passes `switch_density`.
    pub fn price_with_switch(
        &self,
        row_ap: &mut WorkVector,
        row_ep: &WorkVector,
        switch_density: f64,
    ) {
        row_ap.clear();
        self.price_rows(row_ap, row_ep, switch_density);
    }

    fn price_rows(&self, row_ap: &mut WorkVector, row_ep: &WorkVector, switch_density: f64) {
        let scatter = |row_ap: &mut WorkVector, this: &Self, i: usize, pi: f64| {
            for position in this.start[i]..this.split[i] {
                row_ap.add(this.index[position], pi * this.value[position]);
            }
        };
        let scatter_dense = |row_ap: &mut WorkVector, this: &Self, i: usize, pi: f64| {
            for position in this.start[i]..this.split[i] {
                row_ap.add_dense(this.index[position], pi * this.value[position]);
            }
        };

        match row_ep.iteration() {
            Iteration::Sparse(indices) => {
                let mut remaining = indices.iter();
                for &i in remaining.by_ref() {
                    let pi = row_ep.get(i);
                    if pi == 0.0 {
                        continue;
                    }
                    scatter(row_ap, self, i, pi);
                    if row_ap.density() > switch_density {
                        row_ap.set_dense();
                        break;
                    }
                }
                for &i in remaining {
                    let pi = row_ep.get(i);
                    if pi != 0.0 {
                        scatter_dense(row_ap, self, i, pi);
                    }
                }
            },
            Iteration::Dense(dim) => {
                row_ap.set_dense();
                for i in 0..dim {
                    let pi = row_ep.get(i);
                    if pi != 0.0 {
                        scatter_dense(row_ap, self, i, pi);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use crate::data::linear_algebra::matrix::{ColumnMatrix, RowMatrix};
    use crate::data::linear_algebra::vector::WorkVector;

    /// 2 x 3 matrix [[1, 0, 2], [3, 4, 0]].
    fn small_matrix() -> ColumnMatrix {
        ColumnMatrix::new(
            2,
            3,
            vec![0, 2, 3, 4],
            vec![0, 1, 1, 0],
            vec![1.0, 3.0, 4.0, 2.0],
        )
    }

    #[test]
    fn collect_structural_and_logical_columns() {
        let matrix = small_matrix();
        let mut dst = WorkVector::new(2);
        matrix.collect_column(&mut dst, 0, 2.0);
        assert_eq!(dst.to_tuples(), vec![(0, 2.0), (1, 6.0)]);

        dst.clear();
        matrix.collect_column(&mut dst, 4, 3.0);
        assert_eq!(dst.to_tuples(), vec![(1, 3.0)]);
    }

    #[test]
    fn row_price_matches_column_price() {
        let matrix = small_matrix();
        let all_nonbasic = vec![1i8; 5];
        let rows = RowMatrix::new(&matrix, &all_nonbasic);

        let mut row_ep = WorkVector::new(2);
        row_ep.add(0, 1.0);
        row_ep.add(1, -1.0);

        let mut by_row = WorkVector::new(3);
        rows.price(&mut by_row, &row_ep);
        let mut by_column = WorkVector::new(3);
        matrix.price_by_column(&mut by_column, &row_ep);

        assert_eq!(by_row.to_tuples(), by_column.to_tuples());
        assert_eq!(by_row.to_tuples(), vec![(0, -2.0), (1, -4.0), (2, 2.0)]);
    }

    #[test]
    fn partition_follows_basis_changes() {
        let matrix = small_matrix();
        let all_nonbasic = vec![1i8; 5];
        let mut rows = RowMatrix::new(&matrix, &all_nonbasic);

        rows.to_basic(0, &matrix);
        let mut row_ep = WorkVector::new(2);
        row_ep.add(0, 1.0);
        row_ep.add(1, 1.0);
        let mut row_ap = WorkVector::new(3);
        rows.price(&mut row_ap, &row_ep);
        // Column 0 is basic, so it no longer shows up in the priced row.
        assert_eq!(row_ap.to_tuples(), vec![(1, 4.0), (2, 2.0)]);

        rows.to_nonbasic(0, &matrix);
        rows.price(&mut row_ap, &row_ep);
        assert_eq!(row_ap.to_tuples(), vec![(0, 4.0), (1, 4.0), (2, 2.0)]);
    }

    #[test]
    fn price_switch_goes_dense_mid_computation() {
        let matrix = small_matrix();
        let all_nonbasic = vec![1i8; 5];
        let rows = RowMatrix::new(&matrix, &all_nonbasic);

        let mut row_ep = WorkVector::new(2);
        row_ep.add(0, 1.0);
        row_ep.add(1, 1.0);
        let mut row_ap = WorkVector::new(3);
        rows.price_with_switch(&mut row_ap, &row_ep, 0.0);
        assert!(row_ap.is_dense());
        assert_eq!(row_ap.to_tuples(), vec![(0, 4.0), (1, 4.0), (2, 2.0)]);
    }
}
