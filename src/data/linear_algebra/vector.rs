//! # Work vector
//!
//! A fixed-size vector with a dense value array and a list of the indices holding nonzeros.
//! FTRAN, BTRAN and PRICE write their results into values of this type; consumers choose
//! between iterating the index list (hyper-sparse results) and scanning the full array (dense
//! results) based on the fill count.
use std::fmt;

use itertools::Itertools;

use crate::data::linear_algebra::{DENSITY_THRESHOLD, DROP_TOLERANCE, SparseTuple};

/// Scattered vector of fixed dimension.
///
/// The invariant is one-directional: `array[i]` may be nonzero only if `i` appears in
/// `index[..count]`. The index list may contain indices whose value has cancelled to zero.
///
/// Setting `count` to at least the dimension is a sentinel meaning that the index list is
/// meaningless and the array should be scanned in full; `iteration` makes that decision
/// explicit so the sentinel can't be confused with an over-length count by accident.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkVector {
    /// Number of valid entries in `index`, or `>= array.len()` as the dense sentinel.
    count: usize,
    index: Vec<usize>,
    array: Vec<f64>,
}

/// How a consumer should walk a `WorkVector`.
pub enum Iteration<'a> {
    /// Visit the listed indices only.
    Sparse(&'a [usize]),
    /// Scan the entire array.
    Dense(usize),
}

impl WorkVector {
    /// Create a zero vector of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            index: Vec::with_capacity(dim),
            array: vec![0.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.array.len()
    }

    /// Number of listed nonzeros, or the dimension when the result is dense.
    pub fn count(&self) -> usize {
        self.count.min(self.dim())
    }

    /// Whether the index list no longer describes the nonzeros.
    pub fn is_dense(&self) -> bool {
        self.count >= self.array.len()
    }

    /// Fraction of the dimension that holds a listed nonzero.
    pub fn density(&self) -> f64 {
        if self.array.is_empty() {
            return 0.0;
        }
        self.count() as f64 / self.dim() as f64
    }

    /// Whether downstream consumers should take the hyper-sparse path.
    pub fn is_hyper_sparse(&self) -> bool {
        !self.is_dense() && self.density() < DENSITY_THRESHOLD
    }

    /// Reset to the zero vector.
    ///
    /// Only the entries named by the index list are zeroed, unless the dense sentinel is set,
    /// in which case the entire array is wiped.
    pub fn clear(&mut self) {
        if self.is_dense() {
            self.array.iter_mut().for_each(|value| *value = 0.0);
        } else {
            for &i in &self.index {
                self.array[i] = 0.0;
            }
        }
        self.index.clear();
        self.count = 0;
    }

    /// Mark the vector as dense: the index list is abandoned and consumers scan the array.
    pub fn set_dense(&mut self) {
        self.count = self.array.len() + 1;
        self.index.clear();
    }

    /// Add `value` to component `i`, maintaining the index list.
    pub fn add(&mut self, i: usize, value: f64) {
        debug_assert!(i < self.dim());

        if !self.is_dense() && self.array[i] == 0.0 && value != 0.0 {
            self.index.push(i);
            self.count += 1;
        }
        self.array[i] += value;
    }

    /// Add `value` to component `i` without index maintenance.
    ///
    /// Only valid once the dense sentinel is set.
    pub fn add_dense(&mut self, i: usize, value: f64) {
        debug_assert!(self.is_dense());

        self.array[i] += value;
    }

    /// Overwrite component `i`, maintaining the index list.
    pub fn set(&mut self, i: usize, value: f64) {
        debug_assert!(i < self.dim());

        if !self.is_dense() && self.array[i] == 0.0 && value != 0.0 {
            self.index.push(i);
            self.count += 1;
        }
        self.array[i] = value;
    }

    pub fn get(&self, i: usize) -> f64 {
        debug_assert!(i < self.dim());

        self.array[i]
    }

    /// Direct view of the scatter array.
    pub fn values(&self) -> &[f64] {
        &self.array
    }

    /// How this vector should be iterated.
    ///
    /// The sentinel (`count >= dim`) selects the dense scan; a listed result selects its own
    /// index list. Callers must still skip zero values on the sparse path: cancellation may
    /// have zeroed a listed entry.
    pub fn iteration(&self) -> Iteration {
        if self.is_dense() {
            Iteration::Dense(self.dim())
        } else {
            Iteration::Sparse(&self.index[..self.count])
        }
    }

    /// Gather the nonzeros as sorted `(index, value)` tuples, dropping near-zeros.
    #[must_use]
    pub fn to_tuples(&self) -> Vec<SparseTuple> {
        match self.iteration() {
            Iteration::Sparse(indices) => indices
                .iter()
                .map(|&i| (i, self.array[i]))
                .filter(|&(_, value)| value.abs() > DROP_TOLERANCE)
                .sorted_unstable_by_key(|&(i, _)| i)
                .collect(),
            Iteration::Dense(dim) => (0..dim)
                .map(|i| (i, self.array[i]))
                .filter(|&(_, value)| value.abs() > DROP_TOLERANCE)
                .collect(),
        }
    }

    /// Drop listed entries whose value has decayed below the drop tolerance and rebuild the
    /// index list. A dense vector stays dense.
    pub fn tidy(&mut self) {
        if self.is_dense() {
            for value in &mut self.array {
                if value.abs() <= DROP_TOLERANCE {
                    *value = 0.0;
                }
            }
            return;
        }
        let mut kept = 0;
        for position in 0..self.count {
            let i = self.index[position];
            if self.array[i].abs() > DROP_TOLERANCE {
                self.index[kept] = i;
                kept += 1;
            } else {
                self.array[i] = 0.0;
            }
        }
        self.index.truncate(kept);
        self.count = kept;
    }

    /// Rebuild the index list by scanning the array, leaving the vector in hyper-sparse form.
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for i in 0..self.array.len() {
            if self.array[i] != 0.0 {
                self.index.push(i);
            }
        }
        self.count = self.index.len();
    }

    /// Load sorted tuples into a cleared vector.
    ///
    /// # Arguments
    ///
    /// * `tuples`: Index-value pairs with strictly increasing indices below the dimension.
    pub fn fill(&mut self, tuples: &[SparseTuple]) {
        debug_assert!(tuples.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(tuples.iter().all(|&(i, _)| i < self.dim()));
        debug_assert_eq!(self.count, 0);

        for &(i, value) in tuples {
            self.set(i, value);
        }
    }
}

impl fmt::Display for WorkVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (nr_written, (i, value)) in self.to_tuples().into_iter().enumerate() {
            if nr_written > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({} {})", i, value)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use crate::data::linear_algebra::vector::{Iteration, WorkVector};

    #[test]
    fn scatter_and_clear() {
        let mut v = WorkVector::new(5);
        v.add(3, 1.5);
        v.add(1, -2.0);
        v.add(3, 0.5);
        assert_eq!(v.count(), 2);
        assert_eq!(v.get(3), 2.0);
        assert_eq!(v.to_tuples(), vec![(1, -2.0), (3, 2.0)]);

        v.clear();
        assert_eq!(v.count(), 0);
        assert!(v.values().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn dense_sentinel() {
        let mut v = WorkVector::new(4);
        v.set_dense();
        v.add_dense(0, 1.0);
        v.add_dense(2, 3.0);
        assert!(v.is_dense());
        assert!(!v.is_hyper_sparse());
        assert!(matches!(v.iteration(), Iteration::Dense(4)));
        assert_eq!(v.to_tuples(), vec![(0, 1.0), (2, 3.0)]);

        // The full array is wiped even though nothing is listed.
        v.clear();
        assert!(v.values().iter().all(|&x| x == 0.0));
        assert!(!v.is_dense());
    }

    #[test]
    fn tidy_drops_cancelled_entries() {
        let mut v = WorkVector::new(3);
        v.add(0, 1.0);
        v.add(1, 1e-300);
        v.add(0, -1.0);
        assert_eq!(v.count(), 2);
        v.tidy();
        assert_eq!(v.count(), 0);
        assert_eq!(v.get(0), 0.0);
        assert_eq!(v.get(1), 0.0);
    }

    #[test]
    fn density_switch() {
        let mut v = WorkVector::new(10);
        v.add(0, 1.0);
        v.add(1, 1.0);
        v.add(2, 1.0);
        assert!(v.is_hyper_sparse());
        v.add(3, 1.0);
        v.add(4, 1.0);
        assert!(!v.is_hyper_sparse());
    }

    #[test]
    fn rebuild_index_after_dense_writes() {
        let mut v = WorkVector::new(4);
        v.set_dense();
        v.add_dense(1, 2.0);
        v.rebuild_index();
        assert!(!v.is_dense());
        assert_eq!(v.count(), 1);
        assert_eq!(v.to_tuples(), vec![(1, 2.0)]);
    }
}
