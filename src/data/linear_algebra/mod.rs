//! # Linear algebra primitives
//!
//! The work vector every FTRAN, BTRAN and PRICE result lives in, and the constraint matrix
//! store offering both orientations of the coefficient data.
pub mod matrix;
pub mod vector;

/// Inner value for sparse data structures: an index paired with a coefficient.
pub type SparseTuple = (usize, f64);

/// Above this fill fraction a result vector is treated as dense by downstream consumers.
pub const DENSITY_THRESHOLD: f64 = 0.4;

/// Coefficients with magnitude below this value are dropped when results are gathered.
pub const DROP_TOLERANCE: f64 = 1e-14;
