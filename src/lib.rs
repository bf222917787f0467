//! # A revised simplex linear program solver
//!
//! Linear programs of the form `minimize c'x subject to L <= Ax <= U, l <= x <= u` are solved
//! with the revised simplex method: a basis matrix drawn from the constraint matrix (augmented
//! with logical columns) is factorized, updated in product form as the algorithm pivots between
//! adjacent vertices, and periodically refactorized. Both a dual and a primal driver are
//! provided; the dual driver is the workhorse and the primal driver doubles as the cleanup and
//! disambiguation pass.
//!
//! The crate expects a presolved, scaled linear program in canonical form; reading of problem
//! files, presolve and postsolve are the responsibility of the caller.
pub mod algorithm;
pub mod data;
