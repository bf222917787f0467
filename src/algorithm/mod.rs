//! # Algorithms
//!
//! The revised simplex engine. The solver state bag and its external interface live in
//! `simplex`; the dual and primal drivers are functions over that state.
pub mod simplex;
