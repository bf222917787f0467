//! # Linear program representations
//!
//! The canonical form consumed by the solver core, the building-block enums used to describe
//! programs and bases, and the solution type handed back to the caller.
pub mod canonical_form;
pub mod elements;
pub mod solution;
