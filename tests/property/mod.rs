//! Property-based tests
//!
//! Uses proptest to check store and parser invariants over random inputs
