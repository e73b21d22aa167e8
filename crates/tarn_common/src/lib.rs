//! Shared foundational types for the Tarn HDL elaboration engine.
//!
//! This crate provides interned identifiers, IEEE 1164 four-state logic
//! values, packed logic vectors, and the bit-accurate constant arithmetic
//! kernel used for compile-time folding.

#![warn(missing_docs)]

pub mod calc;
pub mod ident;
pub mod logic;
pub mod logic_vec;

pub use ident::{Ident, Interner};
pub use logic::Logic;
pub use logic_vec::LogicVec;
