//! The AST representation consumed and rewritten by the Tarn elaborator.
//!
//! A design is a tree of [`AstNode`]s stored in an [`AstArena`] and addressed
//! by stable [`NodeId`] indices. The front-end builds the tree; the
//! elaborator mutates it in place (the arena's `replace` operation swaps a
//! node's content without invalidating IDs held on the recursion stack) until
//! it reaches the simplified form the RTL lowering expects.
//!
//! Ownership is strictly tree-shaped: each node owns its children and its
//! attribute values. The `resolved_target` back-reference from a use to its
//! declaration is a weak index that can be liveness-checked against the
//! arena.

#![warn(missing_docs)]

pub mod arena;
pub mod kind;
pub mod node;

pub use arena::{AstArena, NodeId};
pub use kind::NodeKind;
pub use node::AstNode;
