//! The AST node record.

use crate::arena::NodeId;
use crate::kind::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tarn_common::{Ident, LogicVec};
use tarn_source::Span;

/// One node of the design tree.
///
/// Everything the elaborator touches is an `AstNode`: declarations,
/// expressions, statements, and processes are distinguished only by
/// [`NodeKind`]. A node owns its `children` and `attributes` subtrees;
/// `resolved_target` is a weak back-reference from a use to the declaration
/// it names, invalidated when the declaration is freed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AstNode {
    /// The node kind.
    pub kind: NodeKind,
    /// Identifier or operator name, if any.
    pub name: Option<Ident>,
    /// Ordered child nodes; ordering is semantically meaningful per kind.
    pub children: Vec<NodeId>,
    /// Attributes attached to this node; values are constant expressions.
    pub attributes: HashMap<Ident, NodeId>,
    /// Bit-vector payload of a `Constant` node (always non-empty there).
    pub value: Option<LogicVec>,
    /// Floating-point payload of a `RealValue` node.
    pub real_value: Option<f64>,
    /// Declared as a register.
    pub is_reg: bool,
    /// Signed wire, parameter, or constant.
    pub is_signed: bool,
    /// Input port flag.
    pub is_input: bool,
    /// Output port flag.
    pub is_output: bool,
    /// Constant originated from a string literal.
    pub is_string: bool,
    /// 1-based port position for ports, 0 otherwise.
    pub port_id: u32,
    /// The range cache below is populated.
    pub range_valid: bool,
    /// Cached left (most significant) range bound.
    pub range_left: i64,
    /// Cached right (least significant) range bound.
    pub range_right: i64,
    /// Fixed-point memo: set once a visit makes no further change,
    /// cleared by any content replacement.
    pub basic_prep: bool,
    /// Weak reference to the declaration this node resolves to.
    pub resolved_target: Option<NodeId>,
    /// Source location of the construct this node came from.
    pub span: Span,
}

impl AstNode {
    /// Creates a node of the given kind with no children and default flags.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            children: Vec::new(),
            attributes: HashMap::new(),
            value: None,
            real_value: None,
            is_reg: false,
            is_signed: false,
            is_input: false,
            is_output: false,
            is_string: false,
            port_id: 0,
            range_valid: false,
            range_left: -1,
            range_right: 0,
            basic_prep: false,
            resolved_target: None,
            span: Span::DUMMY,
        }
    }

    /// Creates a node of the given kind with the given children.
    pub fn with_children(kind: NodeKind, children: Vec<NodeId>) -> Self {
        let mut node = Self::new(kind);
        node.children = children;
        node
    }

    /// Returns the width of the declared range, when the cache is valid.
    pub fn range_width(&self) -> Option<i64> {
        if self.range_valid {
            Some(self.range_left - self.range_right + 1)
        } else {
            None
        }
    }

    /// Returns `true` for constant-valued leaves (`Constant` or `RealValue`).
    pub fn is_const(&self) -> bool {
        matches!(self.kind, NodeKind::Constant | NodeKind::RealValue)
    }

    /// Reads a `Constant` payload as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        self.value.as_ref().and_then(LogicVec::to_u64)
    }

    /// Reads a `Constant` payload as an integer honoring the node's sign flag.
    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_ref().and_then(|v| v.as_i64(self.is_signed))
    }

    /// Reads a constant leaf as a real number: `RealValue` directly,
    /// `Constant` via integer conversion with the given signedness.
    pub fn as_real(&self, signed: bool) -> Option<f64> {
        match self.kind {
            NodeKind::RealValue => self.real_value,
            NodeKind::Constant => self.value.as_ref().map(|v| v.to_real(signed)),
            _ => None,
        }
    }

    /// Reads a `Constant` payload as a boolean (any bit is 1).
    pub fn as_bool(&self) -> bool {
        self.value.as_ref().is_some_and(LogicVec::any_one)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults() {
        let node = AstNode::new(NodeKind::Wire);
        assert_eq!(node.kind, NodeKind::Wire);
        assert!(node.children.is_empty());
        assert!(node.attributes.is_empty());
        assert!(!node.range_valid);
        assert!(!node.basic_prep);
        assert!(node.resolved_target.is_none());
        assert!(node.span.is_dummy());
    }

    #[test]
    fn range_width() {
        let mut node = AstNode::new(NodeKind::Wire);
        assert_eq!(node.range_width(), None);
        node.range_valid = true;
        node.range_left = 7;
        node.range_right = 0;
        assert_eq!(node.range_width(), Some(8));
    }

    #[test]
    fn constant_accessors() {
        let mut node = AstNode::new(NodeKind::Constant);
        node.value = Some(LogicVec::from_i64(-2, 4));
        node.is_signed = true;
        assert!(node.is_const());
        assert_eq!(node.as_i64(), Some(-2));
        assert_eq!(node.as_u64(), Some(14));
        assert!(node.as_bool());
        assert_eq!(node.as_real(true), Some(-2.0));
    }

    #[test]
    fn real_accessor() {
        let mut node = AstNode::new(NodeKind::RealValue);
        node.real_value = Some(2.5);
        assert!(node.is_const());
        assert_eq!(node.as_real(false), Some(2.5));
        assert_eq!(node.as_i64(), None);
    }
}
