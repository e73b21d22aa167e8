//! Slotted arena storage for AST nodes with stable IDs.

use crate::kind::NodeKind;
use crate::node::AstNode;
use serde::{Deserialize, Serialize};
use tarn_common::LogicVec;

/// Opaque, copyable index of a node in an [`AstArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// The arena owning every node of a design tree.
///
/// Slots are tombstoned rather than reused when a subtree is freed, so a
/// [`NodeId`] is stable for the lifetime of the arena and a stale weak
/// reference (such as `resolved_target`) can be detected with
/// [`is_alive`](Self::is_alive). The elaborator rewrites nodes with
/// [`replace`](Self::replace), which swaps a node's content while keeping
/// its ID valid for callers higher up the recursion stack.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AstArena {
    slots: Vec<Option<AstNode>>,
}

impl AstArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Allocates a node and returns its ID.
    pub fn alloc(&mut self, node: AstNode) -> NodeId {
        let id = NodeId::from_raw(self.slots.len() as u32);
        self.slots.push(Some(node));
        id
    }

    /// Returns the number of live nodes.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if the ID refers to a node that has not been freed.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.slots
            .get(id.as_raw() as usize)
            .is_some_and(Option::is_some)
    }

    /// Returns a reference to the node with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds or the node has been freed.
    pub fn get(&self, id: NodeId) -> &AstNode {
        self.slots[id.as_raw() as usize]
            .as_ref()
            .expect("access to freed AST node")
    }

    /// Returns a mutable reference to the node with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds or the node has been freed.
    pub fn get_mut(&mut self, id: NodeId) -> &mut AstNode {
        self.slots[id.as_raw() as usize]
            .as_mut()
            .expect("access to freed AST node")
    }

    /// Returns the child at `index` of the given node.
    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.get(id).children[index]
    }

    /// Returns the kind of the given node.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.get(id).kind
    }

    /// Removes a node from its slot, leaving a tombstone.
    ///
    /// The node's children stay alive; the caller takes over ownership of
    /// their IDs.
    pub fn take(&mut self, id: NodeId) -> AstNode {
        self.slots[id.as_raw() as usize]
            .take()
            .expect("take of freed AST node")
    }

    /// Swaps new content into an existing node, keeping its ID.
    ///
    /// The node's previous child and attribute subtrees are freed; the
    /// fixed-point memo of the new content is cleared so the node is
    /// revisited.
    pub fn replace(&mut self, id: NodeId, mut node: AstNode) {
        let old = self.take(id);
        for child in old.children {
            self.free(child);
        }
        for (_, attr) in old.attributes {
            self.free(attr);
        }
        node.basic_prep = false;
        self.slots[id.as_raw() as usize] = Some(node);
    }

    /// Recursively frees a subtree, tombstoning every slot.
    pub fn free(&mut self, id: NodeId) {
        let node = self.take(id);
        for child in node.children {
            self.free(child);
        }
        for (_, attr) in node.attributes {
            self.free(attr);
        }
    }

    /// Frees all child subtrees of a node and clears its child list.
    pub fn free_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.get_mut(id).children);
        for child in children {
            self.free(child);
        }
    }

    /// Detaches the child list of a node without freeing the subtrees.
    pub fn detach_children(&mut self, id: NodeId) -> Vec<NodeId> {
        std::mem::take(&mut self.get_mut(id).children)
    }

    /// Appends a child to a node.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.get_mut(parent).children.push(child);
    }

    /// Inserts a child at `index`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.get_mut(parent).children.insert(index, child);
    }

    /// Detaches and returns the child at `index` without freeing it.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        self.get_mut(parent).children.remove(index)
    }

    /// Deep-clones a subtree, returning the root of the copy.
    ///
    /// Cloned nodes have their `resolved_target` cleared: a clone is about
    /// to be spliced into a new context and must be re-resolved there.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let mut node = self.get(id).clone();
        node.resolved_target = None;
        let children = std::mem::take(&mut node.children);
        let attributes = std::mem::take(&mut node.attributes);
        node.children = children
            .into_iter()
            .map(|child| self.clone_subtree(child))
            .collect();
        node.attributes = attributes
            .into_iter()
            .map(|(name, attr)| (name, self.clone_subtree(attr)))
            .collect();
        self.alloc(node)
    }

    /// Structural equality of two subtrees.
    ///
    /// Compares kinds, names, payloads, flags, and children recursively;
    /// ignores spans, range caches, fixed-point memos, and weak references.
    pub fn structurally_equal(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (self.get(a), self.get(b));
        if na.kind != nb.kind
            || na.name != nb.name
            || na.value != nb.value
            || na.real_value != nb.real_value
            || na.is_reg != nb.is_reg
            || na.is_signed != nb.is_signed
            || na.is_input != nb.is_input
            || na.is_output != nb.is_output
            || na.is_string != nb.is_string
            || na.port_id != nb.port_id
            || na.children.len() != nb.children.len()
            || na.attributes.len() != nb.attributes.len()
        {
            return false;
        }
        for (&ca, &cb) in na.children.iter().zip(&nb.children) {
            if !self.structurally_equal(ca, cb) {
                return false;
            }
        }
        for (name, &va) in &na.attributes {
            match nb.attributes.get(name) {
                Some(&vb) if self.structurally_equal(va, vb) => {}
                _ => return false,
            }
        }
        true
    }

    /// Allocates a bare node of the given kind.
    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        self.alloc(AstNode::new(kind))
    }

    /// Allocates a node of the given kind with the given children.
    pub fn node_with(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.alloc(AstNode::with_children(kind, children))
    }

    /// Allocates an integer `Constant` in two's complement.
    ///
    /// A negative `width` means the default integer width of 32 bits.
    pub fn const_int(&mut self, value: i64, signed: bool, width: i32) -> NodeId {
        let width = if width < 0 { 32 } else { width as u32 };
        self.const_bits(LogicVec::from_i64(value, width), signed)
    }

    /// Allocates a `Constant` from a bit pattern.
    pub fn const_bits(&mut self, bits: LogicVec, signed: bool) -> NodeId {
        let mut node = AstNode::new(NodeKind::Constant);
        node.value = Some(bits);
        node.is_signed = signed;
        self.alloc(node)
    }

    /// Allocates a string-flavored `Constant` from a bit pattern.
    pub fn const_str(&mut self, bits: LogicVec) -> NodeId {
        let mut node = AstNode::new(NodeKind::Constant);
        node.value = Some(bits);
        node.is_string = true;
        self.alloc(node)
    }

    /// Allocates a `RealValue` node.
    pub fn real_value(&mut self, value: f64) -> NodeId {
        let mut node = AstNode::new(NodeKind::RealValue);
        node.real_value = Some(value);
        self.alloc(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_common::Logic;

    #[test]
    fn alloc_and_get() {
        let mut arena = AstArena::new();
        let id = arena.node(NodeKind::Module);
        assert_eq!(arena.get(id).kind, NodeKind::Module);
        assert!(arena.is_alive(id));
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn free_tombstones_recursively() {
        let mut arena = AstArena::new();
        let child = arena.node(NodeKind::Constant);
        let parent = arena.node_with(NodeKind::Range, vec![child]);
        arena.free(parent);
        assert!(!arena.is_alive(parent));
        assert!(!arena.is_alive(child));
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn replace_keeps_id_and_frees_old_children() {
        let mut arena = AstArena::new();
        let child = arena.const_int(1, false, 8);
        let id = arena.node_with(NodeKind::Add, vec![child]);
        arena.get_mut(id).basic_prep = true;

        let replacement = AstNode::new(NodeKind::Constant);
        arena.replace(id, replacement);

        assert!(arena.is_alive(id));
        assert!(!arena.is_alive(child));
        assert_eq!(arena.get(id).kind, NodeKind::Constant);
        // the memo is cleared so the node is revisited
        assert!(!arena.get(id).basic_prep);
    }

    #[test]
    fn take_leaves_children_alive() {
        let mut arena = AstArena::new();
        let child = arena.node(NodeKind::Identifier);
        let id = arena.node_with(NodeKind::Pos, vec![child]);
        let node = arena.take(id);
        assert!(!arena.is_alive(id));
        assert!(arena.is_alive(child));
        assert_eq!(node.children, vec![child]);
    }

    #[test]
    fn clone_subtree_is_deep_and_clears_targets() {
        let mut arena = AstArena::new();
        let decl = arena.node(NodeKind::Wire);
        let inner = arena.const_int(3, false, 4);
        let root = arena.node_with(NodeKind::Range, vec![inner]);
        arena.get_mut(root).resolved_target = Some(decl);

        let copy = arena.clone_subtree(root);
        assert_ne!(copy, root);
        assert!(arena.get(copy).resolved_target.is_none());
        let copy_child = arena.child(copy, 0);
        assert_ne!(copy_child, inner);
        assert_eq!(arena.get(copy_child).as_i64(), Some(3));
        // mutating the copy leaves the original untouched
        arena.get_mut(copy_child).value = Some(LogicVec::from_i64(9, 4));
        assert_eq!(arena.get(inner).as_i64(), Some(3));
    }

    #[test]
    fn structural_equality() {
        let mut arena = AstArena::new();
        let a1 = arena.const_int(5, false, 8);
        let a = arena.node_with(NodeKind::Pos, vec![a1]);
        let b1 = arena.const_int(5, false, 8);
        let b = arena.node_with(NodeKind::Pos, vec![b1]);
        let c1 = arena.const_int(6, false, 8);
        let c = arena.node_with(NodeKind::Pos, vec![c1]);

        assert!(arena.structurally_equal(a, b));
        assert!(!arena.structurally_equal(a, c));
    }

    #[test]
    fn const_constructors() {
        let mut arena = AstArena::new();
        let neg = arena.const_int(-1, true, 4);
        assert_eq!(format!("{}", arena.get(neg).value.as_ref().unwrap()), "1111");
        assert!(arena.get(neg).is_signed);

        let default_width = arena.const_int(7, false, -1);
        assert_eq!(arena.get(default_width).value.as_ref().unwrap().width(), 32);

        let s = arena.const_str(LogicVec::from_u64(0x41, 8));
        assert!(arena.get(s).is_string);

        let r = arena.real_value(1.5);
        assert_eq!(arena.get(r).real_value, Some(1.5));
    }

    #[test]
    fn child_list_editing() {
        let mut arena = AstArena::new();
        let parent = arena.node(NodeKind::Block);
        let a = arena.node(NodeKind::AssignEq);
        let b = arena.node(NodeKind::AssignLe);
        arena.add_child(parent, a);
        arena.insert_child(parent, 0, b);
        assert_eq!(arena.get(parent).children, vec![b, a]);
        let removed = arena.remove_child(parent, 0);
        assert_eq!(removed, b);
        assert!(arena.is_alive(b));
        assert_eq!(arena.get(parent).children, vec![a]);
    }

    #[test]
    fn detach_children() {
        let mut arena = AstArena::new();
        let a = arena.node(NodeKind::Identifier);
        let parent = arena.node_with(NodeKind::Concat, vec![a]);
        let detached = arena.detach_children(parent);
        assert_eq!(detached, vec![a]);
        assert!(arena.get(parent).children.is_empty());
        assert!(arena.is_alive(a));
    }

    #[test]
    fn attribute_subtrees_freed_with_node() {
        let mut arena = AstArena::new();
        let attr_val = arena.const_int(1, false, 1);
        let id = arena.node(NodeKind::Memory);
        let name = tarn_common::Ident::from_raw(0);
        arena.get_mut(id).attributes.insert(name, attr_val);
        arena.free(id);
        assert!(!arena.is_alive(attr_val));
    }

    #[test]
    fn logic_vec_payload_roundtrip() {
        let mut arena = AstArena::new();
        let mut bits = LogicVec::new(2);
        bits.set(0, Logic::X);
        bits.set(1, Logic::One);
        let id = arena.const_bits(bits.clone(), false);
        assert_eq!(arena.get(id).value.as_ref(), Some(&bits));
        assert!(arena.get(id).as_bool());
        assert_eq!(arena.get(id).as_u64(), None);
    }
}
