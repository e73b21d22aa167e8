//! Name expansion for generate scopes and inlined bodies.
//!
//! Unrolling a generate block hoists its declarations into the module, so
//! every declared name is first rewritten to carry the scope prefix
//! (`g[2].n`), every use inside the block is renamed accordingly, and uses
//! of the loop variable are substituted with its current constant value.

use crate::Elaborator;
use std::collections::HashMap;
use tarn_ast::{NodeId, NodeKind};
use tarn_common::Ident;

impl Elaborator<'_> {
    /// Rewrites a declared name to carry a scope prefix.
    ///
    /// The prefix is inserted before the last dotted component, so nested
    /// scopes accumulate left to right: `n` under `g[0].` becomes `g[0].n`,
    /// and `g[0].n` under `h[1].` becomes `g[0].h[1].n`.
    pub(crate) fn prefixed_name(&self, old: Ident, prefix: &str) -> Ident {
        let old_str = self.interner.resolve(old);
        let pos = old_str.rfind('.').map(|p| p + 1).unwrap_or(0);
        let new = format!("{}{}{}", &old_str[..pos], prefix, &old_str[pos..]);
        self.interner.get_or_intern(&new)
    }

    /// Annotates the names of all declarations in a generate scope.
    ///
    /// `index_var` names the loop variable whose uses are substituted with
    /// its current constant (looked up in scope); `prefix` is the scope
    /// prefix ending in `.`; `name_map` carries old-to-new renames downward
    /// and is restored around sibling scopes.
    pub(crate) fn expand_genblock(
        &mut self,
        id: NodeId,
        index_var: Option<Ident>,
        prefix: &str,
        name_map: &mut HashMap<Ident, Ident>,
    ) {
        let node = self.arena.get(id);
        let kind = node.kind;
        let name = node.name;

        if let Some(iv) = index_var {
            if kind == NodeKind::Identifier && name == Some(iv) {
                if let Some(decl) = self.ctx.scope.get(iv) {
                    let value = self.arena.child(decl, 0);
                    let clone = self.arena.clone_subtree(value);
                    self.replace_with(id, clone);
                }
                return;
            }
        }

        if matches!(kind, NodeKind::Identifier | NodeKind::FCall | NodeKind::TCall) {
            if let Some(n) = name {
                if let Some(&new) = name_map.get(&n) {
                    self.arena.get_mut(id).name = Some(new);
                }
            }
        }

        let mut backup: Option<HashMap<Ident, Ident>> = None;
        let children = self.arena.get(id).children.clone();

        for &child in &children {
            let ck = self.arena.kind(child);
            if matches!(
                ck,
                NodeKind::Wire
                    | NodeKind::Memory
                    | NodeKind::Parameter
                    | NodeKind::LocalParam
                    | NodeKind::Function
                    | NodeKind::Task
                    | NodeKind::Cell
            ) {
                if let Some(old) = self.arena.get(child).name {
                    if backup.is_none() {
                        backup = Some(name_map.clone());
                    }
                    let new = self.prefixed_name(old, prefix);
                    name_map.insert(old, new);
                    if ck == NodeKind::Function {
                        // the result wire inside shares the function's name
                        self.rename_in_subtree(child, old, new);
                    } else {
                        self.arena.get_mut(child).name = Some(new);
                    }
                    self.ctx.scope.install(new, child);
                }
            }
        }

        for &child in &children {
            let ck = self.arena.kind(child);
            if !matches!(ck, NodeKind::Function | NodeKind::Task | NodeKind::Prefix) {
                self.expand_genblock(child, index_var, prefix, name_map);
            }
        }

        if let Some(b) = backup {
            *name_map = b;
        }
    }

    /// Renames every node in a subtree whose name matches `from`.
    pub(crate) fn rename_in_subtree(&mut self, id: NodeId, from: Ident, to: Ident) {
        if self.arena.get(id).name == Some(from) {
            self.arena.get_mut(id).name = Some(to);
        }
        let children = self.arena.get(id).children.clone();
        for child in children {
            self.rename_in_subtree(child, from, to);
        }
    }

    /// Renames identifier uses according to `rules` (used when inlining
    /// function and task bodies).
    pub(crate) fn replace_ids(&mut self, id: NodeId, rules: &HashMap<Ident, Ident>) {
        let node = self.arena.get(id);
        if node.kind == NodeKind::Identifier {
            if let Some(n) = node.name {
                if let Some(&new) = rules.get(&n) {
                    self.arena.get_mut(id).name = Some(new);
                }
            }
        }
        let children = self.arena.get(id).children.clone();
        for child in children {
            self.replace_ids(child, rules);
        }
    }

    /// Scans a subtree for constructs only a constant function can contain.
    ///
    /// `while`/`repeat` make constant evaluation mandatory; a `for` makes it
    /// recommended. Function calls are followed through the scope, with a
    /// visited set so recursive functions terminate the scan.
    pub(crate) fn has_const_only_constructs(&self, id: NodeId, recommend: &mut bool) -> bool {
        self.has_const_only_worker(id, recommend, &mut Vec::new())
    }

    fn has_const_only_worker(
        &self,
        id: NodeId,
        recommend: &mut bool,
        visited: &mut Vec<NodeId>,
    ) -> bool {
        let node = self.arena.get(id);
        match node.kind {
            NodeKind::For => *recommend = true,
            NodeKind::While | NodeKind::Repeat => return true,
            NodeKind::FCall => {
                if let Some(n) = node.name {
                    if let Some(decl) = self.ctx.scope.get(n) {
                        if !visited.contains(&decl) {
                            visited.push(decl);
                            if self.has_const_only_worker(decl, recommend, visited) {
                                return true;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        node.children
            .iter()
            .any(|&child| self.has_const_only_worker(child, recommend, visited))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::ElabConfig;
    use crate::Elaborator;
    use std::collections::HashMap;
    use tarn_ast::{AstArena, NodeKind};
    use tarn_common::Interner;
    use tarn_diagnostics::DiagnosticSink;

    struct Fixture {
        arena: AstArena,
        interner: Interner,
        sink: DiagnosticSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arena: AstArena::new(),
                interner: Interner::new(),
                sink: DiagnosticSink::new(),
            }
        }

        fn elab(&mut self) -> Elaborator<'_> {
            Elaborator::new(
                &mut self.arena,
                &self.interner,
                &self.sink,
                ElabConfig::default(),
            )
        }
    }

    #[test]
    fn prefixed_name_inserts_before_last_component() {
        let mut f = Fixture::new();
        let n = f.interner.get_or_intern("n");
        let nested = f.interner.get_or_intern("g[0].n");
        let elab = f.elab();
        assert_eq!(
            elab.interner.resolve(elab.prefixed_name(n, "g[0].")),
            "g[0].n"
        );
        assert_eq!(
            elab.interner.resolve(elab.prefixed_name(nested, "h[1].")),
            "g[0].h[1].n"
        );
    }

    #[test]
    fn expand_renames_declarations_and_uses() {
        let mut f = Fixture::new();
        let n = f.interner.get_or_intern("n");
        let wire = f.arena.node(NodeKind::Wire);
        f.arena.get_mut(wire).name = Some(n);
        let lhs = f.arena.node(NodeKind::Identifier);
        f.arena.get_mut(lhs).name = Some(n);
        let one = f.arena.const_int(1, false, 1);
        let assign = f.arena.node_with(NodeKind::Assign, vec![lhs, one]);
        let block = f.arena.node_with(NodeKind::GenBlock, vec![wire, assign]);

        let mut elab = f.elab();
        let mut map = HashMap::new();
        elab.expand_genblock(block, None, "g[2].", &mut map);

        let expected = f.interner.get("g[2].n").unwrap();
        assert_eq!(f.arena.get(wire).name, Some(expected));
        assert_eq!(f.arena.get(lhs).name, Some(expected));
        // the rename map was restored for siblings
        assert!(map.is_empty());
    }

    #[test]
    fn expand_substitutes_loop_variable() {
        let mut f = Fixture::new();
        let i = f.interner.get_or_intern("i");
        let value = f.arena.const_int(7, true, 32);
        let varbuf = f.arena.node_with(NodeKind::LocalParam, vec![value]);
        f.arena.get_mut(varbuf).name = Some(i);

        let use_id = f.arena.node(NodeKind::Identifier);
        f.arena.get_mut(use_id).name = Some(i);
        let block = f.arena.node_with(NodeKind::GenBlock, vec![use_id]);

        let mut elab = f.elab();
        elab.ctx.scope.install(i, varbuf);
        let mut map = HashMap::new();
        elab.expand_genblock(block, Some(i), "g[7].", &mut map);

        assert_eq!(f.arena.kind(use_id), NodeKind::Constant);
        assert_eq!(f.arena.get(use_id).as_i64(), Some(7));
    }

    #[test]
    fn replace_ids_renames_identifiers_only() {
        let mut f = Fixture::new();
        let a = f.interner.get_or_intern("a");
        let b = f.interner.get_or_intern("b");
        let ident = f.arena.node(NodeKind::Identifier);
        f.arena.get_mut(ident).name = Some(a);
        let wire = f.arena.node(NodeKind::Wire);
        f.arena.get_mut(wire).name = Some(a);
        let block = f.arena.node_with(NodeKind::Block, vec![ident, wire]);

        let mut rules = HashMap::new();
        rules.insert(a, b);
        let mut elab = f.elab();
        elab.replace_ids(block, &rules);

        assert_eq!(f.arena.get(ident).name, Some(b));
        // declarations keep their name
        assert_eq!(f.arena.get(wire).name, Some(a));
    }

    #[test]
    fn const_only_scan() {
        let mut f = Fixture::new();
        let w = f.arena.node(NodeKind::While);
        let block = f.arena.node_with(NodeKind::Block, vec![w]);
        let elab = f.elab();
        let mut recommend = false;
        assert!(elab.has_const_only_constructs(block, &mut recommend));

        let mut f = Fixture::new();
        let fr = f.arena.node(NodeKind::For);
        let block = f.arena.node_with(NodeKind::Block, vec![fr]);
        let elab = f.elab();
        let mut recommend = false;
        assert!(!elab.has_const_only_constructs(block, &mut recommend));
        assert!(recommend);
    }

    #[test]
    fn const_only_scan_follows_calls_and_terminates_on_recursion() {
        let mut f = Fixture::new();
        let fname = f.interner.get_or_intern("f");
        // f's body calls f again
        let call = f.arena.node(NodeKind::FCall);
        f.arena.get_mut(call).name = Some(fname);
        let body = f.arena.node_with(NodeKind::Block, vec![call]);
        let func = f.arena.node_with(NodeKind::Function, vec![body]);
        f.arena.get_mut(func).name = Some(fname);

        let outer_call = f.arena.node(NodeKind::FCall);
        f.arena.get_mut(outer_call).name = Some(fname);

        let mut elab = f.elab();
        elab.ctx.scope.install(fname, func);
        let mut recommend = false;
        // terminates and finds nothing const-only
        assert!(!elab.has_const_only_constructs(outer_call, &mut recommend));
    }
}
