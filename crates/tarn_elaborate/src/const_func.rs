//! Constant function evaluation.
//!
//! Functions called where a constant is required (or whose bodies contain
//! constant-only constructs) are interpreted instead of inlined: the cloned
//! body runs as a work queue of statements against a table of variable
//! values, and the final value of the variable sharing the function's name
//! becomes the call's constant result.
//!
//! Evaluation is bounded by a step budget so a non-terminating loop in a
//! constant function fails loudly instead of hanging elaboration.

use crate::errors::{self, ElabResult};
use crate::simplify::SimplifyArgs;
use crate::Elaborator;
use std::collections::HashMap;
use tarn_ast::{NodeId, NodeKind};
use tarn_common::{Ident, LogicVec};
use tarn_source::Span;

/// Work-queue items consumed before evaluation gives up.
const STEP_BUDGET: usize = 100_000;

/// The value of one function-local variable.
struct VarInfo {
    value: LogicVec,
    /// Bit offset of the declared range's low end.
    offset: i64,
    is_signed: bool,
}

impl Elaborator<'_> {
    /// Evaluates a cloned function body against constant arguments.
    ///
    /// `decl` is a scratch clone of the function declaration (freed by the
    /// caller); `fcall` is the call site providing arguments and the span
    /// used in diagnostics. Returns the constant result node.
    pub(crate) fn eval_const_function(
        &mut self,
        decl: NodeId,
        fcall: NodeId,
    ) -> ElabResult<NodeId> {
        let call_span = self.arena.get(fcall).span;
        let fname = self
            .arena
            .get(decl)
            .name
            .expect("function declaration without a name");

        let mut variables: HashMap<Ident, VarInfo> = HashMap::new();
        let mut scope_backups: Vec<(Ident, Option<NodeId>)> = Vec::new();
        let mut block: Option<NodeId> = None;
        let mut loose: Vec<NodeId> = Vec::new();
        let mut arg_index = 0usize;

        let call_args = self.arena.get(fcall).children.clone();
        let decl_children = self.arena.get(decl).children.clone();
        for child in decl_children {
            match self.arena.kind(child) {
                NodeKind::Block => {
                    assert!(block.is_none(), "function with two statement blocks");
                    block = Some(child);
                }
                NodeKind::Wire => {
                    self.simplify_loop(child, SimplifyArgs::const_param(1))?;
                    let node = self.arena.get(child);
                    let span = node.span;
                    if !node.range_valid {
                        let what = format!(
                            "cannot determine size of variable `{}`",
                            self.name_str(child)
                        );
                        return Err(self.fatal(errors::error_const_func_access(
                            &what, span, call_span,
                        )));
                    }
                    let width = (node.range_left - node.range_right).unsigned_abs() + 1;
                    let offset = node.range_left.min(node.range_right);
                    let is_signed = node.is_signed;
                    let is_input = node.is_input;
                    let name = node.name.expect("unnamed function variable");

                    let mut value = LogicVec::all_x(width as u32);
                    if is_input && arg_index < call_args.len() {
                        let arg = self.arena.get(call_args[arg_index]);
                        arg_index += 1;
                        value = arg
                            .value
                            .as_ref()
                            .expect("non-constant argument after folding")
                            .extended(width as u32, false);
                    }
                    variables.insert(
                        name,
                        VarInfo {
                            value,
                            offset,
                            is_signed,
                        },
                    );
                    scope_backups.push((name, self.ctx.scope.install(name, child)));
                }
                _ => loose.push(child),
            }
        }
        let block = match block {
            Some(b) => b,
            None => {
                let clones: Vec<NodeId> = loose
                    .iter()
                    .map(|&stmt| self.arena.clone_subtree(stmt))
                    .collect();
                self.arena.node_with(NodeKind::Block, clones)
            }
        };

        let result = self.run_const_function(block, &mut variables, call_span);

        for (name, old) in scope_backups {
            self.ctx.scope.restore_one(name, old);
        }

        result?;
        let info = variables
            .get(&fname)
            .expect("function result variable vanished");
        Ok(self.arena.const_bits(info.value.clone(), info.is_signed))
    }

    /// The statement work queue.
    fn run_const_function(
        &mut self,
        block: NodeId,
        variables: &mut HashMap<Ident, VarInfo>,
        call_span: Span,
    ) -> ElabResult<()> {
        let mut steps = 0usize;
        while !self.arena.get(block).children.is_empty() {
            steps += 1;
            if steps > STEP_BUDGET {
                return Err(self.fatal(errors::error_const_func_budget(
                    "constant function",
                    call_span,
                )));
            }
            let stmt = self.arena.child(block, 0);
            let span = self.arena.get(stmt).span;
            match self.arena.kind(stmt) {
                NodeKind::AssignEq => {
                    let rhs = self.arena.child(stmt, 1);
                    self.replace_variables(rhs, variables, call_span)?;
                    self.simplify_loop(stmt, SimplifyArgs::const_param(1))?;
                    if self.arena.kind(stmt) != NodeKind::AssignEq {
                        // the assignment was rewritten into another shape;
                        // reprocess it from the queue head
                        continue;
                    }
                    self.apply_const_assign(stmt, variables, call_span)?;
                    self.arena.remove_child(block, 0);
                    self.arena.free(stmt);
                }

                NodeKind::For => {
                    // rewrite into init-then-while with the step appended to
                    // the body
                    let mut children = self.arena.detach_children(stmt);
                    assert_eq!(children.len(), 4, "for loop without four children");
                    let body = children.pop().expect("checked above");
                    let step = children.pop().expect("checked above");
                    let cond = children.pop().expect("checked above");
                    let init = children.pop().expect("checked above");
                    self.arena.add_child(body, step);
                    {
                        let node = self.arena.get_mut(stmt);
                        node.kind = NodeKind::While;
                        node.children = vec![cond, body];
                    }
                    self.arena.insert_child(block, 0, init);
                }

                NodeKind::While => {
                    let cond_src = self.arena.child(stmt, 0);
                    let cond = self.arena.clone_subtree(cond_src);
                    self.replace_variables(cond, variables, call_span)?;
                    self.simplify_loop(cond, SimplifyArgs::const_param(1))?;
                    if self.arena.kind(cond) != NodeKind::Constant {
                        return Err(self.fatal(errors::error_const_func_not_constant(
                            span, call_span,
                        )));
                    }
                    let go = self.arena.get(cond).as_bool();
                    self.arena.free(cond);
                    if go {
                        let body = self.arena.child(stmt, 1);
                        let body_clone = self.arena.clone_subtree(body);
                        self.arena.insert_child(block, 0, body_clone);
                    } else {
                        self.arena.remove_child(block, 0);
                        self.arena.free(stmt);
                    }
                }

                NodeKind::Repeat => {
                    let count_src = self.arena.child(stmt, 0);
                    let count = self.arena.clone_subtree(count_src);
                    self.replace_variables(count, variables, call_span)?;
                    self.simplify_loop(count, SimplifyArgs::const_param(1))?;
                    if self.arena.kind(count) != NodeKind::Constant {
                        return Err(self.fatal(errors::error_const_func_not_constant(
                            span, call_span,
                        )));
                    }
                    let n = self.arena.get(count).as_i64().unwrap_or(0).max(0);
                    self.arena.free(count);
                    self.arena.remove_child(block, 0);
                    let body = self.arena.child(stmt, 1);
                    for _ in 0..n {
                        let body_clone = self.arena.clone_subtree(body);
                        self.arena.insert_child(block, 0, body_clone);
                    }
                    self.arena.free(stmt);
                }

                NodeKind::Case => {
                    let selected = self.select_const_case(stmt, variables, call_span)?;
                    self.arena.remove_child(block, 0);
                    if let Some(branch) = selected {
                        let clone = self.arena.clone_subtree(branch);
                        self.arena.insert_child(block, 0, clone);
                    }
                    self.arena.free(stmt);
                }

                NodeKind::Block => {
                    self.arena.remove_child(block, 0);
                    let inner = self.arena.detach_children(stmt);
                    for (i, child) in inner.into_iter().enumerate() {
                        self.arena.insert_child(block, i, child);
                    }
                    self.arena.free(stmt);
                }

                _ => {
                    return Err(self.fatal(errors::error_const_func_unsupported(
                        span, call_span,
                    )));
                }
            }
        }
        Ok(())
    }

    /// Commits one folded blocking assignment into the variable table.
    fn apply_const_assign(
        &mut self,
        stmt: NodeId,
        variables: &mut HashMap<Ident, VarInfo>,
        call_span: Span,
    ) -> ElabResult<()> {
        let span = self.arena.get(stmt).span;
        let lhs = self.arena.child(stmt, 0);
        let rhs = self.arena.child(stmt, 1);
        if self.arena.kind(rhs) != NodeKind::Constant {
            return Err(self.fatal(errors::error_const_func_not_constant(span, call_span)));
        }
        if self.arena.kind(lhs) != NodeKind::Identifier {
            return Err(self.fatal(errors::error_const_func_lhs(
                "unsupported composite left-hand side",
                span,
                call_span,
            )));
        }
        let name = self.arena.get(lhs).name.expect("unnamed identifier");
        if !variables.contains_key(&name) {
            return Err(self.fatal(errors::error_const_func_lhs(
                "assignment to non-local variable",
                span,
                call_span,
            )));
        }

        let rhs_bits = self
            .arena
            .get(rhs)
            .value
            .clone()
            .expect("constant without payload");
        let select = self.arena.get(lhs).children.first().copied();
        let info = variables.get_mut(&name).expect("checked above");
        match select {
            None => {
                info.value = rhs_bits.extended(info.value.width(), false);
            }
            Some(range) => {
                let r = self.arena.get(range);
                if !r.range_valid {
                    return Err(self.fatal(errors::error_const_func_access(
                        "non-constant range",
                        span,
                        call_span,
                    )));
                }
                let offset = r.range_left.min(r.range_right) - info.offset;
                let width = ((r.range_left - r.range_right).unsigned_abs() as i64 + 1)
                    .min(info.value.width() as i64 - offset);
                let resized = rhs_bits.extended(info.value.width(), false);
                for i in 0..width.max(0) {
                    info.value
                        .set((i + offset) as u32, resized.get(i as u32));
                }
            }
        }
        Ok(())
    }

    /// Picks the branch of a `Case` statement inside a constant function.
    fn select_const_case(
        &mut self,
        stmt: NodeId,
        variables: &mut HashMap<Ident, VarInfo>,
        call_span: Span,
    ) -> ElabResult<Option<NodeId>> {
        let span = self.arena.get(stmt).span;
        let scrutinee_src = self.arena.child(stmt, 0);
        let scrutinee = self.arena.clone_subtree(scrutinee_src);
        self.replace_variables(scrutinee, variables, call_span)?;
        self.simplify_loop(scrutinee, SimplifyArgs::const_param(1))?;

        let arms = self.arena.get(stmt).children[1..].to_vec();
        let mut selected = None;
        'arms: for arm in arms {
            assert_eq!(self.arena.kind(arm), NodeKind::Cond, "malformed case arm");
            let arm_children = self.arena.get(arm).children.clone();
            let branch = *arm_children.last().expect("empty case arm");
            if self.arena.kind(arm_children[0]) == NodeKind::Default {
                if selected.is_none() {
                    selected = Some(branch);
                }
                continue;
            }
            for &expr in &arm_children[..arm_children.len() - 1] {
                let candidate = self.arena.clone_subtree(expr);
                self.replace_variables(candidate, variables, call_span)?;
                let scrutinee_clone = self.arena.clone_subtree(scrutinee);
                let eq = self
                    .arena
                    .node_with(NodeKind::Eq, vec![scrutinee_clone, candidate]);
                self.simplify_loop(eq, SimplifyArgs::const_param(1))?;
                if self.arena.kind(eq) != NodeKind::Constant {
                    return Err(self.fatal(errors::error_const_func_not_constant(
                        span, call_span,
                    )));
                }
                let matched = self.arena.get(eq).as_bool();
                self.arena.free(eq);
                if matched {
                    selected = Some(branch);
                    break 'arms;
                }
            }
        }
        self.arena.free(scrutinee);
        Ok(selected)
    }

    /// Substitutes current variable values for identifier uses in a
    /// detached expression, honoring bit-range selects.
    fn replace_variables(
        &mut self,
        id: NodeId,
        variables: &HashMap<Ident, VarInfo>,
        call_span: Span,
    ) -> ElabResult<()> {
        let node = self.arena.get(id);
        let span = node.span;
        if node.kind == NodeKind::Identifier {
            if let Some(name) = node.name {
                if let Some(info) = variables.get(&name) {
                    let mut offset = info.offset;
                    let mut width = info.value.width() as i64;
                    let select = node.children.first().copied();
                    let child_count = node.children.len();
                    if let Some(range) = select {
                        if child_count != 1 || self.arena.kind(range) != NodeKind::Range {
                            return Err(self.fatal(errors::error_const_func_access(
                                "unsupported memory access",
                                span,
                                call_span,
                            )));
                        }
                        self.replace_variables(range, variables, call_span)?;
                        self.simplify_loop(id, SimplifyArgs::const_param(1))?;
                        let r = self.arena.get(self.arena.child(id, 0));
                        if !r.range_valid {
                            return Err(self.fatal(errors::error_const_func_access(
                                "non-constant range",
                                span,
                                call_span,
                            )));
                        }
                        offset = r.range_left.min(r.range_right);
                        width = ((r.range_left - r.range_right).unsigned_abs() as i64 + 1)
                            .min(width);
                    }
                    let info = variables.get(&name).expect("checked above");
                    let rel = (offset - info.offset).max(0);
                    let len = width.min(info.value.width() as i64 - rel).max(0);
                    let bits = info.value.slice(rel as u32, len as u32);
                    let replacement = self.arena.const_bits(bits, info.is_signed);
                    self.replace_with(id, replacement);
                    return Ok(());
                }
            }
        }
        let children = self.arena.get(id).children.clone();
        for child in children {
            self.replace_variables(child, variables, call_span)?;
        }
        Ok(())
    }
}
