//! The fixed-point AST rewrite engine.
//!
//! [`Elaborator::simplify`] visits one node, simplifies its children with
//! the width/sign hints their position demands, applies every rewrite rule
//! that matches, and reports whether anything changed. Callers drive it to a
//! fixed point; the per-node `basic_prep` memo short-circuits re-visits of
//! quiescent subtrees and is cleared whenever a node's content is replaced.
//!
//! Stage 0 (modules only) orchestrates the whole elaboration: stage 1 to a
//! fixed point (scope resolution, parameter substitution, generate
//! expansion, constant folding), then memory demotion, then stage 2 to a
//! fixed point (assert lowering, memory port rewrites, hoisting).

use crate::errors::{self, ElabResult};
use crate::Elaborator;
use std::collections::HashMap;
use tarn_ast::{NodeId, NodeKind};
use tarn_common::{calc, Logic, LogicVec};

/// Real-valued modulo with the sign of the dividend.
fn real_mod(x: f64, y: f64) -> f64 {
    x % y
}

/// The per-invocation parameters of the simplifier.
#[derive(Clone, Copy, Debug)]
pub struct SimplifyArgs {
    /// Constant expressions may be folded.
    pub const_fold: bool,
    /// Wire identifiers evaluate to zero (static worst-case width analysis).
    pub at_zero: bool,
    /// The node is under an assignment's left-hand side.
    pub in_lvalue: bool,
    /// The elaboration stage (0, 1, or 2).
    pub stage: u8,
    /// Context-determined width, or -1 for self-determined.
    pub width_hint: i32,
    /// Context-determined signedness.
    pub sign_hint: bool,
    /// The expression must be constant-evaluable.
    pub in_param: bool,
}

impl SimplifyArgs {
    /// Plain entry arguments for the given stage.
    pub fn stage(stage: u8) -> Self {
        Self {
            const_fold: false,
            at_zero: false,
            in_lvalue: false,
            stage,
            width_hint: -1,
            sign_hint: false,
            in_param: false,
        }
    }

    /// Constant-folding arguments for the given stage.
    pub(crate) fn const_eval(stage: u8) -> Self {
        Self {
            const_fold: true,
            ..Self::stage(stage)
        }
    }

    /// Constant-folding arguments that also require constness.
    pub(crate) fn const_param(stage: u8) -> Self {
        Self {
            in_param: true,
            ..Self::const_eval(stage)
        }
    }

    /// The same arguments with different width/sign hints.
    pub(crate) fn with_hints(self, width_hint: i32, sign_hint: bool) -> Self {
        Self {
            width_hint,
            sign_hint,
            ..self
        }
    }
}

impl Elaborator<'_> {
    /// Re-enters [`simplify`](Self::simplify) until it reports no change.
    pub(crate) fn simplify_loop(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<bool> {
        let mut changed = false;
        while self.simplify(id, args)? {
            changed = true;
        }
        Ok(changed)
    }

    /// Like [`simplify_loop`](Self::simplify_loop) but honors the node's
    /// `basic_prep` memo, skipping already-quiescent subtrees.
    fn simplify_until_prepped(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<bool> {
        let mut changed = false;
        while !self.arena.get(id).basic_prep && self.simplify(id, args)? {
            changed = true;
        }
        Ok(changed)
    }

    /// Swaps the content of `new_id` into `id`, keeping `id`'s source span
    /// and freeing `id`'s previous subtrees.
    pub(crate) fn replace_with(&mut self, id: NodeId, new_id: NodeId) {
        let span = self.arena.get(id).span;
        let mut node = self.arena.take(new_id);
        node.span = span;
        self.arena.replace(id, node);
    }

    /// Builds an `Identifier` node referring to `name`.
    pub(crate) fn make_identifier(&mut self, name: tarn_common::Ident) -> NodeId {
        let id = self.arena.node(NodeKind::Identifier);
        self.arena.get_mut(id).name = Some(name);
        id
    }

    /// Builds a `Wire` with a constant `[left:right]` range.
    pub(crate) fn make_ranged_wire(
        &mut self,
        name: tarn_common::Ident,
        left: i64,
        right: i64,
    ) -> NodeId {
        let l = self.arena.const_int(left, true, -1);
        let r = self.arena.const_int(right, true, -1);
        let range = self.arena.node_with(NodeKind::Range, vec![l, r]);
        let wire = self.arena.node_with(NodeKind::Wire, vec![range]);
        self.arena.get_mut(wire).name = Some(name);
        wire
    }

    /// Inserts a statement into the current block right before the statement
    /// currently being visited.
    pub(crate) fn insert_before_block_child(&mut self, stmt: NodeId) {
        let block = self
            .ctx
            .current_block
            .expect("statement splice outside a block");
        let index = match self.ctx.current_block_child {
            Some(anchor) => self
                .arena
                .get(block)
                .children
                .iter()
                .position(|&c| c == anchor)
                .expect("current block child is not in the current block"),
            None => self.arena.get(block).children.len(),
        };
        self.arena.insert_child(block, index, stmt);
    }

    /// Visits one node: simplifies children, applies rewrite rules, returns
    /// whether anything changed.
    pub(crate) fn simplify(&mut self, id: NodeId, mut args: SimplifyArgs) -> ElabResult<bool> {
        if args.stage == 0 {
            return self.run_stages(id, args);
        }

        let mut did_something = false;
        let kind = self.arena.kind(id);
        let name = self.arena.get(id).name;

        // function and task bodies are opaque until called; once lowering
        // starts every remaining call has been resolved, so the
        // declarations are dropped
        if matches!(kind, NodeKind::Function | NodeKind::Task) {
            if args.stage > 1 {
                let husk = self.husk();
                self.replace_with(id, husk);
                return Ok(true);
            }
            return Ok(false);
        }

        // deactivate calls to non-synthesizable system tasks
        if matches!(kind, NodeKind::FCall | NodeKind::TCall) {
            if let Some(n) = name {
                let s = self.interner.resolve(n);
                if s == "$display" || s == "$stop" || s == "$finish" {
                    self.arena.free_children(id);
                    self.arena.get_mut(id).name = None;
                }
            }
        }

        // contexts that force constant folding
        if matches!(
            kind,
            NodeKind::Wire
                | NodeKind::Parameter
                | NodeKind::LocalParam
                | NodeKind::DefParam
                | NodeKind::ParaSet
                | NodeKind::Range
                | NodeKind::Prefix
        ) {
            args.const_fold = true;
        }
        if kind == NodeKind::Identifier {
            if let Some(n) = name {
                if let Some(decl) = self.ctx.scope.get(n) {
                    if self.arena.kind(decl).is_parameter() {
                        args.const_fold = true;
                    }
                }
            }
        }
        if matches!(
            kind,
            NodeKind::Parameter
                | NodeKind::LocalParam
                | NodeKind::DefParam
                | NodeKind::ParaSet
                | NodeKind::Prefix
        ) {
            args.in_param = true;
        }

        if kind == NodeKind::Module {
            did_something |= self.enter_module(id, args.stage)?;
        }

        let backup_block = self.ctx.current_block;
        let backup_block_child = self.ctx.current_block_child;
        let backup_top_block = self.ctx.current_top_block;
        let backup_width_hint = args.width_hint;
        let backup_sign_hint = args.sign_hint;

        let mut detect_width_simple = false;
        let mut self_det = [false; 3];
        let mut children_self_det = false;
        let mut reset_width_after_children = false;

        match kind {
            NodeKind::Assign | NodeKind::AssignEq | NodeKind::AssignLe => {
                let lhs = self.arena.child(id, 0);
                let rhs = self.arena.child(id, 1);
                did_something |= self.simplify_until_prepped(
                    lhs,
                    SimplifyArgs {
                        const_fold: false,
                        at_zero: false,
                        in_lvalue: true,
                        stage: args.stage,
                        width_hint: -1,
                        sign_hint: false,
                        in_param: args.in_param,
                    },
                )?;
                did_something |= self.simplify_until_prepped(
                    rhs,
                    SimplifyArgs {
                        const_fold: false,
                        at_zero: false,
                        in_lvalue: false,
                        stage: args.stage,
                        width_hint: -1,
                        sign_hint: false,
                        in_param: args.in_param,
                    },
                )?;
                let (lhs_width, _) = self.detect_sign_width(lhs)?;
                let (rhs_width, rhs_sign) = self.detect_sign_width(rhs)?;
                args.width_hint = rhs_width.max(lhs_width);
                args.sign_hint = rhs_sign;
                self_det[0] = true;
            }

            NodeKind::Parameter | NodeKind::LocalParam => {
                let value = self.arena.child(id, 0);
                did_something |= self.simplify_until_prepped(
                    value,
                    SimplifyArgs {
                        const_fold: false,
                        at_zero: false,
                        in_lvalue: false,
                        stage: args.stage,
                        width_hint: -1,
                        sign_hint: false,
                        in_param: true,
                    },
                )?;
                let (w, s) = self.detect_sign_width(value)?;
                args.width_hint = w;
                args.sign_hint = s;
                let range = self.arena.get(id).children.get(1).copied();
                if let Some(range) = range {
                    if self.arena.kind(range) == NodeKind::Range {
                        did_something |= self.simplify_until_prepped(
                            range,
                            SimplifyArgs {
                                const_fold: false,
                                at_zero: false,
                                in_lvalue: false,
                                stage: args.stage,
                                width_hint: -1,
                                sign_hint: false,
                                in_param: true,
                            },
                        )?;
                        let r = self.arena.get(range);
                        if !r.range_valid {
                            return Err(
                                self.fatal(errors::error_param_range_not_constant(r.span))
                            );
                        }
                        args.width_hint =
                            args.width_hint.max((r.range_left - r.range_right + 1) as i32);
                    }
                }
            }

            NodeKind::ToBits
            | NodeKind::ToSigned
            | NodeKind::ToUnsigned
            | NodeKind::Concat
            | NodeKind::Replicate
            | NodeKind::ReduceAnd
            | NodeKind::ReduceOr
            | NodeKind::ReduceXor
            | NodeKind::ReduceXnor
            | NodeKind::ReduceBool => {
                detect_width_simple = true;
                children_self_det = true;
            }

            NodeKind::Neg
            | NodeKind::BitNot
            | NodeKind::Pos
            | NodeKind::BitAnd
            | NodeKind::BitOr
            | NodeKind::BitXor
            | NodeKind::BitXnor
            | NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod => {
                detect_width_simple = true;
            }

            NodeKind::ShiftLeft
            | NodeKind::ShiftRight
            | NodeKind::ShiftSLeft
            | NodeKind::ShiftSRight
            | NodeKind::Pow => {
                detect_width_simple = true;
                self_det[1] = true;
            }

            NodeKind::Lt
            | NodeKind::Le
            | NodeKind::Eq
            | NodeKind::Ne
            | NodeKind::EqX
            | NodeKind::NeX
            | NodeKind::Ge
            | NodeKind::Gt => {
                // operands are measured together at a shared width/sign
                args.width_hint = -1;
                args.sign_hint = true;
                let children = self.arena.get(id).children.clone();
                for child in children {
                    did_something |= self.simplify_until_prepped(
                        child,
                        SimplifyArgs {
                            const_fold: false,
                            at_zero: false,
                            in_lvalue: args.in_lvalue,
                            stage: args.stage,
                            width_hint: -1,
                            sign_hint: false,
                            in_param: args.in_param,
                        },
                    )?;
                    let mut real = false;
                    self.detect_worker(child, &mut args.width_hint, &mut args.sign_hint, &mut real)?;
                }
                reset_width_after_children = true;
            }

            NodeKind::LogicAnd | NodeKind::LogicOr | NodeKind::LogicNot => {
                detect_width_simple = true;
                children_self_det = true;
            }

            NodeKind::Ternary => {
                detect_width_simple = true;
                self_det[0] = true;
            }

            NodeKind::MemRd => {
                detect_width_simple = true;
                children_self_det = true;
            }

            _ => {
                args.width_hint = -1;
                args.sign_hint = false;
            }
        }

        if detect_width_simple && args.width_hint < 0 {
            if kind == NodeKind::Replicate {
                let count = self.arena.child(id, 0);
                did_something |= self.simplify_loop(
                    count,
                    SimplifyArgs {
                        const_fold: true,
                        at_zero: false,
                        in_lvalue: args.in_lvalue,
                        stage: args.stage,
                        width_hint: -1,
                        sign_hint: false,
                        in_param: true,
                    },
                )?;
            }
            let children = self.arena.get(id).children.clone();
            for child in children {
                did_something |= self.simplify_until_prepped(
                    child,
                    SimplifyArgs {
                        const_fold: false,
                        at_zero: false,
                        in_lvalue: args.in_lvalue,
                        stage: args.stage,
                        width_hint: -1,
                        sign_hint: false,
                        in_param: args.in_param,
                    },
                )?;
            }
            let (w, s) = self.detect_sign_width(id)?;
            args.width_hint = w;
            args.sign_hint = s;
        }

        if kind == NodeKind::Ternary {
            let then_id = self.arena.child(id, 1);
            let else_id = self.arena.child(id, 2);
            let (_, _, real_then) = self.detect_sign_width_real(then_id)?;
            let (_, _, real_else) = self.detect_sign_width_real(else_id)?;
            if real_then || real_else {
                self_det[1] = true;
                self_det[2] = true;
            }
        }

        // simplify children, iterating by index because rewrites can grow
        // the child list while we walk it
        let mut i = 0;
        loop {
            let len = self.arena.get(id).children.len();
            if i >= len {
                break;
            }
            match kind {
                NodeKind::GenFor | NodeKind::For if i >= 3 => break,
                NodeKind::GenIf | NodeKind::GenCase if i >= 1 => break,
                NodeKind::GenBlock => break,
                NodeKind::Block if name.is_some() => break,
                NodeKind::Prefix if i >= 1 => break,
                _ => {}
            }
            let mut did_here = true;
            while did_here {
                if i >= self.arena.get(id).children.len() {
                    break;
                }
                let child = self.arena.child(id, i);
                let mut child_args = args;
                if i == 0 && matches!(kind, NodeKind::Replicate | NodeKind::Wire) {
                    child_args.const_fold = true;
                    child_args.in_param = true;
                }
                if kind.is_parameter() {
                    child_args.const_fold = true;
                }
                if i == 0 && kind.is_assignment() {
                    child_args.in_lvalue = true;
                }
                if kind == NodeKind::Block {
                    self.ctx.current_block = Some(id);
                    self.ctx.current_block_child = Some(child);
                }
                if matches!(kind, NodeKind::Always | NodeKind::Initial)
                    && self.arena.kind(child) == NodeKind::Block
                {
                    self.ctx.current_top_block = Some(child);
                }
                let self_determined = children_self_det
                    || (i < 3 && self_det[i]);
                if self_determined {
                    child_args.width_hint = -1;
                    child_args.sign_hint = false;
                }
                did_here = self.simplify(child, child_args)?;
                if did_here {
                    did_something = true;
                }
            }
            if i >= self.arena.get(id).children.len() {
                break;
            }
            let child = self.arena.child(id, i);
            // initial blocks nested below the module are hoisted at stage 2
            if args.stage == 2
                && self.arena.kind(child) == NodeKind::Initial
                && self.ctx.current_module != Some(id)
            {
                self.arena.remove_child(id, i);
                let module = self.module();
                self.arena.add_child(module, child);
                did_something = true;
                continue;
            }
            // sweep husks left behind by expanded constructs
            if matches!(kind, NodeKind::Module | NodeKind::Block) {
                let c = self.arena.get(child);
                if c.kind == NodeKind::Block
                    && c.name.is_none()
                    && c.children.is_empty()
                    && c.attributes.is_empty()
                {
                    self.arena.remove_child(id, i);
                    self.arena.free(child);
                    did_something = true;
                    continue;
                }
            }
            i += 1;
        }

        // attributes are constant expressions
        let attrs: Vec<NodeId> = self.arena.get(id).attributes.values().copied().collect();
        for attr in attrs {
            did_something |= self.simplify_loop(attr, SimplifyArgs::const_param(args.stage))?;
        }

        if reset_width_after_children {
            args.width_hint = backup_width_hint;
            args.sign_hint = backup_sign_hint;
            if args.width_hint < 0 {
                let (w, s) = self.detect_sign_width(id)?;
                args.width_hint = w;
                args.sign_hint = s;
            }
        }

        self.ctx.current_block = backup_block;
        self.ctx.current_block_child = backup_block_child;
        self.ctx.current_top_block = backup_top_block;

        if kind == NodeKind::Module {
            self.ctx.scope.clear();
        }

        let replacement = self.apply_rules(id, args, &mut did_something)?;
        if let Some(new_id) = replacement {
            self.replace_with(id, new_id);
            did_something = true;
        }

        if !did_something {
            self.arena.get_mut(id).basic_prep = true;
        }
        Ok(did_something)
    }

    /// Stage 0: the module-level orchestration.
    fn run_stages(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<bool> {
        assert_eq!(
            self.arena.kind(id),
            NodeKind::Module,
            "stage 0 requires a module root"
        );
        self.ctx.current_module = Some(id);

        while self.simplify(id, SimplifyArgs { stage: 1, ..args })? {}

        if !self.ctx.config.no_mem2reg && !self.get_bool_attribute(id, "nomem2reg") {
            self.demote_memories(id)?;
        }

        while self.simplify(id, SimplifyArgs { stage: 2, ..args })? {}
        Ok(false)
    }

    /// Module entry: repopulates the scope and merges re-declared wires.
    fn enter_module(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut did_something = false;
        self.ctx.scope.clear();
        self.ctx.current_module = Some(id);

        let mut wire_scope: HashMap<tarn_common::Ident, NodeId> = HashMap::new();
        let mut i = 0;
        while i < self.arena.get(id).children.len() {
            let child = self.arena.child(id, i);
            let ck = self.arena.kind(child);
            let cname = self.arena.get(child).name;
            if ck == NodeKind::Wire {
                if let Some(n) = cname {
                    if let Some(&first) = wire_scope.get(&n) {
                        if self.wires_compatible(first, child) {
                            self.merge_wire_into(first, child);
                            self.arena.remove_child(id, i);
                            self.arena.free(child);
                            did_something = true;
                            continue;
                        }
                        if stage > 1 {
                            let span = self.arena.get(child).span;
                            let prev_span = self.arena.get(first).span;
                            let name_str = self.interner.resolve(n).to_string();
                            return Err(self.fatal(errors::error_wire_redeclared(
                                &name_str, span, prev_span,
                            )));
                        }
                        i += 1;
                        continue;
                    }
                    wire_scope.insert(n, child);
                }
            }
            if ck.declares_name() {
                if let Some(n) = cname {
                    self.ctx.scope.install(n, child);
                }
            }
            i += 1;
        }

        // parameters and wires settle before anything that references them
        let children = self.arena.get(id).children.clone();
        for child in children {
            let ck = self.arena.kind(child);
            if matches!(
                ck,
                NodeKind::Parameter | NodeKind::LocalParam | NodeKind::Wire | NodeKind::AutoWire
            ) {
                let a = if ck.is_parameter() {
                    SimplifyArgs::const_param(1)
                } else {
                    SimplifyArgs::const_eval(1)
                };
                did_something |= self.simplify_loop(child, a)?;
            }
        }
        Ok(did_something)
    }

    /// Whether a re-declaration of a wire can be merged into the first one.
    fn wires_compatible(&self, first: NodeId, node: NodeId) -> bool {
        let n = self.arena.get(node);
        if !n.is_input && !n.is_output && n.is_reg && n.children.is_empty() {
            return true;
        }
        let f = self.arena.get(first);
        if f.children.len() != n.children.len() {
            return false;
        }
        for (&c1, &c2) in f.children.iter().zip(&n.children) {
            let (r1, r2) = (self.arena.get(c1), self.arena.get(c2));
            if r1.kind == NodeKind::Range
                && r2.kind == NodeKind::Range
                && r1.range_valid
                && r2.range_valid
            {
                if r1.range_left != r2.range_left || r1.range_right != r2.range_right {
                    return false;
                }
            } else if !self.arena.structurally_equal(c1, c2) {
                return false;
            }
        }
        if f.range_left != n.range_left || f.range_right != n.range_right {
            return false;
        }
        if f.port_id == 0 && (n.is_input || n.is_output) {
            return false;
        }
        true
    }

    /// Merges the flags and attributes of a compatible re-declaration.
    fn merge_wire_into(&mut self, first: NodeId, node: NodeId) {
        let (is_input, is_output, is_reg, is_signed) = {
            let n = self.arena.get(node);
            (n.is_input, n.is_output, n.is_reg, n.is_signed)
        };
        {
            let f = self.arena.get_mut(first);
            f.is_input |= is_input;
            f.is_output |= is_output;
            f.is_reg |= is_reg;
            f.is_signed |= is_signed;
        }
        let attrs: Vec<_> = self
            .arena
            .get(node)
            .attributes
            .iter()
            .map(|(&k, &v)| (k, v))
            .collect();
        for (key, value) in attrs {
            let clone = self.arena.clone_subtree(value);
            if let Some(old) = self.arena.get_mut(first).attributes.insert(key, clone) {
                self.arena.free(old);
            }
        }
    }

    /// An empty anonymous block, left where an expanded construct used to be
    /// and swept by the parent's traversal.
    fn husk(&mut self) -> NodeId {
        self.arena.node(NodeKind::Block)
    }

    /// Applies the rewrite rules to a visited node. Returns a replacement
    /// node if one of the rules produced one.
    fn apply_rules(
        &mut self,
        id: NodeId,
        args: SimplifyArgs,
        did: &mut bool,
    ) -> ElabResult<Option<NodeId>> {
        // defparam becomes a parameter binding on the named cell
        if self.arena.kind(id) == NodeKind::DefParam && self.arena.get(id).name.is_some() {
            self.rewrite_defparam(id)?;
            *did = true;
            return Ok(Some(self.husk()));
        }

        // constant generate-scope prefix collapses to a plain identifier
        if self.arena.kind(id) == NodeKind::Prefix {
            return Ok(Some(self.rewrite_prefix(id)?));
        }

        if self.arena.kind(id) == NodeKind::ToBits {
            return Ok(Some(self.rewrite_to_bits(id)?));
        }

        // remaining signedness casts collapse once lowering starts; the
        // constant case is folded with width hints at stage 1
        if args.stage > 1
            && matches!(
                self.arena.kind(id),
                NodeKind::ToSigned | NodeKind::ToUnsigned
            )
        {
            let to_signed = self.arena.kind(id) == NodeKind::ToSigned;
            let child = self.arena.child(id, 0);
            let clone = self.arena.clone_subtree(child);
            if self.arena.kind(clone) == NodeKind::Constant {
                self.arena.get_mut(clone).is_signed = to_signed;
            }
            return Ok(Some(clone));
        }

        if self.arena.kind(id) == NodeKind::Range {
            self.annotate_range(id, did);
        }

        if self.arena.kind(id) == NodeKind::Wire {
            self.annotate_wire(id, did);
        }

        if self.arena.kind(id).is_parameter() {
            self.trim_parameter(id, args, did)?;
        }

        if self.arena.kind(id) == NodeKind::Identifier {
            self.resolve_identifier(id, did);

            let node = self.arena.get(id);
            if node.children.len() == 2
                && self.arena.kind(node.children[0]) == NodeKind::Range
                && self.arena.kind(node.children[1]) == NodeKind::Range
            {
                return Ok(Some(self.rewrite_memory_bit_select(id, args)?));
            }
        }

        match self.arena.kind(id) {
            NodeKind::While => {
                let span = self.arena.get(id).span;
                return Err(self.fatal(errors::error_while_outside_const_func(span)));
            }
            NodeKind::Repeat => {
                let span = self.arena.get(id).span;
                return Err(self.fatal(errors::error_repeat_outside_const_func(span)));
            }
            // genvars have served their purpose once the generate
            // constructs are gone
            NodeKind::GenVar if args.stage > 1 => {
                *did = true;
                return Ok(Some(self.husk()));
            }
            _ => {}
        }

        if matches!(self.arena.kind(id), NodeKind::GenFor | NodeKind::For)
            && !self.arena.get(id).children.is_empty()
        {
            self.unroll_loop(id, args)?;
            *did = true;
            return Ok(Some(self.husk()));
        }

        if self.arena.kind(id) == NodeKind::Block && self.arena.get(id).name.is_some() {
            self.expand_named_block(id, args)?;
            *did = true;
        }

        if self.arena.kind(id) == NodeKind::GenBlock {
            self.hoist_genblock(id, args)?;
            *did = true;
            return Ok(Some(self.husk()));
        }

        if self.arena.kind(id) == NodeKind::GenIf {
            if !self.arena.get(id).children.is_empty() {
                self.eval_genif(id, args)?;
            }
            *did = true;
            return Ok(Some(self.husk()));
        }

        if self.arena.kind(id) == NodeKind::GenCase {
            if !self.arena.get(id).children.is_empty() {
                self.eval_gencase(id, args)?;
            }
            *did = true;
            return Ok(Some(self.husk()));
        }

        if self.arena.kind(id) == NodeKind::CellArray {
            return Ok(Some(self.unroll_cell_array(id)?));
        }

        if self.arena.kind(id) == NodeKind::Primitive {
            self.lower_primitive(id)?;
            *did = true;
        }

        if matches!(
            self.arena.kind(id),
            NodeKind::AssignEq | NodeKind::AssignLe
        ) {
            if let Some(case) = self.expand_dynamic_lhs(id, args, *did)? {
                return Ok(Some(case));
            }
        }

        if args.stage > 1 && self.arena.kind(id) == NodeKind::Assert {
            if self.ctx.current_block.is_some() {
                return Ok(Some(self.lower_assert_in_block(id)?));
            }
            if self.arena.get(id).children.len() == 1 {
                self.normalize_module_assert(id);
                *did = true;
            }
        }

        // memory read becomes an explicit read port
        if args.stage > 1 && self.arena.kind(id) == NodeKind::Identifier && !args.in_lvalue {
            let node = self.arena.get(id);
            if node.children.len() == 1 {
                let range = node.children[0];
                let target = self.resolved_decl(id);
                if let Some(mem) = target.filter(|&m| self.arena.kind(m) == NodeKind::Memory) {
                    if self.arena.kind(range) == NodeKind::Range
                        && self.arena.get(range).children.len() == 1
                    {
                        return Ok(Some(self.rewrite_memory_read(id, mem)));
                    }
                }
            }
        }

        // memory write becomes an explicit write port
        if args.stage > 1
            && matches!(
                self.arena.kind(id),
                NodeKind::AssignEq | NodeKind::AssignLe
            )
        {
            if let Some(mem) = self.memory_write_target(id) {
                return Ok(Some(self.rewrite_memory_write(id, mem)?));
            }
        }

        if matches!(self.arena.kind(id), NodeKind::FCall | NodeKind::TCall) {
            if self.arena.get(id).name.is_some() {
                if let Some(replacement) = self.simplify_call(id, args)? {
                    return Ok(Some(replacement));
                }
            } else if args.stage > 1 {
                // a stripped non-synthesizable system call leaves nothing
                *did = true;
                return Ok(Some(self.husk()));
            }
        }

        if args.const_fold {
            if let Some(folded) = self.fold_constants(id, args)? {
                return Ok(Some(folded));
            }
        }

        Ok(None)
    }

    fn rewrite_defparam(&mut self, id: NodeId) -> ElabResult<()> {
        let name = self.arena.get(id).name.expect("checked by caller");
        let span = self.arena.get(id).span;
        let path = self.interner.resolve(name).to_string();
        let Some(pos) = path.rfind('.') else {
            return Err(self.fatal(errors::error_defparam_no_dot(&path, span)));
        };
        let cell_name = self.ident(&path[..pos]);
        let param_name = self.ident(&path[pos + 1..]);
        let cell = self
            .ctx
            .scope
            .get(cell_name)
            .filter(|&c| self.arena.kind(c) == NodeKind::Cell);
        let Some(cell) = cell else {
            return Err(self.fatal(errors::error_defparam_unknown_cell(
                &path[..pos],
                &path[pos + 1..],
                span,
            )));
        };
        let paraset = self.arena.clone_subtree(id);
        {
            let p = self.arena.get_mut(paraset);
            p.kind = NodeKind::ParaSet;
            p.name = Some(param_name);
        }
        // parameter bindings sit right after the cell type
        self.arena.insert_child(cell, 1, paraset);
        Ok(())
    }

    fn rewrite_prefix(&mut self, id: NodeId) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let index_id = self.arena.child(id, 0);
        if self.arena.kind(index_id) != NodeKind::Constant {
            return Err(self.fatal(errors::error_prefix_index_not_constant(span)));
        }
        let inner = self.arena.child(id, 1);
        assert_eq!(
            self.arena.kind(inner),
            NodeKind::Identifier,
            "prefix inner node must be an identifier"
        );
        let index = self.arena.get(index_id).as_i64().unwrap_or(0);
        let base = self
            .arena
            .get(id)
            .name
            .map(|n| self.interner.resolve(n).to_string())
            .unwrap_or_default();
        let suffix = self.name_str(inner).to_string();
        let new_name = self.ident(&format!("{base}[{index}].{suffix}"));
        let clone = self.arena.clone_subtree(inner);
        self.arena.get_mut(clone).name = Some(new_name);
        Ok(clone)
    }

    fn rewrite_to_bits(&mut self, id: NodeId) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let width_id = self.arena.child(id, 0);
        let value_id = self.arena.child(id, 1);
        if self.arena.kind(width_id) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "width operand of conversion",
                span,
            )));
        }
        if self.arena.kind(value_id) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "value operand of conversion",
                span,
            )));
        }
        let width = self.arena.get(width_id).as_i64().unwrap_or(0).max(0) as u32;
        let value = self.arena.get(value_id);
        let signed = value.is_signed;
        let bits = value
            .value
            .as_ref()
            .expect("constant without payload")
            .extended(width, signed);
        Ok(self.arena.const_bits(bits, signed))
    }

    fn annotate_range(&mut self, id: NodeId, did: &mut bool) {
        let node = self.arena.get(id);
        assert!(
            !node.children.is_empty(),
            "range node without bound expressions"
        );
        let old_valid = node.range_valid;
        let first = node.children[0];
        let second = node.children.get(1).copied();

        let mut valid = false;
        let mut left = -1i64;
        let mut right = 0i64;
        if self.arena.kind(first) == NodeKind::Constant {
            if let Some(v) = self.arena.get(first).as_i64() {
                valid = true;
                left = v;
                if second.is_none() {
                    right = left;
                }
            }
        }
        if let Some(second) = second {
            match self.arena.get(second).as_i64() {
                Some(v) if self.arena.kind(second) == NodeKind::Constant => right = v,
                _ => valid = false,
            }
        }
        if valid && left >= 0 && right > left {
            std::mem::swap(&mut left, &mut right);
        }

        let node = self.arena.get_mut(id);
        node.range_valid = valid;
        node.range_left = left;
        node.range_right = right;
        if old_valid != valid {
            *did = true;
        }
    }

    fn annotate_wire(&mut self, id: NodeId, did: &mut bool) {
        let node = self.arena.get(id);
        if let Some(&range) = node.children.first() {
            let r = self.arena.get(range);
            if r.range_valid {
                let (left, right) = (r.range_left, r.range_right);
                let node = self.arena.get_mut(id);
                if !node.range_valid {
                    *did = true;
                }
                node.range_valid = true;
                node.range_left = left;
                node.range_right = right;
            }
        } else {
            let node = self.arena.get_mut(id);
            if !node.range_valid {
                *did = true;
            }
            node.range_valid = true;
            node.range_left = 0;
            node.range_right = 0;
        }
    }

    fn trim_parameter(&mut self, id: NodeId, args: SimplifyArgs, did: &mut bool) -> ElabResult<()> {
        let node = self.arena.get(id);
        let value_id = node.children[0];
        let second = node.children.get(1).copied();
        let is_signed = node.is_signed;
        let span = node.span;

        if let Some(range) = second.filter(|&r| self.arena.kind(r) == NodeKind::Range) {
            let r = self.arena.get(range);
            if !r.range_valid {
                return Err(self.fatal(errors::error_param_range_not_constant(span)));
            }
            let width = (r.range_left - r.range_right + 1) as u32;

            if self.arena.kind(value_id) == NodeKind::RealValue {
                let real = self.arena.get(value_id).real_value.unwrap_or(0.0);
                self.sink.emit(errors::warn_real_to_bits(real, span));
                let bits = LogicVec::from_real(real, width);
                let new_value = self.arena.const_bits(bits, args.sign_hint);
                self.arena.get_mut(id).children[0] = new_value;
                self.arena.free(value_id);
                *did = true;
                return Ok(());
            }

            if self.arena.kind(value_id) == NodeKind::Constant {
                let value = self.arena.get(value_id);
                let bits = value.value.as_ref().expect("constant without payload");
                if bits.width() != width {
                    let extended = bits.extended(width, value.is_signed);
                    let value_signed = value.is_signed;
                    let new_value = self.arena.const_bits(extended, value_signed);
                    self.arena.get_mut(id).children[0] = new_value;
                    self.arena.free(value_id);
                }
                let value_id = self.arena.child(id, 0);
                self.arena.get_mut(value_id).is_signed = is_signed;
            }
        } else if second.is_some_and(|r| self.arena.kind(r) == NodeKind::RealValue) {
            if self.arena.kind(value_id) == NodeKind::Constant {
                let real = self
                    .arena
                    .get(value_id)
                    .as_real(args.sign_hint)
                    .unwrap_or(0.0);
                let new_value = self.arena.real_value(real);
                self.arena.get_mut(id).children[0] = new_value;
                self.arena.free(value_id);
                *did = true;
            }
        }
        Ok(())
    }

    fn resolve_identifier(&mut self, id: NodeId, did: &mut bool) {
        let Some(name) = self.arena.get(id).name else {
            return;
        };
        if !self.ctx.scope.contains(name) {
            // late declarations (hoisted wires) are found by scanning the
            // module
            let module = self.module();
            let children = self.arena.get(module).children.clone();
            for child in children {
                let ck = self.arena.kind(child);
                let declares = matches!(
                    ck,
                    NodeKind::Parameter
                        | NodeKind::LocalParam
                        | NodeKind::Wire
                        | NodeKind::AutoWire
                        | NodeKind::GenVar
                        | NodeKind::Memory
                        | NodeKind::Function
                        | NodeKind::Task
                );
                if declares && self.arena.get(child).name == Some(name) {
                    self.ctx.scope.install(name, child);
                    break;
                }
            }
        }
        if !self.ctx.scope.contains(name) {
            let auto_wire = self.arena.node(NodeKind::AutoWire);
            self.arena.get_mut(auto_wire).name = Some(name);
            let module = self.module();
            self.arena.add_child(module, auto_wire);
            self.ctx.scope.install(name, auto_wire);
            *did = true;
        }
        let target = self.ctx.scope.get(name);
        if self.arena.get(id).resolved_target != target {
            self.arena.get_mut(id).resolved_target = target;
            *did = true;
        }
    }

    /// `mem[addr][bit]` reads through a synthesized temporary wire.
    fn rewrite_memory_bit_select(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let target = self.resolved_decl(id);
        let word_range = self.arena.child(id, 0);
        let ok = target.is_some_and(|m| self.arena.kind(m) == NodeKind::Memory)
            && self.arena.get(word_range).children.len() == 1
            && !args.in_lvalue;
        if !ok {
            return Err(self.fatal(errors::error_memory_bit_select(span)));
        }
        let mem = target.expect("checked above");
        let (mem_width, _, _) = self.meminfo(mem);

        let idx = self.ctx.next_autoidx();
        let wire_name = self.ident(&format!("$mem2bits${}${}", self.name_str(id), idx));
        let wire = self.make_ranged_wire(wire_name, mem_width - 1, 0);
        if self.ctx.current_block.is_some() {
            let nosync = self.ident("nosync");
            let one = self.arena.const_int(1, false, -1);
            self.arena.get_mut(wire).attributes.insert(nosync, one);
        }
        let module = self.module();
        self.arena.add_child(module, wire);
        self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;

        // the word read, minus the bit select
        let data = self.arena.clone_subtree(id);
        let bit_range = self.arena.get_mut(data).children.pop().expect("two ranges");
        self.arena.free(bit_range);

        let lhs = self.make_identifier(wire_name);
        let assign = self.arena.node_with(NodeKind::AssignEq, vec![lhs, data]);

        if self.ctx.current_block.is_some() {
            self.insert_before_block_child(assign);
            self.arena.get_mut(wire).is_reg = true;
        } else {
            let block = self.arena.node_with(NodeKind::Block, vec![assign]);
            let always = self.arena.node_with(NodeKind::Always, vec![block]);
            self.arena.add_child(module, always);
        }

        let bit_select = self.arena.child(id, 1);
        let select_clone = self.arena.clone_subtree(bit_select);
        let new_id = self.arena.node_with(NodeKind::Identifier, vec![select_clone]);
        {
            let n = self.arena.get_mut(new_id);
            n.name = Some(wire_name);
            n.resolved_target = Some(wire);
        }
        Ok(new_id)
    }

    /// Unrolls `For` and `GenFor` loops over their constant trip range.
    fn unroll_loop(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        let kind = self.arena.kind(id);
        let span = self.arena.get(id).span;
        let init = self.arena.child(id, 0);
        let cond = self.arena.child(id, 1);
        let step = self.arena.child(id, 2);
        let mut body = self.arena.child(id, 3);

        // unwrap nested anonymous single-child generate blocks
        loop {
            let b = self.arena.get(body);
            if b.kind == NodeKind::GenBlock
                && b.name.is_none()
                && b.children.len() == 1
                && self.arena.kind(b.children[0]) == NodeKind::GenBlock
            {
                body = b.children[0];
            } else {
                break;
            }
        }

        if self.arena.kind(init) != NodeKind::AssignEq {
            return Err(self.fatal(errors::error_loop_header("first", span)));
        }
        if self.arena.kind(step) != NodeKind::AssignEq {
            return Err(self.fatal(errors::error_loop_header("third", span)));
        }

        let init_lhs = self.arena.child(init, 0);
        let step_lhs = self.arena.child(step, 0);
        let expected = if kind == NodeKind::GenFor {
            (NodeKind::GenVar, "genvar")
        } else {
            (NodeKind::Wire, "register")
        };
        for lhs in [init_lhs, step_lhs] {
            let target = self.arena.get(lhs).resolved_target;
            if !target.is_some_and(|t| self.arena.kind(t) == expected.0) {
                return Err(self.fatal(errors::error_bad_loop_variable(expected.1, span)));
            }
        }
        if self.arena.get(init_lhs).resolved_target != self.arena.get(step_lhs).resolved_target {
            return Err(self.fatal(errors::error_loop_lhs_mismatch(span)));
        }

        let loop_var = self.arena.get(init_lhs).name.expect("loop variable name");

        // current value of the loop variable, wrapped as a local parameter
        let init_rhs = self.arena.child(init, 1);
        let varbuf = self.arena.clone_subtree(init_rhs);
        self.simplify_loop(
            varbuf,
            SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
        )?;
        if self.arena.kind(varbuf) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "right-hand side of the loop initialization",
                span,
            )));
        }
        let var_param = self.arena.node_with(NodeKind::LocalParam, vec![varbuf]);
        self.arena.get_mut(var_param).name = Some(loop_var);
        let shadowed = self.ctx.scope.install(loop_var, var_param);

        let mut insert_at = if kind == NodeKind::For {
            let block = self
                .ctx
                .current_block
                .expect("for loop outside a statement block");
            let anchor = self.ctx.current_block_child;
            anchor
                .and_then(|a| {
                    self.arena
                        .get(block)
                        .children
                        .iter()
                        .position(|&c| c == a)
                })
                .unwrap_or_else(|| self.arena.get(block).children.len())
        } else {
            0
        };

        loop {
            let cond_buf = self.arena.clone_subtree(cond);
            self.simplify_loop(
                cond_buf,
                SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
            )?;
            if self.arena.kind(cond_buf) != NodeKind::Constant {
                return Err(self.fatal(errors::error_not_constant("loop condition", span)));
            }
            let go = self.arena.get(cond_buf).as_bool();
            self.arena.free(cond_buf);
            if !go {
                break;
            }

            let index = self
                .arena
                .get(self.arena.child(var_param, 0))
                .as_i64()
                .unwrap_or(0);

            let buf = if self.arena.kind(body) == NodeKind::GenBlock {
                self.arena.clone_subtree(body)
            } else {
                let inner = self.arena.clone_subtree(body);
                self.arena.node_with(NodeKind::GenBlock, vec![inner])
            };
            if self.arena.get(buf).name.is_none() {
                let idx = self.ctx.next_autoidx();
                let n = self.ident(&format!("$genblock${idx}"));
                self.arena.get_mut(buf).name = Some(n);
            }
            let block_name = self.name_str(buf).to_string();
            let prefix = format!("{block_name}[{index}].");
            let mut name_map = HashMap::new();
            self.expand_genblock(buf, Some(loop_var), &prefix, &mut name_map);

            let unrolled = self.arena.detach_children(buf);
            self.arena.free(buf);
            if kind == NodeKind::GenFor {
                let module = self.module();
                for child in unrolled {
                    self.simplify(child, SimplifyArgs::stage(args.stage))?;
                    self.arena.add_child(module, child);
                }
            } else {
                let block = self.ctx.current_block.expect("checked above");
                for child in unrolled {
                    self.arena.insert_child(block, insert_at, child);
                    insert_at += 1;
                }
            }

            let step_rhs = self.arena.child(step, 1);
            let step_buf = self.arena.clone_subtree(step_rhs);
            self.simplify_loop(
                step_buf,
                SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
            )?;
            if self.arena.kind(step_buf) != NodeKind::Constant {
                return Err(self.fatal(errors::error_not_constant(
                    "right-hand side of the loop step",
                    span,
                )));
            }
            let old = self.arena.get_mut(var_param).children[0];
            self.arena.get_mut(var_param).children[0] = step_buf;
            self.arena.free(old);
        }

        self.ctx.scope.restore_one(loop_var, shadowed);
        self.arena.free(var_param);
        self.arena.free_children(id);
        Ok(())
    }

    /// A named statement block hoists its wires to the module under the
    /// block's scope prefix, then drops its name.
    fn expand_named_block(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        let name = self.arena.get(id).name.expect("checked by caller");
        let prefix = format!("{}.", self.interner.resolve(name));
        let mut name_map = HashMap::new();
        self.expand_genblock(id, None, &prefix, &mut name_map);

        let children = self.arena.detach_children(id);
        let mut kept = Vec::new();
        let module = self.module();
        for child in children {
            if self.arena.kind(child) == NodeKind::Wire {
                self.simplify(child, SimplifyArgs::stage(args.stage))?;
                self.arena.add_child(module, child);
            } else {
                kept.push(child);
            }
        }
        self.arena.get_mut(id).children = kept;
        self.arena.get_mut(id).name = None;
        Ok(())
    }

    /// An unconditional generate block hoists all its children.
    fn hoist_genblock(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        if let Some(name) = self.arena.get(id).name {
            let prefix = format!("{}.", self.interner.resolve(name));
            let mut name_map = HashMap::new();
            self.expand_genblock(id, None, &prefix, &mut name_map);
        }
        let children = self.arena.detach_children(id);
        let module = self.module();
        for child in children {
            self.simplify(child, SimplifyArgs::stage(args.stage))?;
            self.arena.add_child(module, child);
        }
        Ok(())
    }

    /// Evaluates a generate `if` and splices the selected arm.
    fn eval_genif(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        let span = self.arena.get(id).span;
        let cond = self.arena.child(id, 0);
        let buf = self.arena.clone_subtree(cond);
        self.simplify_loop(
            buf,
            SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
        )?;
        if self.arena.kind(buf) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "condition for generate if",
                span,
            )));
        }
        let taken = self.arena.get(buf).as_bool();
        self.arena.free(buf);

        let arm = if taken {
            self.arena.get(id).children.get(1).copied()
        } else {
            self.arena.get(id).children.get(2).copied()
        };
        if let Some(arm) = arm {
            let clone = self.arena.clone_subtree(arm);
            let block = if self.arena.kind(clone) == NodeKind::GenBlock {
                clone
            } else {
                self.arena.node_with(NodeKind::GenBlock, vec![clone])
            };
            self.splice_genblock(block, args)?;
        }
        self.arena.free_children(id);
        Ok(())
    }

    /// Evaluates a generate `case` and splices the matching arm.
    fn eval_gencase(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        let span = self.arena.get(id).span;
        let scrutinee = self.arena.child(id, 0);
        let buf = self.arena.clone_subtree(scrutinee);
        self.simplify_loop(
            buf,
            SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
        )?;
        if self.arena.kind(buf) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "condition for generate case",
                span,
            )));
        }
        let ref_signed = self.arena.get(buf).is_signed;
        let ref_value = self
            .arena
            .get(buf)
            .value
            .clone()
            .expect("constant without payload");
        self.arena.free(buf);

        let arms = self.arena.get(id).children[1..].to_vec();
        let mut selected: Option<NodeId> = None;
        'arms: for arm in arms {
            assert_eq!(
                self.arena.kind(arm),
                NodeKind::Cond,
                "generate case arms must be conditions"
            );
            let arm_children = self.arena.get(arm).children.clone();
            let this_genblock = arm_children
                .iter()
                .copied()
                .find(|&c| self.arena.kind(c) == NodeKind::GenBlock);
            for child in arm_children {
                match self.arena.kind(child) {
                    NodeKind::Default => {
                        if selected.is_none() {
                            selected = this_genblock;
                        }
                    }
                    NodeKind::GenBlock => {}
                    _ => {
                        let expr = self.arena.clone_subtree(child);
                        self.simplify_loop(
                            expr,
                            SimplifyArgs::const_eval(args.stage)
                                .with_hints(args.width_hint, args.sign_hint),
                        )?;
                        if self.arena.kind(expr) != NodeKind::Constant {
                            return Err(self.fatal(errors::error_not_constant(
                                "expression in generate case",
                                span,
                            )));
                        }
                        let node = self.arena.get(expr);
                        let signed = ref_signed && node.is_signed;
                        let matched = calc::const_eq(
                            &ref_value,
                            node.value.as_ref().expect("constant without payload"),
                            signed,
                            signed,
                            1,
                        )
                        .any_one();
                        self.arena.free(expr);
                        if matched {
                            selected = this_genblock;
                            break 'arms;
                        }
                    }
                }
            }
        }

        if let Some(sel) = selected {
            let clone = self.arena.clone_subtree(sel);
            self.splice_genblock(clone, args)?;
        }
        self.arena.free_children(id);
        Ok(())
    }

    /// Name-expands (if named) and hoists a detached generate block into the
    /// module, then frees its shell.
    fn splice_genblock(&mut self, block: NodeId, args: SimplifyArgs) -> ElabResult<()> {
        if let Some(name) = self.arena.get(block).name {
            let prefix = format!("{}.", self.interner.resolve(name));
            let mut name_map = HashMap::new();
            self.expand_genblock(block, None, &prefix, &mut name_map);
        }
        let children = self.arena.detach_children(block);
        let module = self.module();
        for child in children {
            self.simplify(child, SimplifyArgs::stage(args.stage))?;
            self.arena.add_child(module, child);
        }
        self.arena.free(block);
        Ok(())
    }

    /// Clones an instantiated cell once per array element.
    fn unroll_cell_array(&mut self, id: NodeId) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let range = self.arena.child(id, 0);
        let r = self.arena.get(range);
        if !r.range_valid {
            return Err(self.fatal(errors::error_not_constant("array range on cell array", span)));
        }
        let (left, right) = (r.range_left, r.range_right);
        let count = left.max(right) - left.min(right) + 1;
        let cell = self.arena.child(id, 1);

        let block = self.arena.node(NodeKind::GenBlock);
        for i in 0..count {
            let index = if left > right { right + i } else { right - i };
            let new_cell = self.arena.clone_subtree(cell);
            if self.arena.kind(new_cell) == NodeKind::Primitive {
                return Err(self.fatal(errors::error_primitive_array(span)));
            }
            let cell_name = self.name_str(new_cell).to_string();
            let named = self.ident(&format!("{cell_name}[{index}]"));
            self.arena.get_mut(new_cell).name = Some(named);

            let cell_type = self.arena.child(new_cell, 0);
            assert_eq!(
                self.arena.kind(cell_type),
                NodeKind::CellType,
                "cell must start with its type"
            );
            let type_name = self.name_str(cell_type).to_string();
            let tagged = self.ident(&format!("$array:{i}:{count}:{type_name}"));
            self.arena.get_mut(cell_type).name = Some(tagged);

            self.arena.add_child(block, new_cell);
        }
        Ok(block)
    }

    /// Gate primitives become equivalent assignments; n-ary forms left-fold.
    fn lower_primitive(&mut self, id: NodeId) -> ElabResult<()> {
        let span = self.arena.get(id).span;
        let name = self.arena.get(id).name.expect("primitive without a name");
        let name_str = self.interner.resolve(name).to_string();
        if self.arena.get(id).children.len() < 2 {
            return Err(self.fatal(errors::error_primitive_args(&name_str, span)));
        }

        let mut ports = Vec::new();
        for arg in self.arena.detach_children(id) {
            assert_eq!(
                self.arena.kind(arg),
                NodeKind::Argument,
                "primitive connections must be arguments"
            );
            let mut shell = self.arena.take(arg);
            assert_eq!(shell.children.len(), 1, "argument with one connection");
            ports.push(shell.children.pop().expect("checked above"));
        }

        let rhs = if matches!(name_str.as_str(), "bufif0" | "bufif1" | "notif0" | "notif1") {
            if ports.len() != 3 {
                return Err(self.fatal(errors::error_primitive_args(&name_str, span)));
            }
            let z = self.arena.const_bits(LogicVec::filled(1, Logic::Z), false);
            let mut data = ports[1];
            if matches!(name_str.as_str(), "notif0" | "notif1") {
                data = self.arena.node_with(NodeKind::BitNot, vec![data]);
            }
            let (then_arm, else_arm) = if matches!(name_str.as_str(), "bufif0" | "notif0") {
                (z, data)
            } else {
                (data, z)
            };
            self.arena
                .node_with(NodeKind::Ternary, vec![ports[2], then_arm, else_arm])
        } else {
            let (op, invert) = match name_str.as_str() {
                "and" => (NodeKind::BitAnd, false),
                "nand" => (NodeKind::BitAnd, true),
                "or" => (NodeKind::BitOr, false),
                "nor" => (NodeKind::BitOr, true),
                "xor" => (NodeKind::BitXor, false),
                "xnor" => (NodeKind::BitXor, true),
                "buf" => (NodeKind::Pos, false),
                "not" => (NodeKind::Pos, true),
                _ => {
                    return Err(self.fatal(errors::error_unknown_callable(
                        "primitive",
                        &name_str,
                        span,
                    )))
                }
            };
            let mut node = ports[1];
            if op != NodeKind::Pos {
                for &port in &ports[2..] {
                    node = self.arena.node_with(op, vec![node, port]);
                }
            } else {
                for &port in &ports[2..] {
                    self.arena.free(port);
                }
            }
            if invert {
                node = self.arena.node_with(NodeKind::BitNot, vec![node]);
            }
            node
        };

        let lhs = ports[0];
        let node = self.arena.get_mut(id);
        node.kind = NodeKind::Assign;
        node.name = None;
        node.children = vec![lhs, rhs];
        Ok(())
    }

    /// A procedural assignment to a dynamically selected range becomes a
    /// `Case` over every possible starting bit.
    fn expand_dynamic_lhs(
        &mut self,
        id: NodeId,
        args: SimplifyArgs,
        did_so_far: bool,
    ) -> ElabResult<Option<NodeId>> {
        let lhs = self.arena.child(id, 0);
        if self.arena.kind(lhs) != NodeKind::Identifier || self.arena.get(lhs).children.is_empty()
        {
            return Ok(None);
        }
        let range = self.arena.child(lhs, 0);
        if self.arena.get(range).range_valid || did_so_far {
            return Ok(None);
        }
        let Some(target) = self
            .resolved_decl(lhs)
            .filter(|&t| self.arena.kind(t) == NodeKind::Wire)
        else {
            return Ok(None);
        };
        if !self.arena.get(target).range_valid {
            return Ok(None);
        }

        let target_right = self.arena.get(target).range_right;
        let source_width =
            self.arena.get(target).range_left - target_right + 1;
        let mut result_width = 1i64;
        let range_children = self.arena.get(range).children.clone();
        let shift_expr = if range_children.len() == 1 {
            self.arena.clone_subtree(range_children[0])
        } else {
            let span = self.arena.get(id).span;
            let shift = self.arena.clone_subtree(range_children[1]);
            let left_at_zero = self.arena.clone_subtree(range_children[0]);
            let right_at_zero = self.arena.clone_subtree(range_children[1]);
            let at_zero_args = SimplifyArgs {
                at_zero: true,
                ..SimplifyArgs::const_eval(args.stage)
            };
            self.simplify_loop(left_at_zero, at_zero_args)?;
            self.simplify_loop(right_at_zero, at_zero_args)?;
            if self.arena.kind(left_at_zero) != NodeKind::Constant
                || self.arena.kind(right_at_zero) != NodeKind::Constant
            {
                let name = self.name_str(lhs).to_string();
                return Err(self.fatal(errors::error_dynamic_range_select(&name, span)));
            }
            result_width = self.arena.get(left_at_zero).as_i64().unwrap_or(0)
                - self.arena.get(right_at_zero).as_i64().unwrap_or(0)
                + 1;
            self.arena.free(left_at_zero);
            self.arena.free(right_at_zero);
            shift
        };

        let assign_kind = self.arena.kind(id);
        let rhs = self.arena.child(id, 1);
        let case = self.arena.node_with(NodeKind::Case, vec![shift_expr]);
        for i in 0..=(source_width - result_width) {
            let start_bit = target_right + i;
            let match_const = self.arena.const_int(start_bit, true, -1);
            let lvalue = self.arena.clone_subtree(lhs);
            self.arena.free_children(lvalue);
            let hi = self.arena.const_int(start_bit + result_width - 1, true, -1);
            let lo = self.arena.const_int(start_bit, true, -1);
            let new_range = self.arena.node_with(NodeKind::Range, vec![hi, lo]);
            self.arena.add_child(lvalue, new_range);
            let rhs_clone = self.arena.clone_subtree(rhs);
            let assign = self.arena.node_with(assign_kind, vec![lvalue, rhs_clone]);
            let block = self.arena.node_with(NodeKind::Block, vec![assign]);
            let cond = self.arena.node_with(NodeKind::Cond, vec![match_const, block]);
            self.arena.add_child(case, cond);
        }
        Ok(Some(case))
    }

    /// An in-process assertion splits into `_CHECK`/`_EN` wires with default
    /// drivers, plus a module-level `Assert` referencing them.
    fn lower_assert_in_block(&mut self, id: NodeId) -> ElabResult<NodeId> {
        let idx = self.ctx.next_autoidx();
        let check_name = self.ident(&format!("$assert${idx}_CHECK"));
        let en_name = self.ident(&format!("$assert${idx}_EN"));
        let module = self.module();

        let wire_check = self.arena.node(NodeKind::Wire);
        self.arena.get_mut(wire_check).name = Some(check_name);
        self.arena.add_child(module, wire_check);
        self.ctx.scope.install(check_name, wire_check);
        self.simplify_loop(wire_check, SimplifyArgs::const_eval(1))?;

        let wire_en = self.arena.node(NodeKind::Wire);
        self.arena.get_mut(wire_en).name = Some(en_name);
        self.arena.add_child(module, wire_en);
        let en_lhs = self.make_identifier(en_name);
        let zero = self.arena.const_int(0, false, 1);
        let en_init_assign = self.arena.node_with(NodeKind::AssignLe, vec![en_lhs, zero]);
        let en_init_block = self.arena.node_with(NodeKind::Block, vec![en_init_assign]);
        let en_init = self.arena.node_with(NodeKind::Initial, vec![en_init_block]);
        self.arena.add_child(module, en_init);
        self.ctx.scope.install(en_name, wire_en);
        self.simplify_loop(wire_en, SimplifyArgs::const_eval(1))?;

        // default drivers at the head of the process
        let check_lhs = self.make_identifier(check_name);
        let x_bit = self.arena.const_bits(LogicVec::all_x(1), false);
        let default_check = self
            .arena
            .node_with(NodeKind::AssignLe, vec![check_lhs, x_bit]);
        let en_lhs = self.make_identifier(en_name);
        let zero = self.arena.const_int(0, false, 1);
        let default_en = self.arena.node_with(NodeKind::AssignLe, vec![en_lhs, zero]);
        let defaults = self
            .arena
            .node_with(NodeKind::Block, vec![default_check, default_en]);
        let top = self
            .ctx
            .current_top_block
            .expect("assertion outside a process");
        self.arena.insert_child(top, 0, defaults);

        // actual drivers at the assertion site
        let cond = self.arena.child(id, 0);
        let cond_clone = self.arena.clone_subtree(cond);
        let reduced = self.arena.node_with(NodeKind::ReduceBool, vec![cond_clone]);
        let check_lhs = self.make_identifier(check_name);
        let drive_check = self
            .arena
            .node_with(NodeKind::AssignLe, vec![check_lhs, reduced]);
        let en_lhs = self.make_identifier(en_name);
        let one = self.arena.const_int(1, false, 1);
        let drive_en = self.arena.node_with(NodeKind::AssignLe, vec![en_lhs, one]);
        let replacement = self
            .arena
            .node_with(NodeKind::Block, vec![drive_check, drive_en]);

        // the module-level assert inherits the attributes
        let check_ref = self.make_identifier(check_name);
        let en_ref = self.make_identifier(en_name);
        let assert_node = self
            .arena
            .node_with(NodeKind::Assert, vec![check_ref, en_ref]);
        let attributes = std::mem::take(&mut self.arena.get_mut(id).attributes);
        self.arena.get_mut(assert_node).attributes = attributes;
        self.arena.add_child(module, assert_node);

        Ok(replacement)
    }

    /// A bare module-level assertion condition is normalized to the
    /// two-child `[check, en]` form.
    fn normalize_module_assert(&mut self, id: NodeId) {
        let cond = self.arena.remove_child(id, 0);
        let reduced = self.arena.node_with(NodeKind::ReduceBool, vec![cond]);
        let one = self.arena.const_int(1, false, 1);
        let node = self.arena.get_mut(id);
        node.children = vec![reduced, one];
    }

    /// A single-index memory read becomes a `MemRd` port.
    fn rewrite_memory_read(&mut self, id: NodeId, mem: NodeId) -> NodeId {
        let mem_name = self.arena.get(id).name;
        let range = self.arena.child(id, 0);
        let addr = self.arena.child(range, 0);
        let addr_clone = self.arena.clone_subtree(addr);
        let new_id = self.arena.node_with(NodeKind::MemRd, vec![addr_clone]);
        let node = self.arena.get_mut(new_id);
        node.resolved_target = Some(mem);
        node.name = mem_name;
        new_id
    }

    /// Returns the memory a procedural assignment writes, if it is one.
    fn memory_write_target(&self, id: NodeId) -> Option<NodeId> {
        let lhs = self.arena.child(id, 0);
        if self.arena.kind(lhs) != NodeKind::Identifier
            || self.arena.get(lhs).children.len() != 1
        {
            return None;
        }
        let mem = self
            .resolved_decl(lhs)
            .filter(|&m| self.arena.kind(m) == NodeKind::Memory)?;
        let m = self.arena.get(mem);
        if m.children.len() < 2 {
            return None;
        }
        let bit_range = self.arena.get(m.children[0]);
        let size_range = self.arena.get(m.children[1]);
        (bit_range.range_valid && size_range.range_valid).then_some(mem)
    }

    /// A procedural memory write becomes ADDR/DATA/EN wires, default-X
    /// drivers at the head of the process, and a module-level `MemWr`.
    fn rewrite_memory_write(&mut self, id: NodeId, mem: NodeId) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        if self.arena.kind(id) == NodeKind::AssignEq {
            self.sink.emit(errors::warn_blocking_memory_write(span));
        }

        let (mem_width, _, addr_bits) = self.meminfo(mem);
        let mem_name = self.arena.get(mem).name;
        let idx = self.ctx.next_autoidx();
        let base = format!("$memwr${}${}", self.name_str(mem), idx);
        let addr_name = self.ident(&format!("{base}_ADDR"));
        let data_name = self.ident(&format!("{base}_DATA"));
        let en_name = self.ident(&format!("{base}_EN"));
        let module = self.module();

        for (name, width) in [
            (addr_name, addr_bits),
            (data_name, mem_width),
            (en_name, mem_width),
        ] {
            let wire = self.make_ranged_wire(name, width - 1, 0);
            self.arena.add_child(module, wire);
            self.ctx.scope.install(name, wire);
            self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;
        }

        // default drivers at the head of the process
        let mut defaults = Vec::new();
        for (name, value) in [
            (addr_name, LogicVec::all_x(addr_bits as u32)),
            (data_name, LogicVec::all_x(mem_width as u32)),
            (en_name, LogicVec::all_zero(mem_width as u32)),
        ] {
            let lhs = self.make_identifier(name);
            let rhs = self.arena.const_bits(value, false);
            defaults.push(self.arena.node_with(NodeKind::AssignLe, vec![lhs, rhs]));
        }
        let defaults_block = self.arena.node_with(NodeKind::Block, defaults);
        let top = self
            .ctx
            .current_top_block
            .expect("memory write outside a process");
        self.arena.insert_child(top, 0, defaults_block);

        // actual drivers at the assignment site
        let lhs = self.arena.child(id, 0);
        let addr_expr = self.arena.child(self.arena.child(lhs, 0), 0);
        let addr_clone = self.arena.clone_subtree(addr_expr);
        let addr_lhs = self.make_identifier(addr_name);
        let drive_addr = self
            .arena
            .node_with(NodeKind::AssignLe, vec![addr_lhs, addr_clone]);

        let rhs = self.arena.child(id, 1);
        let data_clone = self.arena.clone_subtree(rhs);
        let data_lhs = self.make_identifier(data_name);
        let drive_data = self
            .arena
            .node_with(NodeKind::AssignLe, vec![data_lhs, data_clone]);

        let ones = self.arena.const_bits(LogicVec::all_one(mem_width as u32), false);
        let en_lhs = self.make_identifier(en_name);
        let drive_en = self.arena.node_with(NodeKind::AssignLe, vec![en_lhs, ones]);

        let replacement = self
            .arena
            .node_with(NodeKind::Block, vec![drive_addr, drive_data, drive_en]);

        let addr_ref = self.make_identifier(addr_name);
        let data_ref = self.make_identifier(data_name);
        let en_ref = self.make_identifier(en_name);
        let memwr = self
            .arena
            .node_with(NodeKind::MemWr, vec![addr_ref, data_ref, en_ref]);
        self.arena.get_mut(memwr).name = mem_name;
        self.arena.add_child(module, memwr);

        Ok(replacement)
    }

    /// Constant folding through the arithmetic kernel.
    fn fold_constants(
        &mut self,
        id: NodeId,
        args: SimplifyArgs,
    ) -> ElabResult<Option<NodeId>> {
        let kind = self.arena.kind(id);
        let w = args.width_hint;
        let s = args.sign_hint;

        let folded = match kind {
            NodeKind::Identifier => self.fold_identifier(id, args),

            NodeKind::BitNot => self.fold_unary_bits(id, calc::const_not, w, s),

            NodeKind::ToSigned | NodeKind::ToUnsigned => {
                let child = self.arena.child(id, 0);
                if self.arena.kind(child) == NodeKind::Constant {
                    let bits = self.const_bits_of(child, w, s);
                    Some(self.arena.const_bits(bits, kind == NodeKind::ToSigned))
                } else {
                    None
                }
            }

            NodeKind::BitAnd => self.fold_binary_bits(id, calc::const_and, w, s),
            NodeKind::BitOr => self.fold_binary_bits(id, calc::const_or, w, s),
            NodeKind::BitXor => self.fold_binary_bits(id, calc::const_xor, w, s),
            NodeKind::BitXnor => self.fold_binary_bits(id, calc::const_xnor, w, s),

            NodeKind::ReduceAnd => self.fold_reduction(id, calc::const_reduce_and),
            NodeKind::ReduceOr => self.fold_reduction(id, calc::const_reduce_or),
            NodeKind::ReduceXor => self.fold_reduction(id, calc::const_reduce_xor),
            NodeKind::ReduceXnor => self.fold_reduction(id, calc::const_reduce_xnor),
            NodeKind::ReduceBool => self.fold_reduction(id, calc::const_reduce_bool),

            NodeKind::LogicNot => {
                let child = self.arena.child(id, 0);
                let node = self.arena.get(child);
                if node.kind == NodeKind::Constant {
                    let bits = node.value.clone().expect("constant without payload");
                    let y = calc::const_logic_not(&bits, &LogicVec::new(0), node.is_signed, false, -1);
                    Some(self.arena.const_bits(y, false))
                } else if node.is_const() {
                    let truth = node.as_real(s).unwrap_or(0.0) == 0.0;
                    Some(self.arena.const_int(truth as i64, false, 1))
                } else {
                    None
                }
            }

            NodeKind::LogicAnd | NodeKind::LogicOr => self.fold_logic_binary(id, kind, s),

            NodeKind::ShiftLeft => self.fold_shift(id, calc::const_shl, w, s),
            NodeKind::ShiftRight => self.fold_shift(id, calc::const_shr, w, s),
            NodeKind::ShiftSLeft => self.fold_shift(id, calc::const_sshl, w, s),
            NodeKind::ShiftSRight => self.fold_shift(id, calc::const_sshr, w, s),
            NodeKind::Pow => self.fold_pow(id, w, s),

            NodeKind::Lt => self.fold_comparison(id, calc::const_lt, |o| o.is_lt()),
            NodeKind::Le => self.fold_comparison(id, calc::const_le, |o| o.is_le()),
            NodeKind::Eq => self.fold_comparison(id, calc::const_eq, |o| o.is_eq()),
            NodeKind::Ne => self.fold_comparison(id, calc::const_ne, |o| o.is_ne()),
            NodeKind::EqX => self.fold_comparison(id, calc::const_eqx, |o| o.is_eq()),
            NodeKind::NeX => self.fold_comparison(id, calc::const_nex, |o| o.is_ne()),
            NodeKind::Ge => self.fold_comparison(id, calc::const_ge, |o| o.is_ge()),
            NodeKind::Gt => self.fold_comparison(id, calc::const_gt, |o| o.is_gt()),

            NodeKind::Add => self.fold_arith(id, calc::const_add, |x, y| x + y, w, s),
            NodeKind::Sub => self.fold_arith(id, calc::const_sub, |x, y| x - y, w, s),
            NodeKind::Mul => self.fold_arith(id, calc::const_mul, |x, y| x * y, w, s),
            NodeKind::Div => self.fold_arith(id, calc::const_div, |x, y| x / y, w, s),
            NodeKind::Mod => self.fold_arith(id, calc::const_mod, real_mod, w, s),

            NodeKind::Pos | NodeKind::Neg => {
                let child = self.arena.child(id, 0);
                let node = self.arena.get(child);
                if node.kind == NodeKind::Constant {
                    let bits = self.const_bits_of(child, w, s);
                    let func = if kind == NodeKind::Pos {
                        calc::const_pos
                    } else {
                        calc::const_neg
                    };
                    let y = func(&bits, &LogicVec::new(0), s, false, w);
                    Some(self.arena.const_bits(y, s))
                } else if node.is_const() {
                    let x = node.as_real(s).unwrap_or(0.0);
                    let v = if kind == NodeKind::Pos { x } else { -x };
                    Some(self.arena.real_value(v))
                } else {
                    None
                }
            }

            NodeKind::Ternary => self.fold_ternary(id, args)?,

            NodeKind::Concat => self.fold_concat(id),

            NodeKind::Replicate => self.fold_replicate(id),

            _ => None,
        };
        Ok(folded)
    }

    /// A constant's bits, extended to the hint width under the context
    /// signedness when a hint is given.
    fn const_bits_of(&self, id: NodeId, width: i32, sign: bool) -> LogicVec {
        let node = self.arena.get(id);
        let bits = node.value.as_ref().expect("constant without payload");
        if width < 0 {
            bits.clone()
        } else {
            bits.extended(width as u32, sign)
        }
    }

    fn fold_identifier(&mut self, id: NodeId, args: SimplifyArgs) -> Option<NodeId> {
        let name = self.arena.get(id).name?;
        let decl = self.ctx.scope.get(name)?;
        let decl_kind = self.arena.kind(decl);
        if decl_kind.is_parameter() {
            let value = self.arena.child(decl, 0);
            let value_node = self.arena.get(value);
            if value_node.kind == NodeKind::Constant {
                let bits = value_node.value.clone().expect("constant without payload");
                let select = self.arena.get(id).children.first().copied();
                if let Some(range) = select {
                    let r = self.arena.get(range);
                    if r.kind == NodeKind::Range
                        && r.range_valid
                        && r.range_right >= 0
                        && r.range_left < bits.width() as i64
                    {
                        let lo = r.range_right as u32;
                        let len = (r.range_left - r.range_right + 1) as u32;
                        let sliced = bits.slice(lo, len);
                        return Some(self.arena.const_bits(sliced, false));
                    }
                    return None;
                }
                return Some(self.arena.clone_subtree(value));
            }
            if value_node.is_const() {
                return Some(self.arena.clone_subtree(value));
            }
            return None;
        }
        if args.at_zero && matches!(decl_kind, NodeKind::Wire | NodeKind::AutoWire) {
            return Some(
                self.arena
                    .const_int(0, args.sign_hint, args.width_hint),
            );
        }
        None
    }

    fn fold_unary_bits(
        &mut self,
        id: NodeId,
        func: calc::ConstFn,
        w: i32,
        s: bool,
    ) -> Option<NodeId> {
        let child = self.arena.child(id, 0);
        if self.arena.kind(child) != NodeKind::Constant {
            return None;
        }
        let bits = self.const_bits_of(child, w, s);
        let y = func(&bits, &LogicVec::new(0), s, false, w);
        Some(self.arena.const_bits(y, s))
    }

    fn fold_binary_bits(
        &mut self,
        id: NodeId,
        func: calc::ConstFn,
        w: i32,
        s: bool,
    ) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        if self.arena.kind(a) != NodeKind::Constant || self.arena.kind(b) != NodeKind::Constant {
            return None;
        }
        let av = self.const_bits_of(a, w, s);
        let bv = self.const_bits_of(b, w, s);
        let y = func(&av, &bv, s, s, w);
        Some(self.arena.const_bits(y, s))
    }

    fn fold_reduction(&mut self, id: NodeId, func: calc::ConstFn) -> Option<NodeId> {
        let child = self.arena.child(id, 0);
        let node = self.arena.get(child);
        if node.kind != NodeKind::Constant {
            return None;
        }
        let bits = node.value.clone().expect("constant without payload");
        let y = func(&bits, &LogicVec::new(0), false, false, -1);
        Some(self.arena.const_bits(y, false))
    }

    fn fold_logic_binary(&mut self, id: NodeId, kind: NodeKind, s: bool) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        let (an, bn) = (self.arena.get(a), self.arena.get(b));
        if an.kind == NodeKind::Constant && bn.kind == NodeKind::Constant {
            let av = an.value.clone().expect("constant without payload");
            let bv = bn.value.clone().expect("constant without payload");
            let func = if kind == NodeKind::LogicAnd {
                calc::const_logic_and
            } else {
                calc::const_logic_or
            };
            let y = func(&av, &bv, an.is_signed, bn.is_signed, -1);
            return Some(self.arena.const_bits(y, false));
        }
        if an.is_const() && bn.is_const() {
            let x = an.as_real(s).unwrap_or(0.0) != 0.0;
            let y = bn.as_real(s).unwrap_or(0.0) != 0.0;
            let v = if kind == NodeKind::LogicAnd {
                x && y
            } else {
                x || y
            };
            return Some(self.arena.const_int(v as i64, false, 1));
        }
        None
    }

    fn fold_shift(
        &mut self,
        id: NodeId,
        func: calc::ConstFn,
        w: i32,
        s: bool,
    ) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        if self.arena.kind(a) != NodeKind::Constant || self.arena.kind(b) != NodeKind::Constant {
            return None;
        }
        let av = self.const_bits_of(a, w, s);
        let bv = self
            .arena
            .get(b)
            .value
            .clone()
            .expect("constant without payload");
        let y = func(&av, &bv, s, false, w);
        Some(self.arena.const_bits(y, s))
    }

    fn fold_pow(&mut self, id: NodeId, w: i32, s: bool) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        let (an, bn) = (self.arena.get(a), self.arena.get(b));
        if an.kind == NodeKind::Constant && bn.kind == NodeKind::Constant {
            let av = self.const_bits_of(a, w, s);
            let bv = bn.value.clone().expect("constant without payload");
            let b_signed = bn.is_signed;
            let y = calc::const_pow(&av, &bv, s, b_signed, w);
            return Some(self.arena.const_bits(y, s));
        }
        if an.is_const() && bn.is_const() {
            let v = an.as_real(s).unwrap_or(0.0).powf(bn.as_real(s).unwrap_or(0.0));
            return Some(self.arena.real_value(v));
        }
        None
    }

    fn fold_comparison(
        &mut self,
        id: NodeId,
        func: calc::ConstFn,
        real_cmp: fn(std::cmp::Ordering) -> bool,
    ) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        let (an, bn) = (self.arena.get(a), self.arena.get(b));
        if an.kind == NodeKind::Constant && bn.kind == NodeKind::Constant {
            let av = an.value.clone().expect("constant without payload");
            let bv = bn.value.clone().expect("constant without payload");
            let cmp_width = av.width().max(bv.width());
            let cmp_signed = an.is_signed && bn.is_signed;
            let ae = av.extended(cmp_width, cmp_signed);
            let be = bv.extended(cmp_width, cmp_signed);
            let y = func(&ae, &be, cmp_signed, cmp_signed, 1);
            return Some(self.arena.const_bits(y, false));
        }
        if an.is_const() && bn.is_const() {
            let cmp_signed = (an.kind == NodeKind::RealValue || an.is_signed)
                && (bn.kind == NodeKind::RealValue || bn.is_signed);
            let x = an.as_real(cmp_signed).unwrap_or(0.0);
            let y = bn.as_real(cmp_signed).unwrap_or(0.0);
            let v = x.partial_cmp(&y).is_some_and(real_cmp);
            return Some(self.arena.const_int(v as i64, false, 1));
        }
        None
    }

    fn fold_arith(
        &mut self,
        id: NodeId,
        func: calc::ConstFn,
        real_op: fn(f64, f64) -> f64,
        w: i32,
        s: bool,
    ) -> Option<NodeId> {
        let a = self.arena.child(id, 0);
        let b = self.arena.child(id, 1);
        let (an, bn) = (self.arena.get(a), self.arena.get(b));
        if an.kind == NodeKind::Constant && bn.kind == NodeKind::Constant {
            let av = self.const_bits_of(a, w, s);
            let bv = self.const_bits_of(b, w, s);
            let y = func(&av, &bv, s, s, w);
            return Some(self.arena.const_bits(y, s));
        }
        if an.is_const() && bn.is_const() {
            let v = real_op(an.as_real(s).unwrap_or(0.0), bn.as_real(s).unwrap_or(0.0));
            return Some(self.arena.real_value(v));
        }
        None
    }

    fn fold_ternary(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<Option<NodeId>> {
        let cond = self.arena.child(id, 0);
        let cond_node = self.arena.get(cond);
        if !cond_node.is_const() {
            return Ok(None);
        }
        let (sure_true, maybe_true) = if cond_node.kind == NodeKind::Constant {
            let bits = cond_node.value.as_ref().expect("constant without payload");
            (bits.any_one(), bits.any_undef())
        } else {
            (cond_node.as_real(args.sign_hint).unwrap_or(0.0) != 0.0, false)
        };

        let then_id = self.arena.child(id, 1);
        let else_id = self.arena.child(id, 2);
        let chosen = if sure_true {
            Some((then_id, else_id))
        } else if !maybe_true {
            Some((else_id, then_id))
        } else {
            None
        };

        if let Some((choice, not_choice)) = chosen {
            let choice_node = self.arena.get(choice);
            if choice_node.kind == NodeKind::Constant {
                let (_, _, other_real) = self.detect_sign_width_real(not_choice)?;
                if other_real {
                    let (_, cs) = self.detect_sign_width(choice)?;
                    let v = self.arena.get(choice).as_real(cs).unwrap_or(0.0);
                    return Ok(Some(self.arena.real_value(v)));
                }
                let is_string = choice_node.is_string;
                let bits = self.const_bits_of(choice, args.width_hint, args.sign_hint);
                if is_string && bits.width() % 8 == 0 && !args.sign_hint {
                    return Ok(Some(self.arena.const_str(bits)));
                }
                return Ok(Some(self.arena.const_bits(bits, args.sign_hint)));
            }
            if choice_node.is_const() {
                return Ok(Some(self.arena.clone_subtree(choice)));
            }
            return Ok(None);
        }

        // condition is X/Z: merge the arms bit-wise
        let (tn, en) = (self.arena.get(then_id), self.arena.get(else_id));
        if tn.kind == NodeKind::Constant && en.kind == NodeKind::Constant {
            let a = self.const_bits_of(then_id, args.width_hint, args.sign_hint);
            let b = self.const_bits_of(else_id, args.width_hint, args.sign_hint);
            if a.width() == b.width() {
                let mut merged = a.clone();
                for i in 0..a.width() {
                    if a.get(i) != b.get(i) {
                        merged.set(i, Logic::X);
                    }
                }
                return Ok(Some(self.arena.const_bits(merged, args.sign_hint)));
            }
            return Ok(None);
        }
        if tn.is_const() && en.is_const() {
            let x = tn.as_real(args.sign_hint).unwrap_or(0.0);
            let y = en.as_real(args.sign_hint).unwrap_or(0.0);
            // an ambiguous real conditional yields the type's default value
            let v = if x == y { x } else { 0.0 };
            return Ok(Some(self.arena.real_value(v)));
        }
        Ok(None)
    }

    fn fold_concat(&mut self, id: NodeId) -> Option<NodeId> {
        let children = self.arena.get(id).children.clone();
        let mut string_op = !children.is_empty();
        let mut bits = LogicVec::new(0);
        for &child in &children {
            let node = self.arena.get(child);
            if node.kind != NodeKind::Constant {
                return None;
            }
            if !node.is_string {
                string_op = false;
            }
            bits = bits.concat(node.value.as_ref().expect("constant without payload"));
        }
        Some(if string_op {
            self.arena.const_str(bits)
        } else {
            self.arena.const_bits(bits, false)
        })
    }

    fn fold_replicate(&mut self, id: NodeId) -> Option<NodeId> {
        let count_id = self.arena.child(id, 0);
        let value_id = self.arena.child(id, 1);
        if self.arena.kind(count_id) != NodeKind::Constant
            || self.arena.kind(value_id) != NodeKind::Constant
        {
            return None;
        }
        let count = self.arena.get(count_id).as_i64()?.max(0) as u32;
        let value = self.arena.get(value_id);
        let is_string = value.is_string;
        let bits = value
            .value
            .as_ref()
            .expect("constant without payload")
            .repeated(count);
        Some(if is_string {
            self.arena.const_str(bits)
        } else {
            self.arena.const_bits(bits, false)
        })
    }
}


#[cfg(test)]
mod tests {
    use crate::context::ElabConfig;
    use crate::Elaborator;
    use tarn_ast::{AstArena, NodeId, NodeKind};
    use tarn_common::{Interner, LogicVec};
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

        fn elaborate(&mut self, module: NodeId) {
            let mut elab = Elaborator::new(
                &mut self.arena,
                &self.interner,
                &self.sink,
                ElabConfig::default(),
            );
            elab.elaborate(module).expect("elaboration failed");
        }

        fn elaborate_err(&mut self, module: NodeId) -> crate::ElabError {
            let mut elab = Elaborator::new(
                &mut self.arena,
                &self.interner,
                &self.sink,
                ElabConfig::default(),
            );
            elab.elaborate(module).expect_err("elaboration succeeded")
        }

        fn ident(&mut self, name: &str) -> NodeId {
            let n = self.interner.get_or_intern(name);
            let id = self.arena.node(NodeKind::Identifier);
            self.arena.get_mut(id).name = Some(n);
            id
        }

        fn named(&mut self, kind: NodeKind, name: &str, children: Vec<NodeId>) -> NodeId {
            let n = self.interner.get_or_intern(name);
            let id = self.arena.node_with(kind, children);
            self.arena.get_mut(id).name = Some(n);
            id
        }

        fn range(&mut self, left: i64, right: i64) -> NodeId {
            let l = self.arena.const_int(left, true, -1);
            let r = self.arena.const_int(right, true, -1);
            self.arena.node_with(NodeKind::Range, vec![l, r])
        }

        fn index(&mut self, expr: NodeId) -> NodeId {
            self.arena.node_with(NodeKind::Range, vec![expr])
        }

        fn wire(&mut self, name: &str, range: Option<NodeId>) -> NodeId {
            let children = range.map(|r| vec![r]).unwrap_or_default();
            self.named(NodeKind::Wire, name, children)
        }

        fn reg(&mut self, name: &str, range: Option<NodeId>) -> NodeId {
            let w = self.wire(name, range);
            self.arena.get_mut(w).is_reg = true;
            w
        }

        /// Finds a module child of the given kind and name.
        fn find(&self, module: NodeId, kind: NodeKind, name: &str) -> Option<NodeId> {
            let n = self.interner.get(name)?;
            self.arena
                .get(module)
                .children
                .iter()
                .copied()
                .find(|&c| self.arena.kind(c) == kind && self.arena.get(c).name == Some(n))
        }

        /// Counts nodes of a kind in the whole subtree.
        fn count_kind(&self, root: NodeId, kind: NodeKind) -> usize {
            let node = self.arena.get(root);
            let here = usize::from(node.kind == kind);
            here + node
                .children
                .iter()
                .map(|&c| self.count_kind(c, kind))
                .sum::<usize>()
        }
    }

    // ---- parameter folding ----

    #[test]
    fn parameter_substitutes_into_wire_range() {
        let mut f = Fixture::new();
        let four = f.arena.const_int(4, false, 32);
        let param = f.named(NodeKind::Parameter, "W", vec![four]);
        let w_ref = f.ident("W");
        let one = f.arena.const_int(1, false, 32);
        let msb = f.arena.node_with(NodeKind::Sub, vec![w_ref, one]);
        let lsb = f.arena.const_int(0, false, 32);
        let range = f.arena.node_with(NodeKind::Range, vec![msb, lsb]);
        let x = f.wire("x", Some(range));
        let module = f.arena.node_with(NodeKind::Module, vec![param, x]);

        f.elaborate(module);

        let x = f.find(module, NodeKind::Wire, "x").unwrap();
        let node = f.arena.get(x);
        assert!(node.range_valid);
        assert_eq!(node.range_left, 3);
        assert_eq!(node.range_right, 0);
        assert!(!f.sink.has_errors());
    }

    #[test]
    fn parameter_order_does_not_matter() {
        // B depends on A; declare B first
        let mut f = Fixture::new();
        let a_ref = f.ident("A");
        let one = f.arena.const_int(1, false, 32);
        let b_val = f.arena.node_with(NodeKind::Add, vec![a_ref, one]);
        let b = f.named(NodeKind::Parameter, "B", vec![b_val]);
        let a_val = f.arena.const_int(7, false, 32);
        let a = f.named(NodeKind::Parameter, "A", vec![a_val]);
        let module = f.arena.node_with(NodeKind::Module, vec![b, a]);

        f.elaborate(module);

        let b = f.find(module, NodeKind::Parameter, "B").unwrap();
        let value = f.arena.child(b, 0);
        assert_eq!(f.arena.get(value).as_i64(), Some(8));
    }

    #[test]
    fn oversized_parameter_truncates() {
        // parameter [7:0] X = 1024
        let mut f = Fixture::new();
        let value = f.arena.const_int(1024, false, 32);
        let range = f.range(7, 0);
        let x = f.named(NodeKind::Parameter, "X", vec![value, range]);
        let module = f.arena.node_with(NodeKind::Module, vec![x]);

        f.elaborate(module);

        let value = f.arena.child(x, 0);
        let node = f.arena.get(value);
        assert_eq!(node.value.as_ref().unwrap().width(), 8);
        assert!(node.value.as_ref().unwrap().is_all_zero());
        assert!(!node.is_signed);
    }

    #[test]
    fn signed_parameter_sign_extends() {
        // parameter signed [3:0] X = -1
        let mut f = Fixture::new();
        let value = f.arena.const_int(-1, true, 32);
        let range = f.range(3, 0);
        let x = f.named(NodeKind::Parameter, "X", vec![value, range]);
        f.arena.get_mut(x).is_signed = true;
        let module = f.arena.node_with(NodeKind::Module, vec![x]);

        f.elaborate(module);

        let value = f.arena.child(x, 0);
        let node = f.arena.get(value);
        assert_eq!(format!("{}", node.value.as_ref().unwrap()), "1111");
        assert!(node.is_signed);
    }

    // ---- ranges and wires ----

    #[test]
    fn range_canonicalizes_swapped_bounds() {
        let mut f = Fixture::new();
        let range = f.range(0, 7);
        let w = f.wire("w", Some(range));
        let module = f.arena.node_with(NodeKind::Module, vec![w]);

        f.elaborate(module);

        let node = f.arena.get(w);
        assert!(node.range_valid);
        assert_eq!(node.range_left, 7);
        assert_eq!(node.range_right, 0);
    }

    #[test]
    fn rangeless_wire_defaults_to_single_bit() {
        let mut f = Fixture::new();
        let w = f.wire("w", None);
        let module = f.arena.node_with(NodeKind::Module, vec![w]);

        f.elaborate(module);

        let node = f.arena.get(w);
        assert!(node.range_valid);
        assert_eq!((node.range_left, node.range_right), (0, 0));
    }

    #[test]
    fn redeclared_port_wire_merges() {
        // "output y; reg y;" collapses into one wire with both flags
        let mut f = Fixture::new();
        let port = f.wire("y", None);
        {
            let p = f.arena.get_mut(port);
            p.is_output = true;
            p.port_id = 1;
        }
        let redecl = f.reg("y", None);
        let module = f.arena.node_with(NodeKind::Module, vec![port, redecl]);

        f.elaborate(module);

        let children = &f.arena.get(module).children;
        assert_eq!(children.len(), 1);
        let merged = f.arena.get(children[0]);
        assert!(merged.is_output);
        assert!(merged.is_reg);
    }

    // ---- identifier resolution ----

    #[test]
    fn unresolved_identifier_creates_auto_wire() {
        let mut f = Fixture::new();
        let lhs = f.ident("y");
        let rhs = f.ident("ghost");
        let assign = f.arena.node_with(NodeKind::Assign, vec![lhs, rhs]);
        let y = f.wire("y", None);
        let module = f.arena.node_with(NodeKind::Module, vec![y, assign]);

        f.elaborate(module);

        let auto = f.find(module, NodeKind::AutoWire, "ghost").unwrap();
        assert_eq!(f.arena.get(rhs).resolved_target, Some(auto));
        assert_eq!(f.arena.get(lhs).resolved_target, Some(y));
    }

    // ---- generate constructs ----

    fn genfor_module(f: &mut Fixture, trip_count: i64) -> NodeId {
        let genvar = f.named(NodeKind::GenVar, "i", vec![]);
        let i1 = f.ident("i");
        let zero = f.arena.const_int(0, false, 32);
        let init = f.arena.node_with(NodeKind::AssignEq, vec![i1, zero]);
        let i2 = f.ident("i");
        let n = f.arena.const_int(trip_count, false, 32);
        let cond = f.arena.node_with(NodeKind::Lt, vec![i2, n]);
        let i3 = f.ident("i");
        let i4 = f.ident("i");
        let one = f.arena.const_int(1, false, 32);
        let next = f.arena.node_with(NodeKind::Add, vec![i4, one]);
        let step = f.arena.node_with(NodeKind::AssignEq, vec![i3, next]);
        let range = f.range(0, 0);
        let n_wire = f.wire("n", Some(range));
        let body = f.named(NodeKind::GenBlock, "g", vec![n_wire]);
        let genfor = f
            .arena
            .node_with(NodeKind::GenFor, vec![init, cond, step, body]);
        f.arena.node_with(NodeKind::Module, vec![genvar, genfor])
    }

    #[test]
    fn genfor_unrolls_with_scope_prefix() {
        let mut f = Fixture::new();
        let module = genfor_module(&mut f, 3);

        f.elaborate(module);

        for name in ["g[0].n", "g[1].n", "g[2].n"] {
            assert!(
                f.find(module, NodeKind::Wire, name).is_some(),
                "missing wire {name}"
            );
        }
        assert_eq!(f.count_kind(module, NodeKind::GenFor), 0);
        assert_eq!(f.count_kind(module, NodeKind::GenBlock), 0);
        assert!(!f.sink.has_errors());
    }

    #[test]
    fn genfor_zero_trips_leaves_module_empty() {
        let mut f = Fixture::new();
        let module = genfor_module(&mut f, 0);

        f.elaborate(module);

        assert!(f.arena.get(module).children.is_empty());
    }

    #[test]
    fn genif_selects_then_arm() {
        let mut f = Fixture::new();
        let value = f.arena.const_int(1, false, 32);
        let mode = f.named(NodeKind::Parameter, "MODE", vec![value]);
        let cond = f.ident("MODE");
        let a = f.wire("a", None);
        let then_arm = f.arena.node_with(NodeKind::GenBlock, vec![a]);
        let b = f.wire("b", None);
        let else_arm = f.arena.node_with(NodeKind::GenBlock, vec![b]);
        let genif = f
            .arena
            .node_with(NodeKind::GenIf, vec![cond, then_arm, else_arm]);
        let module = f.arena.node_with(NodeKind::Module, vec![mode, genif]);

        f.elaborate(module);

        assert!(f.find(module, NodeKind::Wire, "a").is_some());
        assert!(f.find(module, NodeKind::Wire, "b").is_none());
        assert_eq!(f.count_kind(module, NodeKind::GenIf), 0);
    }

    #[test]
    fn gencase_picks_matching_arm_and_discards_default() {
        let mut f = Fixture::new();
        let value = f.arena.const_int(0, false, 32);
        let mode = f.named(NodeKind::Parameter, "MODE", vec![value]);

        let scrutinee = f.ident("MODE");
        let zero = f.arena.const_int(0, false, 32);
        let a1 = f.wire("a", None);
        let lhs1 = f.ident("a");
        let rhs1 = f.arena.const_int(0, false, 1);
        let drv1 = f.arena.node_with(NodeKind::Assign, vec![lhs1, rhs1]);
        let blk1 = f.arena.node_with(NodeKind::GenBlock, vec![a1, drv1]);
        let arm1 = f.arena.node_with(NodeKind::Cond, vec![zero, blk1]);

        let def = f.arena.node(NodeKind::Default);
        let a2 = f.wire("a", None);
        let lhs2 = f.ident("a");
        let rhs2 = f.arena.const_int(1, false, 1);
        let drv2 = f.arena.node_with(NodeKind::Assign, vec![lhs2, rhs2]);
        let blk2 = f.arena.node_with(NodeKind::GenBlock, vec![a2, drv2]);
        let arm2 = f.arena.node_with(NodeKind::Cond, vec![def, blk2]);

        let gencase = f
            .arena
            .node_with(NodeKind::GenCase, vec![scrutinee, arm1, arm2]);
        let module = f.arena.node_with(NodeKind::Module, vec![mode, gencase]);

        f.elaborate(module);

        assert!(f.find(module, NodeKind::Wire, "a").is_some());
        assert_eq!(f.count_kind(module, NodeKind::GenCase), 0);
        // exactly one driver survived, assigning zero
        let assigns: Vec<NodeId> = f
            .arena
            .get(module)
            .children
            .iter()
            .copied()
            .filter(|&c| f.arena.kind(c) == NodeKind::Assign)
            .collect();
        assert_eq!(assigns.len(), 1);
        let rhs = f.arena.child(assigns[0], 1);
        assert_eq!(f.arena.get(rhs).as_u64(), Some(0));
    }

    // ---- dynamic-range left-hand sides ----

    #[test]
    fn dynamic_lhs_expands_to_case() {
        let mut f = Fixture::new();
        let r_range = f.range(3, 0);
        let r = f.reg("r", Some(r_range));
        let b = f.wire("b", None);
        let sel_range = f.range(1, 0);
        let sel = f.wire("sel", Some(sel_range));

        let sel_ref = f.ident("sel");
        let sel_idx = f.index(sel_ref);
        let lhs = f.ident("r");
        f.arena.add_child(lhs, sel_idx);
        let rhs = f.ident("b");
        let assign = f.arena.node_with(NodeKind::AssignEq, vec![lhs, rhs]);
        let block = f.arena.node_with(NodeKind::Block, vec![assign]);
        let always = f.arena.node_with(NodeKind::Always, vec![block]);
        let module = f
            .arena
            .node_with(NodeKind::Module, vec![r, b, sel, always]);

        f.elaborate(module);

        let case = f.arena.child(block, 0);
        assert_eq!(f.arena.kind(case), NodeKind::Case);
        let case_node = f.arena.get(case);
        // scrutinee plus one arm per starting bit
        assert_eq!(case_node.children.len(), 5);
        assert_eq!(
            f.arena.get(case_node.children[0]).name,
            Some(f.interner.get("sel").unwrap())
        );
        for (i, &cond) in case_node.children[1..].iter().enumerate() {
            assert_eq!(f.arena.kind(cond), NodeKind::Cond);
            let match_const = f.arena.child(cond, 0);
            assert_eq!(f.arena.get(match_const).as_i64(), Some(i as i64));
            let arm_block = f.arena.child(cond, 1);
            let arm_assign = f.arena.child(arm_block, 0);
            assert_eq!(f.arena.kind(arm_assign), NodeKind::AssignEq);
            let arm_lhs = f.arena.child(arm_assign, 0);
            let arm_range = f.arena.child(arm_lhs, 0);
            let rn = f.arena.get(arm_range);
            assert!(rn.range_valid);
            assert_eq!((rn.range_left, rn.range_right), (i as i64, i as i64));
        }
    }

    // ---- primitives and cell arrays ----

    #[test]
    fn nand_primitive_becomes_inverted_and() {
        let mut f = Fixture::new();
        let y = f.wire("y", None);
        let a = f.wire("a", None);
        let b = f.wire("b", None);
        let y_ref = f.ident("y");
        let a_ref = f.ident("a");
        let b_ref = f.ident("b");
        let arg_y = f.arena.node_with(NodeKind::Argument, vec![y_ref]);
        let arg_a = f.arena.node_with(NodeKind::Argument, vec![a_ref]);
        let arg_b = f.arena.node_with(NodeKind::Argument, vec![b_ref]);
        let prim = f.named(NodeKind::Primitive, "nand", vec![arg_y, arg_a, arg_b]);
        let module = f.arena.node_with(NodeKind::Module, vec![y, a, b, prim]);

        f.elaborate(module);

        assert_eq!(f.arena.kind(prim), NodeKind::Assign);
        let rhs = f.arena.child(prim, 1);
        assert_eq!(f.arena.kind(rhs), NodeKind::BitNot);
        let and = f.arena.child(rhs, 0);
        assert_eq!(f.arena.kind(and), NodeKind::BitAnd);
        assert_eq!(f.count_kind(module, NodeKind::Primitive), 0);
    }

    #[test]
    fn bufif1_primitive_becomes_tristate_ternary() {
        let mut f = Fixture::new();
        let y = f.wire("y", None);
        let a = f.wire("a", None);
        let en = f.wire("en", None);
        let y_ref = f.ident("y");
        let a_ref = f.ident("a");
        let en_ref = f.ident("en");
        let arg_y = f.arena.node_with(NodeKind::Argument, vec![y_ref]);
        let arg_a = f.arena.node_with(NodeKind::Argument, vec![a_ref]);
        let arg_en = f.arena.node_with(NodeKind::Argument, vec![en_ref]);
        let prim = f.named(NodeKind::Primitive, "bufif1", vec![arg_y, arg_a, arg_en]);
        let module = f.arena.node_with(NodeKind::Module, vec![y, a, en, prim]);

        f.elaborate(module);

        assert_eq!(f.arena.kind(prim), NodeKind::Assign);
        let tern = f.arena.child(prim, 1);
        assert_eq!(f.arena.kind(tern), NodeKind::Ternary);
        // else arm is the high-impedance constant
        let else_arm = f.arena.child(tern, 2);
        let bits = f.arena.get(else_arm).value.clone().unwrap();
        assert_eq!(format!("{bits}"), "Z");
    }

    #[test]
    fn cell_array_unrolls_with_tagged_types() {
        let mut f = Fixture::new();
        let range = f.range(3, 0);
        let cell_type = f.named(NodeKind::CellType, "foo", vec![]);
        let cell = f.named(NodeKind::Cell, "u", vec![cell_type]);
        let array = f.arena.node_with(NodeKind::CellArray, vec![range, cell]);
        let module = f.arena.node_with(NodeKind::Module, vec![array]);

        f.elaborate(module);

        assert_eq!(f.count_kind(module, NodeKind::CellArray), 0);
        for i in 0..4 {
            let cell = f.find(module, NodeKind::Cell, &format!("u[{i}]")).unwrap();
            let ty = f.arena.child(cell, 0);
            assert_eq!(
                f.interner.resolve(f.arena.get(ty).name.unwrap()),
                format!("$array:{i}:4:foo")
            );
        }
    }

    #[test]
    fn defparam_becomes_cell_paraset() {
        let mut f = Fixture::new();
        let cell_type = f.named(NodeKind::CellType, "foo", vec![]);
        let cell = f.named(NodeKind::Cell, "u1", vec![cell_type]);
        let value = f.arena.const_int(8, false, 32);
        let defparam = f.named(NodeKind::DefParam, "u1.WIDTH", vec![value]);
        let module = f.arena.node_with(NodeKind::Module, vec![cell, defparam]);

        f.elaborate(module);

        assert_eq!(f.count_kind(module, NodeKind::DefParam), 0);
        let cell_node = f.arena.get(cell);
        assert_eq!(cell_node.children.len(), 2);
        let paraset = cell_node.children[1];
        assert_eq!(f.arena.kind(paraset), NodeKind::ParaSet);
        assert_eq!(
            f.interner.resolve(f.arena.get(paraset).name.unwrap()),
            "WIDTH"
        );
        let bound = f.arena.child(paraset, 0);
        assert_eq!(f.arena.get(bound).as_i64(), Some(8));
    }

    #[test]
    fn prefix_collapses_to_qualified_identifier() {
        let mut f = Fixture::new();
        let range = f.range(0, 0);
        let target = f.wire("g[2].n", Some(range));
        let index = f.arena.const_int(2, false, 32);
        let inner = f.ident("n");
        let prefix = f.named(NodeKind::Prefix, "g", vec![index, inner]);
        let lhs = f.ident("y");
        let y = f.wire("y", None);
        let assign = f.arena.node_with(NodeKind::Assign, vec![lhs, prefix]);
        let module = f.arena.node_with(NodeKind::Module, vec![target, y, assign]);

        f.elaborate(module);

        assert_eq!(f.count_kind(module, NodeKind::Prefix), 0);
        let rhs = f.arena.child(assign, 1);
        assert_eq!(f.arena.kind(rhs), NodeKind::Identifier);
        assert_eq!(
            f.interner.resolve(f.arena.get(rhs).name.unwrap()),
            "g[2].n"
        );
        assert_eq!(f.arena.get(rhs).resolved_target, Some(target));
    }

    // ---- constant folding ----

    #[test]
    fn to_bits_slices_constant() {
        let mut f = Fixture::new();
        let width = f.arena.const_int(4, false, 32);
        let value = f.arena.const_int(255, false, 32);
        let to_bits = f.arena.node_with(NodeKind::ToBits, vec![width, value]);
        let param = f.named(NodeKind::LocalParam, "P", vec![to_bits]);
        let module = f.arena.node_with(NodeKind::Module, vec![param]);

        f.elaborate(module);

        let folded = f.arena.child(param, 0);
        let node = f.arena.get(folded);
        assert_eq!(node.value.as_ref().unwrap().width(), 4);
        assert_eq!(node.as_u64(), Some(15));
    }

    #[test]
    fn ternary_with_undefined_condition_merges_arms() {
        let mut f = Fixture::new();
        let cond = f.arena.const_bits(LogicVec::all_x(1), false);
        let a = f.arena.const_int(0b1100, false, 4);
        let b = f.arena.const_int(0b1010, false, 4);
        let tern = f.arena.node_with(NodeKind::Ternary, vec![cond, a, b]);
        let param = f.named(NodeKind::LocalParam, "P", vec![tern]);
        let module = f.arena.node_with(NodeKind::Module, vec![param]);

        f.elaborate(module);

        let folded = f.arena.child(param, 0);
        let bits = f.arena.get(folded).value.clone().unwrap();
        assert_eq!(format!("{bits}"), "1XX0");
    }

    #[test]
    fn while_outside_constant_function_is_fatal() {
        let mut f = Fixture::new();
        let cond = f.arena.const_int(1, false, 1);
        let body = f.arena.node(NodeKind::Block);
        let w = f.arena.node_with(NodeKind::While, vec![cond, body]);
        let block = f.arena.node_with(NodeKind::Block, vec![w]);
        let always = f.arena.node_with(NodeKind::Always, vec![block]);
        let module = f.arena.node_with(NodeKind::Module, vec![always]);

        let err = f.elaborate_err(module);
        assert_eq!(err.diagnostic.code, crate::errors::E320);
        assert!(f.sink.has_errors());
    }

    // ---- assertions ----

    #[test]
    fn assertion_splits_into_check_and_enable() {
        let mut f = Fixture::new();
        let a = f.wire("a", None);
        let a_ref = f.ident("a");
        let assert_node = f.arena.node_with(NodeKind::Assert, vec![a_ref]);
        let block = f.arena.node_with(NodeKind::Block, vec![assert_node]);
        let always = f.arena.node_with(NodeKind::Always, vec![block]);
        let module = f.arena.node_with(NodeKind::Module, vec![a, always]);

        f.elaborate(module);

        // the module gained CHECK/EN wires, an initial, and an assert
        let module_asserts: Vec<NodeId> = f
            .arena
            .get(module)
            .children
            .iter()
            .copied()
            .filter(|&c| f.arena.kind(c) == NodeKind::Assert)
            .collect();
        assert_eq!(module_asserts.len(), 1);
        assert_eq!(f.arena.get(module_asserts[0]).children.len(), 2);
        assert_eq!(f.count_kind(module, NodeKind::Initial), 1);

        // the process starts with the default drivers
        let first = f.arena.child(block, 0);
        assert_eq!(f.arena.kind(first), NodeKind::Block);
        let defaults = f.arena.get(first).children.clone();
        assert_eq!(defaults.len(), 2);
        // followed by the actual check and enable drivers
        let drives = f.arena.get(block).children.clone();
        assert_eq!(drives.len(), 2);
        let check_drive = f.arena.child(drives[1], 0);
        assert_eq!(f.arena.kind(check_drive), NodeKind::AssignLe);
        let reduced = f.arena.child(check_drive, 1);
        assert_eq!(f.arena.kind(reduced), NodeKind::ReduceBool);
    }

    // ---- memory ports ----

    #[test]
    fn synchronous_memory_write_becomes_write_port() {
        let mut f = Fixture::new();
        let bit_range = f.range(7, 0);
        let size_range = f.range(0, 3);
        let mem = f.named(NodeKind::Memory, "m", vec![bit_range, size_range]);
        f.arena.get_mut(mem).is_reg = true;
        let clk = f.wire("clk", None);
        let addr_range = f.range(1, 0);
        let addr = f.wire("addr", Some(addr_range));
        let data_range = f.range(7, 0);
        let data = f.wire("data", Some(data_range));

        let addr_ref = f.ident("addr");
        let word = f.index(addr_ref);
        let lhs = f.ident("m");
        f.arena.add_child(lhs, word);
        let rhs = f.ident("data");
        let assign = f.arena.node_with(NodeKind::AssignLe, vec![lhs, rhs]);
        let block = f.arena.node_with(NodeKind::Block, vec![assign]);
        let clk_ref = f.ident("clk");
        let edge = f.arena.node_with(NodeKind::PosEdge, vec![clk_ref]);
        let always = f.arena.node_with(NodeKind::Always, vec![edge, block]);
        let module = f
            .arena
            .node_with(NodeKind::Module, vec![mem, clk, addr, data, always]);

        f.elaborate(module);

        // the memory survives and gained a write port
        assert!(f.arena.is_alive(mem));
        assert_eq!(f.count_kind(module, NodeKind::MemWr), 1);
        let memwr = f
            .arena
            .get(module)
            .children
            .iter()
            .copied()
            .find(|&c| f.arena.kind(c) == NodeKind::MemWr)
            .unwrap();
        assert_eq!(f.arena.get(memwr).children.len(), 3);
        assert_eq!(
            f.interner.resolve(f.arena.get(memwr).name.unwrap()),
            "m"
        );
        // the block now drives ADDR/DATA/EN, with defaults up front
        let stmts = f.arena.get(block).children.clone();
        assert_eq!(f.arena.kind(stmts[0]), NodeKind::Block);
        assert_eq!(f.arena.kind(stmts[1]), NodeKind::Block);
        assert_eq!(f.arena.get(stmts[1]).children.len(), 3);
        assert!(!f.sink.has_errors());

        // every identifier resolves to a declaration still in the tree
        fn check_resolved(f: &Fixture, id: NodeId) {
            let node = f.arena.get(id);
            if node.kind == NodeKind::Identifier {
                let target = node.resolved_target.expect("unresolved identifier");
                assert!(f.arena.is_alive(target));
            }
            for &c in &node.children {
                check_resolved(f, c);
            }
        }
        check_resolved(&f, module);
    }

    #[test]
    fn memory_read_becomes_read_port() {
        let mut f = Fixture::new();
        let bit_range = f.range(7, 0);
        let size_range = f.range(0, 3);
        let mem = f.named(NodeKind::Memory, "m", vec![bit_range, size_range]);
        f.arena.get_mut(mem).is_reg = true;
        let addr_range = f.range(1, 0);
        let addr = f.wire("addr", Some(addr_range));
        let y_range = f.range(7, 0);
        let y = f.wire("y", Some(y_range));

        let addr_ref = f.ident("addr");
        let word = f.index(addr_ref);
        let rhs = f.ident("m");
        f.arena.add_child(rhs, word);
        let lhs = f.ident("y");
        let assign = f.arena.node_with(NodeKind::Assign, vec![lhs, rhs]);
        let module = f
            .arena
            .node_with(NodeKind::Module, vec![mem, addr, y, assign]);

        f.elaborate(module);

        assert!(f.arena.is_alive(mem));
        let port = f.arena.child(assign, 1);
        assert_eq!(f.arena.kind(port), NodeKind::MemRd);
        assert_eq!(f.arena.get(port).children.len(), 1);
        assert_eq!(f.arena.get(port).resolved_target, Some(mem));
    }

    // ---- idempotence ----

    #[test]
    fn elaborating_twice_is_a_no_op() {
        let mut f = Fixture::new();
        let module = genfor_module(&mut f, 3);
        f.elaborate(module);

        let snapshot = f.arena.clone_subtree(module);
        f.elaborate(snapshot);

        assert!(f.arena.structurally_equal(module, snapshot));
    }

    #[test]
    fn simplified_tree_satisfies_downstream_contract() {
        let mut f = Fixture::new();
        let module = genfor_module(&mut f, 3);
        f.elaborate(module);

        for kind in [
            NodeKind::GenFor,
            NodeKind::GenIf,
            NodeKind::GenCase,
            NodeKind::GenBlock,
            NodeKind::Prefix,
            NodeKind::CellArray,
            NodeKind::Primitive,
            NodeKind::DefParam,
            NodeKind::For,
            NodeKind::While,
            NodeKind::Repeat,
            NodeKind::ToBits,
            NodeKind::ToSigned,
            NodeKind::ToUnsigned,
            NodeKind::GenVar,
            NodeKind::Function,
            NodeKind::Task,
            NodeKind::FCall,
            NodeKind::TCall,
        ] {
            assert_eq!(f.count_kind(module, kind), 0, "leftover {kind:?}");
        }
    }
}
