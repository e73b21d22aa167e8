//! Function and task call rewriting.
//!
//! System functions fold to constants when their arguments do. User
//! functions either evaluate through the constant-function interpreter
//! (when the call site demands a constant or the body contains
//! constant-only constructs) or inline: function-local wires are cloned to
//! the module under a unique prefix, input-argument assignments are spliced
//! in front of the call, and the call collapses to a reference to the
//! result wire.

use crate::errors::{self, ElabResult};
use crate::simplify::SimplifyArgs;
use crate::Elaborator;
use std::collections::HashMap;
use tarn_ast::{NodeId, NodeKind};

/// System functions evaluated over IEEE-754 doubles.
const REAL_FUNCTIONS: &[&str] = &[
    "$ln", "$log10", "$exp", "$sqrt", "$pow", "$floor", "$ceil", "$sin", "$cos", "$tan", "$asin",
    "$acos", "$atan", "$atan2", "$hypot", "$sinh", "$cosh", "$tanh", "$asinh", "$acosh", "$atanh",
];

impl Elaborator<'_> {
    /// Rewrites an `FCall`/`TCall` node, returning its replacement.
    ///
    /// Returns `None` only when a function with a recommended-constant body
    /// has non-constant arguments and falls back to inlining (which always
    /// produces a replacement), so in practice a call never survives a
    /// visit.
    pub(crate) fn simplify_call(
        &mut self,
        id: NodeId,
        args: SimplifyArgs,
    ) -> ElabResult<Option<NodeId>> {
        let kind = self.arena.kind(id);
        let span = self.arena.get(id).span;
        let name = self.arena.get(id).name.expect("checked by caller");
        let name_str = self.interner.resolve(name).to_string();

        if kind == NodeKind::FCall {
            if name_str == "$clog2" {
                return self.fold_clog2(id, args).map(Some);
            }
            if REAL_FUNCTIONS.contains(&name_str.as_str()) {
                return self.fold_real_function(id, &name_str, args).map(Some);
            }
        }

        let expected_kind = if kind == NodeKind::FCall {
            NodeKind::Function
        } else {
            NodeKind::Task
        };
        let what = if kind == NodeKind::FCall {
            "function"
        } else {
            "task"
        };
        let decl = self
            .ctx
            .scope
            .get(name)
            .filter(|&d| self.arena.kind(d) == expected_kind);
        let Some(decl) = decl else {
            return Err(self.fatal(errors::error_unknown_callable(what, &name_str, span)));
        };

        let mut recommend = false;
        let require = if args.in_param {
            false
        } else {
            self.has_const_only_constructs(id, &mut recommend)
        };

        if args.in_param || recommend || require {
            let mut all_const = true;
            let call_args = self.arena.get(id).children.clone();
            for arg in call_args {
                self.simplify_loop(arg, SimplifyArgs::const_param(1))?;
                if self.arena.kind(arg) != NodeKind::Constant {
                    all_const = false;
                }
            }
            if all_const {
                let workspace = self.arena.clone_subtree(decl);
                let result = self.eval_const_function(workspace, id)?;
                self.arena.free(workspace);
                return Ok(Some(result));
            }
            if args.in_param {
                return Err(self.fatal(errors::error_fcall_not_constant(&name_str, span)));
            }
            if require {
                return Err(self.fatal(errors::error_const_args_required(&name_str, span)));
            }
        }

        self.inline_call(id, decl, name_str).map(Some)
    }

    /// `$clog2(x)`: the index of the highest set bit of the folded argument.
    fn fold_clog2(&mut self, id: NodeId, args: SimplifyArgs) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let argc = self.arena.get(id).children.len();
        if argc != 1 {
            return Err(self.fatal(errors::error_system_function_arity(
                "$clog2", 1, argc, span,
            )));
        }
        let arg = self.arena.child(id, 0);
        self.simplify_loop(
            arg,
            SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
        )?;
        if self.arena.kind(arg) != NodeKind::Constant {
            return Err(self.fatal(errors::error_not_constant(
                "argument of system function $clog2",
                span,
            )));
        }
        let bits = self.arena.get(arg).value.as_ref().expect("constant payload");
        let result = bits.highest_set_bit().unwrap_or(0) as i64;
        Ok(self.arena.const_int(result, false, -1))
    }

    /// The real-math system function family.
    fn fold_real_function(
        &mut self,
        id: NodeId,
        name: &str,
        args: SimplifyArgs,
    ) -> ElabResult<NodeId> {
        let span = self.arena.get(id).span;
        let two_arguments = matches!(name, "$pow" | "$atan2" | "$hypot");
        let expected = if two_arguments { 2 } else { 1 };
        let argc = self.arena.get(id).children.len();
        if argc != expected {
            return Err(self.fatal(errors::error_system_function_arity(
                name, expected, argc, span,
            )));
        }

        let mut operands = [0.0f64; 2];
        for i in 0..expected {
            let arg = self.arena.child(id, i);
            self.simplify_loop(
                arg,
                SimplifyArgs::const_eval(args.stage).with_hints(args.width_hint, args.sign_hint),
            )?;
            if !self.arena.get(arg).is_const() {
                return Err(self.fatal(errors::error_not_constant(
                    &format!("argument of system function {name}"),
                    span,
                )));
            }
            let (_, sign) = self.detect_sign_width(arg)?;
            operands[i] = self.arena.get(arg).as_real(sign).unwrap_or(0.0);
        }

        let (x, y) = (operands[0], operands[1]);
        let value = match name {
            "$ln" => x.ln(),
            "$log10" => x.log10(),
            "$exp" => x.exp(),
            "$sqrt" => x.sqrt(),
            "$pow" => x.powf(y),
            "$floor" => x.floor(),
            "$ceil" => x.ceil(),
            "$sin" => x.sin(),
            "$cos" => x.cos(),
            "$tan" => x.tan(),
            "$asin" => x.asin(),
            "$acos" => x.acos(),
            "$atan" => x.atan(),
            "$atan2" => x.atan2(y),
            "$hypot" => x.hypot(y),
            "$sinh" => x.sinh(),
            "$cosh" => x.cosh(),
            "$tanh" => x.tanh(),
            "$asinh" => x.asinh(),
            "$acosh" => x.acosh(),
            "$atanh" => x.atanh(),
            _ => unreachable!("filtered by REAL_FUNCTIONS"),
        };
        Ok(self.arena.real_value(value))
    }

    /// Inlines a function or task body at the call site.
    fn inline_call(
        &mut self,
        id: NodeId,
        decl: NodeId,
        name_str: String,
    ) -> ElabResult<NodeId> {
        let kind = self.arena.kind(id);
        let idx = self.ctx.next_autoidx();
        let prefix = format!("$func${name_str}${idx}$");
        let module = self.module();

        // continuous context: wrap the call in a synthesized process and
        // let the in-process path below do the real inlining
        if self.ctx.current_block.is_none() {
            assert_eq!(kind, NodeKind::FCall, "task call outside a process");
            let fname = self.arena.get(id).name.expect("checked by caller");
            let result_wire = self
                .arena
                .get(decl)
                .children
                .iter()
                .copied()
                .find(|&c| {
                    self.arena.kind(c) == NodeKind::Wire && self.arena.get(c).name == Some(fname)
                })
                .expect("function without a result wire");

            let wire = self.arena.clone_subtree(result_wire);
            let wire_name = self.ident(&format!("{prefix}{name_str}"));
            {
                let w = self.arena.get_mut(wire);
                w.name = Some(wire_name);
                w.port_id = 0;
                w.is_input = false;
                w.is_output = false;
            }
            self.arena.add_child(module, wire);
            self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;

            let lvalue = self.make_identifier(wire_name);
            let call_clone = self.arena.clone_subtree(id);
            let assign = self
                .arena
                .node_with(NodeKind::AssignEq, vec![lvalue, call_clone]);
            let block = self.arena.node_with(NodeKind::Block, vec![assign]);
            let always = self.arena.node_with(NodeKind::Always, vec![block]);
            self.arena.add_child(module, always);

            return Ok(self.make_identifier(wire_name));
        }

        let mut rename_rules: HashMap<tarn_common::Ident, tarn_common::Ident> = HashMap::new();
        let mut arg_index = 0usize;
        let call_args = self.arena.get(id).children.clone();
        let decl_children = self.arena.get(decl).children.clone();

        for item in decl_children {
            if self.arena.kind(item) == NodeKind::Wire {
                let old_name = self.arena.get(item).name.expect("unnamed function wire");
                let new_name =
                    self.ident(&format!("{prefix}{}", self.interner.resolve(old_name)));
                let wire = self.arena.clone_subtree(item);
                {
                    let w = self.arena.get_mut(wire);
                    w.name = Some(new_name);
                    w.port_id = 0;
                    w.is_input = false;
                    w.is_output = false;
                }
                self.arena.add_child(module, wire);
                self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;
                rename_rules.insert(old_name, new_name);

                if self.arena.get(item).is_input && arg_index < call_args.len() {
                    let arg = self.arena.clone_subtree(call_args[arg_index]);
                    arg_index += 1;
                    let lhs = self.make_identifier(new_name);
                    let assign = self.arena.node_with(NodeKind::AssignEq, vec![lhs, arg]);
                    self.insert_before_block_child(assign);
                }
            } else {
                let stmt = self.arena.clone_subtree(item);
                self.replace_ids(stmt, &rename_rules);
                self.insert_before_block_child(stmt);
            }
        }

        if kind == NodeKind::FCall {
            let result_name = self.ident(&format!("{prefix}{name_str}"));
            Ok(self.make_identifier(result_name))
        } else {
            // a task leaves no value behind
            Ok(self.arena.node(NodeKind::Block))
        }
    }
}
