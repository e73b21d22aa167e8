//! Bottom-up width and sign inference.
//!
//! Expression width follows the usual HDL rules: context-determined
//! operands share the accumulated width (the maximum over the expression),
//! signedness is the AND over all operands, and self-determined positions
//! (shift amounts, replication counts, concat elements, condition of a
//! ternary) are measured on their own. The simplifier feeds the results
//! back into recursive invocations as width/sign hints.

use crate::errors::{self, ElabResult};
use crate::Elaborator;
use tarn_ast::{NodeId, NodeKind};

impl Elaborator<'_> {
    /// Detects the width and signedness of an expression.
    pub(crate) fn detect_sign_width(&self, id: NodeId) -> ElabResult<(i32, bool)> {
        let (width, sign, _) = self.detect_sign_width_real(id)?;
        Ok((width, sign))
    }

    /// Detects width, signedness, and whether the expression is real-typed.
    pub(crate) fn detect_sign_width_real(&self, id: NodeId) -> ElabResult<(i32, bool, bool)> {
        let mut width = -1;
        let mut sign = true;
        let mut real = false;
        self.detect_worker(id, &mut width, &mut sign, &mut real)?;
        Ok((width, sign, real))
    }

    /// Measures a subexpression in a fresh accumulator.
    fn detect_fresh(&self, id: NodeId) -> ElabResult<(i32, bool, bool)> {
        self.detect_sign_width_real(id)
    }

    /// Accumulating worker: widens `width`, narrows `sign`, raises `real`.
    pub(crate) fn detect_worker(
        &self,
        id: NodeId,
        width: &mut i32,
        sign: &mut bool,
        real: &mut bool,
    ) -> ElabResult<()> {
        let node = self.arena.get(id);
        let span = node.span;
        match node.kind {
            NodeKind::Constant => {
                let bits = node.value.as_ref().expect("constant without payload");
                *width = (*width).max(bits.width() as i32);
                if !node.is_signed {
                    *sign = false;
                }
            }
            NodeKind::RealValue => {
                *real = true;
                *width = (*width).max(32);
            }
            NodeKind::Identifier => {
                self.detect_identifier(id, width, sign, real)?;
            }
            NodeKind::MemRd => {
                let decl = self.resolved_decl(id);
                let Some(mem) = decl.filter(|&d| self.arena.kind(d) == NodeKind::Memory) else {
                    return Err(self.fatal(errors::error_cannot_detect_width(span)));
                };
                let elem_range = self.arena.child(mem, 0);
                let w = self.arena.get(elem_range).range_width().unwrap_or(1);
                *width = (*width).max(w as i32);
                if !self.arena.get(mem).is_signed {
                    *sign = false;
                }
            }
            NodeKind::FCall => {
                self.detect_fcall(id, width, sign, real)?;
            }
            NodeKind::ToBits => {
                let size = self.arena.get(self.arena.child(id, 0));
                let Some(w) = size.as_i64() else {
                    return Err(self.fatal(errors::error_not_constant(
                        "width operand of conversion",
                        span,
                    )));
                };
                let (_, s, r) = self.detect_fresh(self.arena.child(id, 1))?;
                *width = (*width).max(w as i32);
                if !s {
                    *sign = false;
                }
                *real |= r;
            }
            NodeKind::ToSigned => {
                let (w, _, r) = self.detect_fresh(self.arena.child(id, 0))?;
                *width = (*width).max(w);
                *real |= r;
            }
            NodeKind::ToUnsigned => {
                let (w, _, r) = self.detect_fresh(self.arena.child(id, 0))?;
                *width = (*width).max(w);
                *sign = false;
                *real |= r;
            }
            NodeKind::Concat => {
                let mut total = 0;
                for &child in &node.children {
                    let (w, _, _) = self.detect_fresh(child)?;
                    total += w.max(0);
                }
                *width = (*width).max(total);
                *sign = false;
            }
            NodeKind::Replicate => {
                let count = self.arena.get(self.arena.child(id, 0));
                let Some(n) = count.as_i64() else {
                    return Err(self.fatal(errors::error_not_constant("replication count", span)));
                };
                let (w, _, _) = self.detect_fresh(self.arena.child(id, 1))?;
                *width = (*width).max(n as i32 * w.max(0));
                *sign = false;
            }
            NodeKind::ReduceAnd
            | NodeKind::ReduceOr
            | NodeKind::ReduceXor
            | NodeKind::ReduceXnor
            | NodeKind::ReduceBool
            | NodeKind::LogicAnd
            | NodeKind::LogicOr
            | NodeKind::LogicNot
            | NodeKind::Lt
            | NodeKind::Le
            | NodeKind::Eq
            | NodeKind::Ne
            | NodeKind::EqX
            | NodeKind::NeX
            | NodeKind::Ge
            | NodeKind::Gt => {
                *width = (*width).max(1);
                *sign = false;
            }
            NodeKind::BitNot | NodeKind::Pos | NodeKind::Neg => {
                self.detect_worker(node.children[0], width, sign, real)?;
            }
            NodeKind::BitAnd
            | NodeKind::BitOr
            | NodeKind::BitXor
            | NodeKind::BitXnor
            | NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod => {
                self.detect_worker(node.children[0], width, sign, real)?;
                self.detect_worker(node.children[1], width, sign, real)?;
            }
            NodeKind::ShiftLeft
            | NodeKind::ShiftRight
            | NodeKind::ShiftSLeft
            | NodeKind::ShiftSRight
            | NodeKind::Pow => {
                // the right operand is self-determined and does not
                // contribute to the result width
                self.detect_worker(node.children[0], width, sign, real)?;
            }
            NodeKind::Ternary => {
                self.detect_worker(node.children[1], width, sign, real)?;
                self.detect_worker(node.children[2], width, sign, real)?;
            }
            _ => {
                return Err(self.fatal(errors::error_cannot_detect_width(span)));
            }
        }
        Ok(())
    }

    /// Returns the declaration a node refers to, preferring the resolved
    /// back-reference and falling back to a scope lookup.
    pub(crate) fn resolved_decl(&self, id: NodeId) -> Option<NodeId> {
        let node = self.arena.get(id);
        if let Some(target) = node.resolved_target {
            if self.arena.is_alive(target) {
                return Some(target);
            }
        }
        node.name.and_then(|name| self.ctx.scope.get(name))
    }

    fn detect_identifier(
        &self,
        id: NodeId,
        width: &mut i32,
        sign: &mut bool,
        real: &mut bool,
    ) -> ElabResult<()> {
        let span = self.arena.get(id).span;
        let Some(decl) = self.resolved_decl(id) else {
            return Err(self.fatal(errors::error_cannot_detect_width(span)));
        };
        let decl_node = self.arena.get(decl);
        let has_select = !self.arena.get(id).children.is_empty();
        match decl_node.kind {
            NodeKind::Parameter | NodeKind::LocalParam => {
                let value = self.arena.get(decl_node.children[0]);
                match value.kind {
                    NodeKind::Constant => {
                        let bits = value.value.as_ref().expect("constant without payload");
                        *width = (*width).max(bits.width() as i32);
                        if !value.is_signed {
                            *sign = false;
                        }
                    }
                    NodeKind::RealValue => {
                        *real = true;
                        *width = (*width).max(32);
                    }
                    _ => {
                        // parameter not folded yet: use its declared range,
                        // defaulting to integer width
                        let w = decl_node
                            .children
                            .get(1)
                            .and_then(|&r| self.arena.get(r).range_width())
                            .unwrap_or(32);
                        *width = (*width).max(w as i32);
                        if !decl_node.is_signed {
                            *sign = false;
                        }
                    }
                }
            }
            NodeKind::GenVar => {
                *width = (*width).max(32);
            }
            NodeKind::Wire | NodeKind::AutoWire => {
                if has_select {
                    let range = self.arena.get(self.arena.child(id, 0));
                    if range.range_valid {
                        *width = (*width).max((range.range_left - range.range_right + 1) as i32);
                    } else if range.children.len() == 1 {
                        // dynamic single-bit select
                        *width = (*width).max(1);
                    } else {
                        return Err(self.fatal(errors::error_dynamic_range_select(
                            self.name_str(id),
                            span,
                        )));
                    }
                    // selects are always unsigned
                    *sign = false;
                } else {
                    let w = decl_node.range_width().unwrap_or(1);
                    *width = (*width).max(w as i32);
                    if !decl_node.is_signed {
                        *sign = false;
                    }
                }
            }
            NodeKind::Memory => {
                let elem_range = self.arena.child(decl, 0);
                let w = self.arena.get(elem_range).range_width().unwrap_or(1);
                *width = (*width).max(w as i32);
                if !decl_node.is_signed {
                    *sign = false;
                }
            }
            _ => {
                return Err(self.fatal(errors::error_cannot_detect_width(span)));
            }
        }
        Ok(())
    }

    fn detect_fcall(
        &self,
        id: NodeId,
        width: &mut i32,
        sign: &mut bool,
        real: &mut bool,
    ) -> ElabResult<()> {
        let node = self.arena.get(id);
        let span = node.span;
        let Some(name) = node.name else {
            return Err(self.fatal(errors::error_cannot_detect_width(span)));
        };
        let name_str = self.interner.resolve(name);
        if name_str == "$clog2" {
            *width = (*width).max(32);
            *sign = false;
            return Ok(());
        }
        if name_str.starts_with('$') {
            // real-math system functions yield reals
            *real = true;
            *width = (*width).max(32);
            return Ok(());
        }
        let decl = self
            .ctx
            .scope
            .get(name)
            .filter(|&d| self.arena.kind(d) == NodeKind::Function);
        let Some(decl) = decl else {
            return Err(self.fatal(errors::error_unknown_callable(
                "function",
                name_str,
                span,
            )));
        };
        // the function's result wire shares the function's name
        for &child in &self.arena.get(decl).children {
            let c = self.arena.get(child);
            if c.kind == NodeKind::Wire && c.name == Some(name) {
                let w = c.range_width().unwrap_or(1);
                *width = (*width).max(w as i32);
                if !c.is_signed {
                    *sign = false;
                }
                return Ok(());
            }
        }
        Err(self.fatal(errors::error_cannot_detect_width(span)))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::ElabConfig;
    use crate::Elaborator;
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
    fn constant_width_and_sign() {
        let mut f = Fixture::new();
        let unsigned = f.arena.const_int(5, false, 8);
        let signed = f.arena.const_int(-1, true, 4);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(unsigned).unwrap(), (8, false));
        assert_eq!(elab.detect_sign_width(signed).unwrap(), (4, true));
    }

    #[test]
    fn binary_takes_max_width_and_ands_sign() {
        let mut f = Fixture::new();
        let a = f.arena.const_int(1, true, 4);
        let b = f.arena.const_int(2, true, 8);
        let add = f.arena.node_with(NodeKind::Add, vec![a, b]);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(add).unwrap(), (8, true));
    }

    #[test]
    fn mixed_sign_becomes_unsigned() {
        let mut f = Fixture::new();
        let a = f.arena.const_int(1, true, 4);
        let b = f.arena.const_int(2, false, 4);
        let add = f.arena.node_with(NodeKind::Add, vec![a, b]);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(add).unwrap(), (4, false));
    }

    #[test]
    fn comparison_is_one_bit_unsigned() {
        let mut f = Fixture::new();
        let a = f.arena.const_int(1, true, 8);
        let b = f.arena.const_int(2, true, 8);
        let lt = f.arena.node_with(NodeKind::Lt, vec![a, b]);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(lt).unwrap(), (1, false));
    }

    #[test]
    fn shift_width_from_left_operand() {
        let mut f = Fixture::new();
        let a = f.arena.const_int(1, false, 8);
        let b = f.arena.const_int(20, false, 32);
        let shl = f.arena.node_with(NodeKind::ShiftLeft, vec![a, b]);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(shl).unwrap(), (8, false));
    }

    #[test]
    fn concat_sums_and_replicate_multiplies() {
        let mut f = Fixture::new();
        let a = f.arena.const_int(1, false, 4);
        let b = f.arena.const_int(2, false, 6);
        let concat = f.arena.node_with(NodeKind::Concat, vec![a, b]);

        let count = f.arena.const_int(3, false, 32);
        let val = f.arena.const_int(1, true, 5);
        let repl = f.arena.node_with(NodeKind::Replicate, vec![count, val]);

        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(concat).unwrap(), (10, false));
        assert_eq!(elab.detect_sign_width(repl).unwrap(), (15, false));
    }

    #[test]
    fn identifier_uses_declared_range() {
        let mut f = Fixture::new();
        let name = f.interner.get_or_intern("data");
        let wire = f.arena.node(NodeKind::Wire);
        f.arena.get_mut(wire).name = Some(name);
        f.arena.get_mut(wire).range_valid = true;
        f.arena.get_mut(wire).range_left = 7;
        f.arena.get_mut(wire).range_right = 0;
        f.arena.get_mut(wire).is_signed = true;

        let ident = f.arena.node(NodeKind::Identifier);
        f.arena.get_mut(ident).name = Some(name);
        f.arena.get_mut(ident).resolved_target = Some(wire);

        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(ident).unwrap(), (8, true));
    }

    #[test]
    fn bit_select_is_unsigned() {
        let mut f = Fixture::new();
        let name = f.interner.get_or_intern("data");
        let wire = f.arena.node(NodeKind::Wire);
        f.arena.get_mut(wire).name = Some(name);
        f.arena.get_mut(wire).range_valid = true;
        f.arena.get_mut(wire).range_left = 7;
        f.arena.get_mut(wire).range_right = 0;
        f.arena.get_mut(wire).is_signed = true;

        let mut range = tarn_ast::AstNode::new(NodeKind::Range);
        range.range_valid = true;
        range.range_left = 3;
        range.range_right = 2;
        let range = f.arena.alloc(range);
        let ident = f.arena.node_with(NodeKind::Identifier, vec![range]);
        f.arena.get_mut(ident).name = Some(name);
        f.arena.get_mut(ident).resolved_target = Some(wire);

        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(ident).unwrap(), (2, false));
    }

    #[test]
    fn ternary_measures_arms_only() {
        let mut f = Fixture::new();
        let cond = f.arena.const_int(1, false, 32);
        let a = f.arena.const_int(1, false, 4);
        let b = f.arena.const_int(2, false, 6);
        let tern = f.arena.node_with(NodeKind::Ternary, vec![cond, a, b]);
        let elab = f.elab();
        assert_eq!(elab.detect_sign_width(tern).unwrap(), (6, false));
    }

    #[test]
    fn real_detection() {
        let mut f = Fixture::new();
        let r = f.arena.real_value(1.5);
        let c = f.arena.const_int(1, false, 4);
        let add = f.arena.node_with(NodeKind::Add, vec![r, c]);
        let elab = f.elab();
        let (_, _, real) = elab.detect_sign_width_real(add).unwrap();
        assert!(real);
    }

    #[test]
    fn unresolved_identifier_is_fatal() {
        let mut f = Fixture::new();
        let name = f.interner.get_or_intern("ghost");
        let ident = f.arena.node(NodeKind::Identifier);
        f.arena.get_mut(ident).name = Some(name);
        let elab = f.elab();
        assert!(elab.detect_sign_width(ident).is_err());
        assert!(f.sink.has_errors());
    }
}
