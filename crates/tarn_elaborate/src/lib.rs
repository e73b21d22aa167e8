//! The Tarn elaboration engine.
//!
//! This crate rewrites a freshly parsed HDL design tree into the simplified
//! form the RTL lowering consumes: parameters substituted, names resolved
//! through lexical scopes, generate constructs and loops expanded, functions
//! and tasks inlined or constant-evaluated, constants folded bit-accurately,
//! dynamic-range assignments expanded, and memories either kept as memory
//! nodes or demoted to per-element registers.
//!
//! The entry point is [`Elaborator::elaborate`], which drives the recursive
//! simplifier to a fixed point over one module. Fatal problems in the input
//! are reported as diagnostics and abort elaboration through [`ElabError`];
//! warnings accumulate in the shared sink.

#![warn(missing_docs)]

pub mod calls;
pub mod const_func;
pub mod context;
pub mod errors;
pub mod genblock;
pub mod mem2reg;
pub mod simplify;
pub mod width;

pub use context::{ElabConfig, ElabContext, ScopeBackup, ScopeStack};
pub use errors::{ElabError, ElabResult};
pub use simplify::SimplifyArgs;

use tarn_ast::{AstArena, NodeId};
use tarn_common::{Ident, Interner};
use tarn_diagnostics::{Diagnostic, DiagnosticSink};

/// The elaboration engine for one design tree.
///
/// Borrows the arena holding the tree, the shared string interner, and the
/// diagnostic sink; owns the mutable elaboration context (scope, block
/// pointers, unique-name counter).
pub struct Elaborator<'a> {
    pub(crate) arena: &'a mut AstArena,
    pub(crate) interner: &'a Interner,
    pub(crate) sink: &'a DiagnosticSink,
    pub(crate) ctx: ElabContext,
}

impl<'a> Elaborator<'a> {
    /// Creates an elaborator over the given arena.
    pub fn new(
        arena: &'a mut AstArena,
        interner: &'a Interner,
        sink: &'a DiagnosticSink,
        config: ElabConfig,
    ) -> Self {
        Self {
            arena,
            interner,
            sink,
            ctx: ElabContext::new(config),
        }
    }

    /// Elaborates one module in place until no further change is possible.
    ///
    /// On success the module satisfies the downstream contract: no generate,
    /// loop, prefix, primitive, cell-array, defparam, conversion, function,
    /// or task nodes remain; identifiers are resolved; constant ranges are
    /// canonicalized.
    pub fn elaborate(&mut self, module: NodeId) -> ElabResult<()> {
        assert_eq!(
            self.arena.kind(module),
            tarn_ast::NodeKind::Module,
            "elaborate must be called on a Module node"
        );
        self.ctx.current_module = Some(module);
        self.simplify(module, SimplifyArgs::stage(0))?;
        Ok(())
    }

    /// Emits a diagnostic and wraps it in the fatal error that aborts the
    /// current elaboration.
    pub(crate) fn fatal(&self, diagnostic: Diagnostic) -> ElabError {
        self.sink.emit(diagnostic.clone());
        ElabError { diagnostic }
    }

    /// Interns a string.
    pub(crate) fn ident(&self, s: &str) -> Ident {
        self.interner.get_or_intern(s)
    }

    /// Resolves a node's name to a string for messages, `""` if unnamed.
    pub(crate) fn name_str(&self, id: NodeId) -> &str {
        match self.arena.get(id).name {
            Some(name) => self.interner.resolve(name),
            None => "",
        }
    }

    /// Returns the module currently being elaborated.
    ///
    /// # Panics
    ///
    /// Panics if called outside `elaborate` (an internal invariant).
    pub(crate) fn module(&self) -> NodeId {
        self.ctx
            .current_module
            .expect("simplifier invoked without a module context")
    }

    /// Reads a boolean attribute off a node.
    pub(crate) fn get_bool_attribute(&self, id: NodeId, name: &str) -> bool {
        let Some(attr_name) = self.interner.get(name) else {
            return false;
        };
        match self.arena.get(id).attributes.get(&attr_name) {
            Some(&value) => self.arena.get(value).as_bool(),
            None => false,
        }
    }
}
