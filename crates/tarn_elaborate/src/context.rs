//! Mutable elaboration state: configuration, scope stack, block pointers,
//! and the unique-name counter.
//!
//! The original design kept this state in process-wide globals; here it is
//! an explicit [`ElabContext`] owned by the elaborator and saved/restored
//! around nested naming contexts.

use std::collections::HashMap;
use tarn_ast::NodeId;
use tarn_common::Ident;

/// Process-wide configuration flags, set before elaboration starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElabConfig {
    /// Disables memory demotion entirely.
    pub no_mem2reg: bool,
    /// Demotes every memory to per-element registers.
    pub force_mem2reg: bool,
}

/// The lexical scope: a single mutable mapping from identifier to the node
/// that declares it.
///
/// Entering a module clears and repopulates the map. Nested naming contexts
/// (constant functions, generate scopes) shadow entries and restore them
/// from a [`ScopeBackup`] on exit. Lookup returns the innermost declaration.
#[derive(Debug, Default)]
pub struct ScopeStack {
    map: HashMap<Ident, NodeId>,
}

impl ScopeStack {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every binding.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Looks up the innermost declaration of a name.
    pub fn get(&self, name: Ident) -> Option<NodeId> {
        self.map.get(&name).copied()
    }

    /// Returns `true` if the name is bound.
    pub fn contains(&self, name: Ident) -> bool {
        self.map.contains_key(&name)
    }

    /// Installs a binding, returning whatever it shadowed.
    pub fn install(&mut self, name: Ident, decl: NodeId) -> Option<NodeId> {
        self.map.insert(name, decl)
    }

    /// Installs a binding and records the shadowed entry in `backup` so the
    /// caller can undo it later.
    pub fn shadow(&mut self, name: Ident, decl: NodeId, backup: &mut ScopeBackup) {
        let old = self.map.insert(name, decl);
        backup.record(name, old);
    }

    /// Restores a single binding to its pre-shadow state.
    pub fn restore_one(&mut self, name: Ident, old: Option<NodeId>) {
        match old {
            Some(decl) => {
                self.map.insert(name, decl);
            }
            None => {
                self.map.remove(&name);
            }
        }
    }

    /// Undoes every shadow recorded in `backup`.
    pub fn restore(&mut self, backup: ScopeBackup) {
        for (name, old) in backup.entries {
            self.restore_one(name, old);
        }
    }
}

/// The saved entries shadowed by a nested naming context.
///
/// Only the first shadow of each name is recorded, so restoring yields the
/// state from before the context was entered even if a name was rebound
/// several times inside it.
#[derive(Debug, Default)]
pub struct ScopeBackup {
    entries: HashMap<Ident, Option<NodeId>>,
}

impl ScopeBackup {
    /// Creates an empty backup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the pre-shadow state of a name, keeping the earliest record.
    pub fn record(&mut self, name: Ident, old: Option<NodeId>) {
        self.entries.entry(name).or_insert(old);
    }
}

impl IntoIterator for ScopeBackup {
    type Item = (Ident, Option<NodeId>);
    type IntoIter = std::collections::hash_map::IntoIter<Ident, Option<NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Mutable state carried through the recursive simplifier.
#[derive(Debug)]
pub struct ElabContext {
    /// Configuration flags.
    pub config: ElabConfig,
    /// The lexical scope.
    pub scope: ScopeStack,
    /// The module currently being elaborated.
    pub current_module: Option<NodeId>,
    /// The innermost statement block, if any.
    pub current_block: Option<NodeId>,
    /// The statement of `current_block` currently being visited; rewrites
    /// splice synthesized statements in front of it.
    pub current_block_child: Option<NodeId>,
    /// The top-level block of the enclosing `always`/`initial` process.
    pub current_top_block: Option<NodeId>,
    /// Monotonically increasing counter for synthesized names.
    autoidx: u32,
}

impl ElabContext {
    /// Creates a fresh context with the given configuration.
    pub fn new(config: ElabConfig) -> Self {
        Self {
            config,
            scope: ScopeStack::new(),
            current_module: None,
            current_block: None,
            current_block_child: None,
            current_top_block: None,
            autoidx: 0,
        }
    }

    /// Returns the next value of the unique-name counter.
    pub fn next_autoidx(&mut self) -> u32 {
        self.autoidx += 1;
        self.autoidx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> NodeId {
        NodeId::from_raw(raw)
    }

    fn name(raw: u32) -> Ident {
        Ident::from_raw(raw)
    }

    #[test]
    fn install_and_lookup() {
        let mut scope = ScopeStack::new();
        assert!(scope.get(name(0)).is_none());
        scope.install(name(0), id(1));
        assert_eq!(scope.get(name(0)), Some(id(1)));
        assert!(scope.contains(name(0)));
    }

    #[test]
    fn shadow_and_restore() {
        let mut scope = ScopeStack::new();
        scope.install(name(0), id(1));

        let mut backup = ScopeBackup::new();
        scope.shadow(name(0), id(2), &mut backup);
        scope.shadow(name(3), id(4), &mut backup);
        assert_eq!(scope.get(name(0)), Some(id(2)));
        assert_eq!(scope.get(name(3)), Some(id(4)));

        scope.restore(backup);
        assert_eq!(scope.get(name(0)), Some(id(1)));
        assert!(scope.get(name(3)).is_none());
    }

    #[test]
    fn backup_keeps_earliest_record() {
        let mut scope = ScopeStack::new();
        scope.install(name(0), id(1));

        let mut backup = ScopeBackup::new();
        scope.shadow(name(0), id(2), &mut backup);
        scope.shadow(name(0), id(3), &mut backup);
        scope.restore(backup);
        // restores to the original binding, not the intermediate one
        assert_eq!(scope.get(name(0)), Some(id(1)));
    }

    #[test]
    fn clear_removes_all() {
        let mut scope = ScopeStack::new();
        scope.install(name(0), id(1));
        scope.install(name(2), id(3));
        scope.clear();
        assert!(scope.get(name(0)).is_none());
        assert!(scope.get(name(2)).is_none());
    }

    #[test]
    fn autoidx_is_monotonic() {
        let mut ctx = ElabContext::new(ElabConfig::default());
        let a = ctx.next_autoidx();
        let b = ctx.next_autoidx();
        let c = ctx.next_autoidx();
        assert!(a < b && b < c);
    }

    #[test]
    fn config_defaults_off() {
        let config = ElabConfig::default();
        assert!(!config.no_mem2reg);
        assert!(!config.force_mem2reg);
    }
}
