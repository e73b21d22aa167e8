//! Memory demotion: deciding which memories survive as `Memory` nodes and
//! rewriting the rest into per-element registers.
//!
//! Pass 1 walks the module once, classifying every memory with a set of
//! flags (written in an initial block, written in an async process, read
//! after a blocking write in the same process, used in a complex left-hand
//! side, explicitly forced). Pass 2 rewrites each demoted memory's accesses
//! into direct element references (constant index) or an address `Case`
//! over helper ADDR/DATA wires (dynamic index).

use crate::errors::{self, ElabResult};
use crate::simplify::SimplifyArgs;
use crate::Elaborator;
use std::collections::{HashMap, HashSet};
use tarn_ast::{NodeId, NodeKind};
use tarn_common::LogicVec;
use tarn_source::Span;

/// Context: demote everything (module attribute or configuration).
const FL_ALL: u32 = 1 << 0;
/// Context: inside an always process without a single edge event.
const FL_ASYNC: u32 = 1 << 1;
/// Context: inside an initial process.
const FL_INIT: u32 = 1 << 2;

/// Memory: demotion forced (attribute, wire declaration, or `FL_ALL`).
const FL_FORCED: u32 = 1 << 8;
/// Memory: assigned inside an initial process.
const FL_SET_INIT: u32 = 1 << 9;
/// Memory: assigned outside any initial process.
const FL_SET_ELSE: u32 = 1 << 10;
/// Memory: assigned inside an async process.
const FL_SET_ASYNC: u32 = 1 << 11;
/// Memory: read after a blocking write in the same process.
const FL_EQ2: u32 = 1 << 12;
/// Memory: appears inside a complex left-hand-side expression.
const FL_CMPLX_LHS: u32 = 1 << 13;

/// Per-process flag: the memory was written blocking (`=`) earlier.
const FL_EQ1: u32 = 1 << 24;

/// Classification state accumulated by pass 1.
#[derive(Default)]
struct Mem2RegScan {
    /// Accumulated classification bits per memory.
    candidates: HashMap<NodeId, u32>,
    /// Offending source locations per memory, first hit per flag.
    places: HashMap<NodeId, Vec<Span>>,
}

impl Mem2RegScan {
    /// Sets a classification flag, recording the location on first set.
    fn set(&mut self, mem: NodeId, flag: u32, span: Span) {
        let entry = self.candidates.entry(mem).or_insert(0);
        if *entry & flag == 0 {
            self.places.entry(mem).or_default().push(span);
        }
        *entry |= flag;
    }
}

impl Elaborator<'_> {
    /// Memory geometry: element width, element count, address width.
    pub(crate) fn meminfo(&self, mem: NodeId) -> (i64, i64, i64) {
        assert_eq!(self.arena.kind(mem), NodeKind::Memory, "meminfo on non-memory");
        let bit_range = self.arena.get(self.arena.child(mem, 0));
        let width = bit_range.range_left - bit_range.range_right + 1;

        let size_range = self.arena.get(self.arena.child(mem, 1));
        let mut size = size_range.range_left - size_range.range_right;
        if size < 0 {
            size = -size;
        }
        size += size_range.range_left.min(size_range.range_right) + 1;

        let mut addr_bits = 1i64;
        while (1i64 << addr_bits) < size {
            addr_bits += 1;
        }
        (width, size, addr_bits)
    }

    /// Classifies, expands, and rewrites the module's memories. Runs once,
    /// between the stage-1 and stage-2 fixed points.
    pub(crate) fn demote_memories(&mut self, module: NodeId) -> ElabResult<()> {
        let mut scan = Mem2RegScan::default();
        let flags = if self.ctx.config.force_mem2reg {
            FL_ALL
        } else {
            0
        };
        let mut proc_flags = HashMap::new();
        self.mem2reg_pass1(module, flags, &mut scan, &mut proc_flags);

        // iterate in allocation order so synthesized wires are deterministic
        let mut memories: Vec<NodeId> = scan.candidates.keys().copied().collect();
        memories.sort_by_key(|m| m.as_raw());

        let mut demoted = Vec::new();
        for mem in memories {
            if self.get_bool_attribute(mem, "nomem2reg") {
                continue;
            }
            let flags = scan.candidates[&mem];
            let forced = flags & FL_FORCED != 0;
            let triggered = flags & FL_EQ2 != 0
                || flags & FL_SET_ASYNC != 0
                || (flags & FL_SET_INIT != 0 && flags & FL_SET_ELSE != 0)
                || flags & FL_CMPLX_LHS != 0;
            if !forced && !triggered {
                continue;
            }
            if !forced {
                let span = scan
                    .places
                    .get(&mem)
                    .and_then(|p| p.first().copied())
                    .unwrap_or(self.arena.get(mem).span);
                let name = self.name_str(mem).to_string();
                self.sink.emit(errors::warn_memory_demoted(&name, span));
            }
            demoted.push(mem);
        }
        if demoted.is_empty() {
            return Ok(());
        }

        for &mem in &demoted {
            let (width, size, _) = self.meminfo(mem);
            let mem_name = self.name_str(mem).to_string();
            let signed = self.arena.get(mem).is_signed;
            for i in 0..size {
                let wire_name = self.ident(&format!("{mem_name}[{i}]"));
                let wire = self.make_ranged_wire(wire_name, width - 1, 0);
                {
                    let w = self.arena.get_mut(wire);
                    w.is_reg = true;
                    w.is_signed = signed;
                }
                self.arena.add_child(module, wire);
                self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;
            }
        }

        let set: HashSet<NodeId> = demoted.iter().copied().collect();
        self.mem2reg_pass2(module, &set, module, None)?;

        let mut i = 0;
        while i < self.arena.get(module).children.len() {
            let child = self.arena.child(module, i);
            if set.contains(&child) {
                self.arena.remove_child(module, i);
                self.arena.free(child);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// The memory a node resolves to, when it is one.
    fn memory_target(&self, id: NodeId) -> Option<NodeId> {
        self.arena
            .get(id)
            .resolved_target
            .filter(|&t| self.arena.is_alive(t))
            .filter(|&t| self.arena.kind(t) == NodeKind::Memory)
    }

    /// Pass 1: classify every memory access.
    fn mem2reg_pass1(
        &mut self,
        id: NodeId,
        flags: u32,
        scan: &mut Mem2RegScan,
        proc_flags: &mut HashMap<NodeId, u32>,
    ) {
        let kind = self.arena.kind(id);
        let span = self.arena.get(id).span;
        let mut children_flags = 0u32;
        let mut skip_lhs = false;

        if kind.is_assignment() {
            let lhs = self.arena.child(id, 0);
            // memories buried inside the left-hand side (index expressions,
            // concatenations) cannot become write ports
            let lhs_children = self.arena.get(lhs).children.clone();
            for child in lhs_children {
                self.mark_complex_lhs(child, scan);
            }
            if self.arena.kind(lhs) == NodeKind::Identifier {
                if let Some(mem) = self.memory_target(lhs) {
                    if flags & FL_ASYNC != 0 {
                        scan.set(mem, FL_SET_ASYNC, span);
                    }
                    if kind == NodeKind::AssignEq {
                        let entry = proc_flags.entry(mem).or_insert(0);
                        if *entry & FL_EQ1 == 0 {
                            scan.places.entry(mem).or_default().push(span);
                        }
                        *entry |= FL_EQ1;
                    }
                    if flags & FL_INIT != 0 {
                        scan.set(mem, FL_SET_INIT, span);
                    } else {
                        scan.set(mem, FL_SET_ELSE, span);
                    }
                }
            }
            skip_lhs = true;
        }

        if kind == NodeKind::Identifier {
            if let Some(mem) = self.memory_target(id) {
                let eq1 = proc_flags.get(&mem).copied().unwrap_or(0) & FL_EQ1 != 0;
                let eq2 = scan.candidates.get(&mem).copied().unwrap_or(0) & FL_EQ2 != 0;
                if eq1 && !eq2 {
                    scan.set(mem, FL_EQ2, span);
                }
            }
        }

        if kind == NodeKind::Memory
            && (self.get_bool_attribute(id, "mem2reg")
                || flags & FL_ALL != 0
                || !self.arena.get(id).is_reg)
        {
            *scan.candidates.entry(id).or_insert(0) |= FL_FORCED;
        }

        if kind == NodeKind::Module && self.get_bool_attribute(id, "mem2reg") {
            children_flags |= FL_ALL;
        }

        let mut fresh_proc = false;
        if kind == NodeKind::Always {
            let edges = self
                .arena
                .get(id)
                .children
                .iter()
                .filter(|&&c| {
                    matches!(self.arena.kind(c), NodeKind::PosEdge | NodeKind::NegEdge)
                })
                .count();
            if edges != 1 {
                children_flags |= FL_ASYNC;
            }
            fresh_proc = true;
        }
        if kind == NodeKind::Initial {
            children_flags |= FL_INIT;
            fresh_proc = true;
        }

        let child_flags = flags | children_flags;
        let children = self.arena.get(id).children.clone();
        let mut local_proc = HashMap::new();
        for (i, &child) in children.iter().enumerate() {
            if i == 0 && skip_lhs {
                continue;
            }
            if fresh_proc {
                self.mem2reg_pass1(child, child_flags, scan, &mut local_proc);
            } else {
                self.mem2reg_pass1(child, child_flags, scan, proc_flags);
            }
        }
    }

    /// Flags every memory referenced inside a complex LHS subtree.
    fn mark_complex_lhs(&mut self, id: NodeId, scan: &mut Mem2RegScan) {
        let children = self.arena.get(id).children.clone();
        for child in children {
            self.mark_complex_lhs(child, scan);
        }
        if self.arena.kind(id) == NodeKind::Identifier {
            if let Some(mem) = self.memory_target(id) {
                let span = self.arena.get(id).span;
                scan.set(mem, FL_CMPLX_LHS, span);
            }
        }
    }

    /// Pass 2: rewrite accesses to demoted memories.
    fn mem2reg_pass2(
        &mut self,
        id: NodeId,
        set: &HashSet<NodeId>,
        module: NodeId,
        mut block: Option<NodeId>,
    ) -> ElabResult<()> {
        let kind = self.arena.kind(id);
        if kind == NodeKind::Block {
            block = Some(id);
        }

        if kind.is_procedural_assignment() && block.is_some() {
            let lhs = self.arena.child(id, 0);
            if let Some(mem) = self
                .memory_target(lhs)
                .filter(|m| set.contains(m))
            {
                let addr_expr = self.arena.child(self.arena.child(lhs, 0), 0);
                if self.arena.kind(addr_expr) != NodeKind::Constant {
                    self.rewrite_demoted_write(id, mem, block.expect("checked above"))?;
                }
            }
        }

        if kind == NodeKind::Identifier {
            if let Some(mem) = self
                .memory_target(id)
                .filter(|m| set.contains(m))
            {
                let addr_expr = self.arena.child(self.arena.child(id, 0), 0);
                if self.arena.kind(addr_expr) == NodeKind::Constant {
                    let index = self.arena.get(addr_expr).as_i64().unwrap_or(0);
                    let element =
                        self.ident(&format!("{}[{}]", self.name_str(id), index));
                    self.arena.free_children(id);
                    let node = self.arena.get_mut(id);
                    node.name = Some(element);
                    node.range_valid = false;
                    node.resolved_target = None;
                } else {
                    self.rewrite_demoted_read(id, mem, module, block)?;
                }
            }
        }

        let children = self.arena.get(id).children.clone();
        for child in children {
            if self.arena.is_alive(child) {
                self.mem2reg_pass2(child, set, module, block)?;
            }
        }
        Ok(())
    }

    /// A dynamic write to a demoted memory becomes helper ADDR/DATA wires
    /// and an address `Case` assigning the selected element register.
    fn rewrite_demoted_write(
        &mut self,
        id: NodeId,
        mem: NodeId,
        block: NodeId,
    ) -> ElabResult<()> {
        let (mem_width, mem_size, addr_bits) = self.meminfo(mem);
        let mem_name = self.name_str(mem).to_string();
        let idx = self.ctx.next_autoidx();
        let base = format!("$mem2reg_wr${mem_name}${idx}");
        let addr_name = self.ident(&format!("{base}_ADDR"));
        let data_name = self.ident(&format!("{base}_DATA"));
        let module = self.module();
        let nosync = self.ident("nosync");

        for (name, width) in [(addr_name, addr_bits), (data_name, mem_width)] {
            let wire = self.make_ranged_wire(name, width - 1, 0);
            {
                let w = self.arena.get_mut(wire);
                w.is_reg = true;
            }
            let one = self.arena.const_int(1, false, -1);
            self.arena.get_mut(wire).attributes.insert(nosync, one);
            self.arena.add_child(module, wire);
            self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;
        }

        let assign_idx = self
            .arena
            .get(block)
            .children
            .iter()
            .position(|&c| c == id)
            .expect("assignment is not in its block");

        // ADDR tracks the index expression right after the data assignment
        let lhs = self.arena.child(id, 0);
        let addr_expr = self.arena.child(self.arena.child(lhs, 0), 0);
        let addr_clone = self.arena.clone_subtree(addr_expr);
        let addr_lhs = self.make_identifier(addr_name);
        let assign_addr = self
            .arena
            .node_with(NodeKind::AssignEq, vec![addr_lhs, addr_clone]);
        self.arena.insert_child(block, assign_idx + 1, assign_addr);

        let assign_kind = self.arena.kind(id);
        let case_scrutinee = self.make_identifier(addr_name);
        let case = self.arena.node_with(NodeKind::Case, vec![case_scrutinee]);
        for i in 0..mem_size {
            let match_const = self.arena.const_int(i, false, addr_bits as i32);
            let element = self.ident(&format!("{mem_name}[{i}]"));
            let elem_lhs = self.make_identifier(element);
            let data_ref = self.make_identifier(data_name);
            let assign = self
                .arena
                .node_with(assign_kind, vec![elem_lhs, data_ref]);
            let body = self.arena.node_with(NodeKind::Block, vec![assign]);
            let cond = self.arena.node_with(NodeKind::Cond, vec![match_const, body]);
            self.arena.add_child(case, cond);
        }
        self.arena.insert_child(block, assign_idx + 2, case);

        // the original assignment now drives DATA
        self.arena.free_children(lhs);
        {
            let l = self.arena.get_mut(lhs);
            l.name = Some(data_name);
            l.range_valid = false;
            l.resolved_target = None;
        }
        self.arena.get_mut(id).kind = NodeKind::AssignEq;
        Ok(())
    }

    /// A dynamic read of a demoted memory becomes helper ADDR/DATA wires
    /// and an address `Case` with an all-X default.
    fn rewrite_demoted_read(
        &mut self,
        id: NodeId,
        mem: NodeId,
        module: NodeId,
        block: Option<NodeId>,
    ) -> ElabResult<()> {
        let (mem_width, mem_size, addr_bits) = self.meminfo(mem);
        let mem_name = self.name_str(mem).to_string();
        let idx = self.ctx.next_autoidx();
        let base = format!("$mem2reg_rd${mem_name}${idx}");
        let addr_name = self.ident(&format!("{base}_ADDR"));
        let data_name = self.ident(&format!("{base}_DATA"));
        let nosync = self.ident("nosync");

        for (name, width) in [(addr_name, addr_bits), (data_name, mem_width)] {
            let wire = self.make_ranged_wire(name, width - 1, 0);
            self.arena.get_mut(wire).is_reg = true;
            if block.is_some() {
                let one = self.arena.const_int(1, false, -1);
                self.arena.get_mut(wire).attributes.insert(nosync, one);
            }
            self.arena.add_child(module, wire);
            self.simplify_loop(wire, SimplifyArgs::const_eval(1))?;
        }

        let addr_expr = self.arena.child(self.arena.child(id, 0), 0);
        let addr_clone = self.arena.clone_subtree(addr_expr);
        let addr_lhs = self.make_identifier(addr_name);
        let assign_kind = if block.is_some() {
            NodeKind::AssignEq
        } else {
            NodeKind::Assign
        };
        let assign_addr = self
            .arena
            .node_with(assign_kind, vec![addr_lhs, addr_clone]);

        let case_scrutinee = self.make_identifier(addr_name);
        let case = self.arena.node_with(NodeKind::Case, vec![case_scrutinee]);
        for i in 0..mem_size {
            let match_const = self.arena.const_int(i, false, addr_bits as i32);
            let data_lhs = self.make_identifier(data_name);
            let element = self.ident(&format!("{mem_name}[{i}]"));
            let elem_ref = self.make_identifier(element);
            let assign = self
                .arena
                .node_with(NodeKind::AssignEq, vec![data_lhs, elem_ref]);
            let body = self.arena.node_with(NodeKind::Block, vec![assign]);
            let cond = self.arena.node_with(NodeKind::Cond, vec![match_const, body]);
            self.arena.add_child(case, cond);
        }
        let default_marker = self.arena.node(NodeKind::Default);
        let data_lhs = self.make_identifier(data_name);
        let x_value = self
            .arena
            .const_bits(LogicVec::all_x(mem_width as u32), false);
        let default_assign = self
            .arena
            .node_with(NodeKind::AssignEq, vec![data_lhs, x_value]);
        let default_body = self.arena.node_with(NodeKind::Block, vec![default_assign]);
        let default_cond = self
            .arena
            .node_with(NodeKind::Cond, vec![default_marker, default_body]);
        self.arena.add_child(case, default_cond);

        if let Some(block) = block {
            let stmt_idx = self
                .arena
                .get(block)
                .children
                .iter()
                .position(|&c| self.subtree_contains(c, id))
                .expect("read expression is not in its block");
            self.arena.insert_child(block, stmt_idx, case);
            self.arena.insert_child(block, stmt_idx, assign_addr);
        } else {
            let body = self.arena.node_with(NodeKind::Block, vec![case]);
            let always = self.arena.node_with(NodeKind::Always, vec![body]);
            self.arena.add_child(module, always);
            self.arena.add_child(module, assign_addr);
        }

        self.arena.free_children(id);
        let node = self.arena.get_mut(id);
        node.name = Some(data_name);
        node.range_valid = false;
        node.resolved_target = None;
        Ok(())
    }

    /// Whether `needle` occurs in the subtree rooted at `root`.
    fn subtree_contains(&self, root: NodeId, needle: NodeId) -> bool {
        if root == needle {
            return true;
        }
        self.arena
            .get(root)
            .children
            .iter()
            .any(|&c| self.subtree_contains(c, needle))
    }
}
