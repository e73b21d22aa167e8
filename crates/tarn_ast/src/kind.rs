//! The closed enumeration of AST node kinds.

use serde::{Deserialize, Serialize};

/// The kind of an [`AstNode`](crate::AstNode).
///
/// Child ordering is semantically meaningful per kind: `For`/`GenFor` hold
/// `[init, cond, step, body]`, `Ternary` holds `[cond, then, else]`,
/// assignments hold `[lhs, rhs]`, `Memory` holds `[bit-range, size-range]`,
/// and `Cond` holds its match expressions followed by the selected branch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    /// A module, the root of one elaboration.
    Module,
    /// A declared wire or register.
    Wire,
    /// A wire synthesized for an otherwise unresolved identifier.
    AutoWire,
    /// A declared memory (array of registers).
    Memory,
    /// A `parameter` declaration.
    Parameter,
    /// A `localparam` declaration.
    LocalParam,
    /// A `defparam` override, rewritten into a cell parameter.
    DefParam,
    /// A parameter binding on a cell.
    ParaSet,
    /// A bit range `[msb:lsb]` or single index `[i]`.
    Range,
    /// A `base[index].suffix` reference into a generate scope.
    Prefix,
    /// A named reference, possibly with index/range children.
    Identifier,
    /// A bit-vector constant.
    Constant,
    /// A floating-point constant.
    RealValue,
    /// A continuous assignment.
    Assign,
    /// A blocking procedural assignment (`=`).
    AssignEq,
    /// A non-blocking procedural assignment (`<=`).
    AssignLe,
    /// An `always` process.
    Always,
    /// An `initial` process.
    Initial,
    /// A sequential statement block, possibly named.
    Block,
    /// A generate block.
    GenBlock,
    /// A generate `if`.
    GenIf,
    /// A generate `case`.
    GenCase,
    /// A generate `for`.
    GenFor,
    /// A procedural `for` loop (unrolled during elaboration).
    For,
    /// A `while` loop (constant functions only).
    While,
    /// A `repeat` loop (constant functions only).
    Repeat,
    /// One arm of a `Case`/`GenCase`.
    Cond,
    /// The `default` marker inside a `Cond`.
    Default,
    /// A `case` statement.
    Case,
    /// A module instantiation.
    Cell,
    /// An array of instantiations, unrolled during elaboration.
    CellArray,
    /// The type name of a cell.
    CellType,
    /// A positional or named connection on a cell or primitive.
    Argument,
    /// A gate primitive instantiation (`and`, `buf`, `notif1`, …).
    Primitive,
    /// A function declaration (opaque until called).
    Function,
    /// A task declaration (opaque until called).
    Task,
    /// A function call.
    FCall,
    /// A task call.
    TCall,
    /// A memory read port (stage-2 lowering of a memory access).
    MemRd,
    /// A memory write port (stage-2 lowering of a memory assignment).
    MemWr,
    /// An assertion.
    Assert,
    /// A positive-edge event in a sensitivity list.
    PosEdge,
    /// A negative-edge event in a sensitivity list.
    NegEdge,
    /// A `genvar` declaration.
    GenVar,
    /// Width conversion `to_bits(width, expr)`.
    ToBits,
    /// Signedness cast to signed.
    ToSigned,
    /// Signedness cast to unsigned.
    ToUnsigned,
    /// Concatenation; children are ordered LSB-part first.
    Concat,
    /// Replication `{count{expr}}`.
    Replicate,
    /// AND-reduction.
    ReduceAnd,
    /// OR-reduction.
    ReduceOr,
    /// XOR-reduction.
    ReduceXor,
    /// XNOR-reduction.
    ReduceXnor,
    /// Boolean reduction.
    ReduceBool,
    /// Bitwise NOT.
    BitNot,
    /// Bitwise AND.
    BitAnd,
    /// Bitwise OR.
    BitOr,
    /// Bitwise XOR.
    BitXor,
    /// Bitwise XNOR.
    BitXnor,
    /// Arithmetic negation.
    Neg,
    /// Unary plus.
    Pos,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,
    /// Exponentiation.
    Pow,
    /// Logical shift left.
    ShiftLeft,
    /// Logical shift right.
    ShiftRight,
    /// Arithmetic shift left.
    ShiftSLeft,
    /// Arithmetic shift right.
    ShiftSRight,
    /// Less-than comparison.
    Lt,
    /// Less-or-equal comparison.
    Le,
    /// Logical equality.
    Eq,
    /// Logical inequality.
    Ne,
    /// Case equality (4-valued).
    EqX,
    /// Case inequality (4-valued).
    NeX,
    /// Greater-or-equal comparison.
    Ge,
    /// Greater-than comparison.
    Gt,
    /// Logical AND.
    LogicAnd,
    /// Logical OR.
    LogicOr,
    /// Logical NOT.
    LogicNot,
    /// Conditional operator `cond ? then : else`.
    Ternary,
}

impl NodeKind {
    /// Returns `true` for the three assignment kinds.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            NodeKind::Assign | NodeKind::AssignEq | NodeKind::AssignLe
        )
    }

    /// Returns `true` for the two procedural assignment kinds (`=`, `<=`).
    pub fn is_procedural_assignment(self) -> bool {
        matches!(self, NodeKind::AssignEq | NodeKind::AssignLe)
    }

    /// Returns `true` for declarations that introduce a name into scope.
    pub fn declares_name(self) -> bool {
        matches!(
            self,
            NodeKind::Parameter
                | NodeKind::LocalParam
                | NodeKind::Wire
                | NodeKind::AutoWire
                | NodeKind::GenVar
                | NodeKind::Memory
                | NodeKind::Function
                | NodeKind::Task
                | NodeKind::Cell
        )
    }

    /// Returns `true` for parameter-like declarations.
    pub fn is_parameter(self) -> bool {
        matches!(self, NodeKind::Parameter | NodeKind::LocalParam)
    }

    /// Returns `true` for wire-like declarations.
    pub fn is_wire(self) -> bool {
        matches!(self, NodeKind::Wire | NodeKind::AutoWire)
    }

    /// Returns `true` for kinds that must be gone after elaboration
    /// (the downstream lowering never sees them).
    pub fn is_elaboration_only(self) -> bool {
        matches!(
            self,
            NodeKind::GenFor
                | NodeKind::GenIf
                | NodeKind::GenCase
                | NodeKind::GenBlock
                | NodeKind::Prefix
                | NodeKind::CellArray
                | NodeKind::Primitive
                | NodeKind::DefParam
                | NodeKind::For
                | NodeKind::While
                | NodeKind::Repeat
                | NodeKind::ToBits
                | NodeKind::ToSigned
                | NodeKind::ToUnsigned
                | NodeKind::Function
                | NodeKind::Task
                | NodeKind::FCall
                | NodeKind::TCall
        )
    }
}
