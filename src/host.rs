//! The interface through which the fixer talks to the analysis engine hosting it.
//!
//! The engine owns the binary, its symbol table, and the medium-level IL of every function. The
//! fixer only reads from a [`BinaryView`] and performs a small, fixed set of mutations on a
//! [`MediumLevelFunction`]. [`crate::il`] provides an in-memory implementation of both.

use std::ops::Range;

/// A stable identifier for one binary under analysis. Unique for the lifetime of that analysis.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// One binary (module) under analysis.
pub trait BinaryView {
    /// Identifier of the analysis session this view belongs to
    fn session_id(&self) -> SessionId;

    /// Address of the symbol with exactly this raw (unmangled, undecorated) name, if any
    fn symbol_address_by_raw_name(&self, name: &str) -> Option<u64>;

    /// Read up to `buf.len()` bytes starting at `addr`. Returns the number of bytes actually read;
    /// a short read means the end of mapped data was reached.
    fn read(&self, buf: &mut [u8], addr: u64) -> usize;
}

/// Index of an expression within a function's IL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ExprId(pub usize);

/// Result of the engine's value analysis for an expression.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PossibleValue {
    /// Nothing is statically known
    Undetermined,
    /// A plain integer constant
    Constant(u64),
    /// A constant that the engine believes to be a pointer
    ConstantPointer(u64),
    /// An address resolved through an external symbol reference (an import, a relocation). The
    /// engine does not consider this a constant, even though its value is known.
    ExternalPointer(u64),
}

impl PossibleValue {
    /// Whether the engine considers this value a constant. Note that this is `false` for
    /// [`PossibleValue::ExternalPointer`].
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            PossibleValue::Constant(_) | PossibleValue::ConstantPointer(_)
        )
    }

    /// The numeric value, if one is known at all
    pub fn known_value(&self) -> Option<u64> {
        match self {
            PossibleValue::Undetermined => None,
            PossibleValue::Constant(v)
            | PossibleValue::ConstantPointer(v)
            | PossibleValue::ExternalPointer(v) => Some(*v),
        }
    }
}

/// The expressions making up a call-like instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CallOperands {
    /// Where the call goes
    pub dest: ExprId,
    /// The arguments, in order
    pub params: Vec<ExprId>,
}

/// Which flavor of call an instruction is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CallKind {
    Call,
    TailCall,
}

/// The operation performed by an IL instruction, to the level of detail the fixer cares about.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operation {
    /// An ordinary call
    Call(CallOperands),
    /// A tail call (a jump that behaves as a call whose return is the caller's return)
    TailCall(CallOperands),
    /// Anything that is not a call
    Other,
}

impl Operation {
    /// View a call-like operation uniformly, regardless of its flavor
    pub fn as_call(&self) -> Option<(CallKind, &CallOperands)> {
        match self {
            Operation::Call(ops) => Some((CallKind::Call, ops)),
            Operation::TailCall(ops) => Some((CallKind::TailCall, ops)),
            Operation::Other => None,
        }
    }
}

/// A medium-level IL instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    /// Address of the machine instruction this was lifted from
    pub address: u64,
    pub operation: Operation,
}

/// A function's medium-level IL, as exposed by the engine to a single analysis activity.
///
/// The engine guarantees that a given function is handed to at most one activity at a time, hence
/// mutation through `&mut self`.
pub trait MediumLevelFunction {
    /// Basic blocks, each as a range of instruction indexes, in increasing order
    fn basic_blocks(&self) -> Vec<Range<usize>>;

    /// The instruction at `index`
    fn instruction(&self, index: usize) -> Instruction;

    /// Statically known value of `expr`
    fn expr_value(&self, expr: ExprId) -> PossibleValue;

    /// Declared width of `expr`, in bytes
    fn expr_size(&self, expr: ExprId) -> usize;

    /// Replace `expr`, in place, with a constant pointer `value` that is `size` bytes wide.
    fn replace_with_const_pointer(&mut self, expr: ExprId, size: usize, value: u64);

    /// The user/analysis comment at `addr`, if any
    fn comment_at(&self, addr: u64) -> Option<String>;

    /// Set the comment at `addr`, replacing whatever was there
    fn set_comment_at(&mut self, addr: u64, comment: String);

    /// Rebuild the SSA form of the function from the (mutated) non-SSA IL.
    fn generate_ssa_form(&mut self);
}
