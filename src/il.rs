//! An in-memory medium-level IL and binary image.
//!
//! This is the reference implementation of the [`host`](crate::host) interface. It is what the
//! exported-IL [`lifter`](crate::lifter) produces, and what the command-line driver and the tests
//! run the fixer on.

use crate::containers::unordered::UnorderedMap;
use crate::host::{BinaryView, ExprId, Instruction, MediumLevelFunction, PossibleValue, SessionId};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh session identifiers; every [`BinaryImage`] gets its own.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A contiguous run of mapped bytes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Segment {
    /// Address of the first byte
    pub start: u64,
    pub bytes: Vec<u8>,
}

impl Segment {
    /// One past the last mapped address. Wide enough to hold `u64::MAX + 1` for a segment that
    /// runs to the top of the address space.
    pub fn end(&self) -> u128 {
        self.start as u128 + self.bytes.len() as u128
    }

    fn byte_at(&self, addr: u64) -> Option<u8> {
        let off = addr.checked_sub(self.start)?;
        self.bytes.get(usize::try_from(off).ok()?).copied()
    }
}

/// A binary under analysis: its symbols and mapped memory.
#[derive(Debug)]
pub struct BinaryImage {
    /// A name for the binary, for diagnostics
    pub name: String,
    session: SessionId,
    /// Raw symbol name to address
    pub symbols: UnorderedMap<String, u64>,
    /// Mapped segments; sorted by start address and non-overlapping
    segments: Vec<Segment>,
}

impl BinaryImage {
    /// A new binary with no symbols and nothing mapped, in a fresh analysis session
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            symbols: Default::default(),
            segments: vec![],
        }
    }

    /// Define (or redefine) the symbol `name` at `addr`
    pub fn add_symbol(&mut self, name: impl Into<String>, addr: u64) {
        self.symbols.insert(name.into(), addr);
    }

    /// Map `bytes` at `start`. Fails if the new segment overlaps an existing one.
    pub fn map_bytes(&mut self, start: u64, bytes: Vec<u8>) -> Result<(), String> {
        let seg = Segment { start, bytes };
        if seg.bytes.is_empty() {
            return Ok(());
        }
        if seg.end() > u64::MAX as u128 + 1 {
            return Err(format!(
                "Segment at {:#x} (len {}) runs past the end of the address space",
                seg.start,
                seg.bytes.len()
            ));
        }
        if let Some(other) = self
            .segments
            .iter()
            .find(|s| (seg.start as u128) < s.end() && (s.start as u128) < seg.end())
        {
            return Err(format!(
                "Segment at {:#x} (len {}) overlaps existing segment at {:#x} (len {})",
                seg.start,
                seg.bytes.len(),
                other.start,
                other.bytes.len()
            ));
        }
        let pos = self.segments.partition_point(|s| s.start < seg.start);
        self.segments.insert(pos, seg);
        Ok(())
    }

    /// The mapped segments, in address order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn byte_at(&self, addr: u64) -> Option<u8> {
        let pos = self.segments.partition_point(|s| s.start <= addr);
        self.segments[..pos].last()?.byte_at(addr)
    }
}

impl BinaryView for BinaryImage {
    fn session_id(&self) -> SessionId {
        self.session
    }

    fn symbol_address_by_raw_name(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    fn read(&self, buf: &mut [u8], addr: u64) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            match addr.checked_add(i as u64).and_then(|a| self.byte_at(a)) {
                Some(b) => *slot = b,
                None => return i,
            }
        }
        buf.len()
    }
}

/// An IL expression: a value of some width, with whatever the value analysis knows about it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Expression {
    /// Width in bytes
    pub size: usize,
    pub value: PossibleValue,
}

/// A function's medium-level IL.
pub struct Function {
    /// Name of the function
    pub name: String,
    /// Machine address of the function's entry point
    pub entry_point: u64,
    /// The instructions, indexed by [`MediumLevelFunction::instruction`]
    pub instructions: Vec<Instruction>,
    /// Basic blocks, as ranges into `instructions`. Contiguous and in order.
    pub basic_blocks: Vec<Range<usize>>,
    /// Expressions referred to by instructions, indexed by [`ExprId`]
    pub expressions: Vec<Expression>,
    /// Comments on machine addresses
    pub comments: UnorderedMap<u64, String>,
    /// How many times the SSA form has been (re)generated since construction
    ssa_generations: usize,
}

impl Function {
    /// A new function with no instructions
    pub fn new(name: impl Into<String>, entry_point: u64) -> Self {
        Self {
            name: name.into(),
            entry_point,
            instructions: vec![],
            basic_blocks: vec![],
            expressions: vec![],
            comments: Default::default(),
            ssa_generations: 0,
        }
    }

    /// Add an expression, returning its id
    pub fn add_expr(&mut self, size: usize, value: PossibleValue) -> ExprId {
        self.expressions.push(Expression { size, value });
        ExprId(self.expressions.len() - 1)
    }

    /// Append a basic block consisting of `instructions`.
    ///
    /// Every expression the instructions refer to must already have been added.
    pub fn add_basic_block(&mut self, instructions: Vec<Instruction>) -> Result<(), String> {
        if instructions.is_empty() {
            return Err(format!("Empty basic block in function {}", self.name));
        }
        for ins in &instructions {
            self.try_confirm_valid(ins)?;
        }
        let start = self.instructions.len();
        self.instructions.extend(instructions);
        self.basic_blocks.push(start..self.instructions.len());
        Ok(())
    }

    /// Confirm that `ins` only refers to existing expressions.
    fn try_confirm_valid(&self, ins: &Instruction) -> Result<(), String> {
        if let Some((kind, ops)) = ins.operation.as_call() {
            for e in std::iter::once(&ops.dest).chain(ops.params.iter()) {
                if e.0 >= self.expressions.len() {
                    return Err(format!(
                        "Got expression {:?} for {:?} in function {}. Only {} expressions exist. \
                         Address: {:#x}.",
                        e,
                        kind,
                        self.name,
                        self.expressions.len(),
                        ins.address,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Add a comment at `addr`, appending to any comment already there
    pub fn add_comment_to_machine_address(&mut self, addr: u64, comment: &str) {
        let c = self.comments.entry(addr).or_default();
        if !c.is_empty() {
            *c += "; ";
        }
        *c += comment;
    }

    /// Number of times [`MediumLevelFunction::generate_ssa_form`] was invoked
    pub fn ssa_generations(&self) -> usize {
        self.ssa_generations
    }

    /// The expression behind `expr`
    pub fn expr(&self, expr: ExprId) -> &Expression {
        &self.expressions[expr.0]
    }
}

impl MediumLevelFunction for Function {
    fn basic_blocks(&self) -> Vec<Range<usize>> {
        self.basic_blocks.clone()
    }

    fn instruction(&self, index: usize) -> Instruction {
        self.instructions[index].clone()
    }

    fn expr_value(&self, expr: ExprId) -> PossibleValue {
        self.expr(expr).value
    }

    fn expr_size(&self, expr: ExprId) -> usize {
        self.expr(expr).size
    }

    fn replace_with_const_pointer(&mut self, expr: ExprId, size: usize, value: u64) {
        self.expressions[expr.0] = Expression {
            size,
            value: PossibleValue::ConstantPointer(value),
        };
    }

    fn comment_at(&self, addr: u64) -> Option<String> {
        self.comments
            .get(&addr)
            .filter(|c| !c.is_empty())
            .cloned()
    }

    fn set_comment_at(&mut self, addr: u64, comment: String) {
        self.comments.insert(addr, comment);
    }

    fn generate_ssa_form(&mut self) {
        self.ssa_generations += 1;
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Function {} @ {:#x}", self.name, self.entry_point)?;
        for (bbi, bb) in self.basic_blocks.iter().enumerate() {
            writeln!(f, "  bb{}:", bbi)?;
            for ins in &self.instructions[bb.clone()] {
                write!(f, "    {:#x}: ", ins.address)?;
                match ins.operation.as_call() {
                    None => write!(f, "...")?,
                    Some((kind, ops)) => {
                        write!(f, "{:?} {:?}(", kind, self.expr(ops.dest))?;
                        for (i, p) in ops.params.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{:?}", self.expr(*p))?;
                        }
                        write!(f, ")")?;
                    }
                }
                if let Some(c) = self.comments.get(&ins.address) {
                    write!(f, "  ; {}", c)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
