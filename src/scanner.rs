//! Find the calls to `printk` in a function.

use crate::host::{CallKind, CallOperands, ExprId, MediumLevelFunction, PossibleValue};
use crate::log::*;
use crate::symbol_cache::TargetAddress;
use std::ops::Range;

/// A call-like instruction whose destination is known to be the target.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CallSite {
    /// Index of the instruction in its function
    pub index: usize,
    /// Machine address of the instruction
    pub address: u64,
    pub kind: CallKind,
    pub operands: CallOperands,
}

impl CallSite {
    /// The format-string argument, if the call has any arguments at all
    pub fn first_param(&self) -> Option<ExprId> {
        self.operands.params.first().copied()
    }
}

/// Whether a call whose destination has value `dest` goes to `target`.
///
/// The engine does not count an externally resolved pointer (such as a call through an import) as
/// a constant, so it has to be checked for separately.
pub fn destination_is(dest: PossibleValue, target: u64) -> bool {
    match dest {
        PossibleValue::Constant(v) | PossibleValue::ConstantPointer(v) => v == target,
        PossibleValue::ExternalPointer(v) => v == target,
        PossibleValue::Undetermined => false,
    }
}

/// Iterator over the calls to a target in a function, in block order, then instruction order.
///
/// Nothing is evaluated until the iterator is advanced, and it can be cloned to restart from the
/// same position.
pub struct CallSites<'f, F: MediumLevelFunction + ?Sized> {
    function: &'f F,
    target: u64,
    blocks: std::vec::IntoIter<Range<usize>>,
    current: Range<usize>,
}

impl<F: MediumLevelFunction + ?Sized> Clone for CallSites<'_, F> {
    fn clone(&self) -> Self {
        Self {
            function: self.function,
            target: self.target,
            blocks: self.blocks.clone(),
            current: self.current.clone(),
        }
    }
}

impl<F: MediumLevelFunction + ?Sized> Iterator for CallSites<'_, F> {
    type Item = CallSite;

    fn next(&mut self) -> Option<CallSite> {
        loop {
            let Some(index) = self.current.next() else {
                self.current = self.blocks.next()?;
                continue;
            };
            let ins = self.function.instruction(index);
            let Some((kind, operands)) = ins.operation.as_call() else {
                continue;
            };
            let dest = self.function.expr_value(operands.dest);
            if !destination_is(dest, self.target) {
                continue;
            }
            trace!(
                "Found call to target";
                "addr" => format_args!("{:#x}", ins.address),
                "index" => index,
                "kind" => ?kind,
                "dest" => ?dest,
            );
            return Some(CallSite {
                index,
                address: ins.address,
                kind,
                operands: operands.clone(),
            });
        }
    }
}

/// Scan `function` for calls and tail calls to `target`. Yields nothing if the target was not
/// found, without looking at the function at all.
pub fn scan<F: MediumLevelFunction + ?Sized>(
    function: &F,
    target: TargetAddress,
) -> CallSites<'_, F> {
    let (target, blocks) = match target.address() {
        Some(addr) => (addr, function.basic_blocks()),
        None => (0, vec![]),
    };
    CallSites {
        function,
        target,
        blocks: blocks.into_iter(),
        current: 0..0,
    }
}
