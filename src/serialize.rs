//! Write a lifted binary back out in the `.mlil-exported` format read by the
//! [`lifter`](crate::lifter).

use crate::containers::unordered::sorted_entries;
use crate::host::{CallKind, PossibleValue};
use crate::il::{Expression, Function};
use crate::lifter::LiftedBinary;
use itertools::Itertools;
use std::fmt::Write;

/// Bytes per `MEMORY` line
const BYTES_PER_LINE: usize = 16;

fn value_to_string(e: &Expression) -> String {
    match e.value {
        PossibleValue::Undetermined => format!("undetermined/{}", e.size),
        PossibleValue::Constant(v) => format!("const:{:x}/{}", v, e.size),
        PossibleValue::ConstantPointer(v) => format!("ptr:{:x}/{}", v, e.size),
        PossibleValue::ExternalPointer(v) => format!("extern:{:x}/{}", v, e.size),
    }
}

fn serialize_function(f: &Function, w: &mut impl Write) -> std::fmt::Result {
    writeln!(w, "FUNCTION {:x} {}", f.entry_point, f.name)?;
    for bb in &f.basic_blocks {
        writeln!(w, "BLOCK")?;
        for ins in &f.instructions[bb.clone()] {
            match ins.operation.as_call() {
                None => writeln!(w, "{:x} OTHER", ins.address)?,
                Some((kind, ops)) => writeln!(
                    w,
                    "{:x} {} {}",
                    ins.address,
                    match kind {
                        CallKind::Call => "CALL",
                        CallKind::TailCall => "TAILCALL",
                    },
                    std::iter::once(&ops.dest)
                        .chain(ops.params.iter())
                        .map(|&e| value_to_string(f.expr(e)))
                        .join(" ")
                )?,
            }
        }
    }
    for (addr, comment) in sorted_entries(&f.comments) {
        if !comment.is_empty() {
            writeln!(w, "COMMENT {:x} {}", addr, comment.replace('\n', " "))?;
        }
    }
    Ok(())
}

impl LiftedBinary {
    /// Write out in `.mlil-exported` format
    pub fn serialize_to(&self, w: &mut impl Write) -> std::fmt::Result {
        writeln!(w, "BINARY")?;
        writeln!(w, "name {}", self.image.name)?;

        writeln!(w)?;
        writeln!(w, "SYMBOLS")?;
        for (name, addr) in sorted_entries(&self.image.symbols)
            .into_iter()
            .sorted_by_key(|&(_, addr)| *addr)
        {
            writeln!(w, "{:x} {}", addr, name)?;
        }

        writeln!(w)?;
        writeln!(w, "MEMORY")?;
        for seg in self.image.segments() {
            for (i, chunk) in seg.bytes.chunks(BYTES_PER_LINE).enumerate() {
                writeln!(
                    w,
                    "{:x} {}",
                    seg.start + (i * BYTES_PER_LINE) as u64,
                    chunk.iter().map(|b| format!("{:02x}", b)).join(" ")
                )?;
            }
        }

        for f in &self.functions {
            writeln!(w)?;
            serialize_function(f, w)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for LiftedBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.serialize_to(f)
    }
}
