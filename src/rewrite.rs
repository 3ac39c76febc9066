//! Strip the header from a `printk` format string, and note the log level at the call.

use crate::header::HeaderScanResult;
use crate::host::{ExprId, MediumLevelFunction};
use crate::log::*;
use crate::log_level::KernLogLevel;
use crate::scanner::CallSite;

/// Text of the comment left at a call whose format string had level byte `level_byte`. `None` if
/// the level byte is not a known `KERN_*` level.
pub fn annotation_for(level_byte: u8) -> Option<String> {
    KernLogLevel::from_level_byte(level_byte).map(|level| format!("Log level: {}", level))
}

/// What [`apply`] did.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Applied {
    /// The format-string argument now points past the header
    pub rewritten: bool,
    /// A log level comment was added
    pub annotated: bool,
}

/// Point `arg` of `call` past the header found by `scan`, and comment the call with the level.
///
/// `original_pointer` is the value `arg` had when `scan` was computed. Nothing is touched unless
/// a header was found. An existing comment at the call is never replaced, and with `annotate` unset
/// no comment is added at all.
pub fn apply<F: MediumLevelFunction + ?Sized>(
    function: &mut F,
    call: &CallSite,
    arg: ExprId,
    original_pointer: u64,
    scan: HeaderScanResult,
    annotate: bool,
) -> Applied {
    let level_byte = match scan.level_byte {
        Some(b) if scan.found() => b,
        _ => return Applied::default(),
    };

    let new_pointer = original_pointer.wrapping_add(scan.offset as u64);
    info!(
        "Patching MLIL call to printk";
        "addr" => format_args!("{:#x}", call.address),
        "index" => call.index,
        "fmtstr" => format_args!("{:#x}", original_pointer),
        "header_len" => scan.offset,
    );
    let size = function.expr_size(arg);
    function.replace_with_const_pointer(arg, size, new_pointer);

    let mut annotated = false;
    if annotate && function.comment_at(call.address).is_none() {
        match annotation_for(level_byte) {
            Some(comment) => {
                function.set_comment_at(call.address, comment);
                annotated = true;
            }
            None => {
                debug!(
                    "Unknown log level; not commenting";
                    "addr" => format_args!("{:#x}", call.address),
                    "level_byte" => format_args!("{:#04x}", level_byte),
                );
            }
        }
    }

    Applied {
        rewritten: true,
        annotated,
    }
}
