//! Detect the `KERN_*` header on a format string.

use crate::host::BinaryView;

/// First byte of every header unit (ASCII SOH)
pub const SOH: u8 = 1;
/// Width of one header unit: SOH, then the level byte
pub const UNIT_LEN: usize = 2;
/// Give up on headers longer than this many bytes.
pub const MAX_HEADER_LEN: usize = 100;

/// What was found at the start of a format string.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct HeaderScanResult {
    /// Number of header bytes to skip to get to the message
    pub offset: usize,
    /// Level byte of the first header unit, if there was one
    pub level_byte: Option<u8>,
}

impl HeaderScanResult {
    /// Whether there is a header to strip at all
    pub fn found(&self) -> bool {
        self.offset > 0 && self.level_byte.is_some()
    }
}

/// Measure the run of header units starting at `pointer`.
///
/// Well-formed strings have at most one unit. Should there be more, all of them are skipped, but
/// the level reported is that of the first unit with a nonzero level byte.
pub fn walk<V: BinaryView + ?Sized>(view: &V, pointer: u64) -> HeaderScanResult {
    let mut res = HeaderScanResult::default();
    let mut buf = [0u8; UNIT_LEN];
    while res.offset < MAX_HEADER_LEN {
        let Some(addr) = pointer.checked_add(res.offset as u64) else {
            break;
        };
        if view.read(&mut buf, addr) != UNIT_LEN {
            break;
        }
        if buf[0] != SOH {
            break;
        }
        res.offset += UNIT_LEN;
        // A NUL level does not count as decoded; a later unit may still supply one
        if buf[1] != 0 {
            res.level_byte.get_or_insert(buf[1]);
        }
    }
    res
}
