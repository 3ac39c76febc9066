//! A cache of where `printk` lives in each binary under analysis.
//!
//! The engine runs the fixer on many functions of the same binary at once, from many worker
//! threads. Looking the symbol up is done only once per binary; every other caller just reads the
//! cached answer, including a cached "not found".

use crate::containers::unordered::UnorderedMap;
use crate::host::{BinaryView, SessionId};
use crate::log::*;
use std::sync::{PoisonError, RwLock};

/// The resolved address of the logging routine in one binary, or the knowledge that it is absent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TargetAddress(Option<u64>);

impl TargetAddress {
    /// Resolution was attempted, and nothing was found
    pub const NOT_FOUND: TargetAddress = TargetAddress(None);

    /// The routine lives at `addr`
    pub fn found(addr: u64) -> Self {
        TargetAddress(Some(addr))
    }

    /// The address, if the routine was found
    pub fn address(&self) -> Option<u64> {
        self.0
    }

    pub fn is_found(&self) -> bool {
        self.0.is_some()
    }
}

/// Per-session cache of [`TargetAddress`]es.
///
/// Invariant: at most one resolution is ever performed per session, and once an entry is written
/// it never changes.
pub struct TargetSymbolCache {
    /// Raw names to try, most preferred first
    symbol_names: Vec<String>,
    entries: RwLock<UnorderedMap<SessionId, TargetAddress>>,
}

impl TargetSymbolCache {
    /// A new, empty cache that locates the routine by the first of `symbol_names` that exists.
    pub fn new(symbol_names: Vec<String>) -> Self {
        Self {
            symbol_names,
            entries: RwLock::new(Default::default()),
        }
    }

    /// The cached result for `session`. `None` means that resolution has never been attempted for
    /// it, which is distinct from `Some(TargetAddress::NOT_FOUND)`.
    pub fn lookup(&self, session: SessionId) -> Option<TargetAddress> {
        // Entries are written exactly once while holding the write lock, so whatever a panicking
        // writer left behind is still a complete map.
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&session).copied()
    }

    /// Where the routine lives in `view`, resolving and caching it on first use.
    pub fn resolve<V: BinaryView + ?Sized>(&self, view: &V) -> TargetAddress {
        let session = view.session_id();
        if let Some(target) = self.lookup(session) {
            return target;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Someone else may have resolved it between dropping the read lock and taking the write
        // lock; `or_insert_with` only resolves if they did not.
        *entries
            .entry(session)
            .or_insert_with(|| self.resolve_uncached(view))
    }

    fn resolve_uncached<V: BinaryView + ?Sized>(&self, view: &V) -> TargetAddress {
        let found = self.symbol_names.iter().find_map(|name| {
            view.symbol_address_by_raw_name(name)
                .map(|addr| (name, addr))
        });
        match found {
            Some((name, addr)) => {
                debug!(
                    "Resolved logging routine";
                    "session" => %view.session_id(),
                    "symbol" => name,
                    "addr" => format_args!("{:#x}", addr),
                );
                TargetAddress::found(addr)
            }
            None => {
                warn!(
                    "Failed to find printk: PrintkFixer won't do anything (is this a Linux kernel module?)";
                    "session" => %view.session_id(),
                    "tried" => ?self.symbol_names,
                );
                TargetAddress::NOT_FOUND
            }
        }
    }
}
