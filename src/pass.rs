//! The analysis activity itself: run once per function, after tail calls have been analyzed.

use crate::config::FixerConfig;
use crate::header;
use crate::host::{BinaryView, MediumLevelFunction};
use crate::log::*;
use crate::rewrite;
use crate::scanner::{self, CallSite};
use crate::symbol_cache::TargetSymbolCache;

/// Summary of what the fixer did to one function.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FunctionReport {
    /// Calls to `printk` that were found
    pub calls_found: usize,
    /// Calls whose format string pointer was moved past its header
    pub calls_rewritten: usize,
    /// Log level comments added
    pub comments_added: usize,
}

impl FunctionReport {
    /// Whether the function's IL was changed (and hence its SSA form regenerated)
    pub fn modified(&self) -> bool {
        self.calls_rewritten > 0
    }
}

impl std::ops::AddAssign for FunctionReport {
    fn add_assign(&mut self, other: Self) {
        self.calls_found += other.calls_found;
        self.calls_rewritten += other.calls_rewritten;
        self.comments_added += other.comments_added;
    }
}

/// Fixes up the display of `printk` format strings.
///
/// A single fixer is meant to be shared by all the workers analyzing functions, across all the
/// binaries it is run on; it remembers where `printk` is in each of them.
pub struct PrintkFixer {
    config: FixerConfig,
    targets: TargetSymbolCache,
}

impl PrintkFixer {
    pub fn new(config: FixerConfig) -> Self {
        Self {
            targets: TargetSymbolCache::new(config.symbol_names.clone()),
            config,
        }
    }

    pub fn config(&self) -> &FixerConfig {
        &self.config
    }

    /// The cache of `printk` locations
    pub fn targets(&self) -> &TargetSymbolCache {
        &self.targets
    }

    /// Run on `function`, which belongs to `view`.
    ///
    /// Requests regeneration of the SSA form exactly once if anything was changed, and not at all
    /// otherwise.
    pub fn run_on_function<V, F>(&self, view: &V, function: &mut F) -> FunctionReport
    where
        V: BinaryView + ?Sized,
        F: MediumLevelFunction + ?Sized,
    {
        let mut report = FunctionReport::default();

        let target = self.targets.resolve(view);
        if !target.is_found() {
            return report;
        }

        // Rewriting only touches argument expressions, never the instructions being scanned, so
        // the matches can be gathered before mutating.
        let calls: Vec<CallSite> = scanner::scan(&*function, target).collect();
        report.calls_found = calls.len();

        for call in &calls {
            let applied = self.fix_call(view, function, call);
            if applied.rewritten {
                report.calls_rewritten += 1;
            }
            if applied.annotated {
                report.comments_added += 1;
            }
        }

        if report.modified() {
            function.generate_ssa_form();
        }
        report
    }

    fn fix_call<V, F>(&self, view: &V, function: &mut F, call: &CallSite) -> rewrite::Applied
    where
        V: BinaryView + ?Sized,
        F: MediumLevelFunction + ?Sized,
    {
        let Some(fmt_str) = call.first_param() else {
            debug!(
                "printk call without arguments";
                "addr" => format_args!("{:#x}", call.address),
                "index" => call.index,
            );
            return Default::default();
        };
        let fmt_str_value = function.expr_value(fmt_str);
        let pointer = match fmt_str_value.known_value() {
            Some(v) if fmt_str_value.is_constant() => v,
            _ => {
                debug!(
                    "Format string is not constant";
                    "addr" => format_args!("{:#x}", call.address),
                    "index" => call.index,
                    "value" => ?fmt_str_value,
                );
                return Default::default();
            }
        };

        let scan = header::walk(view, pointer);
        trace!(
            "Walked format string header";
            "addr" => format_args!("{:#x}", call.address),
            "fmtstr" => format_args!("{:#x}", pointer),
            "header_len" => scan.offset,
            OptionalKV("level_byte", scan.level_byte.map(char::from)),
        );
        rewrite::apply(
            function,
            call,
            fmt_str,
            pointer,
            scan,
            self.config.annotate_log_levels,
        )
    }
}

impl Default for PrintkFixer {
    fn default() -> Self {
        Self::new(FixerConfig::default())
    }
}
