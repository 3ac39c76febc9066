//! Flags that impact what the fixer does to a function.
//!
//! Unlike a process-wide store, a [`FixerConfig`] is handed to each
//! [`PrintkFixer`](crate::pass::PrintkFixer) when it is constructed, so different fixers in the
//! same process may be configured differently.

/// Raw name of `printk` before kernel 5.15
pub const PRINTK_SYMBOL: &str = "printk";
/// Raw name of `printk` from kernel 5.15 onwards, where printk indexing turned the exported
/// `printk` into a macro around `_printk`
pub const INDEXED_PRINTK_SYMBOL: &str = "_printk";

/// Configuration of a fixer.
#[derive(Clone, Debug)]
pub struct FixerConfig {
    /// Raw symbol names to try, in order of preference, when locating `printk`
    pub symbol_names: Vec<String>,
    /// Leave a `Log level: KERN_*` comment at each patched call, unless a comment already exists
    pub annotate_log_levels: bool,
}

#[derive(clap::ArgEnum, Clone, Debug)]
/// Fixer configuration parameters
pub enum CommandLineFixerConfig {
    DisableLogLevelComments,
    DisableIndexedPrintkFallback,
}

impl Default for FixerConfig {
    fn default() -> Self {
        FixerConfig {
            symbol_names: vec![PRINTK_SYMBOL.to_owned(), INDEXED_PRINTK_SYMBOL.to_owned()],
            annotate_log_levels: true,
        }
    }
}

impl From<Vec<CommandLineFixerConfig>> for FixerConfig {
    fn from(v: Vec<CommandLineFixerConfig>) -> Self {
        use CommandLineFixerConfig::*;
        let mut r = FixerConfig::default();
        for v in v {
            match v {
                DisableLogLevelComments => {
                    r.annotate_log_levels = false;
                }
                DisableIndexedPrintkFallback => {
                    r.symbol_names.retain(|n| n != INDEXED_PRINTK_SYMBOL);
                }
            }
        }
        r
    }
}
