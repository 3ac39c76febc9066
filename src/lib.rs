//! Make `printk` format strings in Linux kernel modules readable in a disassembler's IL.
//!
//! Kernel log calls look like `printk(KERN_WARNING "something broke\n")`, where `KERN_WARNING`
//! expands to a two-byte `"\x01" "4"` prefix on the format string. Disassemblers then show the
//! string argument as an unprintable mess. [`pass::PrintkFixer`] finds such calls in a function's
//! medium-level IL, moves the format string pointer past the prefix, and leaves a comment with
//! the log level it stripped.

pub mod config;
pub mod containers;
pub mod header;
pub mod host;
pub mod il;
pub mod lifter;
pub mod log_level;
pub mod pass;
pub mod rewrite;
pub mod scanner;
pub mod serialize;
pub mod symbol_cache;
pub mod tests;

pub mod log {
    pub use slog_scope::{crit, debug, error, info, trace, warn};

    pub struct OptionalKV<V: slog::Value>(pub &'static str, pub Option<V>);
    impl<V: slog::Value> slog::KV for OptionalKV<V> {
        fn serialize(
            &self,
            record: &slog::Record,
            serializer: &mut dyn slog::Serializer,
        ) -> slog::Result {
            if let Some(v) = &self.1 {
                v.serialize(record, self.0, serializer)
            } else {
                Ok(())
            }
        }
    }

    /// Severity shown for a given number of `-d` flags
    pub fn severity_for_verbosity(verbosity: usize) -> sloggers::types::Severity {
        use sloggers::types::Severity;
        match verbosity {
            0 => Severity::Warning,
            1 => Severity::Info,
            2 => Severity::Debug,
            _ => Severity::Trace,
        }
    }

    /// Where log records go
    pub struct LogDestinations {
        /// Number of `-d` flags
        pub verbosity: usize,
        /// Drop terminal output entirely
        pub disable_terminal_logging: bool,
        /// Block rather than drop terminal records when they come in too fast
        pub force_block: bool,
        /// Also write JSON records to this file. With a file, only errors reach the terminal.
        pub path: Option<std::path::PathBuf>,
    }

    /// Sends records both to the terminal and (optionally) to a JSON log file.
    pub struct FileAndTermDrain {
        file_drain: Option<slog::Logger>,
        term_drain: slog::Logger,
    }
    impl FileAndTermDrain {
        pub fn new(dest: LogDestinations) -> Result<slog::Logger, String> {
            use sloggers::types::{Format, OverflowStrategy, Severity};
            use sloggers::Build;

            let level = severity_for_verbosity(dest.verbosity);

            let term_drain = if dest.disable_terminal_logging {
                sloggers::null::NullLoggerBuilder.build()
            } else {
                sloggers::terminal::TerminalLoggerBuilder::new()
                    .destination(sloggers::terminal::Destination::Stderr)
                    .level(if dest.path.is_none() {
                        level
                    } else {
                        Severity::Error
                    })
                    .overflow_strategy(if dest.force_block || dest.path.is_none() {
                        OverflowStrategy::Block
                    } else {
                        OverflowStrategy::DropAndReport
                    })
                    .format(Format::Compact)
                    .build()
            };
            let term_drain =
                term_drain.map_err(|e| format!("Could not set up terminal logging: {}", e))?;

            let file_drain = match dest.path {
                Some(path) => Some(
                    sloggers::file::FileLoggerBuilder::new(&path)
                        .truncate()
                        .level(level)
                        .overflow_strategy(OverflowStrategy::Block)
                        .format(Format::Json)
                        .build()
                        .map_err(|e| format!("Could not log to {}: {}", path.display(), e))?,
                ),
                None => None,
            };

            Ok(slog::Logger::root(
                Self {
                    file_drain,
                    term_drain,
                },
                slog::o!(),
            ))
        }
    }
    impl slog::Drain for FileAndTermDrain {
        type Ok = ();
        type Err = slog::Never;
        fn log(
            &self,
            r: &slog::Record<'_>,
            kv: &slog::OwnedKVList,
        ) -> Result<<Self as slog::Drain>::Ok, <Self as slog::Drain>::Err> {
            if let Some(f) = &self.file_drain {
                <slog::Logger as slog::Drain>::log(f, r, kv)?;
            }
            <slog::Logger as slog::Drain>::log(&self.term_drain, r, kv)?;
            Ok(())
        }
    }
}
