use printk_fixer::*;

use std::path::PathBuf;

use clap::Parser;
use rayon::prelude::*;

use printk_fixer::log::*;

/// Strip log level headers from `printk` format strings in kernel modules
#[derive(Parser, Debug)]
#[clap(about, version, author)]
enum Args {
    /// Fix up medium-level IL exported from a disassembler
    FromExport {
        /// Path to an exported IL file (`.mlil-exported`)
        exported_il: PathBuf,
        /// Path to write the fixed-up IL to. Printed to stdout if not given.
        #[clap(long)]
        output: Option<PathBuf>,
        /// Disable terminal logging, even for high severity alerts. Strongly discouraged for normal
        /// use.
        #[clap(long)]
        debug_disable_terminal_logging: bool,
        /// Force blocking for terminal logging. If too many messages are being spewed the logger,
        /// by default, does not block, but instead dumps a dropped-messages alert. This option
        /// forces it to block and dump even if too many are being sent.
        #[clap(long)]
        debug_forced_blocking_terminal_logging: bool,
        /// Path to send log (as JSON) to
        ///
        /// Error or higher severity alerts will still continue being shown at stderr (in addition
        /// to being added to the log)
        #[clap(long = "--log")]
        log_file: Option<PathBuf>,
        /// Debug level (repeat for more: 0-warn, 1-info, 2-debug, 3-trace)
        #[clap(short, long, parse(from_occurrences))]
        debug: usize,
        /// Advanced configuration options to tweak the fixer's behavior
        #[clap(short = 'Z', long, arg_enum)]
        advanced_config: Vec<config::CommandLineFixerConfig>,
    },
}

fn main() {
    let args = Args::parse();

    match args {
        Args::FromExport {
            exported_il,
            output,
            debug_disable_terminal_logging,
            debug_forced_blocking_terminal_logging,
            log_file,
            debug,
            advanced_config,
        } => {
            let logger = match log::FileAndTermDrain::new(log::LogDestinations {
                verbosity: debug,
                disable_terminal_logging: debug_disable_terminal_logging,
                force_block: debug_forced_blocking_terminal_logging,
                path: log_file,
            }) {
                Ok(logger) => logger,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };
            let _log_guard = slog_scope::set_global_logger(logger);

            let fixer = pass::PrintkFixer::new(advanced_config.into());

            let lifted = std::fs::read_to_string(&exported_il)
                .map_err(|e| format!("Could not read {}: {}", exported_il.display(), e))
                .and_then(|s| lifter::lift_from(&s));
            let mut lifted = match lifted {
                Ok(l) => l,
                Err(e) => {
                    crit!("Could not load exported IL"; "error" => e);
                    std::process::exit(1);
                }
            };

            let image = &lifted.image;
            let reports: Vec<pass::FunctionReport> = lifted
                .functions
                .par_iter_mut()
                .map(|f| {
                    let report = fixer.run_on_function(image, f);
                    if report.modified() {
                        info!(
                            "Fixed function";
                            "name" => &f.name,
                            "calls_rewritten" => report.calls_rewritten,
                            "comments_added" => report.comments_added,
                        );
                    }
                    report
                })
                .collect();

            let mut total = pass::FunctionReport::default();
            for r in reports {
                total += r;
            }
            info!(
                "Fixed exported IL";
                "functions" => lifted.functions.len(),
                "calls_found" => total.calls_found,
                "calls_rewritten" => total.calls_rewritten,
                "comments_added" => total.comments_added,
            );

            if let Some(path) = output {
                if let Err(e) = std::fs::write(&path, lifted.to_string()) {
                    crit!("Could not write output"; "path" => %path.display(), "error" => %e);
                    std::process::exit(1);
                }
            } else {
                print!("{}", lifted);
            }
        }
    }
}
