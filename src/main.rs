use clap::Parser;
use fleurio::cli::Cli;
use fleurio::utils::{logging, output};

use std::error::Error;

fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    if let Err(e) = fleurio::commands::run(cli.command) {
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        output::print_error(&message);
        std::process::exit(1);
    }
}
