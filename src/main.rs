//! `nova-ext` - build and run Nova extensions from the command line.

use std::process::ExitCode;

use console::style;

fn main() -> ExitCode {
    match nova_extensions::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
