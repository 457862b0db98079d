//! jsondir - Directory-backed JSON document store

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = jsondir::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
