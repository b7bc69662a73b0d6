//! fsdedup - copy-on-write file deduplication
//!
//! Entry point for the fsdedup CLI application.

use clap::Parser;
use fsdedup::{
    cli::Cli,
    error::{ExitCode, StructuredError},
};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match fsdedup::run_app(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            let exit_code = ExitCode::GeneralError;

            if json_errors {
                match serde_json::to_string_pretty(&StructuredError::new(&err, exit_code)) {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err),
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            exit_code.into()
        }
    }
}
