//! checkpoint CLI entry point
//!
//! main.rs must:
//! 1. Parse args
//! 2. Dispatch to CLI commands
//! 3. Never call subsystems directly

use std::process;

use checkpoint::cli::{run_command, Cli};

fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = run_command(cli) {
        // Print error JSON and exit with the mapped code
        let error_json = serde_json::json!({
            "status": "error",
            "code": e.code_str(),
            "message": e.message()
        });

        eprintln!("{}", error_json);
        process::exit(e.exit_code());
    }
}
