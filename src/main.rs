//! opendiv-db CLI entry point.

use std::process;

use opendiv_db::cli::{run_command, Cli};

fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = run_command(cli.command) {
        let error_json = serde_json::json!({
            "status": "error",
            "code": e.code(),
            "message": e.to_string()
        });

        eprintln!("{}", error_json);
        process::exit(1);
    }
}
