//! JSON output for CLI commands.

use serde::Serialize;

use hookwork_plugin::AdminResponse;

/// Print a response as pretty JSON and report whether it succeeded.
pub fn print_response<T: Serialize>(response: &AdminResponse<T>) -> bool {
    let json = serde_json::to_string_pretty(response).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
    response.success
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}
