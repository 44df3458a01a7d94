// crates/vpt-cli/src/output.rs
// ============================================================================
// Module: Output Helpers
// Description: Raw stdout/stderr line writers and the distinguished
//              `SCRIPT_*` protocol lines (§6 "CLI surface (scripts)").
// Purpose: Keep every write going through one place, since `print_stdout`/
//          `print_stderr` are denied crate-wide.
// Dependencies: std
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

/// Writes one line to stdout.
pub fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes one line to stderr.
pub fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns the unhandled-exception exit
/// code (§7: `1` on unhandled exception or interrupt).
pub fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

/// Prints the `SCRIPT_SUCCESS:true|false` line and, when present,
/// `SCRIPT_REPORT_URL:<url>` / `SCRIPT_LOGS_URL:<url>` (§6, §7).
pub fn emit_script_result(success: bool, report_url: Option<&str>, logs_url: Option<&str>) -> std::io::Result<()> {
    write_stdout_line(&format!("SCRIPT_SUCCESS:{success}"))?;
    if let Some(url) = report_url {
        write_stdout_line(&format!("SCRIPT_REPORT_URL:{url}"))?;
    }
    if let Some(url) = logs_url {
        write_stdout_line(&format!("SCRIPT_LOGS_URL:{url}"))?;
    }
    Ok(())
}
