// crates/vpt-cli/src/main.rs
// ============================================================================
// Module: VPT Script Runner Entry Point
// Description: Parses the `goto`/`fullzap` CLI surface, assembles the
//              engine stack, runs the script, and reports its outcome (§6
//              "CLI surface (scripts)", §7 "Error handling design").
// Purpose: The one binary a host process spawns per script execution.
// Dependencies: clap, tokio, tracing, vpt-core, vpt-exec, vpt-config,
//               vpt-store-sqlite, vpt-broker, vpt-controllers
// ============================================================================

//! ## Overview
//! `main` parses arguments, then hands the blocking engine work to
//! `tokio::task::spawn_blocking` — every `vpt-exec` executor is
//! synchronous by design, so the async runtime here exists only to bound
//! one script invocation's lifetime and keep the binary consistent with
//! other host processes built on the same stack.
//!
//! Per §7, a script failure is not a dispatcher failure: `run` always
//! records the execution row, always publishes a report, and always prints
//! `SCRIPT_SUCCESS:false` on a failed run before returning exit code `0`.
//! Exit code `1` is reserved for failures in the dispatcher itself (config
//! load, durable-storage open, an unhandled panic join error).

mod args;
mod commands;
mod error;
mod output;
mod report;
mod runtime;

use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vpt_core::VptError;

use crate::args::Cli;
use crate::args::Commands;
use crate::commands::CommandOutcome;
use crate::error::CliError;
use crate::error::CliResult;
use crate::output::emit_error;
use crate::output::emit_script_result;
use crate::output::write_stderr_line;
use crate::report::publish;
use crate::runtime::ScriptRuntime;

/// CLI entry point returning an exit code (§7: `1` on unhandled exception
/// or interrupt, `0` otherwise).
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, bootstraps the engine stack, and dispatches to the
/// requested script command.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let script_name = match &cli.command {
        Commands::Goto { .. } => "goto",
        Commands::Fullzap { .. } => "fullzap",
    };

    let mut runtime = tokio::task::spawn_blocking(move || ScriptRuntime::bootstrap(&cli).map(|runtime| (runtime, cli))).await??;
    let (ref mut rt, ref cli) = runtime;

    // A freshly bootstrapped device never has a script id yet; recording the
    // start row here is what gives it one, and stamps it onto the
    // navigation context so edge/zap-iteration rows link back to it.
    let script_result_id = start_script_record(rt, script_name, cli);

    let outcome = dispatch(rt, cli).await?;

    let device_model = cli.device_model();
    let (report_url, logs_url) = publish_report(rt, &device_model, &outcome)?;

    finish_script_record(rt, &script_result_id, &outcome, &report_url, &logs_url)?;

    emit_script_result(outcome.success, Some(&report_url), Some(&logs_url))?;
    Ok(ExitCode::SUCCESS)
}

/// Records the script-execution start row (§6 `record_script_execution_start`).
fn start_script_record(rt: &mut ScriptRuntime, script_name: &str, cli: &Cli) -> vpt_core::ScriptResultId {
    let userinterface_name = cli.userinterface_name().ok().flatten().map(vpt_core::UserInterfaceName::new);
    let team_id = rt.config.team_id();
    let host_name = vpt_core::HostName::new(cli.host.clone());
    let device_id = vpt_core::DeviceId::new(cli.device.clone());
    match rt.store.record_script_execution_start(
        &team_id,
        script_name,
        script_name,
        userinterface_name.as_ref(),
        &host_name,
        &device_id,
        None,
    ) {
        Ok(id) => {
            rt.device.navigation_mut().script_id = Some(id.clone());
            id
        }
        Err(err) => {
            let _ = write_stderr_line(&format!("failed to record script execution start: {err}"));
            vpt_core::ScriptResultId::new(String::new())
        }
    }
}

/// Runs the requested script command against the assembled device.
async fn dispatch(rt: &mut ScriptRuntime, cli: &Cli) -> CliResult<CommandOutcome> {
    match &cli.command {
        Commands::Goto { node } => {
            let node = node.clone();
            run_goto(rt, node).await
        }
        Commands::Fullzap { action, audio_analysis } => {
            let action = action.clone();
            let max_iteration = cli.max_iteration;
            let audio_analysis = *audio_analysis;
            run_fullzap(rt, action, max_iteration, audio_analysis).await
        }
    }
}

/// Runs `goto` on a blocking thread (`vpt-exec`'s executors are synchronous).
async fn run_goto(rt: &mut ScriptRuntime, node: String) -> CliResult<CommandOutcome> {
    run_blocking(rt, move |device| commands::goto::run(device, &node)).await
}

/// Runs `fullzap` on a blocking thread.
async fn run_fullzap(rt: &mut ScriptRuntime, action: String, max_iteration: u32, audio_analysis: bool) -> CliResult<CommandOutcome> {
    run_blocking(rt, move |device| commands::fullzap::run(device, &action, max_iteration, audio_analysis)).await
}

/// Moves `device` onto a blocking thread for the duration of `body`, then
/// hands it back. `DeviceHandle` borrows nothing async-unsafe, but every
/// call into `vpt-exec` is blocking I/O and should not run on the async
/// executor's own worker threads.
async fn run_blocking<F>(rt: &mut ScriptRuntime, body: F) -> CliResult<CommandOutcome>
where
    F: FnOnce(&mut vpt_exec::DeviceHandle) -> Result<CommandOutcome, VptError> + Send + 'static,
{
    let mut device = std::mem::replace(&mut rt.device, placeholder_device());
    let (device, outcome) = tokio::task::spawn_blocking(move || {
        let result = body(&mut device);
        (device, result)
    })
    .await?;
    rt.device = device;
    Ok(outcome?)
}

/// A cheap, otherwise-unused `DeviceHandle` swapped in while the real one is
/// moved to a blocking thread.
fn placeholder_device() -> vpt_exec::DeviceHandle {
    struct NoTrees;
    impl vpt_core::TreeSource for NoTrees {
        fn fetch_userinterface_trees(
            &self,
            _name: &vpt_core::UserInterfaceName,
            _team_id: &vpt_core::TeamId,
        ) -> Result<Vec<vpt_core::Tree>, VptError> {
            Ok(Vec::new())
        }
    }
    vpt_exec::DeviceHandle::new(
        vpt_core::TeamId::new(""),
        vpt_core::HostName::new(""),
        vpt_core::DeviceModel::new(""),
        vpt_core::DeviceId::new(""),
        vpt_core::UserInterfaceName::new(""),
        "",
        std::sync::Arc::new(vpt_controllers::ControllerRegistry::new()),
        std::sync::Arc::new(NoTrees),
        std::sync::Arc::new(vpt_graph::GraphCache::new()),
        None,
    )
}

/// Builds and uploads the report/log artifacts for this run.
fn publish_report(rt: &ScriptRuntime, device_model: &str, outcome: &CommandOutcome) -> CliResult<(String, String)> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_secs()).unwrap_or_default();
    let yyyymmdd = format_yyyymmdd(now);
    let (report_url, logs_url) = publish(
        rt.object_store.as_ref(),
        &rt.capture_root,
        device_model,
        &outcome.summary,
        &yyyymmdd,
        i64::try_from(now).unwrap_or(i64::MAX),
    )?;
    Ok((report_url, logs_url))
}

/// Finalizes the script-execution row (§6 `update_script_execution_result`).
fn finish_script_record(
    rt: &ScriptRuntime,
    script_result_id: &vpt_core::ScriptResultId,
    outcome: &CommandOutcome,
    report_url: &str,
    logs_url: &str,
) -> CliResult<()> {
    if script_result_id.as_str().is_empty() {
        return Ok(());
    }
    rt.store.update_script_execution_result(
        script_result_id,
        outcome.success,
        None,
        Some(report_url),
        Some(logs_url),
        outcome.error_msg.as_deref(),
        None,
    )?;
    Ok(())
}

/// Formats a unix-second timestamp as `yyyymmdd` (UTC), without pulling in a
/// full calendar dependency for one field in a storage key.
fn format_yyyymmdd(unix_seconds: u64) -> String {
    const SECONDS_PER_DAY: u64 = 86_400;
    let days_since_epoch = unix_seconds / SECONDS_PER_DAY;
    let (year, month, day) = civil_from_days(i64::try_from(days_since_epoch).unwrap_or(0));
    format!("{year:04}{month:02}{day:02}")
}

/// Howard Hinnant's `civil_from_days`: converts a day count since the Unix
/// epoch into a proleptic-Gregorian `(year, month, day)` triple.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = u64::try_from(z - era * 146_097).unwrap_or(0);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = i64::try_from(yoe).unwrap_or(0) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = u32::try_from(doy - (153 * mp + 2) / 5 + 1).unwrap_or(0);
    let month = u32::try_from(if mp < 10 { mp + 3 } else { mp - 9 }).unwrap_or(0);
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}
