// crates/vpt-cli/src/args.rs
// ============================================================================
// Module: CLI Arguments
// Description: clap-derive argument types for the `vpt` script runner (§6
//              "CLI surface (scripts)").
// Purpose: Parse the fixed goto/fullzap surface, including the legacy
//          `userinterface_name` positional-or-flag aliasing.
// Dependencies: clap
// ============================================================================

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use crate::error::CliError;

/// The `vpt` script runner.
#[derive(Debug, Parser)]
#[command(name = "vpt", about = "Run a navigation or zap script against one device")]
pub struct Cli {
    /// User interface name, positional form.
    pub userinterface_positional: Option<String>,

    /// User interface name (current flag form).
    #[arg(long = "userinterface", global = true)]
    pub userinterface_flag: Option<String>,

    /// User interface name (legacy flag form).
    #[arg(long = "userinterface_name", global = true)]
    pub userinterface_name_flag: Option<String>,

    /// Host name the script is running from, recorded on every execution row.
    #[arg(long, global = true)]
    pub host: String,

    /// Device identifier under test.
    #[arg(long, global = true)]
    pub device: String,

    /// Device model under test. Defaults to `--device` when omitted, since
    /// device-model lookup is a provisioning concern out of scope here.
    #[arg(long = "device-model", global = true)]
    pub device_model: Option<String>,

    /// Maximum iteration count, used by `fullzap`.
    #[arg(long = "max-iteration", default_value_t = 1, global = true)]
    pub max_iteration: u32,

    /// Path to the engine TOML config file (defaults to `VPT_CONFIG` or `vpt.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The script to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// The script-specific subcommands (§6).
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Navigates to a target node from the device's current position.
    Goto {
        /// Target node label.
        #[arg(long)]
        node: String,
    },
    /// Repeatedly dispatches a channel-change action and analyzes each zap.
    Fullzap {
        /// The channel-change command to dispatch each iteration.
        #[arg(long)]
        action: String,
        /// Run the audio-verification pass alongside the subtitle pass.
        #[arg(long = "audio-analysis", default_value_t = false)]
        audio_analysis: bool,
    },
}

impl Cli {
    /// Resolves the effective user interface name across positional and
    /// flag forms (§6: "Positional optional: `userinterface_name` (also
    /// accepted as `--userinterface`/legacy `--userinterface_name`)").
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Args`] when two different forms disagree.
    pub fn userinterface_name(&self) -> Result<Option<String>, CliError> {
        let values = [&self.userinterface_positional, &self.userinterface_flag, &self.userinterface_name_flag];
        let mut resolved: Option<&String> = None;
        for value in values.into_iter().flatten() {
            match resolved {
                None => resolved = Some(value),
                Some(existing) if existing == value => {}
                Some(existing) => {
                    return Err(CliError::Args(format!(
                        "conflicting userinterface_name values: {existing:?} vs {value:?}"
                    )));
                }
            }
        }
        Ok(resolved.cloned())
    }

    /// Resolves the effective device model, defaulting to the device id.
    #[must_use]
    pub fn device_model(&self) -> String {
        self.device_model.clone().unwrap_or_else(|| self.device.clone())
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn positional_userinterface_name_is_resolved() -> Result<(), CliError> {
        let cli = parse(&["vpt", "living_room", "--host", "host-1", "--device", "dev-1", "goto", "--node", "Settings"]);
        assert_eq!(cli.userinterface_name()?, Some("living_room".to_string()));
        Ok(())
    }

    #[test]
    fn flag_userinterface_name_is_resolved() -> Result<(), CliError> {
        let cli = parse(&["vpt", "--userinterface", "living_room", "--host", "host-1", "--device", "dev-1", "goto", "--node", "Settings"]);
        assert_eq!(cli.userinterface_name()?, Some("living_room".to_string()));
        Ok(())
    }

    #[test]
    fn legacy_flag_userinterface_name_is_resolved() -> Result<(), CliError> {
        let cli = parse(&[
            "vpt",
            "--userinterface_name",
            "living_room",
            "--host",
            "host-1",
            "--device",
            "dev-1",
            "goto",
            "--node",
            "Settings",
        ]);
        assert_eq!(cli.userinterface_name()?, Some("living_room".to_string()));
        Ok(())
    }

    #[test]
    fn conflicting_userinterface_values_are_rejected() {
        let cli = parse(&[
            "vpt",
            "living_room",
            "--userinterface",
            "bedroom",
            "--host",
            "host-1",
            "--device",
            "dev-1",
            "goto",
            "--node",
            "Settings",
        ]);
        assert!(cli.userinterface_name().is_err());
    }

    #[test]
    fn device_model_defaults_to_device_id() {
        let cli = parse(&["vpt", "--host", "host-1", "--device", "dev-1", "goto", "--node", "Settings"]);
        assert_eq!(cli.device_model(), "dev-1");
    }

    #[test]
    fn fullzap_parses_action_and_audio_flag() {
        let cli = parse(&[
            "vpt",
            "--host",
            "host-1",
            "--device",
            "dev-1",
            "--max-iteration",
            "3",
            "fullzap",
            "--action",
            "live_chup",
            "--audio-analysis",
        ]);
        assert_eq!(cli.max_iteration, 3);
        match cli.command {
            Commands::Fullzap { action, audio_analysis } => {
                assert_eq!(action, "live_chup");
                assert!(audio_analysis);
            }
            Commands::Goto { .. } => panic!("expected fullzap"),
        }
    }
}
