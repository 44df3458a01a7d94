// crates/vpt-cli/src/error.rs
// ============================================================================
// Module: CLI Error
// Description: The dispatcher's single error type.
// Purpose: Give every fallible CLI step a `?`-friendly error that renders
//          directly to stderr.
// Dependencies: thiserror, vpt-config, vpt-core
// ============================================================================

use thiserror::Error;

/// Errors surfaced by the CLI dispatcher itself, distinct from a script's
/// own success/failure (§7 "User-visible failure").
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] vpt_config::ConfigError),
    /// A durable-storage or controller call failed.
    #[error("{0}")]
    Engine(#[from] vpt_core::VptError),
    /// A stdout/stderr write failed.
    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
    /// The `tokio::task::spawn_blocking` join itself failed.
    #[error("background task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Argument resolution failed (e.g. conflicting userinterface flags).
    #[error("{0}")]
    Args(String),
}

/// CLI result alias for fallible operations.
pub type CliResult<T> = Result<T, CliError>;
