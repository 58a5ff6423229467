//! Command-line interface definitions for the ctxkey binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;

/// Command-line interface for the `ctxkey` binary.
#[derive(Parser, Debug)]
#[command(
    name = "ctxkey",
    about = "Evaluate and inspect context key when-clauses",
    version
)]
pub struct Cli {
    /// Logging controls shared across ctxkey binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// What to do with the rule.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a rule and print `true` or `false`.
    Eval(EvalArgs),
    /// Print the canonical form of a rule.
    Normalize(RuleArgs),
    /// Print every key a rule references, one per line.
    Keys(RuleArgs),
}

/// A rule given on the command line.
#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    /// Rule text, e.g. `editorFocus && !inDebugMode`.
    #[arg(value_name = "RULE")]
    pub rule: String,
}

/// Arguments for the `eval` subcommand.
#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// Rule to evaluate.
    #[command(flatten)]
    pub rule: RuleArgs,

    /// JSON or RON map of context values, applied to a scope under the root.
    #[arg(long, value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// JSON or RON map of preferences backing `config.*` keys.
    #[arg(long, value_name = "FILE")]
    pub prefs: Option<PathBuf>,

    /// Extra `key=value` context entries; values are read as JSON, falling
    /// back to a plain string.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}
