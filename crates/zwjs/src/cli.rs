//! Clap derive structures for the `zwjs` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zwjs -- command-line client for Z-Wave JS Server
#[derive(Debug, Parser)]
#[command(
    name = "zwjs",
    version,
    about = "Drive a Z-Wave JS Server from the command line",
    long_about = "Talks to a Z-Wave JS Server over its WebSocket protocol.\n\n\
        Start and stop inclusion or exclusion, write node values, send raw\n\
        commands, and watch the event stream.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "ZWJS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server address, `host:port` or a ws:// URL (overrides profile)
    #[arg(long, short = 's', env = "ZWJS_SERVER", global = true)]
    pub server: Option<String>,

    /// Seconds to wait for a command result (0 waits forever)
    #[arg(long, env = "ZWJS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format [default: `defaults.output` from the config file, else json]
    #[arg(long, short = 'o', env = "ZWJS_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

impl GlobalOpts {
    /// Output format after flags and config defaults have been applied.
    pub fn format(&self) -> OutputFormat {
        self.output.unwrap_or(OutputFormat::Json)
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one line per item (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print server events as they arrive
    #[command(alias = "events")]
    Listen(ListenArgs),

    /// Add devices to the Z-Wave network
    #[command(alias = "inc")]
    Include(IncludeArgs),

    /// Remove devices from the Z-Wave network
    #[command(alias = "exc")]
    Exclude(ExcludeArgs),

    /// Write a value on a node
    SetValue(SetValueArgs),

    /// Send a raw command frame
    Send(SendArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Listen ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Only print events from this source (controller, node, driver)
    #[arg(long)]
    pub source: Option<String>,
}

// ── Inclusion / Exclusion ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct IncludeArgs {
    #[command(subcommand)]
    pub command: IncludeCommand,
}

#[derive(Debug, Subcommand)]
pub enum IncludeCommand {
    /// Put the controller into inclusion mode
    Start,
    /// Leave inclusion mode
    Stop,
}

#[derive(Debug, Args)]
pub struct ExcludeArgs {
    #[command(subcommand)]
    pub command: ExcludeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ExcludeCommand {
    /// Put the controller into exclusion mode
    Start {
        /// Wait until the controller leaves exclusion mode
        #[arg(long, short = 'w')]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "120", requires = "wait")]
        wait_timeout: u64,
    },
    /// Leave exclusion mode
    Stop,
}

// ── Values ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetValueArgs {
    /// Node ID
    #[arg(long, short = 'n')]
    pub node: u32,

    /// Command class ID, decimal or 0x-prefixed hex (e.g. 0x25)
    #[arg(long, short = 'c', value_parser = parse_command_class)]
    pub command_class: u16,

    /// Property name (e.g. targetValue)
    #[arg(long, default_value = "targetValue")]
    pub property: String,

    /// Value as JSON (`99`, `true`, `"text"`); anything else is sent as a string
    #[arg(long)]
    pub value: String,
}

/// Parse a command class ID given as decimal or `0x` hex.
pub fn parse_command_class(raw: &str) -> Result<u16, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("'{raw}' is not a command class ID: {e}"))
}

// ── Raw frames ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Complete JSON frame, e.g. '{"messageId":"1","command":"start_listening"}'
    pub frame: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Create or update a profile in the config file
    Init {
        /// Server address for the profile
        #[arg(long, default_value = zwjs_config::DEFAULT_SERVER)]
        server: String,

        /// Overwrite an existing profile of the same name
        #[arg(long, short = 'f')]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
