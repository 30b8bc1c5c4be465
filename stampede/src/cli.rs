use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "HTTP load testing driven by named load profiles",
    long_about = "stampede runs a session of HTTP steps under a named load profile and judges the run against the profile's thresholds.\n\nBuilt-in profiles are `basic`, `stages` and `stress`; unknown profile names fall back to `basic`.",
    after_help = "Examples:\n  stampede run --base-url http://localhost:8080 --token secret\n  PROFILE=stress TOKEN=secret stampede run --session demos/session.yaml\n  stampede run --profiles demos/profiles.yaml --profile smoke --output json\n  stampede profiles --profiles demos/profiles.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a session under a load profile
    #[command(
        long_about = "Run a session under a load profile.\n\nWithout --session the built-in destination search session is used. The exit status is non-zero when any threshold fails."
    )]
    Run(RunArgs),

    /// List the available load profiles
    Profiles(ProfilesArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Load profile name (falls back to `basic` when unknown)
    #[arg(long, env = "PROFILE", default_value = "basic")]
    pub profile: String,

    /// Bearer token sent as `Authorization: Bearer <token>`
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Override the session base URL
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Session definition (YAML)
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Extra or overriding load profiles (YAML)
    #[arg(long)]
    pub profiles: Option<PathBuf>,

    /// Time in-flight iterations get to finish once a scenario ends (e.g. 30s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write the end-of-run report as JSON
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Write the end-of-run report as a self-contained HTML page
    #[arg(long, value_name = "PATH")]
    pub report_html: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    /// Extra or overriding load profiles (YAML)
    #[arg(long)]
    pub profiles: Option<PathBuf>,
}
