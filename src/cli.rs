// CLI definition
//
// Kept self-contained (clap and std only): the build script includes this
// file to generate the man page.

use clap::Parser;
use std::path::PathBuf;

/// Workspace-wide C source comprehension and safe rename engine
#[derive(Parser, Debug)]
#[command(name = "scour")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The workspace definition file
    pub workspace: PathBuf,

    /// Process the workspace and exit (no web server)
    #[arg(short = 'c', long = "compile-only")]
    pub compile_only: bool,

    /// Print preprocessed results on standard output and exit
    #[arg(short = 'E', long = "preprocess")]
    pub preprocess: bool,

    /// TCP port for the web interface
    #[arg(short = 'p', long = "port", default_value_t = 8081,
          value_parser = clap::value_parser!(u16).range(1024..=32767))]
    pub port: u16,

    /// Generate an identifier and include-file warning report on stderr
    #[arg(short = 'r', long = "report")]
    pub report: bool,

    /// Restrict analysis to identifiers matching a query spec (unsound)
    #[arg(short = 'm', long = "monitor", value_name = "SPEC")]
    pub monitor: Option<String>,

    /// Print version information and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    pub version: Option<bool>,
}
