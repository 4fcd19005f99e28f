//! Command-line argument definitions for flatrec
//!
//! The whole CLI surface is declared with the clap derive API: one global
//! verbosity switch and three subcommands operating on a JSON schema document.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the flatrec record mapper
///
/// Reads fixed-width and delimited flat files into structured records and
/// writes structured records back into flat text, driven by a schema document.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flatrec",
    version,
    about = "Map fixed-width and delimited flat-file records to structured data and back",
    long_about = "Parses flat files whose record layouts are declared in a JSON schema document. \
                  Each matched record is emitted as a JSON line holding its populated beans, and \
                  JSON lines of the same shape can be written back into the flat layout."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output (quiet mode)
    ///
    /// Only errors are logged and no progress spinner is drawn.
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Parse a flat file into JSON lines, one per matched record
    Parse(ParseArgs),
    /// Write JSON lines of `{record, beans}` back into flat text
    Write(WriteArgs),
    /// Load and validate a schema document without reading any data
    Validate(ValidateArgs),
}

/// Arguments for the parse command
#[derive(Debug, Clone, Parser)]
pub struct ParseArgs {
    /// Schema document describing the file layout
    #[arg(
        short = 's',
        long = "schema",
        value_name = "PATH",
        help = "JSON schema document describing the records"
    )]
    pub schema: PathBuf,

    /// Flat file to parse
    #[arg(value_name = "INPUT", help = "Flat file to parse")]
    pub input: PathBuf,

    /// Destination for the JSON lines
    ///
    /// Written to standard output when omitted.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Write JSON lines to this file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    /// Report record errors and carry on with the next record
    ///
    /// Without this flag the first unmatched line, conversion failure or
    /// cardinality violation stops the run.
    #[arg(
        short = 'k',
        long = "keep-going",
        help = "Report record errors and continue with the next record"
    )]
    pub keep_going: bool,

    /// Format of the closing summary
    #[arg(
        long = "report",
        value_enum,
        default_value = "human",
        help = "Format of the summary printed after parsing"
    )]
    pub report: ReportFormat,
}

/// Arguments for the write command
#[derive(Debug, Clone, Parser)]
pub struct WriteArgs {
    /// Schema document describing the file layout
    #[arg(
        short = 's',
        long = "schema",
        value_name = "PATH",
        help = "JSON schema document describing the records"
    )]
    pub schema: PathBuf,

    /// JSON lines file, each line an object `{"record": ..., "beans": {...}}`
    #[arg(value_name = "INPUT", help = "JSON lines of records to write")]
    pub input: PathBuf,

    /// Destination for the flat text
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Write flat text to this file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Debug, Clone, Parser)]
pub struct ValidateArgs {
    #[arg(
        short = 's',
        long = "schema",
        value_name = "PATH",
        help = "JSON schema document to validate"
    )]
    pub schema: PathBuf,
}

/// Summary format for the parse command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary on stderr
    Human,
    /// JSON object on stderr
    Json,
    /// No summary
    None,
}

impl Args {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Progress spinners are drawn unless running quietly
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}
