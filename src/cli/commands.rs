//! Command implementations for the flatrec CLI
//!
//! Each subcommand loads a schema document, runs the library against files on
//! disk and reports a short summary. Errors are `anyhow` errors carrying the
//! file they concern.

use crate::cli::args::{Args, Commands, ParseArgs, ReportFormat, ValidateArgs, WriteArgs};
use crate::dispatch::FileParser;
use crate::models::{Bean, BeanMap, ParseStats};
use crate::schema::{FileFormat, SchemaLoader};
use crate::writer::RecordWriter;
use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Failures shown individually in the human report before eliding the rest
const REPORTED_FAILURES: usize = 10;

/// Outcome of one CLI command
#[derive(Debug, Clone, Default)]
pub struct CommandSummary {
    /// Dispatch statistics (parse only)
    pub stats: ParseStats,
    /// Records written back to flat text (write only)
    pub records_written: usize,
    pub lines_written: usize,
    /// Record errors skipped under `--keep-going`, with the line that caused them
    pub failures: Vec<RecordFailure>,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub kind: &'static str,
    pub message: String,
    pub line: Option<String>,
}

/// Main command runner
pub fn run(args: Args) -> Result<CommandSummary> {
    setup_logging(&args)?;
    debug!("Command line arguments: {:?}", args);

    let show_progress = args.show_progress();
    match args.command {
        Some(Commands::Parse(parse)) => {
            let summary = run_parse(&parse, show_progress)?;
            match parse.report {
                ReportFormat::Human => generate_human_report(&summary),
                ReportFormat::Json => generate_json_report(&summary)?,
                ReportFormat::None => {}
            }
            Ok(summary)
        }
        Some(Commands::Write(write)) => {
            let summary = run_write(&write)?;
            if show_progress {
                eprintln!(
                    "{} {} records as {} lines in {}",
                    "Wrote".green().bold(),
                    summary.records_written,
                    summary.lines_written,
                    HumanDuration(summary.processing_time)
                );
            }
            Ok(summary)
        }
        Some(Commands::Validate(validate)) => run_validate(&validate),
        None => bail!("No command given; run `flatrec --help` for usage"),
    }
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("flatrec={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Load and validate the schema document at `path`
pub fn load_format(path: &Path) -> Result<FileFormat> {
    info!("Loading schema from {}", path.display());
    SchemaLoader::new()
        .load_path(path)
        .with_context(|| format!("Failed to load schema '{}'", path.display()))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file '{}'", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} records {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// Parse a flat file, emitting one JSON line per matched record
pub fn run_parse(args: &ParseArgs, show_progress: bool) -> Result<CommandSummary> {
    let start_time = Instant::now();
    let format = load_format(&args.schema)?;
    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open input file '{}'", args.input.display()))?;

    let out = RefCell::new(open_output(args.output.as_deref())?);
    let failures = RefCell::new(Vec::new());
    let progress = if show_progress {
        Some(spinner("parsed")?)
    } else {
        None
    };

    let mut parser = FileParser::new(&format);
    for record in format.records() {
        let (out, progress) = (&out, &progress);
        parser = parser.on_record(record.name.clone(), move |matched| {
            let mut out = out.borrow_mut();
            serde_json::to_writer(&mut *out, &matched).map_err(io::Error::from)?;
            writeln!(out)?;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            Ok(())
        });
    }
    if args.keep_going {
        parser = parser.on_exception(|error, line| {
            warn!("Skipping record: {}", error);
            failures.borrow_mut().push(RecordFailure {
                kind: error.kind(),
                message: error.to_string(),
                line: line.map(str::to_string),
            });
        });
    }

    let result = parser.parse_reader(input);
    drop(parser);
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let stats = result.with_context(|| format!("Failed to parse '{}'", args.input.display()))?;
    out.into_inner().flush().context("Failed to flush parsed records")?;

    Ok(CommandSummary {
        stats,
        failures: failures.into_inner(),
        processing_time: start_time.elapsed(),
        ..Default::default()
    })
}

/// Rebuild a record name and bean map from one `{record, beans}` JSON line
pub fn parse_json_record(line: &str) -> Result<(String, BeanMap)> {
    let json: serde_json::Value = serde_json::from_str(line).context("Malformed JSON")?;
    let name = json
        .get("record")
        .and_then(serde_json::Value::as_str)
        .context("Missing \"record\" name")?;
    let beans = json
        .get("beans")
        .and_then(serde_json::Value::as_object)
        .context("Missing \"beans\" object")?
        .iter()
        .map(|(bean, value)| (bean.clone(), Bean::from_json(value)))
        .collect();
    Ok((name.to_string(), beans))
}

/// Write JSON lines of records back into flat text
pub fn run_write(args: &WriteArgs) -> Result<CommandSummary> {
    let start_time = Instant::now();
    let format = load_format(&args.schema)?;
    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open input file '{}'", args.input.display()))?;

    let mut writer = RecordWriter::new(&format, open_output(args.output.as_deref())?)?;
    for (index, line) in BufReader::new(input).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read '{}'", args.input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let (name, beans) = parse_json_record(&line)
            .with_context(|| format!("Invalid record on line {}", index + 1))?;
        writer
            .write(&name, &beans)
            .with_context(|| format!("Failed to write record '{}' from line {}", name, index + 1))?;
    }
    writer.flush().context("Failed to flush flat output")?;
    info!(
        "Wrote {} records ({} lines)",
        writer.records_written(),
        writer.lines_written()
    );

    Ok(CommandSummary {
        records_written: writer.records_written(),
        lines_written: writer.lines_written(),
        processing_time: start_time.elapsed(),
        ..Default::default()
    })
}

/// Load a schema document and describe the records it declares
pub fn run_validate(args: &ValidateArgs) -> Result<CommandSummary> {
    let start_time = Instant::now();
    let format = load_format(&args.schema)?;

    println!("{} {}", "Schema is valid:".green().bold(), args.schema.display());
    println!("   encoding: {}", format.config.encoding);
    for record in format.records() {
        let lines = record.definition.lines.len();
        let identity = if record.is_default() { " (default)" } else { "" };
        println!(
            "   • {}{}: {} line{}, {} bean{}",
            record.name.cyan(),
            identity,
            lines,
            if lines == 1 { "" } else { "s" },
            record.definition.beans.len(),
            if record.definition.beans.len() == 1 { "" } else { "s" },
        );
    }

    Ok(CommandSummary {
        processing_time: start_time.elapsed(),
        ..Default::default()
    })
}

/// Human-readable parse summary on stderr
fn generate_human_report(summary: &CommandSummary) {
    let stats = &summary.stats;
    eprintln!();
    eprintln!("{}", "Parsing complete".green().bold());
    eprintln!("   • Lines read: {}", stats.lines_read);
    eprintln!("   • Records matched: {}", stats.records_matched);
    for (name, count) in &stats.records_by_name {
        eprintln!("       {}: {}", name, count);
    }
    eprintln!("   • Processing time: {}", HumanDuration(summary.processing_time));

    if stats.records_failed > 0 {
        eprintln!(
            "{}",
            format!("   • Records skipped: {}", stats.records_failed).yellow().bold()
        );
        for failure in summary.failures.iter().take(REPORTED_FAILURES) {
            eprintln!("       [{}] {}", failure.kind.red(), failure.message);
        }
        let hidden = summary.failures.len().saturating_sub(REPORTED_FAILURES);
        if hidden > 0 {
            eprintln!("       ... and {} more", hidden);
        }
    }
}

/// JSON parse summary on stderr
fn generate_json_report(summary: &CommandSummary) -> Result<()> {
    let stats = &summary.stats;
    let report = serde_json::json!({
        "lines_read": stats.lines_read,
        "records_matched": stats.records_matched,
        "records_failed": stats.records_failed,
        "records_by_name": stats.records_by_name,
        "errors_by_kind": stats.errors_by_kind,
        "processing_time_seconds": summary.processing_time.as_secs_f64(),
        "failures": summary.failures.iter().map(|failure| {
            serde_json::json!({
                "kind": failure.kind,
                "message": failure.message,
                "line": failure.line,
            })
        }).collect::<Vec<_>>()
    });
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
