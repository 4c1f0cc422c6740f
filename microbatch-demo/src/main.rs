// SPDX-License-Identifier: MIT
// microbatch-demo: feeds inputs through a micro-batcher
//
// - Every input becomes one job, the processor upper-cases it.
// - Results are printed in submission order, as text or JSON.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::info;
use microbatch::{Batcher, BatcherConfig, Concurrency, Job};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Milliseconds between timer flushes
    #[arg(long = "frequency-ms", value_name = "MS")]
    frequency_ms: Option<u64>,

    /// Number of queued jobs that triggers an immediate flush
    #[arg(long)]
    batch_size: Option<usize>,

    /// Process jobs on a fixed pool of this many worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Batcher config as JSON. Flags given on the command line take precedence.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How results are printed
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Inputs to process. Read line by line from stdin when empty.
    inputs: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "kebab-case")]
enum OutputFormat {
    #[default]
    /// One line per job
    Text,
    /// A JSON array with one object per job
    Json,
}

/// Output of the demo processor. Failures are encoded in the output
/// because the batcher has no error channel of its own.
#[derive(Debug, Clone, Serialize)]
struct Processed {
    output: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    id: u64,
    input: &'a str,
    #[serde(flatten)]
    processed: &'a Processed,
}

fn process(input: String) -> Processed {
    if input.trim().is_empty() {
        return Processed {
            output: None,
            error: Some("empty input".into()),
        };
    }
    Processed {
        output: Some(input.to_uppercase()),
        error: None,
    }
}

fn load_config(args: &Args) -> anyhow::Result<BatcherConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => BatcherConfig {
            frequency: Duration::from_millis(1000),
            batch_size: 2,
            concurrency: Concurrency::Unbounded,
        },
    };

    if let Some(ms) = args.frequency_ms {
        config.frequency = Duration::from_millis(ms);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.concurrency = Concurrency::Bounded(workers);
    }
    config.validate()?;
    Ok(config)
}

fn read_inputs(args: &Args) -> anyhow::Result<Vec<String>> {
    if !args.inputs.is_empty() {
        return Ok(args.inputs.clone());
    }
    let stdin = std::io::stdin();
    let lines = stdin
        .lock()
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .context("failed to read inputs from stdin")?;
    Ok(lines)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let inputs = read_inputs(&args)?;

    info!(
        "Processing {} inputs (batch size {}, frequency {:?}, {:?})",
        inputs.len(),
        config.batch_size,
        config.frequency,
        config.concurrency
    );

    let batcher = Batcher::builder(process).config(config).build()?;
    let scheduler = batcher
        .spawn()
        .context("failed to start the scheduler thread")?;

    let results = batcher.add_jobs(
        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| Job::new(i as u64 + 1, input.clone())),
    )?;

    let processed: Vec<Processed> = results.into_iter().map(|r| r.into_inner()).collect();

    batcher.shutdown();
    if scheduler.join().is_err() {
        anyhow::bail!("scheduler thread panicked");
    }
    batcher.wait_until_finished();

    let reports: Vec<Report> = inputs
        .iter()
        .zip(processed.iter())
        .enumerate()
        .map(|(i, (input, processed))| Report {
            id: i as u64 + 1,
            input,
            processed,
        })
        .collect();

    match args.output {
        OutputFormat::Text => {
            for report in &reports {
                match (&report.processed.output, &report.processed.error) {
                    (Some(output), _) => println!("{}: {}", report.id, output),
                    (None, Some(error)) => println!("{}: error: {}", report.id, error),
                    (None, None) => println!("{}:", report.id),
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "microbatch-demo",
            "--frequency-ms",
            "50",
            "--workers",
            "4",
            "a",
            "b",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.frequency, Duration::from_millis(50));
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.concurrency, Concurrency::Bounded(4));
        assert_eq!(args.inputs, vec!["a", "b"]);
        assert_eq!(args.output, OutputFormat::Text);
    }

    #[test]
    fn test_invalid_batch_size_is_rejected() {
        let args = Args::parse_from(["microbatch-demo", "--batch-size", "0", "a"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_empty_input_is_reported_in_output() {
        let processed = process("   ".into());
        assert!(processed.output.is_none());
        assert_eq!(processed.error.as_deref(), Some("empty input"));
        assert_eq!(process("abc".into()).output.as_deref(), Some("ABC"));
    }
}
