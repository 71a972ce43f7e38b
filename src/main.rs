//! Best-path decoder demo.
//!
//! Without arguments, runs a built-in self-test on a tiny batch and prints
//! the expected and decoded text. Given a JSON score file, decodes every
//! element in it and prints one line of text per element.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ctc_bestpath::{ctc_best_path, Alphabet, BatchDecoder, DecoderConfig, ScoreTensor, Strategy};

#[derive(Parser, Debug)]
#[command(name = "bestpath-demo", version, about = "Batched CTC best-path decoding")]
struct Cli {
    /// JSON score file (element -> timestep -> class scores, blank last)
    #[arg(value_name = "SCORES")]
    scores: Option<PathBuf>,

    /// Alphabet characters, in class order
    #[arg(short, long, conflicts_with = "alphabet_file")]
    alphabet: Option<String>,

    /// File holding the alphabet on one line
    #[arg(long, value_name = "FILE")]
    alphabet_file: Option<PathBuf>,

    /// Decoder configuration file (.toml or .yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Execution strategy: fused or two-phase
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// CPU worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run kernels serially and trace every dispatch
    #[arg(long)]
    debug_dispatch: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// Score file contents.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreFile {
    Bare(Vec<Vec<Vec<f32>>>),
    Annotated {
        alphabet: Option<String>,
        batch: Vec<Vec<Vec<f32>>>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.scores.as_deref() {
        Some(path) => decode_file(&cli, path),
        None => self_test(&cli),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Decode one element whose two timesteps both favour the blank.
fn self_test(cli: &Cli) -> Result<()> {
    let batch = vec![vec![vec![0.4, 0.0, 0.6], vec![0.4, 0.0, 0.6]]];
    let (scores, shape) = flatten_batch(&batch)?;
    let alphabet = Alphabet::new("ab")?;
    let expected = "";

    let config = apply_overrides(cli, DecoderConfig::new(1, shape[2], alphabet.len()));
    let mut decoder = BatchDecoder::new(config)?;
    let tensor = ScoreTensor::new(&scores, shape)?;
    let actual = ctc_best_path(&tensor, &alphabet, &mut decoder)?;
    let actual = actual.first().map(String::as_str).unwrap_or_default();

    println!("Expected: {:?}", expected);
    println!("Actual:   {:?}", actual);
    if actual != expected {
        println!("FAILED");
        bail!("self-test decoded {:?}, expected {:?}", actual, expected);
    }
    println!("OK");
    Ok(())
}

fn decode_file(cli: &Cli, path: &Path) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading score file {:?}", path))?;
    let (batch, file_alphabet) = match serde_json::from_str(&content)
        .with_context(|| format!("parsing score file {:?}", path))?
    {
        ScoreFile::Bare(batch) => (batch, None),
        ScoreFile::Annotated { alphabet, batch } => (batch, alphabet),
    };

    let alphabet = match (&cli.alphabet_file, &cli.alphabet, file_alphabet) {
        (Some(file), _, _) => Alphabet::load_from_file(file)?,
        (None, Some(chars), _) => Alphabet::new(chars)?,
        (None, None, Some(chars)) => Alphabet::new(&chars)?,
        (None, None, None) => bail!("no alphabet given; use --alphabet or --alphabet-file"),
    };

    let (scores, shape) = flatten_batch(&batch)?;
    if shape[1] != alphabet.len() + 1 {
        bail!(
            "score file has {} classes per timestep, alphabet needs {} (blank last)",
            shape[1],
            alphabet.len() + 1
        );
    }

    let base = match &cli.config {
        Some(file) => DecoderConfig::load_from_file(file)?,
        None => DecoderConfig::load()?,
    };
    let config = DecoderConfig {
        batch_size: shape[0],
        max_t: shape[2],
        max_c: alphabet.len(),
        ..apply_overrides(cli, base)
    };
    info!(
        "Decoding {} elements of {} timesteps with {} strategy",
        shape[0], shape[2], config.strategy
    );

    let mut decoder = BatchDecoder::new(config)?;
    let tensor = ScoreTensor::new(&scores, shape)?;
    for text in ctc_best_path(&tensor, &alphabet, &mut decoder)? {
        println!("{}", text);
    }
    Ok(())
}

fn apply_overrides(cli: &Cli, mut config: DecoderConfig) -> DecoderConfig {
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    config.debug_dispatch |= cli.debug_dispatch;
    config
}

/// Transpose `batch[b][t][c]` into the flat `(batch, class, time)` layout.
fn flatten_batch(batch: &[Vec<Vec<f32>>]) -> Result<(Vec<f32>, [usize; 3])> {
    let steps = batch.first().map_or(0, Vec::len);
    let classes = batch
        .first()
        .and_then(|element| element.first())
        .map_or(0, Vec::len);
    if steps == 0 || classes == 0 {
        bail!("score batch must have at least one element, timestep and class");
    }

    let mut flat = vec![0.0; batch.len() * classes * steps];
    for (b, element) in batch.iter().enumerate() {
        if element.len() != steps {
            bail!("element {} has {} timesteps, expected {}", b, element.len(), steps);
        }
        for (t, column) in element.iter().enumerate() {
            if column.len() != classes {
                bail!(
                    "element {} timestep {} has {} classes, expected {}",
                    b,
                    t,
                    column.len(),
                    classes
                );
            }
            for (c, &score) in column.iter().enumerate() {
                flat[(b * classes + c) * steps + t] = score;
            }
        }
    }

    Ok((flat, [batch.len(), classes, steps]))
}
