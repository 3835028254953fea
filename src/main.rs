//! fast-langdetect - command-line entry point

use anyhow::{Context, Result};
use clap::Parser;
use fast_langdetect::{LangDetectConfig, LangDetector, ModelTier};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fast-langdetect")]
#[command(about = "Detect the language of text with fastText lid.176 models", long_about = None)]
#[command(version)]
struct Cli {
    /// Texts to classify; one per line from stdin when omitted
    texts: Vec<String>,

    /// Model tier (lite, full or auto)
    #[arg(short, long)]
    model: Option<ModelTier>,

    /// Number of languages to report per text
    #[arg(short = 'k', long = "top-k", default_value_t = 1)]
    k: usize,

    /// Drop languages scored below this probability
    #[arg(long, default_value_t = 0.0)]
    threshold: f32,

    /// Directory for the downloaded full model (must exist)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Use this model file instead of the lite/full tiers
    #[arg(long)]
    custom_model: Option<PathBuf>,

    /// Lite model file to use instead of the embedded one
    #[arg(long)]
    lite_model: Option<PathBuf>,

    /// Proxy URL for the full model download
    #[arg(long)]
    proxy: Option<String>,

    /// Truncate inputs to this many characters
    #[arg(long, conflicts_with = "no_truncate")]
    max_input_length: Option<usize>,

    /// Never truncate inputs
    #[arg(long)]
    no_truncate: bool,

    /// Skip newline replacement, case folding and truncation
    #[arg(long)]
    no_normalize: bool,

    /// Skip checksum verification of the downloaded full model
    #[arg(long)]
    disable_verify: bool,

    /// Path to a TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print only the uppercase code of the top language
    #[arg(long)]
    code_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

impl Cli {
    fn detector_config(&self) -> Result<LangDetectConfig> {
        let mut builder = match &self.config {
            Some(path) => LangDetectConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
                .to_builder(),
            None => LangDetectConfig::builder(),
        };

        if let Some(tier) = self.model {
            builder = builder.model(tier);
        }
        if let Some(dir) = &self.cache_dir {
            builder = builder.cache_dir(dir);
        }
        if let Some(path) = &self.custom_model {
            builder = builder.custom_model_path(path);
        }
        if let Some(path) = &self.lite_model {
            builder = builder.lite_model_path(path);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy);
        }
        if self.no_truncate {
            builder = builder.max_input_length(None);
        } else if let Some(length) = self.max_input_length {
            builder = builder.max_input_length(Some(length));
        }
        if self.no_normalize {
            builder = builder.normalize_input(false);
        }
        if self.disable_verify {
            builder = builder.disable_verify(true);
        }

        builder.build().context("Invalid configuration")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(io::stderr)
                .init();
        }
    }

    let config = cli.detector_config()?;
    tracing::debug!(
        model = %config.model(),
        custom_model = ?config.custom_model_path(),
        max_input_length = ?config.max_input_length(),
        "Configuration loaded"
    );
    let detector = LangDetector::new(config);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.texts.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.context("Failed to read stdin")?;
            emit(&mut out, &detector, &cli, &line)?;
        }
    } else {
        for text in &cli.texts {
            emit(&mut out, &detector, &cli, text)?;
        }
    }

    out.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn emit(out: &mut impl Write, detector: &LangDetector, cli: &Cli, text: &str) -> Result<()> {
    if cli.code_only {
        let code = detector
            .detect_language(text)
            .with_context(|| format!("Detection failed for {:?}", text))?;
        writeln!(out, "{}", code)?;
    } else {
        let langs = detector
            .detect_with_threshold(text, None, cli.k, cli.threshold)
            .with_context(|| format!("Detection failed for {:?}", text))?;
        writeln!(out, "{}", serde_json::to_string(&langs)?)?;
    }
    Ok(())
}
