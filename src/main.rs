use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use glossforge::{load_config, Context as EngineContext, Engine};

#[derive(Parser, Debug)]
#[command(name = "glossforge")]
#[command(about = "Layered offline translation engine", long_about = None)]
struct Args {
    /// Directory holding per-language-pair dictionaries/phrases/rules and the user/ subtree.
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Optional TOML config file (defaults to <data_dir>/glossforge.toml if present).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source language code, e.g. "en".
    #[arg(long)]
    from: String,

    /// Target language code, e.g. "ru".
    #[arg(long)]
    to: String,

    /// Text to translate.
    text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match args.config {
        Some(path) => Some(load_config(&path).with_context(|| format!("load config: {}", path.display()))?),
        None => None,
    };

    let engine = Engine::initialize(&args.data_dir, config)
        .with_context(|| format!("initialize engine at {}", args.data_dir.display()))?;

    let result = engine
        .translate(&args.text, &args.from, &args.to, None::<EngineContext>)
        .await
        .context("translate")?;

    println!("{}", result.translated_text);
    if result.has_error {
        eprintln!("warning: {}", result.error_message.unwrap_or_default());
    }
    Ok(())
}
