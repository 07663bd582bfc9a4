use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use spelt_data::ContentStore;
use spelt_gitfs::Version;

/// Spelt - a git-backed blog content engine
#[derive(Parser)]
#[command(name = "spelt")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the blog repository (working or bare)
  #[arg(long, global = true, default_value = ".")]
  repo: PathBuf,

  /// Pin reads to a specific commit instead of the current HEAD
  #[arg(long, global = true)]
  at: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the commit sha HEAD resolves to
  Head,

  /// List all articles, newest first
  List,

  /// Show one article with its author and related articles
  Show { name: String },

  /// List every category used by the articles
  Categories,

  /// Show one author
  Author { name: String },

  /// Print raw template source from skin/
  Template { name: String },
}

/// Dev diagnostics via RUST_LOG, stderr, defaults to warn.
fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).compact())
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
  init_logging();
  let cli = Cli::parse();

  let store = ContentStore::open(&cli.repo)
    .with_context(|| format!("failed to open repo {}", cli.repo.display()))?;

  // Pin a version up front so every read in this invocation shares
  // dedup keys and cache entries.
  let version = match &cli.at {
    Some(sha) => Version::commit(sha.clone()),
    None => store
      .resolve_head()
      .await
      .context("failed to resolve HEAD")?,
  };

  match cli.command {
    Commands::Head => {
      // --at pins the reads, but head still reports the actual HEAD
      let head = match &cli.at {
        Some(_) => store.resolve_head().await.context("failed to resolve HEAD")?,
        None => version.clone(),
      };
      println!("{head}");
    }
    Commands::List => {
      let articles = store
        .list_articles(&version)
        .await
        .context("failed to list articles")?;
      println!("{}", serde_json::to_string_pretty(&articles)?);
    }
    Commands::Show { name } => {
      let article = store
        .full_article(&version, &name)
        .await
        .with_context(|| format!("failed to load article '{name}'"))?;
      println!("{}", serde_json::to_string_pretty(&article)?);
    }
    Commands::Categories => {
      let categories = store
        .categories(&version)
        .await
        .context("failed to list categories")?;
      println!("{}", serde_json::to_string_pretty(&categories)?);
    }
    Commands::Author { name } => {
      let author = store
        .load_author(&version, &name)
        .await
        .with_context(|| format!("failed to load author '{name}'"))?;
      println!("{}", serde_json::to_string_pretty(&author)?);
    }
    Commands::Template { name } => {
      let source = store
        .template_source(&version, &name)
        .await
        .with_context(|| format!("failed to load template '{name}'"))?;
      print!("{source}");
    }
  }

  Ok(())
}
