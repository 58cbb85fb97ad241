//! Sable CLI
//!
//! Run with: `sable [COMMAND]`

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sablec::binary::{decode_expression, encode, encode_expression};
use sablec::config::{CacheMode, DigestPolicy, ResolverConfig};
use sablec::content::{semantic_hash, SemanticCache};
use sablec::resolve::{base_dir_of, FreezeMode, FreezeScope, Resolver};
use sablec::syntax::{Expr, Import};

#[derive(Parser)]
#[command(name = "sable")]
#[command(about = "Canonical encoding, hashing and import resolution for Sable")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Semantic cache directory (default: $SABLE_CACHE or the platform cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the semantic cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// `enforce` digests or treat them as cache `hint`s
    #[arg(long, global = true)]
    digest_policy: Option<DigestPolicy>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode a binary expression in canonical form
    Encode {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the canonical term as JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Show a binary expression
    Decode {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Print JSON instead of diagnostic notation
        #[arg(long)]
        json: bool,

        /// Print the decoded expression tree
        #[arg(long)]
        tree: bool,
    },

    /// Print the semantic hash of an expression after resolving its imports
    Hash {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Print `sha256:<hex>` instead of the multihash
        #[arg(long)]
        prefixed: bool,
    },

    /// Resolve all imports
    Resolve {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Write the canonical encoding of the result here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the imports an expression depends on
    Deps {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Graphviz output
        #[arg(long, conflicts_with = "json")]
        dot: bool,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Pin imports to their semantic hashes
    Freeze {
        /// Input file
        input: PathBuf,

        /// Freeze local and environment imports too
        #[arg(long)]
        all: bool,

        /// Keep an unpinned fallback (`i sha256:... ? i`)
        #[arg(long)]
        cache: bool,

        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the semantic cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache directory
    Path,
    /// Remove every entry
    Clear,
    /// Show entry count and size
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Encode { input, output, json } => cmd_encode(input, output.as_deref(), *json),
        Commands::Decode { input, json, tree } => cmd_decode(input, *json, *tree),
        Commands::Hash { input, prefixed } => cmd_hash(&cli, input, *prefixed),
        Commands::Resolve { input, output } => cmd_resolve(&cli, input, output.as_deref()),
        Commands::Deps { input, dot, json } => cmd_deps(&cli, input, *dot, *json),
        Commands::Freeze {
            input,
            all,
            cache,
            output,
        } => cmd_freeze(&cli, input, *all, *cache, output.as_deref()),
        Commands::Cache { action } => cmd_cache(&cli, action),
    }
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    if input == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
        return Ok(bytes);
    }
    std::fs::read(input).with_context(|| format!("Failed to read file: {}", input.display()))
}

fn load_expr(input: &Path) -> Result<Expr<Import>> {
    let bytes = read_input(input)?;
    decode_expression(&bytes).with_context(|| format!("Failed to decode {}", input.display()))
}

fn write_output(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write file: {}", path.display())),
        None => std::io::stdout()
            .write_all(bytes)
            .context("Failed to write to stdout"),
    }
}

fn resolver_for(cli: &Cli, input: &Path) -> Resolver {
    let base_dir = if input == Path::new("-") {
        PathBuf::from(".")
    } else {
        base_dir_of(input)
    };
    let mut config = ResolverConfig::from_env(base_dir);
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if cli.no_cache {
        config = config.with_cache_mode(CacheMode::Ignore);
    }
    if let Some(policy) = cli.digest_policy {
        config = config.with_digest_policy(policy);
    }
    Resolver::new(config)
}

fn cmd_encode(input: &Path, output: Option<&Path>, json: bool) -> Result<()> {
    let expr = load_expr(input)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&encode(&expr).to_json())?);
        return Ok(());
    }
    write_output(output, &encode_expression(&expr))
}

fn cmd_decode(input: &Path, json: bool, tree: bool) -> Result<()> {
    let expr = load_expr(input)?;
    if tree {
        println!("{:#?}", expr);
    } else if json {
        println!("{}", serde_json::to_string_pretty(&encode(&expr).to_json())?);
    } else {
        println!("{}", encode(&expr));
    }
    Ok(())
}

fn cmd_hash(cli: &Cli, input: &Path, prefixed: bool) -> Result<()> {
    let expr = load_expr(input)?;
    let resolution = resolver_for(cli, input)
        .resolve(expr)
        .with_context(|| format!("Failed to resolve {}", input.display()))?;
    let digest = semantic_hash(&resolution.expr);
    if prefixed {
        println!("{}", digest);
    } else {
        println!("{}", digest.to_multihash_hex());
    }
    Ok(())
}

fn cmd_resolve(cli: &Cli, input: &Path, output: Option<&Path>) -> Result<()> {
    let expr = load_expr(input)?;
    let resolution = resolver_for(cli, input)
        .resolve(expr)
        .with_context(|| format!("Failed to resolve {}", input.display()))?;

    for warning in &resolution.warnings {
        eprintln!("warning: {}", warning);
    }
    info!(
        "Resolved {} imports ({} edges)",
        resolution.imports.len(),
        resolution.graph.len()
    );

    match output {
        Some(path) => write_output(Some(path), &encode_expression(&resolution.expr)),
        None => {
            println!("{}", encode(&resolution.expr));
            Ok(())
        }
    }
}

fn cmd_deps(cli: &Cli, input: &Path, dot: bool, json: bool) -> Result<()> {
    let expr = load_expr(input)?;
    let graph = resolver_for(cli, input)
        .load_graph(expr)
        .with_context(|| format!("Failed to load imports of {}", input.display()))?;

    if dot {
        print!("{}", graph.to_dot());
    } else if json {
        println!("{}", graph.to_json()?);
    } else {
        for edge in graph.edges() {
            println!("{} -> {}", edge.from, edge.to);
        }
    }
    Ok(())
}

fn cmd_freeze(cli: &Cli, input: &Path, all: bool, cache: bool, output: Option<&Path>) -> Result<()> {
    if input == Path::new("-") && output.is_none() {
        bail!("freezing stdin requires --output");
    }
    let expr = load_expr(input)?;
    let mode = if cache { FreezeMode::Cache } else { FreezeMode::Secure };
    let scope = if all { FreezeScope::All } else { FreezeScope::RemoteOnly };

    let frozen = resolver_for(cli, input)
        .freeze(expr, mode, scope)
        .with_context(|| format!("Failed to freeze {}", input.display()))?;

    let target = output.unwrap_or(input);
    info!("Writing frozen expression to {}", target.display());
    write_output(Some(target), &encode_expression(&frozen))
}

fn cmd_cache(cli: &Cli, action: &CacheAction) -> Result<()> {
    let dir = cli.cache_dir.clone().unwrap_or_else(sablec::config::cache_dir);
    let cache = SemanticCache::with_dir(&dir);

    match action {
        CacheAction::Path => println!("{}", dir.display()),
        CacheAction::Clear => {
            let removed = cache.clear().context("Failed to clear cache")?;
            println!("Removed {} entries from {}", removed, dir.display());
        }
        CacheAction::Stats => {
            let stats = cache.stats().context("Failed to read cache")?;
            println!("Entries: {}", stats.entries);
            println!("Size: {} bytes", stats.size);
        }
    }
    Ok(())
}
