// Clippy allows
#![allow(clippy::too_many_arguments)]

//! linehash: order-preserving minimal perfect hashing over line sources
//!
//! Usage: linehash <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

use linehash::commands::{ComputeHashCommand, LookupCommand};
use linehash::config::{Encoding, DEFAULT_SEED, DEFAULT_SIGNATURE_WIDTH};
use linehash::mph::Artifact;
use linehash::parts::LocalStorage;
use linehash::HashError;

#[derive(Parser)]
#[command(name = "linehash")]
#[command(version)]
#[command(about = "Build order-preserving minimal perfect hashes over the lines of large text sources", long_about = None)]
struct Cli {
    /// Build this many sources in parallel (default: one at a time)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build hash artifacts for one or more sources
    Build {
        /// Build a signed map (<source>.smap)
        #[arg(short = 's', long)]
        signed: bool,

        /// With -s, also keep the unsigned map (<source>.map)
        #[arg(short = 'u', long)]
        unsigned: bool,

        /// Write the info record (<source>.mapinfo)
        #[arg(short = 'i', long)]
        info: bool,

        /// Signature width in bits, used with -s
        #[arg(short = 'w', long, default_value_t = DEFAULT_SIGNATURE_WIDTH, allow_negative_numbers = true)]
        width: i32,

        /// Encoding of the source lines (any WHATWG label, e.g. UTF-16LE or windows-1252)
        #[arg(short = 'e', long, default_value = "UTF-8")]
        encoding: Encoding,

        /// Fingerprint seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Use smaller I/O buffers
        #[arg(long)]
        low_memory: bool,

        /// Do not open up artifact permissions; leave them to the umask
        #[arg(long)]
        keep_permissions: bool,

        /// Source files or directories of part-* files
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Look up keys in a .map or .smap file
    Lookup {
        /// Hash artifact
        map: PathBuf,

        /// File with one key per line (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Encoding of the keys
        #[arg(short = 'e', long, default_value = "UTF-8")]
        encoding: Encoding,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            eprintln!("Error: Failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Build {
            signed,
            unsigned,
            info,
            width,
            encoding,
            seed,
            low_memory,
            keep_permissions,
            sources,
        } => run_build(
            signed,
            unsigned,
            info,
            width,
            encoding,
            seed,
            low_memory,
            keep_permissions,
            sources,
            cli.threads.is_some(),
        ),

        Commands::Lookup {
            map,
            input,
            encoding,
        } => run_lookup(map, input, encoding),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Build every source; `Ok(false)` if any of them failed.
fn run_build(
    signed: bool,
    unsigned: bool,
    info: bool,
    width: i32,
    encoding: Encoding,
    seed: u64,
    low_memory: bool,
    keep_permissions: bool,
    sources: Vec<String>,
    parallel: bool,
) -> Result<bool, HashError> {
    let cmd = ComputeHashCommand::new()
        .with_signature_width(if signed { width } else { 0 })
        .with_keep_unsigned(!signed || unsigned)
        .with_encoding(encoding)
        .with_write_info(info)
        .with_seed(seed)
        .with_low_memory(low_memory);
    cmd.validate()?;

    let storage = if keep_permissions {
        LocalStorage::new().with_permissions(None)
    } else {
        LocalStorage::new()
    };

    info!(
        signed = cmd.signs(),
        unsigned = cmd.writes_unsigned(),
        width = cmd.signature_width,
        encoding = %cmd.encoding,
        info = cmd.write_info,
        sources = sources.len(),
        "building hashes"
    );

    let build_one = |source: &str| -> bool {
        match cmd.run(&storage, source) {
            Ok(stats) => {
                info!(source, keys = stats.key_count, "done");
                true
            }
            // Already logged by the command.
            Err(_) => false,
        }
    };

    let failed = if parallel {
        sources.par_iter().filter(|s| !build_one(s.as_str())).count()
    } else {
        sources.iter().filter(|s| !build_one(s.as_str())).count()
    };

    if failed > 0 {
        error!(failed, total = sources.len(), "some sources failed");
    }
    Ok(failed == 0)
}

fn run_lookup(
    map: PathBuf,
    input: Option<PathBuf>,
    encoding: Encoding,
) -> Result<bool, HashError> {
    let artifact = Artifact::open(&map)?;
    info!(
        map = %map.display(),
        keys = artifact.size64(),
        signed = artifact.is_signed(),
        "map loaded"
    );

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let cmd = LookupCommand::new().with_encoding(encoding);

    let stats = match input {
        Some(path) if path.to_string_lossy() != "-" => {
            let name = path.display().to_string();
            let file = File::open(&path).map_err(|source| HashError::Open {
                name: name.clone(),
                source,
            })?;
            cmd.run(&artifact, &name, file, &mut handle)?
        }
        _ => cmd.run(&artifact, "stdin", io::stdin().lock(), &mut handle)?,
    };

    info!(%stats, "lookup finished");
    Ok(true)
}
