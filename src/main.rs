//! Veles CLI - inspect and extract game asset containers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use veles::prelude::*;

/// Veles - game asset container inspection tool
#[derive(Parser)]
#[command(name = "veles")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify a file's container format
    Identify {
        /// Input file
        file: PathBuf,
    },

    /// List a container's entries
    List {
        /// Input file
        file: PathBuf,

        /// Recurse into nested containers
        #[arg(short, long)]
        deep: bool,
    },

    /// Extract entries to a directory
    Extract {
        /// Input file
        file: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Only extract entries whose name contains this substring
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Decode an object or resource and print it as JSON
    Dump {
        /// Input file
        file: PathBuf,

        /// Entry to open first (for containers of containers)
        #[arg(short, long)]
        entry: Option<String>,

        /// Object path ID (Unity serialized files)
        #[arg(short, long)]
        path_id: Option<i64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Identify { file } => identify(&file),
        Commands::List { file, deep } => list(&file, deep),
        Commands::Extract {
            file,
            output,
            filter,
        } => extract(&file, &output, filter.as_deref()),
        Commands::Dump {
            file,
            entry,
            path_id,
        } => dump(&file, entry.as_deref(), path_id),
    }
}

fn open_container(path: &Path) -> Result<Container> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("mapping {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input")
        .to_string();
    Container::open(mmap.to_vec(), &name).with_context(|| format!("parsing {}", path.display()))
}

fn identify(path: &Path) -> Result<()> {
    let container = open_container(path)?;
    println!("{}: {}", path.display(), container.format);
    Ok(())
}

fn list(path: &Path, deep: bool) -> Result<()> {
    let container = open_container(path)?;
    list_container(&container, deep, 0);
    Ok(())
}

fn list_container(container: &Container, deep: bool, depth: usize) {
    let indent = "  ".repeat(depth);
    for entry in container.entries() {
        println!("{indent}{} ({} bytes)", entry.name, entry.size);
        if deep {
            if let Ok(nested) = container.open_entry(&entry.name) {
                if nested.format != ContainerFormat::Resource && nested.name != container.name {
                    list_container(&nested, deep, depth + 1);
                }
            }
        }
    }
}

fn extract(path: &Path, output: &Path, filter: Option<&str>) -> Result<()> {
    let container = open_container(path)?;
    let entries: Vec<_> = container
        .entries()
        .into_iter()
        .filter(|e| filter.map_or(true, |f| e.name.contains(f)))
        .collect();

    let bar = ProgressBar::new(entries.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .expect("static progress template"),
    );

    let mut extracted = 0usize;
    for entry in &entries {
        bar.set_message(entry.name.clone());
        let bytes = match container.entry_bytes(&entry.name) {
            Ok(bytes) => bytes,
            Err(e) => {
                bar.println(format!("skipping {}: {e}", entry.name));
                bar.inc(1);
                continue;
            }
        };
        let target = output.join(sanitize(&entry.name));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes).with_context(|| format!("writing {}", target.display()))?;
        extracted += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();
    println!("extracted {extracted}/{} entries", entries.len());
    Ok(())
}

/// Strip scheme prefixes and path escapes from an entry name.
fn sanitize(name: &str) -> PathBuf {
    let name = name.strip_prefix("res://").unwrap_or(name);
    name.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}

fn dump(path: &Path, entry: Option<&str>, path_id: Option<i64>) -> Result<()> {
    let container = open_container(path)?;
    let container = match entry {
        Some(entry) => container.open_entry(entry)?,
        None => container,
    };

    match (container.kind(), path_id) {
        (ContainerKind::UnityAsset(_), Some(id)) => match container.object_by_path_id(id)? {
            ObjectData::Parsed(value) => println!("{}", serde_json::to_string_pretty(value)?),
            ObjectData::Raw(bytes) => println!("<{} raw bytes, no type tree>", bytes.len()),
            ObjectData::Failed { message, .. } => bail!("object {id}: {message}"),
        },
        (ContainerKind::UnityAsset(asset), None) => {
            for info in asset.objects() {
                println!(
                    "path_id={} class_id={} size={}",
                    info.path_id, info.class_id, info.size
                );
            }
        }
        (ContainerKind::GodotResource(resource), _) => {
            for property in &resource.properties {
                println!(
                    "{} = {}",
                    property.name,
                    serde_json::to_string(&property.value)?
                );
            }
        }
        (ContainerKind::Fsb5(bank), _) => {
            for (i, sample) in bank.samples.iter().enumerate() {
                println!(
                    "sample {} name={:?} freq={} channels={} rate={} ({} bytes)",
                    i,
                    sample.name,
                    sample.frequency,
                    sample.channels,
                    sample.sample_rate,
                    sample.data.len()
                );
            }
        }
        _ => bail!("{} containers have nothing to dump", container.format),
    }
    Ok(())
}
