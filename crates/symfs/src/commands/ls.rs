//! Ls command: list a virtual directory through the passthrough surface.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use super::OutputFormat;
use symfs_core::{FileKind, SymFs, SymfsConfig};

#[derive(clap::Args, Clone)]
pub struct Args {
    /// Directory to mirror
    pub source: PathBuf,

    /// Virtual directory to list
    #[arg(default_value = "/")]
    pub path: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn run(args: &Args, config: SymfsConfig) -> Result<()> {
    let fs = SymFs::new(&args.source, config.watch(false));
    fs.opendir(&args.path)
        .with_context(|| format!("cannot open directory {}", args.path))?;

    let mut names = Vec::new();
    fs.readdir(&args.path, |name| {
        if name != "." && name != ".." {
            names.push(name.to_string());
        }
        true
    })
    .with_context(|| format!("cannot list {}", args.path))?;
    names.sort();

    let base = args.path.trim_end_matches('/');
    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let virtual_path = format!("{base}/{name}");
        let stat = fs
            .getattr(&virtual_path)
            .with_context(|| format!("getattr failed for {virtual_path}"))?;
        rows.push((name, stat));
    }

    match args.format {
        OutputFormat::Text => {
            for (name, stat) in &rows {
                let kind = match stat.kind {
                    FileKind::Directory => 'd',
                    FileKind::Symlink => 'l',
                    FileKind::RegularFile => '-',
                };
                println!("{kind}{:04o} {:>12} {name}", stat.perm(), stat.size);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = rows
                .iter()
                .map(|(name, stat)| {
                    let mtime = stat
                        .mtime
                        .duration_since(UNIX_EPOCH)
                        .map_or(0, |d| d.as_secs());
                    serde_json::json!({
                        "name": name,
                        "mode": stat.mode,
                        "size": stat.size,
                        "mtime": mtime,
                        "dir": stat.is_dir(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}
