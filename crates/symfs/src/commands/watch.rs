//! Watch command: run the change watcher and print every invalidation.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::OutputFormat;
use symfs_core::{NotifyError, NotifyFlags, NotifyHost, SymFs, SymfsConfig};

#[derive(clap::Args, Clone)]
pub struct Args {
    /// Directory to mirror
    pub source: PathBuf,

    /// Size of the native change buffer in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Host that prints notifications instead of invalidating a kernel cache.
struct PrintingHost {
    format: OutputFormat,
}

impl NotifyHost for PrintingHost {
    fn notify(&self, path: &str, flags: NotifyFlags) -> Result<(), NotifyError> {
        let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
        let line = match self.format {
            OutputFormat::Text => format!("{path}\t{}", names.join("|")),
            OutputFormat::Json => serde_json::json!({
                "path": path,
                "flags": flags.bits(),
                "kinds": names,
            })
            .to_string(),
        };

        // a closed stdout means nobody is listening any more
        writeln!(io::stdout().lock(), "{line}").map_err(|e| NotifyError {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[instrument(level = "info", name = "cmd::watch", skip_all)]
pub fn run(args: &Args, mut config: SymfsConfig) -> Result<()> {
    if let Some(size) = args.buffer_size {
        config = config.watch_buffer_size(size);
    }
    let source = args
        .source
        .canonicalize()
        .with_context(|| format!("cannot access {}", args.source.display()))?;

    let fs = SymFs::new(&source, config);
    fs.start_watcher(Arc::new(PrintingHost {
        format: args.format,
    }))
    .with_context(|| format!("failed to watch {}", source.display()))?;
    info!(root = %source.display(), "Watching for changes");

    while fs.watcher_running() {
        std::thread::sleep(Duration::from_millis(200));
    }
    fs.destroy();
    anyhow::bail!("change watcher stopped")
}
