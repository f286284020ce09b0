//! Statfs command.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::OutputFormat;
use symfs_core::{SymFs, SymfsConfig};

#[derive(clap::Args, Clone)]
pub struct Args {
    /// Directory to mirror
    pub source: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn run(args: &Args, config: SymfsConfig) -> Result<()> {
    let fs = SymFs::new(&args.source, config.watch(false));
    let st = fs
        .statfs("/")
        .with_context(|| format!("statfs failed for {}", args.source.display()))?;

    match args.format {
        OutputFormat::Text => {
            println!("block size:   {}", st.bsize);
            println!("blocks:       {}", st.blocks);
            println!("free:         {}", st.bfree);
            println!("available:    {}", st.bavail);
            println!("name max:     {}", st.namemax);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "bsize": st.bsize,
                "frsize": st.frsize,
                "blocks": st.blocks,
                "bfree": st.bfree,
                "bavail": st.bavail,
                "namemax": st.namemax,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
