pub mod ls;
pub mod statfs;
pub mod watch;

use clap::ValueEnum;

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
