use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{APP_NAME, ArmorConfig, DEFAULT_REDUNDANT_SHARDS, DEFAULT_REQUIRED_SHARDS, DEFAULT_TELOMERE_LENGTH};
use crate::file::{File, OutputTarget};
use crate::types::Processing;
use crate::ui::display;
use crate::worker::Worker;

#[derive(Args, Clone, Copy)]
pub struct Framing {
    /// Data fragments per group
    #[arg(long, default_value_t = DEFAULT_REQUIRED_SHARDS)]
    required: u8,

    /// Parity fragments per group
    #[arg(long, default_value_t = DEFAULT_REDUNDANT_SHARDS)]
    redundant: u8,

    /// Marker bytes per boundary
    #[arg(long, default_value_t = DEFAULT_TELOMERE_LENGTH)]
    telomere: usize,
}

impl Framing {
    fn config(self) -> Result<ArmorConfig> {
        Ok(ArmorConfig::new(self.required, self.redundant, self.telomere)?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wrap a file in the resilient armor framing
    Armor {
        input: String,

        /// Output file or directory; file names may use {year}, {month}, {day} and {hash}
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        framing: Framing,

        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,

        /// Keep only the newest N archives matching the output template
        #[arg(long, value_name = "N")]
        leave: Option<usize>,
    },

    /// Recover the original file from an armored one
    Unarmor {
        input: String,

        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        framing: Framing,

        #[arg(short, long)]
        force: bool,

        /// Keep whatever was recovered from a damaged stream
        #[arg(long)]
        allow_partial: bool,
    },

    /// Check an armored file and report the health of every group
    Inspect {
        input: String,

        #[command(flatten)]
        framing: Framing,
    },
}

#[derive(Parser)]
#[command(name = APP_NAME, version = "26.1.0", about = "Wrap files in checksummed, erasure-coded, self-synchronising framing.")]
pub struct App {
    #[command(subcommand)]
    command: Commands,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl App {
    pub fn init() -> Result<Self> {
        let subscriber = tracing_subscriber::fmt().with_writer(std::io::stderr).with_file(true).with_line_number(true).finish();
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(Self::parse())
    }

    pub async fn execute(self) -> Result<()> {
        let progress = !self.quiet;
        match self.command {
            Commands::Armor { input, output, framing, force, leave } => Self::armor(&input, output.as_deref(), framing, force, leave, progress).await,
            Commands::Unarmor { input, output, framing, force, allow_partial } => Self::unarmor(&input, output, framing, force, allow_partial, progress).await,
            Commands::Inspect { input, framing } => Self::inspect(&input, framing, progress).await,
        }
    }

    async fn armor(input: &str, output: Option<&str>, framing: Framing, force: bool, leave: Option<usize>, progress: bool) -> Result<()> {
        let config = framing.config()?;
        let worker = Worker::new(config, progress)?;
        let input = File::new(input);
        let target = OutputTarget::resolve(output, input.path());

        let armored = worker.armor(&input, &target, force, leave).await.with_context(|| format!("armor failed: {}", input.path().display()))?;

        display::print_table(&display::encode_table(&config, &armored.report));
        display::show_success(Processing::Armor, &armored.path);
        display::show_pruned(&armored.pruned);
        Ok(())
    }

    async fn unarmor(input: &str, output: Option<String>, framing: Framing, force: bool, allow_partial: bool, progress: bool) -> Result<()> {
        let worker = Worker::new(framing.config()?, progress)?;
        let input = File::new(input);
        let output = output.map_or_else(|| input.unarmored_path(), PathBuf::from);

        let report = worker.unarmor(&input, &output, force, allow_partial).await.with_context(|| format!("unarmor failed: {}", input.path().display()))?;

        if !report.is_complete() {
            display::show_partial(&report);
        }
        display::show_success(Processing::Unarmor, &output);
        Ok(())
    }

    async fn inspect(input: &str, framing: Framing, progress: bool) -> Result<()> {
        let worker = Worker::new(framing.config()?, progress)?;
        let input = File::new(input);
        let size = input.size().await?;

        let (groups, report) = worker.inspect(&input).await.with_context(|| format!("inspect failed: {}", input.path().display()))?;

        display::print_table(&display::group_table(&groups));
        display::print_table(&display::decode_table(&report, size));
        if !report.is_complete() {
            display::show_partial(&report);
        }
        Ok(())
    }
}
