use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the tracking test matrix
    Bulk(BulkArgs),
    /// Regenerate CSV, JSONL and summary from saved runs
    Report(ReportArgs),
}

#[derive(ClapArgs, Debug, Clone)]
#[command(group(
    clap::ArgGroup::new("preset")
        .required(true)
        .args(["quick", "full"]),
))]
pub struct BulkArgs {
    /// Run the quick validation matrix
    #[arg(long)]
    pub quick: bool,

    /// Run the full test matrix
    #[arg(long)]
    pub full: bool,

    /// Randomly sample this many configs from the generated matrix
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Random seed for sampling
    #[arg(long, default_value_t = 42)]
    pub random_seed: u64,

    /// Thread count handed to each tracker process
    #[arg(long)]
    pub threads: Option<usize>,

    /// Number of parallel run workers
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Directory containing test_video*.mp4/.mov
    #[arg(long, env = "TRACK_BENCH_VIDEO_ROOT", default_value = "spike")]
    pub video_root: PathBuf,

    /// Root directory for output artifacts
    #[arg(
        long,
        env = "TRACK_BENCH_OUTPUT_DIR",
        default_value = "spike/bulk_test_output"
    )]
    pub output_dir: PathBuf,

    /// Command line of the external detector/tracker. Split on whitespace;
    /// quoting is not supported, so paths must not contain spaces
    #[arg(long, env = "TRACK_BENCH_TRACKER_CMD")]
    pub tracker_cmd: String,

    /// Directory holding <tracker>.json base configs
    #[arg(long, env = "TRACK_BENCH_TRACKER_CONFIG_DIR")]
    pub tracker_config_dir: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ReportArgs {
    /// Output directory of a previous bulk run
    #[arg(
        long,
        env = "TRACK_BENCH_OUTPUT_DIR",
        default_value = "spike/bulk_test_output"
    )]
    pub output_dir: PathBuf,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
