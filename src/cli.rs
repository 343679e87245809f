use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Images: image 0.25\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Image preloader: warm images now, prefetch what comes next
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Image paths or file:// URLs to warm right away
    #[arg(value_name = "KEY")]
    pub keys: Vec<String>,

    /// Use every image file in DIR (sorted) as the item list
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Item list file: one key per line, blank line = item without image
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Current position in the item list; prefetches the items after it
    #[arg(short = 'p', long = "position", value_name = "N")]
    pub position: Option<usize>,

    /// Max time to wait for the KEY batch (milliseconds)
    #[arg(short = 't', long = "timeout-ms", value_name = "MS", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Time to let background prefetch run before reporting (milliseconds)
    #[arg(short = 's', long = "settle-ms", value_name = "MS", default_value_t = 300)]
    pub settle_ms: u64,

    /// Exit with status 1 if any KEY failed to load
    #[arg(long = "strict")]
    pub strict: bool,

    /// Enable logging to file (default: imgwarm.log in the app directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
