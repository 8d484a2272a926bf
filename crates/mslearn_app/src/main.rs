mod commands;
mod events;
mod logging;
mod recent;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mslearn_engine::{Checkpoint, RecordFormat};

use logging::LogDestination;

#[derive(Parser, Debug)]
#[command(
    name = "mslearn",
    version,
    about = "Generate training datasets from Microsoft Learn documentation"
)]
struct Cli {
    /// Settings file, created with defaults when missing
    #[arg(long, global = true, default_value = settings::DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Where log output goes
    #[arg(long, global = true, value_enum, default_value_t = LogDestination::Terminal)]
    log: LogDestination,

    /// Log every stage transition
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, score and export a batch of URLs
    Run(RunArgs),
    /// Process one URL and write its intermediate outputs to test_outputs/
    Test {
        url: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate URLs without fetching them
    Check {
        /// URL list (.txt, .csv or .tsv)
        #[arg(long)]
        urls: Option<PathBuf>,
        url: Vec<String>,
    },
    /// Show the URL lists and categories recently used with an output directory
    Recent {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// URL list (.txt, .csv or .tsv)
    #[arg(long)]
    urls: Option<PathBuf>,

    /// Additional URLs, processed after the list
    url: Vec<String>,

    /// Output directory; defaults to the one in the settings file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dataset name used as the file prefix
    #[arg(long)]
    name: Option<String>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Also write accepted records as ChatML conversations
    #[arg(long)]
    chatml: bool,

    /// Leave rejected records out of the record file
    #[arg(long)]
    accepted_only: bool,

    /// Minimum quality score for acceptance
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum milliseconds between requests
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Retry every failed URL once after the batch
    #[arg(long)]
    retry_failed: bool,

    /// Save a progress checkpoint after this many URLs; 0 disables it
    #[arg(long, default_value_t = Checkpoint::DEFAULT_INTERVAL)]
    checkpoint_every: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Jsonl,
    Json,
}

impl From<FormatArg> for RecordFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Jsonl => RecordFormat::JsonLines,
            FormatArg::Json => RecordFormat::JsonArray,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, logging::effective_level(cli.verbose));

    match cli.command {
        Command::Run(args) => commands::run(&cli.settings, args),
        Command::Test { url, output } => commands::trial(&cli.settings, &url, output),
        Command::Check { urls, url } => commands::check(urls.as_deref(), url),
        Command::Recent { output } => commands::recent(&cli.settings, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::parse_from([
            "mslearn",
            "--log",
            "both",
            "run",
            "--urls",
            "urls.csv",
            "--format",
            "json",
            "--chatml",
            "--threshold",
            "150",
            "https://learn.microsoft.com/en-us/windows-server/dns",
        ]);
        assert_eq!(cli.log, LogDestination::Both);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.urls, Some(PathBuf::from("urls.csv")));
        assert!(matches!(args.format, Some(FormatArg::Json)));
        assert!(args.chatml);
        assert_eq!(args.threshold, Some(150.0));
        assert_eq!(args.url.len(), 1);
        assert!(!args.retry_failed);
        assert_eq!(args.checkpoint_every, 10);
    }

    #[test]
    fn test_command_takes_one_url() {
        let cli = Cli::parse_from([
            "mslearn",
            "test",
            "https://learn.microsoft.com/en-us/windows-server/dns",
            "-o",
            "out",
        ]);
        let Command::Test { url, output } = cli.command else {
            panic!("expected test");
        };
        assert_eq!(url, "https://learn.microsoft.com/en-us/windows-server/dns");
        assert_eq!(output, Some(PathBuf::from("out")));
    }
}
