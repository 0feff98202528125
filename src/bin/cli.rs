use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use medadh::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medadh")]
#[command(version, about = "Medication adherence escalation reports - per-market workbooks with week-over-week comparison", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail for every file and sheet
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one workbook per market for a week
    Report(ReportArgs),
    /// Print week-over-week counts per market without writing files
    Compare(CompareArgs),
    /// List the week folders under the base path
    Weeks(PathArgs),
    /// Stack every worklist in a folder into one master workbook
    Consolidate(ConsolidateArgs),
    /// Show or initialise the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args)]
struct PathArgs {
    /// Directory holding the "Week of MM.DD" folders
    #[arg(short, long, env = "MEDADH_BASE_PATH")]
    base_path: Option<PathBuf>,
}

#[derive(Args)]
struct ReportArgs {
    /// Week key, MM.DD (e.g. 04.21)
    week: String,
    #[command(flatten)]
    paths: PathArgs,
    /// Directory the workbooks are written to
    #[arg(short, long, env = "MEDADH_OUTPUT_PATH")]
    output_path: Option<PathBuf>,
    /// Skip the week-over-week sheets
    #[arg(long)]
    no_compare: bool,
    /// Skip the practice chart
    #[arg(long)]
    no_chart: bool,
    /// How input files are found
    #[arg(long, value_enum)]
    discovery: Option<DiscoveryOpt>,
    /// Output format
    #[arg(long, value_enum)]
    format: Option<FormatOpt>,
    /// Year for week arithmetic and fixed file names
    #[arg(long)]
    year: Option<i32>,
    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// Week key, MM.DD (e.g. 04.21)
    week: String,
    #[command(flatten)]
    paths: PathArgs,
    #[arg(long, value_enum)]
    discovery: Option<DiscoveryOpt>,
    #[arg(long)]
    year: Option<i32>,
}

#[derive(Args)]
struct ConsolidateArgs {
    /// Folder to scan recursively (e.g. "Week of 11.18")
    folder: PathBuf,
    /// Directory the master workbook is written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DiscoveryOpt {
    Pattern,
    Fixed,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatOpt {
    Xlsx,
    Json,
}

impl From<DiscoveryOpt> for DiscoveryMode {
    fn from(opt: DiscoveryOpt) -> Self {
        match opt {
            DiscoveryOpt::Pattern => DiscoveryMode::Pattern,
            DiscoveryOpt::Fixed => DiscoveryMode::Fixed,
        }
    }
}

impl From<FormatOpt> for ExportFormat {
    fn from(opt: FormatOpt) -> Self {
        match opt {
            FormatOpt::Xlsx => ExportFormat::Xlsx,
            FormatOpt::Json => ExportFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<MedAdhError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // init must work even when the existing file is broken
    if let Commands::Config(ConfigCommand::Init { force }) = cli.command {
        return cmd_config_init(cli.config, force);
    }

    let config = ReportConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Report(args) => cmd_report(config, args),
        Commands::Compare(args) => cmd_compare(config, args),
        Commands::Weeks(args) => cmd_weeks(config, args),
        Commands::Consolidate(args) => cmd_consolidate(config, args),
        Commands::Config(ConfigCommand::Show) => cmd_config_show(&config),
        Commands::Config(ConfigCommand::Init { force }) => cmd_config_init(cli.config, force),
    }
}

fn apply_paths(builder: ConfigBuilder, paths: &PathArgs) -> ConfigBuilder {
    match &paths.base_path {
        Some(base) => builder.base_path(base),
        None => builder,
    }
}

fn cmd_report(config: ReportConfig, args: ReportArgs) -> anyhow::Result<()> {
    // parse first so a bad key never touches the filesystem
    let week = WeekKey::parse(&args.week)?;

    let mut builder = apply_paths(ConfigBuilder::from_config(config), &args.paths);
    if let Some(output) = &args.output_path {
        builder = builder.output_path(output);
    }
    if let Some(mode) = args.discovery {
        builder = builder.discovery(mode.into());
    }
    if let Some(format) = args.format {
        builder = builder.format(format.into());
    }
    if let Some(year) = args.year {
        builder = builder.year(year);
    }
    if args.no_compare {
        builder = builder.comparison(false);
    }
    if args.no_chart {
        builder = builder.chart(false);
    }
    if args.no_progress {
        builder = builder.progress_bar(false);
    }
    let config = builder.build();

    let summary = ReportRunner::new(&config).run(week)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print_summary();
    }
    Ok(())
}

fn cmd_compare(config: ReportConfig, args: CompareArgs) -> anyhow::Result<()> {
    let week = WeekKey::parse(&args.week)?;

    let mut builder = apply_paths(ConfigBuilder::from_config(config), &args.paths);
    if let Some(mode) = args.discovery {
        builder = builder.discovery(mode.into());
    }
    if let Some(year) = args.year {
        builder = builder.year(year);
    }
    let config = builder.progress_bar(false).build();

    let comparisons = ReportRunner::new(&config).compare(week)?;
    if comparisons.is_empty() {
        println!("No escalations found for week {} or the week before", week);
        return Ok(());
    }

    println!("{:<12} {:>8} {:>8} {:>6} {:>9} {:>7}", "Market", "Current", "Previous", "New", "Resolved", "Net");
    for (market, s) in &comparisons {
        println!(
            "{:<12} {:>8} {:>8} {:>6} {:>9} {:>+7}",
            market, s.current_total, s.previous_total, s.new_count, s.resolved_count, s.net_change
        );
    }
    Ok(())
}

fn cmd_weeks(config: ReportConfig, args: PathArgs) -> anyhow::Result<()> {
    let config = apply_paths(ConfigBuilder::from_config(config), &args).build();
    let folders = list_week_folders(&config.base_path)
        .with_context(|| format!("listing {}", config.base_path.display()))?;

    if folders.is_empty() {
        println!("No week folders under {}", config.base_path.display());
    }
    for folder in folders {
        println!("{}  {}", folder.week, folder.name);
    }
    Ok(())
}

fn cmd_consolidate(config: ReportConfig, args: ConsolidateArgs) -> anyhow::Result<()> {
    let consolidator = Consolidator::new().with_widths(config.column_widths);
    let master = consolidator.consolidate(&args.folder)?;
    if master.row_count() == 0 {
        anyhow::bail!("No rows found under {}", args.folder.display());
    }

    let path = consolidator.write(&master, &args.output, chrono::Local::now().naive_local())?;
    println!("Master worklist created with {} records", master.row_count());
    println!("File saved as: {}", path.display());
    if !master.files_failed.is_empty() {
        println!("{} file(s) could not be read", master.files_failed.len());
    }
    Ok(())
}

fn cmd_config_show(config: &ReportConfig) -> anyhow::Result<()> {
    let text = toml::to_string_pretty(config).context("serializing configuration")?;
    println!("{}", text);
    Ok(())
}

fn cmd_config_init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path
        .or_else(ReportConfig::default_config_path)
        .context("no configuration directory available; pass --config")?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ReportConfig::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
