mod fixtures;
mod session;

use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use docfiles::{Config, RunFlags};

use session::{EXIT_FAILED, EXIT_OK, EXIT_USAGE, RunOptions, Session};

#[derive(Parser)]
#[command(name = "docfiles", version, about = "Run code blocks in documentation files as tests")]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log pipeline steps (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file [default: ./docfiles.toml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect and run code sections
    Test(TestArgs),

    /// List code sections without running them
    Collect(CollectArgs),
}

#[derive(clap::Args)]
struct TestArgs {
    /// Files or directories to collect from
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Collect code sections from documentation files
    #[arg(long)]
    docfiles: bool,

    /// Only run items whose id (path::name) contains this substring
    #[arg(short = 'k')]
    filter: Option<String>,

    /// Don't capture block output
    #[arg(short = 's', long)]
    no_capture: bool,
}

#[derive(clap::Args)]
struct CollectArgs {
    /// Files or directories to collect from
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Collect code sections from documentation files
    #[arg(long)]
    docfiles: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&PathBuf::from(".")),
    };
    let config = match config {
        Ok(config) => Rc::new(config),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(EXIT_USAGE);
        }
    };

    let exit_code = match cli.command {
        Command::Test(args) => do_test(args, config, cli.no_color),
        Command::Collect(args) => do_collect(args, config, cli.no_color),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn flags(cli_flag: bool, config: &Config) -> RunFlags {
    RunFlags {
        docfiles: cli_flag || config.docfiles,
    }
}

fn do_test(args: TestArgs, config: Rc<Config>, no_color: bool) -> i32 {
    let session = Session::new(Rc::clone(&config), flags(args.docfiles, &config));
    let collected = match session.collect(&args.paths) {
        Ok(collected) => collected,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_USAGE;
        }
    };
    let options = RunOptions {
        filter: args.filter,
        no_capture: args.no_capture,
        no_color,
    };
    let stderr = std::io::stderr();
    match session.run(collected, &options, &mut stderr.lock()) {
        Ok(summary) => summary.exit_code(),
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_FAILED
        }
    }
}

fn do_collect(args: CollectArgs, config: Rc<Config>, no_color: bool) -> i32 {
    let session = Session::new(Rc::clone(&config), flags(args.docfiles, &config));
    let collected = match session.collect(&args.paths) {
        Ok(collected) => collected,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_USAGE;
        }
    };
    for error in &collected.errors {
        session::emit_collection_error(error, no_color);
    }
    if let Err(err) = session::write_listing(&collected, &mut std::io::stdout().lock()) {
        eprintln!("error: {err}");
        return EXIT_FAILED;
    }
    if collected.errors.is_empty() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}
