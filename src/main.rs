use clap::Parser;
use jsse_legacy::conformance::{self, CHECKS, Check};
use log::LevelFilter;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "jsse-legacy",
    version,
    about = "Legacy generator and Proxy.create compatibility layers"
)]
struct Cli {
    /// Checks to run (default: all)
    checks: Vec<String>,

    /// List check names and exit
    #[arg(short, long)]
    list: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn select(names: &[String]) -> Result<Vec<&'static Check>, String> {
    if names.is_empty() {
        return Ok(CHECKS.iter().collect());
    }
    names
        .iter()
        .map(|name| conformance::find(name).ok_or_else(|| name.clone()))
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list {
        for check in CHECKS {
            println!("{:<36} {}", check.name, check.description);
        }
        return ExitCode::SUCCESS;
    }

    let selected = match select(&cli.checks) {
        Ok(s) => s,
        Err(unknown) => {
            eprintln!("unknown check: {unknown} (see --list)");
            return ExitCode::from(2);
        }
    };

    let mut failed = 0;
    for check in &selected {
        match check.run() {
            Ok(()) => println!("PASS {}", check.name),
            Err(e) => {
                failed += 1;
                println!("FAIL {}: {e}", check.name);
            }
        }
    }
    println!("{} passed, {failed} failed", selected.len() - failed);

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
