use log::error;
use podium::{run_queries, Registry};
use std::path::PathBuf;
use std::{env, io};

const DEFAULT_INPUT: &str = "medallists.csv";

fn input_path() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => Some(
            env::var("MEDALLISTS_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_INPUT)),
        ),
        2 => Some(PathBuf::from(&args[1])),
        _ => None,
    }
}

fn main() {
    env_logger::init();

    let file_path = match input_path() {
        Some(path) => path,
        None => {
            error!("At most one argument is supported: the medallists CSV path");
            std::process::exit(1);
        }
    };

    let mut registry = Registry::new();
    if let Err(e) = registry.ingest_path(&file_path) {
        error!("could not read {}: {}", file_path.display(), e);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    if let Err(e) = run_queries(&registry, stdin.lock(), stdout.lock()) {
        error!("query loop stopped: {}", e);
        std::process::exit(1);
    }
}
