use std::env;
use std::io;
use std::process::ExitCode;

use guide::{build_api_key, ChatSession, HttpCompletionBackend, SettingsStore};
use guide_cli::{parse_args, run_repl, usage_text, ParsedArgs};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let options = match parse_args(&args)? {
        ParsedArgs::Help => {
            println!("{}", usage_text());
            return Ok(());
        }
        ParsedArgs::Chat(options) => options,
    };

    let store = SettingsStore::new(options.settings_path());
    debug!(settings = %store.path().display(), "guide_cli_started");
    let mut session = ChatSession::new(Some(store), build_api_key());
    options.apply_to(&mut session);

    let backend = HttpCompletionBackend::new().map_err(|error| error.to_string())?;
    let stdin = io::stdin();
    run_repl(&mut session, &backend, stdin.lock(), &mut io::stdout())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}
