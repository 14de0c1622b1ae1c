use std::io::{BufRead, Write};
use std::path::PathBuf;

use guide::{BubbleKind, ChatSession, CompletionBackend, SubmitOutcome, SETTINGS_FILE_NAME};

const VISITOR_PREFIX: &str = "你> ";
const GUIDE_PREFIX: &str = "导览员> ";
const PROMPT: &str = "> ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub settings_path: Option<PathBuf>,
}

impl CliOptions {
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join(SETTINGS_FILE_NAME))
    }

    /// Overrides land in the editable fields; they are not persisted
    /// unless the user runs `/save`.
    pub fn apply_to(&self, session: &mut ChatSession) {
        if let Some(base_url) = &self.base_url {
            session.set_base_url(base_url);
        }
        if let Some(model) = &self.model {
            session.set_model(model);
        }
        if let Some(api_key) = &self.api_key {
            session.set_api_key(api_key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    Help,
    Chat(CliOptions),
}

pub fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut options = CliOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        let flag = args[index].as_str();
        if flag == "-h" || flag == "--help" {
            return Ok(ParsedArgs::Help);
        }
        let value = || {
            args.get(index + 1)
                .cloned()
                .ok_or_else(|| format!("missing value for {flag}"))
        };
        match flag {
            "--base-url" => options.base_url = Some(value()?),
            "--model" => options.model = Some(value()?),
            "--api-key" => options.api_key = Some(value()?),
            "--settings" => options.settings_path = Some(PathBuf::from(value()?)),
            other => return Err(format!("unknown argument '{other}'")),
        }
        index += 2;
    }
    Ok(ParsedArgs::Chat(options))
}

pub fn usage_text() -> String {
    [
        "guide_cli - chat with the museum guide from a terminal",
        "",
        "Usage:",
        "  guide_cli [--base-url <url>] [--model <name>] [--api-key <key>] [--settings <file>]",
        "",
        "Commands inside the chat:",
        "  /url <v>  /model <v>  /key <v>  set a field for this run",
        "  /save                         persist the fields",
        "  /settings                     show the current fields",
        "  /quit                         leave",
        "",
        "Defaults:",
        "  --settings data/guide_settings.json",
    ]
    .join("\n")
}

/// Reads lines until EOF or `/quit`, running each submission to completion
/// before reading the next.
pub fn run_repl<R: BufRead, W: Write>(
    session: &mut ChatSession,
    backend: &dyn CompletionBackend,
    input: R,
    output: &mut W,
) -> Result<(), String> {
    session.open();
    let mut printed = 0usize;
    printed = print_new_bubbles(session, printed, output)?;

    let mut lines = input.lines();
    loop {
        write!(output, "{PROMPT}").map_err(|error| error.to_string())?;
        output.flush().map_err(|error| error.to_string())?;

        let Some(line) = lines.next() else {
            writeln!(output).map_err(|error| error.to_string())?;
            return Ok(());
        };
        let line = line.map_err(|error| format!("failed to read input: {error}"))?;
        let trimmed = line.trim();

        if let Some(command) = trimmed.strip_prefix('/') {
            if command == "quit" {
                return Ok(());
            }
            run_command(session, command, output)?;
        } else if let SubmitOutcome::Dispatch(request) = session.submit(trimmed) {
            let result = backend.complete(&request);
            session.complete(result);
        }
        printed = print_new_bubbles(session, printed, output)?;
    }
}

fn run_command<W: Write>(session: &mut ChatSession, command: &str, output: &mut W) -> Result<(), String> {
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "url" => session.set_base_url(argument),
        "model" => session.set_model(argument),
        "key" => session.set_api_key(argument),
        "save" => session.save_settings(),
        "settings" => {
            let fields = session.fields();
            let key_state = if fields.api_key.trim().is_empty() {
                "(not set)"
            } else {
                "(set)"
            };
            writeln!(
                output,
                "url: {}\nmodel: {}\nkey: {key_state}",
                fields.effective_base_url(),
                fields.effective_model()
            )
            .map_err(|error| error.to_string())?;
        }
        other => {
            writeln!(output, "unknown command '/{other}'").map_err(|error| error.to_string())?;
        }
    }
    Ok(())
}

fn print_new_bubbles<W: Write>(
    session: &ChatSession,
    already_printed: usize,
    output: &mut W,
) -> Result<usize, String> {
    let bubbles = session.bubbles();
    for bubble in &bubbles[already_printed.min(bubbles.len())..] {
        let prefix = match bubble.kind {
            BubbleKind::Visitor => VISITOR_PREFIX,
            BubbleKind::Guide => GUIDE_PREFIX,
        };
        writeln!(output, "{prefix}{}", bubble.text).map_err(|error| error.to_string())?;
    }
    Ok(bubbles.len())
}
