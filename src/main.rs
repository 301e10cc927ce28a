mod debug_report;

use debug_report::{LineOutcome, RunSummary};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use wordswap::host::{Document, EventLoop, Node};
use wordswap::{
    Controller, ControlSurface, Error, JsonFilePreferences, MemoryPreferences, Options, PreferenceStore,
    rewrite_verbose,
};

const LOG_ENV: &str = "WORDSWAP_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    init_logging();

    let result = match config.prefs.clone() {
        Some(path) => run(&config, JsonFilePreferences::new(path)),
        None => run(&config, MemoryPreferences::new()),
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    if let Err(err) = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init() {
        eprintln!("warning: logging disabled: {err}");
    }
}

struct CliConfig {
    input: String,
    prefs: Option<PathBuf>,
    toggle: bool,
    interval: Option<Duration>,
    color: bool,
}

/// Load every input line into its own paragraph, let the controller apply the
/// stored preference, and optionally flip it through the control surface.
fn run<P: PreferenceStore>(config: &CliConfig, prefs: P) -> Result<(), Error> {
    let started = Instant::now();
    let mut options = Options::default();
    if let Some(interval) = config.interval {
        options.throttle_interval = interval;
    }
    let grace = options.startup_grace;

    let el = EventLoop::new();
    let doc = Document::new(&el);
    let texts = load_lines(&doc, &config.input);

    let surface = ControlSurface::new(prefs);
    surface.current()?;

    let controller = Controller::new(doc.clone(), el.clone(), options);
    controller.start(surface.prefs());
    el.advance(grace);

    let toggled = if config.toggle {
        let raw = surface.toggle()?.to_json()?;
        let ack = controller.handle_message(&raw);
        el.run_until_stalled();
        Some((raw, ack))
    } else {
        None
    };

    let lines = config
        .input
        .lines()
        .zip(&texts)
        .map(|(before, node)| LineOutcome {
            before: before.to_string(),
            after: node.text().unwrap_or_default(),
            hits: rewrite_verbose(before).hits,
        })
        .collect();

    let summary = RunSummary {
        lines,
        state: controller.state(),
        stats: controller.stats(),
        toggled,
        mutations: doc.mutation_count(),
        elapsed: started.elapsed(),
    };
    debug_report::print_run(&summary, config.color);
    Ok(())
}

fn load_lines(doc: &Document, input: &str) -> Vec<Node> {
    let Some(body) = doc.body() else {
        return Vec::new();
    };
    input
        .lines()
        .map(|line| {
            let p = doc.create_element("p");
            let text = doc.create_text(line);
            p.append_child(&text);
            body.append_child(&p);
            text
        })
        .collect()
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut prefs: Option<PathBuf> = None;
    let mut toggle = false;
    let mut interval: Option<Duration> = None;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("wordswap {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--toggle" => toggle = true,
            "--prefs" => {
                let value = args.next().ok_or_else(|| "error: --prefs expects a path".to_string())?;
                prefs = Some(PathBuf::from(value));
            }
            "--interval" => {
                let value = args.next().ok_or_else(|| "error: --interval expects a value".to_string())?;
                interval = Some(parse_interval(&value)?);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                set_input(&mut input, value)?;
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    set_input(&mut input, rest)?;
                }
                break;
            }
            _ if arg.starts_with("--prefs=") => {
                prefs = Some(PathBuf::from(arg.trim_start_matches("--prefs=")));
            }
            _ if arg.starts_with("--interval=") => {
                interval = Some(parse_interval(arg.trim_start_matches("--interval="))?);
            }
            _ if arg.starts_with("--input=") => {
                set_input(&mut input, arg.trim_start_matches("--input=").to_string())?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                set_input(&mut input, rest)?;
                break;
            }
        }
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, prefs, toggle, interval, color })
}

fn set_input(slot: &mut Option<String>, value: String) -> Result<(), String> {
    if slot.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *slot = Some(value);
    Ok(())
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("error: invalid --interval '{value}' (expected milliseconds)"))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "wordswap {version}

Rewrites vocabulary terms in text, one paragraph per input line.

Usage:
  wordswap [OPTIONS] [--] <input...>
  wordswap [OPTIONS] --input <text>

Options:
  -i, --input <text>         Input text. If omitted, reads remaining args
                             or stdin when no args are provided.
  --prefs <file>             JSON preference file holding the \"enabled\" flag.
                             Default: in-memory, enabled.
  --toggle                   Flip the preference after startup and send the
                             toggle message to the controller.
  --interval <ms>            Minimum time between change-triggered passes.
                             Default: 500
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}               Log filter (falls back to RUST_LOG, then \"warn\").

Exit codes:
  0  Success.
  1  Preference file could not be read or written, or the toggle
     message could not be encoded.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_setup_tolerates_an_installed_subscriber() {
        init_logging();
        init_logging();
    }
}
