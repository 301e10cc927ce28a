use std::time::Duration;
use wordswap::{Ack, ControllerStats, RuleHit, State};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        fn wrap(&self, s: &str, code: &str) -> String {
            if self.enabled { format!("{code}{s}{RESET}") } else { s.to_string() }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            self.wrap(s.as_ref(), color)
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), BOLD)
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), DIM)
        }
    }
}

/// One input line and what the controller left in its text node.
pub struct LineOutcome {
    pub before: String,
    pub after: String,
    pub hits: Vec<RuleHit>,
}

pub struct RunSummary {
    pub lines: Vec<LineOutcome>,
    pub state: State,
    pub stats: ControllerStats,
    /// The toggle message as sent, with the controller's reply.
    pub toggled: Option<(String, Ack)>,
    pub mutations: u64,
    pub elapsed: Duration,
}

pub fn print_run(summary: &RunSummary, color: bool) {
    let palette = ansi::Palette::new(color);
    let count = summary.lines.len();
    let noun = if count == 1 { "line" } else { "lines" };
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Rewriting {count} {noun}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Controller ━━━", ansi::GRAY));
    print_controller(summary, &palette);

    println!("\n{}", palette.paint("━━━ Rules ━━━", ansi::GRAY));
    print_rules(summary, &palette);

    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));
    print_results(summary, &palette);

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    let last = summary.stats.last_pass.as_ref().map(|m| m.duration).unwrap_or_default();
    println!(
        "  Total: {}  │  Last pass: {}  │  Mutations: {}",
        palette.paint(format!("{:?}", summary.elapsed), ansi::GREEN),
        palette.paint(format!("{last:?}"), ansi::CYAN),
        palette.dim(summary.mutations.to_string()),
    );
    println!();
}

fn print_controller(summary: &RunSummary, palette: &ansi::Palette) {
    let state = match summary.state {
        State::Enabled => palette.paint("enabled", ansi::GREEN),
        State::Disabled => palette.paint("disabled", ansi::YELLOW),
    };
    println!("  {} {}", palette.paint("State:", ansi::BLUE), state);

    if let Some((raw, ack)) = &summary.toggled {
        println!(
            "  {} {} {} {}",
            palette.paint("Toggle:", ansi::BLUE),
            palette.paint(raw, ansi::CYAN),
            palette.dim("→"),
            palette.paint(ack.to_json(), ansi::GREEN)
        );
    }

    let stats = &summary.stats;
    println!(
        "  {} {}  {} {}  {} {}  {} {}",
        palette.dim("passes:"),
        palette.paint(stats.passes.to_string(), ansi::YELLOW),
        palette.dim("writes:"),
        palette.paint(stats.writes.to_string(), ansi::YELLOW),
        palette.dim("triggers:"),
        palette.paint(stats.triggers.to_string(), ansi::YELLOW),
        palette.dim("dropped:"),
        palette.paint((stats.throttled + stats.gated).to_string(), ansi::YELLOW)
    );

    if let Some(pass) = &stats.last_pass {
        println!(
            "  {} visited {}  text {}  skipped {} processed, {} opaque",
            palette.dim("last pass:"),
            pass.visited,
            pass.text_nodes,
            pass.skipped_processed,
            pass.skipped_opaque
        );
    }
}

fn print_rules(summary: &RunSummary, palette: &ansi::Palette) {
    let mut totals: Vec<(&str, usize)> = Vec::new();
    for hit in summary.lines.iter().flat_map(|l| &l.hits) {
        match totals.iter_mut().find(|(name, _)| *name == hit.rule) {
            Some((_, n)) => *n += hit.matches,
            None => totals.push((hit.rule.as_str(), hit.matches)),
        }
    }

    if totals.is_empty() {
        println!("{}", palette.dim("  No vocabulary terms found"));
        return;
    }
    for (name, matches) in totals {
        println!(
            "  {} {} {}",
            palette.paint(name, ansi::CYAN),
            palette.dim("matches:"),
            palette.paint(matches.to_string(), ansi::YELLOW)
        );
    }
}

fn print_results(summary: &RunSummary, palette: &ansi::Palette) {
    for (idx, line) in summary.lines.iter().enumerate() {
        let changed = line.before != line.after;
        let marker = if changed { palette.paint("✓", ansi::GREEN) } else { palette.dim("·") };
        let text = if changed { palette.bold(palette.paint(&line.after, ansi::GREEN)) } else { palette.dim(&line.after) };
        println!("  {} {} {}", palette.paint(format!("[{idx}]"), ansi::GRAY), marker, text);
        if changed {
            println!("      {} {}", palette.dim("was:"), palette.dim(&line.before));
        }
    }
}
