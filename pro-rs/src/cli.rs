//! Command-line argument parsing.
//!
//! Usage:
//!   pro [-d] [-o] [-F<dir>]... [-D NAME=value]... [-t <test>]... [-x <expr>]... [-v <var>]... <file|->

use std::path::PathBuf;

use crate::config::{Config, Preset};

pub const USAGE: &str =
    "Usage: pro [-d] [-o] [-F<dir>]... [-D NAME=value]... [-t <test>]... [-x <expr>]... [-v <var>]... <file|->";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Output goes to stdout (`-o`); `prompt()` is refused.
    pub stdout: bool,
    /// Extra feature directories (`-F<dir>`).
    pub feature_dirs: Vec<PathBuf>,
    /// Preset variables (`-D NAME=value`).
    pub presets: Vec<Preset>,
    /// What to print once the file has been read.
    pub queries: Vec<Query>,
    /// Project file, or `-` for standard input.
    pub file: PathBuf,
}

/// One post-evaluation query, answered in command-line order.
#[derive(Debug, PartialEq, Eq)]
pub enum Query {
    /// `-t <test>`: print `true` or `false`.
    Test(String),
    /// `-x <expr>`: print the expansion, one value per line.
    Expand(String),
    /// `-v <var>`: print `NAME = v1 v2`.
    Var(String),
}

impl CliArgs {
    /// Evaluator configuration: environment defaults, then the flags.
    pub fn config(&self) -> Config {
        let mut config = Config::from_env();
        config.feature_paths.extend(self.feature_dirs.iter().cloned());
        config.presets.extend(self.presets.iter().cloned());
        config.output_to_stdout = self.stdout;
        config
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        // Non-flag argument; `-` alone names standard input.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'o' => args.stdout = true,

                // Options taking a value: embedded (`-Fdir`) or separate (`-F dir`).
                flag @ ('F' | 'D' | 't' | 'x' | 'v') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    match flag {
                        'F' => args.feature_dirs.push(PathBuf::from(value)),
                        'D' => args.presets.push(Preset::parse(&value).map_err(|e| e.to_string())?),
                        't' => args.queries.push(Query::Test(value)),
                        'x' => args.queries.push(Query::Expand(value)),
                        _ => args.queries.push(Query::Var(value)),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => return Err("no project file given".to_owned()),
        1 => args.file = PathBuf::from(positional.remove(0)),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
