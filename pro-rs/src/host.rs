//! Collaborators the evaluator reaches the outside world through.
//!
//! The evaluator never touches the process working directory: every path is
//! resolved against the directory held in its own context and handed to the
//! [`Host`] already absolute.

use std::io::{self, BufRead, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub success: bool,
}

/// Filesystem, process, and environment access.
pub trait Host {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Names (not paths) of the entries of `dir`, in no particular order.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<String>>;
    fn current_dir(&self) -> io::Result<PathBuf>;
    /// Run `command` through the platform shell with `cwd` as its directory.
    fn run(&self, command: &str, cwd: &Path) -> io::Result<CommandOutput>;
    fn env_var(&self, name: &str) -> Option<String>;
    /// Show `question` to the user and read one line of reply.
    fn prompt(&self, question: &str) -> Option<String>;
    fn read_stdin(&self) -> io::Result<String>;
}

/// The real operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsHost;

impl Host for OsHost {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read(path).map(decode)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn run(&self, command: &str, cwd: &Path) -> io::Result<CommandOutput> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        if cwd.is_dir() {
            cmd.current_dir(cwd);
        }
        let out = cmd.output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            success: out.status.success(),
        })
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn prompt(&self, question: &str) -> Option<String> {
        let mut err = io::stderr();
        write!(err, "Project PROMPT: {question} ").ok()?;
        err.flush().ok()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    fn read_stdin(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(decode(buf))
    }
}

/// File text as UTF-8, or byte-for-byte Latin-1 when it is not valid UTF-8.
pub fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Resolve `path` against `base` and normalise `.`/`..` lexically.
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    let joined = if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    };
    normalize(&joined)
}

/// Lexical normalisation; never touches the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path as a `/`-separated display string.
pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
