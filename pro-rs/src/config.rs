//! Evaluator options.
//!
//! | Source | Setting |
//! |--------|---------|
//! | `QMAKEFEATURES` env var | feature search directories (platform path list) |
//! | `<config dir>/pro/features` | per-user feature directory, appended when present |
//! | `-F<dir>` | extra feature directory (binary only) |
//! | `-D NAME=value`, `-D NAME+=value` | preset variables |
//! | `-o` | output goes to stdout; `prompt()` is refused |

use std::path::PathBuf;

use directories::ProjectDirs;
use thiserror::Error;

use crate::var::ValueStore;

// ── Public API ────────────────────────────────────────────────────────────────

/// A malformed preset argument.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("{arg}: {message}")]
pub struct ConfigError {
    pub arg: String,
    pub message: String,
}

/// How a preset combines with what is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetOp {
    Set,
    Append,
}

/// A variable assignment applied before the project file is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub op: PresetOp,
    pub values: Vec<String>,
}

impl Preset {
    /// Parse `NAME=v1 v2` or `NAME+=v`.
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        let err = |message: &str| ConfigError {
            arg: arg.to_owned(),
            message: message.to_owned(),
        };
        let (lhs, rhs) = arg.split_once('=').ok_or_else(|| err("expected NAME=value"))?;
        let (name, op) = match lhs.strip_suffix('+') {
            Some(n) => (n.trim(), PresetOp::Append),
            None => (lhs.trim(), PresetOp::Set),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(err("invalid variable name"));
        }
        Ok(Self {
            name: name.to_owned(),
            op,
            values: rhs.split_whitespace().map(str::to_owned).collect(),
        })
    }

    pub fn apply(&self, vars: &mut ValueStore) {
        let list = vars.entry(&self.name);
        if self.op == PresetOp::Set {
            list.clear();
        }
        list.extend(self.values.iter().cloned());
    }
}

/// Options shared by an evaluator and every child parse it spawns.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directories searched by `load()`, in order.
    pub feature_paths: Vec<PathBuf>,
    /// The evaluation's output target is standard output.
    pub output_to_stdout: bool,
    pub presets: Vec<Preset>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults from the environment: `QMAKEFEATURES`, then the per-user
    /// feature directory if it exists.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(list) = std::env::var_os("QMAKEFEATURES") {
            config
                .feature_paths
                .extend(std::env::split_paths(&list).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Some(dir) = user_feature_dir().filter(|d| d.is_dir()) {
            config.feature_paths.push(dir);
        }
        config
    }

    pub fn with_feature_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.feature_paths.push(dir.into());
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.presets.push(preset);
        self
    }
}

/// `<config dir>/pro/features` for the current user.
pub fn user_feature_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pro").map(|d| d.config_dir().join("features"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_set() {
        let p = Preset::parse("CONFIG=debug qt").unwrap();
        assert_eq!(p.name, "CONFIG");
        assert_eq!(p.op, PresetOp::Set);
        assert_eq!(p.values, vec!["debug", "qt"]);
    }

    #[test]
    fn preset_append() {
        let p = Preset::parse("DEFINES+=FOO").unwrap();
        assert_eq!(p.name, "DEFINES");
        assert_eq!(p.op, PresetOp::Append);
    }

    #[test]
    fn preset_empty_value_is_allowed() {
        let p = Preset::parse("X=").unwrap();
        assert!(p.values.is_empty());
    }

    #[test]
    fn preset_without_equals_is_error() {
        let e = Preset::parse("CONFIG").unwrap_err();
        assert_eq!(e.message, "expected NAME=value");
        assert_eq!(e.to_string(), "CONFIG: expected NAME=value");
    }

    #[test]
    fn preset_bad_name_is_error() {
        assert!(Preset::parse("=x").is_err());
        assert!(Preset::parse("A B=x").is_err());
    }

    #[test]
    fn preset_apply() {
        let mut vars = ValueStore::new();
        vars.set("CONFIG", vec!["qt".into()]);
        Preset::parse("CONFIG+=debug").unwrap().apply(&mut vars);
        assert_eq!(vars.values("CONFIG"), ["qt", "debug"]);
        Preset::parse("CONFIG=release").unwrap().apply(&mut vars);
        assert_eq!(vars.values("CONFIG"), ["release"]);
    }

    #[test]
    fn builder_adds_feature_paths() {
        let c = Config::new().with_feature_path("/a").with_feature_path("/b");
        assert_eq!(c.feature_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
