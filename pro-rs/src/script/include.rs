//! Include and feature resolution.
//!
//! | Entry point | Target frame | Notes |
//! |-------------|--------------|-------|
//! | `include(file)`         | current frame | direct merge |
//! | `include(file, prefix)` | fresh frame   | non-dot names copied back as `prefix.name` |
//! | `load(feature)`         | current frame | searched on the feature path, loaded once |
//! | `fromfile()`/`infile()` | fresh frame   | `default_pre`/`default` features first |
//!
//! Every child parse runs in the same evaluator, so user functions defined
//! by an included file stay visible to the includer.  The working directory
//! follows the file being read.

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;

use crate::host;
use crate::var::ValueStore;

use super::interp::Evaluator;

/// Variable listing every file parsed on behalf of a frame.
pub const INCLUDED_FILES: &str = "QMAKE_INTERNAL_INCLUDED_FILES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeStatus {
    Success,
    /// The feature was loaded earlier in this parse tree.
    AlreadyLoaded,
    NoExist,
    Failure,
    ParseFailure,
}

/// How an included file's variables reach the includer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeMode {
    Direct,
    Namespace(String),
}

impl Evaluator {
    pub(crate) fn include_file(&mut self, file: &str, mode: IncludeMode) -> IncludeStatus {
        let path = host::resolve(&self.cwd, &file.replace(MAIN_SEPARATOR, "/"));
        if !self.host.exists(&path) {
            return IncludeStatus::NoExist;
        }
        let shown = host::display(&path);
        debug!("{}: include {shown}", self.pos);

        let parsed = match mode {
            IncludeMode::Direct => self.read_file(&path),
            IncludeMode::Namespace(prefix) => {
                let (ok, vars) = self.in_child_frame(|ev| ev.read_file(&path));
                if ok {
                    self.merge_namespace(&prefix, &vars);
                }
                ok
            }
        };
        if !parsed {
            self.warn(format!("Failure to include file {shown}"));
            return IncludeStatus::ParseFailure;
        }
        self.frame_mut().append_unique(INCLUDED_FILES, &shown);
        IncludeStatus::Success
    }

    /// Look `name` up on the feature path (then the current directory) and
    /// read it into the current frame.
    pub(crate) fn load_feature(&mut self, name: &str) -> IncludeStatus {
        let file = if name.ends_with(".prf") {
            name.to_owned()
        } else {
            format!("{name}.prf")
        };
        let found = feature_candidates(&self.config.feature_paths, &self.cwd, &file)
            .into_iter()
            .find(|candidate| self.host.exists(candidate));
        let Some(path) = found.map(|p| host::normalize(&p)) else {
            return IncludeStatus::NoExist;
        };
        if !self.loaded_features.insert(path.clone()) {
            return IncludeStatus::AlreadyLoaded;
        }
        let shown = host::display(&path);
        debug!("{}: load {shown}", self.pos);
        if !self.read_file(&path) {
            self.warn(format!("Failure to include file {shown}"));
            return IncludeStatus::ParseFailure;
        }
        self.frame_mut().append_unique(INCLUDED_FILES, &shown);
        IncludeStatus::Success
    }

    /// Parse `path` with a fresh parser: an empty frame, the default
    /// features, and a loaded-feature set of its own.  The included-files
    /// list is merged back into the current frame.
    pub(crate) fn parse_fresh(&mut self, path: &Path) -> Option<ValueStore> {
        if !self.host.exists(path) {
            return None;
        }
        let saved_features = std::mem::take(&mut self.loaded_features);
        let (ok, vars) = self.in_child_frame(|ev| {
            if ev.load_feature("default_pre") == IncludeStatus::NoExist {
                ev.load_feature("default");
            }
            ev.read_file(path)
        });
        self.loaded_features = saved_features;

        if !ok {
            self.warn(format!("Failure to include file {}", host::display(path)));
            return None;
        }
        let shown = host::display(path);
        let included: Vec<String> = vars.values(INCLUDED_FILES).to_vec();
        let frame = self.frame_mut();
        for file in included.iter().chain(std::iter::once(&shown)) {
            frame.append_unique(INCLUDED_FILES, file);
        }
        Some(vars)
    }

    /// Run `f` with an empty frame as both the statement and the file frame.
    /// Active calls and loops are hidden from the child.
    fn in_child_frame<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, ValueStore) {
        self.frames.push(ValueStore::new());
        let index = self.frames.len() - 1;
        let saved_place = std::mem::replace(&mut self.place, index);
        let saved_file = std::mem::replace(&mut self.file_frame, index);
        let saved_calls = std::mem::take(&mut self.calls);
        let saved_loops = std::mem::take(&mut self.loops);

        let out = f(self);

        self.loops = saved_loops;
        self.calls = saved_calls;
        self.file_frame = saved_file;
        self.place = saved_place;
        self.frames.truncate(index + 1);
        let vars = self.frames.pop().unwrap_or_default();
        (out, vars)
    }

    /// Replace `prefix` and `prefix.*` in the current frame with the child's
    /// variables renamed to `prefix.name`.
    fn merge_namespace(&mut self, prefix: &str, vars: &ValueStore) {
        let dotted = format!("{prefix}.");
        let frame = self.frame_mut();
        frame.retain(|name| name != prefix && !name.starts_with(&dotted));
        for (name, values) in vars.iter().filter(|(name, _)| !name.starts_with('.')) {
            frame.set(format!("{dotted}{name}"), values.clone());
        }
    }
}

/// Where a feature file called `name` may live, in search order.
pub fn feature_candidates(paths: &[PathBuf], cwd: &Path, name: &str) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(PathBuf::as_path)
        .chain(std::iter::once(cwd))
        .filter(|dir| seen.insert(dir.to_path_buf()))
        .map(|dir| dir.join(name))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
