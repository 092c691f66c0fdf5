//! Value store: variable name to ordered list of string values.
//!
//! One store backs each frame (the file's own variables, or a function
//! call's local copy).  Names are case-sensitive; the order of values inside
//! a list is significant, the order of names is not.

use std::collections::HashMap;

/// Prefix under which lazily computed builtin variables are cached.
pub const BUILTIN_PREFIX: &str = ".BUILTIN.";

/// A frame of list-valued variables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValueStore {
    vars: HashMap<String, Vec<String>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.vars.insert(name.into(), values);
    }

    /// The values of `name`, or `None` when it was never assigned.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.vars.get(name).map(Vec::as_slice)
    }

    /// The values of `name`; an unset variable reads as the empty list.
    pub fn values(&self, name: &str) -> &[String] {
        self.get(name).unwrap_or(&[])
    }

    /// Mutable access to the list, creating it empty if absent.
    pub fn entry(&mut self, name: &str) -> &mut Vec<String> {
        self.vars.entry(name.to_owned()).or_default()
    }

    /// Append `value` unless it is already present.
    pub fn append_unique(&mut self, name: &str, value: &str) {
        let list = self.entry(name);
        if !list.iter().any(|v| v == value) {
            list.push(value.to_owned());
        }
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    /// Returns `true` if the variable is set (even to the empty list).
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Keep only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&str) -> bool) {
        self.vars.retain(|k, _| f(k));
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.vars.iter()
    }

    /// All names in sorted order, skipping cached builtins.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .vars
            .keys()
            .map(String::as_str)
            .filter(|n| !n.starts_with(BUILTIN_PREFIX))
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for ValueStore {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
