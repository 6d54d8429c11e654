use std::collections::HashMap;
use std::env as stdenv;

/// Variable bindings seen by the interpreter.
///
/// The environment contains:
/// - `locals`: shell-local variables, visible to expansion and builtins only.
/// - `exported`: the shell's copy of the process environment. Every spawned
///   command receives exactly this table (plus its own assignments), so
///   `export` affects children without touching the real process environment.
///
/// Note: fields are public for simplicity. The methods implement the lookup
/// and promotion rules and should be preferred.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Shell-local variables.
    pub locals: HashMap<String, String>,
    /// Variables passed on to child processes.
    pub exported: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()`; no shell-local variables are set.
    pub fn new() -> Self {
        Self {
            locals: HashMap::new(),
            exported: stdenv::vars().collect(),
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the shell-local map first, falling back to the exported table.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.locals
            .get(key)
            .or_else(|| self.exported.get(key))
            .map(String::as_str)
    }

    /// Get the value of an exported (process environment) variable only.
    pub fn exported_var(&self, key: &str) -> Option<&str> {
        self.exported.get(key).map(String::as_str)
    }

    /// Assign a variable the way a bare `NAME=value` statement does.
    ///
    /// Names already present in the exported table stay exported and are updated
    /// there; everything else becomes shell-local.
    pub fn assign(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        match self.exported.get_mut(&key) {
            Some(slot) => *slot = val.into(),
            None => {
                self.locals.insert(key, val.into());
            }
        }
    }

    /// Move a variable into the exported table.
    ///
    /// With an explicit value that value is exported; otherwise the shell-local
    /// value, if any, is promoted. The shell-local binding is removed either way.
    pub fn export(&mut self, key: &str, val: Option<String>) {
        let local = self.locals.remove(key);
        if let Some(val) = val.or(local) {
            self.exported.insert(key.to_string(), val);
        }
    }

    /// Exported variables sorted by name.
    pub fn exported_sorted(&self) -> Vec<(&str, &str)> {
        let mut vars: Vec<_> = self
            .exported
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        vars.sort_unstable();
        vars
    }
}
