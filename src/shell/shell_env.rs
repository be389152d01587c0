use anyhow::{bail, Result};
use log::debug;
use std::env;
use std::ffi::CString;

/// The `KEY=value` list handed to every exec'd program.
///
/// Starts as a copy of the shell's own environment; `export` edits this copy
/// only, so the shell process itself is never mutated.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    pub fn from_process() -> Self {
        Environment {
            vars: env::vars().collect(),
        }
    }

    /// Exact, case-sensitive key lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.vars.push((key.to_string(), value.to_string())),
        }
    }

    /// Applies an `export` argument of the form `NAME=value`.
    pub fn export(&mut self, assignment: &str) -> Result<()> {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("export: expected NAME=value, got '{}'", assignment);
        };
        if name.is_empty() {
            bail!("export: empty variable name");
        }
        debug!("export {}={}", name, value);
        self.set(name, value);
        Ok(())
    }

    /// Builds the envp array for `execve`. Entries containing an interior
    /// NUL cannot be passed to exec and are left out.
    pub fn to_envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{}={}", k, v)).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_adds_and_overwrites() {
        let mut env = Environment::default();
        env.export("FOO=bar").unwrap();
        assert_eq!(env.get("FOO"), Some("bar"));

        env.export("FOO=baz=qux").unwrap();
        assert_eq!(env.get("FOO"), Some("baz=qux"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut env = Environment::default();
        env.set("PATH", "/bin");
        assert_eq!(env.get("PATH"), Some("/bin"));
        assert_eq!(env.get("path"), None);
        assert_eq!(env.get("PAT"), None);
    }

    #[test]
    fn test_export_rejects_malformed() {
        let mut env = Environment::default();
        assert!(env.export("NOEQUALS").is_err());
        assert!(env.export("=value").is_err());
        assert_eq!(env.len(), 0);
    }

    #[test]
    fn test_envp_format() {
        let mut env = Environment::default();
        env.set("A", "1");
        env.set("B", "");
        let envp = env.to_envp();
        assert_eq!(envp[0].to_str().unwrap(), "A=1");
        assert_eq!(envp[1].to_str().unwrap(), "B=");
    }
}
