//! External variable sources for descriptor templating.

use std::collections::HashMap;

/// Lookup of `{{ env "NAME" }}` variables.
pub trait VariableSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl VariableSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Explicit key/value pairs, e.g. from `--var KEY=VALUE`.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    vars: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Build from `KEY=VALUE` assignments; the last assignment to a key wins.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for a in assignments {
            let (k, v) = parse_assignment(a.as_ref())?;
            out.insert(k, v);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl VariableSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Several sources searched in order; the first hit wins.
#[derive(Default)]
pub struct LayeredSource<'a> {
    layers: Vec<&'a dyn VariableSource>,
}

impl<'a> LayeredSource<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(mut self, source: &'a dyn VariableSource) -> Self {
        self.layers.push(source);
        self
    }
}

impl VariableSource for LayeredSource<'_> {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|l| l.get(key))
    }
}

/// Split `KEY=VALUE`. The key must be non-empty; the value may be empty or contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignment_splits_on_first_equals() {
        assert_eq!(
            parse_assignment("VERSION=v1.2.3").unwrap(),
            ("VERSION".to_string(), "v1.2.3".to_string())
        );
        assert_eq!(
            parse_assignment("Q=a=b").unwrap(),
            ("Q".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_assignment("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn layered_first_hit_wins() {
        let overrides = MapSource::new().with("VERSION", "2.0.0");
        let base = MapSource::new()
            .with("VERSION", "1.0.0")
            .with("OTHER", "x");
        let layered = LayeredSource::new().push(&overrides).push(&base);
        assert_eq!(layered.get("VERSION").as_deref(), Some("2.0.0"));
        assert_eq!(layered.get("OTHER").as_deref(), Some("x"));
        assert_eq!(layered.get("MISSING"), None);
    }

    #[test]
    fn from_assignments_last_wins() {
        let src = MapSource::from_assignments(["A=1", "A=2"]).unwrap();
        assert_eq!(src.get("A").as_deref(), Some("2"));
        assert!(MapSource::from_assignments(["bad"]).is_err());
    }
}
