//! Glob patterns for entity names
//!
//! Site and dataset filters accept flat shell-style globs: `*` matches any
//! run of characters, `?` a single character. Everything else is literal.
//! A name passes an include/exclude filter if it matches at least one
//! include pattern and no exclude pattern.

use crate::error::{Result, StoreError};
use regex::Regex;
use std::fmt;

/// A compiled name glob.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a glob into an anchored matcher.
    pub fn new(glob: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(glob.len() + 2);
        pattern.push('^');
        for ch in glob.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                _ => pattern.push_str(&regex::escape(&ch.to_string())),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| StoreError::InvalidName(format!("bad glob '{}': {}", glob, e)))?;

        Ok(NamePattern {
            source: glob.to_string(),
            regex,
        })
    }

    /// Compile a list of globs.
    pub fn compile_all(globs: &[&str]) -> Result<Vec<NamePattern>> {
        globs.iter().map(|g| NamePattern::new(g)).collect()
    }

    /// The glob this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Include/exclude filter over names.
///
/// An empty include list matches nothing; pass `["*"]` for "everything".
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    include: Vec<NamePattern>,
    exclude: Vec<NamePattern>,
}

impl NameFilter {
    pub fn new(include: Vec<NamePattern>, exclude: Vec<NamePattern>) -> Self {
        NameFilter { include, exclude }
    }

    /// Filter matching every name.
    pub fn all() -> Self {
        NameFilter {
            include: vec![NamePattern::new("*").expect("literal glob")],
            exclude: Vec::new(),
        }
    }

    /// Filter from glob strings.
    pub fn from_globs(include: &[&str], exclude: &[&str]) -> Result<Self> {
        Ok(NameFilter {
            include: NamePattern::compile_all(include)?,
            exclude: NamePattern::compile_all(exclude)?,
        })
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.include.iter().any(|p| p.matches(name))
            && !self.exclude.iter().any(|p| p.matches(name))
    }

    pub fn include_patterns(&self) -> &[NamePattern] {
        &self.include
    }

    pub fn exclude_patterns(&self) -> &[NamePattern] {
        &self.exclude
    }
}
