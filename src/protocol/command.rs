//! Command definitions
//!
//! Builds the word list of a command sentence.

use crate::error::{ApiError, Result};
use super::reply::Tag;

/// A command sentence to send to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Menu path such as `/interface/print`
    path: String,

    /// `=key=value` words, in insertion order
    attributes: Vec<(String, String)>,

    /// `?` query words, without the leading `?`
    queries: Vec<String>,

    /// Correlation tag
    tag: Option<Tag>,
}

impl Command {
    /// Create a command for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            attributes: Vec::new(),
            queries: Vec::new(),
            tag: None,
        }
    }

    /// Plaintext login request
    pub fn login(username: &str, password: &str) -> Self {
        Self::new("/login")
            .attribute("name", username)
            .attribute("password", password)
    }

    /// Ask the device to stop the request tagged `tag`
    pub fn cancel(tag: Tag) -> Self {
        Self::new("/cancel").attribute("tag", tag.to_string())
    }

    /// Add an `=key=value` attribute
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Add several attributes
    pub fn attributes<I, K, V>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attrs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a `?` query word, e.g. `name=ether1` or `#|`
    pub fn query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        let query = match query.strip_prefix('?') {
            Some(rest) => rest.to_string(),
            None => query,
        };
        self.queries.push(query);
        self
    }

    /// Limit the returned properties
    pub fn proplist(self, properties: &[&str]) -> Self {
        self.attribute(".proplist", properties.join(","))
    }

    /// Set the correlation tag
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub(crate) fn set_tag(&mut self, tag: Tag) {
        self.tag = Some(tag);
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Validate and render the sentence words
    pub fn to_words(&self) -> Result<Vec<String>> {
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(ApiError::InvalidCommand(format!(
                "command path must start with '/': {:?}",
                self.path
            )));
        }

        let mut words = Vec::with_capacity(1 + self.attributes.len() + self.queries.len() + 1);
        words.push(self.path.clone());

        for (key, value) in &self.attributes {
            if key.is_empty() {
                return Err(ApiError::InvalidCommand(format!(
                    "empty attribute name in {}",
                    self.path
                )));
            }
            words.push(format!("={}={}", key, value));
        }

        for query in &self.queries {
            if query.is_empty() {
                return Err(ApiError::InvalidCommand(format!(
                    "empty query in {}",
                    self.path
                )));
            }
            words.push(format!("?{}", query));
        }

        if let Some(tag) = self.tag {
            words.push(format!(".tag={}", tag));
        }

        Ok(words)
    }

    // =========================================================================
    // Command-line parsing
    // =========================================================================

    /// Parse a console-style command line
    ///
    /// ```text
    /// /ping address=10.0.0.1 count=4
    /// /interface/print where name=ether1
    /// /ip/address/add address=10.0.0.1/24 interface=ether1 comment="uplink port"
    /// ```
    ///
    /// `key=value` tokens become attributes, bare tokens become empty
    /// attributes, `?x` tokens are queries, and every `key=value` after a
    /// `where` becomes a `?key=value` query.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens = tokenize(line)?;
        let mut iter = tokens.into_iter();

        let path = iter
            .next()
            .ok_or_else(|| ApiError::InvalidCommand("empty command line".to_string()))?;
        if !path.starts_with('/') {
            return Err(ApiError::InvalidCommand(format!(
                "command path must start with '/': {:?}",
                path
            )));
        }

        let mut command = Command::new(path);
        let mut in_where = false;

        for token in iter {
            if token == "where" {
                in_where = true;
            } else if let Some(query) = token.strip_prefix('?') {
                command = command.query(query);
            } else if in_where {
                command = command.query(token);
            } else if let Some(raw) = token.strip_prefix('=') {
                let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
                command = command.attribute(key, value);
            } else if let Some(tag) = token.strip_prefix(".tag=") {
                let tag = tag
                    .parse()
                    .map_err(|_| ApiError::InvalidCommand(format!("invalid tag {:?}", tag)))?;
                command = command.with_tag(tag);
            } else {
                let (key, value) = token.split_once('=').unwrap_or((token.as_str(), ""));
                command = command.attribute(key, value);
            }
        }

        Ok(command)
    }
}

/// Split on whitespace, keeping double-quoted spans together
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if in_quotes {
        return Err(ApiError::InvalidCommand(format!(
            "unterminated quote in {:?}",
            line
        )));
    }
    if started {
        tokens.push(current);
    }

    Ok(tokens)
}
