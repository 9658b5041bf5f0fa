//! Title parsing - turns an external identifier into identity bindings
//!
//! A kind declares an ordered list of [`TitlePattern`]s. Each pattern is a
//! regular expression that must match the whole title, plus one binding per
//! capture group: capture group *n* feeds the *n*-th binding through its
//! extractor. Patterns are tried in declaration order and the first match
//! wins. When nothing matches, the whole title is bound to the primary
//! identity attribute.
//!
//! ```
//! use declarative::title::{TitleParser, TitlePattern, verbatim};
//!
//! let parser = TitleParser::new(
//!     "name",
//!     vec![TitlePattern::new(
//!         r"(([\w\-]+)::(default))",
//!         &[("name", verbatim), ("vpc", verbatim), ("group_name", verbatim)],
//!     )
//!     .unwrap()],
//! );
//!
//! let identity = parser.parse("ec2_securitygroup", "prod::default").unwrap();
//! assert_eq!(identity.get("vpc"), Some("prod"));
//! ```

use crate::error::{Error, Result};
use crate::types::Identity;
use regex::Regex;

/// Turns one captured group into an attribute value
pub type Extractor = fn(&str) -> String;

/// Extractor that keeps the capture unchanged
pub fn verbatim(capture: &str) -> String {
    capture.to_string()
}

/// One title rule: a full-string pattern and its attribute bindings
#[derive(Debug, Clone)]
pub struct TitlePattern {
    regex: Regex,
    bindings: Vec<(String, Extractor)>,
}

impl TitlePattern {
    /// Compile a pattern. The pattern is anchored on both ends.
    pub fn new(pattern: &str, bindings: &[(&str, Extractor)]) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            regex,
            bindings: bindings
                .iter()
                .map(|(attribute, extractor)| ((*attribute).to_string(), *extractor))
                .collect(),
        })
    }

    /// Attributes this pattern binds, in capture order
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(attribute, _)| attribute.as_str())
    }

    /// Bindings for `title`, or `None` if the pattern does not match.
    fn bind(&self, title: &str) -> Option<Identity> {
        let captures = self.regex.captures(title)?;
        let mut identity = Identity::new();
        for (index, (attribute, extractor)) in self.bindings.iter().enumerate() {
            if let Some(capture) = captures.get(index + 1) {
                identity.insert(attribute.clone(), extractor(capture.as_str()));
            }
        }
        Some(identity)
    }
}

/// Ordered list of title rules for one kind
#[derive(Debug, Clone)]
pub struct TitleParser {
    primary: String,
    patterns: Vec<TitlePattern>,
}

impl TitleParser {
    /// Create a parser. `primary` receives the whole title when no pattern matches.
    pub fn new(primary: impl Into<String>, patterns: Vec<TitlePattern>) -> Self {
        Self {
            primary: primary.into(),
            patterns,
        }
    }

    /// Parser with only the catch-all rule
    pub fn catch_all(primary: impl Into<String>) -> Self {
        Self::new(primary, Vec::new())
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn patterns(&self) -> &[TitlePattern] {
        &self.patterns
    }

    /// Parse a title into identity bindings. First matching pattern wins.
    pub fn parse(&self, kind: &str, title: &str) -> Result<Identity> {
        if title.is_empty() {
            return Err(Error::Parse {
                kind: kind.to_string(),
                title: title.to_string(),
            });
        }

        let identity = self
            .patterns
            .iter()
            .find_map(|pattern| pattern.bind(title))
            .unwrap_or_else(|| Identity::new().with(&self.primary, title));

        log::trace!("{kind}: title '{title}' parsed to {identity}");
        Ok(identity)
    }
}
