use std::collections::HashSet;
use std::fmt;

use regex_lite::Regex;
use serde::Deserialize;

/// One allow/deny rule over user, group and catalog patterns.
///
/// Patterns must match the whole value. An unset pattern matches anything.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct CatalogAccessControlRule {
    allow: bool,
    user: Option<Pattern>,
    group: Option<Pattern>,
    catalog: Option<Pattern>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    allow: bool,
    user: Option<String>,
    group: Option<String>,
    catalog: Option<String>,
}

#[derive(Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn compile(source: &str) -> Result<Self, regex_lite::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl TryFrom<RawRule> for CatalogAccessControlRule {
    type Error = regex_lite::Error;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        Self::new(
            raw.allow,
            raw.user.as_deref(),
            raw.group.as_deref(),
            raw.catalog.as_deref(),
        )
    }
}

impl CatalogAccessControlRule {
    pub fn new(
        allow: bool,
        user: Option<&str>,
        group: Option<&str>,
        catalog: Option<&str>,
    ) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            allow,
            user: user.map(Pattern::compile).transpose()?,
            group: group.map(Pattern::compile).transpose()?,
            catalog: catalog.map(Pattern::compile).transpose()?,
        })
    }

    pub fn allow(&self) -> bool {
        self.allow
    }

    /// The rule's decision if every set pattern matches, otherwise `None`.
    ///
    /// A missing catalog is matched as the empty string.
    pub fn matches(
        &self,
        user: &str,
        groups: &HashSet<String>,
        catalog: Option<&str>,
    ) -> Option<bool> {
        let user_matches = self
            .user
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(user));
        let group_matches = self.group.as_ref().map_or(true, |pattern| {
            groups.iter().any(|group| pattern.is_match(group))
        });
        let catalog_matches = self
            .catalog
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(catalog.unwrap_or("")));

        (user_matches && group_matches && catalog_matches).then_some(self.allow)
    }
}

/// Decision of the first matching rule, if any.
pub fn evaluate_rules(
    rules: &[CatalogAccessControlRule],
    user: &str,
    groups: &HashSet<String>,
    catalog: Option<&str>,
) -> Option<bool> {
    rules
        .iter()
        .find_map(|rule| rule.matches(user, groups, catalog))
}
