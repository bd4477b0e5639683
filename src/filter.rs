//! # Target Filter Language
//!
//! RSQL-style filter queries that select rollout candidates, e.g.
//! `name==edge-*;attribute.region=in=(eu,us)`. Queries are parsed and
//! validated when a rollout is created and evaluated in memory against
//! targets during partitioning.
//!
//! ## Grammar
//!
//! - `;` combines comparisons with AND, `,` with OR; `;` binds tighter
//! - Comparisons: `==`, `!=`, `=in=(a,b)`, `=out=(a,b)`
//! - Fields: `id`/`controllerid`, `name`, `updatestatus`, `assignedds`,
//!   `installedds`, `attribute.<key>`
//! - Values are bare tokens or quoted strings; a trailing `*` on `==`
//!   and `!=` values is a prefix wildcard
//!
//! Matching is ASCII case-insensitive on values; attribute keys are
//! exact. `!=` and `=out=` match targets where the field is absent.

use std::fmt;

use crate::error::{UpdraftError, UpdraftResult};
use crate::models::Target;

/// A parsed, validated filter query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    query: String,
    root: FilterNode,
}

/// Target property a comparison reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    ControllerId,
    Name,
    UpdateStatus,
    AssignedDs,
    InstalledDs,
    Attribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Compare {
        field: FilterField,
        op: CompareOp,
        values: Vec<String>,
    },
}

impl TargetFilter {
    /// Parse a filter query. The full query is consumed; trailing input
    /// is an error.
    pub fn parse(query: &str) -> UpdraftResult<Self> {
        let mut parser = Parser::new(query);
        let result = parser
            .parse_or()
            .and_then(|root| parser.expect_end().map(|()| root));
        match result {
            Ok(root) => Ok(Self {
                query: query.to_string(),
                root,
            }),
            Err(reason) => Err(UpdraftError::InvalidFilter {
                query: query.to_string(),
                reason,
            }),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Evaluate the filter against one target.
    pub fn matches(&self, target: &Target) -> bool {
        self.root.matches(target)
    }
}

impl fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)
    }
}

impl FilterField {
    fn parse(selector: &str) -> Result<Self, String> {
        let lower = selector.to_ascii_lowercase();
        match lower.as_str() {
            "id" | "controllerid" => Ok(Self::ControllerId),
            "name" => Ok(Self::Name),
            "updatestatus" => Ok(Self::UpdateStatus),
            "assignedds" => Ok(Self::AssignedDs),
            "installedds" => Ok(Self::InstalledDs),
            _ => {
                if lower.starts_with("attribute.") {
                    let key = &selector["attribute.".len()..];
                    if key.is_empty() {
                        return Err("attribute field is missing a key".to_string());
                    }
                    Ok(Self::Attribute(key.to_string()))
                } else {
                    Err(format!("unknown field '{selector}'"))
                }
            }
        }
    }

    fn value_of(&self, target: &Target) -> Option<String> {
        match self {
            Self::ControllerId => Some(target.controller_id.clone()),
            Self::Name => Some(target.name.clone()),
            Self::UpdateStatus => Some(target.update_status.to_string()),
            Self::AssignedDs => target.assigned_distribution_set.map(|id| id.to_string()),
            Self::InstalledDs => target.installed_distribution_set.map(|id| id.to_string()),
            Self::Attribute(key) => target.attributes.get(key).cloned(),
        }
    }
}

impl FilterNode {
    fn matches(&self, target: &Target) -> bool {
        match self {
            Self::And(nodes) => nodes.iter().all(|n| n.matches(target)),
            Self::Or(nodes) => nodes.iter().any(|n| n.matches(target)),
            Self::Compare { field, op, values } => {
                let actual = field.value_of(target);
                match op {
                    CompareOp::Eq => match (actual.as_deref(), values.first()) {
                        (Some(actual), Some(pattern)) => value_matches(actual, pattern),
                        _ => false,
                    },
                    // An absent field is "not equal" to anything.
                    CompareOp::Ne => match (actual.as_deref(), values.first()) {
                        (Some(actual), Some(pattern)) => !value_matches(actual, pattern),
                        _ => true,
                    },
                    CompareOp::In => match actual.as_deref() {
                        Some(actual) => values.iter().any(|v| value_matches(actual, v)),
                        None => false,
                    },
                    CompareOp::Out => match actual.as_deref() {
                        Some(actual) => !values.iter().any(|v| value_matches(actual, v)),
                        None => true,
                    },
                }
            }
        }
    }
}

/// ASCII case-insensitive comparison; a trailing `*` makes the pattern a
/// prefix match.
fn value_matches(actual: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        actual
            .to_ascii_lowercase()
            .starts_with(&prefix.to_ascii_lowercase())
    } else {
        actual.eq_ignore_ascii_case(pattern)
    }
}

/// Recursive-descent parser over the query characters.
struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(query: &str) -> Self {
        Self {
            chars: query.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_or(&mut self) -> Result<FilterNode, String> {
        let mut nodes = vec![self.parse_and()?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                nodes.push(self.parse_and()?);
            } else {
                break;
            }
        }
        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(FilterNode::Or(nodes))
        }
    }

    fn parse_and(&mut self) -> Result<FilterNode, String> {
        let mut nodes = vec![self.parse_primary()?];
        loop {
            self.skip_ws();
            if self.peek() == Some(';') {
                self.pos += 1;
                nodes.push(self.parse_primary()?);
            } else {
                break;
            }
        }
        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(FilterNode::And(nodes))
        }
    }

    fn parse_primary(&mut self) -> Result<FilterNode, String> {
        self.skip_ws();
        if self.peek() == Some('(') {
            self.pos += 1;
            let node = self.parse_or()?;
            self.skip_ws();
            if self.bump() != Some(')') {
                return Err(format!("expected ')' at position {}", self.pos));
            }
            Ok(node)
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<FilterNode, String> {
        self.skip_ws();
        let at = self.pos;
        let selector = self.read_bare();
        if selector.is_empty() {
            return Err(format!("expected a field name at position {at}"));
        }
        let field = FilterField::parse(&selector)?;
        let op = self.read_operator()?;
        let values = match op {
            CompareOp::In | CompareOp::Out => self.read_value_group()?,
            CompareOp::Eq | CompareOp::Ne => vec![self.read_value()?],
        };
        Ok(FilterNode::Compare { field, op, values })
    }

    fn read_operator(&mut self) -> Result<CompareOp, String> {
        self.skip_ws();
        let at = self.pos;
        match self.bump() {
            Some('=') => match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    Ok(CompareOp::Eq)
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let word = self.read_while(|c| c.is_ascii_alphabetic());
                    if self.bump() != Some('=') {
                        return Err(format!("expected '=' to close operator '={word}'"));
                    }
                    match word.as_str() {
                        "in" => Ok(CompareOp::In),
                        "out" => Ok(CompareOp::Out),
                        _ => Err(format!("unknown operator '={word}='")),
                    }
                }
                _ => Err(format!("incomplete operator at position {at}")),
            },
            Some('!') => {
                if self.bump() == Some('=') {
                    Ok(CompareOp::Ne)
                } else {
                    Err(format!("incomplete operator at position {at}"))
                }
            }
            _ => Err(format!("expected comparison operator at position {at}")),
        }
    }

    fn read_value_group(&mut self) -> Result<Vec<String>, String> {
        self.skip_ws();
        if self.bump() != Some('(') {
            return Err(format!("expected '(' at position {}", self.pos));
        }
        let mut values = vec![self.read_value()?];
        loop {
            self.skip_ws();
            match self.bump() {
                Some(',') => values.push(self.read_value()?),
                Some(')') => return Ok(values),
                _ => return Err(format!("expected ',' or ')' at position {}", self.pos)),
            }
        }
    }

    fn read_value(&mut self) -> Result<String, String> {
        self.skip_ws();
        let at = self.pos;
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => match self.bump() {
                            Some(c) => value.push(c),
                            None => return Err(format!("unterminated quote at position {at}")),
                        },
                        Some(c) if c == quote => return Ok(value),
                        Some(c) => value.push(c),
                        None => return Err(format!("unterminated quote at position {at}")),
                    }
                }
            }
            _ => {
                let value = self.read_bare();
                if value.is_empty() {
                    Err(format!("expected a value at position {at}"))
                } else {
                    Ok(value)
                }
            }
        }
    }

    /// Read characters up to the next reserved character.
    fn read_bare(&mut self) -> String {
        self.read_while(|c| {
            !c.is_whitespace() && !matches!(c, '(' | ')' | ';' | ',' | '=' | '!' | '\'' | '"')
        })
    }

    fn read_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if keep(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn expect_end(&mut self) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(format!("unexpected '{c}' at position {}", self.pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetUpdateStatus;
    use chrono::Utc;

    fn target(controller_id: &str, attributes: &[(&str, &str)]) -> Target {
        Target {
            id: 1,
            tenant: "default".to_string(),
            controller_id: controller_id.to_string(),
            name: controller_id.to_string(),
            update_status: TargetUpdateStatus::Registered,
            assigned_distribution_set: None,
            installed_distribution_set: None,
            last_poll_at: None,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            attributes_requested: false,
            deleted: false,
            created_by: "system".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn matches(query: &str, target: &Target) -> bool {
        TargetFilter::parse(query).unwrap().matches(target)
    }

    #[test]
    fn test_parse_rejects_malformed_queries() {
        for query in [
            "",
            "name",
            "name==",
            "name=like=x",
            "bogusfield==x",
            "attribute.==x",
            "(name==x",
            "name==x)",
            "name=in=()",
            "name=in=(a,b",
            "name=='unterminated",
            "name==a extra",
        ] {
            let result = TargetFilter::parse(query);
            assert!(
                matches!(result, Err(UpdraftError::InvalidFilter { .. })),
                "query {query:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let t = target("Edge-001", &[]);
        assert!(matches("name==edge-001", &t));
        assert!(matches("controllerid==EDGE-001", &t));
        assert!(!matches("name==edge-002", &t));
        assert!(matches("name!=edge-002", &t));
    }

    #[test]
    fn test_prefix_wildcard() {
        let t = target("edge-001", &[]);
        assert!(matches("name==edge-*", &t));
        assert!(matches("name==*", &t));
        assert!(!matches("name==core-*", &t));
        assert!(!matches("name!=edge-*", &t));
    }

    #[test]
    fn test_attribute_comparisons_and_absence() {
        let t = target("edge-001", &[("region", "eu"), ("hw", "rev2")]);
        assert!(matches("attribute.region==eu", &t));
        assert!(matches("attribute.region=in=(eu,us)", &t));
        assert!(!matches("attribute.region=out=(eu,us)", &t));

        // Absent attributes satisfy negative comparisons only.
        assert!(!matches("attribute.missing==x", &t));
        assert!(matches("attribute.missing!=x", &t));
        assert!(matches("attribute.missing=out=(a,b)", &t));
        assert!(!matches("attribute.missing=in=(a,b)", &t));
    }

    #[test]
    fn test_attribute_keys_are_exact() {
        let t = target("edge-001", &[("Region", "eu")]);
        assert!(matches("attribute.Region==eu", &t));
        assert!(!matches("attribute.region==eu", &t));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // a,b;c parses as a OR (b AND c)
        let query = "name==a,name==b;updatestatus==error";
        let a = target("a", &[]);
        let mut b = target("b", &[]);
        assert!(matches(query, &a));
        assert!(!matches(query, &b));
        b.update_status = TargetUpdateStatus::Error;
        assert!(matches(query, &b));
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let query = "(name==a,name==b);updatestatus==registered";
        let a = target("a", &[]);
        let mut b = target("b", &[]);
        b.update_status = TargetUpdateStatus::Error;
        assert!(matches(query, &a));
        assert!(!matches(query, &b));
    }

    #[test]
    fn test_quoted_values() {
        let t = target("edge-001", &[("site", "Building 7, floor 2")]);
        assert!(matches("attribute.site=='Building 7, floor 2'", &t));
        assert!(matches(r#"attribute.site=="Building 7, floor 2""#, &t));

        let quoted = target("edge-001", &[("note", "it's here")]);
        assert!(matches(r#"attribute.note=='it\'s here'"#, &quoted));
    }

    #[test]
    fn test_distribution_set_fields() {
        let mut t = target("edge-001", &[]);
        assert!(!matches("assignedds==7", &t));
        assert!(matches("assignedds!=7", &t));

        t.assigned_distribution_set = Some(7);
        assert!(matches("assignedds==7", &t));
        assert!(!matches("assignedds!=7", &t));
        assert!(!matches("installedds==7", &t));
    }

    #[test]
    fn test_update_status_field() {
        let mut t = target("edge-001", &[]);
        assert!(matches("updatestatus==registered", &t));
        t.update_status = TargetUpdateStatus::InSync;
        assert!(matches("updatestatus==in_sync", &t));
        assert!(matches("updatestatus=in=(in_sync,pending)", &t));
    }
}
