//! Route matching logic.
//!
//! # Responsibilities
//! - Compile path patterns (`/drivers/{id:[0-9]+}`) into segment matchers
//! - Match request paths, extracting named parameters
//! - Evaluate the fixed query-parameter predicates of overlay routes
//!
//! # Design Decisions
//! - Path matching is case-sensitive and segment-exact (no prefix matching)
//! - Regex is only used for explicitly constrained parameters; compiled once
//! - Query predicates are a closed set checked without regex

use regex::Regex;

use crate::config::QueryPattern;

/// One `/`-separated piece of a path pattern.
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        constraint: Option<Regex>,
    },
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a path pattern. Returns a human readable reason on failure.
    pub fn parse(template: &str) -> Result<Self, String> {
        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| "pattern must start with '/'".to_string())?;

        let segments = rest
            .split('/')
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The pattern as written in the configuration.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let rest = path.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let mut params = Vec::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param { name, constraint } => {
                    if part.is_empty() {
                        return None;
                    }
                    if let Some(re) = constraint {
                        if !re.is_match(part) {
                            return None;
                        }
                    }
                    params.push((name.clone(), part.to_string()));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    /// Ordering key: more literal segments first, then more constrained
    /// parameters.
    pub fn specificity(&self) -> (usize, usize) {
        self.segments.iter().fold((0, 0), |(literals, constrained), s| match s {
            Segment::Literal(_) => (literals + 1, constrained),
            Segment::Param {
                constraint: Some(_),
                ..
            } => (literals, constrained + 1),
            Segment::Param { .. } => (literals, constrained),
        })
    }

    /// True when the pattern has no parameters.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Structural form with parameter names erased, used to detect
    /// collisions between `/a/{x}` and `/a/{y}`.
    pub fn shape(&self) -> String {
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(literal) => shape.push_str(literal),
                Segment::Param {
                    constraint: None, ..
                } => shape.push_str("{}"),
                Segment::Param {
                    constraint: Some(re),
                    ..
                } => {
                    shape.push_str("{:");
                    shape.push_str(re.as_str());
                    shape.push('}');
                }
            }
        }
        shape
    }
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        if raw.contains('{') || raw.contains('}') {
            return Err(format!("segment '{raw}' mixes literal text and a parameter"));
        }
        return Ok(Segment::Literal(raw.to_string()));
    };

    let (name, constraint) = match inner.split_once(':') {
        Some((name, pattern)) => {
            if pattern.is_empty() {
                return Err(format!("parameter '{name}' has an empty constraint"));
            }
            let re = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| format!("parameter '{name}': {e}"))?;
            (name, Some(re))
        }
        None => (inner, None),
    };

    if name.is_empty() {
        return Err(format!("segment '{raw}' has an empty parameter name"));
    }

    Ok(Segment::Param {
        name: name.to_string(),
        constraint,
    })
}

/// A required query parameter of an overlay route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPredicate {
    key: String,
    pattern: QueryPattern,
}

impl QueryPredicate {
    pub fn new(key: impl Into<String>, pattern: QueryPattern) -> Self {
        Self {
            key: key.into(),
            pattern,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn pattern(&self) -> QueryPattern {
        self.pattern
    }

    /// True when `value` has the shape this predicate requires.
    pub fn accepts(&self, value: &str) -> bool {
        match self.pattern {
            QueryPattern::Numeric | QueryPattern::EpochSeconds => is_digits(value),
            QueryPattern::TimeZone => is_time_zone(value),
            QueryPattern::Period => matches!(value, "day" | "week" | "month"),
        }
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_time_zone(value: &str) -> bool {
    let Some((region, city)) = value.split_once('/') else {
        return false;
    };
    !region.is_empty()
        && region.bytes().all(|b| b.is_ascii_alphabetic())
        && !city.is_empty()
        && city.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern() {
        let pattern = PathPattern::parse("/drivers").unwrap();
        assert_eq!(pattern.matches("/drivers"), Some(vec![]));
        assert!(pattern.matches("/drivers/1").is_none());
        assert!(pattern.matches("/driver").is_none());
        assert!(pattern.matches("/drivers/").is_none());
        assert!(pattern.is_literal());
    }

    #[test]
    fn constrained_parameter() {
        let pattern = PathPattern::parse("/drivers/{id:[0-9]+}").unwrap();
        assert_eq!(
            pattern.matches("/drivers/42"),
            Some(vec![("id".to_string(), "42".to_string())])
        );
        assert!(pattern.matches("/drivers/abc").is_none());
        assert!(pattern.matches("/drivers/4a").is_none());
        assert!(pattern.matches("/drivers").is_none());
        assert!(pattern.matches("/drivers/").is_none());
    }

    #[test]
    fn unconstrained_parameter() {
        let pattern = PathPattern::parse("/users/{name}/locations").unwrap();
        assert_eq!(
            pattern.matches("/users/ada/locations"),
            Some(vec![("name".to_string(), "ada".to_string())])
        );
        assert!(pattern.matches("/users//locations").is_none());
    }

    #[test]
    fn root_pattern() {
        let pattern = PathPattern::parse("/").unwrap();
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/x").is_none());
    }

    #[test]
    fn specificity_ordering() {
        let literal = PathPattern::parse("/drivers/me").unwrap();
        let constrained = PathPattern::parse("/drivers/{id:[0-9]+}").unwrap();
        let open = PathPattern::parse("/drivers/{id}").unwrap();
        assert!(literal.specificity() > constrained.specificity());
        assert!(constrained.specificity() > open.specificity());
    }

    #[test]
    fn shape_ignores_parameter_names() {
        let a = PathPattern::parse("/drivers/{id}").unwrap();
        let b = PathPattern::parse("/drivers/{driver}").unwrap();
        let c = PathPattern::parse("/drivers/{id:[0-9]+}").unwrap();
        assert_eq!(a.shape(), b.shape());
        assert_ne!(a.shape(), c.shape());
    }

    #[test]
    fn malformed_patterns() {
        assert!(PathPattern::parse("drivers").is_err());
        assert!(PathPattern::parse("/drivers/{}").is_err());
        assert!(PathPattern::parse("/drivers/v{id}").is_err());
        assert!(PathPattern::parse("/drivers/{id:}").is_err());
        assert!(PathPattern::parse("/drivers/{id:[0-9}").is_err());
    }

    #[test]
    fn query_predicates() {
        let numeric = QueryPredicate::new("user_id", QueryPattern::Numeric);
        assert!(numeric.accepts("7"));
        assert!(!numeric.accepts(""));
        assert!(!numeric.accepts("-7"));

        let tz = QueryPredicate::new("tz", QueryPattern::TimeZone);
        assert!(tz.accepts("Europe/Berlin"));
        assert!(tz.accepts("America/New_York"));
        assert!(!tz.accepts("UTC"));
        assert!(!tz.accepts("Europe/"));
        assert!(!tz.accepts("Etc/GMT+1"));

        let period = QueryPredicate::new("period", QueryPattern::Period);
        assert!(period.accepts("week"));
        assert!(!period.accepts("year"));
        assert!(!period.accepts("Week"));

        let ts = QueryPredicate::new("ts", QueryPattern::EpochSeconds);
        assert!(ts.accepts("1577833200"));
        assert!(!ts.accepts("1577833200.5"));
    }
}
