//! Path patterns with segment variables.

use std::collections::BTreeMap;
use std::fmt;

use crate::utd::{split_path, WILDCARD};

/// Variables captured during a match.
pub type Vars = BTreeMap<String, String>;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Variable(String),
    Wildcard,
}

/// A parsed path pattern. Segments are matched positionally: `{name}`
/// captures the segment under that name, `*` matches any one segment, and a
/// trailing `*` matches any remainder, including none.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(s: &str) -> Self {
        let segments = split_path(s)
            .into_iter()
            .map(|seg| {
                if seg == WILDCARD {
                    Segment::Wildcard
                } else if seg.len() > 2 && seg.starts_with('{') && seg.ends_with('}') {
                    Segment::Variable(seg[1..seg.len() - 1].trim().to_string())
                } else {
                    Segment::Literal(seg)
                }
            })
            .collect();
        Self {
            raw: s.to_string(),
            segments,
        }
    }

    /// True when the entire pattern is the bare wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.raw == WILDCARD
    }

    pub fn matches(&self, path: &str) -> Option<Vars> {
        let segments = split_path(path);
        let mut vars = Vars::new();
        let mut at = 0;

        for (n, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Wildcard if n == self.segments.len() - 1 => return Some(vars),
                Segment::Wildcard => {
                    if at >= segments.len() {
                        return None;
                    }
                    at += 1;
                }
                Segment::Variable(name) => {
                    if at >= segments.len() {
                        return None;
                    }
                    vars.insert(name.clone(), segments[at].clone());
                    at += 1;
                }
                Segment::Literal(lit) => {
                    if at >= segments.len() || segments[at] != *lit {
                        return None;
                    }
                    at += 1;
                }
            }
        }

        if at == segments.len() {
            Some(vars)
        } else {
            None
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn literal_segments_match_exactly() {
        let p = Pattern::parse("/zip/zap");
        assert_eq!(p.matches("/zip/zap"), Some(Vars::new()));
        assert_eq!(p.matches("/zip/zap/"), Some(Vars::new()));
        assert_eq!(p.matches("/zip"), None);
        assert_eq!(p.matches("/zip/zap/zop"), None);
        assert_eq!(p.matches("/ZIP/zap"), None);
    }

    #[test]
    fn variables_capture_single_segments() {
        let p = Pattern::parse("/zip/{m}");
        assert_eq!(p.matches("/zip/zap"), Some(vars(&[("m", "zap")])));
        assert_eq!(p.matches("/zip/zap/zop"), None);
        assert_eq!(p.matches("/zip"), None);
    }

    #[test]
    fn trailing_wildcard_matches_any_remainder() {
        let p = Pattern::parse("/zip/*");
        assert_eq!(p.matches("/zip/a"), Some(Vars::new()));
        assert_eq!(p.matches("/zip/a/b/c"), Some(Vars::new()));
        assert_eq!(p.matches("/zip"), Some(Vars::new()));
        assert_eq!(p.matches("/zap/a"), None);
    }

    #[test]
    fn interior_wildcard_matches_one_segment() {
        let p = Pattern::parse("/zip/*/zop");
        assert_eq!(p.matches("/zip/anything/zop"), Some(Vars::new()));
        assert_eq!(p.matches("/zip/zop"), None);
    }

    #[test]
    fn empty_pattern_matches_only_the_empty_path() {
        let p = Pattern::parse("");
        assert_eq!(p.matches(""), Some(Vars::new()));
        assert_eq!(p.matches("/"), Some(Vars::new()));
        assert_eq!(p.matches("/zip"), None);
    }
}
