//! Query-string parameters for list endpoints
//!
//! Five keys are reserved for shaping the result (`sort`, `fields`, `search`,
//! `page`, `limit`); every other key is a field constraint. Field keys use
//! bracket notation for ranges and nested paths:
//!
//! | key | meaning |
//! |---|---|
//! | `price=40` | `price` equals 40 |
//! | `price[gte]=10` | `price >= 10` (also `gt`, `lte`, `lt`) |
//! | `dimensions[height]=12` | `dimensions.height` equals 12 |
//! | `dimensions[height][lt]=20` | `dimensions.height < 20` |

use std::fmt;

/// Keys that shape the result instead of filtering it
pub const RESERVED_KEYS: [&str; 5] = ["sort", "fields", "search", "page", "limit"];

/// Comparison operator from a bracket suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOp {
    /// `[gte]`
    Gte,
    /// `[gt]`
    Gt,
    /// `[lte]`
    Lte,
    /// `[lt]`
    Lt,
}

impl RangeOp {
    /// Parse a bracket segment (`gte`, `gt`, `lte`, `lt`)
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }

    /// The store operator this suffix maps to
    pub fn operator(self) -> &'static str {
        match self {
            Self::Gte => "$gte",
            Self::Gt => "$gt",
            Self::Lte => "$lte",
            Self::Lt => "$lt",
        }
    }
}

impl fmt::Display for RangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// One field constraint parsed from a non-reserved key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    /// Dotted field path
    pub path: String,
    /// Range operator, or `None` for equality
    pub op: Option<RangeOp>,
    /// Raw, uncast value
    pub value: String,
}

/// Ordered query-string pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Build from decoded `(key, value)` pairs in query-string order
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First value supplied for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` was supplied at all
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// All pairs in order
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Field constraints from every non-reserved key, in query-string order
    pub fn field_filters(&self) -> Vec<FieldFilter> {
        self.pairs
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| {
                let (path, op) = parse_key(key);
                FieldFilter {
                    path,
                    op,
                    value: value.clone(),
                }
            })
            .collect()
    }
}

impl From<Vec<(String, String)>> for QueryParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Split a bracketed key into a dotted path and optional range operator
///
/// Malformed keys (unbalanced or empty brackets, text after a bracket) are
/// kept verbatim as a literal field name.
fn parse_key(key: &str) -> (String, Option<RangeOp>) {
    let literal = || (key.to_string(), None);

    let Some(open) = key.find('[') else {
        return literal();
    };

    let (base, mut rest) = key.split_at(open);
    if base.is_empty() || base.contains(']') {
        return literal();
    }

    let mut segments = Vec::new();
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return literal();
        };
        let Some(close) = inner.find(']') else {
            return literal();
        };
        let segment = &inner[..close];
        if segment.is_empty() || segment.contains('[') {
            return literal();
        }
        segments.push(segment);
        rest = &inner[close + 1..];
    }

    let op = segments.last().and_then(|s| RangeOp::parse(s));
    if op.is_some() {
        segments.pop();
    }

    let mut path = base.to_string();
    for segment in segments {
        path.push('.');
        path.push_str(segment);
    }
    (path, op)
}

/// Integer prefix of `raw`, accepting leading whitespace and a sign
///
/// `"3abc"` parses as 3 and `"2.9"` as 2; text with no leading digits yields `None`.
pub fn parse_lenient_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Positive integer value of `raw`, or `default` when absent, malformed or below 1
pub fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(parse_lenient_int)
        .filter(|n| *n >= 1)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_reserved_keys_are_not_field_filters() {
        let p = params(&[
            ("sort", "price"),
            ("fields", "name"),
            ("search", "kettle"),
            ("page", "2"),
            ("limit", "3"),
            ("category", "kitchen"),
        ]);
        let filters = p.field_filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].path, "category");
        assert_eq!(filters[0].op, None);
    }

    #[test]
    fn test_reserved_lookup_takes_first_occurrence() {
        let p = params(&[("page", "2"), ("page", "5")]);
        assert_eq!(p.get("page"), Some("2"));
        assert!(p.contains("page"));
        assert!(!p.contains("limit"));
    }

    #[test]
    fn test_range_suffixes() {
        assert_eq!(parse_key("price[gte]"), ("price".into(), Some(RangeOp::Gte)));
        assert_eq!(parse_key("price[gt]"), ("price".into(), Some(RangeOp::Gt)));
        assert_eq!(parse_key("price[lte]"), ("price".into(), Some(RangeOp::Lte)));
        assert_eq!(parse_key("price[lt]"), ("price".into(), Some(RangeOp::Lt)));
    }

    #[test]
    fn test_operator_names_inside_field_names_are_untouched() {
        // only a whole bracket segment is an operator
        assert_eq!(parse_key("weight"), ("weight".into(), None));
        assert_eq!(parse_key("altitude"), ("altitude".into(), None));
        assert_eq!(parse_key("lte"), ("lte".into(), None));
    }

    #[test]
    fn test_nested_paths() {
        assert_eq!(parse_key("dimensions[height]"), ("dimensions.height".into(), None));
        assert_eq!(
            parse_key("dimensions[height][lt]"),
            ("dimensions.height".into(), Some(RangeOp::Lt))
        );
    }

    #[test]
    fn test_malformed_keys_are_literal() {
        for key in ["price[gte", "price]", "price[]", "[gte]", "price[gte]x", "a[b[c]]"] {
            assert_eq!(parse_key(key), (key.to_string(), None), "key {key}");
        }
    }

    #[test]
    fn test_lenient_int() {
        assert_eq!(parse_lenient_int("3"), Some(3));
        assert_eq!(parse_lenient_int("  42"), Some(42));
        assert_eq!(parse_lenient_int("3abc"), Some(3));
        assert_eq!(parse_lenient_int("2.9"), Some(2));
        assert_eq!(parse_lenient_int("-4"), Some(-4));
        assert_eq!(parse_lenient_int("abc"), None);
        assert_eq!(parse_lenient_int(""), None);
        assert_eq!(parse_lenient_int("99999999999999999999"), None);
    }

    #[test]
    fn test_positive_or_defaults() {
        assert_eq!(positive_or(None, 8), 8);
        assert_eq!(positive_or(Some("abc"), 8), 8);
        assert_eq!(positive_or(Some("0"), 8), 8);
        assert_eq!(positive_or(Some("-2"), 1), 1);
        assert_eq!(positive_or(Some("5"), 8), 5);
    }
}
