use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDateTime;
use itemql_core::{ItemId, TypeProvider};

use crate::error::QueryError;

/// Canonical text form for date-time literals in both renderings.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A typed constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(NaiveDateTime),
    /// Reference to an item type, resolved to its id on demand.
    Object(ObjectLiteral),
    /// Named placeholder substituted before the query is sent.
    Parameter(ParameterReference),
}

impl Literal {
    /// Whether the literal renders with a leading minus sign.
    pub fn is_negative(&self) -> bool {
        match self {
            Literal::Integer(n) => *n < 0,
            Literal::Float(n) => n.is_sign_negative(),
            _ => false,
        }
    }

    pub fn format_date_time(value: &NaiveDateTime) -> String {
        value.format(DATE_TIME_FORMAT).to_string()
    }

    /// Shortest text that reads back as the same value, used by both
    /// renderings. NaN and the infinities have no literal form.
    pub fn format_float(value: f64) -> Option<String> {
        value.is_finite().then(|| format!("{value:?}"))
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value.into())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(value: NaiveDateTime) -> Self {
        Literal::DateTime(value)
    }
}

impl From<ObjectLiteral> for Literal {
    fn from(value: ObjectLiteral) -> Self {
        Literal::Object(value)
    }
}

impl From<ParameterReference> for Literal {
    fn from(value: ParameterReference) -> Self {
        Literal::Parameter(value)
    }
}

/// A named parameter. Raw parameters are substituted verbatim, without
/// quoting or escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterReference {
    pub name: String,
    pub is_raw: bool,
}

impl ParameterReference {
    pub fn new(name: impl Into<String>, is_raw: bool) -> Self {
        Self {
            name: name.into(),
            is_raw,
        }
    }
}

/// A literal naming an item type; its value is the id of that type's
/// definition, looked up through the provider the first time it is needed.
#[derive(Clone)]
pub struct ObjectLiteral {
    type_name: String,
    provider: Arc<dyn TypeProvider>,
    type_id: OnceLock<Option<ItemId>>,
}

impl ObjectLiteral {
    pub fn new(type_name: impl Into<String>, provider: Arc<dyn TypeProvider>) -> Self {
        Self {
            type_name: type_name.into(),
            provider,
            type_id: OnceLock::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn provider(&self) -> &Arc<dyn TypeProvider> {
        &self.provider
    }

    pub fn type_id(&self) -> Option<&ItemId> {
        self.type_id
            .get_or_init(|| self.provider.type_id(&self.type_name))
            .as_ref()
    }

    pub fn resolve(&self) -> Result<&ItemId, QueryError> {
        self.type_id()
            .ok_or_else(|| QueryError::UnresolvedType(self.type_name.clone()))
    }
}

impl PartialEq for ObjectLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl fmt::Debug for ObjectLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLiteral")
            .field("type_name", &self.type_name)
            .field("type_id", &self.type_id.get())
            .finish()
    }
}

/// One element of a `LIKE` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    Literal(String),
    /// `%`
    AnyString,
    /// `_`
    AnyChar,
    /// `[a-z]` or `[^0-9]`
    CharClass {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

/// A single wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    pub segments: Vec<PatternSegment>,
}

impl Pattern {
    /// Read a pattern written in SQL `LIKE` syntax. An unterminated `[` is
    /// taken literally.
    pub fn from_like(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '%' => {
                    flush_literal(&mut literal, &mut segments);
                    segments.push(PatternSegment::AnyString);
                    i += 1;
                }
                '_' => {
                    flush_literal(&mut literal, &mut segments);
                    segments.push(PatternSegment::AnyChar);
                    i += 1;
                }
                '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                    Some(len) => {
                        let body = &chars[i + 1..i + 1 + len];
                        match body {
                            [c @ ('%' | '_' | '[')] => literal.push(*c),
                            _ => {
                                flush_literal(&mut literal, &mut segments);
                                segments.push(char_class(body));
                            }
                        }
                        i += len + 2;
                    }
                    None => {
                        literal.push('[');
                        i += 1;
                    }
                },
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        flush_literal(&mut literal, &mut segments);
        Self { segments }
    }

    /// Write the pattern back in SQL `LIKE` syntax.
    pub fn to_like(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PatternSegment::Literal(text) => {
                    for c in text.chars() {
                        match c {
                            '%' | '_' | '[' => {
                                out.push('[');
                                out.push(c);
                                out.push(']');
                            }
                            c => out.push(c),
                        }
                    }
                }
                PatternSegment::AnyString => out.push('%'),
                PatternSegment::AnyChar => out.push('_'),
                PatternSegment::CharClass { negated, ranges } => {
                    out.push('[');
                    if *negated {
                        out.push('^');
                    }
                    for (start, end) in ranges {
                        out.push(*start);
                        if start != end {
                            out.push('-');
                            out.push(*end);
                        }
                    }
                    out.push(']');
                }
            }
        }
        out
    }

    /// True when the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PatternSegment::Literal(_)))
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<PatternSegment>) {
    if !literal.is_empty() {
        segments.push(PatternSegment::Literal(std::mem::take(literal)));
    }
}

fn char_class(body: &[char]) -> PatternSegment {
    let (negated, body) = match body {
        ['^', rest @ ..] => (true, rest),
        _ => (false, body),
    };
    let mut ranges = Vec::new();
    let mut j = 0;
    while j < body.len() {
        if j + 2 < body.len() && body[j + 1] == '-' {
            ranges.push((body[j], body[j + 2]));
            j += 3;
        } else {
            ranges.push((body[j], body[j]));
            j += 1;
        }
    }
    PatternSegment::CharClass { negated, ranges }
}

/// Several patterns matched as alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternList {
    pub patterns: Vec<Pattern>,
}

impl PatternList {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    pub fn from_like<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::new(
            patterns
                .iter()
                .map(|p| Pattern::from_like(p.as_ref()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use itemql_core::TypeMap;

    fn part_id() -> ItemId {
        ItemId::parse("4F1AC04A2B48414383E8BFB2E2F6DE86").unwrap()
    }

    #[test]
    fn like_pattern_segments() {
        let pattern = Pattern::from_like("AB_%[0-9][^xz]");
        assert_eq!(
            pattern.segments,
            vec![
                PatternSegment::Literal("AB".into()),
                PatternSegment::AnyChar,
                PatternSegment::AnyString,
                PatternSegment::CharClass {
                    negated: false,
                    ranges: vec![('0', '9')],
                },
                PatternSegment::CharClass {
                    negated: true,
                    ranges: vec![('x', 'x'), ('z', 'z')],
                },
            ]
        );
        assert_eq!(pattern.to_like(), "AB_%[0-9][^xz]");
    }

    #[test]
    fn like_pattern_escapes() {
        let pattern = Pattern::from_like("50[%] off[");
        assert_eq!(
            pattern.segments,
            vec![PatternSegment::Literal("50% off[".into())]
        );
        assert!(pattern.is_exact());
        assert_eq!(pattern.to_like(), "50[%] off[[]");
    }

    #[test]
    fn pattern_list_clone_is_equal_and_independent() {
        let list = PatternList::from_like(&["A%", "B_"]);
        let mut copy = list.clone();
        assert_eq!(copy, list);
        copy.patterns.push(Pattern::from_like("C"));
        assert_eq!(list.len(), 2);
        assert_eq!(copy.len(), 3);
    }

    #[test]
    fn object_literal_resolves_lazily() {
        let provider: Arc<dyn TypeProvider> =
            Arc::new([("Part", part_id())].into_iter().collect::<TypeMap>());
        let part = ObjectLiteral::new("Part", provider.clone());
        assert_eq!(part.resolve().unwrap(), &part_id());

        let missing = ObjectLiteral::new("Nope", provider);
        assert_eq!(
            missing.resolve(),
            Err(QueryError::UnresolvedType("Nope".into()))
        );
    }

    #[test]
    fn negative_literals() {
        assert!(Literal::Integer(-5).is_negative());
        assert!(Literal::Float(-0.5).is_negative());
        assert!(!Literal::Integer(5).is_negative());
        assert!(!Literal::String("-5".into()).is_negative());
    }

    #[test]
    fn date_time_canonical_format() {
        let value = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Literal::format_date_time(&value), "2024-01-15T00:00:00");
    }

    #[test]
    fn float_canonical_format() {
        assert_eq!(Literal::format_float(1.0).as_deref(), Some("1.0"));
        assert_eq!(Literal::format_float(0.1 + 0.2).as_deref(), Some("0.30000000000000004"));
        assert_eq!(Literal::format_float(-2.5).as_deref(), Some("-2.5"));
        assert_eq!(Literal::format_float(f64::NAN), None);
        assert_eq!(Literal::format_float(f64::NEG_INFINITY), None);
    }
}
