//! Rule-based customer segmentation from recency/frequency score codes
//!
//! A score code is the recency score followed by the frequency score
//! (e.g. `"54"`). Segments are assigned by an ordered table of digit
//! patterns: the first rule whose pattern matches the code wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, ValuationError};

/// One position of a digit pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigitSlot {
    /// Any digit (`*` or `?`)
    Any,
    /// Bitmask of accepted digits (bit `d` set = digit `d` accepted)
    OneOf(u16),
}

impl DigitSlot {
    fn accepts(self, digit: u8) -> bool {
        match self {
            DigitSlot::Any => true,
            DigitSlot::OneOf(mask) => digit <= 9 && mask & (1 << digit) != 0,
        }
    }
}

/// A pattern over fixed-length digit codes.
///
/// Each slot is a literal digit (`5`), a class (`[4-5]`, `[135]`, `[1-24]`)
/// or a wildcard (`*`/`?`). `"5[4-5]"` matches `"54"` and `"55"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DigitPattern {
    source: String,
    slots: Vec<DigitSlot>,
}

impl DigitPattern {
    /// Whether `code` has exactly one digit per slot and every slot accepts its digit.
    pub fn matches(&self, code: &str) -> bool {
        let digits: Vec<u8> = code.bytes().collect();
        if digits.len() != self.slots.len() {
            return false;
        }
        digits
            .iter()
            .zip(&self.slots)
            .all(|(&byte, slot)| byte.is_ascii_digit() && slot.accepts(byte - b'0'))
    }

    /// Number of digits this pattern matches
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for DigitPattern {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| {
            ValuationError::invalid_config(format!("invalid segment pattern '{}': {}", s, why))
        };

        let mut slots = Vec::new();
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            match c {
                '0'..='9' => slots.push(DigitSlot::OneOf(1 << (c as u8 - b'0'))),
                '*' | '?' => slots.push(DigitSlot::Any),
                '[' => {
                    let mut class = Vec::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() || d == '-' => class.push(d),
                            Some(other) => return Err(invalid(&format!("unexpected '{}' in class", other))),
                            None => return Err(invalid("unterminated '['")),
                        }
                    }
                    slots.push(DigitSlot::OneOf(parse_class(&class).map_err(|why| invalid(&why))?));
                }
                other => return Err(invalid(&format!("unexpected character '{}'", other))),
            }
        }

        if slots.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        Ok(Self {
            source: s.to_string(),
            slots,
        })
    }
}

/// Parse the inside of a `[...]` class into a digit bitmask
fn parse_class(class: &[char]) -> std::result::Result<u16, String> {
    if class.is_empty() {
        return Err("empty class".to_string());
    }

    let digit = |c: char| c.to_digit(10).map(|d| d as u8);
    let mut mask = 0u16;
    let mut i = 0;

    while i < class.len() {
        let lo = digit(class[i]).ok_or_else(|| format!("'{}' is not a digit", class[i]))?;
        if class.get(i + 1) == Some(&'-') {
            let hi = class
                .get(i + 2)
                .and_then(|&c| digit(c))
                .ok_or_else(|| "range has no upper digit".to_string())?;
            if hi < lo {
                return Err(format!("descending range {}-{}", lo, hi));
            }
            for d in lo..=hi {
                mask |= 1 << d;
            }
            i += 3;
        } else {
            mask |= 1 << lo;
            i += 1;
        }
    }

    Ok(mask)
}

impl TryFrom<String> for DigitPattern {
    type Error = ValuationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DigitPattern> for String {
    fn from(pattern: DigitPattern) -> Self {
        pattern.source
    }
}

impl fmt::Display for DigitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Recency score followed by frequency score, e.g. `54`.
///
/// The monetary score is deliberately not part of the code: segmentation is
/// defined on the recency/frequency surface only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScoreCode {
    pub recency: u8,
    pub frequency: u8,
}

impl ScoreCode {
    pub fn new(recency: u8, frequency: u8) -> Self {
        Self { recency, frequency }
    }
}

impl fmt::Display for ScoreCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.recency, self.frequency)
    }
}

/// A single `(pattern, segment)` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub pattern: DigitPattern,
    pub segment: String,
}

impl SegmentRule {
    pub fn new(pattern: &str, segment: &str) -> Result<Self> {
        Ok(Self {
            pattern: pattern.parse()?,
            segment: segment.to_string(),
        })
    }
}

/// Ordered rule table; first match wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentRuleTable {
    rules: Vec<SegmentRule>,
}

/// Retail segmentation over the 5x5 recency/frequency grid
const DEFAULT_RULES: [(&str, &str); 10] = [
    ("[1-2][1-2]", "hibernating"),
    ("[1-2][3-4]", "at_risk"),
    ("[1-2]5", "cant_loose"),
    ("3[1-2]", "about_to_sleep"),
    ("33", "need_attention"),
    ("[3-4][4-5]", "loyal_customers"),
    ("41", "promising"),
    ("51", "new_customers"),
    ("[4-5][2-3]", "potential_loyalists"),
    ("5[4-5]", "champions"),
];

impl Default for SegmentRuleTable {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(pattern, segment)| SegmentRule::new(pattern, segment).ok())
            .collect();
        Self { rules }
    }
}

impl SegmentRuleTable {
    pub fn new(rules: Vec<SegmentRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Segment name for a code, or `UnmappedSegment` if no rule matches
    pub fn classify(&self, code: &str) -> Result<&str> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(code))
            .map(|rule| rule.segment.as_str())
            .ok_or_else(|| ValuationError::UnmappedSegment {
                code: code.to_string(),
            })
    }

    pub fn classify_code(&self, code: ScoreCode) -> Result<&str> {
        self.classify(&code.to_string())
    }

    /// Every code over `{1..=cardinality}^2` that no rule matches
    pub fn unmapped_codes(&self, cardinality: u8) -> Vec<String> {
        all_codes(cardinality)
            .map(|code| code.to_string())
            .filter(|code| self.classify(code).is_err())
            .collect()
    }

    /// Fail with `UnmappedSegment` on the first code no rule covers
    pub fn ensure_exhaustive(&self, cardinality: u8) -> Result<()> {
        match self.unmapped_codes(cardinality).into_iter().next() {
            Some(code) => Err(ValuationError::UnmappedSegment { code }),
            None => Ok(()),
        }
    }

    /// Segment map laid out with recency descending (rows) and frequency
    /// ascending (columns); `None` marks unmapped cells.
    pub fn segment_grid(&self, cardinality: u8) -> Vec<Vec<Option<String>>> {
        (1..=cardinality)
            .rev()
            .map(|recency| {
                (1..=cardinality)
                    .map(|frequency| {
                        self.classify_code(ScoreCode::new(recency, frequency))
                            .ok()
                            .map(str::to_string)
                    })
                    .collect()
            })
            .collect()
    }

    /// Distinct segment names in rule order
    pub fn segment_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !names.contains(&rule.segment.as_str()) {
                names.push(&rule.segment);
            }
        }
        names
    }
}

fn all_codes(cardinality: u8) -> impl Iterator<Item = ScoreCode> {
    (1..=cardinality).flat_map(move |r| (1..=cardinality).map(move |f| ScoreCode::new(r, f)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_class_patterns() {
        let pattern: DigitPattern = "5[4-5]".parse().unwrap();
        assert!(pattern.matches("54"));
        assert!(pattern.matches("55"));
        assert!(!pattern.matches("53"));
        assert!(!pattern.matches("45"));
        assert!(!pattern.matches("545"));
        assert_eq!(pattern.width(), 2);
    }

    #[test]
    fn test_wildcard_and_enumerated_class() {
        let pattern: DigitPattern = "*[135]".parse().unwrap();
        assert!(pattern.matches("21"));
        assert!(pattern.matches("93"));
        assert!(!pattern.matches("22"));

        let mixed: DigitPattern = "[1-24]?".parse().unwrap();
        assert!(mixed.matches("17"));
        assert!(mixed.matches("40"));
        assert!(!mixed.matches("30"));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        for bad in ["", "5[", "[]", "[5-3]", "[4-]", "a1", "[1x]"] {
            let result: Result<DigitPattern> = bad.parse();
            assert!(result.is_err(), "pattern '{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_default_table_is_exhaustive_over_five_by_five() {
        let table = SegmentRuleTable::default();
        assert_eq!(table.rules().len(), 10);
        assert!(table.unmapped_codes(5).is_empty());
        assert!(table.ensure_exhaustive(5).is_ok());
    }

    #[test]
    fn test_default_table_known_codes() {
        let table = SegmentRuleTable::default();
        assert_eq!(table.classify("55").unwrap(), "champions");
        assert_eq!(table.classify("11").unwrap(), "hibernating");
        assert_eq!(table.classify("15").unwrap(), "cant_loose");
        assert_eq!(table.classify("33").unwrap(), "need_attention");
        assert_eq!(table.classify("41").unwrap(), "promising");
        assert_eq!(table.classify("51").unwrap(), "new_customers");
        assert_eq!(table.classify("42").unwrap(), "potential_loyalists");
        assert_eq!(table.classify("34").unwrap(), "loyal_customers");
    }

    #[test]
    fn test_first_match_wins() {
        let table = SegmentRuleTable::new(vec![
            SegmentRule::new("5*", "recent").unwrap(),
            SegmentRule::new("55", "champions").unwrap(),
        ]);
        assert_eq!(table.classify("55").unwrap(), "recent");
    }

    #[test]
    fn test_single_rule_table_reports_unmapped_code() {
        let table = SegmentRuleTable::new(vec![SegmentRule::new("5[4-5]", "champions").unwrap()]);
        assert_eq!(table.classify_code(ScoreCode::new(5, 4)).unwrap(), "champions");

        let err = table.classify("11").unwrap_err();
        assert!(matches!(err, ValuationError::UnmappedSegment { ref code } if code == "11"));

        assert_eq!(table.unmapped_codes(5).len(), 23);
        assert!(table.ensure_exhaustive(5).is_err());
    }

    #[test]
    fn test_segment_grid_layout() {
        let grid = SegmentRuleTable::default().segment_grid(5);
        assert_eq!(grid.len(), 5);
        // First row is recency 5, first column is frequency 1
        assert_eq!(grid[0][0].as_deref(), Some("new_customers"));
        assert_eq!(grid[0][4].as_deref(), Some("champions"));
        assert_eq!(grid[4][0].as_deref(), Some("hibernating"));
    }

    #[test]
    fn test_rule_table_json_round_trip() {
        let json = r#"[{"pattern": "5[4-5]", "segment": "champions"}, {"pattern": "**", "segment": "other"}]"#;
        let table: SegmentRuleTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.classify("54").unwrap(), "champions");
        assert_eq!(table.classify("12").unwrap(), "other");

        let back = serde_json::to_string(&table).unwrap();
        assert!(back.contains("5[4-5]"));
    }

    #[test]
    fn test_bad_pattern_in_json_is_an_error() {
        let json = r#"[{"pattern": "5[", "segment": "broken"}]"#;
        let parsed: std::result::Result<SegmentRuleTable, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_segment_names_are_distinct_in_rule_order() {
        let table = SegmentRuleTable::default();
        let names = table.segment_names();
        assert_eq!(names.first(), Some(&"hibernating"));
        assert_eq!(names.last(), Some(&"champions"));
        assert_eq!(names.len(), 10);
    }
}
