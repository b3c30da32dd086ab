use crate::condition::{parse_line, Condition};
use crate::diagnostics::Diagnostics;
use crate::inventory::InventoryRow;
use crate::pattern::{CompiledPattern, Operator};
use std::collections::{BTreeSet, HashMap};

/// Anything that can accept or reject an inventory row
pub trait RowFilter {
    fn matches(&self, row: &InventoryRow) -> bool;
}

/// Raw filter lines in file order, comments and blanks removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    lines: Vec<String>,
}

impl FilterSet {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        FilterSet { lines }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = lines.into_iter().map(|l| l.as_ref().to_string()).collect();
        Self::parse(&joined.join("\n"))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Every field name referenced by a condition, for validation against
    /// inventory headers.
    pub fn referenced_fields(&self) -> BTreeSet<String> {
        self.lines
            .iter()
            .flat_map(|line| parse_line(line))
            .filter_map(|condition| condition.field)
            .collect()
    }

    pub fn compile(&self, diag: &dyn Diagnostics) -> CompiledFilter {
        let mut cache = PatternCache::default();
        let lines = self
            .lines
            .iter()
            .map(|line| cache.compile_line(line, diag))
            .collect();
        CompiledFilter { lines }
    }
}

/// Compiles each distinct (operator, pattern) once, so a malformed regex is
/// reported once no matter how many lines or rows use it.
#[derive(Default)]
struct PatternCache {
    compiled: HashMap<(Operator, String), CompiledPattern>,
}

impl PatternCache {
    fn get(&mut self, operator: Operator, pattern: &str, diag: &dyn Diagnostics) -> CompiledPattern {
        let key = (operator, pattern.to_string());
        if let Some(compiled) = self.compiled.get(&key) {
            return compiled.clone();
        }
        let (compiled, error) = CompiledPattern::compile(operator, pattern);
        if let Some(e) = error {
            diag.warn(&format!(
                "Invalid pattern '{pattern}' (operator '{}'), condition will never match: {e}",
                operator.token()
            ));
        }
        self.compiled.insert(key, compiled.clone());
        compiled
    }

    fn compile_line(&mut self, line: &str, diag: &dyn Diagnostics) -> CompiledLine {
        let conditions: Vec<CompiledCondition> = parse_line(line)
            .into_iter()
            .map(|condition| {
                let pattern = self.get(condition.operator, &condition.pattern, diag);
                CompiledCondition { condition, pattern }
            })
            .collect();
        if conditions.is_empty() {
            diag.warn(&format!(
                "Filter line '{line}' has no conditions and matches every row"
            ));
        }
        CompiledLine {
            text: line.to_string(),
            conditions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledCondition {
    condition: Condition,
    pattern: CompiledPattern,
}

impl CompiledCondition {
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// A named field missing from the row fails the condition. Without a
    /// field name any column may satisfy it.
    pub fn matches(&self, row: &InventoryRow) -> bool {
        match &self.condition.field {
            Some(field) => match row.get(field) {
                Some(value) => self.pattern.matches(value),
                None => false,
            },
            None => row.values().any(|value| self.pattern.matches(value)),
        }
    }
}

/// One OR-branch of a filter file
#[derive(Debug, Clone)]
pub struct CompiledLine {
    text: String,
    conditions: Vec<CompiledCondition>,
}

impl CompiledLine {
    pub fn compile(line: &str, diag: &dyn Diagnostics) -> Self {
        PatternCache::default().compile_line(line, diag)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conditions(&self) -> &[CompiledCondition] {
        &self.conditions
    }
}

impl RowFilter for CompiledLine {
    fn matches(&self, row: &InventoryRow) -> bool {
        self.conditions.iter().all(|condition| condition.matches(row))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    lines: Vec<CompiledLine>,
}

impl CompiledFilter {
    pub fn lines(&self) -> &[CompiledLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl RowFilter for CompiledFilter {
    /// An empty filter set accepts every row
    fn matches(&self, row: &InventoryRow) -> bool {
        self.lines.is_empty() || self.lines.iter().any(|line| line.matches(row))
    }
}

/// Convenience wrapper: compile and evaluate in one step
pub fn row_matches(row: &InventoryRow, filter: &FilterSet, diag: &dyn Diagnostics) -> bool {
    filter.compile(diag).matches(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;

    fn row(pairs: &[(&str, &str)]) -> InventoryRow {
        InventoryRow::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn sample_row() -> InventoryRow {
        row(&[
            ("email", "ann@example.com"),
            ("department", "Sales"),
            ("title", "Senior Manager"),
            ("region", "EMEA"),
        ])
    }

    #[test]
    fn test_filter_file_parsing() {
        let filter = FilterSet::parse("# comment\n\ndepartment=sales\n  \n  region=emea  \n#x=y\n");
        assert_eq!(filter.lines(), &["department=sales", "region=emea"]);
        assert_eq!(
            filter.referenced_fields().into_iter().collect::<Vec<_>>(),
            vec!["department", "region"]
        );
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let diag = CollectingDiagnostics::new();
        let filter = FilterSet::parse("# nothing here\n");
        assert!(filter.is_empty());
        assert!(row_matches(&sample_row(), &filter, &diag));
    }

    #[test]
    fn test_and_within_line_or_across_lines() {
        let diag = CollectingDiagnostics::new();
        let r = sample_row();

        let filter = FilterSet::parse("department=sales,region=emea");
        assert!(row_matches(&r, &filter, &diag));

        let filter = FilterSet::parse("department=sales,region=apac");
        assert!(!row_matches(&r, &filter, &diag));

        let filter = FilterSet::parse("department=sales,region=apac\ntitle=~manager");
        assert!(row_matches(&r, &filter, &diag));

        let filter = FilterSet::parse("title=~manager\ndepartment=sales,region=apac");
        assert!(row_matches(&r, &filter, &diag));
    }

    #[test]
    fn test_missing_field_fails_condition() {
        let diag = CollectingDiagnostics::new();
        let r = sample_row();
        assert!(!row_matches(&r, &FilterSet::parse("site=berlin"), &diag));
        assert!(!row_matches(&r, &FilterSet::parse("site!=berlin"), &diag));
        assert!(row_matches(
            &r,
            &FilterSet::parse("site=berlin\ndepartment=sales"),
            &diag
        ));
    }

    #[test]
    fn test_bare_pattern_searches_all_columns() {
        let diag = CollectingDiagnostics::new();
        let r = sample_row();
        assert!(row_matches(&r, &FilterSet::parse("emea"), &diag));
        assert!(row_matches(&r, &FilterSet::parse("*manager"), &diag));
        assert!(!row_matches(&r, &FilterSet::parse("apac"), &diag));
    }

    #[test]
    fn test_trailing_commas_are_harmless() {
        let diag = CollectingDiagnostics::new();
        let filter = FilterSet::parse("department=sales,,");
        assert!(row_matches(&sample_row(), &filter, &diag));
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn test_bad_regex_reported_once() {
        let diag = CollectingDiagnostics::new();
        let filter = FilterSet::parse("title=~(broken\nregion=emea,title=~(broken");
        let compiled = filter.compile(&diag);

        let rows = [sample_row(), sample_row(), sample_row()];
        let hits = rows.iter().filter(|r| compiled.matches(r)).count();
        assert_eq!(hits, 0);
        assert_eq!(diag.count_warnings("(broken"), 1);
    }

    /// Brute-force check of the OR-of-ANDs definition over a small grid of
    /// rows and generated filter lines.
    #[test]
    fn test_or_of_ands_definition() {
        let diag = CollectingDiagnostics::new();
        let departments = ["sales", "ops", "hr"];
        let regions = ["eu", "us"];
        let conditions = [
            "department=sales",
            "department!=ops",
            "region=eu",
            "region=~^u",
            "hr",
            "department=s*",
        ];

        let mut lines = Vec::new();
        for (i, a) in conditions.iter().enumerate() {
            for b in conditions.iter().skip(i) {
                lines.push(format!("{a},{b}"));
            }
        }

        for dept in departments {
            for reg in regions {
                let r = row(&[("email", "x@example.com"), ("department", dept), ("region", reg)]);
                for window in lines.chunks(3) {
                    let filter = FilterSet::from_lines(window);
                    let expected = window.iter().any(|line| {
                        parse_line(line).iter().all(|c| {
                            CompiledCondition {
                                condition: c.clone(),
                                pattern: CompiledPattern::compile(c.operator, &c.pattern).0,
                            }
                            .matches(&r)
                        })
                    });
                    assert_eq!(row_matches(&r, &filter, &diag), expected, "{window:?}");
                }
            }
        }
    }
}
