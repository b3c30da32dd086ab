use crate::diagnostics::Diagnostics;
use crate::filter::CompiledLine;
use crate::inventory::{Inventory, InventoryRow};
use std::collections::{BTreeMap, BTreeSet};

/// Derived key holding an HTML fragment rather than inventory data
pub const MICROSERVICE_TABLE_ROWS: &str = "microservice_table_rows";

/// Columns rendered into [`MICROSERVICE_TABLE_ROWS`], in cell order
pub const MICROSERVICE_COLUMNS: [&str; 6] = [
    "sector",
    "region",
    "clustername",
    "namespace",
    "microservicename",
    "replicacount",
];

pub type FieldValueMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct FieldExtraction {
    pub values: FieldValueMap,
    /// Requested names that are not columns of the inventory used
    pub missing_fields: Vec<String>,
}

/// Prefer the project-local field inventory when there is one.
pub fn field_source<'a>(
    project_local: Option<&'a Inventory>,
    global: Option<&'a Inventory>,
) -> Option<&'a Inventory> {
    project_local.or(global)
}

/// Aggregate the requested fields over every row `line` selects.
pub fn extract_fields(
    line: &CompiledLine,
    field_names: &[String],
    inventory: &Inventory,
    diag: &dyn Diagnostics,
) -> FieldExtraction {
    let mut extraction = FieldExtraction::default();
    let mut wanted = Vec::new();

    for name in field_names {
        if name == MICROSERVICE_TABLE_ROWS {
            continue;
        }
        if inventory.has_column(name) {
            wanted.push(name.as_str());
        } else {
            diag.warn(&format!(
                "Field '{name}' is not a column of {}",
                inventory.path().display()
            ));
            extraction.missing_fields.push(name.clone());
        }
    }

    let matched: Vec<&InventoryRow> = inventory.matching_rows(line).collect();

    for name in wanted {
        let mut unique = BTreeSet::new();
        for row in &matched {
            let cell = row.get(name).unwrap_or_default();
            unique.extend(
                cell.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            );
        }
        if unique.is_empty() {
            diag.debug(&format!(
                "Field '{name}' has no values for filter '{}'",
                line.text()
            ));
        }
        let joined = unique.into_iter().collect::<Vec<_>>().join(",");
        extraction.values.insert(name.to_string(), joined);
    }

    extraction.values.insert(
        MICROSERVICE_TABLE_ROWS.to_string(),
        microservice_table_rows(matched.iter().copied()),
    );

    extraction
}

/// One `<tr>` per row, in encounter order. Absent columns become empty cells.
pub fn microservice_table_rows<'a, I>(rows: I) -> String
where
    I: IntoIterator<Item = &'a InventoryRow>,
{
    rows.into_iter()
        .map(|row| {
            let cells: String = MICROSERVICE_COLUMNS
                .iter()
                .map(|column| format!("<td>{}</td>", escape_html(row.get(column).unwrap_or_default())))
                .collect();
            format!("<tr>{cells}</tr>")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use std::path::Path;

    fn inventory(csv: &str, diag: &CollectingDiagnostics) -> Inventory {
        Inventory::from_reader(Path::new("fields.csv"), csv.as_bytes(), diag).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_values_are_split_sorted_and_deduplicated() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory(
            "email,team,dept\n\
             a@x.com,core,\"sales,ops\"\n\
             b@x.com,core,ops\n\
             c@x.com,edge,hr\n",
            &diag,
        );
        let line = CompiledLine::compile("team=core", &diag);
        let extraction = extract_fields(&line, &names(&["dept"]), &inv, &diag);
        assert_eq!(extraction.values.get("dept").map(String::as_str), Some("ops,sales"));
        assert!(extraction.missing_fields.is_empty());
    }

    #[test]
    fn test_field_without_values_is_empty_string() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory("email,team,dept\na@x.com,core,\n", &diag);
        let line = CompiledLine::compile("team=core", &diag);
        let extraction = extract_fields(&line, &names(&["dept"]), &inv, &diag);
        assert_eq!(extraction.values.get("dept").map(String::as_str), Some(""));

        let line = CompiledLine::compile("team=nobody", &diag);
        let extraction = extract_fields(&line, &names(&["dept"]), &inv, &diag);
        assert_eq!(extraction.values.get("dept").map(String::as_str), Some(""));
    }

    #[test]
    fn test_unknown_fields_reported_and_skipped() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory("email,team\na@x.com,core\n", &diag);
        let line = CompiledLine::compile("team=core", &diag);
        let extraction = extract_fields(&line, &names(&["site", "team"]), &inv, &diag);
        assert_eq!(extraction.missing_fields, vec!["site".to_string()]);
        assert_eq!(extraction.values.get("team").map(String::as_str), Some("core"));
        assert!(!extraction.values.contains_key("site"));
        assert_eq!(diag.count_warnings("'site'"), 1);
    }

    #[test]
    fn test_microservice_table_rows() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory(
            "email,sector,region,clustername,microservicename,replicacount\n\
             a@x.com,retail,eu,prod-1,cart,3\n\
             b@x.com,retail,us,prod-2,checkout<v2>,2\n\
             c@x.com,bank,eu,prod-3,ledger,1\n",
            &diag,
        );
        let line = CompiledLine::compile("sector=retail", &diag);
        let extraction = extract_fields(&line, &[], &inv, &diag);
        let table = extraction.values.get(MICROSERVICE_TABLE_ROWS).unwrap();
        assert_eq!(
            table,
            "<tr><td>retail</td><td>eu</td><td>prod-1</td><td></td><td>cart</td><td>3</td></tr>\n\
             <tr><td>retail</td><td>us</td><td>prod-2</td><td></td><td>checkout&lt;v2&gt;</td><td>2</td></tr>"
        );
    }

    #[test]
    fn test_field_source_prefers_project_local() {
        let diag = CollectingDiagnostics::new();
        let global = inventory("email,team\na@x.com,core\n", &diag);
        let local = inventory("email,team,dept\nb@x.com,core,ops\n", &diag);

        let chosen = field_source(Some(&local), Some(&global)).unwrap();
        assert!(chosen.has_column("dept"));
        let chosen = field_source(None, Some(&global)).unwrap();
        assert!(!chosen.has_column("dept"));
        assert!(field_source(None, None).is_none());
    }
}
