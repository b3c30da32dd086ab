use crate::address::{parse_address_cell, AddressList};
use crate::diagnostics::Diagnostics;
use crate::error::{CampaignError, Result};
use crate::filter::RowFilter;
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const EMAIL_COLUMN: &str = "email";

/// One data row, keyed by trimmed column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryRow {
    cells: HashMap<String, String>,
}

impl InventoryRow {
    pub fn from_pairs<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        InventoryRow {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.values().map(String::as_str)
    }

    pub fn email_cell(&self) -> &str {
        self.get(EMAIL_COLUMN).unwrap_or_default()
    }
}

/// CSV contact inventory with trimmed headers.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<InventoryRow>,
}

/// Addresses and rows selected by one scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub emails: AddressList,
    pub matched_rows: Vec<InventoryRow>,
    /// Set when the inventory file did not exist
    pub inventory_missing: bool,
}

impl Inventory {
    /// Load an inventory file. A missing file is not an error: it yields
    /// `Ok(None)` and a warning, since other recipient sources may exist.
    pub fn load(path: impl AsRef<Path>, diag: &dyn Diagnostics) -> Result<Option<Inventory>> {
        let path = path.as_ref();
        if !path.exists() {
            diag.warn(&format!("Inventory file not found: {}", path.display()));
            return Ok(None);
        }
        let file = std::fs::File::open(path).map_err(|e| CampaignError::io(path, e))?;
        Self::from_reader(path, file, diag).map(Some)
    }

    /// Parse CSV from any reader. Requires an `email` column; rows that fail
    /// to parse are skipped with a warning.
    pub fn from_reader<R: Read>(path: &Path, reader: R, diag: &dyn Diagnostics) -> Result<Inventory> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| CampaignError::Inventory {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if !headers.iter().any(|h| h == EMAIL_COLUMN) {
            return Err(CampaignError::MissingEmailColumn(path.to_path_buf()));
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            // Header is line 1
            let line = index + 2;
            match record {
                Ok(record) => {
                    let row = InventoryRow::from_pairs(
                        headers
                            .iter()
                            .zip(record.iter())
                            .map(|(h, v)| (h.clone(), v.to_string())),
                    );
                    rows.push(row);
                }
                Err(e) => diag.warn(&format!(
                    "Skipping unreadable row {line} in {}: {e}",
                    path.display()
                )),
            }
        }

        diag.debug(&format!(
            "Loaded {} rows with columns [{}] from {}",
            rows.len(),
            headers.join(", "),
            path.display()
        ));

        Ok(Inventory {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Names from `fields` that are not inventory columns, in input order
    pub fn unknown_columns<'a, I>(&self, fields: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields
            .into_iter()
            .filter(|f| !self.has_column(f))
            .map(str::to_string)
            .collect()
    }

    pub fn rows(&self) -> &[InventoryRow] {
        &self.rows
    }

    pub fn matching_rows<'a, F: RowFilter>(&'a self, filter: &'a F) -> impl Iterator<Item = &'a InventoryRow> + 'a {
        self.rows.iter().filter(move |row| filter.matches(row))
    }

    /// Collect validated addresses from every row the filter accepts.
    pub fn scan<F: RowFilter>(&self, filter: &F, diag: &dyn Diagnostics) -> ScanResult {
        let mut result = ScanResult::default();
        for (index, row) in self.rows.iter().enumerate() {
            if !filter.matches(row) {
                continue;
            }
            let origin = format!("{} row {}", self.path.display(), index + 2);
            let addresses = parse_address_cell(row.email_cell(), &origin, diag);
            if addresses.is_empty() {
                diag.warn(&format!("Matched row without a usable address ({origin})"));
            }
            result.emails.extend(addresses);
            result.matched_rows.push(row.clone());
        }
        diag.debug(&format!(
            "Scan of {} matched {} rows, {} unique addresses",
            self.path.display(),
            result.matched_rows.len(),
            result.emails.len()
        ));
        result
    }
}

/// Load-and-scan in one call. A missing inventory gives an empty result with
/// `inventory_missing` set.
pub fn scan_inventory<F: RowFilter>(path: impl AsRef<Path>, filter: &F, diag: &dyn Diagnostics) -> Result<ScanResult> {
    match Inventory::load(path, diag)? {
        Some(inventory) => Ok(inventory.scan(filter, diag)),
        None => Ok(ScanResult {
            inventory_missing: true,
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::filter::FilterSet;
    use std::io::Write;

    const CSV: &str = " email , department ,title\n\
        ann@example.com;ann.alt@example.com,Sales,Senior Manager\n\
        bob@example.com,Sales,Engineer\n\
        carol@example.com,Marketing,Manager\n\
        not-an-address;dave@example.com,Ops,Engineer\n";

    fn inventory(diag: &CollectingDiagnostics) -> Inventory {
        Inventory::from_reader(Path::new("inventory.csv"), CSV.as_bytes(), diag).unwrap()
    }

    #[test]
    fn test_headers_are_trimmed() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory(&diag);
        assert_eq!(inv.headers(), &["email", "department", "title"]);
        assert_eq!(inv.rows().len(), 4);
        assert_eq!(inv.rows()[0].get("department"), Some("Sales"));
        assert_eq!(
            inv.unknown_columns(["department", "site", "email"]),
            vec!["site".to_string()]
        );
    }

    #[test]
    fn test_scan_collects_and_validates_addresses() {
        let diag = CollectingDiagnostics::new();
        let inv = inventory(&diag);

        let filter = FilterSet::parse("department=sales").compile(&diag);
        let result = inv.scan(&filter, &diag);
        let emails: Vec<&str> = result.emails.iter().map(|e| e.as_str()).collect();
        assert_eq!(
            emails,
            vec!["ann@example.com", "ann.alt@example.com", "bob@example.com"]
        );
        assert_eq!(result.matched_rows.len(), 2);

        let filter = FilterSet::parse("department=ops").compile(&diag);
        let result = inv.scan(&filter, &diag);
        let emails: Vec<&str> = result.emails.iter().map(|e| e.as_str()).collect();
        assert_eq!(emails, vec!["dave@example.com"]);
        assert_eq!(diag.count_warnings("not-an-address"), 1);
    }

    #[test]
    fn test_missing_email_column_is_config_error() {
        let diag = CollectingDiagnostics::new();
        let err = Inventory::from_reader(Path::new("x.csv"), "name,dept\na,b\n".as_bytes(), &diag)
            .unwrap_err();
        assert!(matches!(err, CampaignError::MissingEmailColumn(_)));
    }

    #[test]
    fn test_missing_inventory_is_not_fatal() {
        let diag = CollectingDiagnostics::new();
        let dir = tempfile::tempdir().unwrap();
        let filter = FilterSet::parse("department=sales").compile(&diag);
        let result = scan_inventory(dir.path().join("nope.csv"), &filter, &diag).unwrap();
        assert!(result.inventory_missing);
        assert!(result.emails.is_empty());
        assert_eq!(diag.count_warnings("Inventory file not found"), 1);
    }

    #[test]
    fn test_load_from_disk() {
        let diag = CollectingDiagnostics::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let filter = FilterSet::parse("title=~manager").compile(&diag);
        let result = scan_inventory(file.path(), &filter, &diag).unwrap();
        assert!(!result.inventory_missing);
        assert_eq!(result.matched_rows.len(), 2);
        assert_eq!(result.emails.len(), 3);
    }

    #[test]
    fn test_short_rows_leave_columns_absent() {
        let diag = CollectingDiagnostics::new();
        let inv = Inventory::from_reader(
            Path::new("short.csv"),
            "email,department,region\nx@example.com,Sales\n".as_bytes(),
            &diag,
        )
        .unwrap();
        assert_eq!(inv.rows()[0].get("region"), None);

        let filter = FilterSet::parse("region!=eu").compile(&diag);
        assert!(inv.scan(&filter, &diag).emails.is_empty());
    }
}
