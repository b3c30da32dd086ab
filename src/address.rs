use crate::diagnostics::Diagnostics;
use crate::error::AddressError;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

pub const MAX_ADDRESS_LENGTH: usize = 320;

/// Characters that must never reach the MTA command line
const UNSAFE_CHARACTERS: [char; 4] = ['|', '`', '$', '\\'];

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9!#%&'*+/=?^_{}~-]+(\.[A-Za-z0-9!#%&'*+/=?^_{}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$",
        )
        .expect("address pattern is valid")
    })
}

/// A validated e-mail address. Identity is case-insensitive, the original
/// casing is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let candidate = raw.trim();
        if candidate.chars().count() > MAX_ADDRESS_LENGTH {
            return Err(AddressError::TooLong {
                max: MAX_ADDRESS_LENGTH,
            });
        }
        if let Some(c) = candidate.chars().find(|c| UNSAFE_CHARACTERS.contains(c)) {
            return Err(AddressError::UnsafeCharacter(c));
        }
        if !address_pattern().is_match(candidate) {
            return Err(AddressError::Malformed);
        }
        Ok(EmailAddress(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used for deduplication
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or_default()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split a cell or list entry into address tokens. `;` is the canonical
/// separator, `,` is accepted too.
pub fn split_addresses(cell: &str) -> impl Iterator<Item = &str> {
    cell.split([';', ','])
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Parse every token in `cell`, dropping (and reporting) invalid ones.
pub fn parse_address_cell(cell: &str, origin: &str, diag: &dyn Diagnostics) -> Vec<EmailAddress> {
    let mut addresses = Vec::new();
    for token in split_addresses(cell) {
        match EmailAddress::parse(token) {
            Ok(address) => addresses.push(address),
            Err(e) => diag.warn(&format!("Skipping invalid address '{token}' ({origin}): {e}")),
        }
    }
    addresses
}

/// Ordered, case-insensitively deduplicated address list. The first casing
/// seen for an address wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressList {
    addresses: Vec<EmailAddress>,
    seen: HashSet<String>,
}

impl AddressList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an equivalent address was already present
    pub fn push(&mut self, address: EmailAddress) -> bool {
        if self.seen.insert(address.key()) {
            self.addresses.push(address);
            true
        } else {
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = EmailAddress>>(&mut self, addresses: I) {
        for address in addresses {
            self.push(address);
        }
    }

    pub fn contains(&self, address: &EmailAddress) -> bool {
        self.seen.contains(&address.key())
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EmailAddress> {
        self.addresses.iter()
    }

    pub fn as_slice(&self) -> &[EmailAddress] {
        &self.addresses
    }

    pub fn into_vec(self) -> Vec<EmailAddress> {
        self.addresses
    }
}

impl FromIterator<EmailAddress> for AddressList {
    fn from_iter<I: IntoIterator<Item = EmailAddress>>(iter: I) -> Self {
        let mut list = AddressList::new();
        list.extend(iter);
        list
    }
}

impl<'a> IntoIterator for &'a AddressList {
    type Item = &'a EmailAddress;
    type IntoIter = std::slice::Iter<'a, EmailAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.iter()
    }
}

/// Merge `additional` into `base`. Base entries come first and win on a
/// case-insensitive collision.
pub fn merge_recipients(base: &[EmailAddress], additional: &[EmailAddress]) -> Vec<EmailAddress> {
    let mut merged: AddressList = base.iter().cloned().collect();
    merged.extend(additional.iter().cloned());
    merged.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    #[test]
    fn test_valid_addresses() {
        assert!(EmailAddress::parse("alice@example.com").is_ok());
        assert!(EmailAddress::parse("o'brien+ops@mail.example.co.uk").is_ok());
        assert_eq!(addr("  bob@example.org ").as_str(), "bob@example.org");
        assert_eq!(addr("Bob@Example.ORG").domain(), "Example.ORG");
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(
            EmailAddress::parse("no-at-sign.example.com"),
            Err(AddressError::Malformed)
        );
        assert_eq!(
            EmailAddress::parse("a@b"),
            Err(AddressError::Malformed)
        );
        assert_eq!(
            EmailAddress::parse("evil$(id)@example.com"),
            Err(AddressError::UnsafeCharacter('$'))
        );
        assert_eq!(
            EmailAddress::parse("a|b@example.com"),
            Err(AddressError::UnsafeCharacter('|'))
        );
        assert_eq!(
            EmailAddress::parse("a`b@example.com"),
            Err(AddressError::UnsafeCharacter('`'))
        );

        let long = format!("{}@example.com", "a".repeat(320));
        assert_eq!(
            EmailAddress::parse(&long),
            Err(AddressError::TooLong { max: 320 })
        );
    }

    #[test]
    fn test_parse_address_cell_skips_invalid() {
        let diag = CollectingDiagnostics::new();
        let parsed = parse_address_cell(
            "a@x.com; not-an-address ;b@x.com,c@x.com;",
            "row 2",
            &diag,
        );
        let parsed: Vec<&str> = parsed.iter().map(|a| a.as_str()).collect();
        assert_eq!(parsed, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert_eq!(diag.count_warnings("not-an-address"), 1);
    }

    #[test]
    fn test_merge_recipients_dedup_and_order() {
        let base = vec![addr("a@x.com"), addr("B@x.com")];
        let additional = vec![addr("b@x.com"), addr("c@x.com")];
        let merged = merge_recipients(&base, &additional);
        let merged: Vec<&str> = merged.iter().map(|a| a.as_str()).collect();
        assert_eq!(merged, vec!["a@x.com", "B@x.com", "c@x.com"]);
    }

    #[test]
    fn test_address_list_first_casing_wins() {
        let mut list = AddressList::new();
        assert!(list.push(addr("Ops@Example.com")));
        assert!(!list.push(addr("ops@example.com")));
        assert_eq!(list.len(), 1);
        assert_eq!(list.as_slice()[0].as_str(), "Ops@Example.com");
        assert!(list.contains(&addr("OPS@EXAMPLE.COM")));
    }
}
