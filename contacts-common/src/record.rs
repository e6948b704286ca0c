use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

/// Columns a row must carry, all non-empty, to become a `ContactRecord`.
pub const REQUIRED_COLUMNS: [&str; 3] = ["name", "email", "contact"];

/// A decoded row of the uploaded file, keyed by header name.
pub type RawRow = HashMap<String, String>;

/// A contact that passed validation.
/// `email` is the identity of a contact within the stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    pub email: String,
    pub contact: String,
}

impl ContactRecord {
    pub fn new(name: impl Into<String>, email: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            contact: contact.into(),
        }
    }

    /// Accept a row iff `name`, `email` and `contact` are all present and non-empty.
    /// Anything else is dropped without an error, other columns are ignored.
    pub fn from_row(row: &RawRow) -> Option<Self> {
        let field = |column: &str| row.get(column).filter(|value| !value.is_empty()).cloned();

        Some(Self {
            name: field("name")?,
            email: field("email")?,
            contact: field("contact")?,
        })
    }
}

/// A contact as held by storage, with the identity used for read ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub contact: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, &str)]) -> RawRow {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_accepts_complete_row() {
        let record = ContactRecord::from_row(&row(&[
            ("name", "Ada"),
            ("email", "ada@example.com"),
            ("contact", "555-0100"),
        ]));

        assert_eq!(
            record,
            Some(ContactRecord::new("Ada", "ada@example.com", "555-0100"))
        );
    }

    #[test]
    fn test_rejects_row_missing_any_required_column() {
        let complete = [
            ("name", "Ada"),
            ("email", "ada@example.com"),
            ("contact", "555-0100"),
        ];

        for missing in REQUIRED_COLUMNS {
            let fields: Vec<_> = complete
                .iter()
                .copied()
                .filter(|(k, _)| *k != missing)
                .collect();
            assert_eq!(ContactRecord::from_row(&row(&fields)), None, "{missing}");
        }
    }

    #[test]
    fn test_rejects_empty_values() {
        for empty in REQUIRED_COLUMNS {
            let fields: Vec<_> = [
                ("name", "Ada"),
                ("email", "ada@example.com"),
                ("contact", "555-0100"),
            ]
            .iter()
            .map(|(k, v)| if *k == empty { (*k, "") } else { (*k, *v) })
            .collect();
            assert_eq!(ContactRecord::from_row(&row(&fields)), None, "{empty}");
        }
    }

    #[test]
    fn test_ignores_extra_columns_and_keeps_whitespace() {
        let record = ContactRecord::from_row(&row(&[
            ("name", " "),
            ("email", "ada@example.com"),
            ("contact", "555-0100"),
            ("company", "Analytical Engines"),
        ]))
        .unwrap();

        assert_eq!(record.name, " ");
        assert_eq!(record.email, "ada@example.com");
    }
}
