use crate::model::columns::{build_row, Row, UserColumn};
use serde::{Deserialize, Serialize};

/// A person who files kamling contributions. `phone` is the natural key.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub name: String,
    pub phone: String,
}

impl User {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
        }
    }

    /// Reads a user from a `Users` sheet row. Rows without a phone are not users.
    pub(crate) fn from_row(row: Row<'_>) -> Option<Self> {
        let phone = row.get(UserColumn::Phone)?;
        Some(Self {
            name: row.text(UserColumn::Name),
            phone: phone.to_string(),
        })
    }

    /// The `Users` sheet row for this user, stamped with `created_at`.
    pub(crate) fn to_row(&self, created_at: &str) -> Vec<String> {
        build_row(&UserColumn::ALL, |col| match col {
            UserColumn::Name => self.name.clone(),
            UserColumn::Phone => self.phone.clone(),
            UserColumn::CreatedAt => created_at.to_string(),
        })
    }

    /// See [`phone_key`].
    pub fn phone_key(&self) -> String {
        phone_key(&self.phone)
    }
}

/// Reduces a phone number to the digits that identify it. Sheets parses a `USER_ENTERED`
/// `+6281...` into the number `6281...`, and a leading `0` is dropped the same way, so remote
/// cells are compared on digits with leading zeros removed.
pub fn phone_key(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.trim_start_matches('0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_key() {
        assert_eq!(phone_key("+6281234567890"), "6281234567890");
        assert_eq!(phone_key("6281234567890"), "6281234567890");
        assert_eq!(phone_key("0812-3456-7890"), "81234567890");
        assert_eq!(phone_key(""), "");
    }

    #[test]
    fn test_user_row() {
        let user = User::new("Ronald", "+6281234567890");
        let row = user.to_row("1 Jan 2026");
        assert_eq!(row, vec!["Ronald", "+6281234567890", "1 Jan 2026"]);
        assert_eq!(User::from_row(Row::new(&row)), Some(user));
    }

    #[test]
    fn test_user_row_without_phone() {
        let row = vec!["Ronald".to_string()];
        assert_eq!(User::from_row(Row::new(&row)), None);
    }
}
