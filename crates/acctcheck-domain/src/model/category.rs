//! Source categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A named group of identity checks against one backing source.
///
/// The wire names are exactly the variant names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Category {
    /// Accounts in the relational account table.
    DbUsers,
    /// Identities in the cloud identity provider.
    IamUsers,
    /// Operating system accounts listed in the object store.
    OsUsers,
    /// Active Directory accounts (directory stand-in).
    AdUsers,
    /// LDAP accounts (directory stand-in).
    LdapUsers,
}

impl Category {
    /// Every category, in wire order.
    pub const ALL: [Category; 5] = [
        Category::DbUsers,
        Category::IamUsers,
        Category::OsUsers,
        Category::AdUsers,
        Category::LdapUsers,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DbUsers => "DbUsers",
            Category::IamUsers => "IamUsers",
            Category::OsUsers => "OsUsers",
            Category::AdUsers => "AdUsers",
            Category::LdapUsers => "LdapUsers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCategory {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
            assert_eq!(
                serde_json::to_string(&category).unwrap(),
                format!("\"{}\"", category.as_str())
            );
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = "dbusers".parse::<Category>().unwrap_err();
        assert_eq!(
            err,
            DomainError::UnknownCategory {
                name: "dbusers".to_string()
            }
        );
    }
}
