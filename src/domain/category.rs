//! The fixed recognition-logic category table.
//!
//! Categories are immutable domain configuration: seven identifiers with a
//! short English name and a one-line definition. Everything that needs to
//! enumerate, name, or describe a category goes through [`CATEGORIES`] so
//! that parsing and reporting never branch on individual ids.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Static description of one category
#[derive(Debug, Clone, Copy)]
pub struct CategoryInfo {
    /// Identifier (1-based)
    pub id: u8,
    /// Short English name
    pub name: &'static str,
    /// Natural-language definition
    pub description: &'static str,
}

/// The seven recognition logics, indexed by `id - 1`
pub static CATEGORIES: [CategoryInfo; 7] = [
    CategoryInfo {
        id: 1,
        name: "Vernacular Spatial Authority",
        description: "Shared, habitual or historically sedimented perceptions of which city areas count as local, independent of official boundaries.",
    },
    CategoryInfo {
        id: 2,
        name: "Administrative Legitimacy",
        description: "Claims grounded in official jurisdiction, household registration, or administrative redistricting.",
    },
    CategoryInfo {
        id: 3,
        name: "Family Rootedness",
        description: "Legitimacy assessed by the generational depth of family settlement, ancestry, or growing up in the place.",
    },
    CategoryInfo {
        id: 4,
        name: "Linguistic-Cultural Recognition",
        description: "Dialect, accent, or local cultural habits used as boundary markers of insider status.",
    },
    CategoryInfo {
        id: 5,
        name: "Functional Livability",
        description: "Areas evaluated through infrastructure such as transport, housing, education, and services.",
    },
    CategoryInfo {
        id: 6,
        name: "Social Embeddedness",
        description: "Integration into local social circles and ownership of local assets such as inherited property.",
    },
    CategoryInfo {
        id: 7,
        name: "Occupational Typification",
        description: "Areas linked to dominant occupational groups, sketching implicit hierarchies of class and worth.",
    },
];

/// A recognition-logic category identifier.
///
/// Only values present in [`CATEGORIES`] can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category(u8);

impl Category {
    /// Look up a category by id, returning `None` outside the fixed table
    pub fn new(id: u32) -> Option<Self> {
        CATEGORIES
            .iter()
            .find(|info| u32::from(info.id) == id)
            .map(|info| Category(info.id))
    }

    /// All categories in id order
    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORIES.iter().map(|info| Category(info.id))
    }

    /// Numeric identifier
    pub fn id(self) -> u8 {
        self.0
    }

    /// Static table entry for this category
    pub fn info(self) -> &'static CategoryInfo {
        &CATEGORIES[usize::from(self.0) - 1]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Report tag such as `RL4`
    pub fn tag(self) -> String {
        format!("RL{}", self.0)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RL{}", self.0)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = u8::deserialize(deserializer)?;
        Category::new(u32::from(id))
            .ok_or_else(|| serde::de::Error::custom(format!("unknown category id {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_dense() {
        for (index, info) in CATEGORIES.iter().enumerate() {
            assert_eq!(usize::from(info.id), index + 1);
        }
    }

    #[test]
    fn test_lookup_bounds() {
        assert!(Category::new(0).is_none());
        assert!(Category::new(8).is_none());
        assert_eq!(Category::new(7).unwrap().name(), "Occupational Typification");
        assert_eq!(Category::all().count(), 7);
    }

    #[test]
    fn test_display_tag() {
        let category = Category::new(4).unwrap();
        assert_eq!(category.to_string(), "RL4");
        assert_eq!(category.tag(), "RL4");
    }
}
