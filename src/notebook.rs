//! Notebooks and the fixed PARA taxonomy they are organized by.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{generate_id, NotoError};

/// Projects/Areas/Resources/Archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParaCategory {
    Projects,
    Areas,
    Resources,
    Archive,
}

impl ParaCategory {
    pub const ALL: [ParaCategory; 4] = [
        ParaCategory::Projects,
        ParaCategory::Areas,
        ParaCategory::Resources,
        ParaCategory::Archive,
    ];

    /// The id of the category, which is also the id of its default notebook.
    pub fn id(self) -> &'static str {
        match self {
            ParaCategory::Projects => "projects",
            ParaCategory::Areas => "areas",
            ParaCategory::Resources => "resources",
            ParaCategory::Archive => "archive",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParaCategory::Projects => "Projects",
            ParaCategory::Areas => "Areas",
            ParaCategory::Resources => "Resources",
            ParaCategory::Archive => "Archive",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ParaCategory::Projects => "#ef6a6a",
            ParaCategory::Areas => "#efb86a",
            ParaCategory::Resources => "#6aef8a",
            ParaCategory::Archive => "#8a8aa0",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ParaCategory::Projects => "rocket",
            ParaCategory::Areas => "compass",
            ParaCategory::Resources => "book-open",
            ParaCategory::Archive => "archive",
        }
    }
}

impl fmt::Display for ParaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ParaCategory {
    type Err = NotoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParaCategory::ALL
            .into_iter()
            .find(|c| c.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NotoError::InvalidFormat {
                message: format!(
                    "Unknown PARA category: {}. Must be one of: projects, areas, resources, archive",
                    s
                ),
            })
    }
}

/// Returns true for the four system notebooks, which cannot be deleted or
/// moved to another category.
pub fn is_default_notebook(id: &str) -> bool {
    ParaCategory::ALL.iter().any(|c| c.id() == id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub para_category: ParaCategory,
    pub created_at: DateTime<Utc>,
}

impl Notebook {
    /// A user notebook styled after its category.
    pub fn new(name: impl Into<String>, category: ParaCategory) -> Self {
        Notebook {
            id: generate_id(),
            name: name.into(),
            color: category.color().to_string(),
            icon: category.icon().to_string(),
            para_category: category,
            created_at: Utc::now(),
        }
    }

    /// The system notebook for a category.
    pub fn default_for(category: ParaCategory) -> Self {
        Notebook {
            id: category.id().to_string(),
            name: category.name().to_string(),
            color: category.color().to_string(),
            icon: category.icon().to_string(),
            para_category: category,
            created_at: Utc::now(),
        }
    }

    pub fn defaults() -> Vec<Notebook> {
        ParaCategory::ALL.into_iter().map(Notebook::default_for).collect()
    }

    pub fn is_default(&self) -> bool {
        is_default_notebook(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_defaults_one_per_category() {
        let defaults = Notebook::defaults();
        assert_eq!(defaults.len(), 4);
        assert!(defaults.iter().all(Notebook::is_default));
        assert!(defaults.iter().all(|nb| nb.id == nb.para_category.id()));
    }

    #[test]
    fn user_notebooks_take_category_styling() {
        let nb = Notebook::new("Garden", ParaCategory::Areas);
        assert!(!nb.is_default());
        assert_eq!(nb.color, "#efb86a");
        assert_eq!(nb.icon, "compass");
    }

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!("Archive".parse::<ParaCategory>().unwrap(), ParaCategory::Archive);
        assert!("inbox".parse::<ParaCategory>().is_err());
        let value = serde_json::to_value(ParaCategory::Resources).unwrap();
        assert_eq!(value, "resources");
    }
}
