use glob::Pattern;

use crate::error::ConfigError;

/// Group used for records whose category matches no configured filter.
pub const DEFAULT_GROUP_NAME: &str = "Default";

/// One configured group: a name plus the category globs that select it.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GroupOption {
    pub group_name: String,
    pub category_name_filters: Vec<String>,
}

impl GroupOption {
    pub fn new<I, S>(group_name: impl Into<String>, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_name: group_name.into(),
            category_name_filters: filters.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps a category name to a group; the first group with a matching filter
/// wins.
#[derive(Debug, Clone, Default)]
pub struct GroupClassifier {
    groups: Vec<(String, Vec<Pattern>)>,
}

impl GroupClassifier {
    pub fn new(options: &[GroupOption]) -> Result<Self, ConfigError> {
        let mut groups = Vec::with_capacity(options.len());
        for option in options {
            let mut patterns = Vec::with_capacity(option.category_name_filters.len());
            for filter in &option.category_name_filters {
                let pattern =
                    Pattern::new(filter).map_err(|source| ConfigError::InvalidCategoryFilter {
                        group: option.group_name.clone(),
                        filter: filter.clone(),
                        source,
                    })?;
                patterns.push(pattern);
            }
            groups.push((option.group_name.clone(), patterns));
        }
        Ok(Self { groups })
    }

    pub fn classify(&self, category: &str) -> &str {
        self.groups
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.matches(category)))
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_GROUP_NAME)
    }
}
