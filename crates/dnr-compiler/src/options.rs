use serde::{Deserialize, Serialize};

use crate::error::ConverterOptionsError;

/// Settings for one conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverterOptions {
    /// Extension-relative directory holding redirect resources, e.g. `/war/redirects`.
    pub resources_path: Option<String>,
    pub max_number_of_rules: Option<usize>,
    pub max_number_of_unsafe_rules: Option<usize>,
    pub max_number_of_regexp_rules: Option<usize>,
}

impl ConverterOptions {
    pub fn validate(&self) -> Result<(), ConverterOptionsError> {
        if self.max_number_of_rules == Some(0) {
            return Err(ConverterOptionsError::ZeroRuleLimit);
        }

        if let Some(path) = &self.resources_path {
            if !path.starts_with('/') || path.ends_with('/') {
                return Err(ConverterOptionsError::MalformedResourcesPath(path.clone()));
            }
        }

        Ok(())
    }
}
