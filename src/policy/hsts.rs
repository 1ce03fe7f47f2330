//! Structured Strict-Transport-Security.

use serde::{Deserialize, Serialize};

use crate::policy::merge::Merge;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct StrictTransportSecurity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_subdomains: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload: Option<bool>,
}

impl StrictTransportSecurity {
    pub fn new(max_age: u64, include_subdomains: bool, preload: bool) -> Self {
        Self {
            max_age: Some(max_age),
            include_subdomains: Some(include_subdomains),
            preload: Some(preload),
        }
    }
}

impl Merge for StrictTransportSecurity {
    fn merge(&mut self, upper: &Self) {
        self.max_age.merge(&upper.max_age);
        self.include_subdomains.merge(&upper.include_subdomains);
        self.preload.merge(&upper.preload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fieldwise_merge() {
        let mut lower = StrictTransportSecurity::new(15552000, true, false);
        let upper = StrictTransportSecurity {
            max_age: Some(60),
            ..Default::default()
        };
        lower.merge(&upper);
        assert_eq!(lower, StrictTransportSecurity::new(60, true, false));
    }
}
