//! Shared domain types: the daemon's service credential and reload targets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The dedicated account the daemon authenticates with after bootstrap.
///
/// Persisted verbatim to `{DATA_DIR}/serviceaccount.json`; once written the
/// triple is never changed for the lifetime of that file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredential {
    pub email: String,
    pub login: String,
    pub password: String,
}

/// Configuration domain that can be reloaded independently on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadTarget {
    Dashboards,
    Datasources,
}

impl ReloadTarget {
    /// Every target, in a stable order.
    pub const ALL: [ReloadTarget; 2] = [ReloadTarget::Dashboards, ReloadTarget::Datasources];

    /// Name of the provisioning subdirectory (and API segment) for this target.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTarget::Dashboards => "dashboards",
            ReloadTarget::Datasources => "datasources",
        }
    }
}

impl fmt::Display for ReloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_file_shape() {
        let cred = ServiceCredential {
            email: "abc@provsync".to_string(),
            login: "provsync-abc".to_string(),
            password: "s3cret".to_string(),
        };
        let value = serde_json::to_value(&cred).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"email": "abc@provsync", "login": "provsync-abc", "password": "s3cret"})
        );
    }

    #[test]
    fn target_names() {
        assert_eq!(ReloadTarget::Dashboards.to_string(), "dashboards");
        assert_eq!(ReloadTarget::Datasources.as_str(), "datasources");
        assert_eq!(ReloadTarget::ALL.len(), 2);
    }
}
