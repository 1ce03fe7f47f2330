//! Permissions-Policy wire format.
//!
//! `camera=(), geolocation=(self "https://maps.example"), fullscreen=*`

use crate::codec::CodecError;
use crate::policy::permissions::{PermissionValue, PermissionsPolicy};

pub fn encode(policy: &PermissionsPolicy) -> String {
    policy
        .iter()
        .map(|(feature, value)| match value {
            PermissionValue::Allowlist(origins) => format!("{}=({})", feature, origins.join(" ")),
            PermissionValue::Token(token) => format!("{}={}", feature, token),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn decode(raw: &str) -> Result<PermissionsPolicy, CodecError> {
    let mut policy = PermissionsPolicy::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (feature, value) = entry
            .split_once('=')
            .ok_or_else(|| CodecError::MalformedPermission(entry.to_string()))?;
        let feature = feature.trim();
        let value = value.trim();
        if feature.is_empty() {
            return Err(CodecError::MalformedPermission(entry.to_string()));
        }

        let value = match value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            Some(inner) => {
                PermissionValue::Allowlist(inner.split_whitespace().map(str::to_string).collect())
            }
            None => PermissionValue::Token(value.to_string()),
        };
        policy.insert(feature, value);
    }

    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::permissions::deny;

    #[test]
    fn test_encode() {
        let policy = PermissionsPolicy::new()
            .with("camera", deny())
            .with(
                "geolocation",
                PermissionValue::Allowlist(vec!["self".into(), "\"https://maps.example\"".into()]),
            )
            .with("fullscreen", PermissionValue::Token("*".into()));
        assert_eq!(
            encode(&policy),
            "camera=(), geolocation=(self \"https://maps.example\"), fullscreen=*"
        );
    }

    #[test]
    fn test_round_trip() {
        let policy = PermissionsPolicy::new()
            .with("microphone", deny())
            .with("payment", PermissionValue::Allowlist(vec!["self".into()]))
            .with("usb", PermissionValue::Token("*".into()));
        assert_eq!(decode(&encode(&policy)).unwrap(), policy);
    }

    #[test]
    fn test_malformed_entry() {
        assert!(matches!(
            decode("camera"),
            Err(CodecError::MalformedPermission(_))
        ));
    }
}
