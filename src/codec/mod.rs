//! Conversion between structured policy values and header strings.
//!
//! # Responsibilities
//! - `encode`: structured value → wire string
//! - `decode`: wire string → structured value (inverse of `encode`)
//!
//! # Design Decisions
//! - Pure functions, no allocation beyond the output
//! - Only CSP, Permissions-Policy and HSTS have a structured form; every other
//!   key round-trips as an opaque string
//! - `Disabled` has no wire form; `encode` returns `None` for it

pub mod csp;
pub mod hsts;
pub mod permissions;

use crate::policy::{HeaderKey, PolicyValue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid max-age value `{0}`")]
    InvalidMaxAge(String),

    #[error("unknown HSTS token `{0}`")]
    UnknownHstsToken(String),

    #[error("malformed Permissions-Policy entry `{0}`")]
    MalformedPermission(String),
}

/// Encode a value for `key`. Returns `None` when the header is disabled.
pub fn encode(_key: HeaderKey, value: &PolicyValue) -> Option<String> {
    match value {
        PolicyValue::Disabled => None,
        PolicyValue::Text(text) => Some(text.clone()),
        PolicyValue::Csp(directives) => Some(csp::encode(directives)),
        PolicyValue::Permissions(policy) => Some(permissions::encode(policy)),
        PolicyValue::Hsts(hsts) => Some(hsts::encode(hsts)),
    }
}

/// Decode a header string into the value representation used for `key`.
pub fn decode(key: HeaderKey, raw: &str) -> Result<PolicyValue, CodecError> {
    match key {
        HeaderKey::ContentSecurityPolicy => Ok(PolicyValue::Csp(csp::decode(raw))),
        HeaderKey::PermissionsPolicy => permissions::decode(raw).map(PolicyValue::Permissions),
        HeaderKey::StrictTransportSecurity => hsts::decode(raw).map(PolicyValue::Hsts),
        _ => Ok(PolicyValue::Text(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::defaults::default_headers;

    #[test]
    fn test_round_trip_defaults() {
        for (key, value) in default_headers().iter() {
            let encoded = encode(*key, value).unwrap();
            assert_eq!(&decode(*key, &encoded).unwrap(), value, "round trip for {}", key);
        }
    }

    #[test]
    fn test_disabled_has_no_wire_form() {
        assert_eq!(encode(HeaderKey::XFrameOptions, &PolicyValue::Disabled), None);
    }

    #[test]
    fn test_passthrough() {
        let value = decode(HeaderKey::ReferrerPolicy, "no-referrer, strict-origin").unwrap();
        assert_eq!(value, PolicyValue::Text("no-referrer, strict-origin".into()));
    }
}
