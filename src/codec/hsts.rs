//! Strict-Transport-Security wire format.
//!
//! `max-age=15552000; includeSubDomains; preload`
//!
//! A flag token that is absent decodes to `None`. `Some(false)` only exists to
//! override an inherited `true` during merging and is written like `None`.

use crate::codec::CodecError;
use crate::policy::hsts::StrictTransportSecurity;

pub fn encode(hsts: &StrictTransportSecurity) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(max_age) = hsts.max_age {
        parts.push(format!("max-age={}", max_age));
    }
    if hsts.include_subdomains == Some(true) {
        parts.push("includeSubDomains".to_string());
    }
    if hsts.preload == Some(true) {
        parts.push("preload".to_string());
    }
    parts.join("; ")
}

pub fn decode(raw: &str) -> Result<StrictTransportSecurity, CodecError> {
    let mut hsts = StrictTransportSecurity {
        max_age: None,
        include_subdomains: None,
        preload: None,
    };

    for token in raw.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some((name, value)) = token.split_once('=') {
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return Err(CodecError::UnknownHstsToken(token.to_string()));
            }
            let value = value.trim().trim_matches('"');
            let max_age = value
                .parse::<u64>()
                .map_err(|_| CodecError::InvalidMaxAge(value.to_string()))?;
            hsts.max_age = Some(max_age);
        } else if token.eq_ignore_ascii_case("includeSubDomains") {
            hsts.include_subdomains = Some(true);
        } else if token.eq_ignore_ascii_case("preload") {
            hsts.preload = Some(true);
        } else {
            return Err(CodecError::UnknownHstsToken(token.to_string()));
        }
    }

    Ok(hsts)
}
