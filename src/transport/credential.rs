//! User id extraction from the bearer token.
//!
//! The token is not verified here; the server does that on connect. We only
//! need the `user_id` claim to build the per-user channel URL.

use crate::error::{NotifyError, Result};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Read the `user_id` claim from a JWT, with or without a `Bearer ` prefix.
pub fn user_id_from_token(token: &str) -> Result<String> {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(NotifyError::InvalidToken("expected header.payload.signature".into())),
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| NotifyError::InvalidToken(format!("payload is not base64: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| NotifyError::InvalidToken(format!("payload is not JSON: {e}")))?;

    match claims.get("user_id") {
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(NotifyError::InvalidToken("missing user_id claim".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(claims.as_bytes())
        )
    }

    #[test]
    fn test_numeric_user_id() {
        let token = token_with(r#"{"user_id":42,"exp":1}"#);
        assert_eq!(user_id_from_token(&token).unwrap(), "42");
        assert_eq!(
            user_id_from_token(&format!("Bearer {token}")).unwrap(),
            "42"
        );
    }

    #[test]
    fn test_string_user_id() {
        let token = token_with(r#"{"user_id":"u-7"}"#);
        assert_eq!(user_id_from_token(&token).unwrap(), "u-7");
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(matches!(
            user_id_from_token("not-a-jwt"),
            Err(NotifyError::InvalidToken(_))
        ));
        assert!(matches!(
            user_id_from_token("a.!!!.c"),
            Err(NotifyError::InvalidToken(_))
        ));
        assert!(matches!(
            user_id_from_token(&token_with(r#"{"sub":"x"}"#)),
            Err(NotifyError::InvalidToken(_))
        ));
    }
}
