use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

/// The subject used when the token doesn't name one.
pub const GUEST: &str = "guest";

#[derive(Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Extracts the `sub` claim of a JWT.
///
/// The signature isn't verified, the coordinator does that on every request. The subject only
/// picks the local store directory.
///
/// # Arguments
/// * `token` - The bearer token.
///
/// # Returns
/// The token's subject, or `GUEST` if the token is malformed or has none.
pub fn token_subject(token: &str) -> String {
    token
        .split('.')
        .nth(1)
        .and_then(|payload| URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok())
        .and_then(|json| serde_json::from_slice::<Claims>(&json).ok())
        .and_then(|claims| claims.sub)
        .filter(|sub| !sub.is_empty())
        .unwrap_or_else(|| GUEST.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(claims: &str) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims))
    }

    #[test]
    fn subject_comes_from_the_payload() {
        assert_eq!(token_subject(&token(r#"{"sub":"alice","exp":1}"#)), "alice");
    }

    #[test]
    fn missing_subject_falls_back_to_guest() {
        assert_eq!(token_subject(&token(r#"{"exp":1}"#)), GUEST);
        assert_eq!(token_subject("not-a-jwt"), GUEST);
        assert_eq!(token_subject("a.!!!.c"), GUEST);
    }
}
