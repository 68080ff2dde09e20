//! Bearer token inspection.
//!
//! The client never holds the signing secret, so the payload is decoded
//! with signature checks turned off and only the expiry is judged here.
//! The backends remain the authority on whether a token is genuine.

use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

use crate::models::TokenClaims;

/// Outcome of inspecting the current token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid(TokenClaims),
    /// No session
    Missing,
    Expired,
    /// Not decodable, or no `exp` claim
    Invalid,
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid(_))
    }

    /// Expired and undecodable tokens both end the session.
    pub fn forces_logout(&self) -> bool {
        matches!(self, TokenStatus::Expired | TokenStatus::Invalid)
    }
}

pub fn decode_claims(token: &str) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    let header = decode_header(token)?;
    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    // Expiry is judged by classify() against our own clock, with no leeway
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Classify `token` at instant `now` (seconds since epoch). `exp == now` is expired.
pub fn classify(token: &str, now: i64) -> TokenStatus {
    if token.is_empty() {
        return TokenStatus::Missing;
    }
    match decode_claims(token) {
        Ok(claims) if claims.exp > now => TokenStatus::Valid(claims),
        Ok(_) => TokenStatus::Expired,
        Err(_) => TokenStatus::Invalid,
    }
}

pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
