use jsonwebtoken::{DecodingKey, Validation, decode};

use quorum_types::api::Claims;
use quorum_types::models::Identity;

/// Verify an HS256 bearer token and return the identity it carries.
pub fn decode_identity(token: &str, secret: &str) -> Result<Identity, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.identity())
}
