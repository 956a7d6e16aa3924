//! Binance request signing.
//!
//! Signed endpoints take an HMAC-SHA256 of the URL-encoded query string,
//! keyed with the API secret, appended as the `signature` parameter.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build a URL-encoded, HMAC-SHA256-signed query string.
///
/// Joins `(key, value)` pairs with `&`, signs the result and appends
/// `&signature=<hex>`. `params` must already include `timestamp`.
pub fn build_signed_query(params: &[(&str, &str)], secret: &str) -> String {
    let query = encode_query(params);
    let signature = hmac_sha256_sign(secret, &query);
    format!("{query}&signature={signature}")
}

/// URL-encode and join parameters without signing.
pub fn encode_query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
