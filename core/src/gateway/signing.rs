// verdant/src/gateway/signing.rs

//! Keyed hashing and query encoding shared by the gateway adapters.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

/// Form-style percent encoding: space becomes `+`, only `*-._` and
/// alphanumerics pass through unescaped.
pub fn url_encode(value: &str) -> String {
  url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `encode(k)=encode(v)` pairs joined with `&`, in key order, skipping empty values.
/// This is both the VNPay signing input and the query string of the redirect URL.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
  params
    .iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}={}", url_encode(k), url_encode(v)))
    .collect::<Vec<_>>()
    .join("&")
}

pub fn hmac_sha512_hex(secret: &str, data: &str) -> String {
  // HMAC accepts keys of any length, so construction cannot fail.
  let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
  mac.update(data.as_bytes());
  hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha256_hex(secret: &str, data: &str) -> String {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
  mac.update(data.as_bytes());
  hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex HMAC-SHA512 in constant time. Hex case is ignored.
pub fn verify_hmac_sha512_hex(secret: &str, data: &str, supplied_hex: &str) -> bool {
  let Ok(supplied) = hex::decode(supplied_hex.trim()) else {
    return false;
  };
  let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
  mac.update(data.as_bytes());
  mac.verify_slice(&supplied).is_ok()
}
