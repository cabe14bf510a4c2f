// verdant/src/orders/number.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// `ORD` + `yyyyMMddHHmmss` + a four digit tie-breaker, e.g. `ORD202410051432070042`.
///
/// Uniqueness is enforced by the store; callers regenerate on collision.
pub fn generate(now: DateTime<Utc>) -> String {
  format!("{}{}{:04}", ORDER_NUMBER_PREFIX, now.format("%Y%m%d%H%M%S"), tie_breaker())
}

/// Four decimal digits that separate references minted in the same second.
pub(crate) fn tie_breaker() -> u32 {
  (Uuid::new_v4().as_u128() % 10_000) as u32
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn number_has_prefix_timestamp_and_suffix() {
    let at = Utc.with_ymd_and_hms(2024, 10, 5, 14, 32, 7).unwrap();
    let n = generate(at);
    assert!(n.starts_with("ORD20241005143207"));
    assert_eq!(n.len(), 3 + 14 + 4);
    assert!(n[17..].chars().all(|c| c.is_ascii_digit()));
  }
}
