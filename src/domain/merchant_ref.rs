//! Merchant reference generation and parsing.
//!
//! The canonical format is `INV{ts}{rand}_U{user_id}_Q{quantity}`, where
//! `ts` is a unix timestamp and `rand` a short hex suffix for uniqueness.
//! An older slash-delimited form `INV/{user_id}/{code}-{quantity}/...` still
//! exists in historical callback payloads, so the parser accepts both.

use chrono::Utc;
use uuid::Uuid;

/// Generates a fresh, globally unique merchant reference embedding the user
/// id and the purchased quantity. Never reused; a retried topup gets a new
/// reference.
pub fn generate(user_id: i64, quantity: i64) -> String {
    let ts = Utc::now().timestamp();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("INV{}{}_U{}_Q{}", ts, &suffix[..6], user_id, quantity)
}

/// Extracts `(user_id, quantity)` from either merchant reference format.
pub fn parse(merchant_ref: &str) -> Option<(i64, i64)> {
    if let Some(rest) = merchant_ref.strip_prefix("INV/") {
        // Legacy form: INV/{user_id}/{code}-{quantity}/...
        let mut parts = rest.split('/');
        let user_id: i64 = parts.next()?.parse().ok()?;
        let item = parts.next()?;
        let quantity: i64 = item.rsplit_once('-')?.1.parse().ok()?;
        return Some((user_id, quantity));
    }

    // Canonical form: ..._U{user_id}_Q{quantity}
    let (rest, qty_part) = merchant_ref.rsplit_once("_Q")?;
    let quantity: i64 = qty_part.parse().ok()?;
    let (_, user_part) = rest.rsplit_once("_U")?;
    let user_id: i64 = user_part.parse().ok()?;
    Some((user_id, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_parse_round_trip() {
        for (user_id, quantity) in [(1, 1), (42, 5), (987654, 25)] {
            let reference = generate(user_id, quantity);
            assert_eq!(parse(&reference), Some((user_id, quantity)));
        }
    }

    #[test]
    fn test_generated_refs_are_unique() {
        let a = generate(7, 3);
        let b = generate(7, 3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_legacy_slash_format() {
        assert_eq!(parse("INV/42/WIN2022-5/20240115"), Some((42, 5)));
        assert_eq!(parse("INV/9/STD-1/x"), Some((9, 1)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("INV123"), None);
        assert_eq!(parse("INV/notanumber/X-5/y"), None);
        assert_eq!(parse("INV170000000_U1_Qfive"), None);
    }
}
