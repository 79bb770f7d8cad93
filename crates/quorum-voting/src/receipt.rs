use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;

const RECEIPT_BYTES: usize = 24;

/// Opaque proof-of-participation token handed to the caster.
///
/// Random, so it never encodes the unit or the chosen option.
pub fn new_receipt_id() -> String {
    let mut bytes = [0u8; RECEIPT_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn receipts_are_url_safe_and_distinct() {
        let receipts: HashSet<String> = (0..256).map(|_| new_receipt_id()).collect();
        assert_eq!(receipts.len(), 256);
        for r in &receipts {
            assert_eq!(r.len(), 32);
            assert!(r.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
