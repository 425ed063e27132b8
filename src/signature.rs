//! Payment signature (HMAC-SHA256)
//!
//! The provider signs `"{order_id}|{payment_id}"` with the account secret and
//! returns the lowercase hex digest alongside the payment.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::PaymentConfirmation;

type HmacSha256 = Hmac<Sha256>;

/// Canonical signing payload: order id and payment id joined by a single pipe.
pub fn signing_payload(provider_order_id: &str, provider_payment_id: &str) -> String {
    format!("{}|{}", provider_order_id, provider_payment_id)
}

/// Lowercase hex HMAC-SHA256 of the signing payload.
pub fn sign(secret: &str, provider_order_id: &str, provider_payment_id: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
    mac.update(signing_payload(provider_order_id, provider_payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a confirmation against the secret in constant time.
pub fn verify(secret: &str, confirmation: &PaymentConfirmation) -> bool {
    let expected = sign(
        secret,
        &confirmation.provider_order_id,
        &confirmation.provider_payment_id,
    );
    constant_time_eq(&expected, &confirmation.provider_signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation(signature: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            provider_order_id: "order_9A33XWu170gUtm".to_string(),
            provider_payment_id: "pay_29QQoUBi66xm2f".to_string(),
            provider_signature: signature.to_string(),
        }
    }

    #[test]
    fn payload_is_pipe_joined() {
        assert_eq!(signing_payload("order_1", "pay_1"), "order_1|pay_1");
    }

    #[test]
    fn sign_is_lowercase_hex_over_payload() {
        let digest = sign("key", "The quick brown fox jumps over the lazy dog", "");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"The quick brown fox jumps over the lazy dog|");
        assert_eq!(digest, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn hmac_sha256_reference_digest() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn valid_signature_verifies() {
        let sig = sign("secret", "order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f");
        assert!(verify("secret", &confirmation(&sig)));
    }

    #[test]
    fn tampered_or_wrong_secret_fails() {
        let sig = sign("secret", "order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f");

        assert!(!verify("other-secret", &confirmation(&sig)));
        assert!(!verify("secret", &confirmation(&sig.to_uppercase())));
        assert!(!verify("secret", &confirmation(&sig[..63])));
        assert!(!verify("secret", &confirmation("")));
    }
}
