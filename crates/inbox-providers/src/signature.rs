use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies an `X-Hub-Signature-256: sha256=<hex>` header against the raw
/// request body, the shape both providers in this system use.
pub fn verify_hub_signature(app_secret: &str, header_value: Option<&str>, body: &[u8]) -> bool {
    let Some(header_value) = header_value else {
        return false;
    };
    let Some(provided_hex) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    provided.len() == expected.len() && provided.ct_eq(&expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"entry":[]}"#;
        let sig = sign("secret", body);
        assert!(verify_hub_signature("secret", Some(&sig), body));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"entry":[]}"#;
        let sig = sign("other-secret", body);
        assert!(!verify_hub_signature("secret", Some(&sig), body));
    }

    #[test]
    fn rejects_single_byte_alteration_of_body() {
        let body = br#"{"entry":[]}"#;
        let sig = sign("secret", body);
        let mut altered = body.to_vec();
        altered[0] = b'[';
        assert!(!verify_hub_signature("secret", Some(&sig), &altered));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!verify_hub_signature("secret", None, b"{}"));
    }

    #[test]
    fn rejects_header_without_sha256_prefix() {
        assert!(!verify_hub_signature("secret", Some("deadbeef"), b"{}"));
    }
}
