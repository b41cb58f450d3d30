//! HMAC-SHA256 verification of inbound webhook bodies.
//!
//! The gateway signs the raw request body with the shared webhook secret and
//! sends the lowercase hex digest in a header. The body must be verified
//! byte-for-byte before it is parsed.

use hmac::{Hmac, Mac};
use log::{trace, warn};
use sha2::Sha256;

use crate::config::Secret;
use crate::domain::errors::DomainError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    /// Hex-encoded HMAC of `payload`; what a correctly signed request carries.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` against the payload in constant time.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), DomainError> {
        let Some(signature) = signature else {
            warn!("🔐️ No webhook signature found in request. Denying access.");
            return Err(DomainError::InvalidSignature);
        };
        let expected = hex::decode(signature.trim()).map_err(|_| {
            warn!("🔐️ Webhook signature is not valid hex. Denying access.");
            DomainError::InvalidSignature
        })?;
        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(&expected).map_err(|_| {
            warn!("🔐️ Invalid webhook signature. Denying access.");
            DomainError::InvalidSignature
        })?;
        trace!("🔐️ Webhook signature check ✅️");
        Ok(())
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        HmacSha256::new_from_slice(self.secret.reveal().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Secret::new("whsec_test123secret456".to_string()))
    }

    fn reference_signature(payload: &[u8], secret: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let payload = br#"{"type":"notification","event":"payment.succeeded"}"#;
        let signature = reference_signature(payload, "whsec_test123secret456");
        assert!(verifier().verify(payload, Some(&signature)).is_ok());
        assert_eq!(verifier().sign(payload), signature);
    }

    #[test]
    fn accepts_uppercase_hex() {
        let payload = b"{}";
        let signature = reference_signature(payload, "whsec_test123secret456").to_uppercase();
        assert!(verifier().verify(payload, Some(&signature)).is_ok());
    }

    #[test]
    fn rejects_a_modified_payload() {
        let signature = reference_signature(br#"{"amount":"24.00"}"#, "whsec_test123secret456");
        let result = verifier().verify(br#"{"amount":"0.01"}"#, Some(&signature));
        assert!(matches!(result, Err(DomainError::InvalidSignature)));
    }

    #[test]
    fn rejects_the_wrong_secret() {
        let payload = b"{}";
        let signature = reference_signature(payload, "some-other-secret");
        assert!(verifier().verify(payload, Some(&signature)).is_err());
    }

    #[test]
    fn rejects_missing_empty_or_garbage_signatures() {
        let payload = b"{}";
        assert!(verifier().verify(payload, None).is_err());
        assert!(verifier().verify(payload, Some("")).is_err());
        assert!(verifier().verify(payload, Some("not-a-valid-hex-signature")).is_err());
    }
}
