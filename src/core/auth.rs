//! Request signing: RSA-PSS/SHA-256 over `timestamp + METHOD + path`.
//!
//! Pure functions only — nothing here touches the network or holds state.
//! Signature bytes and key material are never passed to `tracing` fields.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pss::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;

use crate::error::{Error, Result};

const WS_LOGIN_PATH: &str = "/trade-api/ws/v2";

/// The three headers every signed REST call must carry, plus the fixed
/// `Content-Type`.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub access_key: String,
    pub access_signature: String,
    pub access_timestamp: String,
}

/// Parse a PEM-encoded RSA private key from disk.
pub fn load_private_key(pem_path: &str) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(pem_path)?;
    load_private_key_from_pem(&pem)
}

/// Parse a PEM-encoded RSA private key from an in-memory string.
pub fn load_private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    use rsa::pkcs8::DecodePrivateKey;
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| {
            use rsa::pkcs1::DecodeRsaPrivateKey;
            RsaPrivateKey::from_pkcs1_pem(pem)
        })
        .map_err(|e| Error::Signing(format!("invalid private key PEM: {e}")))
}

/// Sign `timestamp_ms + METHOD + path` with RSA-PSS/SHA-256, MGF1-SHA-256,
/// salt length equal to the digest length. Returns the Base64-encoded
/// signature.
pub fn sign_message(
    private_key: &RsaPrivateKey,
    timestamp_ms: i64,
    method: &str,
    path: &str,
) -> Result<String> {
    let message = format!("{timestamp_ms}{}{path}", method.to_uppercase());
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand_from_os();
    let signature = signing_key
        .try_sign_with_rng(&mut rng, message.as_bytes())
        .map_err(|e| Error::Signing(e.to_string()))?;
    Ok(BASE64.encode(signature.to_bytes()))
}

/// Build the three `KALSHI-ACCESS-*` headers for a signed REST call.
pub fn build_headers(
    api_key: &str,
    private_key: &RsaPrivateKey,
    method: &str,
    path: &str,
    now_ms: i64,
) -> Result<SignedHeaders> {
    let signature = sign_message(private_key, now_ms, method, path)?;
    Ok(SignedHeaders {
        access_key: api_key.to_string(),
        access_signature: signature,
        access_timestamp: now_ms.to_string(),
    })
}

/// Build the WebSocket login command body, signed against
/// `method=GET, path=/trade-api/ws/v2`.
pub fn build_ws_login_payload(
    api_key: &str,
    private_key: &RsaPrivateKey,
    msg_id: u64,
    now_ms: i64,
) -> Result<serde_json::Value> {
    let signature = sign_message(private_key, now_ms, "GET", WS_LOGIN_PATH)?;
    Ok(serde_json::json!({
        "id": msg_id,
        "cmd": "login",
        "params": {
            "api_key": api_key,
            "signature": signature,
            "timestamp": now_ms.to_string(),
        }
    }))
}

fn rand_from_os() -> impl rand_core::CryptoRngCore {
    rand_core::OsRng
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand_core::OsRng;
        RsaPrivateKey::new(&mut rng, 2048).expect("generate test key")
    }

    #[test]
    fn sign_message_produces_base64_and_is_rng_randomized() {
        let key = test_key();
        let sig_a = sign_message(&key, 1_700_000_000_000, "GET", "/trade-api/v2/markets").unwrap();
        let sig_b = sign_message(&key, 1_700_000_000_000, "GET", "/trade-api/v2/markets").unwrap();
        // PSS is randomized: two signatures over the same message differ,
        // but both must decode as valid base64.
        assert!(base64::engine::general_purpose::STANDARD
            .decode(&sig_a)
            .is_ok());
        assert!(base64::engine::general_purpose::STANDARD
            .decode(&sig_b)
            .is_ok());
    }

    #[test]
    fn build_headers_uppercases_method_in_the_signed_message_only() {
        let key = test_key();
        let headers = build_headers(
            "api-key-123",
            &key,
            "get",
            "/trade-api/v2/portfolio/orders",
            1_700_000_000_000,
        )
        .unwrap();
        assert_eq!(headers.access_key, "api-key-123");
        assert_eq!(headers.access_timestamp, "1700000000000");
        assert!(!headers.access_signature.is_empty());
    }

    #[test]
    fn ws_login_payload_signs_the_fixed_ws_path() {
        let key = test_key();
        let payload = build_ws_login_payload("api-key-123", &key, 1, 1_700_000_000_000).unwrap();
        assert_eq!(payload["cmd"], "login");
        assert_eq!(payload["params"]["api_key"], "api-key-123");
    }

    #[test]
    fn load_private_key_from_pem_roundtrips_pkcs8() {
        let key = test_key();
        let pem = key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap()
            .to_string();
        assert!(load_private_key_from_pem(&pem).is_ok());
    }

    #[test]
    fn load_private_key_from_pem_rejects_garbage() {
        assert!(load_private_key_from_pem("not a pem").is_err());
    }
}
