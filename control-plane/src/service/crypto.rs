//! # Crypto Primitives (C1)
//!
//! Password hashing is `shared::auth::password::PasswordHasher` (Argon2id);
//! this module covers the two primitives not shared with anything else in
//! the workspace: webhook HMAC-SHA256 signing and the Ed25519 CWT/COSE_Sign1
//! minting described in §4.1.
//!
//! ## CWT wire format
//!
//! `Tag(61, Tag(18, [protected_header_bstr, {}, payload_bstr, signature_bstr]))`,
//! base64url-encoded without padding. The protected header is exactly
//! `{1: -8}` (alg=EdDSA, no `kid`); the payload is exactly `{1: iss, 6: iat,
//! -80201: scope}` (no `exp`, no `aud`). Byte-exactness matters: the
//! downstream relay rejects anything with extra header or claim entries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use serde_cbor::Value as Cbor;
use sha2::{Digest, Sha256};
use shared::auth::password::PasswordHasher;
use shared::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

/// Thin re-export so services that only need password hashing don't take a
/// direct `shared::auth` dependency on top of `shared::service::crypto`.
pub type PasswordVerifierHandle = PasswordHasher;

/// Label for `alg` in a COSE header; `-8` is the registered COSE value for
/// EdDSA.
const COSE_ALG_LABEL: i128 = 1;
const COSE_ALG_EDDSA: i128 = -8;
const CLAIM_ISS: i128 = 1;
const CLAIM_IAT: i128 = 6;
/// Unregistered private-use claim label carrying the relay scope string.
const CLAIM_SCOPE: i128 = -80201;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Read,
    Write,
}

impl RelayMode {
    pub fn scope_suffix(self) -> &'static str {
        match self {
            RelayMode::Read => "r",
            RelayMode::Write => "rw",
        }
    }
}

pub struct RelaySigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    key_id: String,
}

impl RelaySigner {
    /// Loads a key from a base64-encoded 32-byte Ed25519 seed, or generates
    /// a fresh one (and logs a warning) if absent -- per §4.1's startup
    /// behavior. The private key never leaves process memory from here on.
    pub fn from_base64_or_generate(private_key_base64: Option<&str>) -> anyhow::Result<Self> {
        let signing_key = match private_key_base64 {
            Some(b64) => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(b64.trim_end_matches('='))
                    .or_else(|_| base64::engine::general_purpose::STANDARD.decode(b64))?;
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("relay private key must be exactly 32 bytes"))?;
                SigningKey::from_bytes(&seed)
            }
            None => {
                tracing::warn!("no RELAY_PRIVATE_KEY configured; generating an ephemeral Ed25519 keypair");
                let mut csprng = rand_core::OsRng;
                SigningKey::generate(&mut csprng)
            }
        };
        let verifying_key = signing_key.verifying_key();
        let key_id = derive_key_id(verifying_key.as_bytes());
        Ok(Self { signing_key, verifying_key, key_id })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.verifying_key.as_bytes())
    }

    /// Mints a CWT per §4.1. `doc_id` is treated as an opaque string end to
    /// end (§4.8) and is only ever embedded in the scope string.
    pub fn mint_cwt(&self, issuer: &str, doc_id: &str, mode: RelayMode, iat_unix: i64) -> ApiResult<String> {
        let scope = format!("doc:{doc_id}:{}", mode.scope_suffix());

        let protected_header = Cbor::Map(
            [(Cbor::Integer(COSE_ALG_LABEL), Cbor::Integer(COSE_ALG_EDDSA))]
                .into_iter()
                .collect(),
        );
        let protected_bytes = serde_cbor::to_vec(&protected_header)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("cbor encode failed: {e}")))?;

        let payload = Cbor::Map(
            [
                (Cbor::Integer(CLAIM_ISS), Cbor::Text(issuer.to_string())),
                (Cbor::Integer(CLAIM_IAT), Cbor::Integer(iat_unix as i128)),
                (Cbor::Integer(CLAIM_SCOPE), Cbor::Text(scope)),
            ]
            .into_iter()
            .collect(),
        );
        let payload_bytes = serde_cbor::to_vec(&payload)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("cbor encode failed: {e}")))?;

        let sig_structure = Cbor::Array(vec![
            Cbor::Text("Signature1".to_string()),
            Cbor::Bytes(protected_bytes.clone()),
            Cbor::Bytes(Vec::new()),
            Cbor::Bytes(payload_bytes.clone()),
        ]);
        let sig_structure_bytes = serde_cbor::to_vec(&sig_structure)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("cbor encode failed: {e}")))?;

        let signature: Signature = self.signing_key.sign(&sig_structure_bytes);

        let cose_sign1 = Cbor::Array(vec![
            Cbor::Bytes(protected_bytes),
            Cbor::Map(Default::default()),
            Cbor::Bytes(payload_bytes),
            Cbor::Bytes(signature.to_bytes().to_vec()),
        ]);
        let cwt = Cbor::Tag(61, Box::new(Cbor::Tag(18, Box::new(cose_sign1))));
        let encoded = serde_cbor::to_vec(&cwt)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("cbor encode failed: {e}")))?;

        Ok(URL_SAFE_NO_PAD.encode(encoded))
    }

    /// Verifies shape and signature exactly as minted: no extra header or
    /// claim entries, no `exp`, no `aud`. Returns the decoded claims on
    /// success.
    pub fn verify_cwt(&self, token: &str) -> ApiResult<CwtClaims> {
        verify_cwt_with_key(token, &self.verifying_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CwtClaims {
    pub issuer: String,
    pub iat: i64,
    pub scope: String,
}

pub fn verify_cwt_with_key(token: &str, verifying_key: &VerifyingKey) -> ApiResult<CwtClaims> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| ApiError::Unauthorized("malformed relay token".into()))?;
    let value: Cbor = serde_cbor::from_slice(&bytes).map_err(|_| ApiError::Unauthorized("malformed relay token".into()))?;

    let Cbor::Tag(61, inner) = value else {
        return Err(ApiError::Unauthorized("not a CWT".into()));
    };
    let Cbor::Tag(18, cose) = *inner else {
        return Err(ApiError::Unauthorized("not a COSE_Sign1 structure".into()));
    };
    let Cbor::Array(parts) = *cose else {
        return Err(ApiError::Unauthorized("malformed COSE_Sign1".into()));
    };
    let [protected, unprotected, payload, signature] = <[Cbor; 4]>::try_from(parts)
        .map_err(|_| ApiError::Unauthorized("COSE_Sign1 must have exactly 4 elements".into()))?;

    let Cbor::Bytes(protected_bytes) = protected else {
        return Err(ApiError::Unauthorized("protected header must be a bstr".into()));
    };
    if !matches!(unprotected, Cbor::Map(ref m) if m.is_empty()) {
        return Err(ApiError::Unauthorized("unprotected header must be empty".into()));
    }
    let Cbor::Bytes(payload_bytes) = payload else {
        return Err(ApiError::Unauthorized("payload must be a bstr".into()));
    };
    let Cbor::Bytes(sig_bytes) = signature else {
        return Err(ApiError::Unauthorized("signature must be a bstr".into()));
    };

    let header_value: Cbor =
        serde_cbor::from_slice(&protected_bytes).map_err(|_| ApiError::Unauthorized("malformed protected header".into()))?;
    let Cbor::Map(header_map) = header_value else {
        return Err(ApiError::Unauthorized("protected header must be a map".into()));
    };
    if header_map.len() != 1 || header_map.get(&Cbor::Integer(COSE_ALG_LABEL)) != Some(&Cbor::Integer(COSE_ALG_EDDSA)) {
        return Err(ApiError::Unauthorized("protected header must be exactly {alg: EdDSA}".into()));
    }

    let sig_structure = Cbor::Array(vec![
        Cbor::Text("Signature1".to_string()),
        Cbor::Bytes(protected_bytes),
        Cbor::Bytes(Vec::new()),
        Cbor::Bytes(payload_bytes.clone()),
    ]);
    let sig_structure_bytes = serde_cbor::to_vec(&sig_structure)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("cbor encode failed: {e}")))?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| ApiError::Unauthorized("malformed signature".into()))?;
    verifying_key
        .verify(&sig_structure_bytes, &signature)
        .map_err(|_| ApiError::Unauthorized("signature verification failed".into()))?;

    let payload_value: Cbor =
        serde_cbor::from_slice(&payload_bytes).map_err(|_| ApiError::Unauthorized("malformed payload".into()))?;
    let Cbor::Map(claims_map) = payload_value else {
        return Err(ApiError::Unauthorized("payload must be a map".into()));
    };
    if claims_map.len() != 3 {
        return Err(ApiError::Unauthorized("payload must have exactly 3 claims".into()));
    }
    let issuer = match claims_map.get(&Cbor::Integer(CLAIM_ISS)) {
        Some(Cbor::Text(s)) => s.clone(),
        _ => return Err(ApiError::Unauthorized("missing or malformed iss claim".into())),
    };
    let iat = match claims_map.get(&Cbor::Integer(CLAIM_IAT)) {
        Some(Cbor::Integer(i)) => *i as i64,
        _ => return Err(ApiError::Unauthorized("missing or malformed iat claim".into())),
    };
    let scope = match claims_map.get(&Cbor::Integer(CLAIM_SCOPE)) {
        Some(Cbor::Text(s)) => s.clone(),
        _ => return Err(ApiError::Unauthorized("missing or malformed scope claim".into())),
    };

    Ok(CwtClaims { issuer, iat, scope })
}

fn derive_key_id(public_key_bytes: &[u8]) -> String {
    let digest = Sha256::digest(public_key_bytes);
    format!("relay_cp_{}", hex::encode(&digest[..8]))
}

/// 256 bits of randomness, hex-encoded (64 chars) -- the shape used for
/// refresh tokens, invite tokens, and password-reset/email-verification
/// tokens alike (§3, §4.2, §4.6). Only the SHA-256 hash of the result is
/// ever persisted; the plaintext goes to the caller exactly once.
pub fn generate_opaque_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// HMAC-SHA256 over the raw JSON body, framed as `sha256=<hex>` (§4.9).
pub fn sign_webhook_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    sign_webhook_payload(secret, body) == signature_header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> RelaySigner {
        RelaySigner::from_base64_or_generate(None).unwrap()
    }

    #[test]
    fn cwt_round_trips_and_carries_expected_claims() {
        let signer = signer();
        let token = signer.mint_cwt("relay-control-plane", "my-doc-id", RelayMode::Write, 1_700_000_000).unwrap();
        let claims = signer.verify_cwt(&token).unwrap();
        assert_eq!(claims.issuer, "relay-control-plane");
        assert_eq!(claims.scope, "doc:my-doc-id:rw");
        assert_eq!(claims.iat, 1_700_000_000);
    }

    #[test]
    fn read_mode_uses_r_suffix() {
        let signer = signer();
        let token = signer.mint_cwt("relay-control-plane", "doc-1", RelayMode::Read, 0).unwrap();
        let claims = signer.verify_cwt(&token).unwrap();
        assert_eq!(claims.scope, "doc:doc-1:r");
    }

    #[test]
    fn verification_fails_with_a_different_public_key() {
        let signer_a = signer();
        let signer_b = signer();
        let token = signer_a.mint_cwt("relay-control-plane", "doc-1", RelayMode::Read, 0).unwrap();
        assert!(signer_b.verify_cwt(&token).is_err());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signer = signer();
        let token = signer.mint_cwt("relay-control-plane", "doc-1", RelayMode::Read, 0).unwrap();
        let mut decoded = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = decoded.len() - 1;
        decoded[last] ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(decoded);
        assert!(signer.verify_cwt(&tampered).is_err());
    }

    #[test]
    fn wire_shape_has_no_kid_exp_or_aud() {
        let signer = signer();
        let token = signer.mint_cwt("relay-control-plane", "doc-x", RelayMode::Write, 42).unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let value: Cbor = serde_cbor::from_slice(&bytes).unwrap();
        let Cbor::Tag(61, inner) = value else { panic!("expected outer tag 61") };
        let Cbor::Tag(18, cose) = *inner else { panic!("expected tag 18") };
        let Cbor::Array(parts) = *cose else { panic!("expected array") };
        assert_eq!(parts.len(), 4);
        let Cbor::Bytes(ref protected_bytes) = parts[0] else { panic!() };
        let header: Cbor = serde_cbor::from_slice(protected_bytes).unwrap();
        let Cbor::Map(header_map) = header else { panic!() };
        assert_eq!(header_map.len(), 1, "no kid, just alg");
        let Cbor::Bytes(ref payload_bytes) = parts[2] else { panic!() };
        let payload: Cbor = serde_cbor::from_slice(payload_bytes).unwrap();
        let Cbor::Map(payload_map) = payload else { panic!() };
        assert_eq!(payload_map.len(), 3, "no exp, no aud");
    }

    #[test]
    fn webhook_signature_verifies() {
        let body = br#"{"event_type":"ping"}"#;
        let sig = sign_webhook_payload("s3cr3t", body);
        assert!(sig.starts_with("sha256="));
        assert!(verify_webhook_signature("s3cr3t", body, &sig));
        assert!(!verify_webhook_signature("wrong-secret", body, &sig));
    }

    #[test]
    fn opaque_tokens_are_64_hex_chars_and_unique() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("same-input"), sha256_hex("same-input"));
        assert_ne!(sha256_hex("a"), sha256_hex("b"));
    }

    #[test]
    fn key_id_is_stable_for_same_key() {
        let signer = signer();
        assert_eq!(signer.key_id(), signer.key_id());
        assert!(signer.key_id().starts_with("relay_cp_"));
    }
}
