//! # TOTP Second Factor (part of C2)
//!
//! Secret generation, `otpauth://` URI construction, backup-code generation,
//! and ±1 time-window verification per §4.2. Persistence (the `users` row's
//! `totp_secret`/`totp_enabled`/`backup_codes` columns) is handled by
//! `identity_service`; this module is pure.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use shared::{ApiError, ApiResult};

const ISSUER: &str = "RelayOnPrem";
const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_LEN: usize = 8;

pub struct TotpEnrollment {
    pub secret_base32: String,
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
    pub backup_code_hashes: serde_json::Value,
}

/// Generates a fresh TOTP secret and a set of plaintext backup codes. Only
/// the hashed form of the backup codes is ever persisted.
pub fn generate_enrollment(account_email: &str) -> ApiResult<TotpEnrollment> {
    let secret = Secret::generate_secret();
    let secret_base32 = secret.to_encoded().to_string();

    let totp = build_totp(&secret_base32, account_email)?;
    let otpauth_uri = totp.get_url();

    let mut rng = rand::thread_rng();
    let backup_codes: Vec<String> = (0..BACKUP_CODE_COUNT)
        .map(|_| {
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(BACKUP_CODE_LEN)
                .map(char::from)
                .collect::<String>()
                .to_uppercase()
        })
        .collect();

    let hashes: Vec<serde_json::Value> = backup_codes
        .iter()
        .map(|code| serde_json::json!({ "hash": hash_backup_code(code), "used": false }))
        .collect();

    Ok(TotpEnrollment {
        secret_base32,
        otpauth_uri,
        backup_codes,
        backup_code_hashes: serde_json::Value::Array(hashes),
    })
}

/// Verifies a live 6-digit code against the stored base32 secret, tolerating
/// one time-step of clock skew in either direction.
pub fn verify_code(secret_base32: &str, account_email: &str, code: &str) -> ApiResult<bool> {
    let totp = build_totp(secret_base32, account_email)?;
    let now = chrono::Utc::now().timestamp() as u64;
    for step_offset in [-1i64, 0, 1] {
        let ts = (now as i64 + step_offset * 30).max(0) as u64;
        if totp
            .check(code, ts)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Checks `code` against the stored backup-code hash array, marking the
/// matching entry `used=true` on success and returning the updated array.
pub fn consume_backup_code(backup_codes: &serde_json::Value, code: &str) -> Option<serde_json::Value> {
    let entries = backup_codes.as_array()?;
    let target_hash = hash_backup_code(code);

    let mut matched = false;
    let updated: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| {
            let hash = entry.get("hash").and_then(|v| v.as_str()).unwrap_or_default();
            let used = entry.get("used").and_then(|v| v.as_bool()).unwrap_or(true);
            if !matched && !used && hash == target_hash {
                matched = true;
                serde_json::json!({ "hash": hash, "used": true })
            } else {
                entry.clone()
            }
        })
        .collect();

    matched.then(|| serde_json::Value::Array(updated))
}

fn hash_backup_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.to_uppercase().as_bytes()))
}

fn build_totp(secret_base32: &str, account_email: &str) -> ApiResult<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("malformed totp secret")))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, secret, Some(ISSUER.to_string()), account_email.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("totp construction failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_produces_ten_unique_backup_codes() {
        let enrollment = generate_enrollment("user@example.com").unwrap();
        assert_eq!(enrollment.backup_codes.len(), 10);
        let unique: std::collections::HashSet<_> = enrollment.backup_codes.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn a_freshly_generated_code_verifies() {
        let enrollment = generate_enrollment("user@example.com").unwrap();
        let totp = build_totp(&enrollment.secret_base32, "user@example.com").unwrap();
        let now = chrono::Utc::now().timestamp() as u64;
        let code = totp.generate(now);
        assert!(verify_code(&enrollment.secret_base32, "user@example.com", &code).unwrap());
    }

    #[test]
    fn wrong_code_is_rejected() {
        let enrollment = generate_enrollment("user@example.com").unwrap();
        assert!(!verify_code(&enrollment.secret_base32, "user@example.com", "000000").unwrap());
    }

    #[test]
    fn backup_code_is_single_use() {
        let enrollment = generate_enrollment("user@example.com").unwrap();
        let code = &enrollment.backup_codes[0];

        let updated = consume_backup_code(&enrollment.backup_code_hashes, code).expect("first use succeeds");
        assert!(consume_backup_code(&updated, code).is_none(), "second use must fail");
    }

    #[test]
    fn unknown_backup_code_does_not_match() {
        let enrollment = generate_enrollment("user@example.com").unwrap();
        assert!(consume_backup_code(&enrollment.backup_code_hashes, "NOTAREALCODE").is_none());
    }
}
