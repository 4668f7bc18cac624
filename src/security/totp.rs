//! RFC 6238 time-based one-time passwords (6 digits, 30 s step, HMAC-SHA1).

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::constants::totp::{DIGITS, SECRET_BYTES, STEP_SECONDS};

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone)]
pub struct TotpVerifier {
    issuer: String,
    skew_steps: u8,
}

impl TotpVerifier {
    #[must_use]
    pub fn new(issuer: impl Into<String>, skew_steps: u8) -> Self {
        Self {
            issuer: issuer.into(),
            skew_steps,
        }
    }

    /// 160-bit random secret, base32 without padding.
    #[must_use]
    pub fn generate_secret(&self) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        BASE32_NOPAD.encode(&bytes)
    }

    pub fn verify(&self, secret: &str, code: &str) -> bool {
        self.verify_at(secret, code, unix_now())
    }

    pub fn verify_at(&self, secret: &str, code: &str, unix_time: u64) -> bool {
        self.verify_step_at(secret, code, unix_time).is_some()
    }

    /// Like [`TotpVerifier::verify`], returning the time step the code
    /// belongs to so callers can refuse a step they already accepted.
    pub fn verify_step(&self, secret: &str, code: &str) -> Option<u64> {
        self.verify_step_at(secret, code, unix_now())
    }

    /// Accepts the code for the step containing `unix_time` and up to
    /// `skew_steps` steps on either side.
    pub fn verify_step_at(&self, secret: &str, code: &str, unix_time: u64) -> Option<u64> {
        let code = code.trim();
        if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let key = decode_secret(secret)?;

        let current = unix_time / STEP_SECONDS;
        let skew = u64::from(self.skew_steps);

        let mut matched = None;
        for step in current.saturating_sub(skew)..=current.saturating_add(skew) {
            let expected = format_code(hotp(&key, step)?);
            // no early exit so every window position costs the same
            if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
                matched = Some(step);
            }
        }
        matched
    }

    /// The code an authenticator app would show at `unix_time`.
    #[must_use]
    pub fn code_at(&self, secret: &str, unix_time: u64) -> Option<String> {
        let key = decode_secret(secret)?;
        hotp(&key, unix_time / STEP_SECONDS).map(format_code)
    }

    /// Provisioning URI understood by authenticator apps.
    #[must_use]
    pub fn totp_uri(&self, secret: &str, account_label: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        let label = urlencoding::encode(account_label);
        format!(
            "otpauth://totp/{issuer}:{label}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return None;
    }
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest.last()? & 0x0f);
    let window = digest.get(offset..offset + 4)?;
    let binary = u32::from_be_bytes([window[0] & 0x7f, window[1], window[2], window[3]]);

    Some(binary % 10u32.pow(DIGITS))
}

fn format_code(value: u32) -> String {
    format!("{value:0width$}", width = DIGITS as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    // base32("12345678901234567890"), the RFC 6238 SHA-1 test key
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn verifier() -> TotpVerifier {
        TotpVerifier::new("Inventory", 1)
    }

    #[test]
    fn test_rfc6238_vectors() {
        let totp = verifier();
        assert_eq!(totp.code_at(RFC_SECRET, 59).as_deref(), Some("287082"));
        assert_eq!(
            totp.code_at(RFC_SECRET, 1_111_111_109).as_deref(),
            Some("081804")
        );
        assert_eq!(
            totp.code_at(RFC_SECRET, 1_234_567_890).as_deref(),
            Some("005924")
        );
    }

    #[test]
    fn test_accepts_current_and_adjacent_steps() {
        let totp = verifier();
        let now = 1_700_000_000;
        let current = totp.code_at(RFC_SECRET, now).unwrap();
        let previous = totp.code_at(RFC_SECRET, now - 30).unwrap();
        let next = totp.code_at(RFC_SECRET, now + 30).unwrap();
        let stale = totp.code_at(RFC_SECRET, now - 90).unwrap();

        assert!(totp.verify_at(RFC_SECRET, &current, now));
        assert!(totp.verify_at(RFC_SECRET, &previous, now));
        assert!(totp.verify_at(RFC_SECRET, &next, now));
        assert!(!totp.verify_at(RFC_SECRET, &stale, now));
    }

    #[test]
    fn test_reports_the_matching_step() {
        let totp = verifier();
        let now = 1_700_000_000;
        let step = now / STEP_SECONDS;
        let previous = totp.code_at(RFC_SECRET, now - 30).unwrap();
        let current = totp.code_at(RFC_SECRET, now).unwrap();

        assert_eq!(totp.verify_step_at(RFC_SECRET, &previous, now), Some(step - 1));
        assert_eq!(totp.verify_step_at(RFC_SECRET, &current, now), Some(step));
        assert_eq!(totp.verify_step_at(RFC_SECRET, "000000x", now), None);
    }

    #[test]
    fn test_zero_skew_only_accepts_current_step() {
        let totp = TotpVerifier::new("Inventory", 0);
        let now = 1_700_000_000;
        let previous = totp.code_at(RFC_SECRET, now - 30).unwrap();
        assert!(!totp.verify_at(RFC_SECRET, &previous, now));
    }

    #[test]
    fn test_rejects_malformed_codes() {
        let totp = verifier();
        assert!(!totp.verify_at(RFC_SECRET, "", 59));
        assert!(!totp.verify_at(RFC_SECRET, "   ", 59));
        assert!(!totp.verify_at(RFC_SECRET, "28708", 59));
        assert!(!totp.verify_at(RFC_SECRET, "2870822", 59));
        assert!(!totp.verify_at(RFC_SECRET, "28708a", 59));
        assert!(totp.verify_at(RFC_SECRET, " 287082 ", 59));
    }

    #[test]
    fn test_rejects_bad_secret() {
        let totp = verifier();
        assert!(!totp.verify_at("", "287082", 59));
        assert!(!totp.verify_at("!!!notbase32", "287082", 59));
    }

    #[test]
    fn test_generated_secret_round_trip() {
        let totp = verifier();
        let secret = totp.generate_secret();
        assert_eq!(secret.len(), 32);
        assert_ne!(secret, totp.generate_secret());

        let code = totp.code_at(&secret, 1_000_000).unwrap();
        assert!(totp.verify_at(&secret, &code, 1_000_000));
        assert!(totp.verify_at(&secret.to_lowercase(), &code, 1_000_000));
    }

    #[test]
    fn test_uri() {
        let uri = verifier().totp_uri(RFC_SECRET, "jane doe");
        assert_eq!(
            uri,
            format!(
                "otpauth://totp/Inventory:jane%20doe?secret={RFC_SECRET}&issuer=Inventory&algorithm=SHA1&digits=6&period=30"
            )
        );
    }
}
