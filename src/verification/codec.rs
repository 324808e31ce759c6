/// License key codec
///
/// A license key is the payload `"<fingerprint>,<YYMMDD>"` encrypted twice
/// with keys derived from the fingerprint itself:
///
/// 1. inner layer: a prefix of the fingerprint whose length is given by its
///    first digit ([`prefix_key`])
/// 2. outer layer: the fingerprint with each digit replaced by a `#`-token
///    ([`token_key`])
///
/// Decoding peels the layers in reverse and checks the payload against the
/// live fingerprint and the clock.
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::crypto::symmetric;
use crate::error::{LicenseError, LicenseResult};

/// Separates fingerprint and expiry in the plaintext payload
const SEPARATOR: char = ',';

/// Prefix length used when the first digit cannot be used
const FALLBACK_PREFIX_LEN: usize = 9;

/// Decoded license payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub fingerprint: String,
    /// Expiry as written in the license (`YYMMDD`)
    pub expiry_date: String,
}

impl LicenseRecord {
    /// Last day the license is valid
    pub fn expiry(&self) -> LicenseResult<NaiveDate> {
        parse_expiry(&self.expiry_date)
    }

    /// First local instant at which the license is no longer valid
    pub fn expires_at(&self) -> LicenseResult<NaiveDateTime> {
        Ok(self.expiry()?.and_time(NaiveTime::MIN) + Duration::days(1))
    }

    /// Whether the license is still valid at the given local time
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at().map(|at| now < at).unwrap_or(false)
    }
}

/// Parse a `YYMMDD` expiry; two-digit years map to 2000-2099
pub fn parse_expiry(raw: &str) -> LicenseResult<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 6 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(LicenseError::DateFormat(raw.to_string()));
    }
    let field = |i: usize| u32::from(bytes[i] - b'0') * 10 + u32::from(bytes[i + 1] - b'0');
    let year = 2000 + field(0) as i32;
    NaiveDate::from_ymd_opt(year, field(2), field(4))
        .ok_or_else(|| LicenseError::DateFormat(raw.to_string()))
}

/// Outer-layer key: each digit becomes `#` plus a letter (1→a … 9→i, 0→j)
pub fn token_key(fingerprint: &str) -> String {
    let mut key = String::with_capacity(fingerprint.len() * 2);
    for c in fingerprint.chars() {
        match c.to_digit(10) {
            Some(0) => key.push_str("#j"),
            Some(d) => {
                key.push('#');
                key.push((b'a' + d as u8 - 1) as char);
            }
            None => key.push(c),
        }
    }
    key
}

/// Inner-layer key: the first `d` characters, `d` being the first digit
///
/// Falls back to the first nine characters (or the whole fingerprint) when
/// there is no digit, the digit is 0, or the fingerprint is shorter than `d`.
pub fn prefix_key(fingerprint: &str) -> String {
    let char_count = fingerprint.chars().count();
    let take = match fingerprint.chars().find_map(|c| c.to_digit(10)) {
        Some(d) if d != 0 && char_count >= d as usize => d as usize,
        _ => FALLBACK_PREFIX_LEN.min(char_count),
    };
    fingerprint.chars().take(take).collect()
}

/// Produce a license key for a fingerprint
///
/// # Arguments
/// * `fingerprint` - Device the license is bound to
/// * `expiry_date` - Last valid day, `YYMMDD`
pub fn encode(fingerprint: &str, expiry_date: &str) -> LicenseResult<String> {
    parse_expiry(expiry_date)?;

    let payload = format!("{}{}{}", fingerprint, SEPARATOR, expiry_date);
    let inner = symmetric::encrypt(&payload, &prefix_key(fingerprint))?;
    symmetric::encrypt(&inner, &token_key(fingerprint))
}

/// Decrypt a license key and check that it belongs to this device
///
/// Does not look at the expiry beyond parsing it.
pub fn decode(license_key: &str, current_fingerprint: &str) -> LicenseResult<LicenseRecord> {
    let inner = symmetric::decrypt(license_key.trim(), &token_key(current_fingerprint))?;
    let payload = symmetric::decrypt(&inner, &prefix_key(current_fingerprint))?;

    let parts: Vec<&str> = payload.split(SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(LicenseError::LicenseFormat(format!(
            "expected 2 fields, found {}",
            parts.len()
        )));
    }

    if parts[0] != current_fingerprint {
        tracing::error!(
            current = current_fingerprint,
            licensed = parts[0],
            "license bound to another machine"
        );
        return Err(LicenseError::MachineMismatch);
    }

    let record = LicenseRecord {
        fingerprint: parts[0].to_string(),
        expiry_date: parts[1].to_string(),
    };
    record.expiry()?;
    Ok(record)
}

/// Decode, bind, and check expiry against the local clock
pub fn decode_and_verify(
    license_key: &str,
    current_fingerprint: &str,
) -> LicenseResult<LicenseRecord> {
    decode_and_verify_at(license_key, current_fingerprint, Local::now().naive_local())
}

/// [`decode_and_verify`] with an explicit local time
pub fn decode_and_verify_at(
    license_key: &str,
    current_fingerprint: &str,
    now: NaiveDateTime,
) -> LicenseResult<LicenseRecord> {
    if license_key.trim().is_empty() {
        return Err(LicenseError::NotConfigured(
            "license_key is empty".to_string(),
        ));
    }

    let record = decode(license_key, current_fingerprint)?;
    if !record.is_valid_at(now) {
        return Err(LicenseError::Expired(record.expiry_date));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FP: &str = "3f9a1c0e5b7d2a4c6e8f0b1d3a5c7e9f1b3d5f7a9c1e3b5d7f9a1c3e5b7d9f1a";

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn yymmdd(date: NaiveDate) -> String {
        date.format("%y%m%d").to_string()
    }

    #[test]
    fn test_token_key() {
        assert_eq!(token_key("a1b2c0"), "a#ab#bc#j");
        assert_eq!(token_key("9"), "#i");
        assert_eq!(token_key("abcdef"), "abcdef");
    }

    #[test]
    fn test_prefix_key() {
        // first digit 3 -> first 3 chars
        assert_eq!(prefix_key("ab3defghijk"), "ab3");
        // digit 0 -> first 9
        assert_eq!(prefix_key("a0cdefghijk"), "a0cdefghi");
        // no digit -> first 9
        assert_eq!(prefix_key("abcdefghijk"), "abcdefghi");
        // digit larger than length, shorter than 9 -> whole string
        assert_eq!(prefix_key("ab8"), "ab8");
        assert_eq!(prefix_key(""), "");
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(
            parse_expiry("991231").unwrap(),
            NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()
        );
        assert_eq!(
            parse_expiry("000101").unwrap(),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
        );
        assert_eq!(
            parse_expiry("700615").unwrap(),
            NaiveDate::from_ymd_opt(2070, 6, 15).unwrap()
        );
        for bad in ["", "2501", "20250101", "251301", "250230", "25o101", " 50101"] {
            assert!(
                matches!(parse_expiry(bad), Err(LicenseError::DateFormat(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_scenario_round_trip() {
        let key = encode("abc123def", "991231").unwrap();
        let record = decode(&key, "abc123def").unwrap();
        assert_eq!(record.fingerprint, "abc123def");
        assert_eq!(record.expiry_date, "991231");
        assert!(record.is_valid_at(at(2099, 6, 1, 12, 0, 0)));
        assert!(!record.is_valid_at(at(2100, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_expiry_boundary() {
        let today = NaiveDate::from_ymd_opt(2030, 3, 15).unwrap();
        let yesterday = today.pred_opt().unwrap();

        let key_today = encode(FP, &yymmdd(today)).unwrap();
        let key_yesterday = encode(FP, &yymmdd(yesterday)).unwrap();

        let morning = at(2030, 3, 15, 0, 0, 0);
        let last_second = at(2030, 3, 15, 23, 59, 59);
        let next_midnight = at(2030, 3, 16, 0, 0, 0);

        assert!(decode_and_verify_at(&key_today, FP, morning).is_ok());
        assert!(decode_and_verify_at(&key_today, FP, last_second).is_ok());
        assert!(matches!(
            decode_and_verify_at(&key_today, FP, next_midnight),
            Err(LicenseError::Expired(_))
        ));
        assert!(matches!(
            decode_and_verify_at(&key_yesterday, FP, morning),
            Err(LicenseError::Expired(ref d)) if d == &yymmdd(yesterday)
        ));
    }

    #[test]
    fn test_valid_today_with_real_clock() {
        let today = Local::now().date_naive();
        let key = encode(FP, &yymmdd(today)).unwrap();
        assert!(decode_and_verify(&key, FP).is_ok());
    }

    #[test]
    fn test_encode_rejects_bad_date() {
        assert!(matches!(
            encode(FP, "20251101"),
            Err(LicenseError::DateFormat(_))
        ));
    }

    #[test]
    fn test_empty_key_not_configured() {
        assert!(matches!(
            decode_and_verify_at("  ", FP, at(2030, 1, 1, 0, 0, 0)),
            Err(LicenseError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_machine_mismatch() {
        let other = "7e1d0c9b8a7f6e5d4c3b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d";
        // Payload names another machine but is encrypted with this machine's keys
        let payload = format!("{},991231", other);
        let inner = symmetric::encrypt(&payload, &prefix_key(FP)).unwrap();
        let key = symmetric::encrypt(&inner, &token_key(FP)).unwrap();

        assert!(matches!(decode(&key, FP), Err(LicenseError::MachineMismatch)));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let other = "7e1d0c9b8a7f6e5d4c3b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d";
        let key = encode(other, "991231").unwrap();
        let result = decode(&key, FP);
        assert!(matches!(
            result,
            Err(LicenseError::MachineMismatch) | Err(LicenseError::Cipher(_))
        ));
    }

    #[test]
    fn test_wrong_field_count() {
        let payload = format!("{},991231,extra", FP);
        let inner = symmetric::encrypt(&payload, &prefix_key(FP)).unwrap();
        let key = symmetric::encrypt(&inner, &token_key(FP)).unwrap();
        assert!(matches!(decode(&key, FP), Err(LicenseError::LicenseFormat(_))));

        let inner = symmetric::encrypt("no separator", &prefix_key(FP)).unwrap();
        let key = symmetric::encrypt(&inner, &token_key(FP)).unwrap();
        assert!(matches!(decode(&key, FP), Err(LicenseError::LicenseFormat(_))));
    }

    #[test]
    fn test_bad_date_in_payload() {
        let payload = format!("{},21001301", FP);
        let inner = symmetric::encrypt(&payload, &prefix_key(FP)).unwrap();
        let key = symmetric::encrypt(&inner, &token_key(FP)).unwrap();
        assert!(matches!(decode(&key, FP), Err(LicenseError::DateFormat(_))));
    }

    #[test]
    fn test_tampering_never_succeeds() {
        let key = encode(FP, "991231").unwrap();
        for i in 0..key.len() {
            let mut bytes = key.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered == key {
                continue;
            }
            let result = decode(&tampered, FP);
            assert!(
                matches!(
                    result,
                    Err(LicenseError::Cipher(_))
                        | Err(LicenseError::LicenseFormat(_))
                        | Err(LicenseError::MachineMismatch)
                ),
                "tampering at {i} gave {result:?}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            fingerprint in "[0-9a-zA-Z#]{1,64}",
            days in 0i64..36525,
        ) {
            // 2000-01-01 through 2099-12-31
            let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + Duration::days(days);
            let expiry = yymmdd(date);

            let key = encode(&fingerprint, &expiry).unwrap();
            let record = decode(&key, &fingerprint).unwrap();
            prop_assert_eq!(record.fingerprint, fingerprint);
            prop_assert_eq!(record.expiry_date, expiry);
        }
    }
}
