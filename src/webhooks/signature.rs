//! Twitch EventSub signature verification using HMAC-SHA256.
//!
//! Twitch signs each delivery with the secret supplied when the subscription
//! was created. The MAC input is the concatenation of the
//! `Twitch-Eventsub-Message-Id` header, the `Twitch-Eventsub-Message-Timestamp`
//! header and the raw request body, in that order. The result is sent in the
//! `Twitch-Eventsub-Message-Signature` header as `sha256=<hex>`.
//!
//! Verification must run over the exact bytes received: re-serialising the
//! parsed JSON would change whitespace and key order.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Builds the byte string that is signed: `message_id || timestamp || body`.
pub fn signing_input(message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(message_id.len() + timestamp.len() + body.len());
    input.extend_from_slice(message_id.as_bytes());
    input.extend_from_slice(timestamp.as_bytes());
    input.extend_from_slice(body);
    input
}

/// Parses a signature header (e.g., "sha256=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
/// Never panics.
///
/// # Examples
///
/// ```
/// use live_relay::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a delivery.
///
/// This is useful for testing purposes (generating expected signatures).
pub fn compute_signature(message_id: &str, timestamp: &str, body: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(&signing_input(message_id, timestamp, body));
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value: "sha256=<hex>".
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a delivery's signature header against the secret.
///
/// Returns `true` only if the header is well formed and matches. The
/// comparison is constant-time.
///
/// # Examples
///
/// ```
/// use live_relay::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let body = br#"{"a":1}"#;
/// let sig = compute_signature("m1", "t1", body, b"secret");
/// let header = format_signature_header(&sig);
///
/// assert!(verify_signature("m1", "t1", body, &header, b"secret"));
/// assert!(!verify_signature("m1", "t1", body, &header, b"other"));
/// ```
pub fn verify_signature(
    message_id: &str,
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> bool {
    let Some(expected_signature) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(&signing_input(message_id, timestamp, body));

    mac.verify_slice(&expected_signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ─── Header parsing ───

    #[test]
    fn parse_valid_header() {
        assert_eq!(
            parse_signature_header("sha256=1234abcd"),
            Some(vec![0x12, 0x34, 0xab, 0xcd])
        );
    }

    #[test]
    fn parse_uppercase_hex() {
        assert_eq!(
            parse_signature_header("sha256=ABCD1234"),
            Some(vec![0xab, 0xcd, 0x12, 0x34])
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_signature_header(""), None);
        assert_eq!(parse_signature_header("1234abcd"), None);
        assert_eq!(parse_signature_header("sha1=1234abcd"), None);
        assert_eq!(parse_signature_header("sha256=xyz"), None);
        assert_eq!(parse_signature_header("sha256=abc"), None);
    }

    #[test]
    fn format_header() {
        assert_eq!(format_signature_header(&[0x12, 0x34, 0xab, 0xcd]), "sha256=1234abcd");
    }

    // ─── Verification ───

    #[test]
    fn signing_input_is_plain_concatenation() {
        assert_eq!(signing_input("m1", "t1", br#"{"a":1}"#), br#"m1t1{"a":1}"#.to_vec());
    }

    #[test]
    fn known_delivery_accepts_and_byte_flip_rejects() {
        let secret = b"s3cret";
        let body = br#"{"a":1}"#.to_vec();
        let header = format_signature_header(&compute_signature("m1", "t1", &body, secret));

        assert!(verify_signature("m1", "t1", &body, &header, secret));

        for i in 0..body.len() {
            let mut flipped = body.clone();
            flipped[i] ^= 0x01;
            assert!(
                !verify_signature("m1", "t1", &flipped, &header, secret),
                "flip at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn matches_independent_hmac() {
        // The MAC of the concatenated input, computed without the helpers.
        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(br#"m1t1{"a":1}"#);
        let expected = format_signature_header(&mac.finalize().into_bytes());

        assert!(verify_signature("m1", "t1", br#"{"a":1}"#, &expected, b"s3cret"));
    }

    #[test]
    fn id_and_timestamp_are_covered() {
        let secret = b"s3cret";
        let header = format_signature_header(&compute_signature("m1", "t1", b"{}", secret));

        assert!(!verify_signature("m2", "t1", b"{}", &header, secret));
        assert!(!verify_signature("m1", "t2", b"{}", &header, secret));
    }

    #[test]
    fn malformed_header_rejects() {
        for header in ["", "sha256=", "sha256=invalid", "sha1=abc123", "not-a-header"] {
            assert!(!verify_signature("m1", "t1", b"{}", header, b"secret"));
        }
    }

    #[test]
    fn signature_is_32_bytes() {
        assert_eq!(compute_signature("m", "t", b"body", b"k").len(), 32);
    }

    // ─── Properties ───

    proptest! {
        #[test]
        fn prop_sign_verify_roundtrip(
            id in "[a-z0-9-]{1,36}",
            ts in "[0-9T:.Z-]{1,30}",
            body: Vec<u8>,
            secret in "[a-zA-Z0-9]{1,64}",
        ) {
            let header = format_signature_header(
                &compute_signature(&id, &ts, &body, secret.as_bytes()),
            );
            prop_assert!(verify_signature(&id, &ts, &body, &header, secret.as_bytes()));
        }

        #[test]
        fn prop_wrong_secret_fails(
            body: Vec<u8>,
            secret1 in "[a-zA-Z0-9]{1,64}",
            secret2 in "[a-zA-Z0-9]{1,64}",
        ) {
            prop_assume!(secret1 != secret2);

            let header = format_signature_header(
                &compute_signature("m1", "t1", &body, secret1.as_bytes()),
            );
            prop_assert!(!verify_signature("m1", "t1", &body, &header, secret2.as_bytes()));
        }

        #[test]
        fn prop_modified_body_fails(original: Vec<u8>, modified: Vec<u8>) {
            prop_assume!(original != modified);

            let header = format_signature_header(
                &compute_signature("m1", "t1", &original, b"secret"),
            );
            prop_assert!(!verify_signature("m1", "t1", &modified, &header, b"secret"));
        }

        #[test]
        fn prop_format_parse_roundtrip(signature: [u8; 32]) {
            let header = format_signature_header(&signature);
            prop_assert_eq!(parse_signature_header(&header), Some(signature.to_vec()));
        }

        #[test]
        fn prop_malformed_header_no_panic(header: String, body: Vec<u8>) {
            let _ = parse_signature_header(&header);
            let _ = verify_signature("m1", "t1", &body, &header, b"secret");
        }
    }
}
