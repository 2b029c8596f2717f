//! Salted, timestamped HMAC envelopes for stateless tokens.
//!
//! Token layout: `<payload>:<timestamp>:<signature>`
//!
//! - `payload` is base64url (no padding) JSON, or `.` followed by base64url
//!   zlib-compressed JSON when compression was requested and pays off.
//! - `timestamp` is the signing time in unix seconds, base62 encoded. Callers
//!   pass the clock in, which keeps expiry testable.
//! - `signature` is base64url HMAC-SHA256 over `payload:timestamp`, keyed with
//!   `SHA256(salt + "signer" + secret)` so that the same secret yields
//!   unrelated keys for different salts.

use std::io::{Read, Write};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SEP: char = ':';
const COMPRESSED_MARKER: char = '.';
const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("bad signature: {0}")]
    BadSignature(String),
    #[error("signature age {age}s > {max_age}s")]
    SignatureExpired { age: i64, max_age: i64 },
    #[error("cannot encode payload: {0}")]
    Encode(String),
}

fn bad(msg: impl Into<String>) -> SigningError {
    SigningError::BadSignature(msg.into())
}

#[derive(Clone)]
pub struct TimestampSigner {
    key: [u8; 32],
}

impl std::fmt::Debug for TimestampSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampSigner").finish_non_exhaustive()
    }
}

impl TimestampSigner {
    pub fn new(secret: &str, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"signer");
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, SigningError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|e| SigningError::Encode(format!("invalid hmac key: {e}")))
    }

    fn signature(&self, signed_part: &str) -> Result<String, SigningError> {
        let mut mac = self.mac()?;
        mac.update(signed_part.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    pub fn sign_object_at<T: Serialize>(
        &self,
        obj: &T,
        compress: bool,
        now: i64,
    ) -> Result<String, SigningError> {
        let json = serde_json::to_vec(obj).map_err(|e| SigningError::Encode(e.to_string()))?;

        let mut payload = None;
        if compress {
            let compressed = zlib_compress(&json)?;
            if compressed.len() < json.len() {
                payload = Some(format!("{}{}", COMPRESSED_MARKER, URL_SAFE_NO_PAD.encode(compressed)));
            }
        }
        let payload = payload.unwrap_or_else(|| URL_SAFE_NO_PAD.encode(&json));

        let signed_part = format!("{}{}{}", payload, SEP, base62_encode(now));
        let sig = self.signature(&signed_part)?;
        Ok(format!("{}{}{}", signed_part, SEP, sig))
    }

    /// Fails with `SignatureExpired` when more than `max_age` seconds
    /// separate the embedded timestamp from `now`.
    pub fn unsign_object_at<T: DeserializeOwned>(
        &self,
        token: &str,
        max_age: i64,
        now: i64,
    ) -> Result<T, SigningError> {
        let (signed_part, sig) = token
            .rsplit_once(SEP)
            .ok_or_else(|| bad("no separator in token"))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| bad("signature is not base64"))?;

        let mut mac = self.mac()?;
        mac.update(signed_part.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| bad("signature does not match"))?;

        let (payload, ts) = signed_part
            .rsplit_once(SEP)
            .ok_or_else(|| bad("no timestamp in token"))?;
        let ts = base62_decode(ts).ok_or_else(|| bad("malformed timestamp"))?;

        let age = now - ts;
        if age > max_age {
            debug!(age, max_age, "signature expired");
            return Err(SigningError::SignatureExpired { age, max_age });
        }

        let json = match payload.strip_prefix(COMPRESSED_MARKER) {
            Some(rest) => {
                let raw = URL_SAFE_NO_PAD
                    .decode(rest)
                    .map_err(|_| bad("payload is not base64"))?;
                zlib_decompress(&raw).map_err(|_| bad("payload does not decompress"))?
            }
            None => URL_SAFE_NO_PAD
                .decode(payload)
                .map_err(|_| bad("payload is not base64"))?,
        };

        serde_json::from_slice(&json).map_err(|e| bad(format!("payload is not valid json: {e}")))
    }
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)
        .map_err(|e| SigningError::Encode(e.to_string()))?;
    enc.finish().map_err(|e| SigningError::Encode(e.to_string()))
}

fn zlib_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn base62_encode(mut n: i64) -> String {
    if n <= 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE62[(n % 62) as usize]);
        n /= 62;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn base62_decode(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    s.bytes().try_fold(0i64, |acc, b| {
        let digit = BASE62.iter().position(|&c| c == b)? as i64;
        acc.checked_mul(62)?.checked_add(digit)
    })
}
