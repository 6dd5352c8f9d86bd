//! UI fingerprinting for change detection.
//!
//! Clock readouts and accessibility descriptions change on their own every
//! few seconds, so they are masked before hashing. Equal fingerprints mean
//! "same screen" for capture purposes; screens that differ only in masked
//! content are not told apart.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 128-bit content hash of a normalized hierarchy dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiFingerprint([u8; 16]);

impl UiFingerprint {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Last six hex digits, enough to tell fingerprints apart in logs.
    pub fn short(&self) -> String {
        let full = self.to_string();
        full[full.len() - 6..].to_string()
    }
}

impl fmt::Display for UiFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}:\d{2}\b").expect("clock pattern"))
}

fn content_desc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"content-desc="[^"]*""#).expect("content-desc pattern"))
}

/// Strip volatile content from a raw dump.
pub fn normalize(raw: &str) -> Cow<'_, str> {
    match content_desc_re().replace_all(raw, "") {
        Cow::Borrowed(s) => clock_re().replace_all(s, ""),
        Cow::Owned(s) => Cow::Owned(clock_re().replace_all(&s, "").into_owned()),
    }
}

/// Fingerprint a raw hierarchy dump.
pub fn fingerprint(raw: &str) -> UiFingerprint {
    let digest = Sha256::digest(normalize(raw).as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    UiFingerprint(out)
}
