use anyhow::{Context, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use unicode_normalization::UnicodeNormalization;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut h = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(format!("{:x}", h.finalize()))
}

/// Turns roster values into single path components.
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    unsafe_chars: Regex,
}

impl PathSanitizer {
    pub fn new() -> Result<Self> {
        let unsafe_chars = Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#)
            .with_context(|| "compile path sanitizer")?;
        Ok(Self { unsafe_chars })
    }

    /// Separators and characters illegal on common filesystems become `_`.
    /// Returns `None` when nothing usable is left.
    pub fn component(&self, raw: &str) -> Option<String> {
        let nfc: String = raw.nfc().collect();
        let replaced = self.unsafe_chars.replace_all(&nfc, "_");
        let trimmed = replaced.trim().trim_matches('.').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
