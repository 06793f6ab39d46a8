//! Deployment name derivation for relocated jobs.
//!
//! The platform accepts names matching
//! `^[a-z](?:[a-z0-9]|-(?!-)){1,30}[a-z0-9]$`, i.e. at most 32 characters,
//! starting with a letter and ending alphanumeric.

use rand::Rng;

/// Maximum deployment name length accepted by the platform.
pub const MAX_NAME_LEN: usize = 32;

/// Characters kept from the original application name.
pub const MAX_BASE_LEN: usize = 21;

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 7;

/// Marker between the original name and the random suffix.
pub const FALLBACK_MARKER: &str = "-fb-";

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derive a fresh destination name from `application_name`.
pub fn fallback_name(application_name: &str) -> String {
    let suffix = random_suffix(&mut rand::rng());
    fallback_name_with_suffix(application_name, &suffix)
}

/// Derive a destination name using a caller-provided suffix.
///
/// `suffix` is expected to be [`SUFFIX_LEN`] lowercase alphanumerics.
pub fn fallback_name_with_suffix(application_name: &str, suffix: &str) -> String {
    let sanitized = sanitize(application_name);
    let base = truncate_base(&sanitized);

    let mut name = format!("{base}{FALLBACK_MARKER}{suffix}");
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.replace_range(..1, "j");
    }
    name
}

/// Random lowercase base-36 suffix.
pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Returns true if `name` satisfies the platform naming grammar.
pub fn is_valid_deployment_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 2 || bytes.len() > MAX_NAME_LEN {
        return false;
    }
    if !bytes[0].is_ascii_lowercase() {
        return false;
    }
    if !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| is_alnum(b) || b == b'-')
        && !bytes.windows(2).any(|w| w == b"--")
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs of `-`
/// and trim them from both ends.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

// `sanitize` only emits ASCII, so byte slicing is safe here.
fn truncate_base(sanitized: &str) -> &str {
    let end = sanitized.len().min(MAX_BASE_LEN);
    sanitized[..end].trim_end_matches('-')
}
