//! Domain name normalization and syntax checks

/// Canonical form of a host name: trimmed, lowercased, without the
/// trailing root dot. No syntax check happens here.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

/// True when `domain` looks like a hostname: at least two labels of ASCII
/// letters, digits, hyphens or underscores, no label starting or ending
/// with a hyphen.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}
