// src/core/scanner/normalizer.rs

use tracing::debug;

use crate::core::error::InvalidDomainError;

/// Longest label DNS accepts, in octets.
const MAX_LABEL_LEN: usize = 63;

/// Converts a raw input line into the ASCII-compatible domain used for
/// DNS and HTTP.
///
/// Surrounding whitespace and a single trailing root dot are removed, then
/// every `.`-separated label is encoded on its own: ASCII labels pass
/// through untouched, internationalized labels become `xn--` punycode.
///
/// # Errors
/// Returns `InvalidDomainError` when a label is empty, longer than 63
/// octets once encoded, or contains code points IDNA rejects.
pub fn normalize_domain(raw: &str) -> Result<String, InvalidDomainError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(invalid(raw, "empty domain"));
    }

    let labels = trimmed
        .split('.')
        .map(|label| encode_label(raw, label))
        .collect::<Result<Vec<_>, _>>()?;

    let domain = labels.join(".");
    if domain != trimmed {
        debug!(input = %trimmed, ascii = %domain, "Encoded internationalized domain.");
    }
    Ok(domain)
}

fn encode_label(raw: &str, label: &str) -> Result<String, InvalidDomainError> {
    if label.is_empty() {
        return Err(invalid(raw, "empty label"));
    }

    let encoded = if label.is_ascii() {
        label.to_string()
    } else {
        let ascii = idna::domain_to_ascii(label)
            .map_err(|e| invalid(raw, &format!("label {label:?} rejected by IDNA: {e}")))?;
        // UTS #46 mapping may turn exotic dot characters into real dots,
        // which would smuggle extra labels in.
        if ascii.is_empty() || ascii.contains('.') {
            return Err(invalid(raw, &format!("label {label:?} does not map to one label")));
        }
        ascii
    };

    if encoded.len() > MAX_LABEL_LEN {
        return Err(invalid(
            raw,
            &format!("label exceeds {MAX_LABEL_LEN} octets ({})", encoded.len()),
        ));
    }
    Ok(encoded)
}

fn invalid(raw: &str, reason: &str) -> InvalidDomainError {
    InvalidDomainError {
        input: raw.to_string(),
        reason: reason.to_string(),
    }
}
