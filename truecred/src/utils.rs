use crate::error::{Result, TruecredError};

/// Validate an EVM account address and return it lowercased with `0x` prefix.
///
/// # Errors
///
/// Returns `TruecredError::Validation` unless the input is 20 bytes of hex.
pub fn normalize_address(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if stripped.len() != 40 {
        return Err(TruecredError::Validation(format!(
            "invalid wallet address length: {}",
            stripped.len()
        )));
    }

    let bytes = hex::decode(stripped)
        .map_err(|e| TruecredError::Validation(format!("invalid wallet address: {e}")))?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Shorten an address for log lines: `0x1234..abcd`.
///
/// Works on chars, so backend-supplied values that are not hex never panic.
pub fn mask_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}..{tail}")
}

/// Shorten a bearer token so it can be printed without leaking it.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(8).collect();
    if visible.len() == token.len() {
        return "*".repeat(token.len());
    }
    format!("{visible}...({} chars)", token.len())
}
