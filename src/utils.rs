//! Utility functions for the tinyml-ble-bridge crate.

/// Decode a notification payload as text.
///
/// Valid UTF-8 is returned with surrounding whitespace trimmed. Anything
/// else falls back to the debug rendering of the raw bytes, so a garbled
/// packet still reaches subscribers instead of failing the call.
///
/// # Example
///
/// ```
/// use tinyml_ble_bridge::decode_text;
///
/// assert_eq!(decode_text(b"Person: 0.87\r\n"), "Person: 0.87");
/// assert_eq!(decode_text(&[0xFF, 0x00]), "[255, 0]");
/// ```
pub fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.trim().to_string(),
        Err(_) => format!("{:?}", data),
    }
}

/// Render bytes as comma-joined two-digit uppercase hex (`"00,7F,FF"`).
///
/// # Example
///
/// ```
/// use tinyml_ble_bridge::to_hex_csv;
///
/// assert_eq!(to_hex_csv(&[0x00, 0x7F, 0xFF]), "00,7F,FF");
/// ```
pub fn to_hex_csv(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

/// Parse text produced by [`to_hex_csv`].
///
/// Newlines count as separators and spaces are ignored. Returns the first
/// token that is not a valid byte on failure.
pub fn parse_hex_csv(text: &str) -> std::result::Result<Vec<u8>, String> {
    text.replace('\n', ",")
        .replace([' ', '\r'], "")
        .split(',')
        .filter(|token| !token.is_empty())
        .map(|token| u8::from_str_radix(token, 16).map_err(|_| token.to_string()))
        .collect()
}
