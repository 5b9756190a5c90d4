/*
 * encoding.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Character encoding detection for raw document bytes.
 *
 * Detection order: byte order mark, UTF-16 byte pattern, the `encoding`
 * pseudo-attribute of the XML declaration, then UTF-8. Valid UTF-8 input is
 * borrowed as-is.
 */

use std::borrow::Cow;

/// Encodings the loader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

/// Result of sniffing the first bytes of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub encoding: XmlEncoding,
    /// Length of the byte order mark to skip.
    pub bom_len: usize,
    /// The declared encoding name, when it names something we cannot decode.
    pub unsupported: Option<String>,
}

impl XmlEncoding {
    /// Detect the encoding of `input`.
    pub fn detect(input: &[u8]) -> Detected {
        let detected = |encoding, bom_len| Detected {
            encoding,
            bom_len,
            unsupported: None,
        };

        match input {
            [0xEF, 0xBB, 0xBF, ..] => detected(XmlEncoding::Utf8, 3),
            [0xFF, 0xFE, ..] => detected(XmlEncoding::Utf16Le, 2),
            [0xFE, 0xFF, ..] => detected(XmlEncoding::Utf16Be, 2),
            [b'<', 0x00, ..] => detected(XmlEncoding::Utf16Le, 0),
            [0x00, b'<', ..] => detected(XmlEncoding::Utf16Be, 0),
            _ => match declared_encoding(input) {
                None => detected(XmlEncoding::Utf8, 0),
                Some(name) => match name.to_ascii_lowercase().as_str() {
                    "utf-8" | "utf8" | "us-ascii" | "ascii" | "utf-16" | "utf16" => {
                        detected(XmlEncoding::Utf8, 0)
                    }
                    "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" => {
                        detected(XmlEncoding::Latin1, 0)
                    }
                    _ => Detected {
                        encoding: XmlEncoding::Utf8,
                        bom_len: 0,
                        unsupported: Some(name),
                    },
                },
            },
        }
    }
}

/// The `encoding` pseudo-attribute of a leading XML declaration.
fn declared_encoding(input: &[u8]) -> Option<String> {
    let rest = input.strip_prefix(b"<?xml")?;
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&rest[..end]).ok()?;

    let after = &decl[decl.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    let close = value.find(quote)?;
    Some(value[..close].to_string())
}

/// Decode raw document bytes to text.
///
/// With `lenient`, undecodable bytes become U+FFFD and an unsupported declared
/// encoding falls back to UTF-8; otherwise both are errors.
pub fn decode_content(content: &[u8], lenient: bool) -> Result<Cow<'_, str>, String> {
    let detected = XmlEncoding::detect(content);
    let body = &content[detected.bom_len..];

    if let Some(name) = &detected.unsupported {
        if !lenient {
            return Err(format!("Unsupported encoding {}", name));
        }
        tracing::warn!(encoding = %name, "Unsupported declared encoding, decoding as UTF-8");
    }

    match detected.encoding {
        XmlEncoding::Utf8 => match std::str::from_utf8(body) {
            Ok(text) => Ok(Cow::Borrowed(text)),
            Err(err) if lenient => {
                tracing::warn!(offset = err.valid_up_to(), "Invalid UTF-8 replaced");
                Ok(String::from_utf8_lossy(body))
            }
            Err(err) => Err(format!(
                "Input is not proper UTF-8, indicate encoding ! Invalid byte at offset {}",
                detected.bom_len + err.valid_up_to()
            )),
        },
        XmlEncoding::Latin1 => Ok(Cow::Owned(body.iter().map(|&b| char::from(b)).collect())),
        XmlEncoding::Utf16Le => decode_utf16(body, u16::from_le_bytes, lenient).map(Cow::Owned),
        XmlEncoding::Utf16Be => decode_utf16(body, u16::from_be_bytes, lenient).map(Cow::Owned),
    }
}

fn decode_utf16(
    body: &[u8],
    unit: fn([u8; 2]) -> u16,
    lenient: bool,
) -> Result<String, String> {
    if body.len() % 2 != 0 && !lenient {
        return Err("Invalid UTF-16: odd number of bytes".to_string());
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();

    if lenient {
        Ok(String::from_utf16_lossy(&units))
    } else {
        String::from_utf16(&units).map_err(|e| format!("Invalid UTF-16: {}", e))
    }
}
