//! Character sets for turning item bytes into text.

use std::fmt;

/// Charset used when neither configuration nor the content type names one.
pub const DEFAULT_CHARSET: &str = "ISO-8859-1";

/// Decoders available to [`EncryptedItem::string`](crate::EncryptedItem::string).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    UsAscii,
    Iso8859_1,
    Utf16Be,
    Utf16Le,
    /// UTF-16 with optional byte order mark, big-endian when absent
    Utf16,
}

impl Charset {
    /// Look up a charset by label, ignoring case and the usual aliases.
    pub fn for_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let charset = match normalized.as_str() {
            "utf-8" | "utf8" => Charset::Utf8,
            "us-ascii" | "ascii" | "iso646-us" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "iso_8859_1" | "latin1" | "l1" => {
                Charset::Iso8859_1
            }
            "utf-16be" | "utf16be" => Charset::Utf16Be,
            "utf-16le" | "utf16le" => Charset::Utf16Le,
            "utf-16" | "utf16" => Charset::Utf16,
            _ => return None,
        };
        Some(charset)
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => DEFAULT_CHARSET,
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16 => "UTF-16",
        }
    }

    /// Decode `bytes`, substituting U+FFFD for anything malformed.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            // Latin-1 maps every byte straight onto U+0000..=U+00FF
            Charset::Iso8859_1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Charset::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Charset::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Charset::Utf16 => match bytes {
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                _ => decode_utf16(bytes, u16::from_be_bytes),
            },
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks(2).map(|pair| match *pair {
        [hi, lo] => unit([hi, lo]),
        // Dangling odd byte
        _ => 0xFFFD,
    });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decode with the charset named by `label`, or lossy UTF-8 if it is unknown.
pub fn decode_with_label(bytes: &[u8], label: &str) -> String {
    match Charset::for_label(label) {
        Some(charset) => charset.decode(bytes),
        None => {
            tracing::debug!(charset = label, "Unsupported charset, decoding as UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Pull the `charset` parameter out of a content type such as
/// `text/plain; charset="UTF-8"`.
///
/// Parameter names are matched case-insensitively and surrounding quotes are
/// stripped from the value.
pub fn content_type_charset(content_type: Option<&str>) -> Option<String> {
    content_type?
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_aliases() {
        assert_eq!(Charset::for_label("UTF-8"), Some(Charset::Utf8));
        assert_eq!(Charset::for_label(" latin1 "), Some(Charset::Iso8859_1));
        assert_eq!(Charset::for_label("Iso-8859-1"), Some(Charset::Iso8859_1));
        assert_eq!(Charset::for_label("utf-16le"), Some(Charset::Utf16Le));
        assert_eq!(Charset::for_label("x-klingon"), None);
    }

    #[test]
    fn test_latin1_maps_high_bytes() {
        assert_eq!(Charset::Iso8859_1.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_ascii_replaces_high_bytes() {
        assert_eq!(Charset::UsAscii.decode(b"ok\xFF"), "ok\u{FFFD}");
    }

    #[test]
    fn test_utf16_variants() {
        assert_eq!(Charset::Utf16Be.decode(&[0x00, 0x68, 0x00, 0x69]), "hi");
        assert_eq!(Charset::Utf16Le.decode(&[0x68, 0x00, 0x69, 0x00]), "hi");
        assert_eq!(Charset::Utf16.decode(&[0xFF, 0xFE, 0x68, 0x00]), "h");
        assert_eq!(Charset::Utf16.decode(&[0x00, 0x68]), "h");
        assert_eq!(Charset::Utf16Be.decode(&[0x00, 0x68, 0x00]), "h\u{FFFD}");
    }

    #[test]
    fn test_unknown_label_falls_back_to_utf8() {
        assert_eq!(decode_with_label("naïve".as_bytes(), "x-unknown"), "naïve");
    }

    #[test]
    fn test_content_type_charset() {
        assert_eq!(
            content_type_charset(Some("text/plain; charset=UTF-8")),
            Some("UTF-8".to_string())
        );
        assert_eq!(
            content_type_charset(Some("text/html;Charset=\"iso-8859-1\"; q=0.5")),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(content_type_charset(Some("application/octet-stream")), None);
        assert_eq!(content_type_charset(Some("text/plain; charset=")), None);
        assert_eq!(content_type_charset(None), None);
    }
}
