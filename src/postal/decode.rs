use crate::postal::mojibake::{self, MOJIBAKE_TABLE};

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

impl SourceEncoding {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub text: String,
    pub encoding: SourceEncoding,
    pub substitutions: usize,
    pub passes: usize,
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

fn decode_raw(bytes: &[u8]) -> (String, SourceEncoding) {
    let (raw, encoding) = match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), SourceEncoding::Utf8),
        Err(_) => (decode_latin1(bytes), SourceEncoding::Latin1),
    };
    match raw.strip_prefix(UTF8_BOM) {
        Some(stripped) => (stripped.to_string(), encoding),
        None => (raw, encoding),
    }
}

pub fn decode_payload(bytes: &[u8]) -> DecodedPayload {
    let (raw, encoding) = decode_raw(bytes);
    let repaired = mojibake::repair_with(&raw, MOJIBAKE_TABLE);
    DecodedPayload {
        text: repaired.text,
        encoding,
        substitutions: repaired.substitutions,
        passes: repaired.passes,
    }
}

pub fn decode(bytes: &[u8]) -> String {
    mojibake::repair(&decode_raw(bytes).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_utf8_is_kept() {
        let payload = decode_payload(b"Caf\xc3\xa9");
        assert_eq!(payload.text, "Café");
        assert_eq!(payload.encoding, SourceEncoding::Utf8);
        assert_eq!(payload.substitutions, 0);
    }

    #[test]
    fn double_encoded_utf8_is_repaired() {
        // "café" encoded as UTF-8, read as Latin-1, written back as UTF-8.
        let payload = decode_payload("cafÃ©".as_bytes());
        assert_eq!(payload.text, "café");
        assert_eq!(payload.encoding, SourceEncoding::Utf8);
        assert_eq!(payload.substitutions, 1);
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1() {
        let payload = decode_payload(b"Li\xe8ge");
        assert_eq!(payload.text, "Liège");
        assert_eq!(payload.encoding, SourceEncoding::Latin1);
    }

    #[test]
    fn mixed_payload_recovers_utf8_runs_after_fallback() {
        // A stray Latin-1 byte forces the fallback; the UTF-8 run for "é"
        // then shows up as "Ã©" and is repaired.
        let payload = decode_payload(b"Li\xe8ge;caf\xc3\xa9");
        assert_eq!(payload.encoding, SourceEncoding::Latin1);
        assert_eq!(payload.text, "Liège;café");
    }

    #[test]
    fn leading_bom_is_dropped() {
        assert_eq!(decode(b"\xef\xbb\xbfid,name"), "id,name");
    }

    #[test]
    fn every_byte_value_decodes() {
        let all: Vec<u8> = (0..=255).collect();
        let text = decode(&all);
        assert!(!text.is_empty());
        let mut reversed = all.clone();
        reversed.reverse();
        assert!(!decode(&reversed).is_empty());
        assert_eq!(decode(b""), "");
    }
}
