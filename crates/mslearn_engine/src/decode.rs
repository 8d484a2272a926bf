use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty response body")]
    Empty,
    #[error("failed to decode bytes with {encoding}")]
    DecodeFailure { encoding: String },
}

/// Bytes of the document head searched for a `<meta charset>` declaration.
const META_SNIFF_LEN: usize = 1024;

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> meta charset -> chardetng.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedHtml, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return decode_with(&bytes[bom_len..], encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    if let Some(enc) = sniff_meta_charset(bytes) {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches(['"', '\''].as_ref()).to_string())
            } else {
                None
            }
        })
        .next()
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''].as_ref())
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    Encoding::for_label(label.as_bytes())
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedHtml, DecodeError> {
    let (text, had_errors) = enc.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
        });
    }
    Ok(DecodedHtml {
        html: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_charset_wins_over_detection() {
        let bytes = b"<p>caf\xe9</p>";
        let decoded = decode_html(bytes, Some("text/html; Charset=\"ISO-8859-1\"")).unwrap();
        assert_eq!(decoded.html, "<p>caf\u{e9}</p>");
        assert_eq!(decoded.encoding_label, "windows-1252");
    }

    #[test]
    fn meta_charset_is_sniffed() {
        let bytes = b"<html><head><meta charset=\"windows-1252\"></head><body>\xe9</body></html>";
        let decoded = decode_html(bytes, Some("text/html")).unwrap();
        assert!(decoded.html.contains('\u{e9}'));
    }

    #[test]
    fn bom_is_stripped() {
        let decoded = decode_html(b"\xef\xbb\xbf<p>x</p>", None).unwrap();
        assert_eq!(decoded.html, "<p>x</p>");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn invalid_utf8_under_declared_utf8_fails() {
        let err = decode_html(b"<p>\xff\xfe\xfd</p>", Some("text/html; charset=utf-8")).unwrap_err();
        assert!(matches!(err, DecodeError::DecodeFailure { .. }));
        assert_eq!(decode_html(b"", None), Err(DecodeError::Empty));
    }
}
