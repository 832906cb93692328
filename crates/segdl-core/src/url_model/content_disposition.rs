//! Content-Disposition header parsing (`filename` and RFC 5987 `filename*`).

/// Filename carried by a Content-Disposition value, if any.
///
/// `filename*` (with `UTF-8` or `ISO-8859-1` charset) wins over a plain
/// `filename` parameter. Quoted values may contain `;` and escaped quotes.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain = None;
    for (name, value) in params(header_value) {
        if name.eq_ignore_ascii_case("filename*") {
            if let Some(v) = decode_ext_value(&value).filter(|v| !v.is_empty()) {
                return Some(v);
            }
        } else if name.eq_ignore_ascii_case("filename") && !value.is_empty() {
            plain = Some(value);
        }
    }
    plain
}

/// Splits `type; a=b; c="d;e"` into unquoted `(name, value)` pairs.
fn params(header_value: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = header_value.chars().peekable();

    // Skip the disposition type.
    for c in chars.by_ref() {
        if c == ';' {
            break;
        }
    }

    loop {
        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '=' || c == ';' {
                break;
            }
            name.push(c);
        }
        let name = name.trim().to_string();
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        if !name.is_empty() {
            out.push((name, value));
        }
        if chars.peek().is_none() {
            break;
        }
    }
    out
}

/// Decodes an RFC 5987 `charset'lang'pct-encoded` value.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _lang = parts.next()?;
    let encoded = parts.next()?;
    let bytes = percent_decode(encoded);
    if charset.eq_ignore_ascii_case("utf-8") {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(bytes.into_iter().map(char::from).collect())
    } else {
        None
    }
}

/// Percent-decodes to raw bytes; malformed escapes are kept literally.
pub(super) fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_and_token_forms() {
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=\"report.pdf\"").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn quoted_value_may_contain_separators() {
        assert_eq!(
            parse_content_disposition_filename(r#"attachment; filename="a;b \"c\".txt"; size=3"#)
                .as_deref(),
            Some("a;b \"c\".txt")
        );
    }

    #[test]
    fn extended_value_wins() {
        assert_eq!(
            parse_content_disposition_filename(
                "attachment; filename=\"fallback.bin\"; filename*=UTF-8''real%20name.dat",
            )
            .as_deref(),
            Some("real name.dat")
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename*=utf-8'en'caf%C3%A9.txt")
                .as_deref(),
            Some("café.txt")
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename*=iso-8859-1''caf%E9.txt")
                .as_deref(),
            Some("café.txt")
        );
    }

    #[test]
    fn malformed_escapes_are_literal() {
        assert_eq!(percent_decode("100%"), b"100%".to_vec());
        assert_eq!(percent_decode("%zz%41"), b"%zzA".to_vec());
    }
}
