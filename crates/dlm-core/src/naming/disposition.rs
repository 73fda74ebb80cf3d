//! `Content-Disposition` file-name extraction.

/// Extracts the file name from a raw `Content-Disposition` value.
///
/// `filename*=UTF-8''...` (RFC 5987) wins over a plain `filename=` token or
/// quoted string.
pub fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in value.split(';').map(str::trim) {
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        let v = v.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = v
                    .split_once("''")
                    .filter(|(charset, _)| charset.eq_ignore_ascii_case("utf-8"))
                    .map(|(_, rest)| rest);
                if let Some(decoded) = encoded.map(percent_decode).filter(|s| !s.is_empty()) {
                    return Some(decoded);
                }
            }
            "filename" => {
                let unquoted = match v.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                    Some(inner) => unescape_quoted(inner),
                    None => v.to_string(),
                };
                if !unquoted.is_empty() {
                    plain = Some(unquoted);
                }
            }
            _ => {}
        }
    }

    plain
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Lossy percent-decoding; malformed escapes are kept verbatim.
pub(super) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(b) = hex {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_and_token_forms() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"report.pdf\"").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            disposition_file_name("attachment; filename=report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            disposition_file_name("attachment; filename=\"a \\\"b\\\".txt\"").as_deref(),
            Some("a \"b\".txt")
        );
    }

    #[test]
    fn extended_form_wins() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"fallback.bin\"; filename*=UTF-8''real%20name.dat")
                .as_deref(),
            Some("real name.dat")
        );
        assert_eq!(
            disposition_file_name("attachment; filename*=utf-8''caf%C3%A9.txt").as_deref(),
            Some("café.txt")
        );
    }

    #[test]
    fn missing_name() {
        assert_eq!(disposition_file_name("inline"), None);
        assert_eq!(disposition_file_name("attachment; filename=\"\""), None);
    }

    #[test]
    fn percent_decode_keeps_malformed_escapes() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("a%41"), "aA");
    }
}
