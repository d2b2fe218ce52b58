//! Filename extraction from `Content-Disposition` headers
//!
//! Supports the RFC 6266 forms servers actually send:
//! - `attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pptx` (RFC 5987, preferred)
//! - `attachment; filename="Course Slides.pptx"` (quoted, with `\"` escapes)
//! - `attachment; filename=slides.pptx` (bare token)

/// Resolve the filename carried by a `Content-Disposition` header value.
///
/// The extended `filename*` parameter wins over the plain `filename`
/// parameter regardless of their order. Returns `None` when neither yields a
/// usable name; callers fall back to their own default.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut extended = None;
    let mut plain = None;

    for (name, value) in parameters(header) {
        if name.eq_ignore_ascii_case("filename*") {
            if extended.is_none() {
                extended = decode_extended(&value);
            }
        } else if name.eq_ignore_ascii_case("filename") && plain.is_none() {
            plain = Some(value);
        }
    }

    extended
        .or(plain)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Split the parameters following the disposition type into `(name, value)`
/// pairs. Malformed parameters are skipped.
fn parameters(header: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some((_, mut rest)) = header.split_once(';') else {
        return params;
    };

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        // A token without '=' before the next ';' is not a parameter
        let Some(eq) = rest.find(['=', ';']).filter(|&i| rest.as_bytes()[i] == b'=') else {
            match rest.find(';') {
                Some(i) => {
                    rest = &rest[i..];
                    continue;
                }
                None => break,
            }
        };

        let name = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();

        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => read_quoted(quoted),
            None => match after.find(';') {
                Some(i) => (after[..i].trim().to_string(), &after[i..]),
                None => (after.trim().to_string(), ""),
            },
        };

        if !name.is_empty() {
            params.push((name, value));
        }
        rest = remainder;
    }

    params
}

/// Read a quoted-string body (opening quote already consumed)
fn read_quoted(input: &str) -> (String, &str) {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, &input[i + 1..]),
            other => value.push(other),
        }
    }

    // Unterminated: take everything
    (value, "")
}

/// Decode an RFC 5987 `charset'language'percent-encoded` value
fn decode_extended(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('"');
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    if charset.eq_ignore_ascii_case("iso-8859-1") {
        let bytes = urlencoding::decode_binary(encoded.as_bytes());
        return Some(bytes.iter().map(|&b| char::from(b)).collect());
    }

    urlencoding::decode(encoded).ok().map(|decoded| decoded.into_owned())
}
