use std::borrow::Cow;

const TOKEN_FIELDS: [&str; 5] = [
    "\"token\"",
    "\"access_token\"",
    "\"accessToken\"",
    "\"refresh_token\"",
    "\"refreshToken\"",
];

/// Replaces the string value of well-known token fields in JSON text.
pub fn redact_token_fields(input: &str) -> Cow<'_, str> {
    let mut redacted = input.to_string();

    for field in TOKEN_FIELDS {
        if !redacted.contains(field) {
            continue;
        }
        let mut out = String::with_capacity(redacted.len());
        let mut rest = redacted.as_str();
        while let Some(idx) = rest.find(field) {
            let after_field = idx + field.len();
            out.push_str(&rest[..after_field]);
            rest = &rest[after_field..];

            // Only `"field" : "value"` pairs are touched.
            let trimmed = rest.trim_start();
            let Some(after_colon) = trimmed.strip_prefix(':') else {
                continue;
            };
            let after_colon = after_colon.trim_start();
            let Some(value) = after_colon.strip_prefix('"') else {
                continue;
            };
            let Some(end) = value.find('"') else {
                continue;
            };
            out.push_str(":\"REDACTED\"");
            rest = &value[end + 1..];
        }
        out.push_str(rest);
        redacted = out;
    }

    if redacted == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(redacted)
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| hay[i..i + nee.len()].eq_ignore_ascii_case(nee))
}

fn redact_bearer(text: String) -> String {
    const BEARER: &str = "bearer ";

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    loop {
        let Some(idx) = find_ascii_case_insensitive(rest, BEARER) else {
            out.push_str(rest);
            break;
        };
        // Keep the scheme as written.
        out.push_str(&rest[..idx + BEARER.len()]);
        rest = &rest[idx + BEARER.len()..];

        let consumed: usize = rest
            .chars()
            .take_while(|ch| !ch.is_whitespace() && *ch != '"' && *ch != ',' && *ch != ';')
            .map(char::len_utf8)
            .sum();
        if consumed > 0 {
            out.push_str("REDACTED");
        }
        rest = &rest[consumed..];
    }
    out
}

/// Scrubs bearer tokens and token-bearing JSON fields out of free text.
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let value = redact_bearer(redact_token_fields(input).into_owned());

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}

/// Masks exact occurrences of tokens this process sent, leaving all other
/// text as the server wrote it.
pub fn mask_sent_tokens<'a>(input: &'a str, sent: &[&str]) -> Cow<'a, str> {
    let mut value = Cow::Borrowed(input);
    for token in sent.iter().filter(|t| !t.is_empty()) {
        if value.contains(token) {
            value = Cow::Owned(value.replace(token, "REDACTED"));
        }
    }
    value
}
