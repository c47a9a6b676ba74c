//! RFC 5322 header handling: unfolding, encoded-words (RFC 2047), and dates.

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use super::{decode_base64_unpadded, Decoded};
use crate::model::message::MessageHeaders;

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Literal text is kept as-is. Whitespace separating two encoded words is
/// dropped (RFC 2047 §6.2). A malformed encoded word is kept verbatim.
pub fn decode_header_value(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let candidate = &remaining[start..];
        match encoded_word_len(candidate) {
            Some(len) => {
                let word = &candidate[..len];
                let decoded = decode_encoded_word(word);
                last_was_encoded = !decoded.is_pass_through();
                result.push_str(decoded.as_str());
                remaining = &candidate[len..];
            }
            None => {
                result.push_str("=?");
                remaining = &candidate[2..];
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Length of the `=?charset?enc?text?=` token at the start of `s`, if any.
fn encoded_word_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix("=?")?;
    let first_q = body.find('?')?;
    let second_q = first_q + 1 + body[first_q + 1..].find('?')?;
    let end = second_q + 1 + body[second_q + 1..].find("?=")?;
    Some(2 + end + 2)
}

/// Decode a single complete encoded word such as `=?ISO-8859-1?Q?caf=E9?=`.
pub fn decode_encoded_word(word: &str) -> Decoded<'_> {
    let Some(inner) = word
        .strip_prefix("=?")
        .and_then(|s| s.strip_suffix("?="))
    else {
        return Decoded::PassThrough(word);
    };

    let mut fields = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(text)) = (fields.next(), fields.next(), fields.next())
    else {
        return Decoded::PassThrough(word);
    };

    let bytes = match encoding {
        "B" | "b" => decode_base64_unpadded(text.trim()),
        "Q" | "q" => Some(decode_q_encoding(text)),
        _ => None,
    };

    match bytes {
        Some(bytes) => Decoded::Text(decode_charset(charset, &bytes)),
        None => {
            debug!(word, "Undecodable encoded word, keeping raw text");
            Decoded::PassThrough(word)
        }
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset. Unknown charsets fall back to UTF-8.
///
/// An RFC 2231 language suffix (`utf-8*en`) is ignored.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset = charset.split('*').next().unwrap_or(charset).trim();
    if charset.is_empty()
        || charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("utf8")
    {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            info!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            result.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Pull the reporting headers (Date, Subject, From) out of a raw header block.
pub fn parse_message_headers(raw_headers: &[u8]) -> MessageHeaders {
    let headers = unfold_headers(&decode_header_bytes(raw_headers));
    MessageHeaders {
        date: get_header(&headers, "date"),
        subject: get_header(&headers, "subject"),
        from: get_header(&headers, "from"),
    }
}

/// Parse a `Date:` header value, keeping the sender's UTC offset.
///
/// Tries RFC 2822 directly, then without a trailing zone comment
/// (`"... +0000 (UTC)"`), then lets `mail-parser` have a go.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }

    if let Some(pos) = trimmed.rfind(" (") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed[..pos].trim_end()) {
            return Some(dt);
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s lenient parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let rfc3339 = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&rfc3339).ok()
}
