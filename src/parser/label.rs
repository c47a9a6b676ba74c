//! Gmail / IMAP mailbox names in modified UTF-7 (RFC 3501 §5.1.3).
//!
//! Non-ASCII label names travel as `&...-` runs holding base64 of UTF-16BE,
//! with `,` in place of `/` and without padding. Everything outside those
//! runs is plain ASCII and is kept as-is.

use base64::Engine;
use tracing::debug;

use super::{decode_base64_unpadded, Decoded};

/// Decode a mailbox name as returned by `LIST` into readable text.
///
/// Escaped quotes (`\"`) from the listing are unescaped first. Each `&...-`
/// run is decoded on its own; a run that cannot be decoded is emitted with
/// its original `&`/`-` delimiters. A `&` that is never closed is kept
/// verbatim along with the rest of the name.
pub fn decode_label(raw: &str) -> String {
    let label = raw.replace("\\\"", "\"");
    let mut result = String::with_capacity(label.len());
    let mut remaining = label.as_str();

    while !remaining.is_empty() {
        match remaining.find('&') {
            Some(0) => match remaining.find('-') {
                Some(end) => {
                    let run = &remaining[..=end];
                    result.push_str(decode_label_run(run).as_str());
                    remaining = &remaining[end + 1..];
                }
                None => {
                    result.push_str(remaining);
                    break;
                }
            },
            Some(start) => {
                result.push_str(&remaining[..start]);
                remaining = &remaining[start..];
            }
            None => {
                result.push_str(remaining);
                break;
            }
        }
    }

    result
}

/// Decode one `&...-` run, including its delimiters.
///
/// `&-` is the escape for a literal `&`. Anything that is not valid
/// base64 of whole UTF-16BE code units comes back as [`Decoded::PassThrough`].
pub fn decode_label_run(run: &str) -> Decoded<'_> {
    let payload = run
        .strip_prefix('&')
        .and_then(|s| s.strip_suffix('-'));

    let Some(payload) = payload else {
        return Decoded::PassThrough(run);
    };
    if payload.is_empty() {
        return Decoded::Text("&".to_string());
    }

    match decode_utf16be_base64(&payload.replace(',', "/")) {
        Some(text) => Decoded::Text(text),
        None => {
            debug!(run, "Undecodable modified UTF-7 run, keeping raw text");
            Decoded::PassThrough(run)
        }
    }
}

fn decode_utf16be_base64(payload: &str) -> Option<String> {
    let bytes = decode_base64_unpadded(payload)?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Encode a readable label into modified UTF-7, ready for `SELECT`.
///
/// Printable ASCII passes through, `&` becomes `&-`, and every maximal run
/// of other characters becomes one `&...-` run.
pub fn encode_label(label: &str) -> String {
    let mut result = String::with_capacity(label.len());
    let mut pending = String::new();

    for c in label.chars() {
        if (' '..='~').contains(&c) {
            if !pending.is_empty() {
                push_encoded_run(&mut result, &pending);
                pending.clear();
            }
            if c == '&' {
                result.push_str("&-");
            } else {
                result.push(c);
            }
        } else {
            pending.push(c);
        }
    }
    if !pending.is_empty() {
        push_encoded_run(&mut result, &pending);
    }

    result
}

fn push_encoded_run(out: &mut String, text: &str) {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes);
    out.push('&');
    out.push_str(&encoded.replace('/', ","));
    out.push('-');
}
