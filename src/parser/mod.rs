//! Decoding of mailbox names, MIME headers, and message structure.

pub mod header;
pub mod label;
pub mod mime;

/// Outcome of decoding a single token (an encoded label run or an encoded word).
///
/// Decoding never fails outright: when the token cannot be decoded, the
/// original text is handed back unchanged as [`Decoded::PassThrough`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// The token was decoded successfully.
    Text(String),
    /// The token was malformed; this is its original text.
    PassThrough(&'a str),
}

impl Decoded<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::PassThrough(s) => s,
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough(_))
    }
}

/// Pad a base64 payload with `=` up to a multiple of four and decode it.
///
/// Both modified UTF-7 and many real-world encoded words drop the padding.
/// Whitespace is not skipped; callers that tolerate it trim first.
fn decode_base64_unpadded(payload: &str) -> Option<Vec<u8>> {
    use base64::Engine;

    let mut padded = payload.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    base64::engine::general_purpose::STANDARD
        .decode(padded.as_bytes())
        .ok()
}
