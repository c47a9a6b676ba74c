//! Attachments found while walking a message.

/// A true attachment: a named, non-empty leaf part with a disposition.
///
/// Borrows the payload from the [`ParsedMessage`](super::message::ParsedMessage)
/// it was found in; it only lives until it is written or reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentCandidate<'a> {
    /// Filename with encoded words resolved.
    pub filename: String,
    /// MIME type of the part, e.g. `"application/pdf"`.
    pub content_type: String,
    /// Transfer-decoded payload, never empty.
    pub payload: &'a [u8],
}

impl AttachmentCandidate<'_> {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}
