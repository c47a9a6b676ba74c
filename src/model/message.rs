//! Parsed message tree.
//!
//! This is the shape the attachment walk operates on. It is produced from
//! raw bytes by [`crate::parser::mime::parse_message`], but can just as well
//! be assembled by hand, which is how most tests build it.

/// A fetched message: the headers needed for reporting plus the part tree.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Raw (still encoded) header values used for the per-message trace.
    pub headers: MessageHeaders,
    /// Top-level part. For a simple message this is the only part.
    pub root: MessagePart,
}

/// Raw header values as they appeared in the message.
///
/// Values are unfolded but NOT decoded; decoding happens when they are
/// reported, so a broken encoded word never prevents a message from
/// being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
}

/// One node of the MIME tree.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub content_type: ContentType,
    /// `None` when the part has no `Content-Disposition` header at all.
    pub disposition: Option<Disposition>,
    /// Filename from the disposition or content-type parameters, still encoded.
    pub filename: Option<String>,
    pub body: PartBody,
}

/// Content of a part.
#[derive(Debug, Clone)]
pub enum PartBody {
    /// `multipart/*` container.
    Multipart(Vec<MessagePart>),
    /// Embedded `message/rfc822`; the inner message's top-level part.
    Message(Box<MessagePart>),
    /// Leaf part with its transfer-decoded payload.
    Single(Vec<u8>),
}

impl Default for PartBody {
    fn default() -> Self {
        Self::Single(Vec::new())
    }
}

/// `maintype/subtype`, lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub maintype: String,
    pub subtype: String,
}

impl ContentType {
    /// Build a content type, normalizing case.
    pub fn new(maintype: &str, subtype: &str) -> Self {
        Self {
            maintype: maintype.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.maintype == "multipart"
    }
}

impl Default for ContentType {
    /// RFC 2045 §5.2: a part without `Content-Type` is `text/plain`.
    fn default() -> Self {
        Self::new("text", "plain")
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.maintype, self.subtype)
    }
}

/// Value of a `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
    /// Any other token a sender put there. Still counts as "present".
    Other(String),
}

impl Disposition {
    /// Classify a disposition token (case-insensitive).
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("inline") {
            Self::Inline
        } else if token.eq_ignore_ascii_case("attachment") {
            Self::Attachment
        } else {
            Self::Other(token.to_ascii_lowercase())
        }
    }
}

impl MessagePart {
    /// A leaf part with the given payload.
    pub fn single(content_type: ContentType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type,
            disposition: None,
            filename: None,
            body: PartBody::Single(payload.into()),
        }
    }

    /// A `multipart/<subtype>` container.
    pub fn multipart(subtype: &str, children: Vec<MessagePart>) -> Self {
        Self {
            content_type: ContentType::new("multipart", subtype),
            disposition: None,
            filename: None,
            body: PartBody::Multipart(children),
        }
    }

    /// Builder-style setter for the disposition and filename.
    pub fn with_disposition(mut self, disposition: Disposition, filename: Option<&str>) -> Self {
        self.disposition = Some(disposition);
        self.filename = filename.map(String::from);
        self
    }

    /// The leaf payload, or `None` for container parts.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            PartBody::Single(bytes) => Some(bytes),
            PartBody::Multipart(_) | PartBody::Message(_) => None,
        }
    }

    /// Direct children, in order.
    pub fn children(&self) -> &[MessagePart] {
        match &self.body {
            PartBody::Multipart(children) => children,
            PartBody::Message(inner) => std::slice::from_ref(&**inner),
            PartBody::Single(_) => &[],
        }
    }
}
