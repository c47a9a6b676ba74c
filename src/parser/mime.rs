//! MIME structure: raw message → part tree, and the attachment walk over it.

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, MessageParser, MimeHeaders, PartType};

use crate::error::{MailgrabError, Result};
use crate::model::attachment::AttachmentCandidate;
use crate::model::message::{ContentType, Disposition, MessagePart, ParsedMessage, PartBody};
use crate::parser::header::{decode_header_value, parse_message_headers};

/// Maximum depth for recursive multipart descent (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 10;

/// Parse a complete raw message (headers + body) into a [`ParsedMessage`].
///
/// Structure and transfer decoding come from `mail-parser`; the reporting
/// headers are read straight from the raw header block so they can be
/// decoded later with [`decode_header_value`].
pub fn parse_message(raw_message: &[u8]) -> Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw_message)
        .ok_or_else(|| MailgrabError::Parse("message is empty or has no headers".into()))?;

    Ok(ParsedMessage {
        headers: parse_message_headers(header_block(raw_message)),
        root: convert_part(&message, 0, 0),
    })
}

/// Everything before the first blank line.
fn header_block(data: &[u8]) -> &[u8] {
    let lf = data.windows(2).position(|w| w == b"\n\n");
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n");
    let end = match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => data.len(),
    };
    &data[..end]
}

fn convert_part(message: &mail_parser::Message<'_>, id: usize, depth: usize) -> MessagePart {
    let Some(part) = message.parts.get(id) else {
        return MessagePart::default();
    };

    let content_type = part
        .content_type()
        .map(|ct| ContentType::new(ct.ctype(), ct.subtype().unwrap_or("")))
        .unwrap_or_default();
    let disposition = part
        .content_disposition()
        .map(|cd| Disposition::from_token(cd.ctype()));
    let filename = part.attachment_name().map(String::from);

    let body = match &part.body {
        PartType::Multipart(children) => {
            if depth >= MAX_DEPTH {
                tracing::warn!(depth, "Multipart nesting too deep, ignoring children");
                PartBody::Multipart(Vec::new())
            } else {
                PartBody::Multipart(
                    children
                        .iter()
                        .map(|&child| convert_part(message, child, depth + 1))
                        .collect(),
                )
            }
        }
        PartType::Message(inner) => {
            if depth >= MAX_DEPTH {
                tracing::warn!(depth, "Embedded message nesting too deep, ignoring it");
                PartBody::Multipart(Vec::new())
            } else {
                PartBody::Message(Box::new(convert_part(inner, 0, depth + 1)))
            }
        }
        // mail-parser hands text back re-encoded as UTF-8; attachments must keep their bytes.
        PartType::Text(text) | PartType::Html(text) => PartBody::Single(
            transfer_decoded_body(message, part).unwrap_or_else(|| text.as_bytes().to_vec()),
        ),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => PartBody::Single(bytes.to_vec()),
    };

    MessagePart {
        content_type: if matches!(body, PartBody::Multipart(_)) && !content_type.is_multipart() {
            ContentType::new("multipart", "mixed")
        } else {
            content_type
        },
        disposition,
        filename,
        body,
    }
}

/// The body of `part` with only its Content-Transfer-Encoding undone.
///
/// `None` if the offsets do not fit the raw message or the body does not
/// decode.
fn transfer_decoded_body(
    message: &mail_parser::Message<'_>,
    part: &mail_parser::MessagePart<'_>,
) -> Option<Vec<u8>> {
    let raw = message.raw_message.as_ref();
    let (start, end) = (part.raw_body_offset(), part.raw_end_offset());
    let Some(body) = raw.get(start..end).filter(|_| start <= end) else {
        tracing::debug!(start, end, "Part offsets outside the raw message");
        return None;
    };

    let decoded = match part.encoding {
        Encoding::Base64 => base64_decode(body),
        Encoding::QuotedPrintable => quoted_printable_decode(body),
        Encoding::None => Some(body.to_vec()),
    };
    if decoded.is_none() {
        tracing::debug!(encoding = ?part.encoding, "Could not transfer-decode part body");
    }
    decoded
}

/// One finding of the attachment walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<'a> {
    /// A named, non-empty attachment.
    Attachment(AttachmentCandidate<'a>),
    /// A named attachment whose payload was empty or missing; not downloadable.
    EmptyPayload { filename: String },
}

/// Walk a message depth-first and yield its true attachments, lazily.
///
/// A part is an attachment only if it is not `multipart/*`, carries a
/// `Content-Disposition` header (of any value), and has a filename. Body
/// alternatives without a disposition are never attachments, even when
/// they are named.
pub fn extract_attachments(message: &ParsedMessage) -> Attachments<'_> {
    Attachments {
        stack: vec![&message.root],
    }
}

/// Iterator returned by [`extract_attachments`].
#[derive(Debug)]
pub struct Attachments<'a> {
    stack: Vec<&'a MessagePart>,
}

impl<'a> Iterator for Attachments<'a> {
    type Item = Extracted<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(part) = self.stack.pop() {
            self.stack.extend(part.children().iter().rev());

            if part.content_type.is_multipart() || part.disposition.is_none() {
                continue;
            }
            let Some(raw_name) = part.filename.as_deref().filter(|n| !n.trim().is_empty()) else {
                continue;
            };

            let filename = decode_header_value(raw_name);
            return Some(match part.payload() {
                Some(payload) if !payload.is_empty() => {
                    Extracted::Attachment(AttachmentCandidate {
                        filename,
                        content_type: part.content_type.to_string(),
                        payload,
                    })
                }
                _ => Extracted::EmptyPayload { filename },
            });
        }
        None
    }
}

/// All findings of one message walk.
#[derive(Debug, Default)]
pub struct Extraction<'a> {
    pub attachments: Vec<AttachmentCandidate<'a>>,
    /// Filenames of attachments skipped because their payload was empty.
    pub empty: Vec<String>,
}

impl Extraction<'_> {
    /// Whether at least one attachment was found.
    pub fn found(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Drain [`extract_attachments`] into an [`Extraction`].
pub fn collect_attachments(message: &ParsedMessage) -> Extraction<'_> {
    let mut extraction = Extraction::default();
    for item in extract_attachments(message) {
        match item {
            Extracted::Attachment(candidate) => extraction.attachments.push(candidate),
            Extracted::EmptyPayload { filename } => extraction.empty.push(filename),
        }
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> MessagePart {
        MessagePart::single(ContentType::new("text", "plain"), body.as_bytes().to_vec())
    }

    fn pdf(name: &str, payload: &[u8]) -> MessagePart {
        MessagePart::single(ContentType::new("application", "pdf"), payload.to_vec())
            .with_disposition(Disposition::Attachment, Some(name))
    }

    fn message(root: MessagePart) -> ParsedMessage {
        ParsedMessage {
            root,
            ..Default::default()
        }
    }

    #[test]
    fn test_text_body_and_one_attachment() {
        let msg = message(MessagePart::multipart(
            "mixed",
            vec![text("Thanks for riding"), pdf("receipt.pdf", b"%PDF-1.4")],
        ));
        let found: Vec<_> = extract_attachments(&msg).collect();
        assert_eq!(found.len(), 1);
        match &found[0] {
            Extracted::Attachment(att) => {
                assert_eq!(att.filename, "receipt.pdf");
                assert_eq!(att.content_type, "application/pdf");
                assert_eq!(att.payload, b"%PDF-1.4");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload_is_not_a_candidate() {
        let msg = message(MessagePart::multipart(
            "mixed",
            vec![text("body"), pdf("receipt.pdf", b"")],
        ));
        let extraction = collect_attachments(&msg);
        assert!(extraction.attachments.is_empty());
        assert!(!extraction.found());
        assert_eq!(extraction.empty, vec!["receipt.pdf".to_string()]);
    }

    #[test]
    fn test_named_part_without_disposition_is_skipped() {
        let mut image = MessagePart::single(ContentType::new("image", "png"), b"\x89PNG".to_vec());
        image.filename = Some("logo.png".into());
        let msg = message(MessagePart::multipart("related", vec![text("hi"), image]));
        assert_eq!(extract_attachments(&msg).count(), 0);
    }

    #[test]
    fn test_disposition_without_filename_is_skipped() {
        let part = MessagePart::single(ContentType::new("text", "calendar"), b"BEGIN".to_vec())
            .with_disposition(Disposition::Attachment, None);
        let msg = message(MessagePart::multipart("mixed", vec![part]));
        assert_eq!(extract_attachments(&msg).count(), 0);
    }

    #[test]
    fn test_inline_disposition_with_filename_counts() {
        let image = MessagePart::single(ContentType::new("image", "jpeg"), b"\xFF\xD8".to_vec())
            .with_disposition(Disposition::Inline, Some("map.jpg"));
        let msg = message(MessagePart::multipart("related", vec![text("hi"), image]));
        let extraction = collect_attachments(&msg);
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].filename, "map.jpg");
    }

    #[test]
    fn test_multipart_with_disposition_is_not_an_attachment() {
        let container = MessagePart::multipart("mixed", vec![pdf("inner.pdf", b"x")])
            .with_disposition(Disposition::Attachment, Some("outer.zip"));
        let msg = message(container);
        let names: Vec<_> = collect_attachments(&msg)
            .attachments
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, vec!["inner.pdf"]);
    }

    #[test]
    fn test_depth_first_order() {
        let alternative = MessagePart::multipart("alternative", vec![text("plain"), pdf("b.pdf", b"b")]);
        let msg = message(MessagePart::multipart(
            "mixed",
            vec![pdf("a.pdf", b"a"), alternative, pdf("c.pdf", b"c")],
        ));
        let names: Vec<_> = collect_attachments(&msg)
            .attachments
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_forwarded_message_is_walked() {
        let inner = MessagePart::multipart("mixed", vec![text("fwd"), pdf("inner.pdf", b"x")]);
        let forwarded = MessagePart {
            content_type: ContentType::new("message", "rfc822"),
            disposition: Some(Disposition::Attachment),
            filename: Some("forwarded.eml".into()),
            body: PartBody::Message(Box::new(inner)),
        };
        let msg = message(MessagePart::multipart("mixed", vec![text("see below"), forwarded]));
        let extraction = collect_attachments(&msg);
        assert_eq!(extraction.empty, vec!["forwarded.eml".to_string()]);
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].filename, "inner.pdf");
    }

    #[test]
    fn test_encoded_filename_is_decoded() {
        let msg = message(MessagePart::multipart(
            "mixed",
            vec![pdf("=?UTF-8?Q?Re=C3=A7u.pdf?=", b"x")],
        ));
        let extraction = collect_attachments(&msg);
        assert_eq!(extraction.attachments[0].filename, "Reçu.pdf");
    }

    #[test]
    fn test_single_part_attachment_message() {
        let msg = message(pdf("only.pdf", b"data"));
        assert!(collect_attachments(&msg).found());
    }

    #[test]
    fn test_parse_multipart_message() {
        let raw = concat!(
            "From: Gett <do-not-reply@gett.com>\r\n",
            "Subject: =?UTF-8?B?WW91ciByZWNlaXB0?=\r\n",
            "Date: Fri, 08 Mar 2024 09:15:00 +0100\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Thanks for riding.\r\n",
            "--XYZ\r\n",
            "Content-Type: application/pdf; name=\"receipt.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"receipt.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0xLjQK\r\n",
            "--XYZ--\r\n",
        );
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.headers.subject.as_deref(), Some("=?UTF-8?B?WW91ciByZWNlaXB0?="));
        assert!(msg.root.content_type.is_multipart());
        assert_eq!(msg.root.children().len(), 2);
        assert!(msg.root.children()[0].disposition.is_none());

        let extraction = collect_attachments(&msg);
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].filename, "receipt.pdf");
        assert_eq!(extraction.attachments[0].payload, b"%PDF-1.4\n");
    }

    fn latin1_attachment(content_type: &str, encoding: &str, body: &str) -> String {
        format!(
            concat!(
                "From: a@b.com\r\n",
                "Subject: Export\r\n",
                "MIME-Version: 1.0\r\n",
                "Content-Type: multipart/mixed; boundary=\"B\"\r\n",
                "\r\n",
                "--B\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "See attached.\r\n",
                "--B\r\n",
                "Content-Type: {}; charset=iso-8859-1\r\n",
                "Content-Disposition: attachment; filename=\"rides.csv\"\r\n",
                "Content-Transfer-Encoding: {}\r\n",
                "\r\n",
                "{}\r\n",
                "--B--\r\n",
            ),
            content_type, encoding, body
        )
    }

    #[test]
    fn test_text_attachment_keeps_original_charset_bytes() {
        for content_type in ["text/plain", "text/csv", "text/html"] {
            let raw = latin1_attachment(content_type, "base64", "Y2Fm6TsxDQo=");
            let msg = parse_message(raw.as_bytes()).unwrap();
            let extraction = collect_attachments(&msg);
            assert_eq!(extraction.attachments.len(), 1, "{content_type}");
            assert_eq!(
                extraction.attachments[0].payload,
                b"caf\xE9;1\r\n",
                "{content_type} payload was re-encoded"
            );
        }
    }

    #[test]
    fn test_quoted_printable_text_attachment_is_not_reencoded() {
        let raw = latin1_attachment("text/csv", "quoted-printable", "caf=E9;1");
        let msg = parse_message(raw.as_bytes()).unwrap();
        let extraction = collect_attachments(&msg);
        let payload = extraction.attachments[0].payload;
        assert!(payload.starts_with(b"caf\xE9;1"), "{payload:?}");
        assert!(!payload.contains(&0xC3));
    }

    #[test]
    fn test_parse_plain_message_has_no_attachments() {
        let raw = b"From: a@b.com\nSubject: Hi\n\nJust text.\n";
        let msg = parse_message(raw).unwrap();
        assert!(!msg.root.content_type.is_multipart());
        assert!(!collect_attachments(&msg).found());
    }

    #[test]
    fn test_header_block() {
        assert_eq!(header_block(b"A: 1\nB: 2\n\nbody"), b"A: 1\nB: 2");
        assert_eq!(header_block(b"A: 1\r\n\r\nbody"), b"A: 1");
        assert_eq!(header_block(b"A: 1"), b"A: 1");
    }
}
