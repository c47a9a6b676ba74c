//! Integration tests for label, header and attachment decoding on real messages.

mod common;

use mailgrab::parser::header::decode_header_value;
use mailgrab::parser::label::{decode_label, encode_label};
use mailgrab::parser::mime::{collect_attachments, parse_message};

use common::fixture_bytes;

// ─── Labels ─────────────────────────────────────────────────────────

#[test]
fn test_gmail_system_labels_pass_through() {
    for raw in ["INBOX", "[Gmail]/All Mail", "[Gmail]/Sent Mail", "Bills"] {
        assert_eq!(decode_label(raw), raw);
    }
}

#[test]
fn test_label_round_trip() {
    for label in ["Facturas/2024", "日本語", "Ärzte & Rechnungen", "台北/日本語"] {
        let encoded = encode_label(label);
        assert!(encoded.is_ascii(), "{encoded} should be ASCII");
        assert_eq!(decode_label(&encoded), label);
    }
}

#[test]
fn test_malformed_label_is_returned_raw() {
    assert_eq!(decode_label("Bills &!!!-"), "Bills &!!!-");
}

// ─── Headers ────────────────────────────────────────────────────────

#[test]
fn test_header_mixed_charsets() {
    assert_eq!(
        decode_header_value("=?ISO-8859-1?Q?R=E9sum=E9?= =?UTF-8?B?IOWxseeUsA==?="),
        "Résumé 山田"
    );
}

#[test]
fn test_header_without_encoded_words() {
    assert_eq!(decode_header_value("Your ride receipt"), "Your ride receipt");
}

// ─── Messages ───────────────────────────────────────────────────────

#[test]
fn test_receipt_has_one_attachment() {
    let message = parse_message(&fixture_bytes("receipt_march.eml")).unwrap();
    let extraction = collect_attachments(&message);

    assert!(extraction.found());
    assert_eq!(extraction.attachments.len(), 1);
    let receipt = &extraction.attachments[0];
    assert_eq!(receipt.filename, "receipt.pdf");
    assert_eq!(receipt.content_type, "application/pdf");
    assert_eq!(receipt.payload, b"%PDF-1.4\nmarch\n");
    assert!(extraction.empty.is_empty());
}

#[test]
fn test_nested_alternative_is_not_an_attachment() {
    let message = parse_message(&fixture_bytes("receipt_late_march.eml")).unwrap();
    let extraction = collect_attachments(&message);

    let names: Vec<_> = extraction
        .attachments
        .iter()
        .map(|a| a.filename.as_str())
        .collect();
    assert_eq!(names, vec!["receipt.pdf"]);
}

#[test]
fn test_plain_message_has_no_attachments() {
    let message = parse_message(&fixture_bytes("promo.eml")).unwrap();
    let extraction = collect_attachments(&message);

    assert!(!extraction.found());
    assert!(extraction.attachments.is_empty());
    assert_eq!(
        message.headers.subject.as_deref(),
        Some("20% off your next ride")
    );
}

#[test]
fn test_encoded_filename_and_empty_payload() {
    let message = parse_message(&fixture_bytes("encoded_filename.eml")).unwrap();
    let extraction = collect_attachments(&message);

    assert_eq!(extraction.attachments.len(), 1);
    assert_eq!(extraction.attachments[0].filename, "factura-marzo.pdf");
    assert_eq!(extraction.empty, vec!["empty.png".to_string()]);

    let subject = message.headers.subject.as_deref().map(decode_header_value);
    assert_eq!(subject.as_deref(), Some("Résumé"));
    let from = message.headers.from.as_deref().map(decode_header_value);
    assert_eq!(from.as_deref(), Some("André <andre@example.com>"));
}

#[test]
fn test_latin1_csv_attachment_is_saved_byte_for_byte() {
    let message = parse_message(&fixture_bytes("latin1_export.eml")).unwrap();
    let extraction = collect_attachments(&message);

    assert_eq!(extraction.attachments.len(), 1);
    let csv = &extraction.attachments[0];
    assert_eq!(csv.filename, "rides.csv");
    assert_eq!(csv.content_type, "text/csv");
    assert_eq!(csv.payload, b"Trajet;Montant\r\nA\xE9roport;42,50\r\n");
}
