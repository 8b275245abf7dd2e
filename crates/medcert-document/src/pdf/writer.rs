// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate renderer — lays out a single-page certificate PDF with `lopdf`.
//
// Output is a pure function of the view: no clock reads, no random document
// id, and lopdf serialises objects in id order. Re-rendering the same view
// with the same renderer version yields identical bytes, which is what makes
// the stored document hash reproducible for audit.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use medcert_core::PaperSize;
use medcert_core::error::{MedcertError, Result};
use medcert_core::types::CertificateSubject;
use tracing::{debug, info, instrument};

use crate::qr::QrImage;

/// Identifies the layout produced by this renderer. Bump on any change that
/// alters output bytes.
pub const RENDERER_VERSION: &str = "medcert-pdf/2";

const MARGIN_PT: f32 = 56.0;
const QR_SIZE_PT: f32 = 128.0;
const BODY_FONT_PT: f32 = 10.5;
const LINE_PT: f32 = 15.0;
/// Helvetica averages roughly half an em per glyph.
const WRAP_CHARS: usize = 72;
/// Description lines printed before the text is cut with an ellipsis.
const MAX_DESCRIPTION_LINES: usize = 12;
/// Lines for service and party names.
const MAX_NAME_LINES: usize = 2;
/// Lowest baseline allowed above the footer band.
const CONTENT_FLOOR_PT: f32 = MARGIN_PT + 3.0 * LINE_PT;

/// Everything printed on a certificate.
#[derive(Debug, Clone, Copy)]
pub struct CertificateView<'a> {
    pub certificate_number: &'a str,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub subject: &'a CertificateSubject,
    pub verification_hash: &'a str,
    pub qr: &'a QrImage,
}

/// Renders certificate PDFs.
pub struct CertificateRenderer {
    paper_size: PaperSize,
}

impl CertificateRenderer {
    pub fn new(paper_size: PaperSize) -> Self {
        Self { paper_size }
    }

    /// Create a new renderer defaulting to A4.
    pub fn a4() -> Self {
        Self::new(PaperSize::A4)
    }

    pub fn paper_size(&self) -> PaperSize {
        self.paper_size
    }

    /// Render the certificate to PDF bytes.
    ///
    /// Fails with `MissingField` when a mandatory field (certificate number,
    /// service name, ICD-11 code, party names) is blank. A partially filled
    /// certificate is never produced. Long descriptions and names are cut
    /// with an ellipsis; if the body still would not fit above the footer
    /// the render fails with `PdfError`.
    #[instrument(skip_all, fields(number = view.certificate_number))]
    pub fn render(&self, view: &CertificateView<'_>) -> Result<Vec<u8>> {
        validate(view)?;
        let (page_w, page_h) = self.paper_size.dimensions_pt();
        info!(paper = ?self.paper_size, "rendering certificate PDF");

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let font_bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });

        let (qr_side, qr_pixels) = view.qr.to_gray_pixels();
        let qr_image = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => qr_side as i64,
                "Height" => qr_side as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            qr_pixels,
        ));

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_regular,
                "F2" => font_bold,
            },
            "XObject" => dictionary! {
                "Im1" => qr_image,
            },
        });

        let ops = layout(view, page_w, page_h)?;
        debug!(operations = ops.len(), qr_side, "layout complete");
        let content = Content { operations: ops };
        let encoded = content
            .encode()
            .map_err(|e| MedcertError::PdfError(format!("content stream: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(win_ansi(&format!(
                "Certificate {}",
                view.certificate_number
            ))),
            "Subject" => Object::string_literal(win_ansi(&view.subject.service_name)),
            "Producer" => Object::string_literal(RENDERER_VERSION),
            "CreationDate" => Object::string_literal(pdf_date(view.issued_at)),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| MedcertError::PdfError(format!("serialise: {e}")))?;

        debug!(bytes = output.len(), "certificate PDF written");
        Ok(output)
    }
}

fn validate(view: &CertificateView<'_>) -> Result<()> {
    let s = view.subject;
    for (name, value) in [
        ("certificate_number", view.certificate_number),
        ("service_name", s.service_name.as_str()),
        ("icd11_code", s.icd11_code.as_str()),
        ("buyer_name", s.buyer_name.as_str()),
        ("seller_name", s.seller_name.as_str()),
        ("verification_hash", view.verification_hash),
    ] {
        if value.trim().is_empty() {
            return Err(MedcertError::MissingField(name));
        }
    }
    Ok(())
}

// -- Layout -------------------------------------------------------------------

/// Accumulates content-stream operations top-down.
struct PageOps {
    ops: Vec<Operation>,
    y: f32,
}

impl PageOps {
    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.into(), size.into()]));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(text))],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn line(&mut self, font: &str, size: f32, text: &str) {
        let y = self.y;
        self.text(font, size, MARGIN_PT, y, text);
        self.y -= LINE_PT;
    }

    fn section(&mut self, title: &str) {
        self.y -= LINE_PT * 0.5;
        self.line("F2", 12.0, title);
    }

    fn field(&mut self, label: &str, value: &str) {
        let y = self.y;
        self.text("F2", BODY_FONT_PT, MARGIN_PT, y, label);
        self.text("F1", BODY_FONT_PT, MARGIN_PT + 110.0, y, value);
        self.y -= LINE_PT;
    }

    /// A field whose value wraps over at most `max_lines` lines.
    fn wrapped_field(&mut self, label: &str, value: &str, width: usize, max_lines: usize) {
        for (i, line) in clamp_lines(wrap_text(value, width), width, max_lines)
            .iter()
            .enumerate()
        {
            self.field(if i == 0 { label } else { "" }, line);
        }
    }

    fn rule(&mut self, x1: f32, x2: f32) {
        let y = self.y;
        self.ops.push(Operation::new("w", vec![0.75.into()]));
        self.ops.push(Operation::new("m", vec![x1.into(), y.into()]));
        self.ops.push(Operation::new("l", vec![x2.into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
        self.y -= LINE_PT;
    }
}

fn layout(view: &CertificateView<'_>, page_w: f32, page_h: f32) -> Result<Vec<Operation>> {
    let s = view.subject;
    let mut page = PageOps {
        ops: Vec::new(),
        y: page_h - MARGIN_PT - 10.0,
    };

    page.line("F2", 22.0, "Certificate of Service");
    page.y -= 6.0;
    page.line("F1", 10.0, "Healthcare Services Marketplace");

    // QR code in the top-right corner, below the title band.
    let qr_x = page_w - MARGIN_PT - QR_SIZE_PT;
    let qr_y = page.y - QR_SIZE_PT + LINE_PT;
    page.ops.push(Operation::new("q", vec![]));
    page.ops.push(Operation::new(
        "cm",
        vec![
            QR_SIZE_PT.into(),
            0.into(),
            0.into(),
            QR_SIZE_PT.into(),
            qr_x.into(),
            qr_y.into(),
        ],
    ));
    page.ops.push(Operation::new("Do", vec!["Im1".into()]));
    page.ops.push(Operation::new("Q", vec![]));
    page.text("F1", 8.0, qr_x + 30.0, qr_y - 12.0, "Scan to verify");

    page.y -= 4.0;
    page.field("Certificate No.", view.certificate_number);

    page.section("Service");
    page.wrapped_field("Name", &s.service_name, WRAP_CHARS / 2, MAX_NAME_LINES);
    page.field("ICD-11 Code", &s.icd11_code);
    if !s.service_description.trim().is_empty() {
        page.wrapped_field(
            "Description",
            &s.service_description,
            WRAP_CHARS / 2,
            MAX_DESCRIPTION_LINES,
        );
    }

    // Keep the remaining sections clear of the QR code.
    page.y = page.y.min(qr_y - 2.0 * LINE_PT);

    page.section("Transaction");
    page.field("Reference", &format!("#{}", s.transaction_id));
    page.field("Quantity", &s.quantity.to_string());
    page.field("Unit price", &s.unit_price.to_string());
    page.field("Total price", &s.total_price.to_string());
    page.field("Date", &display_date(s.transaction_date));

    page.section("Parties");
    page.wrapped_field("Buyer", &s.buyer_name, WRAP_CHARS - 12, MAX_NAME_LINES);
    page.wrapped_field("Seller", &s.seller_name, WRAP_CHARS - 12, MAX_NAME_LINES);

    page.section("Validity");
    page.field("Issued", &display_date(view.issued_at));
    page.field("Expires", &display_date(view.expires_at));

    // `y` sits one line below the last baseline drawn.
    if page.y + LINE_PT < CONTENT_FLOOR_PT {
        return Err(MedcertError::PdfError(format!(
            "certificate body does not fit on one {page_w:.0}x{page_h:.0}pt page"
        )));
    }

    page.y = MARGIN_PT + 2.0 * LINE_PT;
    page.rule(MARGIN_PT, page_w - MARGIN_PT);
    page.line(
        "F1",
        7.0,
        &format!("Verification hash: {}", view.verification_hash),
    );
    page.line(
        "F1",
        7.0,
        &format!("Issued electronically. Layout {RENDERER_VERSION}."),
    );

    Ok(page.ops)
}

fn display_date(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// PDF date string (`D:YYYYMMDDHHmmSSZ`).
fn pdf_date(t: DateTime<Utc>) -> String {
    t.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// Encode for the standard Type1 fonts with WinAnsiEncoding. Latin-1
/// printable characters map directly; anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

// -- Text wrapping helper -----------------------------------------------------

/// Keep at most `max_lines` lines, ending the last kept line with `...`
/// when anything was dropped.
fn clamp_lines(mut lines: Vec<String>, width: usize, max_lines: usize) -> Vec<String> {
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        let kept: String = last.chars().take(width.saturating_sub(3)).collect();
        *last = format!("{}...", kept.trim_end());
    }
    lines
}

/// Word-wrap `text` so no line exceeds `max_width` characters. Words longer
/// than `max_width` are force-broken.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let mut current_line = String::with_capacity(max_width);

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current_line.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                }
                let chars: Vec<char> = word.chars().collect();
                for chunk in chars.chunks(max_width) {
                    result.push(chunk.iter().collect());
                }
            } else if current_line.is_empty() {
                current_line.push_str(word);
            } else if current_line.chars().count() + 1 + word_len <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                result.push(std::mem::replace(&mut current_line, word.to_owned()));
            }
        }

        if !current_line.is_empty() {
            result.push(current_line);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;
    use crate::qr::QrPayload;
    use chrono::TimeZone;
    use medcert_core::types::{Money, ServiceId, TransactionId, UserId};

    fn subject() -> CertificateSubject {
        CertificateSubject {
            transaction_id: TransactionId(42),
            service_id: ServiceId(7),
            service_name: "Tuberculosis Screening".into(),
            service_description: "Chest radiograph with sputum smear microscopy and culture, \
                reported within five working days."
                .into(),
            icd11_code: "1A01".into(),
            quantity: 3,
            unit_price: Money::from_cents(5000),
            total_price: Money::from_cents(15000),
            transaction_date: Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap(),
            buyer_id: UserId(100),
            buyer_name: "Acme Insurance".into(),
            seller_id: UserId(200),
            seller_name: "City Clinic".into(),
        }
    }

    fn render(subject: &CertificateSubject) -> Result<Vec<u8>> {
        let issued = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2027, 10, 18, 9, 30, 0).unwrap();
        let hash = "ab".repeat(32);
        let qr = QrImage::render(
            &QrPayload::provisional("CERT-42-1", subject, issued, expires).finalize(&hash),
        )?;
        CertificateRenderer::a4().render(&CertificateView {
            certificate_number: "CERT-42-1",
            issued_at: issued,
            expires_at: expires,
            subject,
            verification_hash: &hash,
            qr: &qr,
        })
    }

    #[test]
    fn renders_single_page_pdf() {
        let bytes = render(&subject()).expect("render");
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let reader = PdfReader::from_bytes(&bytes).expect("parse");
        assert_eq!(reader.page_count(), 1);
        assert_eq!(reader.title().as_deref(), Some("Certificate CERT-42-1"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render(&subject()).unwrap();
        let b = render(&subject()).unwrap();
        assert_eq!(a, b, "identical inputs must produce identical bytes");
    }

    #[test]
    fn input_change_changes_output() {
        let a = render(&subject()).unwrap();
        let mut other = subject();
        other.quantity = 4;
        let b = render(&other).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn missing_party_name_fails() {
        let mut s = subject();
        s.seller_name = String::new();
        match render(&s) {
            Err(MedcertError::MissingField(name)) => assert_eq!(name, "seller_name"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn missing_service_name_fails() {
        let mut s = subject();
        s.service_name = "   ".into();
        assert!(matches!(render(&s), Err(MedcertError::MissingField("service_name"))));
    }

    #[test]
    fn non_latin_text_still_renders() {
        let mut s = subject();
        s.buyer_name = "Société Générale Assurance 保险".into();
        let bytes = render(&s).expect("render");
        assert_eq!(PdfReader::from_bytes(&bytes).unwrap().page_count(), 1);
    }

    #[test]
    fn win_ansi_maps_latin1_and_replaces_rest() {
        assert_eq!(win_ansi("Café"), b"Caf\xe9".to_vec());
        assert_eq!(win_ansi("a\u{4fdd}b"), b"a?b".to_vec());
    }

    #[test]
    fn pdf_date_format() {
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 5).unwrap();
        assert_eq!(pdf_date(t), "D:20261018093005Z");
    }

    /// Baselines of every text run in the content stream.
    fn text_baselines(ops: &[Operation]) -> Vec<f32> {
        ops.iter()
            .filter(|op| op.operator == "Td")
            .map(|op| op.operands[1].as_float().unwrap())
            .collect()
    }

    fn draws_text(ops: &[Operation], text: &str) -> bool {
        ops.iter().any(|op| {
            op.operator == "Tj"
                && matches!(&op.operands[0], Object::String(bytes, _) if bytes == text.as_bytes())
        })
    }

    #[test]
    fn long_description_stays_on_page() {
        let mut s = subject();
        s.service_description = "extended diagnostic panel ".repeat(120);
        s.service_name = "Comprehensive ".repeat(10);
        s.buyer_name = "Regional Health Insurance Cooperative ".repeat(4);

        let issued = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2027, 10, 18, 9, 30, 0).unwrap();
        let hash = "ab".repeat(32);
        let qr = QrImage::render(
            &QrPayload::provisional("CERT-42-1", &s, issued, expires).finalize(&hash),
        )
        .unwrap();
        let view = CertificateView {
            certificate_number: "CERT-42-1",
            issued_at: issued,
            expires_at: expires,
            subject: &s,
            verification_hash: &hash,
            qr: &qr,
        };

        for paper in [PaperSize::A4, PaperSize::Letter] {
            let (w, h) = paper.dimensions_pt();
            let ops = layout(&view, w, h).expect("layout");
            let baselines = text_baselines(&ops);
            assert!(baselines.iter().all(|y| *y >= MARGIN_PT && *y <= h), "{paper:?}");

            // Every section is still drawn, and the footer stays below the body.
            for label in ["Seller", "Expires", "Total price"] {
                assert!(draws_text(&ops, label), "{label} missing on {paper:?}");
            }
            let body_floor = baselines
                .iter()
                .copied()
                .filter(|y| *y > MARGIN_PT + 2.0 * LINE_PT)
                .fold(f32::MAX, f32::min);
            assert!(body_floor >= CONTENT_FLOOR_PT, "{paper:?}: {body_floor}");

            let bytes = CertificateRenderer::new(paper).render(&view).expect("render");
            assert_eq!(PdfReader::from_bytes(&bytes).unwrap().page_count(), 1);
        }
    }

    #[test]
    fn clamped_lines_end_with_ellipsis() {
        let lines = wrap_text(&"word ".repeat(50), 12);
        let clamped = clamp_lines(lines, 12, 3);
        assert_eq!(clamped.len(), 3);
        assert_eq!(clamped[2], "word word...");
        assert!(clamped.iter().all(|l| l.chars().count() <= 12));

        let short = clamp_lines(vec!["one".into()], 12, 3);
        assert_eq!(short, vec!["one"]);
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("alpha beta gamma delta epsilon", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta", "epsilon"]);
        let long = wrap_text("abcdefghijkl", 5);
        assert_eq!(long, vec!["abcde", "fghij", "kl"]);
    }
}
