use lopdf::content::Operation;
use qrcode::{Color, EcLevel, QrCode};
use tracing::debug;

use crate::core::BelegError;
use crate::pdf::{Font, Page, PdfWriter, mm};

use super::creditor::format_iban;
use super::payload::{DebtorParty, QrBillPayload};

/// Height of the payment slip at the bottom of the page.
const SLIP_HEIGHT: f32 = 105.0;
/// Width of the receipt on the left of the slip.
const RECEIPT_WIDTH: f32 = 62.0;
/// Edge length of the printed QR code.
const QR_SIZE: f32 = 46.0;
/// Edge length of the Swiss cross in the middle of the code.
const CROSS_SIZE: f32 = 7.0;

/// Render a single-page QR-bill PDF.
pub fn render_qr_bill(payload: &QrBillPayload) -> Result<Vec<u8>, BelegError> {
    let mut writer = PdfWriter::new(format!("QR-facture {}", payload.message));
    writer.add_page(qr_bill_page(payload)?);
    writer.finish()
}

/// Draw the payment slip (receipt and payment part) on an A4 page.
pub fn qr_bill_page(payload: &QrBillPayload) -> Result<Page, BelegError> {
    check_creditor(payload)?;
    let spc = payload.to_spc()?;
    let code = QrCode::with_error_correction_level(spc.as_bytes(), EcLevel::M)
        .map_err(|e| BelegError::RenderFailed(format!("QR encoding failed: {e}")))?;
    debug!(modules = code.width(), bytes = spc.len(), "QR code encoded");

    let mut page = Page::new();
    page.dashed_line(0.0, SLIP_HEIGHT, 210.0, SLIP_HEIGHT, 0.2);
    page.dashed_line(RECEIPT_WIDTH, 0.0, RECEIPT_WIDTH, SLIP_HEIGHT, 0.2);

    receipt(&mut page, payload);
    payment_part(&mut page, payload, &code);
    Ok(page)
}

fn check_creditor(payload: &QrBillPayload) -> Result<(), BelegError> {
    let c = &payload.creditor;
    for (field, value) in [
        ("name", &c.name),
        ("street", &c.street),
        ("postal code", &c.postal_code),
        ("city", &c.city),
        ("account", &c.account),
    ] {
        if value.trim().is_empty() {
            return Err(BelegError::RenderFailed(format!("creditor {field} is empty")));
        }
    }
    Ok(())
}

fn receipt(page: &mut Page, payload: &QrBillPayload) {
    let x = 5.0;
    let mut y = SLIP_HEIGHT - 10.0;
    page.text(x, y, Font::Bold, 11.0, "Récépissé");
    y -= 7.0;

    y = heading_block(page, x, y, 6.0, 8.0, "Compte / Payable à", &creditor_lines(payload));
    if let Some(reference) = payload.reference.formatted() {
        y = heading_block(page, x, y, 6.0, 8.0, "Référence", &[reference]);
    }
    match &payload.debtor {
        Some(d) => {
            heading_block(page, x, y, 6.0, 8.0, "Payable par", &debtor_lines(d));
        }
        None => {
            page.text(x, y, Font::Bold, 6.0, "Payable par (nom/adresse)");
            blank_box(page, x, y - 22.0, 52.0, 20.0);
        }
    }

    amount_row(page, x, 30.0, 6.0, 8.0, payload);
    page.text(38.0, 15.0, Font::Bold, 6.0, "Point de dépôt");
}

fn payment_part(page: &mut Page, payload: &QrBillPayload, code: &QrCode) {
    let x = RECEIPT_WIDTH + 5.0;
    page.text(x, SLIP_HEIGHT - 10.0, Font::Bold, 11.0, "Section paiement");
    qr_modules(page, code, x, SLIP_HEIGHT - 17.0 - QR_SIZE);
    amount_row(page, x, 30.0, 8.0, 10.0, payload);

    let x = RECEIPT_WIDTH + 56.0 + 5.0;
    let mut y = SLIP_HEIGHT - 10.0;
    y = heading_block(page, x, y, 8.0, 10.0, "Compte / Payable à", &creditor_lines(payload));
    if let Some(reference) = payload.reference.formatted() {
        y = heading_block(page, x, y, 8.0, 10.0, "Référence", &[reference]);
    }
    y = heading_block(
        page,
        x,
        y,
        8.0,
        10.0,
        "Informations supplémentaires",
        &wrap(&payload.message, 45),
    );
    match &payload.debtor {
        Some(d) => {
            heading_block(page, x, y, 8.0, 10.0, "Payable par", &debtor_lines(d));
        }
        None => {
            page.text(x, y, Font::Bold, 8.0, "Payable par (nom/adresse)");
            blank_box(page, x, y - 27.0, 65.0, 25.0);
        }
    }
}

/// Draw every dark module as one filled path, then the Swiss cross on top.
fn qr_modules(page: &mut Page, code: &QrCode, x: f32, y: f32) {
    let width = code.width();
    let module = QR_SIZE / width as f32;
    let colors = code.to_colors();

    let mut ops = vec![Operation::new("q", vec![]), Operation::new("g", vec![0.0f32.into()])];
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let col = (i % width) as f32;
        let row = (i / width) as f32;
        // Row 0 is the top of the code; PDF y grows upwards.
        let mx = x + col * module;
        let my = y + QR_SIZE - (row + 1.0) * module;
        ops.push(Operation::new(
            "re",
            vec![mm(mx).into(), mm(my).into(), mm(module).into(), mm(module).into()],
        ));
    }
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
    page.extend(ops);

    let cx = x + (QR_SIZE - CROSS_SIZE) / 2.0;
    let cy = y + (QR_SIZE - CROSS_SIZE) / 2.0;
    page.fill_rect(cx - 0.5, cy - 0.5, CROSS_SIZE + 1.0, CROSS_SIZE + 1.0, 1.0);
    page.fill_rect(cx, cy, CROSS_SIZE, CROSS_SIZE, 0.0);
    let bar_long = CROSS_SIZE * 0.6;
    let bar_short = CROSS_SIZE * 0.18;
    page.fill_rect(
        cx + (CROSS_SIZE - bar_short) / 2.0,
        cy + (CROSS_SIZE - bar_long) / 2.0,
        bar_short,
        bar_long,
        1.0,
    );
    page.fill_rect(
        cx + (CROSS_SIZE - bar_long) / 2.0,
        cy + (CROSS_SIZE - bar_short) / 2.0,
        bar_long,
        bar_short,
        1.0,
    );
}

fn heading_block(
    page: &mut Page,
    x: f32,
    y: f32,
    heading_size: f32,
    value_size: f32,
    heading: &str,
    lines: &[String],
) -> f32 {
    page.text(x, y, Font::Bold, heading_size, heading);
    let leading = value_size * 0.45;
    let below = page.text_block(x, y - leading, Font::Regular, value_size, leading, lines);
    below - leading * 0.6
}

fn amount_row(page: &mut Page, x: f32, y: f32, heading_size: f32, value_size: f32, payload: &QrBillPayload) {
    page.text(x, y, Font::Bold, heading_size, "Monnaie");
    page.text(x + 15.0, y, Font::Bold, heading_size, "Montant");
    let value_y = y - value_size * 0.45;
    page.text(x, value_y, Font::Regular, value_size, &payload.currency);
    page.text(x + 15.0, value_y, Font::Regular, value_size, &format_amount(payload));
}

fn blank_box(page: &mut Page, x: f32, y: f32, width: f32, height: f32) {
    page.line(x, y, x + width, y, 0.2);
    page.line(x + width, y, x + width, y + height, 0.2);
    page.line(x + width, y + height, x, y + height, 0.2);
    page.line(x, y + height, x, y, 0.2);
}

fn creditor_lines(payload: &QrBillPayload) -> Vec<String> {
    let c = &payload.creditor;
    vec![
        format_iban(&c.account),
        c.name.clone(),
        c.street.clone(),
        format!("{} {}", c.postal_code, c.city),
    ]
}

fn debtor_lines(d: &DebtorParty) -> Vec<String> {
    let mut lines = vec![d.name.clone()];
    if let Some(address) = &d.address {
        lines.push(address.clone());
    }
    lines.push(format!("{} {}", d.postal_code, d.locality).trim().to_string());
    lines
}

/// Amount with a space as thousands separator, as printed on the slip.
fn format_amount(payload: &QrBillPayload) -> String {
    let plain = format!("{:.2}", payload.amount);
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((&plain, "00"));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }
    format!("{grouped}.{frac_part}")
}

/// Greedy word wrap on character counts.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + usize::from(!current.is_empty());
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qrbill::{CreditorAccount, PaymentReference};
    use lopdf::Document;
    use rust_decimal_macros::dec;

    fn payload() -> QrBillPayload {
        QrBillPayload {
            currency: "CHF".into(),
            amount: dec!(1234567.5),
            creditor: CreditorAccount {
                name: "Agence Lumen Sàrl".into(),
                street: "Rue du Marché 8".into(),
                postal_code: "1204".into(),
                city: "Genève".into(),
                country: "CH".into(),
                account: "CH9300762011623852957".into(),
                is_qr_iban: false,
            },
            debtor: None,
            message: "Facture FAC-2025-0001".into(),
            reference: PaymentReference::None,
        }
    }

    #[test]
    fn renders_one_page() {
        let bytes = render_qr_bill(&payload()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let id = doc.get_pages()[&1];
        let content = doc.get_page_content(id).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("CH93 0076 2011 6238 5295 7"));
        assert!(text.contains("1 234 567.50"));
    }

    #[test]
    fn empty_creditor_field_fails_render() {
        let mut p = payload();
        p.creditor.city = " ".into();
        assert!(matches!(
            render_qr_bill(&p),
            Err(BelegError::RenderFailed(_))
        ));
    }

    #[test]
    fn incompatible_reference_never_renders() {
        let mut p = payload();
        p.reference = PaymentReference::structured(1, "0000000000000000").unwrap();
        assert!(matches!(
            render_qr_bill(&p),
            Err(BelegError::IncompatibleReference(_))
        ));
    }

    #[test]
    fn amount_grouping() {
        let mut p = payload();
        assert_eq!(format_amount(&p), "1 234 567.50");
        p.amount = dec!(12.3);
        assert_eq!(format_amount(&p), "12.30");
        p.amount = dec!(100);
        assert_eq!(format_amount(&p), "100.00");
    }

    #[test]
    fn wraps_on_words() {
        let lines = wrap("Facture FAC-2025-0001 - Mandat de communication annuel", 25);
        assert_eq!(
            lines,
            vec!["Facture FAC-2025-0001 -", "Mandat de communication", "annuel"]
        );
    }
}
