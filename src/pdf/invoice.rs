use crate::core::{AgencySettings, BelegError, Client, DOMAIN_CURRENCY, Invoice};

use super::{Font, Page, PdfWriter};

const LEFT: f32 = 20.0;
const RIGHT: f32 = 190.0;
const LINE_GAP: f32 = 5.5;
/// Lines that fit between the table header and the totals on one page.
const LINES_PER_PAGE: usize = 28;

/// Render an invoice into a PDF, followed by `trailing_pages` (typically the
/// QR-bill page).
pub fn render_invoice_pdf(
    invoice: &Invoice,
    client: &Client,
    agency: &AgencySettings,
    trailing_pages: Vec<Page>,
) -> Result<Vec<u8>, BelegError> {
    let mut writer = PdfWriter::new(format!("Facture {}", invoice.number));

    let chunks: Vec<_> = invoice.lines.chunks(LINES_PER_PAGE).collect();
    let page_count = chunks.len().max(1);
    for index in 0..page_count {
        let mut page = Page::new();
        let mut y = header(&mut page, invoice, client, agency);
        y = table_header(&mut page, y);
        for line in chunks.get(index).copied().unwrap_or_default() {
            page.text(LEFT, y, Font::Regular, 9.0, &truncate(&line.description, 60));
            page.text(120.0, y, Font::Regular, 9.0, &line.quantity.normalize().to_string());
            page.text(140.0, y, Font::Regular, 9.0, &format!("{:.2}", line.unit_price));
            page.text(170.0, y, Font::Regular, 9.0, &format!("{:.2}", line.amount()));
            y -= LINE_GAP;
        }
        if index + 1 == page_count {
            totals(&mut page, invoice, y - 4.0);
        } else {
            page.text(RIGHT - 30.0, 20.0, Font::Regular, 8.0, &format!("{}/{}", index + 1, page_count));
        }
        writer.add_page(page);
    }

    for page in trailing_pages {
        writer.add_page(page);
    }
    writer.finish()
}

fn header(page: &mut Page, invoice: &Invoice, client: &Client, agency: &AgencySettings) -> f32 {
    let sender: Vec<String> = [
        agency.company_name.clone(),
        agency.street.clone(),
        join_locality(agency.postal_code.as_deref(), agency.city.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();
    page.text_block(LEFT, 277.0, Font::Regular, 9.0, 4.5, &sender);

    let recipient: Vec<String> = [
        client.company_name_or_name().map(str::to_string),
        client.address.clone(),
        join_locality(client.postal_code.as_deref(), client.city.as_deref()),
        client.country.clone(),
    ]
    .into_iter()
    .flatten()
    .collect();
    page.text_block(120.0, 250.0, Font::Regular, 10.0, 5.0, &recipient);

    page.text(LEFT, 215.0, Font::Bold, 16.0, &format!("Facture {}", invoice.number));
    page.text(LEFT, 207.0, Font::Regular, 9.0, &format!("Date : {}", invoice.issue_date.format("%d.%m.%Y")));
    if let Some(due) = invoice.due_date {
        page.text(80.0, 207.0, Font::Regular, 9.0, &format!("Échéance : {}", due.format("%d.%m.%Y")));
    }
    195.0
}

fn table_header(page: &mut Page, y: f32) -> f32 {
    page.text(LEFT, y, Font::Bold, 9.0, "Désignation");
    page.text(120.0, y, Font::Bold, 9.0, "Quantité");
    page.text(140.0, y, Font::Bold, 9.0, "Prix unitaire");
    page.text(170.0, y, Font::Bold, 9.0, &format!("Montant {DOMAIN_CURRENCY}"));
    page.line(LEFT, y - 2.0, RIGHT, y - 2.0, 0.3);
    y - 2.0 - LINE_GAP
}

fn totals(page: &mut Page, invoice: &Invoice, y: f32) {
    let t = invoice.totals();
    page.line(130.0, y + 3.0, RIGHT, y + 3.0, 0.3);
    page.text(130.0, y - 2.0, Font::Regular, 9.0, "Total HT");
    page.text(170.0, y - 2.0, Font::Regular, 9.0, &format!("{:.2}", t.net));
    page.text(130.0, y - 7.5, Font::Regular, 9.0, &format!("TVA {}%", invoice.vat_rate.normalize()));
    page.text(170.0, y - 7.5, Font::Regular, 9.0, &format!("{:.2}", t.vat));
    page.text(130.0, y - 14.0, Font::Bold, 10.0, &format!("Total TTC {DOMAIN_CURRENCY}"));
    page.text(170.0, y - 14.0, Font::Bold, 10.0, &format!("{:.2}", t.gross));

    if let Some(info) = invoice.additional_info() {
        page.text(LEFT, y - 26.0, Font::Regular, 9.0, &truncate(info, 100));
    }
}

fn join_locality(postal_code: Option<&str>, city: Option<&str>) -> Option<String> {
    match (postal_code, city) {
        (Some(p), Some(c)) => Some(format!("{p} {c}")),
        (Some(v), None) | (None, Some(v)) => Some(v.to_string()),
        (None, None) => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClientBuilder, InvoiceBuilder, LineItem};
    use chrono::NaiveDate;
    use lopdf::Document;
    use rust_decimal_macros::dec;

    fn invoice(lines: usize) -> Invoice {
        let mut builder = InvoiceBuilder::new(
            5,
            "FAC-2025-0005",
            NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
        )
        .client(1)
        .due_date(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
        for i in 0..lines {
            builder = builder.add_line(LineItem::new(format!("Prestation {i}"), dec!(2), dec!(80)));
        }
        builder.build().unwrap()
    }

    fn client() -> Client {
        ClientBuilder::new(1)
            .company_name("Atelier Bleu SA")
            .address("Rue Centrale 4", "1003", "Lausanne")
            .build()
    }

    fn page_text(doc: &Document, page: u32) -> String {
        let id = doc.get_pages()[&page];
        String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned()
    }

    #[test]
    fn renders_number_and_totals() {
        let bytes = render_invoice_pdf(&invoice(2), &client(), &AgencySettings::default(), vec![])
            .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let text = page_text(&doc, 1);
        assert!(text.contains("Facture FAC-2025-0005"));
        assert!(text.contains("Atelier Bleu SA"));
        // 2 lines * 2 * 80 = 320.00, VAT 8.1% = 25.92
        assert!(text.contains("320.00"));
        assert!(text.contains("345.92"));
    }

    #[test]
    fn long_invoices_span_pages_and_keep_trailing_pages() {
        let bytes = render_invoice_pdf(
            &invoice(LINES_PER_PAGE + 1),
            &client(),
            &AgencySettings::default(),
            vec![Page::new()],
        )
        .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn locality_joins_available_parts() {
        assert_eq!(join_locality(Some("1003"), Some("Lausanne")).as_deref(), Some("1003 Lausanne"));
        assert_eq!(join_locality(None, Some("Lausanne")).as_deref(), Some("Lausanne"));
        assert_eq!(join_locality(None, None), None);
    }
}
