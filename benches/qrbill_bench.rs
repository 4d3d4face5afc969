use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal_macros::dec;

use kontor::core::*;
use kontor::qrbill::*;

fn settings() -> AgencySettings {
    AgencySettings {
        company_name: Some("Agence Lumen Sàrl".into()),
        represented_by: Some("Claire Rochat".into()),
        street: Some("Rue du Marché 8".into()),
        postal_code: Some("1204".into()),
        city: Some("Genève".into()),
        iban: Some("CH00 0000 0000 0000 0000 0".into()),
        qr_iban: Some("CH44 3199 9123 0008 8901 2".into()),
        ..Default::default()
    }
}

fn invoice(lines: usize) -> Invoice {
    let mut builder = InvoiceBuilder::new(
        42,
        "FAC-2025-0042",
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
    )
    .client(1)
    .additional_info("Mandat de communication 2025");
    for i in 1..=lines {
        builder = builder.add_line(LineItem::new(format!("Prestation {i}"), dec!(3), dec!(125.40)));
    }
    builder.build().unwrap()
}

fn client() -> Client {
    ClientBuilder::new(1)
        .company_name("Muster AG")
        .address("Bahnhofstrasse 1", "8001", "Zürich")
        .build()
}

fn bench_check_digit(c: &mut Criterion) {
    c.bench_function("check_digit_26", |b| {
        b.iter(|| check_digit(black_box("21000000000313947143000901")));
    });
}

fn bench_document_number(c: &mut Criterion) {
    c.bench_function("document_number_parse", |b| {
        b.iter(|| DocumentNumber::parse(black_box("CTR-2025-0137")));
    });
    c.bench_function("next_number", |b| {
        let key = SequenceKey::new(DocumentFamily::Invoice, 2025);
        b.iter(|| next_number(key, black_box(Some("FAC-2025-0041"))));
    });
}

fn bench_payload(c: &mut Criterion) {
    let invoice = invoice(10);
    let client = client();
    let creditor = resolve_creditor(&settings()).unwrap();

    c.bench_function("qr_payload_build", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| {
            QrPayloadBuilder::new(black_box(&invoice), &client, &creditor).build_with_rng(&mut rng)
        });
    });

    let payload = QrPayloadBuilder::new(&invoice, &client, &creditor)
        .build_with_rng(&mut StdRng::seed_from_u64(1))
        .unwrap();
    c.bench_function("spc_encode", |b| {
        b.iter(|| black_box(&payload).to_spc());
    });
    c.bench_function("qr_bill_render", |b| {
        b.iter(|| render_qr_bill(black_box(&payload)));
    });
}

fn bench_totals(c: &mut Criterion) {
    let invoice = invoice(1000);
    c.bench_function("invoice_totals_1000_lines", |b| {
        b.iter(|| black_box(&invoice).totals());
    });
}

criterion_group!(
    benches,
    bench_check_digit,
    bench_document_number,
    bench_payload,
    bench_totals
);
criterion_main!(benches);
