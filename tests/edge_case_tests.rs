//! Edge cases across validation, numbering and XML generation.

#![cfg(feature = "xml")]

use chrono::NaiveDate;
use comprobante::core::*;
use comprobante::xml::to_xml;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn emitter() -> Emitter {
    EmitterBuilder::new("0999999999001", "ACME S.A.", "Av. Amazonas N34-12").build()
}

fn item() -> LineItem {
    LineItemBuilder::new("P001", "Servicio", dec!(1), dec!(10.00)).build()
}

fn render(doc: &Document, seq: u64) -> String {
    let key = AccessKeyBuilder::for_document(doc, seq)
        .numeric_code(1)
        .build()
        .unwrap();
    to_xml(doc, seq, &key).unwrap()
}

fn with_customer(customer: Customer) -> Result<Document, ComprobanteError> {
    DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(customer)
        .add_item(item())
        .build()
}

// ---------------------------------------------------------------------------
// Free text
// ---------------------------------------------------------------------------

#[test]
fn markup_in_names_is_escaped() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(
            EmitterBuilder::new("0999999999001", "Pérez & Hijos <Cía>", "Calle \"A\" y 'B'").build(),
        )
        .customer(
            CustomerBuilder::new(IdentificationType::Passport, "AB123456", "</razonSocialComprador><x>")
                .build(),
        )
        .add_item(item())
        .build()
        .unwrap();
    let xml = render(&doc, 1);

    assert!(xml.contains("<razonSocial>Pérez &amp; Hijos &lt;Cía&gt;</razonSocial>"));
    assert!(xml.contains("<dirMatriz>Calle &quot;A&quot; y &apos;B&apos;</dirMatriz>"));
    assert!(xml.contains(
        "<razonSocialComprador>&lt;/razonSocialComprador&gt;&lt;x&gt;</razonSocialComprador>"
    ));
    assert!(!xml.contains("<x>"));
}

#[test]
fn unicode_is_kept_verbatim() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("Ñ-1", "Café orgánico de Loja, 500 g 🌱", dec!(1), dec!(8)).build())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<descripcion>Café orgánico de Loja, 500 g 🌱</descripcion>"));
    assert!(xml.contains("<codigoPrincipal>Ñ-1</codigoPrincipal>"));
}

#[test]
fn control_characters_are_stripped() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P1", "Línea\u{0}uno\u{1b}\tdos", dec!(1), dec!(1)).build())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<descripcion>Líneauno\tdos</descripcion>"));
}

#[test]
fn long_text_is_truncated_to_300_characters() {
    let long = "á".repeat(350);
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P1", long.as_str(), dec!(1), dec!(1)).build())
        .additional_info("Nota", long.as_str())
        .build()
        .unwrap();
    let xml = render(&doc, 1);

    let expected = "á".repeat(300);
    assert!(xml.contains(&format!("<descripcion>{expected}</descripcion>")));
    assert!(xml.contains(&format!("<campoAdicional nombre=\"Nota\">{expected}</campoAdicional>")));
    assert!(!xml.contains(&"á".repeat(301)));
}

#[test]
fn truncation_never_splits_an_entity() {
    let text = format!("{}&bb", "a".repeat(299));
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P1", text.as_str(), dec!(1), dec!(1)).build())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains(&format!("<descripcion>{}&amp;</descripcion>", "a".repeat(299))));
}

#[test]
fn long_codes_are_truncated_to_25_characters() {
    let code = "X".repeat(40);
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new(code.as_str(), "Item", dec!(1), dec!(1)).auxiliary_code(code.as_str()).build())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    let short = "X".repeat(25);
    assert!(xml.contains(&format!("<codigoPrincipal>{short}</codigoPrincipal>")));
    assert!(xml.contains(&format!("<codigoAuxiliar>{short}</codigoAuxiliar>")));
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

#[test]
fn zero_priced_line() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("GIFT", "Obsequio", dec!(1), dec!(0)).build())
        .build()
        .unwrap();
    let totals = doc.totals.as_ref().unwrap();
    assert_eq!(totals.total, dec!(0));
    let xml = render(&doc, 1);
    assert!(xml.contains("<importeTotal>0.00</importeTotal>"));
    assert!(xml.contains("<precioUnitario>0.000000</precioUnitario>"));
}

#[test]
fn six_decimal_unit_price_rounds_line_to_cents() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("FUEL", "Galón", dec!(3.5), dec!(2.465432)).build())
        .build()
        .unwrap();
    // 3.5 * 2.465432 = 8.629012 -> 8.63; 8.63 * 15% = 1.2945 -> 1.29
    let xml = render(&doc, 1);
    assert!(xml.contains("<cantidad>3.500000</cantidad>"));
    assert!(xml.contains("<precioUnitario>2.465432</precioUnitario>"));
    assert!(xml.contains("<precioTotalSinImpuesto>8.63</precioTotalSinImpuesto>"));
    assert!(xml.contains("<valor>1.29</valor>"));
    assert!(xml.contains("<importeTotal>9.92</importeTotal>"));
}

#[test]
fn large_amounts() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("BIG", "Maquinaria", dec!(1000), dec!(999999.99)).build())
        .build()
        .unwrap();
    let totals = doc.totals.as_ref().unwrap();
    assert_eq!(totals.subtotal, dec!(999999990.00));
    assert_eq!(totals.total_tax, dec!(149999998.50));
    let xml = render(&doc, 1);
    assert!(xml.contains("<importeTotal>1149999988.50</importeTotal>"));
}

#[test]
fn line_amount_beyond_decimal_range_is_rejected() {
    let err = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P", "x", Decimal::MAX, dec!(2)).build())
        .build()
        .unwrap_err();
    assert!(matches!(err, ComprobanteError::Validation(_)));
    assert!(err.to_string().contains("importe fuera de rango"));
}

#[test]
fn tax_beyond_decimal_range_is_rejected() {
    let err = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P", "x", dec!(1), Decimal::MAX / dec!(2)).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("items[0].amount"));
}

#[test]
fn totals_beyond_decimal_range_are_rejected() {
    let mut builder = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer());
    for i in 0..3 {
        builder = builder.add_item(
            LineItemBuilder::new(format!("P{i}"), "x", dec!(1), Decimal::MAX / dec!(2))
                .tax_rate(dec!(0))
                .build(),
        );
    }
    let err = builder.build().unwrap_err();
    assert!(err.to_string().contains("totals: importe fuera de rango"));

    let mut unchecked = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer());
    for i in 0..3 {
        unchecked = unchecked.add_item(
            LineItemBuilder::new(format!("P{i}"), "x", dec!(1), Decimal::MAX / dec!(2))
                .tax_rate(dec!(0))
                .build(),
        );
    }
    let doc = unchecked.build_unchecked().unwrap();
    assert!(doc.totals.is_none());
}

#[test]
fn full_discount_leaves_zero_base() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P1", "Promo", dec!(2), dec!(5)).discount(dec!(10)).build())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<descuento>10.00</descuento>"));
    assert!(xml.contains("<totalDescuento>10.00</totalDescuento>"));
    assert!(xml.contains("<precioTotalSinImpuesto>0.00</precioTotalSinImpuesto>"));
}

#[test]
fn tip_is_reported_separately() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .tip(dec!(1.15))
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<propina>1.15</propina>"));
    assert!(xml.contains("<importeTotal>12.65</importeTotal>"));
    assert!(xml.contains("<total>12.65</total>"));
}

#[test]
fn many_line_items() {
    let mut builder = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer());
    for i in 0..500 {
        builder = builder.add_item(
            LineItemBuilder::new(format!("P{i}"), format!("Item {i}"), dec!(1), dec!(0.01)).build(),
        );
    }
    let doc = builder.build().unwrap();
    assert_eq!(doc.totals.as_ref().unwrap().subtotal, dec!(5.00));
    let xml = render(&doc, 1);
    assert_eq!(xml.matches("<detalle>").count(), 500);
}

#[test]
fn more_than_ten_thousand_lines_is_rejected() {
    let mut builder = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer());
    for _ in 0..10_001 {
        builder = builder.add_item(item());
    }
    let err = builder.build().unwrap_err();
    assert!(err.to_string().contains("10,000"));
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[test]
fn every_payment_method_renders_its_code() {
    let methods = [
        (PaymentMethod::Cash, "01"),
        (PaymentMethod::DebtCompensation, "15"),
        (PaymentMethod::DebitCard, "16"),
        (PaymentMethod::ElectronicMoney, "17"),
        (PaymentMethod::PrepaidCard, "18"),
        (PaymentMethod::CreditCard, "19"),
        (PaymentMethod::FinancialSystem, "20"),
        (PaymentMethod::TitleEndorsement, "21"),
    ];
    for (method, code) in methods {
        let doc = DocumentBuilder::invoice(date(2026, 1, 26))
            .emitter(emitter())
            .customer(Customer::final_consumer())
            .add_item(item())
            .add_payment(Payment::new(method, dec!(11.50)))
            .build()
            .unwrap();
        let xml = render(&doc, 1);
        assert!(xml.contains(&format!("<formaPago>{code}</formaPago>")), "{method:?}");
        assert!(!xml.contains("<plazo>"));
    }
}

#[test]
fn split_payments() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .add_payment(Payment::new(PaymentMethod::Cash, dec!(1.50)))
        .add_payment(Payment::new(PaymentMethod::CreditCard, dec!(10.00)))
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert_eq!(xml.matches("<pago>").count(), 2);
}

#[test]
fn short_payment_is_rejected() {
    let err = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .add_payment(Payment::new(PaymentMethod::Cash, dec!(11.49)))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("payments add up to 11.49"));
}

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

#[test]
fn final_consumer_requires_the_reserved_number() {
    let wrong = Customer {
        identification: "9999999999".into(),
        ..Customer::final_consumer()
    };
    assert!(with_customer(wrong).is_err());

    let doc = with_customer(Customer::final_consumer()).unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<tipoIdentificacionComprador>07</tipoIdentificacionComprador>"));
    assert!(xml.contains("<identificacionComprador>9999999999999</identificacionComprador>"));
}

#[test]
fn cedula_check_digit_is_enforced() {
    let ok = CustomerBuilder::new(IdentificationType::Cedula, "1710034065", "Ana").build();
    assert!(with_customer(ok).is_ok());

    let bad = CustomerBuilder::new(IdentificationType::Cedula, "1710034066", "Ana").build();
    let err = with_customer(bad).unwrap_err();
    assert!(err.to_string().contains("customer.identification"));
}

#[test]
fn ruc_needs_valid_province_and_suffix() {
    for ruc in ["2590012345001", "1790012345000", "17900123450", "17900123450AB"] {
        let customer = CustomerBuilder::new(IdentificationType::Ruc, ruc, "Empresa").build();
        assert!(with_customer(customer).is_err(), "{ruc}");
    }
    let customer = CustomerBuilder::new(IdentificationType::Ruc, "3090012345001", "Empresa").build();
    assert!(with_customer(customer).is_ok());
}

#[test]
fn foreign_identification_is_free_form() {
    let customer = CustomerBuilder::new(IdentificationType::Foreign, "X-99", "John Doe").build();
    let doc = with_customer(customer).unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<tipoIdentificacionComprador>08</tipoIdentificacionComprador>"));

    let too_short = CustomerBuilder::new(IdentificationType::Passport, "X9", "John Doe").build();
    assert!(with_customer(too_short).is_err());
}

// ---------------------------------------------------------------------------
// Numbering
// ---------------------------------------------------------------------------

#[test]
fn largest_sequential_fits() {
    let doc = with_customer(Customer::final_consumer()).unwrap();
    let xml = render(&doc, 999_999_999);
    assert!(xml.contains("<secuencial>999999999</secuencial>"));
}

#[test]
fn establishment_zero_is_invalid() {
    let err = DocumentBuilder::invoice(date(2026, 1, 26))
        .point_of_sale("000", "001")
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("establishment"));
}

#[test]
fn production_environment_is_written() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .environment(Environment::Production)
        .point_of_sale("002", "105")
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .build()
        .unwrap();
    let xml = render(&doc, 42);
    assert!(xml.contains("<ambiente>2</ambiente>"));
    assert!(xml.contains("<estab>002</estab>"));
    assert!(xml.contains("<ptoEmi>105</ptoEmi>"));
    assert!(xml.contains("<secuencial>000000042</secuencial>"));
}

// ---------------------------------------------------------------------------
// Credit notes
// ---------------------------------------------------------------------------

fn modified(issue_date: NaiveDate) -> ModifiedDocument {
    ModifiedDocument {
        doc_type: DocType::Invoice,
        number: "001-001-000000011".into(),
        issue_date,
        reason: "Devolución".into(),
    }
}

#[test]
fn credit_note_cannot_predate_its_invoice() {
    let err = DocumentBuilder::credit_note(date(2026, 1, 20), modified(date(2026, 1, 26)))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("modified_document.issue_date"));
}

#[test]
fn credit_note_rejects_payments_and_tip() {
    let err = DocumentBuilder::credit_note(date(2026, 1, 28), modified(date(2026, 1, 26)))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .add_payment(Payment::new(PaymentMethod::Cash, dec!(11.50)))
        .tip(dec!(1))
        .build()
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("credit notes carry no payments"));
    assert!(msg.contains("credit notes carry no tip"));
}

#[test]
fn credit_note_needs_well_formed_reference() {
    let mut reference = modified(date(2026, 1, 26));
    reference.number = "1-1-11".into();
    let err = DocumentBuilder::credit_note(date(2026, 1, 28), reference)
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("EEE-PPP-SSSSSSSSS"));
}

#[test]
fn same_day_credit_note_is_fine() {
    let doc = DocumentBuilder::credit_note(date(2026, 1, 26), modified(date(2026, 1, 26)))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(item())
        .build()
        .unwrap();
    let xml = render(&doc, 1);
    assert!(xml.contains("<fechaEmision>26/01/2026</fechaEmision>"));
    assert!(xml.contains("<fechaEmisionDocSustento>26/01/2026</fechaEmisionDocSustento>"));
}
