#![cfg(feature = "xml")]

use chrono::NaiveDate;
use comprobante::core::*;
use comprobante::xml::{self, to_credit_note_xml, to_invoice_xml};
use quick_xml::Reader;
use quick_xml::events::Event;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn emitter() -> Emitter {
    EmitterBuilder::new("0999999999001", "COMERCIAL ANDINA S.A.", "Av. 9 de Octubre 100")
        .trade_name("ANDINA")
        .establishment_address("Av. Quito 200")
        .special_taxpayer("5368")
        .keeps_accounting(true)
        .build()
}

fn customer() -> Customer {
    CustomerBuilder::new(IdentificationType::Ruc, "1790012345001", "Importadora Sierra Cía. Ltda.")
        .address("Calle Sucre 12")
        .email("compras@sierra.ec")
        .phone("022345678")
        .build()
}

fn invoice() -> Document {
    DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(customer())
        .add_item(
            LineItemBuilder::new("P001", "Consultoría", dec!(2), dec!(30.00))
                .auxiliary_code("AUX-1")
                .build(),
        )
        .add_item(
            LineItemBuilder::new("P002", "Libro", dec!(1), dec!(12.5))
                .tax_rate(dec!(0))
                .build(),
        )
        .add_payment(Payment::new(PaymentMethod::FinancialSystem, dec!(81.50)).with_term_days(30))
        .additional_info("Vendedor", "Juan")
        .build()
        .unwrap()
}

fn key_for(doc: &Document, seq: u64) -> AccessKey {
    AccessKeyBuilder::for_document(doc, seq)
        .numeric_code(12345678)
        .build()
        .unwrap()
}

/// Local names of all elements, in document order.
fn element_names(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut names = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) => {
                names.push(String::from_utf8(e.local_name().as_ref().to_vec()).unwrap())
            }
            Event::Eof => break,
            _ => {}
        }
    }
    names
}

fn position(names: &[String], name: &str) -> usize {
    names
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} not found"))
}

// --- Invoice ---

#[test]
fn invoice_root_and_info_tributaria() {
    let doc = invoice();
    let key = key_for(&doc, 11);
    let xml = to_invoice_xml(&doc, 11, &key).unwrap();

    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<factura id=\"comprobante\" version=\"2.1.0\">"));
    assert!(xml.contains("<ambiente>1</ambiente>"));
    assert!(xml.contains("<tipoEmision>1</tipoEmision>"));
    assert!(xml.contains("<razonSocial>COMERCIAL ANDINA S.A.</razonSocial>"));
    assert!(xml.contains("<nombreComercial>ANDINA</nombreComercial>"));
    assert!(xml.contains(&format!("<claveAcceso>{key}</claveAcceso>")));
    assert!(xml.contains("<codDoc>01</codDoc>"));
    assert!(xml.contains("<estab>001</estab>"));
    assert!(xml.contains("<ptoEmi>001</ptoEmi>"));
    assert!(xml.contains("<secuencial>000000011</secuencial>"));
}

#[test]
fn invoice_info_factura() {
    let doc = invoice();
    let xml = to_invoice_xml(&doc, 11, &key_for(&doc, 11)).unwrap();

    assert!(xml.contains("<fechaEmision>26/01/2026</fechaEmision>"));
    assert!(xml.contains("<contribuyenteEspecial>5368</contribuyenteEspecial>"));
    assert!(xml.contains("<obligadoContabilidad>SI</obligadoContabilidad>"));
    assert!(xml.contains("<tipoIdentificacionComprador>04</tipoIdentificacionComprador>"));
    assert!(xml.contains("<identificacionComprador>1790012345001</identificacionComprador>"));
    assert!(xml.contains("<totalSinImpuestos>72.50</totalSinImpuestos>"));
    assert!(xml.contains("<totalDescuento>0.00</totalDescuento>"));
    assert!(xml.contains("<propina>0.00</propina>"));
    assert!(xml.contains("<importeTotal>81.50</importeTotal>"));
    assert!(xml.contains("<moneda>DOLAR</moneda>"));
    assert!(xml.contains("<formaPago>20</formaPago>"));
    assert!(xml.contains("<plazo>30</plazo>"));
    assert!(xml.contains("<unidadTiempo>dias</unidadTiempo>"));
}

#[test]
fn invoice_element_order_follows_schema() {
    let doc = invoice();
    let xml = to_invoice_xml(&doc, 11, &key_for(&doc, 11)).unwrap();
    let names = element_names(&xml);

    let order = [
        "infoTributaria",
        "infoFactura",
        "fechaEmision",
        "dirEstablecimiento",
        "contribuyenteEspecial",
        "obligadoContabilidad",
        "tipoIdentificacionComprador",
        "razonSocialComprador",
        "identificacionComprador",
        "direccionComprador",
        "totalSinImpuestos",
        "totalDescuento",
        "totalConImpuestos",
        "propina",
        "importeTotal",
        "moneda",
        "pagos",
        "detalles",
        "infoAdicional",
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&names, n)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn invoice_details_precision() {
    let doc = invoice();
    let xml = to_invoice_xml(&doc, 11, &key_for(&doc, 11)).unwrap();

    assert!(xml.contains("<codigoPrincipal>P001</codigoPrincipal>"));
    assert!(xml.contains("<codigoAuxiliar>AUX-1</codigoAuxiliar>"));
    assert!(xml.contains("<cantidad>2.000000</cantidad>"));
    assert!(xml.contains("<precioUnitario>30.000000</precioUnitario>"));
    assert!(xml.contains("<precioUnitario>12.500000</precioUnitario>"));
    assert!(xml.contains("<precioTotalSinImpuesto>60.00</precioTotalSinImpuesto>"));
    assert!(xml.contains("<tarifa>15.00</tarifa>"));
    assert!(xml.contains("<tarifa>0.00</tarifa>"));
    assert!(xml.contains("<valor>9.00</valor>"));
}

#[test]
fn invoice_tax_buckets() {
    let doc = invoice();
    let xml = to_invoice_xml(&doc, 11, &key_for(&doc, 11)).unwrap();
    let start = xml.find("<totalConImpuestos>").unwrap();
    let end = xml.find("</totalConImpuestos>").unwrap();
    let block = &xml[start..end];
    assert_eq!(block.matches("<totalImpuesto>").count(), 2);
    assert!(block.contains("<codigoPorcentaje>0</codigoPorcentaje>"));
    assert!(block.contains("<codigoPorcentaje>4</codigoPorcentaje>"));
    assert!(block.contains("<baseImponible>12.50</baseImponible>"));
    assert!(block.contains("<baseImponible>60.00</baseImponible>"));
}

#[test]
fn invoice_additional_info() {
    let doc = invoice();
    let xml = to_invoice_xml(&doc, 11, &key_for(&doc, 11)).unwrap();
    assert!(xml.contains("<campoAdicional nombre=\"Email\">compras@sierra.ec</campoAdicional>"));
    assert!(xml.contains("<campoAdicional nombre=\"Telefono\">022345678</campoAdicional>"));
    assert!(xml.contains("<campoAdicional nombre=\"Vendedor\">Juan</campoAdicional>"));
}

#[test]
fn additional_info_omitted_when_empty() {
    let doc = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P", "Item", dec!(1), dec!(1)).build())
        .build()
        .unwrap();
    let xml = to_invoice_xml(&doc, 1, &key_for(&doc, 1)).unwrap();
    assert!(!xml.contains("infoAdicional"));
    assert!(!xml.contains("direccionComprador"));
}

#[test]
fn output_is_deterministic() {
    let doc = invoice();
    let key = key_for(&doc, 11);
    assert_eq!(
        to_invoice_xml(&doc, 11, &key).unwrap(),
        to_invoice_xml(&doc, 11, &key).unwrap()
    );
}

// --- Numbering checks ---

#[test]
fn key_must_match_document() {
    let doc = invoice();
    let key = key_for(&doc, 11);
    let err = to_invoice_xml(&doc, 12, &key).unwrap_err();
    assert!(err.to_string().contains("sequential"));

    let mut other = doc.clone();
    other.establishment = "002".into();
    let err = to_invoice_xml(&other, 11, &key).unwrap_err();
    assert!(err.to_string().contains("establishment"));
}

#[test]
fn wrong_document_type_is_rejected() {
    let doc = invoice();
    let key = key_for(&doc, 11);
    assert!(to_credit_note_xml(&doc, 11, &key).is_err());
}

#[test]
fn invalid_document_never_renders() {
    let mut doc = invoice();
    doc.items.clear();
    let err = to_invoice_xml(&doc, 11, &key_for(&invoice(), 11)).unwrap_err();
    assert!(matches!(err, ComprobanteError::Validation(_)));
    assert!(err.to_string().contains("at least one line item"));
}

#[test]
fn missing_totals_never_render() {
    let mut doc = invoice();
    doc.totals = None;
    let err = to_invoice_xml(&doc, 11, &key_for(&invoice(), 11)).unwrap_err();
    assert!(err.to_string().contains("totals"));
}

// --- Credit note ---

fn credit_note() -> Document {
    DocumentBuilder::credit_note(
        date(2026, 1, 28),
        ModifiedDocument {
            doc_type: DocType::Invoice,
            number: "001-001-000000011".into(),
            issue_date: date(2026, 1, 26),
            reason: "Devolución parcial".into(),
        },
    )
    .emitter(emitter())
    .customer(customer())
    .add_item(
        LineItemBuilder::new("P001", "Consultoría", dec!(1), dec!(30.00))
            .auxiliary_code("AUX-1")
            .build(),
    )
    .build()
    .unwrap()
}

#[test]
fn credit_note_structure() {
    let doc = credit_note();
    let key = key_for(&doc, 3);
    let xml = to_credit_note_xml(&doc, 3, &key).unwrap();

    assert!(xml.contains("<notaCredito id=\"comprobante\" version=\"1.1.0\">"));
    assert!(xml.contains("<codDoc>04</codDoc>"));
    assert!(xml.contains("<codDocModificado>01</codDocModificado>"));
    assert!(xml.contains("<numDocModificado>001-001-000000011</numDocModificado>"));
    assert!(xml.contains("<fechaEmisionDocSustento>26/01/2026</fechaEmisionDocSustento>"));
    assert!(xml.contains("<valorModificacion>34.50</valorModificacion>"));
    assert!(xml.contains("<motivo>Devolución parcial</motivo>"));
    assert!(xml.contains("<codigoInterno>P001</codigoInterno>"));
    assert!(xml.contains("<codigoAdicional>AUX-1</codigoAdicional>"));
    assert!(!xml.contains("<pagos>"));
    assert!(!xml.contains("<propina>"));
}

#[test]
fn credit_note_element_order() {
    let doc = credit_note();
    let xml = to_credit_note_xml(&doc, 3, &key_for(&doc, 3)).unwrap();
    let names = element_names(&xml);
    let order = [
        "infoNotaCredito",
        "fechaEmision",
        "tipoIdentificacionComprador",
        "razonSocialComprador",
        "identificacionComprador",
        "contribuyenteEspecial",
        "obligadoContabilidad",
        "codDocModificado",
        "numDocModificado",
        "fechaEmisionDocSustento",
        "totalSinImpuestos",
        "valorModificacion",
        "moneda",
        "totalConImpuestos",
        "motivo",
        "detalles",
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&names, n)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn dispatch_by_document_type() {
    let inv = invoice();
    let cn = credit_note();
    assert!(xml::to_xml(&inv, 11, &key_for(&inv, 11)).unwrap().contains("<factura "));
    assert!(xml::to_xml(&cn, 3, &key_for(&cn, 3)).unwrap().contains("<notaCredito "));
}
