use super::common::*;
use super::xml_utils::{XmlResult, XmlWriter};
use super::{INVOICE_VERSION, ROOT_ID};
use crate::core::*;

/// Generate `factura` v2.1.0 XML for a validated invoice.
///
/// `sequential` and `key` come from the counter and the access key codec;
/// the key must describe this document.
pub fn to_invoice_xml(doc: &Document, sequential: u64, key: &AccessKey) -> XmlResult {
    if doc.doc_type != DocType::Invoice {
        return Err(ComprobanteError::Validation(format!(
            "expected an invoice, got document type {}",
            doc.doc_type.code()
        )));
    }
    let totals = doc.totals.as_ref().ok_or_else(|| {
        ComprobanteError::Validation("totals must be calculated before XML generation".into())
    })?;
    ensure_valid(doc)?;
    check_numbering(doc, sequential, key)?;

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs("factura", &[("id", ROOT_ID), ("version", INVOICE_VERSION)])?;

    write_info_tributaria(&mut w, doc, sequential, key)?;

    w.start_element("infoFactura")?;
    w.text_element("fechaEmision", &doc.issue_date.format("%d/%m/%Y").to_string())?;
    if let Some(addr) = &doc.emitter.establishment_address {
        w.clean_text_element("dirEstablecimiento", addr)?;
    }
    if let Some(special) = &doc.emitter.special_taxpayer {
        w.text_element("contribuyenteEspecial", special)?;
    }
    w.text_element("obligadoContabilidad", obligado_contabilidad(&doc.emitter))?;
    write_buyer(&mut w, &doc.customer)?;
    if let Some(addr) = &doc.customer.address {
        w.clean_text_element("direccionComprador", addr)?;
    }
    w.amount_element("totalSinImpuestos", totals.subtotal)?;
    w.amount_element("totalDescuento", totals.total_discount)?;
    write_total_taxes(&mut w, totals)?;
    w.amount_element("propina", totals.tip)?;
    w.amount_element("importeTotal", totals.total)?;
    w.clean_text_element("moneda", &doc.currency)?;

    w.start_element("pagos")?;
    for payment in &doc.payments {
        w.start_element("pago")?;
        w.text_element("formaPago", payment.method.code())?;
        w.amount_element("total", payment.total)?;
        if let Some(term) = payment.term {
            w.text_element("plazo", &term.to_string())?;
            w.clean_text_element("unidadTiempo", payment.time_unit.as_deref().unwrap_or("dias"))?;
        }
        w.end_element("pago")?;
    }
    w.end_element("pagos")?;
    w.end_element("infoFactura")?;

    w.start_element("detalles")?;
    for item in &doc.items {
        w.start_element("detalle")?;
        w.clean_text_element("codigoPrincipal", &truncate_code(&item.code))?;
        if let Some(aux) = &item.auxiliary_code {
            w.clean_text_element("codigoAuxiliar", &truncate_code(aux))?;
        }
        w.clean_text_element("descripcion", &item.description)?;
        write_item_amounts(&mut w, item)?;
        w.end_element("detalle")?;
    }
    w.end_element("detalles")?;

    write_additional_info(&mut w, doc)?;

    w.end_element("factura")?;
    w.into_string()
}

pub(super) fn truncate_code(code: &str) -> String {
    code.chars().take(MAX_CODE_LEN).collect()
}
