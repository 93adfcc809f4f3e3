use super::common::*;
use super::invoice::truncate_code;
use super::xml_utils::{XmlResult, XmlWriter};
use super::{CREDIT_NOTE_VERSION, ROOT_ID};
use crate::core::*;

/// Generate `notaCredito` v1.1.0 XML for a validated credit note.
///
/// Credit notes carry the modified invoice reference instead of payments.
pub fn to_credit_note_xml(doc: &Document, sequential: u64, key: &AccessKey) -> XmlResult {
    if doc.doc_type != DocType::CreditNote {
        return Err(ComprobanteError::Validation(format!(
            "expected a credit note, got document type {}",
            doc.doc_type.code()
        )));
    }
    let totals = doc.totals.as_ref().ok_or_else(|| {
        ComprobanteError::Validation("totals must be calculated before XML generation".into())
    })?;
    let modified = doc.modified_document.as_ref().ok_or_else(|| {
        ComprobanteError::Validation("a credit note must reference the invoice it modifies".into())
    })?;
    ensure_valid(doc)?;
    check_numbering(doc, sequential, key)?;

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "notaCredito",
        &[("id", ROOT_ID), ("version", CREDIT_NOTE_VERSION)],
    )?;

    write_info_tributaria(&mut w, doc, sequential, key)?;

    w.start_element("infoNotaCredito")?;
    w.text_element("fechaEmision", &doc.issue_date.format("%d/%m/%Y").to_string())?;
    if let Some(addr) = &doc.emitter.establishment_address {
        w.clean_text_element("dirEstablecimiento", addr)?;
    }
    write_buyer(&mut w, &doc.customer)?;
    if let Some(special) = &doc.emitter.special_taxpayer {
        w.text_element("contribuyenteEspecial", special)?;
    }
    w.text_element("obligadoContabilidad", obligado_contabilidad(&doc.emitter))?;
    w.text_element("codDocModificado", modified.doc_type.code())?;
    w.text_element("numDocModificado", &modified.number)?;
    w.text_element(
        "fechaEmisionDocSustento",
        &modified.issue_date.format("%d/%m/%Y").to_string(),
    )?;
    w.amount_element("totalSinImpuestos", totals.subtotal)?;
    w.amount_element("valorModificacion", totals.total)?;
    w.clean_text_element("moneda", &doc.currency)?;
    write_total_taxes(&mut w, totals)?;
    w.clean_text_element("motivo", &modified.reason)?;
    w.end_element("infoNotaCredito")?;

    w.start_element("detalles")?;
    for item in &doc.items {
        w.start_element("detalle")?;
        w.clean_text_element("codigoInterno", &truncate_code(&item.code))?;
        if let Some(aux) = &item.auxiliary_code {
            w.clean_text_element("codigoAdicional", &truncate_code(aux))?;
        }
        w.clean_text_element("descripcion", &item.description)?;
        write_item_amounts(&mut w, item)?;
        w.end_element("detalle")?;
    }
    w.end_element("detalles")?;

    write_additional_info(&mut w, doc)?;

    w.end_element("notaCredito")?;
    w.into_string()
}
