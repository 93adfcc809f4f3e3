use crate::core::*;

use super::xml_utils::{XmlWriter, clean_text};

/// Run document validation; XML is never produced for an invalid document.
pub(super) fn ensure_valid(doc: &Document) -> Result<(), ComprobanteError> {
    let errors = validate_document(doc);
    if errors.is_empty() {
        return Ok(());
    }
    Err(ComprobanteError::Validation(
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    ))
}

/// Check that the access key describes this document and sequential.
pub(super) fn check_numbering(
    doc: &Document,
    sequential: u64,
    key: &AccessKey,
) -> Result<(), ComprobanteError> {
    let f = key.fields();
    let mismatches: Vec<&str> = [
        (f.doc_type == doc.doc_type.code(), "document type"),
        (f.ruc == doc.emitter.ruc, "RUC"),
        (f.environment_kind() == Some(doc.environment), "environment"),
        (f.establishment == doc.establishment, "establishment"),
        (f.emission_point == doc.emission_point, "emission point"),
        (f.sequential_number() == Some(sequential), "sequential"),
        (f.date() == Some(doc.issue_date), "issue date"),
    ]
    .into_iter()
    .filter(|(ok, _)| !ok)
    .map(|(_, field)| field)
    .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ComprobanteError::Validation(format!(
            "access key {key} does not match the document: {}",
            mismatches.join(", ")
        )))
    }
}

/// `infoTributaria`, shared by every document type.
pub(super) fn write_info_tributaria(
    w: &mut XmlWriter,
    doc: &Document,
    sequential: u64,
    key: &AccessKey,
) -> Result<(), ComprobanteError> {
    let emitter = &doc.emitter;
    w.start_element("infoTributaria")?;
    w.text_element("ambiente", &doc.environment.code().to_string())?;
    w.text_element("tipoEmision", &doc.emission_type.code().to_string())?;
    w.clean_text_element("razonSocial", &emitter.legal_name)?;
    if let Some(trade_name) = &emitter.trade_name {
        w.clean_text_element("nombreComercial", trade_name)?;
    }
    w.text_element("ruc", &emitter.ruc)?;
    w.text_element("claveAcceso", key.as_str())?;
    w.text_element("codDoc", doc.doc_type.code())?;
    w.text_element("estab", &doc.establishment)?;
    w.text_element("ptoEmi", &doc.emission_point)?;
    w.text_element("secuencial", &format!("{sequential:09}"))?;
    w.clean_text_element("dirMatriz", &emitter.head_office_address)?;
    w.end_element("infoTributaria")?;
    Ok(())
}

/// Customer identification triple, in schema order.
pub(super) fn write_buyer(w: &mut XmlWriter, customer: &Customer) -> Result<(), ComprobanteError> {
    w.text_element(
        "tipoIdentificacionComprador",
        customer.identification_type.code(),
    )?;
    w.clean_text_element("razonSocialComprador", &customer.name)?;
    w.text_element("identificacionComprador", &customer.identification)?;
    Ok(())
}

pub(super) fn obligado_contabilidad(emitter: &Emitter) -> &'static str {
    if emitter.keeps_accounting { "SI" } else { "NO" }
}

/// `totalConImpuestos`, one `totalImpuesto` per rate bucket.
pub(super) fn write_total_taxes(w: &mut XmlWriter, totals: &Totals) -> Result<(), ComprobanteError> {
    w.start_element("totalConImpuestos")?;
    for bucket in &totals.tax_buckets {
        w.start_element("totalImpuesto")?;
        w.text_element("codigo", IVA_TAX_CODE)?;
        w.text_element("codigoPorcentaje", bucket.rate_code.code())?;
        w.amount_element("baseImponible", bucket.taxable_base)?;
        w.amount_element("valor", bucket.tax_amount)?;
        w.end_element("totalImpuesto")?;
    }
    w.end_element("totalConImpuestos")?;
    Ok(())
}

/// Amounts and `impuestos` of a `detalle`, after its codes and description.
pub(super) fn write_item_amounts(w: &mut XmlWriter, item: &LineItem) -> Result<(), ComprobanteError> {
    let (Some(base), Some(tax)) = (item.taxable_base, item.tax_amount) else {
        return Err(ComprobanteError::Validation(
            "line amounts must be calculated before XML generation".into(),
        ));
    };
    w.quantity_element("cantidad", item.quantity)?;
    w.quantity_element("precioUnitario", item.unit_price)?;
    w.amount_element("descuento", item.discount)?;
    w.amount_element("precioTotalSinImpuesto", base)?;
    w.start_element("impuestos")?;
    w.start_element("impuesto")?;
    w.text_element("codigo", IVA_TAX_CODE)?;
    w.text_element("codigoPorcentaje", item.rate_code().code())?;
    w.amount_element("tarifa", item.tax_rate)?;
    w.amount_element("baseImponible", base)?;
    w.amount_element("valor", tax)?;
    w.end_element("impuesto")?;
    w.end_element("impuestos")?;
    Ok(())
}

/// `infoAdicional`: customer contact details followed by free-form fields.
/// Omitted when there is nothing to write.
pub(super) fn write_additional_info(w: &mut XmlWriter, doc: &Document) -> Result<(), ComprobanteError> {
    let mut fields: Vec<(&str, &str)> = Vec::new();
    if let Some(email) = &doc.customer.email {
        fields.push(("Email", email.as_str()));
    }
    if let Some(phone) = &doc.customer.phone {
        fields.push(("Telefono", phone.as_str()));
    }
    for (name, value) in &doc.additional_info {
        fields.push((name.as_str(), value.as_str()));
    }
    if fields.is_empty() {
        return Ok(());
    }

    w.start_element("infoAdicional")?;
    for (name, value) in fields {
        let name = clean_text(name, MAX_TEXT_LEN);
        w.clean_text_element_with_attrs("campoAdicional", value, &[("nombre", name.as_str())])?;
    }
    w.end_element("infoAdicional")?;
    Ok(())
}
