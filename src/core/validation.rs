use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use super::error::ValidationError;
use super::tax_codes::TaxRateCode;
use super::types::*;

/// Maximum characters the authority's schema allows in free-text fields.
pub const MAX_TEXT_LEN: usize = 300;

/// `codigoPrincipal` / `codigoInterno` limit.
pub const MAX_CODE_LEN: usize = 25;

/// Validate a document before numbering and XML generation.
/// Returns all validation errors found (not just the first).
pub fn validate_document(doc: &Document) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_emitter(&doc.emitter, &mut errors);

    if !is_valid_point_code(&doc.establishment) {
        errors.push(ValidationError::new(
            "establishment",
            format!(
                "establishment code '{}' must be 3 digits greater than 000",
                doc.establishment
            ),
        ));
    }
    if !is_valid_point_code(&doc.emission_point) {
        errors.push(ValidationError::new(
            "emission_point",
            format!(
                "emission point code '{}' must be 3 digits greater than 000",
                doc.emission_point
            ),
        ));
    }

    validate_customer(&doc.customer, &mut errors);

    if doc.items.is_empty() {
        errors.push(ValidationError::new(
            "items",
            "at least one line item is required",
        ));
    }
    for (i, item) in doc.items.iter().enumerate() {
        validate_item(item, i, &mut errors);
    }

    if doc.currency.trim().is_empty() {
        errors.push(ValidationError::new("currency", "currency must not be empty"));
    }
    if doc.tip < Decimal::ZERO {
        errors.push(ValidationError::new("tip", "tip must not be negative"));
    }

    match doc.doc_type {
        DocType::Invoice => validate_payments(doc, &mut errors),
        DocType::CreditNote => validate_credit_note(doc, &mut errors),
        other => errors.push(ValidationError::new(
            "doc_type",
            format!("document type {} is not supported", other.code()),
        )),
    }

    for (i, (name, value)) in doc.additional_info.iter().enumerate() {
        if name.trim().is_empty() || value.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("additional_info[{i}]"),
                "additional information entries need a name and a value",
            ));
        }
    }

    errors.extend(validate_arithmetic(doc));

    errors
}

fn validate_emitter(emitter: &Emitter, errors: &mut Vec<ValidationError>) {
    if !is_valid_ruc(&emitter.ruc) {
        errors.push(ValidationError::new(
            "emitter.ruc",
            format!("'{}' is not a valid RUC", emitter.ruc),
        ));
    }
    if emitter.legal_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "emitter.legal_name",
            "legal name must not be empty",
        ));
    }
    if emitter.head_office_address.trim().is_empty() {
        errors.push(ValidationError::new(
            "emitter.head_office_address",
            "head office address must not be empty",
        ));
    }
}

fn validate_customer(customer: &Customer, errors: &mut Vec<ValidationError>) {
    if customer.identification.trim().is_empty() {
        errors.push(ValidationError::new(
            "customer.identification",
            "customer identification is required",
        ));
    } else if let Err(msg) =
        validate_identification(customer.identification_type, &customer.identification)
    {
        errors.push(ValidationError::new("customer.identification", msg));
    }
    if customer.name.trim().is_empty() {
        errors.push(ValidationError::new(
            "customer.name",
            "customer name must not be empty",
        ));
    }
}

fn validate_item(item: &LineItem, idx: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("items[{idx}]");

    if item.code.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{prefix}.code"),
            "item code must not be empty",
        ));
    }
    if item.description.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{prefix}.description"),
            "item description must not be empty",
        ));
    }
    if item.quantity <= Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.quantity"),
            "quantity must be greater than zero",
        ));
    }
    if item.unit_price < Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.unit_price"),
            "unit price must not be negative",
        ));
    }
    if item.discount < Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.discount"),
            "discount must not be negative",
        ));
    } else if let Some(gross) = item.quantity.checked_mul(item.unit_price) {
        if item.discount > gross {
            errors.push(ValidationError::new(
                format!("{prefix}.discount"),
                format!("discount {} exceeds line amount {}", item.discount, gross),
            ));
        }
    }
    if item.tax_rate < Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.tax_rate"),
            "tax rate must not be negative",
        ));
    }
    if line_amounts(item).is_none() {
        errors.push(ValidationError::new(
            format!("{prefix}.amount"),
            AMOUNT_OUT_OF_RANGE,
        ));
    }
}

fn validate_payments(doc: &Document, errors: &mut Vec<ValidationError>) {
    if doc.modified_document.is_some() {
        errors.push(ValidationError::new(
            "modified_document",
            "invoices do not reference a modified document",
        ));
    }
    if doc.payments.is_empty() {
        errors.push(ValidationError::new(
            "payments",
            "an invoice needs at least one payment",
        ));
        return;
    }
    for (i, payment) in doc.payments.iter().enumerate() {
        if payment.total < Decimal::ZERO {
            errors.push(ValidationError::new(
                format!("payments[{i}].total"),
                "payment total must not be negative",
            ));
        }
    }
    if let Some(totals) = &doc.totals {
        let Some(paid) = checked_sum(doc.payments.iter().map(|p| p.total)) else {
            errors.push(ValidationError::new("payments", AMOUNT_OUT_OF_RANGE));
            return;
        };
        if round_half_up(paid, 2) != totals.total {
            errors.push(ValidationError::new(
                "payments",
                format!(
                    "payments add up to {} but the invoice total is {}",
                    paid, totals.total
                ),
            ));
        }
    }
}

fn validate_credit_note(doc: &Document, errors: &mut Vec<ValidationError>) {
    if !doc.payments.is_empty() {
        errors.push(ValidationError::new(
            "payments",
            "credit notes carry no payments",
        ));
    }
    if doc.tip != Decimal::ZERO {
        errors.push(ValidationError::new("tip", "credit notes carry no tip"));
    }
    let Some(modified) = &doc.modified_document else {
        errors.push(ValidationError::new(
            "modified_document",
            "a credit note must reference the invoice it modifies",
        ));
        return;
    };
    if parse_doc_number(&modified.number).is_none() {
        errors.push(ValidationError::new(
            "modified_document.number",
            format!(
                "'{}' is not a document number of the form EEE-PPP-SSSSSSSSS",
                modified.number
            ),
        ));
    }
    if modified.reason.trim().is_empty() {
        errors.push(ValidationError::new(
            "modified_document.reason",
            "a credit note needs a reason",
        ));
    }
    if modified.issue_date > doc.issue_date {
        errors.push(ValidationError::new(
            "modified_document.issue_date",
            "the modified invoice cannot be issued after the credit note",
        ));
    }
}

/// Validate document arithmetic: per-line amounts, buckets and totals must
/// reconcile exactly.
pub fn validate_arithmetic(doc: &Document) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(totals) = &doc.totals else {
        // Lines out of range leave the totals unset; validate_item reports them.
        if doc.items.iter().any(|item| line_amounts(item).is_none()) {
            return errors;
        }
        let message = if sum_totals(doc).is_none() {
            AMOUNT_OUT_OF_RANGE
        } else {
            "totals must be calculated before validation (call calculate_totals first)"
        };
        errors.push(ValidationError::new("totals", message));
        return errors;
    };

    for (i, item) in doc.items.iter().enumerate() {
        // Out-of-range lines are reported by validate_item.
        let Some((base, tax)) = line_amounts(item) else {
            continue;
        };
        if item.taxable_base != Some(base) || item.tax_amount != Some(tax) {
            errors.push(ValidationError::new(
                format!("items[{i}]"),
                format!("line amounts do not match computed base {base} and tax {tax}"),
            ));
        }
    }

    let sums = (
        checked_sum(doc.items.iter().filter_map(|l| l.taxable_base)),
        checked_sum(doc.items.iter().filter_map(|l| l.tax_amount)),
        checked_sum(totals.tax_buckets.iter().map(|b| b.taxable_base)),
        checked_sum(totals.tax_buckets.iter().map(|b| b.tax_amount)),
        totals
            .subtotal
            .checked_add(totals.total_tax)
            .and_then(|sum| sum.checked_add(totals.tip)),
    );
    let (Some(line_bases), Some(line_taxes), Some(bucket_bases), Some(bucket_taxes), Some(expected)) =
        sums
    else {
        errors.push(ValidationError::new("totals", AMOUNT_OUT_OF_RANGE));
        return errors;
    };

    if totals.subtotal != line_bases || bucket_bases != line_bases {
        errors.push(ValidationError::new(
            "totals.subtotal",
            format!(
                "subtotal {} and bucket bases {} must both equal the sum of line bases {}",
                totals.subtotal, bucket_bases, line_bases
            ),
        ));
    }
    if totals.total_tax != line_taxes || bucket_taxes != line_taxes {
        errors.push(ValidationError::new(
            "totals.total_tax",
            format!(
                "total tax {} and bucket taxes {} must both equal the sum of line taxes {}",
                totals.total_tax, bucket_taxes, line_taxes
            ),
        ));
    }
    if totals.total != expected {
        errors.push(ValidationError::new(
            "totals.total",
            format!(
                "total {} does not match subtotal {} + tax {} + tip {}",
                totals.total, totals.subtotal, totals.total_tax, totals.tip
            ),
        ));
    }

    errors
}

/// Calculate all totals for a document: per-line base and tax, rate-code
/// buckets, and document totals.
///
/// Every line amount is rounded half away from zero to cents before it is
/// summed, so buckets and totals are exact sums of what the lines show.
///
/// Amounts beyond `Decimal`'s range leave the affected line amounts and the
/// totals unset; [`validate_document`] reports them.
pub fn calculate_totals(doc: &mut Document) {
    for item in &mut doc.items {
        let amounts = line_amounts(item);
        item.taxable_base = amounts.map(|(base, _)| base);
        item.tax_amount = amounts.map(|(_, tax)| tax);
    }
    doc.totals = sum_totals(doc);
    if doc.totals.is_none() {
        warn!("document amounts are out of range, totals left unset");
    }
}

/// Buckets and document totals from freshly computed line amounts.
fn sum_totals(doc: &Document) -> Option<Totals> {
    let mut buckets: BTreeMap<TaxRateCode, (Decimal, Decimal)> = BTreeMap::new();
    let mut subtotal = Decimal::ZERO;
    let mut total_tax = Decimal::ZERO;
    for item in &doc.items {
        let (base, tax) = line_amounts(item)?;
        subtotal = subtotal.checked_add(base)?;
        total_tax = total_tax.checked_add(tax)?;

        let code = match TaxRateCode::lookup(item.tax_rate) {
            Some(code) => code,
            None => {
                warn!(
                    rate = %item.tax_rate,
                    fallback = TaxRateCode::FALLBACK.code(),
                    "tax rate has no catalog code, using fallback"
                );
                TaxRateCode::FALLBACK
            }
        };
        let entry = buckets.entry(code).or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 = entry.0.checked_add(base)?;
        entry.1 = entry.1.checked_add(tax)?;
    }

    let tax_buckets: Vec<TaxBucket> = buckets
        .into_iter()
        .map(|(rate_code, (taxable_base, tax_amount))| TaxBucket {
            rate_code,
            taxable_base,
            tax_amount,
        })
        .collect();

    let total_discount = checked_sum(doc.items.iter().map(|l| round_half_up(l.discount, 2)))?;
    let tip = round_half_up(doc.tip, 2);
    let total = subtotal.checked_add(total_tax)?.checked_add(tip)?;

    Some(Totals {
        subtotal,
        total_discount,
        total_tax,
        tip,
        total,
        tax_buckets,
    })
}

/// Message for amounts beyond what `Decimal` can represent.
const AMOUNT_OUT_OF_RANGE: &str = "importe fuera de rango";

/// Rounded (taxable base, tax amount) for a line, `None` on overflow.
fn line_amounts(item: &LineItem) -> Option<(Decimal, Decimal)> {
    let gross = item.quantity.checked_mul(item.unit_price)?;
    let base = round_half_up(gross.checked_sub(item.discount)?, 2);
    let tax = round_half_up(base.checked_mul(item.tax_rate)?.checked_div(dec!(100))?, 2);
    Some((base, tax))
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

pub(crate) fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Identification numbers
// ---------------------------------------------------------------------------

/// Validate a customer identification against its declared type.
pub fn validate_identification(kind: IdentificationType, value: &str) -> Result<(), String> {
    match kind {
        IdentificationType::Ruc if is_valid_ruc(value) => Ok(()),
        IdentificationType::Ruc => Err(format!("'{value}' is not a valid RUC")),
        IdentificationType::Cedula if is_valid_cedula(value) => Ok(()),
        IdentificationType::Cedula => Err(format!("'{value}' is not a valid cédula")),
        IdentificationType::Passport | IdentificationType::Foreign => {
            if value.trim().chars().count() >= 3 {
                Ok(())
            } else {
                Err("passport or foreign identification needs at least 3 characters".into())
            }
        }
        IdentificationType::FinalConsumer if value == FINAL_CONSUMER_ID => Ok(()),
        IdentificationType::FinalConsumer => Err(format!(
            "final consumer identification must be {FINAL_CONSUMER_ID}"
        )),
    }
}

/// RUC: 13 digits, a valid province prefix and the `001` suffix.
pub fn is_valid_ruc(ruc: &str) -> bool {
    ruc.len() == 13
        && ruc.bytes().all(|b| b.is_ascii_digit())
        && ruc.ends_with("001")
        && has_valid_province(ruc)
}

/// Cédula: 10 digits, a valid province prefix and a mod-10 check digit.
pub fn is_valid_cedula(cedula: &str) -> bool {
    if cedula.len() != 10 || !cedula.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if !has_valid_province(cedula) {
        return false;
    }
    let digits: Vec<u32> = cedula.bytes().map(|b| u32::from(b - b'0')).collect();
    if digits[2] >= 6 {
        return false;
    }
    let sum: u32 = digits[..9]
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let p = if i % 2 == 0 { d * 2 } else { *d };
            if p > 9 { p - 9 } else { p }
        })
        .sum();
    (10 - sum % 10) % 10 == digits[9]
}

fn has_valid_province(id: &str) -> bool {
    matches!(id[..2].parse::<u8>(), Ok(1..=24) | Ok(30))
}

/// Establishment and emission point codes: three digits, not `000`.
pub fn is_valid_point_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit()) && code != "000"
}
