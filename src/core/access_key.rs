//! Access key (`claveAcceso`) generation, validation and parsing.
//!
//! Layout of the 49 digits:
//!
//! | Digits | Field |
//! |--------|-------|
//! | 0..8   | issue date `DDMMYYYY` |
//! | 8..10  | document type |
//! | 10..23 | emitter RUC |
//! | 23     | environment (1 test, 2 production) |
//! | 24..27 | establishment |
//! | 27..30 | emission point |
//! | 30..39 | sequential |
//! | 39..47 | numeric code |
//! | 47     | emission type |
//! | 48     | mod-11 check digit |

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::ComprobanteError;
use super::types::{DocType, Document, EmissionType, Environment};

/// Total length of an access key.
pub const ACCESS_KEY_LEN: usize = 49;

/// Length of the body the check digit is computed over.
pub const ACCESS_KEY_BODY_LEN: usize = 48;

/// A validated 49-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into its fields.
    pub fn fields(&self) -> AccessKeyFields {
        split_fields(&self.0)
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AccessKey {
    type Err = ComprobanteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_access_key(s)?;
        if !validate_access_key(s) {
            return Err(ComprobanteError::Validation(format!(
                "access key {s} has a wrong check digit"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for AccessKey {
    type Error = ComprobanteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Fields decoded from an access key, kept as the zero-padded digit strings
/// they were encoded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyFields {
    /// Issue date as `dd/mm/yyyy`.
    pub issue_date: String,
    pub doc_type: String,
    pub ruc: String,
    pub environment: String,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    pub numeric_code: String,
    pub emission_type: String,
    pub check_digit: String,
}

impl AccessKeyFields {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.issue_date, "%d/%m/%Y").ok()
    }

    pub fn document_type(&self) -> Option<DocType> {
        DocType::from_code(&self.doc_type)
    }

    pub fn environment_kind(&self) -> Option<Environment> {
        self.environment.chars().next().and_then(Environment::from_code)
    }

    pub fn sequential_number(&self) -> Option<u64> {
        self.sequential.parse().ok()
    }

    /// `EEE-PPP-SSSSSSSSS`.
    pub fn document_number(&self) -> String {
        format!(
            "{}-{}-{}",
            self.establishment, self.emission_point, self.sequential
        )
    }
}

/// Builder for access keys.
///
/// ```
/// use comprobante::core::*;
/// use chrono::NaiveDate;
///
/// let key = AccessKeyBuilder::new(
///     NaiveDate::from_ymd_opt(2026, 1, 26).unwrap(),
///     DocType::Invoice,
///     "0999999999001",
///     Environment::Test,
///     "001",
///     "001",
///     11,
/// )
/// .numeric_code(12345678)
/// .build()
/// .unwrap();
///
/// assert!(validate_access_key(key.as_str()));
/// assert_eq!(key.fields().sequential, "000000011");
/// ```
#[derive(Debug, Clone)]
pub struct AccessKeyBuilder {
    issue_date: NaiveDate,
    doc_type: DocType,
    ruc: String,
    environment: Environment,
    establishment: String,
    emission_point: String,
    sequential: u64,
    numeric_code: Option<u32>,
    emission_type: EmissionType,
}

impl AccessKeyBuilder {
    pub fn new(
        issue_date: NaiveDate,
        doc_type: DocType,
        ruc: impl Into<String>,
        environment: Environment,
        establishment: impl Into<String>,
        emission_point: impl Into<String>,
        sequential: u64,
    ) -> Self {
        Self {
            issue_date,
            doc_type,
            ruc: ruc.into(),
            environment,
            establishment: establishment.into(),
            emission_point: emission_point.into(),
            sequential,
            numeric_code: None,
            emission_type: EmissionType::Normal,
        }
    }

    /// Key for a built document and its allocated sequential.
    pub fn for_document(doc: &Document, sequential: u64) -> Self {
        Self::new(
            doc.issue_date,
            doc.doc_type,
            doc.emitter.ruc.clone(),
            doc.environment,
            doc.establishment.clone(),
            doc.emission_point.clone(),
            sequential,
        )
        .emission_type(doc.emission_type)
    }

    /// Fixed 8-digit numeric code. Defaults to the current Unix time modulo 10^8.
    pub fn numeric_code(mut self, code: u32) -> Self {
        self.numeric_code = Some(code);
        self
    }

    pub fn emission_type(mut self, emission_type: EmissionType) -> Self {
        self.emission_type = emission_type;
        self
    }

    pub fn build(self) -> Result<AccessKey, ComprobanteError> {
        let numeric_code = self.numeric_code.unwrap_or_else(default_numeric_code);
        let body = format!(
            "{}{}{}{}{}{}{:09}{:08}{}",
            self.issue_date.format("%d%m%Y"),
            self.doc_type.code(),
            zero_pad(&self.ruc, 13),
            self.environment.code(),
            zero_pad(&self.establishment, 3),
            zero_pad(&self.emission_point, 3),
            self.sequential,
            numeric_code,
            self.emission_type.code(),
        );

        if body.len() != ACCESS_KEY_BODY_LEN {
            return Err(ComprobanteError::InvalidLength {
                expected: ACCESS_KEY_BODY_LEN,
                actual: body.len(),
            });
        }
        if !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ComprobanteError::Validation(format!(
                "access key body must be numeric: {body}"
            )));
        }

        let check = calculate_mod11(&body)?;
        Ok(AccessKey(format!("{body}{check}")))
    }
}

/// Generate an access key with a timestamp-derived numeric code.
#[allow(clippy::too_many_arguments)]
pub fn generate_access_key(
    issue_date: NaiveDate,
    doc_type: DocType,
    ruc: &str,
    environment: Environment,
    establishment: &str,
    emission_point: &str,
    sequential: u64,
    emission_type: EmissionType,
) -> Result<AccessKey, ComprobanteError> {
    AccessKeyBuilder::new(
        issue_date,
        doc_type,
        ruc,
        environment,
        establishment,
        emission_point,
        sequential,
    )
    .emission_type(emission_type)
    .build()
}

/// Left-pad an all-digit field to `width`. Anything else is returned as is
/// and rejected by the length and digit checks in [`AccessKeyBuilder::build`].
fn zero_pad(field: &str, width: usize) -> String {
    if field.len() < width && field.bytes().all(|b| b.is_ascii_digit()) {
        format!("{field:0>width$}")
    } else {
        field.to_string()
    }
}

fn default_numeric_code() -> u32 {
    // rem_euclid keeps the value in 0..10^8, so the cast cannot truncate
    Utc::now().timestamp().rem_euclid(100_000_000) as u32
}

/// Modulus-11 check digit over a string of digits.
///
/// Weights 2..=7 are applied cyclically from the rightmost digit. The check
/// is `11 - sum % 11`, with 11 mapped to 0 and 10 mapped to 1.
pub fn calculate_mod11(digits: &str) -> Result<u8, ComprobanteError> {
    // sum stays below 11 after every digit
    let mut sum: u32 = 0;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return Err(ComprobanteError::Validation(format!(
                "non-digit character {:?} in check digit input",
                b as char
            )));
        }
        let weight = (i % 6) as u32 + 2;
        sum = (sum + u32::from(b - b'0') * weight) % 11;
    }
    let check = 11 - sum % 11;
    Ok(match check {
        11 => 0,
        10 => 1,
        n => n as u8,
    })
}

/// True if `key` is 49 digits whose last digit is the mod-11 check of the
/// first 48.
pub fn validate_access_key(key: &str) -> bool {
    if key.len() != ACCESS_KEY_LEN || !key.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (body, check) = key.split_at(ACCESS_KEY_BODY_LEN);
    match calculate_mod11(body) {
        Ok(expected) => check.as_bytes()[0] - b'0' == expected,
        Err(_) => false,
    }
}

/// Split an access key into its fields. The check digit is not verified;
/// use [`validate_access_key`] for that.
pub fn parse_access_key(key: &str) -> Result<AccessKeyFields, ComprobanteError> {
    let len = key.chars().count();
    if len != ACCESS_KEY_LEN {
        return Err(ComprobanteError::InvalidLength {
            expected: ACCESS_KEY_LEN,
            actual: len,
        });
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ComprobanteError::Validation(format!(
            "access key must contain only digits: {key}"
        )));
    }
    Ok(split_fields(key))
}

fn split_fields(key: &str) -> AccessKeyFields {
    AccessKeyFields {
        issue_date: format!("{}/{}/{}", &key[0..2], &key[2..4], &key[4..8]),
        doc_type: key[8..10].to_string(),
        ruc: key[10..23].to_string(),
        environment: key[23..24].to_string(),
        establishment: key[24..27].to_string(),
        emission_point: key[27..30].to_string(),
        sequential: key[30..39].to_string(),
        numeric_code: key[39..47].to_string(),
        emission_type: key[47..48].to_string(),
        check_digit: key[48..49].to_string(),
    }
}
