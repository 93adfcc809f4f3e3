use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::tax_codes::TaxRateCode;

/// A comprobante: invoice or credit note, before numbering.
///
/// The sequential number and access key are not part of the document; they
/// are allocated at issuance time and passed to the XML builder, so a
/// validated document can be prepared without touching the counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// `codDoc`: invoice (01) or credit note (04).
    pub doc_type: DocType,
    /// `ambiente`: test or production.
    pub environment: Environment,
    /// `tipoEmision`.
    pub emission_type: EmissionType,
    /// `fechaEmision`.
    pub issue_date: NaiveDate,
    /// `estab`: three-digit establishment code.
    pub establishment: String,
    /// `ptoEmi`: three-digit emission point code.
    pub emission_point: String,
    pub emitter: Emitter,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    /// `pagos`. Empty for credit notes.
    pub payments: Vec<Payment>,
    /// Invoice being modified. Required for credit notes.
    pub modified_document: Option<ModifiedDocument>,
    /// `propina`: tip, invoices only.
    pub tip: Decimal,
    /// `moneda`.
    pub currency: String,
    /// `infoAdicional` entries as (name, value) pairs.
    pub additional_info: Vec<(String, String)>,
    /// Calculated totals (set by `calculate_totals()`).
    pub totals: Option<Totals>,
}

/// The issuing taxpayer (`infoTributaria` plus the establishment data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emitter {
    /// 13-digit RUC.
    pub ruc: String,
    /// `razonSocial`.
    pub legal_name: String,
    /// `nombreComercial`.
    pub trade_name: Option<String>,
    /// `dirMatriz`.
    pub head_office_address: String,
    /// `dirEstablecimiento`.
    pub establishment_address: Option<String>,
    /// `contribuyenteEspecial`: resolution number, when applicable.
    pub special_taxpayer: Option<String>,
    /// `obligadoContabilidad`.
    pub keeps_accounting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub identification_type: IdentificationType,
    pub identification: String,
    /// `razonSocialComprador`.
    pub name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    /// The anonymous buyer (`CONSUMIDOR FINAL`, identification 9999999999999).
    pub fn final_consumer() -> Self {
        Self {
            identification_type: IdentificationType::FinalConsumer,
            identification: FINAL_CONSUMER_ID.to_string(),
            name: "CONSUMIDOR FINAL".to_string(),
            address: None,
            email: None,
            phone: None,
        }
    }
}

/// Identification required for the final consumer.
pub const FINAL_CONSUMER_ID: &str = "9999999999999";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// `codigoPrincipal` / `codigoInterno`.
    pub code: String,
    /// `codigoAuxiliar` / `codigoAdicional`.
    pub auxiliary_code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Absolute discount for the line.
    pub discount: Decimal,
    /// IVA rate percentage (e.g. 15).
    pub tax_rate: Decimal,
    /// `quantity * unit_price - discount`, rounded to cents.
    /// Set by `calculate_totals()`.
    pub taxable_base: Option<Decimal>,
    /// `taxable_base * tax_rate / 100`, rounded to cents.
    /// Set by `calculate_totals()`.
    pub tax_amount: Option<Decimal>,
}

impl LineItem {
    /// Rate code bucket this line falls into.
    pub fn rate_code(&self) -> TaxRateCode {
        TaxRateCode::for_rate(self.tax_rate)
    }

    /// `taxable_base + tax_amount`, once totals are calculated.
    pub fn total(&self) -> Option<Decimal> {
        self.taxable_base?.checked_add(self.tax_amount?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub total: Decimal,
    /// `plazo`.
    pub term: Option<u32>,
    /// `unidadTiempo`, e.g. "dias".
    pub time_unit: Option<String>,
}

impl Payment {
    pub fn new(method: PaymentMethod, total: Decimal) -> Self {
        Self {
            method,
            total,
            term: None,
            time_unit: None,
        }
    }

    /// Payment with a credit term in days.
    pub fn with_term_days(mut self, days: u32) -> Self {
        self.term = Some(days);
        self.time_unit = Some("dias".to_string());
        self
    }
}

/// The invoice a credit note modifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedDocument {
    /// `codDocModificado`.
    pub doc_type: DocType,
    /// `numDocModificado` in `EEE-PPP-SSSSSSSSS` form.
    pub number: String,
    /// `fechaEmisionDocSustento`.
    pub issue_date: NaiveDate,
    /// `motivo`.
    pub reason: String,
}

/// Document totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// `totalSinImpuestos`: sum of line taxable bases.
    pub subtotal: Decimal,
    /// `totalDescuento`: sum of line discounts.
    pub total_discount: Decimal,
    /// Sum of line tax amounts.
    pub total_tax: Decimal,
    /// `propina`.
    pub tip: Decimal,
    /// `importeTotal` / `valorModificacion` = subtotal + total_tax + tip.
    pub total: Decimal,
    /// `totalConImpuestos`, ordered by rate code.
    pub tax_buckets: Vec<TaxBucket>,
}

/// One `totalImpuesto` entry: all lines sharing a rate code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBucket {
    pub rate_code: TaxRateCode,
    pub taxable_base: Decimal,
    pub tax_amount: Decimal,
}

/// `codDoc` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocType {
    /// 01: Factura.
    Invoice,
    /// 04: Nota de crédito.
    CreditNote,
    /// 05: Nota de débito.
    DebitNote,
    /// 06: Guía de remisión.
    RemissionGuide,
    /// 07: Comprobante de retención.
    Withholding,
}

impl DocType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invoice => "01",
            Self::CreditNote => "04",
            Self::DebitNote => "05",
            Self::RemissionGuide => "06",
            Self::Withholding => "07",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Invoice),
            "04" => Some(Self::CreditNote),
            "05" => Some(Self::DebitNote),
            "06" => Some(Self::RemissionGuide),
            "07" => Some(Self::Withholding),
            _ => None,
        }
    }
}

/// `ambiente`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 1: pruebas.
    #[default]
    #[serde(alias = "pruebas")]
    Test,
    /// 2: producción.
    #[serde(alias = "produccion")]
    Production,
}

impl Environment {
    pub fn code(&self) -> char {
        match self {
            Self::Test => '1',
            Self::Production => '2',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '1' => Some(Self::Test),
            '2' => Some(Self::Production),
            _ => None,
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    /// Accepts the numeric code or the authority's names ("pruebas", "produccion").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "pruebas" | "test" => Ok(Self::Test),
            "2" | "produccion" | "producción" | "production" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// `tipoEmision`. Only normal (online) emission exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmissionType {
    #[default]
    Normal,
}

impl EmissionType {
    pub fn code(&self) -> char {
        match self {
            Self::Normal => '1',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '1' => Some(Self::Normal),
            _ => None,
        }
    }
}

/// `tipoIdentificacionComprador`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationType {
    /// 04: RUC.
    Ruc,
    /// 05: Cédula.
    Cedula,
    /// 06: Pasaporte.
    Passport,
    /// 07: Consumidor final.
    FinalConsumer,
    /// 08: Identificación del exterior.
    Foreign,
}

impl IdentificationType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ruc => "04",
            Self::Cedula => "05",
            Self::Passport => "06",
            Self::FinalConsumer => "07",
            Self::Foreign => "08",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "04" => Some(Self::Ruc),
            "05" => Some(Self::Cedula),
            "06" => Some(Self::Passport),
            "07" => Some(Self::FinalConsumer),
            "08" => Some(Self::Foreign),
            _ => None,
        }
    }
}

/// `formaPago` catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// 01: Sin utilización del sistema financiero (cash).
    Cash,
    /// 15: Compensación de deudas.
    DebtCompensation,
    /// 16: Tarjeta de débito.
    DebitCard,
    /// 17: Dinero electrónico.
    ElectronicMoney,
    /// 18: Tarjeta prepago.
    PrepaidCard,
    /// 19: Tarjeta de crédito.
    CreditCard,
    /// 20: Otros con utilización del sistema financiero (transfers).
    FinancialSystem,
    /// 21: Endoso de títulos.
    TitleEndorsement,
}

impl PaymentMethod {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cash => "01",
            Self::DebtCompensation => "15",
            Self::DebitCard => "16",
            Self::ElectronicMoney => "17",
            Self::PrepaidCard => "18",
            Self::CreditCard => "19",
            Self::FinancialSystem => "20",
            Self::TitleEndorsement => "21",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Cash),
            "15" => Some(Self::DebtCompensation),
            "16" => Some(Self::DebitCard),
            "17" => Some(Self::ElectronicMoney),
            "18" => Some(Self::PrepaidCard),
            "19" => Some(Self::CreditCard),
            "20" => Some(Self::FinancialSystem),
            "21" => Some(Self::TitleEndorsement),
            _ => None,
        }
    }
}

/// Format a document number as `EEE-PPP-SSSSSSSSS`.
pub fn format_doc_number(establishment: &str, emission_point: &str, sequential: u64) -> String {
    format!("{establishment:0>3}-{emission_point:0>3}-{sequential:09}")
}

/// Split an `EEE-PPP-SSSSSSSSS` document number into its parts.
pub fn parse_doc_number(number: &str) -> Option<(String, String, u64)> {
    let mut parts = number.split('-');
    let estab = parts.next()?;
    let point = parts.next()?;
    let seq = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(estab, 3) || !digits(point, 3) || !digits(seq, 9) {
        return None;
    }
    Some((estab.to_string(), point.to_string(), seq.parse().ok()?))
}
