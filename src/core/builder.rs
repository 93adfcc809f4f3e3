use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::ComprobanteError;
use super::types::*;
use super::validation;

/// Builder for invoices and credit notes.
///
/// ```
/// use comprobante::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let invoice = DocumentBuilder::invoice(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap())
///     .emitter(EmitterBuilder::new("0999999999001", "ACME S.A.", "Av. 9 de Octubre 100, Guayaquil").build())
///     .customer(Customer::final_consumer())
///     .add_item(LineItemBuilder::new("SKU-1", "Servicio de consultoría", dec!(2), dec!(30.00)).build())
///     .build()
///     .unwrap();
///
/// assert_eq!(invoice.totals.unwrap().total, dec!(69.00));
/// ```
pub struct DocumentBuilder {
    doc_type: DocType,
    issue_date: NaiveDate,
    environment: Environment,
    establishment: String,
    emission_point: String,
    emitter: Option<Emitter>,
    customer: Option<Customer>,
    items: Vec<LineItem>,
    payments: Vec<Payment>,
    modified_document: Option<ModifiedDocument>,
    tip: Decimal,
    currency: String,
    additional_info: Vec<(String, String)>,
}

impl DocumentBuilder {
    fn new(doc_type: DocType, issue_date: NaiveDate) -> Self {
        Self {
            doc_type,
            issue_date,
            environment: Environment::Test,
            establishment: "001".to_string(),
            emission_point: "001".to_string(),
            emitter: None,
            customer: None,
            items: Vec::new(),
            payments: Vec::new(),
            modified_document: None,
            tip: Decimal::ZERO,
            currency: "DOLAR".to_string(),
            additional_info: Vec::new(),
        }
    }

    /// Start an invoice (`factura`).
    pub fn invoice(issue_date: NaiveDate) -> Self {
        Self::new(DocType::Invoice, issue_date)
    }

    /// Start a credit note (`notaCredito`) modifying the given invoice.
    pub fn credit_note(issue_date: NaiveDate, modified: ModifiedDocument) -> Self {
        let mut builder = Self::new(DocType::CreditNote, issue_date);
        builder.modified_document = Some(modified);
        builder
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Establishment and emission point codes (default "001" / "001").
    pub fn point_of_sale(
        mut self,
        establishment: impl Into<String>,
        emission_point: impl Into<String>,
    ) -> Self {
        self.establishment = establishment.into();
        self.emission_point = emission_point.into();
        self
    }

    pub fn emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn add_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn add_payment(mut self, payment: Payment) -> Self {
        self.payments.push(payment);
        self
    }

    pub fn tip(mut self, tip: Decimal) -> Self {
        self.tip = tip;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Add a `campoAdicional` entry.
    pub fn additional_info(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_info.push((name.into(), value.into()));
        self
    }

    /// Build the document, calculating totals and running validation.
    /// Returns all validation errors (not just the first).
    ///
    /// An invoice without explicit payments gets a single cash payment for
    /// the full total.
    pub fn build(self) -> Result<Document, ComprobanteError> {
        if self.items.len() > 10_000 {
            return Err(ComprobanteError::Validation(
                "a document cannot have more than 10,000 line items".into(),
            ));
        }
        let mut doc = self.assemble()?;

        if doc.doc_type == DocType::Invoice && doc.payments.is_empty() {
            if let Some(totals) = &doc.totals {
                doc.payments.push(Payment::new(PaymentMethod::Cash, totals.total));
            }
        }

        let errors = validation::validate_document(&doc);
        if !errors.is_empty() {
            let msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ComprobanteError::Validation(msg));
        }

        Ok(doc)
    }

    /// Build without validation. Totals are still calculated.
    pub fn build_unchecked(self) -> Result<Document, ComprobanteError> {
        self.assemble()
    }

    fn assemble(self) -> Result<Document, ComprobanteError> {
        let emitter = self
            .emitter
            .ok_or_else(|| ComprobanteError::Validation("emitter is required".into()))?;
        let customer = self
            .customer
            .ok_or_else(|| ComprobanteError::Validation("customer is required".into()))?;

        let mut doc = Document {
            doc_type: self.doc_type,
            environment: self.environment,
            emission_type: EmissionType::Normal,
            issue_date: self.issue_date,
            establishment: self.establishment,
            emission_point: self.emission_point,
            emitter,
            customer,
            items: self.items,
            payments: self.payments,
            modified_document: self.modified_document,
            tip: self.tip,
            currency: self.currency,
            additional_info: self.additional_info,
            totals: None,
        };

        validation::calculate_totals(&mut doc);
        Ok(doc)
    }
}

/// Builder for the issuing taxpayer.
pub struct EmitterBuilder {
    ruc: String,
    legal_name: String,
    trade_name: Option<String>,
    head_office_address: String,
    establishment_address: Option<String>,
    special_taxpayer: Option<String>,
    keeps_accounting: bool,
}

impl EmitterBuilder {
    pub fn new(
        ruc: impl Into<String>,
        legal_name: impl Into<String>,
        head_office_address: impl Into<String>,
    ) -> Self {
        Self {
            ruc: ruc.into(),
            legal_name: legal_name.into(),
            trade_name: None,
            head_office_address: head_office_address.into(),
            establishment_address: None,
            special_taxpayer: None,
            keeps_accounting: false,
        }
    }

    pub fn trade_name(mut self, name: impl Into<String>) -> Self {
        self.trade_name = Some(name.into());
        self
    }

    pub fn establishment_address(mut self, address: impl Into<String>) -> Self {
        self.establishment_address = Some(address.into());
        self
    }

    pub fn special_taxpayer(mut self, resolution: impl Into<String>) -> Self {
        self.special_taxpayer = Some(resolution.into());
        self
    }

    pub fn keeps_accounting(mut self, keeps: bool) -> Self {
        self.keeps_accounting = keeps;
        self
    }

    pub fn build(self) -> Emitter {
        Emitter {
            ruc: self.ruc,
            legal_name: self.legal_name,
            trade_name: self.trade_name,
            head_office_address: self.head_office_address,
            establishment_address: self.establishment_address,
            special_taxpayer: self.special_taxpayer,
            keeps_accounting: self.keeps_accounting,
        }
    }
}

/// Builder for an identified customer.
pub struct CustomerBuilder {
    identification_type: IdentificationType,
    identification: String,
    name: String,
    address: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl CustomerBuilder {
    pub fn new(
        identification_type: IdentificationType,
        identification: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            identification_type,
            identification: identification.into(),
            name: name.into(),
            address: None,
            email: None,
            phone: None,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn build(self) -> Customer {
        Customer {
            identification_type: self.identification_type,
            identification: self.identification,
            name: self.name,
            address: self.address,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// Builder for LineItem.
pub struct LineItemBuilder {
    code: String,
    auxiliary_code: Option<String>,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
}

impl LineItemBuilder {
    /// New line at the general 15% IVA rate with no discount.
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            code: code.into(),
            auxiliary_code: None,
            description: description.into(),
            quantity,
            unit_price,
            discount: Decimal::ZERO,
            tax_rate: Decimal::new(15, 0),
        }
    }

    pub fn auxiliary_code(mut self, code: impl Into<String>) -> Self {
        self.auxiliary_code = Some(code.into());
        self
    }

    pub fn discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    pub fn tax_rate(mut self, rate: Decimal) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            code: self.code,
            auxiliary_code: self.auxiliary_code,
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
            tax_rate: self.tax_rate,
            taxable_base: None,
            tax_amount: None,
        }
    }
}
