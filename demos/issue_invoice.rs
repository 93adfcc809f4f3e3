//! Issue an invoice end to end: number, sign, submit, authorize.
//!
//! Signs with the test certificate under `tests/fixtures` unless
//! `COMPROBANTE_KEY` and `COMPROBANTE_CERT` point at PEM files
//! (`COMPROBANTE_PASSPHRASE` for an encrypted key). Nothing is sent unless
//! `--submit` is given; then the document goes to the SRI test environment.

use chrono::NaiveDate;
use comprobante::core::*;
use comprobante::issuance::Issuer;
use comprobante::sri::{SriClient, SriConfig};
use comprobante::xades::SigningCredentials;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const TEST_CERT: &str = include_str!("../tests/fixtures/cert.pem");
const TEST_KEY: &str = include_str!("../tests/fixtures/key_pkcs8.pem");

fn load_credentials() -> SigningCredentials {
    match (std::env::var("COMPROBANTE_KEY"), std::env::var("COMPROBANTE_CERT")) {
        (Ok(key_path), Ok(cert_path)) => {
            let key = std::fs::read_to_string(key_path).expect("key file should be readable");
            let cert = std::fs::read_to_string(cert_path).expect("cert file should be readable");
            let passphrase = std::env::var("COMPROBANTE_PASSPHRASE").ok();
            SigningCredentials::from_pem(&key, &cert, passphrase.as_deref())
                .expect("credentials should load")
        }
        _ => SigningCredentials::from_pem(TEST_KEY, TEST_CERT, None).expect("test credentials should load"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let submit = std::env::args().any(|a| a == "--submit");

    let invoice = DocumentBuilder::invoice(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap())
        .environment(Environment::Test)
        .point_of_sale("001", "001")
        .emitter(
            EmitterBuilder::new("0999999999001", "Comercial Andina S.A.", "Av. 9 de Octubre 100, Guayaquil")
                .trade_name("Andina")
                .keeps_accounting(true)
                .build(),
        )
        .customer(
            CustomerBuilder::new(IdentificationType::Ruc, "1790012345001", "Distribuidora Quito Cía. Ltda.")
                .address("Av. Amazonas N34-12, Quito")
                .email("compras@distribuidora.ec")
                .build(),
        )
        .add_item(
            LineItemBuilder::new("SRV-01", "Consultoría tributaria", dec!(10), dec!(45.00))
                .build(),
        )
        .add_item(
            LineItemBuilder::new("LIB-07", "Libro: Régimen tributario", dec!(2), dec!(18.50))
                .tax_rate(dec!(0))
                .build(),
        )
        .add_payment(Payment::new(PaymentMethod::FinancialSystem, dec!(554.50)).with_term_days(30))
        .additional_info("Orden de compra", "OC-2026-0117")
        .build()
        .expect("invoice should be valid");

    let totals = invoice.totals.as_ref().unwrap();
    println!("Subtotal: {}", totals.subtotal);
    for bucket in &totals.tax_buckets {
        println!(
            "  IVA code {}: base {} tax {}",
            bucket.rate_code.code(),
            bucket.taxable_base,
            bucket.tax_amount
        );
    }
    println!("Total:    {}", totals.total);

    let counter = SequentialCounter::new(InMemorySequenceStore::new());
    let client = SriClient::new(SriConfig::for_environment(Environment::Test)).expect("HTTP client should build");
    let issuer = Issuer::new("demo", counter, load_credentials(), client);

    let prepared = issuer.prepare(&invoice).await.expect("invoice should sign");
    println!("Number:     {}", prepared.doc_number);
    println!("Access key: {}", prepared.access_key);

    if !submit {
        println!("{}", prepared.signed_xml);
        return;
    }

    let issued = issuer.submit(prepared).await;
    println!("Status: {} after {} queries", issued.result.status, issued.result.attempts);
    if let Some(number) = &issued.result.authorization_number {
        println!("Authorization number: {number}");
    }
    for message in &issued.result.messages {
        println!("  [{}] {}", message.code, message.text);
    }
}
