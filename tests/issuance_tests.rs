#![cfg(all(feature = "xades", feature = "sri"))]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use comprobante::core::*;
use comprobante::issuance::Issuer;
use comprobante::sri::*;
use comprobante::xades::{self, SigningCredentials};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

const CERT_PEM: &str = include_str!("fixtures/cert.pem");
const KEY_PKCS8: &str = include_str!("fixtures/key_pkcs8.pem");

const RECIBIDA: &str = "<r><RespuestaRecepcionComprobante><estado>RECIBIDA</estado></RespuestaRecepcionComprobante></r>";
const DEVUELTA: &str = "<r><RespuestaRecepcionComprobante><estado>DEVUELTA</estado><comprobantes><comprobante><mensajes><mensaje><identificador>35</identificador><mensaje>ARCHIVO NO CUMPLE ESTRUCTURA XML</mensaje><tipo>ERROR</tipo></mensaje></mensajes></comprobante></comprobantes></RespuestaRecepcionComprobante></r>";
const EN_PROCESO: &str = "<r><RespuestaAutorizacionComprobante><autorizaciones/></RespuestaAutorizacionComprobante></r>";
const AUTORIZADO: &str = "<r><autorizaciones><autorizacion><estado>AUTORIZADO</estado><numeroAutorizacion>0101</numeroAutorizacion><fechaAutorizacion>2026-01-26T10:15:30-05:00</fechaAutorizacion><ambiente>PRUEBAS</ambiente></autorizacion></autorizaciones></r>";

type Reply = Result<SoapResponse, TransportError>;

fn ok(body: &str) -> Reply {
    Ok(SoapResponse {
        status: 200,
        body: body.to_string(),
    })
}

#[derive(Default)]
struct FakeSri {
    reception: Mutex<VecDeque<Reply>>,
    authorization: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSri {
    fn new(reception: Vec<Reply>, authorization: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            reception: Mutex::new(reception.into()),
            authorization: Mutex::new(authorization.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_to(&self, fragment: &str) -> usize {
        self.calls.lock().iter().filter(|(e, _)| e.contains(fragment)).count()
    }
}

#[async_trait]
impl SoapTransport for FakeSri {
    async fn post(&self, endpoint: &str, envelope: String) -> Reply {
        self.calls.lock().push((endpoint.to_string(), envelope));
        if endpoint.contains("Recepcion") {
            self.reception.lock().pop_front().unwrap_or_else(|| ok(RECIBIDA))
        } else {
            self.authorization.lock().pop_front().unwrap_or_else(|| ok(EN_PROCESO))
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> SriConfig {
    SriConfig::for_environment(Environment::Test)
        .with_base_url("http://sri.invalid")
        .with_max_retries(2)
        .with_retry_delay(Duration::from_secs(2))
        .with_settle_delay(Duration::from_secs(1))
}

fn make_issuer(
    fake: Arc<FakeSri>,
    config: SriConfig,
) -> Issuer<InMemorySequenceStore, Arc<FakeSri>> {
    Issuer::new(
        "tenant-1",
        SequentialCounter::new(InMemorySequenceStore::new()),
        SigningCredentials::from_pem(KEY_PKCS8, CERT_PEM, None).unwrap(),
        SriClient::with_transport(config, fake),
    )
}

fn emitter() -> Emitter {
    EmitterBuilder::new("0999999999001", "ACME S.A.", "Av. Amazonas N34-12").build()
}

fn invoice() -> Document {
    DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(emitter())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P001", "Servicio", dec!(2), dec!(30.00)).build())
        .build()
        .unwrap()
}

async fn current(issuer: &Issuer<InMemorySequenceStore, Arc<FakeSri>>, doc_type: DocType) -> u64 {
    issuer
        .counter()
        .current("tenant-1", "001", "001", doc_type)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn prepare_numbers_and_signs() {
    let issuer = make_issuer(FakeSri::new(vec![], vec![]), config());
    let doc = invoice();

    let first = issuer.prepare(&doc).await.unwrap();
    assert_eq!(first.sequential, 1);
    assert_eq!(first.doc_number, "001-001-000000001");
    assert!(validate_access_key(first.access_key.as_str()));

    let fields = first.access_key.fields();
    assert_eq!(fields.issue_date, "26/01/2026");
    assert_eq!(fields.ruc, "0999999999001");
    assert_eq!(fields.sequential_number(), Some(1));

    assert!(first.signed_xml.contains(&format!("<claveAcceso>{}</claveAcceso>", first.access_key)));
    assert!(first.signed_xml.contains("<secuencial>000000001</secuencial>"));
    assert!(xades::verify_integrity(&first.signed_xml).unwrap());

    let second = issuer.prepare(&doc).await.unwrap();
    assert_eq!(second.sequential, 2);
    assert_ne!(second.access_key, first.access_key);

    // Nothing went over the wire.
    assert!(issuer.client().transport().calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn document_types_have_separate_sequences() {
    let issuer = make_issuer(FakeSri::new(vec![], vec![]), config());
    issuer.prepare(&invoice()).await.unwrap();
    issuer.prepare(&invoice()).await.unwrap();

    let credit_note = DocumentBuilder::credit_note(
        date(2026, 1, 27),
        ModifiedDocument {
            doc_type: DocType::Invoice,
            number: "001-001-000000001".into(),
            issue_date: date(2026, 1, 26),
            reason: "Anulación".into(),
        },
    )
    .emitter(emitter())
    .customer(Customer::final_consumer())
    .add_item(LineItemBuilder::new("P001", "Servicio", dec!(1), dec!(30.00)).build())
    .build()
    .unwrap();

    let prepared = issuer.prepare(&credit_note).await.unwrap();
    assert_eq!(prepared.sequential, 1);
    assert!(prepared.signed_xml.contains("<notaCredito "));
    assert_eq!(current(&issuer, DocType::Invoice).await, 2);
    assert_eq!(current(&issuer, DocType::CreditNote).await, 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_document_allocates_no_number() {
    let issuer = make_issuer(FakeSri::new(vec![], vec![]), config());

    let mut tampered = invoice();
    if let Some(totals) = tampered.totals.as_mut() {
        totals.total = dec!(1000.00);
    }
    let err = issuer.prepare(&tampered).await.unwrap_err();
    assert!(matches!(err, ComprobanteError::Validation(_)));

    let mut without_totals = invoice();
    without_totals.totals = None;
    assert!(issuer.prepare(&without_totals).await.is_err());

    let unchecked = DocumentBuilder::invoice(date(2026, 1, 26))
        .emitter(EmitterBuilder::new("123", "", "").build())
        .customer(Customer::final_consumer())
        .add_item(LineItemBuilder::new("P001", "Servicio", dec!(1), dec!(1)).build())
        .build_unchecked()
        .unwrap();
    assert!(issuer.prepare(&unchecked).await.is_err());

    assert_eq!(current(&issuer, DocType::Invoice).await, 0);
}

#[tokio::test(start_paused = true)]
async fn environment_mismatch_is_rejected_before_numbering() {
    let issuer = make_issuer(
        FakeSri::new(vec![], vec![]),
        SriConfig::for_environment(Environment::Production).with_base_url("http://sri.invalid"),
    );
    let err = issuer.prepare(&invoice()).await.unwrap_err();
    assert!(matches!(err, ComprobanteError::Validation(ref m) if m.contains("environment")));
    assert_eq!(current(&issuer, DocType::Invoice).await, 0);
}

#[tokio::test(start_paused = true)]
async fn issue_submits_the_signed_document() {
    let fake = FakeSri::new(vec![], vec![ok(AUTORIZADO)]);
    let issuer = make_issuer(fake.clone(), config());

    let issued = issuer.issue(&invoice()).await.unwrap();

    assert_eq!(issued.sequential, 1);
    assert_eq!(issued.result.status, DocumentStatus::Authorized);
    assert_eq!(issued.result.authorization_number.as_deref(), Some("0101"));

    let calls = fake.calls.lock();
    let (_, envelope) = &calls[0];
    let encoded = STANDARD.encode(&issued.signed_xml);
    assert!(envelope.contains(&encoded));
}

#[tokio::test(start_paused = true)]
async fn rejected_document_keeps_its_number() {
    let fake = FakeSri::new(vec![ok(DEVUELTA)], vec![]);
    let issuer = make_issuer(fake.clone(), config());

    let issued = issuer.issue(&invoice()).await.unwrap();

    assert_eq!(issued.result.status, DocumentStatus::Rejected);
    assert_eq!(issued.result.messages[0].code, "35");
    assert_eq!(fake.calls_to("Autorizacion"), 0);
    assert_eq!(current(&issuer, DocType::Invoice).await, 1);
}

#[tokio::test(start_paused = true)]
async fn resend_reuses_key_and_number() {
    let fake = FakeSri::new(
        vec![Err(TransportError::Timeout(Duration::from_secs(30)))],
        vec![ok(AUTORIZADO)],
    );
    let issuer = make_issuer(fake.clone(), config());

    let issued = issuer.issue(&invoice()).await.unwrap();
    assert_eq!(issued.result.status, DocumentStatus::Error);
    assert_eq!(issued.result.messages[0].text, "Timeout al conectar con SRI");

    let retried = issuer.resend(&issued.signed_xml, &issued.access_key).await;
    assert_eq!(retried.status, DocumentStatus::Authorized);
    assert_eq!(current(&issuer, DocType::Invoice).await, 1);

    let calls = fake.calls.lock();
    let receptions: Vec<&String> = calls
        .iter()
        .filter(|(e, _)| e.contains("Recepcion"))
        .map(|(_, env)| env)
        .collect();
    assert_eq!(receptions.len(), 2);
    assert_eq!(receptions[0], receptions[1]);
}

#[tokio::test(start_paused = true)]
async fn requery_only_polls() {
    let fake = FakeSri::new(vec![], vec![ok(EN_PROCESO), ok(AUTORIZADO)]);
    let issuer = make_issuer(fake.clone(), config());
    let key: AccessKey = "2601202601099999999900110010010000000111234567819".parse().unwrap();

    let result = issuer.requery(&key).await;

    assert_eq!(result.status, DocumentStatus::Authorized);
    assert_eq!(result.attempts, 2);
    assert_eq!(fake.calls_to("Recepcion"), 0);
}

#[tokio::test(start_paused = true)]
async fn requery_polls_at_least_once() {
    let fake = FakeSri::new(vec![], vec![ok(AUTORIZADO)]);
    let issuer = make_issuer(fake.clone(), config().with_max_retries(0));
    let key: AccessKey = "2601202601099999999900110010010000000111234567819".parse().unwrap();

    let result = issuer.requery(&key).await;

    assert_eq!(result.status, DocumentStatus::Authorized);
    assert_eq!(fake.calls_to("Autorizacion"), 1);
}

#[tokio::test(start_paused = true)]
async fn prepared_document_survives_persistence() {
    let issuer = make_issuer(FakeSri::new(vec![], vec![]), config());
    let prepared = issuer.prepare(&invoice()).await.unwrap();

    let json = serde_json::to_string(&prepared).unwrap();
    let restored: comprobante::issuance::PreparedDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, prepared);

    let issued = issuer.submit(restored).await;
    assert_eq!(issued.access_key, prepared.access_key);
    assert_eq!(issued.result.status, DocumentStatus::InProcess);
    assert_eq!(issued.result.attempts, 2);
}
