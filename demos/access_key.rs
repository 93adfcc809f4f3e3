use chrono::NaiveDate;
use comprobante::core::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Generate the 49-digit key for invoice 001-001-000000042
    let key = AccessKeyBuilder::new(
        NaiveDate::from_ymd_opt(2026, 1, 26).unwrap(),
        DocType::Invoice,
        "0999999999001",
        Environment::Test,
        "001",
        "001",
        42,
    )
    .numeric_code(12345678)
    .build()
    .expect("key inputs should be valid");

    println!("Access key: {key}");
    println!("Valid: {}", validate_access_key(key.as_str()));

    let fields = key.fields();
    println!("  Issue date:     {}", fields.issue_date);
    println!("  Document type:  {:?}", fields.document_type());
    println!("  RUC:            {}", fields.ruc);
    println!("  Environment:    {:?}", fields.environment_kind());
    println!("  Number:         {}", fields.document_number());
    println!("  Numeric code:   {}", fields.numeric_code);
    println!("  Check digit:    {}", fields.check_digit);

    // Keys typed by hand are checked before use
    let mistyped = format!("{}0", &key.as_str()[..48]);
    if !validate_access_key(&mistyped) {
        println!("Rejected: {mistyped}");
    }
    match parse_access_key("12345") {
        Ok(_) => unreachable!(),
        Err(e) => println!("Rejected: {e}"),
    }
}
