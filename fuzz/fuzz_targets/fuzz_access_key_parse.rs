#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let valid = comprobante::core::validate_access_key(s);
        if let Ok(fields) = comprobante::core::parse_access_key(s) {
            let _ = fields.date();
            let _ = fields.document_type();
            let _ = fields.sequential_number();
            let _ = fields.document_number();
        } else {
            assert!(!valid);
        }
    }
});
