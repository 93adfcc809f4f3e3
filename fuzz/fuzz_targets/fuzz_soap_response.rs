#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = comprobante::sri::parse_reception_response(s);
        let _ = comprobante::sri::parse_authorization_response(s);
    }
});
