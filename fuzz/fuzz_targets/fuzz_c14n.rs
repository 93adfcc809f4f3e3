#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(once) = comprobante::xades::canonicalize(s) {
            // Canonical output must itself canonicalize to the same bytes.
            assert_eq!(comprobante::xades::canonicalize(&once).ok().as_deref(), Some(once.as_str()));
        }
    }
});
