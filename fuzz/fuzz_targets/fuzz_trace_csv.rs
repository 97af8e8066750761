#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(rows) = column_config::read_trace(data) {
        assert!(rows.windows(2).all(|w| w[0].t_ms <= w[1].t_ms));
    }
});
