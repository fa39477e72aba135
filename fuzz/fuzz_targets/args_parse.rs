#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(args) = memgate::connector::ConnectorArgs::parse(s) {
            let _ = args.parse_u64("size");
            let _ = args.get_bool("readonly");
            let _ = memgate::connector::ConnectorArgs::parse(&args.to_string());
        }
    }
});
