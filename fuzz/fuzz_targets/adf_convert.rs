#![no_main]

use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use testcase_migrator::converter::{ConversionOptions, MarkdownConverter};
use testcase_migrator::document::parse_document_str;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(doc) = parse_document_str(json) else {
        return;
    };

    let converter = MarkdownConverter::with_options(ConversionOptions {
        timeout: Duration::from_secs(1),
        ..Default::default()
    });
    if let Ok(converted) = converter.convert(&doc) {
        assert!(converted.markdown.is_empty() || converted.markdown.ends_with('\n'));
    }
});
