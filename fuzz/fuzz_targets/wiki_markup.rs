#![no_main]

use libfuzzer_sys::fuzz_target;
use testcase_migrator::attachments::{canonicalize, pending_references};
use testcase_migrator::wiki_markup::wiki_to_markdown;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let markdown = wiki_to_markdown(text);
    let _ = pending_references(&canonicalize(&markdown));
});
