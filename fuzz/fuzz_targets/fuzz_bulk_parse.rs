#![no_main]

//! Fuzz target for the bulk input parser.
//!
//! Arbitrary text must either parse or fail with a positioned error, and anything that parses
//! must survive the failed-record export format unchanged.

use libfuzzer_sys::fuzz_target;

use trackdash::bulk::parse_bulk_input;
use trackdash::ParseError;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    match parse_bulk_input(raw, 1) {
        Ok(records) => {
            assert!(!records.is_empty());
            for record in &records {
                assert!(!record.subject.trim().is_empty());
                assert_eq!(record.project_id, 1);
            }

            // Exported records read back identically.
            let exported = serde_json::to_string(&records).expect("records serialize");
            let reparsed = parse_bulk_input(&exported, 1).expect("export reparses");
            assert_eq!(reparsed, records);
        }
        Err(ParseError::Invalid { position, .. }) => assert!(position >= 1),
        Err(ParseError::Empty) | Err(ParseError::NotAList) => {}
    }
});
