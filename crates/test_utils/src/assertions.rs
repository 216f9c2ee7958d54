//! Custom Test Assertions
//!
//! Assertions over sync reports with failure messages that show the whole
//! report.

use core_kernel::CrmSystem;
use domain_sync::{InboundReport, InboundState, OutboundReport, OutboundState, RecordedCall};

/// Asserts the outbound report ended in `expected`
#[track_caller]
pub fn assert_outbound_state(report: &OutboundReport, expected: OutboundState) {
    assert_eq!(
        report.state, expected,
        "unexpected outbound state; report: {:#?}",
        report
    );
}

/// Asserts `crm_system` was called and accepted the payload
#[track_caller]
pub fn assert_crm_succeeded(report: &OutboundReport, crm_system: CrmSystem) {
    match report.result_for(crm_system) {
        Some(result) => assert!(
            result.is_success(),
            "{} failed: {:?} {:?}",
            crm_system,
            result.error_code(),
            result.error_message()
        ),
        None => panic!("no result for {}; report: {:#?}", crm_system, report),
    }
}

/// Asserts `crm_system` failed with the given error code
#[track_caller]
pub fn assert_crm_failed_with(report: &OutboundReport, crm_system: CrmSystem, error_code: &str) {
    match report.result_for(crm_system) {
        Some(result) => {
            assert!(!result.is_success(), "{} unexpectedly succeeded", crm_system);
            assert_eq!(result.error_code(), Some(error_code), "wrong error code for {}", crm_system);
        }
        None => panic!("no result for {}; report: {:#?}", crm_system, report),
    }
}

/// Asserts the recorded payload carries exactly these CRM fields
#[track_caller]
pub fn assert_payload_keys(call: &RecordedCall, expected: &[&str]) {
    let mut actual: Vec<&str> = call.payload.properties().keys().map(String::as_str).collect();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "payload keys differ");
}

/// Asserts the inbound report ended in `expected`
#[track_caller]
pub fn assert_inbound_state(report: &InboundReport, expected: InboundState) {
    assert_eq!(
        report.state, expected,
        "unexpected inbound state for {} event {}; report: {:#?}",
        report.crm_system, report.external_event_id, report
    );
}
