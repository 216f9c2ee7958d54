//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::{CrmSystem, EntityType, PortError};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_not_found() {
    let error = CoreError::not_found("Tenant not found");

    match error {
        CoreError::NotFound(msg) => assert_eq!(msg, "Tenant not found"),
        _ => panic!("Expected NotFound error"),
    }
}

#[test]
fn test_unknown_tag_from_parsing() {
    let error = "zoho".parse::<CrmSystem>().unwrap_err();

    match error {
        CoreError::UnknownTag { kind, value } => {
            assert_eq!(kind, "crm system");
            assert_eq!(value, "zoho");
        }
        _ => panic!("Expected UnknownTag error"),
    }

    assert!("lead".parse::<EntityType>().is_err());
}

#[test]
fn test_core_error_display() {
    let error = CoreError::configuration("missing database_url");
    let display = format!("{}", error);

    assert!(display.contains("Configuration error"));
    assert!(display.contains("database_url"));
}

#[test]
fn test_port_error_codes_are_stable() {
    assert_eq!(PortError::not_found("Company", "x").code(), "not_found");
    assert_eq!(PortError::connection("refused").code(), "connection");
    assert_eq!(PortError::internal("bug").code(), "internal");
    assert_eq!(
        PortError::ServiceUnavailable { service: "hubspot".to_string() }.code(),
        "service_unavailable"
    );
}

#[test]
fn test_port_error_validation_field() {
    let error = PortError::validation_field("must not be blank", "external_event_id");

    match error {
        PortError::Validation { field, .. } => {
            assert_eq!(field.as_deref(), Some("external_event_id"));
        }
        _ => panic!("Expected Validation error"),
    }
}
