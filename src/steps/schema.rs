//! Shape rules for saved step data.
//!
//! Drafts may be incomplete, so every field is optional and `null` counts as
//! absent. What is present must have the right type. Keys not listed here are
//! kept as-is.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{StepError, StepName};
use crate::error::FieldErrors;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    Number,
    /// A string id that must parse as a UUID when non-empty
    Id,
    /// One of a fixed set of strings; empty means not chosen yet
    OneOf(&'static [&'static str]),
    Record(&'static [Field]),
    Rows(&'static [Field]),
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    kind: Kind,
}

macro_rules! f {
    ($name:literal, $kind:expr $(,)?) => {
        Field { name: $name, kind: $kind }
    };
}

use Kind::*;

pub const RESULTS: &[&str] = &["PASS", "FAIL", "NA"];
pub const PUNCH_SEVERITIES: &[&str] = &["CRITICAL", "HIGH", "MEDIUM", "LOW"];
pub const PUNCH_STATUSES: &[&str] = &["OPEN", "CLOSED"];

const REGISTER_BLOCK: &[Field] = &[f!("startAddress", Number), f!("registerCount", Number)];

const PRE_CONFIGURATION: &[Field] = &[
    f!(
        "digitalModules",
        Rows(&[f!("rackNo", Text), f!("modulePosition", Text), f!("channelCount", Number)]),
    ),
    f!(
        "analogModules",
        Rows(&[f!("rackNo", Text), f!("modulePosition", Text), f!("defaultRange", Text)]),
    ),
    f!(
        "modbusConfig",
        Record(&[
            f!("digitalCoils", Record(REGISTER_BLOCK)),
            f!("digitalInputs", Record(REGISTER_BLOCK)),
            f!("analogHolding", Record(REGISTER_BLOCK)),
            f!("analogInput", Record(REGISTER_BLOCK)),
        ]),
    ),
];

const DOCUMENT_INFO: &[Field] = &[
    f!("title", Text),
    f!("projectRef", Text),
    f!("documentRef", Text),
    f!("revision", Text),
    f!("date", Text),
    f!("preparedBy", Text),
    f!("tmId", Id),
    f!("pmId", Id),
];

const INTRODUCTION_SCOPE: &[Field] = &[
    f!("introduction", Text),
    f!("scope", Text),
    f!("relatedDocuments", Rows(&[f!("name", Text), f!("reference", Text)])),
];

const PRE_TEST_REQUIREMENTS: &[Field] = &[f!(
    "requirements",
    Rows(&[
        f!("item", Text),
        f!("test", Text),
        f!("method", Text),
        f!("acceptanceCriteria", Text),
    ]),
)];

const ASSET_REGISTER: &[Field] = &[
    f!(
        "keyComponents",
        Rows(&[f!("serialNo", Text), f!("model", Text), f!("description", Text), f!("remarks", Text)]),
    ),
    f!(
        "ipAddresses",
        Rows(&[f!("deviceName", Text), f!("ipAddress", Text), f!("gateway", Text), f!("comments", Text)]),
    ),
];

const SIGNAL_TESTS: &[Field] = &[
    f!(
        "digitalSignals",
        Rows(&[
            f!("serialNo", Text),
            f!("rackNo", Text),
            f!("modulePos", Text),
            f!("signalTag", Text),
            f!("signalDesc", Text),
            f!("result", OneOf(RESULTS)),
            f!("punchItem", Text),
            f!("verifiedBy", Text),
            f!("comment", Text),
        ]),
    ),
    f!(
        "analogSignals",
        Rows(&[
            f!("serialNo", Text),
            f!("rackNo", Text),
            f!("modulePos", Text),
            f!("ioRange", Text),
            f!("signalTag", Text),
            f!("result", OneOf(RESULTS)),
            f!("punchItem", Text),
            f!("verifiedBy", Text),
            f!("comment", Text),
        ]),
    ),
    f!(
        "modbusDigital",
        Rows(&[
            f!("address", Text),
            f!("description", Text),
            f!("tag", Text),
            f!("result", OneOf(RESULTS)),
            f!("punchItem", Text),
            f!("verifiedBy", Text),
            f!("comment", Text),
        ]),
    ),
    f!(
        "modbusAnalog",
        Rows(&[
            f!("address", Text),
            f!("description", Text),
            f!("range", Text),
            f!("tag", Text),
            f!("result", OneOf(RESULTS)),
            f!("punchItem", Text),
            f!("verifiedBy", Text),
            f!("comment", Text),
        ]),
    ),
];

const PROCESS_SCADA_ALARMS: &[Field] = &[
    f!(
        "scadaVerification",
        Rows(&[
            f!("item", Text),
            f!("description", Text),
            f!("result", OneOf(RESULTS)),
            f!("remarks", Text),
        ]),
    ),
    f!(
        "trendsTests",
        Rows(&[
            f!("parameter", Text),
            f!("expectedTrend", Text),
            f!("actualResult", Text),
            f!("result", OneOf(RESULTS)),
            f!("remarks", Text),
        ]),
    ),
    f!(
        "alarmScreenshots",
        Rows(&[f!("id", Text), f!("filename", Text), f!("originalName", Text), f!("description", Text)]),
    ),
];

const TEST_EQUIPMENT_PUNCH: &[Field] = &[
    f!(
        "testEquipment",
        Rows(&[f!("item", Text), f!("model", Text), f!("serialNo", Text), f!("calibrationDue", Text)]),
    ),
    f!(
        "punchList",
        Rows(&[
            f!("itemNo", Text),
            f!("description", Text),
            f!("severity", OneOf(PUNCH_SEVERITIES)),
            f!("assignedTo", Text),
            f!("dueDate", Text),
            f!("status", OneOf(PUNCH_STATUSES)),
        ]),
    ),
];

fn fields_for(step: StepName) -> &'static [Field] {
    match step {
        StepName::PreConfiguration => PRE_CONFIGURATION,
        StepName::DocumentInfo => DOCUMENT_INFO,
        StepName::IntroductionScope => INTRODUCTION_SCOPE,
        StepName::PreTestRequirements => PRE_TEST_REQUIREMENTS,
        StepName::AssetRegister => ASSET_REGISTER,
        StepName::SignalTests => SIGNAL_TESTS,
        StepName::ProcessScadaAlarms => PROCESS_SCADA_ALARMS,
        StepName::TestEquipmentPunch => TEST_EQUIPMENT_PUNCH,
        StepName::ReviewSubmit => &[],
    }
}

/// Check `data` against the step's shape, collecting every mismatch
pub fn validate(step: StepName, data: &Value) -> Result<(), StepError> {
    let mut errors = FieldErrors::new();

    match data.as_object() {
        Some(object) => check_record(fields_for(step), object, "", &mut errors),
        None => {
            errors.insert("data".to_string(), "must be a JSON object".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(StepError::Shape(errors))
    }
}

fn check_record(fields: &[Field], object: &Map<String, Value>, prefix: &str, errors: &mut FieldErrors) {
    for field in fields {
        let Some(value) = object.get(field.name) else { continue };
        if value.is_null() {
            continue;
        }
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        check_value(field.kind, value, &path, errors);
    }
}

fn check_value(kind: Kind, value: &Value, path: &str, errors: &mut FieldErrors) {
    match kind {
        Text => {
            if !value.is_string() {
                errors.insert(path.to_string(), "must be a string".to_string());
            }
        }
        Number => {
            if !value.is_number() {
                errors.insert(path.to_string(), "must be a number".to_string());
            }
        }
        Id => match value.as_str() {
            Some("") => {}
            Some(s) if Uuid::parse_str(s).is_ok() => {}
            _ => {
                errors.insert(path.to_string(), "must be a user id".to_string());
            }
        },
        OneOf(allowed) => match value.as_str() {
            Some("") => {}
            Some(s) if allowed.contains(&s) => {}
            _ => {
                errors.insert(path.to_string(), format!("must be one of {}", allowed.join(", ")));
            }
        },
        Record(fields) => match value.as_object() {
            Some(object) => check_record(fields, object, path, errors),
            None => {
                errors.insert(path.to_string(), "must be an object".to_string());
            }
        },
        Rows(fields) => match value.as_array() {
            Some(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    let row_path = format!("{}[{}]", path, i);
                    match row.as_object() {
                        Some(object) => check_record(fields, object, &row_path, errors),
                        None => {
                            errors.insert(row_path, "must be an object".to_string());
                        }
                    }
                }
            }
            None => {
                errors.insert(path.to_string(), "must be an array".to_string());
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape_errors(step: StepName, data: Value) -> FieldErrors {
        match validate(step, &data) {
            Err(StepError::Shape(errors)) => errors,
            Ok(()) => FieldErrors::new(),
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn partial_drafts_are_accepted() {
        assert!(validate(StepName::DocumentInfo, &json!({ "title": "Draft" })).is_ok());
        assert!(validate(StepName::SignalTests, &json!({})).is_ok());
        assert!(validate(StepName::DocumentInfo, &json!({ "tmId": null, "pmId": "" })).is_ok());
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let data = json!({ "introduction": "<p>x</p>", "attachments": [1, 2, 3] });
        assert!(validate(StepName::IntroductionScope, &data).is_ok());
    }

    #[test]
    fn field_macro_takes_trailing_commas() {
        let field = f!(
            "digitalModules",
            Kind::Rows(&[f!("rackNo", Kind::Text,), f!("channelCount", Kind::Number)]),
        );
        assert_eq!(field.name, "digitalModules");
        assert!(matches!(field.kind, Kind::Rows(rows) if rows.len() == 2));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let errors = shape_errors(StepName::ReviewSubmit, json!(["not", "an", "object"]));
        assert_eq!(errors.get("data").map(String::as_str), Some("must be a JSON object"));
    }

    #[test]
    fn nested_paths_are_reported() {
        let errors = shape_errors(
            StepName::PreConfiguration,
            json!({
                "digitalModules": [
                    { "rackNo": "1", "modulePosition": "1", "channelCount": 16 },
                    { "rackNo": 2, "modulePosition": "3", "channelCount": "sixteen" }
                ],
                "modbusConfig": { "digitalCoils": { "startAddress": "zero" } }
            }),
        );

        assert_eq!(errors.len(), 3);
        assert!(errors.contains_key("digitalModules[1].rackNo"));
        assert!(errors.contains_key("digitalModules[1].channelCount"));
        assert!(errors.contains_key("modbusConfig.digitalCoils.startAddress"));
    }

    #[test]
    fn enums_accept_known_values_or_blank() {
        let ok = json!({ "punchList": [
            { "itemNo": "1", "severity": "HIGH", "status": "OPEN" },
            { "itemNo": "2", "severity": "", "status": "CLOSED" }
        ]});
        assert!(validate(StepName::TestEquipmentPunch, &ok).is_ok());

        let errors = shape_errors(
            StepName::TestEquipmentPunch,
            json!({ "punchList": [{ "severity": "URGENT", "status": "DONE" }] }),
        );
        assert_eq!(errors["punchList[0].severity"], "must be one of CRITICAL, HIGH, MEDIUM, LOW");
        assert_eq!(errors["punchList[0].status"], "must be one of OPEN, CLOSED");
    }

    #[test]
    fn signal_results_are_checked() {
        let errors = shape_errors(
            StepName::SignalTests,
            json!({ "digitalSignals": [{ "signalTag": "DI_1_1_01", "result": "OK" }] }),
        );
        assert!(errors.contains_key("digitalSignals[0].result"));
    }

    #[test]
    fn assignee_ids_must_be_uuids() {
        let errors = shape_errors(StepName::DocumentInfo, json!({ "tmId": "bob" }));
        assert_eq!(errors["tmId"], "must be a user id");
        let id = Uuid::new_v4().to_string();
        assert!(validate(StepName::DocumentInfo, &json!({ "tmId": id })).is_ok());
    }

    #[test]
    fn rows_must_be_arrays_of_objects() {
        let errors = shape_errors(
            StepName::AssetRegister,
            json!({ "keyComponents": "none", "ipAddresses": ["10.0.0.1"] }),
        );
        assert_eq!(errors["keyComponents"], "must be an array");
        assert_eq!(errors["ipAddresses[0]"], "must be an object");
    }
}
