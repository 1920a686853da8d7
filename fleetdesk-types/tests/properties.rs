//! Property-based tests for identifiers and resource names.

use fleetdesk_types::{ChangeEvent, RecordId, ResourceType};
use proptest::prelude::*;
use serde_json::json;

fn table_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z_]{1,24}").unwrap()
}

proptest! {
    /// Every table name parses to a resource that renders back to the same name.
    #[test]
    fn resource_name_roundtrip(name in table_name()) {
        let resource = ResourceType::parse(&name);
        prop_assert_eq!(resource.as_str(), name.as_str());
        prop_assert_eq!(ResourceType::parse(resource.as_str()), resource.clone());

        let encoded = serde_json::to_value(&resource).unwrap();
        prop_assert_eq!(&encoded, &json!(name));
        let decoded: ResourceType = serde_json::from_value(encoded).unwrap();
        prop_assert_eq!(decoded, resource);
    }

    /// A numeric id and its decimal string form name the same row.
    #[test]
    fn numeric_and_string_ids_agree(id in any::<u64>()) {
        let from_number = RecordId::from_json(&json!(id));
        let from_string = RecordId::from_json(&json!(id.to_string()));
        prop_assert_eq!(from_number.clone(), from_string);
        let from_number = from_number.unwrap();
        prop_assert_eq!(from_number.as_str(), id.to_string());
    }

    /// Non-empty string ids are kept verbatim.
    #[test]
    fn string_ids_are_verbatim(id in "[A-Za-z0-9-]{1,36}") {
        let record_id = RecordId::from_json(&json!(id));
        prop_assert_eq!(record_id, Some(RecordId::new(id)));
    }

    /// The row identity of an event does not depend on how the payload encoded its id.
    #[test]
    fn event_record_id_ignores_encoding(id in any::<u32>(), name in table_name()) {
        let resource = ResourceType::parse(&name);
        let numeric = ChangeEvent::insert(
            resource.clone(),
            json!({"id": id}).as_object().cloned().unwrap(),
        );
        let textual = ChangeEvent::delete(
            resource,
            json!({"id": id.to_string()}).as_object().cloned().unwrap(),
        );
        prop_assert_eq!(numeric.record_id(), textual.record_id());
    }
}

#[test]
fn empty_and_structured_ids_are_rejected() {
    assert_eq!(RecordId::from_json(&json!("")), None);
    assert_eq!(RecordId::from_json(&json!(null)), None);
    assert_eq!(RecordId::from_json(&json!({"id": 1})), None);
}
