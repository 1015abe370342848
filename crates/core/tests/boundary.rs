use std::sync::Arc;

use itemql_core::item::validate::{validate_alias, validate_property_name, validate_type_name};
use itemql_core::{ConfigError, ItemId, QueryConfig, TypeMap, TypeProvider, ValidationError};

#[test]
fn guid_forms_resolve_through_a_shared_provider() {
    let id = ItemId::parse("{4f1ac04a-2b48-4143-83e8-bfb2e2f6de86}").unwrap();
    let provider: Arc<dyn TypeProvider> = Arc::new(
        [("Part", id.clone()), ("Part BOM", ItemId::new())]
            .into_iter()
            .collect::<TypeMap>(),
    );

    let shared = Arc::clone(&provider);
    let handle = std::thread::spawn(move || shared.type_id("part"));
    assert_eq!(handle.join().unwrap(), Some(id.clone()));
    assert_eq!(provider.type_id("PART"), Some(id));
    assert_eq!(provider.type_id("Document"), None);
}

#[test]
fn ids_serialize_as_plain_strings() {
    let id: ItemId = "4F1AC04A2B48414383E8BFB2E2F6DE86".parse().unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"4F1AC04A2B48414383E8BFB2E2F6DE86\"");
    let back: ItemId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn identifiers_are_shape_checked() {
    assert!(validate_type_name("Part BOM").is_ok());
    assert!(validate_property_name("item_number").is_ok());
    assert!(validate_alias("_bom2").is_ok());
    assert_eq!(
        validate_alias("2bom"),
        Err(ValidationError::InvalidAlias("2bom".into()))
    );
}

#[test]
fn config_from_lookup_and_json() {
    let config = QueryConfig::from_lookup(|key| match key {
        "ITEMQL_DEFAULT_ACTION" => Some("edit".into()),
        "ITEMQL_PRETTY" => Some("yes".into()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.default_action, "edit");
    assert!(config.pretty);
    assert!(config.qualify_properties);

    let err = QueryConfig::from_lookup(|key| {
        (key == "ITEMQL_QUALIFY_PROPERTIES").then(|| "maybe".to_string())
    })
    .unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidValue {
            var: "ITEMQL_QUALIFY_PROPERTIES",
            value: "maybe".into()
        }
    );

    let partial: QueryConfig = serde_json::from_str(r#"{"pretty": true}"#).unwrap();
    assert_eq!(
        partial,
        QueryConfig {
            pretty: true,
            ..QueryConfig::default()
        }
    );
}
