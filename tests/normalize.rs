use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tabledesk::alter::{AlterationRequest, Patch, RequestShape, normalize};

/// One semantic column change, renderable in every accepted request shape.
#[derive(Debug, Clone)]
struct Change {
    attnum: i16,
    type_name: Option<String>,
    type_options: Option<Value>,
    nullable: Option<bool>,
    name: Option<String>,
    default: Patch<Value>,
    delete: Option<bool>,
    description: Patch<String>,
}

fn insert_patch(object: &mut Map<String, Value>, key: &str, patch: &Patch<Value>) {
    match patch {
        Patch::Unset => {}
        Patch::Clear => {
            object.insert(key.to_string(), Value::Null);
        }
        Patch::Set(value) => {
            object.insert(key.to_string(), json!({"value": value, "is_dynamic": false}));
        }
    }
}

impl Change {
    fn common(&self, object: &mut Map<String, Value>) {
        if let Some(nullable) = self.nullable {
            object.insert("nullable".into(), json!(nullable));
        }
        if let Some(name) = &self.name {
            object.insert("name".into(), json!(name));
        }
        if let Some(delete) = self.delete {
            object.insert("delete".into(), json!(delete));
        }
        match &self.description {
            Patch::Unset => {}
            Patch::Clear => {
                object.insert("description".into(), Value::Null);
            }
            Patch::Set(text) => {
                object.insert("description".into(), json!(text));
            }
        }
    }

    fn sibling_type(&self, object: &mut Map<String, Value>) {
        if let Some(type_name) = &self.type_name {
            object.insert("type".into(), json!(type_name));
        }
        if let Some(options) = &self.type_options {
            object.insert("type_options".into(), options.clone());
        }
    }

    fn default_dict_shape(&self) -> Value {
        let mut object = Map::new();
        object.insert("attnum".into(), json!(self.attnum));
        self.common(&mut object);
        self.sibling_type(&mut object);
        if self.default.is_unset() {
            // The wrapper key selects this shape, so an empty wrapper stands
            // in for "no default change".
            object.insert("column_default_dict".into(), json!({"is_dynamic": false}));
        } else {
            insert_patch(&mut object, "column_default_dict", &self.default);
        }
        Value::Object(object)
    }

    fn nested_type_shape(&self) -> Value {
        let mut object = Map::new();
        object.insert("attnum".into(), json!(self.attnum));
        self.common(&mut object);
        object.insert(
            "type".into(),
            json!({"name": self.type_name, "options": self.type_options}),
        );
        insert_patch(&mut object, "default", &self.default);
        Value::Object(object)
    }

    fn current_shape(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), json!(self.attnum));
        self.common(&mut object);
        self.sibling_type(&mut object);
        insert_patch(&mut object, "default", &self.default);
        Value::Object(object)
    }
}

fn patch_strategy<T: std::fmt::Debug + Clone + 'static>(
    value: impl Strategy<Value = T> + 'static,
) -> impl Strategy<Value = Patch<T>> {
    prop_oneof![
        Just(Patch::Unset),
        Just(Patch::Clear),
        value.prop_map(Patch::Set),
    ]
}

fn change_strategy() -> impl Strategy<Value = Change> {
    let type_options = prop_oneof![
        Just(json!({})),
        (1u32..20).prop_map(|length| json!({"length": length})),
        (1u32..38, 0u32..10).prop_map(|(precision, scale)| json!({"precision": precision, "scale": scale})),
    ];
    let default_value = prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z ]{0,8}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
    ];
    (
        1i16..200,
        proptest::option::of(prop_oneof![
            Just(String::new()),
            Just("text".to_string()),
            Just("numeric".to_string()),
            Just("timestamp without time zone".to_string()),
        ]),
        proptest::option::of(type_options),
        proptest::option::of(any::<bool>()),
        proptest::option::of("[ ]{0,2}[a-z_]{0,10}[ ]{0,2}"),
        patch_strategy(default_value),
        proptest::option::of(any::<bool>()),
        patch_strategy("[a-zA-Z ]{0,12}"),
    )
        .prop_map(
            |(attnum, type_name, type_options, nullable, name, default, delete, description)| {
                Change {
                    attnum,
                    type_name,
                    type_options,
                    nullable,
                    name,
                    default,
                    delete,
                    description,
                }
            },
        )
}

proptest! {
    #[test]
    fn all_shapes_normalize_identically(change in change_strategy()) {
        let shapes = [
            (RequestShape::DefaultDict, change.default_dict_shape()),
            (RequestShape::NestedType, change.nested_type_shape()),
            (RequestShape::Current, change.current_shape()),
        ];
        let mut results = Vec::new();
        for (expected, request) in shapes {
            let Value::Object(object) = &request else { unreachable!() };
            prop_assert_eq!(RequestShape::detect(object), expected);
            results.push(normalize(request, None).expect("normalizes"));
        }
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[1], &results[2]);
        prop_assert_eq!(results[0].to_json(), results[2].to_json());
    }

    #[test]
    fn description_presence_survives_normalization(change in change_strategy()) {
        let alteration = normalize(change.current_shape(), None).expect("normalizes");
        let json = alteration.to_json();
        match &change.description {
            Patch::Unset => prop_assert!(json.get("description").is_none()),
            Patch::Clear => prop_assert_eq!(json.get("description").cloned(), Some(Value::Null)),
            Patch::Set(text) => prop_assert_eq!(json.get("description").cloned(), Some(json!(text))),
        }
    }
}

#[test]
fn legacy_request_produces_canonical_descriptor() {
    let alteration = normalize(
        json!({
            "type": "numeric",
            "type_options": {"precision": 5, "scale": 2},
            "column_default_dict": {"is_dynamic": false, "value": 1.5},
            "nullable": true,
            "name": " price ",
            "description": null
        }),
        Some(4),
    )
    .expect("normalizes");

    assert_eq!(
        alteration.to_json(),
        json!({
            "attnum": 4,
            "type": {"name": "numeric", "options": {"precision": 5, "scale": 2}},
            "not_null": false,
            "name": "price",
            "default": 1.5,
            "description": null
        })
    );
    assert_eq!(alteration.requested_type(), Some("numeric"));
    assert!(alteration.sets_default());
}

#[test]
fn default_wrapper_null_clears_and_absence_leaves_alone() {
    let cleared = normalize(json!({"id": 2, "default": null}), None).unwrap();
    assert_eq!(cleared.to_json(), json!({"attnum": 2, "default": null}));

    let untouched = normalize(json!({"id": 2}), None).unwrap();
    assert_eq!(untouched.to_json(), json!({"attnum": 2}));

    let set = normalize(json!({"id": 2, "default": {"value": "n/a"}}), None).unwrap();
    assert_eq!(set.to_json(), json!({"attnum": 2, "default": "n/a"}));
}

#[test]
fn options_without_a_type_name_are_kept() {
    let alteration = normalize(
        json!({"attnum": 1, "type": {"options": {"length": 8}}}),
        None,
    )
    .unwrap();
    assert_eq!(
        alteration.to_json(),
        json!({"attnum": 1, "type": {"options": {"length": 8}}})
    );
}

#[test]
fn parsed_request_exposes_shape_neutral_fields() {
    let request = AlterationRequest::from_value(json!({
        "id": 3,
        "type": "text",
        "default": {"value": null}
    }))
    .unwrap();
    assert_eq!(request.id, Some(3));
    assert_eq!(request.attnum, None);
    assert_eq!(request.type_name.as_deref(), Some("text"));
    assert_eq!(request.default, Patch::Clear);
}
