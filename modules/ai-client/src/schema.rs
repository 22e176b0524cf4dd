use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types the model is asked to produce via forced tool use.
///
/// Automatically implemented for any type that is `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate the tool `input_schema` for this type.
    ///
    /// The Messages API accepts draft JSON Schema, but extraction is far more
    /// reliable when the schema is strict:
    /// 1. `additionalProperties: false` on every object
    /// 2. every property listed in `required`, nullable ones included
    /// 3. no `$ref` indirection — definitions fully inlined
    fn response_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        tighten_object_schemas(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn tighten_object_schemas(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );

            if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<serde_json::Value> = props
                    .keys()
                    .map(|k| serde_json::Value::String(k.clone()))
                    .collect();
                map.insert("required".to_string(), serde_json::Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            tighten_object_schemas(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            tighten_object_schemas(item);
        }
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = if let serde_json::Value::Object(map) = value {
        map.get("definitions").cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if ref_path.starts_with("#/definitions/") {
                    let type_name = ref_path.trim_start_matches("#/definitions/");
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            // schemars wraps referenced types carrying metadata in a 1-element allOf
            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        label: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outer {
        title: String,
        note: Option<String>,
        items: Vec<Inner>,
    }

    #[test]
    fn objects_are_closed_and_fully_required() {
        let schema = Outer::response_schema();
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));

        let required = schema["required"].as_array().unwrap();
        let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
        assert!(names.contains(&"title"));
        assert!(names.contains(&"note"), "nullable fields must still be required");
        assert!(names.contains(&"items"));
    }

    #[test]
    fn refs_are_inlined() {
        let schema = Outer::response_schema();
        let rendered = schema.to_string();
        assert!(!rendered.contains("$ref"));
        assert!(!rendered.contains("definitions"));
        // The inner object schema must appear inline under items
        assert_eq!(
            schema["properties"]["items"]["items"]["properties"]["label"]["type"],
            serde_json::json!("string")
        );
    }
}
