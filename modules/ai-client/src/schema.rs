use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types that can be requested as Claude tool input.
///
/// Implemented for anything that is `JsonSchema + DeserializeOwned`. The
/// generated schema is self-contained: `$ref`s are inlined and the
/// `definitions` / `$schema` keys are dropped, since tool input schemas are
/// validated standalone.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn tool_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = value.get("definitions").cloned();
        if let Some(defs) = definitions {
            inline_refs(&mut value, &defs);
        }

        if let Value::Object(map) = &mut value {
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

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref") {
                let def = ref_path
                    .strip_prefix("#/definitions/")
                    .and_then(|name| definitions.get(name))
                    .cloned();
                if let Some(def) = def {
                    *value = def;
                    inline_refs(value, definitions);
                    return;
                }
            }

            // schemars wraps described refs as a single-element allOf.
            if let Some(Value::Array(all_of)) = map.get("allOf") {
                if let [only] = all_of.as_slice() {
                    *value = only.clone();
                    inline_refs(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}
