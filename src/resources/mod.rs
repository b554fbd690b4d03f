use serde::Serialize;
pub use serde_json::{json, Value};

pub mod api_gateway;
pub mod cloudfront;
pub mod cognito;
pub mod iam;
pub mod iot;
pub mod lambda;
pub mod s3_bucket;
pub mod ssm;

pub use cloudfront::HttpMethod;

/// A single CloudFormation resource declaration. `properties` is the
/// `Properties` block exactly as the provisioning engine receives it.
pub trait CfnResource: std::fmt::Debug {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> serde_json::Result<Value>;
    /// local checks that can be made before the template is handed off.
    /// the provider will still reject anything we don't catch here.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// serializes a resource struct into a properties block.
/// optional fields are expected to use `skip_serializing_if`.
pub fn to_properties<T: Serialize>(resource: &T) -> serde_json::Result<Value> {
    serde_json::to_value(resource)
}

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Sub": template }`. literal `${` must be written as `${!`.
pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

pub fn join(parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": ["", parts] })
}

/// a string value that is either known at synth time, or resolved by
/// the engine through an intrinsic function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StrVal {
    Str(String),
    Val(Value),
}

impl Default for StrVal {
    fn default() -> Self {
        StrVal::Str(String::new())
    }
}

impl StrVal {
    pub fn is_empty(&self) -> bool {
        match self {
            StrVal::Str(s) => s.is_empty(),
            StrVal::Val(v) => v.is_null(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StrVal::Str(s) => Some(s),
            StrVal::Val(_) => None,
        }
    }
}

impl From<&str> for StrVal {
    fn from(value: &str) -> Self {
        StrVal::Str(value.to_string())
    }
}

impl From<String> for StrVal {
    fn from(value: String) -> Self {
        StrVal::Str(value)
    }
}

impl From<Value> for StrVal {
    fn from(value: Value) -> Self {
        StrVal::Val(value)
    }
}

/// Renders a value containing intrinsics as a flat pattern string:
/// `Ref` becomes `${Name}`, `Fn::GetAtt` becomes `${Name.Attr}`, joins are
/// concatenated and `Fn::Sub` escapes are undone. Used to inspect ARNs
/// whose account/region parts are only known to the engine.
pub fn render_pattern(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("Ref") {
                return format!("${{{name}}}");
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                let parts: Vec<String> = parts.iter().map(render_pattern).collect();
                return format!("${{{}}}", parts.join("."));
            }
            if let Some(Value::String(template)) = map.get("Fn::Sub") {
                return template.replace("${!", "${");
            }
            if let Some(Value::Array(args)) = map.get("Fn::Join") {
                if let [Value::String(sep), Value::Array(parts)] = args.as_slice() {
                    let parts: Vec<String> = parts.iter().map(render_pattern).collect();
                    return parts.join(sep);
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

/// Every logical id referenced by `Ref`, `Fn::GetAtt` or a `Fn::Sub`
/// placeholder anywhere inside `value`. Pseudo parameters (`AWS::*`) are
/// skipped.
pub fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Value::Object(map) => {
            for (key, inner) in map {
                match (key.as_str(), inner) {
                    ("Ref", Value::String(name)) => push_reference(name, out),
                    ("Fn::GetAtt", Value::Array(parts)) => {
                        if let Some(Value::String(name)) = parts.first() {
                            push_reference(name, out);
                        }
                    }
                    ("Fn::Sub", Value::String(template)) => {
                        for name in sub_placeholders(template) {
                            push_reference(&name, out);
                        }
                    }
                    _ => collect_references(inner, out),
                }
            }
        }
        _ => {}
    }
}

fn push_reference(name: &str, out: &mut Vec<String>) {
    if name.starts_with("AWS::") {
        return;
    }
    let name = name.split('.').next().unwrap_or(name);
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn sub_placeholders(template: &str) -> Vec<String> {
    let mut out = vec![];
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') {
            out.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    out
}

/// returns an error when a logical id breaks CloudFormation's rules.
pub fn validate_logical_id(logical_id: &str) -> Result<(), String> {
    if logical_id.is_empty() {
        return Err(format!("Invalid resource name {logical_id:?}\nMust contain at least 1 character"));
    }
    if logical_id.len() > 255 {
        return Err(format!("Invalid resource name {logical_id:?}\nmust be less than 255 characters"));
    }
    if !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!(
            "Invalid resource name {logical_id:?}\nMust contain only alphanumeric characters [A-Za-z0-9]"
        ));
    }
    Ok(())
}
