use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, StackError};
use crate::resources::{collect_references, validate_logical_id, CfnResource, Value};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// what the engine does with a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[serde(rename = "Delete")]
    Destroy,
    Retain,
}

#[derive(Debug)]
pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    pub removal_policy: Option<RemovalPolicy>,
    pub depends_on: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new(name: &str, properties: impl CfnResource + 'static) -> Self {
        Self {
            name: name.to_string(),
            properties: Box::new(properties),
            removal_policy: None,
            depends_on: vec![],
            metadata: BTreeMap::new(),
        }
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none", default)]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none", default)]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty", default)]
    pub depends_on: Vec<String>,
    #[serde(rename = "Metadata", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none", default)]
    pub default: Option<String>,
}

impl TemplateParameter {
    pub fn string(description: &str) -> Self {
        Self {
            ty: "String".into(),
            description: description.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: String::new(),
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    pub fn count_of_type(&self, ty: &str) -> usize {
        self.resources_of_type(ty).count()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        // pretty so the template reads well in the cloudformation console
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A named collection of resources deployed and destroyed as one unit.
#[derive(Debug, Default)]
pub struct Stack {
    pub name: String,
    pub description: String,
    pub resources: Vec<Resource>,
    pub parameters: Vec<(String, TemplateParameter)>,
    pub outputs: Vec<(String, ResourceOutput)>,
}

impl Stack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        debug!(
            logical_id = %resource.name,
            ty = resource.properties.type_string(),
            "declared resource"
        );
        self.resources.push(resource);
    }

    pub fn add_parameter(&mut self, name: &str, parameter: TemplateParameter) {
        self.parameters.push((name.to_string(), parameter));
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) {
        let output = ResourceOutput {
            description: description.to_string(),
            value,
        };
        self.outputs.push((name.to_string(), output));
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == logical_id)
    }

    /// Validates every resource and renders the template the engine consumes.
    /// Fails on invalid or duplicate logical ids, on a resource's own checks,
    /// and on references to ids the template does not declare.
    #[instrument(skip(self), fields(stack = %self.name))]
    pub fn to_template(&self) -> Result<SavedTemplate> {
        validate_stack_name(&self.name)?;
        let mut out_template = SavedTemplate {
            description: self.description.clone(),
            ..Default::default()
        };
        for (name, parameter) in &self.parameters {
            validate_logical_id(name).map_err(|e| StackError::validation(name, e))?;
            out_template.parameters.insert(name.clone(), parameter.clone());
        }
        for resource in &self.resources {
            validate_logical_id(&resource.name).map_err(|e| StackError::validation(&resource.name, e))?;
            if let Err(e) = resource.properties.validate() {
                return Err(StackError::validation(&resource.name, e));
            }
            let saved_resource = SavedResource {
                ty: resource.properties.type_string().to_string(),
                properties: resource.properties.properties()?,
                deletion_policy: resource.removal_policy,
                update_replace_policy: resource.removal_policy,
                depends_on: resource.depends_on.clone(),
                metadata: resource.metadata.clone(),
            };
            let is_new = !out_template.parameters.contains_key(&resource.name)
                && out_template.resources.insert(resource.name.clone(), saved_resource).is_none();
            if !is_new {
                return Err(StackError::validation(&resource.name, "logical id is declared more than once"));
            }
        }
        for (name, output) in &self.outputs {
            validate_logical_id(name).map_err(|e| StackError::validation(name, e))?;
            out_template.outputs.insert(name.clone(), output.clone());
        }
        check_references(&out_template)?;
        debug!(
            resources = out_template.resources.len(),
            outputs = out_template.outputs.len(),
            "rendered template"
        );
        Ok(out_template)
    }
}

fn check_references(template: &SavedTemplate) -> Result<()> {
    let declared = |name: &str| template.resources.contains_key(name) || template.parameters.contains_key(name);
    for (name, resource) in &template.resources {
        let mut refs = vec![];
        collect_references(&resource.properties, &mut refs);
        refs.extend(resource.depends_on.iter().cloned());
        if let Some(missing) = refs.iter().find(|r| !declared(r)) {
            return Err(StackError::validation(name, format!("references undeclared logical id {missing:?}")));
        }
    }
    for (name, output) in &template.outputs {
        let mut refs = vec![];
        collect_references(&output.value, &mut refs);
        if let Some(missing) = refs.iter().find(|r| !declared(r)) {
            return Err(StackError::validation(name, format!("output references undeclared logical id {missing:?}")));
        }
    }
    Ok(())
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || StackError::StackName {
        name: stack_name.to_string(),
        reason: restriction.to_string(),
    };
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{get_ref, iot::Thing, s3_bucket::Bucket};
    use yare::parameterized;

    #[parameterized(
        plain = { "iot-hub-infra", true },
        leading_digit = { "1stack", false },
        underscore = { "iot_hub", false },
        empty = { "", false },
    )]
    fn stack_names(name: &str, ok: bool) {
        assert_eq!(validate_stack_name(name).is_ok(), ok);
    }

    #[test]
    fn too_long_stack_name() {
        let name = format!("a{}", "b".repeat(128));
        assert!(matches!(validate_stack_name(&name), Err(StackError::StackName { .. })));
    }

    #[test]
    fn duplicate_logical_ids_fail() {
        let mut stack = Stack::new("dup");
        stack.add_resource(Resource::new("Thing", Thing { thing_name: "a".into() }));
        stack.add_resource(Resource::new("Thing", Thing { thing_name: "b".into() }));
        let err = stack.to_template().unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn dangling_output_reference_fails() {
        let mut stack = Stack::new("dangling");
        stack.add_resource(Resource::new("Bucket", Bucket::private("some-bucket")));
        stack.add_output("Missing", "points nowhere", get_ref("Nope"));
        let err = stack.to_template().unwrap_err();
        assert!(err.to_string().contains("\"Nope\""), "{err}");
    }

    #[test]
    fn removal_policy_renders_both_policies() {
        let mut stack = Stack::new("removal");
        stack.add_resource(
            Resource::new("Bucket", Bucket::private("some-bucket"))
                .removal_policy(RemovalPolicy::Destroy)
                .metadata("AssetFingerprint", "abc"),
        );
        let template = stack.to_template().unwrap();
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["Resources"]["Bucket"]["DeletionPolicy"], "Delete");
        assert_eq!(json["Resources"]["Bucket"]["UpdateReplacePolicy"], "Delete");
        assert_eq!(json["Resources"]["Bucket"]["Metadata"]["AssetFingerprint"], "abc");
        assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(json.get("Outputs").is_none());
    }

    #[test]
    fn template_round_trips_through_json() {
        let mut stack = Stack::new("roundtrip");
        stack.add_resource(Resource::new("Bucket", Bucket::private("some-bucket")));
        stack.add_output("BucketName", "the bucket", get_ref("Bucket"));
        let template = stack.to_template().unwrap();
        let text = template.to_json_pretty().unwrap();
        let parsed: SavedTemplate = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, template);
    }
}
