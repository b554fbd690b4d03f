//! Security and shape checks over a rendered template. Each check reads the
//! JSON the engine would receive, so a check passes only if the deployed
//! stack would actually have the property, however the stack was declared.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::{ApiMode, StackConfig};
use crate::error::{Result, StackError};
use crate::iot_hub::outputs;
use crate::resources::cloudfront::SAFE_METHODS;
use crate::resources::iot::THING_NAME_CLAIM;
use crate::resources::ssm::{mqtt_parameters, READ_ACTIONS};
use crate::resources::{collect_references, get_att, get_ref, json, render_pattern, Value};
use crate::stack::{RemovalPolicy, SavedTemplate, Stack};

const BUCKET: &str = "AWS::S3::Bucket";
const BUCKET_POLICY: &str = "AWS::S3::BucketPolicy";
const DISTRIBUTION: &str = "AWS::CloudFront::Distribution";
const ACCESS_CONTROL: &str = "AWS::CloudFront::OriginAccessControl";
const FUNCTION: &str = "AWS::Lambda::Function";
const ROLE: &str = "AWS::IAM::Role";
const API_RESOURCE: &str = "AWS::ApiGateway::Resource";
const API_METHOD: &str = "AWS::ApiGateway::Method";
const AUTHORIZER: &str = "AWS::ApiGateway::Authorizer";
const USER_POOL: &str = "AWS::Cognito::UserPool";
const USER_POOL_CLIENT: &str = "AWS::Cognito::UserPoolClient";
const THING: &str = "AWS::IoT::Thing";
const DEVICE_POLICY: &str = "AWS::IoT::Policy";
const POLICY_ATTACHMENT: &str = "AWS::IoT::PolicyPrincipalAttachment";
const THING_ATTACHMENT: &str = "AWS::IoT::ThingPrincipalAttachment";

const EXPECTED_COUNTS: &[(&str, usize)] = &[
    (BUCKET, 1),
    (DISTRIBUTION, 1),
    (ACCESS_CONTROL, 1),
    (FUNCTION, 1),
    (API_RESOURCE, 1),
    (USER_POOL, 1),
    (USER_POOL_CLIENT, 1),
    (THING, 1),
    (DEVICE_POLICY, 1),
    (POLICY_ATTACHMENT, 1),
    (THING_ATTACHMENT, 1),
];

type CheckFn = fn(&SavedTemplate, &StackConfig) -> Result<(), String>;

const CHECKS: &[(&str, CheckFn)] = &[
    ("bucket-policy-scoped", bucket_policy_scoped),
    ("public-access-blocked", public_access_blocked),
    ("delivery-methods-safe", delivery_methods_safe),
    ("delivery-no-forwarding", delivery_no_forwarding),
    ("origin-bound-to-bucket", origin_bound_to_bucket),
    ("function-env-indirect", function_env_indirect),
    ("parameter-grants-match", parameter_grants_match),
    ("token-lifetimes-bounded", token_lifetimes_bounded),
    ("directory-locked-down", directory_locked_down),
    ("device-connect-self-scoped", device_connect_self_scoped),
    ("device-cannot-publish", device_cannot_publish),
    ("resource-counts", resource_counts),
    ("outputs", expected_outputs),
    ("api-matches-profile", api_matches_profile),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub checks: Vec<Check>,
}

impl Report {
    fn record(&mut self, name: &'static str, outcome: Result<(), String>) {
        let (passed, detail) = match outcome {
            Ok(()) => (true, String::new()),
            Err(detail) => {
                warn!(check = name, %detail, "audit check failed");
                (false, detail)
            }
        };
        self.checks.push(Check { name, passed, detail });
    }

    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(StackError::Audit {
            failures: self.failures().map(|c| format!("{}: {}", c.name, c.detail)).collect(),
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            if check.passed {
                writeln!(f, "PASS {}", check.name)?;
            } else {
                writeln!(f, "FAIL {}: {}", check.name, check.detail)?;
            }
        }
        Ok(())
    }
}

/// Renders `stack` and runs every check against the result. A stack that
/// does not render fails with a single `template-renders` check.
#[instrument(skip_all, fields(stack = %stack.name, api_mode = %config.api_mode))]
pub fn audit(stack: &Stack, config: &StackConfig) -> Report {
    match stack.to_template() {
        Ok(template) => audit_template(&template, config),
        Err(e) => {
            let mut report = Report::default();
            report.record("template-renders", Err(e.to_string()));
            report
        }
    }
}

pub fn audit_template(template: &SavedTemplate, config: &StackConfig) -> Report {
    let mut report = Report::default();
    for &(name, check) in CHECKS {
        report.record(name, check(template, config));
    }
    let failed = report.failures().count();
    info!(checks = report.checks.len(), failed, "audit finished");
    report
}

fn single<'a>(template: &'a SavedTemplate, ty: &'a str) -> Result<(&'a str, &'a Value), String> {
    let mut found = template.resources_of_type(ty);
    match (found.next(), found.next()) {
        (Some((id, resource)), None) => Ok((id.as_str(), &resource.properties)),
        _ => Err(format!("expected exactly one {ty}, found {}", template.count_of_type(ty))),
    }
}

fn references(value: &Value) -> Vec<String> {
    let mut out = vec![];
    collect_references(value, &mut out);
    out
}

/// a policy field that may be a single string or a list of strings.
fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => vec![],
    }
}

fn statements(document: &Value) -> impl Iterator<Item = &Value> {
    document["Statement"].as_array().into_iter().flatten()
}

fn bucket_policy_scoped(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (bucket_id, _) = single(template, BUCKET)?;
    let (distribution_id, _) = single(template, DISTRIBUTION)?;
    let (policy_id, policy) = single(template, BUCKET_POLICY)?;
    if policy["Bucket"] != get_ref(bucket_id) {
        return Err(format!("{policy_id} is not attached to {bucket_id}"));
    }
    let all: Vec<&Value> = statements(&policy["PolicyDocument"]).collect();
    let [statement] = all.as_slice() else {
        return Err(format!("expected one statement in {policy_id}, found {}", all.len()));
    };
    if statement["Effect"] != "Allow" || strings(&statement["Action"]) != ["s3:GetObject"] {
        return Err("the only statement must allow s3:GetObject".into());
    }
    if statement["Principal"] != json!({ "Service": "cloudfront.amazonaws.com" }) {
        return Err(format!("principal {} is not the cloudfront service", statement["Principal"]));
    }
    let source = render_pattern(&statement["Condition"]["StringEquals"]["AWS:SourceArn"]);
    let in_cloudfront = source.starts_with("arn:") && source.contains(":cloudfront::");
    if !in_cloudfront || !source.ends_with(&format!(":distribution/${{{distribution_id}}}")) {
        return Err(format!("source condition {source:?} does not name {distribution_id}"));
    }
    Ok(())
}

fn public_access_blocked(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (bucket_id, bucket) = single(template, BUCKET)?;
    let block = &bucket["PublicAccessBlockConfiguration"];
    for key in ["BlockPublicAcls", "BlockPublicPolicy", "IgnorePublicAcls", "RestrictPublicBuckets"] {
        if block[key] != true {
            return Err(format!("{bucket_id} does not set {key}"));
        }
    }
    Ok(())
}

fn cache_behaviors(distribution: &Value) -> Vec<&Value> {
    let config = &distribution["DistributionConfig"];
    let mut out = vec![&config["DefaultCacheBehavior"]];
    out.extend(config["CacheBehaviors"].as_array().into_iter().flatten());
    out
}

fn delivery_methods_safe(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (_, distribution) = single(template, DISTRIBUTION)?;
    let safe: Vec<String> = SAFE_METHODS.iter().map(|m| m.to_string()).collect();
    for behavior in cache_behaviors(distribution) {
        for key in ["AllowedMethods", "CachedMethods"] {
            if let Some(method) = strings(&behavior[key]).into_iter().find(|m| !safe.iter().any(|s| s == m)) {
                return Err(format!("{key} includes {method}"));
            }
        }
    }
    Ok(())
}

fn delivery_no_forwarding(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (_, distribution) = single(template, DISTRIBUTION)?;
    for behavior in cache_behaviors(distribution) {
        let forwarded = &behavior["ForwardedValues"];
        if forwarded.is_null() {
            return Err("cache behavior does not declare forwarded values".into());
        }
        if forwarded["QueryString"] != false {
            return Err("query strings are forwarded to the origin".into());
        }
        if forwarded["Cookies"]["Forward"] != "none" {
            return Err(format!("cookies are forwarded ({})", forwarded["Cookies"]["Forward"]));
        }
    }
    Ok(())
}

fn origin_bound_to_bucket(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (bucket_id, _) = single(template, BUCKET)?;
    let (_, distribution) = single(template, DISTRIBUTION)?;
    let access_controls: Vec<&String> = template.resources_of_type(ACCESS_CONTROL).map(|(id, _)| id).collect();
    let origins = distribution["DistributionConfig"]["Origins"]
        .as_array()
        .ok_or("distribution declares no origins")?;
    for origin in origins {
        if origin["DomainName"] != get_att(bucket_id, "RegionalDomainName") {
            return Err(format!("origin {} is not the regional domain of {bucket_id}", origin["Id"]));
        }
        let signed = references(&origin["OriginAccessControlId"])
            .iter()
            .any(|r| access_controls.contains(&r));
        if !signed {
            return Err(format!("origin {} is not signed by a declared access control", origin["Id"]));
        }
    }
    Ok(())
}

fn function_env_indirect(template: &SavedTemplate, config: &StackConfig) -> Result<(), String> {
    let (function_id, function) = single(template, FUNCTION)?;
    let expected = mqtt_parameters(config.function.secure_parameter_version);
    let vars = function["Environment"]["Variables"]
        .as_object()
        .ok_or_else(|| format!("{function_id} has no environment"))?;
    if vars.len() != expected.len() {
        return Err(format!("expected {} environment variables, found {}", expected.len(), vars.len()));
    }
    for param in &expected {
        match vars.get(&param.env_key).and_then(Value::as_str) {
            Some(value) if value == param.name => {}
            Some(_) => return Err(format!("{} does not hold the parameter path {}", param.env_key, param.name)),
            None => return Err(format!("{} is missing", param.env_key)),
        }
    }
    Ok(())
}

fn parameter_grants_match(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (function_id, function) = single(template, FUNCTION)?;
    let role_ids = references(&function["Role"]);
    let role = role_ids
        .first()
        .and_then(|id| template.resources.get(id))
        .filter(|r| r.ty == ROLE)
        .ok_or_else(|| format!("{function_id} does not run as a role declared here"))?;
    let read: BTreeSet<&str> = function["Environment"]["Variables"]
        .as_object()
        .into_iter()
        .flat_map(|vars| vars.values().filter_map(Value::as_str))
        .collect();

    let mut granted = BTreeSet::new();
    for policy in role.properties["Policies"].as_array().into_iter().flatten() {
        for statement in statements(&policy["PolicyDocument"]) {
            let actions = strings(&statement["Action"]);
            if let Some(action) = actions.iter().find(|a| **a == "*" || (a.starts_with("ssm:") && !READ_ACTIONS.contains(*a))) {
                return Err(format!("{action} is not a parameter read action"));
            }
            if !actions.iter().any(|a| a.starts_with("ssm:")) {
                continue;
            }
            for resource in statement["Resource"].as_array().into_iter().flatten() {
                let pattern = render_pattern(resource);
                match pattern.split_once(":parameter") {
                    Some((_, name)) => granted.insert(name.to_string()),
                    None => return Err(format!("read grant on {pattern} is not a parameter")),
                };
            }
        }
    }
    let granted: BTreeSet<&str> = granted.iter().map(String::as_str).collect();
    if granted != read {
        return Err(format!("grants {granted:?} do not match the parameters read {read:?}"));
    }
    Ok(())
}

fn token_lifetimes_bounded(template: &SavedTemplate, config: &StackConfig) -> Result<(), String> {
    let bound = u64::from(config.identity.token_validity_hours) * 60;
    let (client_id, client) = single(template, USER_POOL_CLIENT)?;
    // cognito's defaults when no unit is given
    let tokens = [
        ("IdTokenValidity", "IdToken", "hours"),
        ("AccessTokenValidity", "AccessToken", "hours"),
        ("RefreshTokenValidity", "RefreshToken", "days"),
    ];
    for (key, unit_key, default_unit) in tokens {
        let value = client[key]
            .as_u64()
            .ok_or_else(|| format!("{client_id} leaves {key} at the service default"))?;
        let unit = client["TokenValidityUnits"][unit_key].as_str().unwrap_or(default_unit);
        let minutes = match unit {
            "seconds" => Some(value.div_ceil(60)),
            "minutes" => Some(value),
            "hours" => value.checked_mul(60),
            "days" => value.checked_mul(24 * 60),
            other => return Err(format!("unknown token validity unit {other:?}")),
        }
        .ok_or_else(|| format!("{key} of {value} {unit} is out of range"))?;
        if minutes > bound {
            return Err(format!("{key} of {minutes} minutes exceeds the {bound} minute bound"));
        }
    }
    Ok(())
}

fn directory_locked_down(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (pool_id, pool) = single(template, USER_POOL)?;
    if pool["AdminCreateUserConfig"]["AllowAdminCreateUserOnly"] != true {
        return Err(format!("{pool_id} allows self sign-up"));
    }
    if pool["MfaConfiguration"] != "ON" {
        return Err(format!("{pool_id} does not require mfa"));
    }
    if template.resources[pool_id].deletion_policy != Some(RemovalPolicy::Destroy) {
        return Err(format!("{pool_id} outlives the stack"));
    }
    Ok(())
}

fn device_connect_self_scoped(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (policy_id, policy) = single(template, DEVICE_POLICY)?;
    let mut connect_grants = 0;
    for statement in statements(&policy["PolicyDocument"]) {
        let actions = strings(&statement["Action"]);
        if !actions.iter().any(|a| matches!(*a, "iot:Connect" | "iot:*" | "*")) {
            continue;
        }
        for resource in strings_or_patterns(&statement["Resource"]) {
            if resource.ends_with("client/*") || resource == "*" || !resource.contains(THING_NAME_CLAIM) {
                return Err(format!("{policy_id} lets a device connect as {resource:?}"));
            }
            connect_grants += 1;
        }
    }
    if connect_grants == 0 {
        return Err(format!("{policy_id} grants no connect permission"));
    }
    Ok(())
}

fn strings_or_patterns(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(render_pattern).collect(),
        other => vec![render_pattern(other)],
    }
}

fn device_cannot_publish(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let (policy_id, policy) = single(template, DEVICE_POLICY)?;
    for statement in statements(&policy["PolicyDocument"]) {
        if let Some(action) = strings(&statement["Action"])
            .into_iter()
            .find(|a| matches!(*a, "iot:Publish" | "iot:RetainPublish" | "iot:*" | "*"))
        {
            return Err(format!("{policy_id} grants {action}"));
        }
    }
    Ok(())
}

fn resource_counts(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let mut wrong = vec![];
    for (ty, expected) in EXPECTED_COUNTS {
        let found = template.count_of_type(ty);
        if found != *expected {
            wrong.push(format!("{ty}: {found}"));
        }
    }
    let integrated = integrated_methods(template).count();
    if integrated != 1 {
        wrong.push(format!("integrated methods: {integrated}"));
    }
    if !wrong.is_empty() {
        return Err(format!("unexpected counts ({})", wrong.join(", ")));
    }
    // one credential, bound to both the thing and its policy
    let (_, policy_attachment) = single(template, POLICY_ATTACHMENT)?;
    let (_, thing_attachment) = single(template, THING_ATTACHMENT)?;
    if policy_attachment["Principal"] != thing_attachment["Principal"] {
        return Err("thing and policy are attached to different credentials".into());
    }
    Ok(())
}

fn expected_outputs(template: &SavedTemplate, _: &StackConfig) -> Result<(), String> {
    let found: BTreeSet<&str> = template.outputs.keys().map(String::as_str).collect();
    let expected: BTreeSet<&str> = outputs::ALL.iter().copied().collect();
    if found != expected {
        return Err(format!("outputs {found:?}, expected {expected:?}"));
    }
    Ok(())
}

fn integrated_methods(template: &SavedTemplate) -> impl Iterator<Item = (&String, &Value)> {
    template
        .resources_of_type(API_METHOD)
        .filter(|(_, m)| m.properties["Integration"]["Type"] == "AWS_PROXY")
        .map(|(id, m)| (id, &m.properties))
}

fn api_matches_profile(template: &SavedTemplate, config: &StackConfig) -> Result<(), String> {
    let (function_id, _) = single(template, FUNCTION)?;
    let (pool_id, _) = single(template, USER_POOL)?;
    for (method_id, method) in integrated_methods(template) {
        let targets: Vec<String> = references(&method["Integration"]["Uri"])
            .into_iter()
            .filter(|r| template.resources.get(r).is_some_and(|res| res.ty == FUNCTION))
            .collect();
        if targets != [function_id] {
            return Err(format!("{method_id} integrates {targets:?} instead of {function_id}"));
        }
        let authorization = &method["AuthorizationType"];
        match config.api_mode {
            ApiMode::Public => {
                if authorization != "NONE" {
                    return Err(format!("{method_id} uses {authorization} on a public api"));
                }
            }
            ApiMode::Authenticated => {
                if authorization != "COGNITO_USER_POOLS" {
                    return Err(format!("{method_id} is not guarded by the user pool"));
                }
                let authorizer = references(&method["AuthorizerId"])
                    .first()
                    .and_then(|id| template.resources.get(id))
                    .filter(|r| r.ty == AUTHORIZER)
                    .ok_or_else(|| format!("{method_id} names no declared authorizer"))?;
                if !references(&authorizer.properties["ProviderARNs"]).iter().any(|r| r == pool_id) {
                    return Err(format!("{method_id} accepts tokens from a pool other than {pool_id}"));
                }
            }
        }
    }
    if config.api_mode == ApiMode::Public && template.count_of_type(AUTHORIZER) > 0 {
        return Err("public api declares an authorizer".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot_hub::logical_ids as ids;
    use crate::iot_hub::IotHubStack;
    use yare::parameterized;

    fn rendered(mode: ApiMode) -> (SavedTemplate, StackConfig) {
        let config = StackConfig::for_profile(mode);
        let template = IotHubStack::new(&config).build().unwrap().to_template().unwrap();
        (template, config)
    }

    fn props<'a>(template: &'a mut SavedTemplate, id: &str) -> &'a mut Value {
        &mut template.resources.get_mut(id).unwrap().properties
    }

    #[parameterized(
        public = { ApiMode::Public },
        authenticated = { ApiMode::Authenticated },
    )]
    fn declared_stack_passes(mode: ApiMode) {
        let config = StackConfig::for_profile(mode);
        let stack = IotHubStack::new(&config).build().unwrap();
        let report = audit(&stack, &config);
        assert!(report.is_ok(), "{report}");
        assert_eq!(report.checks.len(), CHECKS.len());
    }

    #[parameterized(
        widened_principal = { |t: &mut SavedTemplate| {
            props(t, ids::BUCKET_POLICY)["PolicyDocument"]["Statement"][0]["Principal"] = json!({ "AWS": "*" });
        }, "bucket-policy-scoped" },
        foreign_distribution = { |t: &mut SavedTemplate| {
            props(t, ids::BUCKET_POLICY)["PolicyDocument"]["Statement"][0]["Condition"]["StringEquals"]["AWS:SourceArn"] =
                json!("arn:aws:cloudfront::123456789012:distribution/E2QWRUHEXAMPLE");
        }, "bucket-policy-scoped" },
        public_acls = { |t: &mut SavedTemplate| {
            props(t, ids::BUCKET)["PublicAccessBlockConfiguration"]["BlockPublicAcls"] = json!(false);
        }, "public-access-blocked" },
        post_allowed = { |t: &mut SavedTemplate| {
            props(t, ids::DISTRIBUTION)["DistributionConfig"]["DefaultCacheBehavior"]["AllowedMethods"]
                .as_array_mut().unwrap().push(json!("POST"));
        }, "delivery-methods-safe" },
        cookies_forwarded = { |t: &mut SavedTemplate| {
            props(t, ids::DISTRIBUTION)["DistributionConfig"]["DefaultCacheBehavior"]["ForwardedValues"]["Cookies"]["Forward"] = json!("all");
        }, "delivery-no-forwarding" },
        literal_secret = { |t: &mut SavedTemplate| {
            props(t, ids::FUNCTION)["Environment"]["Variables"]["MQTT_PASSWORD_SSM"] = json!("hunter2");
        }, "function-env-indirect" },
        extra_grant = { |t: &mut SavedTemplate| {
            props(t, ids::FUNCTION_ROLE)["Policies"][0]["PolicyDocument"]["Statement"][0]["Resource"]
                .as_array_mut().unwrap()
                .push(json!("arn:aws:ssm:eu-central-1:123456789012:parameter/iot/other"));
        }, "parameter-grants-match" },
        write_grant = { |t: &mut SavedTemplate| {
            props(t, ids::FUNCTION_ROLE)["Policies"][0]["PolicyDocument"]["Statement"][0]["Action"]
                .as_array_mut().unwrap().push(json!("ssm:PutParameter"));
        }, "parameter-grants-match" },
        source_outside_cloudfront = { |t: &mut SavedTemplate| {
            props(t, ids::BUCKET_POLICY)["PolicyDocument"]["Statement"][0]["Condition"]["StringEquals"]["AWS:SourceArn"] =
                json!({ "Fn::Sub": "arn:aws:s3:::x:distribution/${WebsiteDistribution}" });
        }, "bucket-policy-scoped" },
        long_refresh = { |t: &mut SavedTemplate| {
            props(t, ids::USER_POOL_CLIENT)["RefreshTokenValidity"] = json!(600);
        }, "token-lifetimes-bounded" },
        self_signup = { |t: &mut SavedTemplate| {
            props(t, ids::USER_POOL)["AdminCreateUserConfig"]["AllowAdminCreateUserOnly"] = json!(false);
        }, "directory-locked-down" },
        wildcard_client = { |t: &mut SavedTemplate| {
            props(t, ids::DEVICE_POLICY)["PolicyDocument"]["Statement"][0]["Resource"] =
                json!(["arn:aws:iot:eu-central-1:123456789012:client/*"]);
        }, "device-connect-self-scoped" },
        publish = { |t: &mut SavedTemplate| {
            props(t, ids::DEVICE_POLICY)["PolicyDocument"]["Statement"][1]["Action"]
                .as_array_mut().unwrap().push(json!("iot:Publish"));
        }, "device-cannot-publish" },
        second_thing = { |t: &mut SavedTemplate| {
            let thing = t.resources[ids::THING].clone();
            t.resources.insert("EspThing2".into(), thing);
        }, "resource-counts" },
        extra_output = { |t: &mut SavedTemplate| {
            let output = t.outputs[outputs::API_URL].clone();
            t.outputs.insert("Debug".into(), output);
        }, "outputs" },
        unguarded_method = { |t: &mut SavedTemplate| {
            let method = props(t, ids::API_METHOD);
            method["AuthorizationType"] = json!("NONE");
            method.as_object_mut().unwrap().remove("AuthorizerId");
        }, "api-matches-profile" },
    )]
    fn tampered_template_fails(tamper: fn(&mut SavedTemplate), check: &str) {
        let (mut template, config) = rendered(ApiMode::Authenticated);
        tamper(&mut template);
        let report = audit_template(&template, &config);
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        assert!(failed.contains(&check), "expected {check} to fail, failures: {failed:?}");
    }

    #[test]
    fn authorizer_on_public_api_fails() {
        let (authenticated, _) = rendered(ApiMode::Authenticated);
        let (mut template, config) = rendered(ApiMode::Public);
        let authorizer = authenticated.resources[ids::AUTHORIZER].clone();
        template.resources.insert(ids::AUTHORIZER.into(), authorizer);
        let report = audit_template(&template, &config);
        assert!(!report.check("api-matches-profile").unwrap().passed);
    }

    #[test]
    fn token_units_are_normalized() {
        let (mut template, mut config) = rendered(ApiMode::Public);
        config.identity.token_validity_hours = 24;
        let client = props(&mut template, ids::USER_POOL_CLIENT);
        client["TokenValidityUnits"]["RefreshToken"] = json!("days");
        client["RefreshTokenValidity"] = json!(1);
        assert!(token_lifetimes_bounded(&template, &config).is_ok());
        props(&mut template, ids::USER_POOL_CLIENT)["RefreshTokenValidity"] = json!(2);
        assert!(token_lifetimes_bounded(&template, &config).is_err());
    }

    #[parameterized(
        hours = { "hours" },
        days = { "days" },
    )]
    fn huge_token_lifetime_fails_without_overflow(unit: &str) {
        let (mut template, config) = rendered(ApiMode::Public);
        let client = props(&mut template, ids::USER_POOL_CLIENT);
        client["TokenValidityUnits"]["IdToken"] = json!(unit);
        client["IdTokenValidity"] = json!(u64::MAX);
        let err = token_lifetimes_bounded(&template, &config).unwrap_err();
        assert!(err.contains("out of range"), "{err}");
    }

    #[test]
    fn failures_become_an_audit_error() {
        let (mut template, config) = rendered(ApiMode::Public);
        props(&mut template, ids::USER_POOL)["MfaConfiguration"] = json!("OPTIONAL");
        let err = audit_template(&template, &config).into_result().unwrap_err();
        match err {
            StackError::Audit { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("directory-locked-down: "), "{failures:?}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unrenderable_stack_is_a_single_failure() {
        let config = StackConfig::default();
        let mut stack = IotHubStack::new(&config).build().unwrap();
        stack.name = "not valid".into();
        let report = audit(&stack, &config);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, "template-renders");
        assert!(!report.is_ok());
    }
}
