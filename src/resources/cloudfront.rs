use serde::Serialize;
use strum::{Display, EnumString};

use super::*;

/// the only origin methods that make sense in front of a static bucket.
pub const SAFE_METHODS: &[HttpMethod] = &[HttpMethod::Get, HttpMethod::Head, HttpMethod::Options];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Put,
    Post,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessControlConfig {
    pub name: String,
    pub origin_access_control_origin_type: String,
    pub signing_behavior: String,
    pub signing_protocol: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessControl {
    pub origin_access_control_config: OriginAccessControlConfig,
}

impl OriginAccessControl {
    /// always sign origin requests with sigv4 for an s3 origin.
    pub fn for_s3(name: &str) -> Self {
        Self {
            origin_access_control_config: OriginAccessControlConfig {
                name: name.to_string(),
                origin_access_control_origin_type: "s3".into(),
                signing_behavior: "always".into(),
                signing_protocol: "sigv4".into(),
            },
        }
    }
}

impl CfnResource for OriginAccessControl {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::OriginAccessControl"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        let name = &self.origin_access_control_config.name;
        if name.is_empty() || name.len() > 64 {
            return Err(format!("origin access control name {name:?} must be 1 to 64 characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3OriginConfig {
    /// left empty when an origin access control is used instead of
    /// a legacy origin access identity.
    pub origin_access_identity: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub domain_name: StrVal,
    pub id: String,
    pub s3_origin_config: S3OriginConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_access_control_id: Option<StrVal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cookies {
    pub forward: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForwardedValues {
    pub query_string: bool,
    pub cookies: Cookies,
}

impl ForwardedValues {
    pub fn none() -> Self {
        Self {
            query_string: false,
            cookies: Cookies {
                forward: "none".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultCacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: String,
    pub allowed_methods: Vec<HttpMethod>,
    pub cached_methods: Vec<HttpMethod>,
    pub compress: bool,
    pub forwarded_values: ForwardedValues,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_root_object: String,
    pub origins: Vec<Origin>,
    pub default_cache_behavior: DefaultCacheBehavior,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distribution {
    pub distribution_config: DistributionConfig,
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        let config = &self.distribution_config;
        if config.origins.is_empty() {
            return Err("Must provide at least one origin to cloudfront distribution".into());
        }
        for origin in &config.origins {
            if origin.domain_name.is_empty() {
                return Err(format!("cloudfront distribution origin {} domain_name is required", origin.id));
            }
        }
        let behavior = &config.default_cache_behavior;
        if !config.origins.iter().any(|o| o.id == behavior.target_origin_id) {
            return Err(format!(
                "default cache behavior targets unknown origin {:?}",
                behavior.target_origin_id
            ));
        }
        // cloudfront only accepts these three combinations
        let allowed = &behavior.allowed_methods;
        let valid_allowed = allowed.len() == 2 || allowed.len() == 3 || allowed.len() == 7;
        if !valid_allowed {
            return Err(format!("unsupported allowed methods combination {allowed:?}"));
        }
        if let Some(m) = behavior.cached_methods.iter().find(|m| !allowed.contains(m)) {
            return Err(format!("cached method {m} is not an allowed method"));
        }
        Ok(())
    }
}
