use serde::Serialize;

use super::iam::PolicyDocument;
use super::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    /// physical name of the bucket. Must be globally unique.
    /// leave empty to let cloudformation generate one.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_block_configuration: Option<PublicAccessBlockConfiguration>,
}

impl Bucket {
    pub fn private(bucket_name: &str) -> Self {
        Self {
            bucket_name: bucket_name.to_string(),
            public_access_block_configuration: Some(PublicAccessBlockConfiguration::block_all()),
        }
    }
}

/// bucket naming rules from
/// https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
pub fn validate_bucket_name(bucket_name: &str) -> Result<(), String> {
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return Err(format!("Invalid bucket name {bucket_name:?}\nMust be between 3 and 63 characters"));
    }
    let valid_char_check = |c: char| -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
    };
    if !bucket_name.chars().all(valid_char_check) {
        return Err(format!(
            "Invalid bucket name {bucket_name:?}\nMay only contain lowercase letters, numbers, dots, and dashes"
        ));
    }
    let first_char = bucket_name.chars().next();
    let last_char = bucket_name.chars().last();
    let edge_ok = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !edge_ok(first_char) || !edge_ok(last_char) {
        return Err(format!(
            "Invalid bucket name {bucket_name:?}\nFirst and last character mut be either lowercase letter, or number"
        ));
    }
    if bucket_name.contains("..") {
        return Err(format!("Invalid bucket name {bucket_name:?}\nMay not contain two consecutive dots"));
    }
    Ok(())
}

impl CfnResource for Bucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.bucket_name.is_empty() {
            return Ok(());
        }
        validate_bucket_name(&self.bucket_name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub bucket: StrVal,
    pub policy_document: PolicyDocument,
}

impl CfnResource for BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("bucket policy must reference a bucket".into());
        }
        self.policy_document.validate()
    }
}

/// objects matching `pattern` in the bucket with the given logical id.
pub fn arn_for_objects(bucket_logical_id: &str, pattern: &str) -> StrVal {
    sub(format!("${{{bucket_logical_id}.Arn}}/{pattern}")).into()
}
