use std::collections::BTreeMap;

use serde::Serialize;

use super::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Code {
    pub s3_bucket: StrVal,
    pub s3_key: StrVal,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Environment {
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Function {
    pub runtime: String,
    pub handler: String,
    pub code: Code,
    pub role: StrVal,
    pub memory_size: u32,
    pub timeout: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

impl Function {
    /// a custom-runtime function whose artifact ships a `bootstrap` executable.
    pub fn provided(code: Code, role: StrVal) -> Self {
        Self {
            runtime: "provided.al2".into(),
            handler: "bootstrap".into(),
            code,
            role,
            memory_size: 128,
            timeout: 30,
            description: String::new(),
            environment: None,
        }
    }

    pub fn env_var(&mut self, key: &str, value: &str) {
        let env = self.environment.get_or_insert_with(Default::default);
        env.variables.insert(key.to_string(), value.to_string());
    }
}

impl CfnResource for Function {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if !(128..=10240).contains(&self.memory_size) {
            return Err(format!("memory size {} must be between 128 and 10240 MB", self.memory_size));
        }
        if !(1..=900).contains(&self.timeout) {
            return Err(format!("timeout {} must be between 1 and 900 seconds", self.timeout));
        }
        if let Some(env) = &self.environment {
            for key in env.variables.keys() {
                let valid = key.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
                    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(format!("invalid environment variable name {key:?}"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Permission {
    pub action: String,
    pub function_name: StrVal,
    pub principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_arn: Option<StrVal>,
}

impl Permission {
    pub fn invoke(function_name: StrVal, principal: &str, source_arn: StrVal) -> Self {
        Self {
            action: "lambda:InvokeFunction".into(),
            function_name,
            principal: principal.to_string(),
            source_arn: Some(source_arn),
        }
    }
}

impl CfnResource for Permission {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Permission"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
}
