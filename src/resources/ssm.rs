//! References to externally managed parameters. Nothing here creates a
//! parameter: the values are written out of band and only their names are
//! handed to the function, which resolves them at invocation time.

use serde::{Deserialize, Serialize};

use super::*;

/// read-only actions granted on a referenced parameter.
pub const READ_ACTIONS: &[&str] = &[
    "ssm:DescribeParameters",
    "ssm:GetParameters",
    "ssm:GetParameter",
    "ssm:GetParameterHistory",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    Plain,
    /// pinned to one version. Rotating the value requires bumping the
    /// version and redeploying.
    Secure { version: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRef {
    /// the environment variable the function reads the name from.
    pub env_key: String,
    /// path-like parameter name, always starting with `/`.
    pub name: String,
    pub kind: ParameterKind,
}

impl ParameterRef {
    pub fn plain(env_key: &str, name: &str) -> Self {
        Self {
            env_key: env_key.to_string(),
            name: name.to_string(),
            kind: ParameterKind::Plain,
        }
    }

    pub fn secure(env_key: &str, name: &str, version: u32) -> Self {
        Self {
            env_key: env_key.to_string(),
            name: name.to_string(),
            kind: ParameterKind::Secure { version },
        }
    }

    /// the name with its version selector, as passed to `get-parameter`.
    pub fn selector(&self) -> String {
        match self.kind {
            ParameterKind::Plain => self.name.clone(),
            ParameterKind::Secure { version } => format!("{}:{version}", self.name),
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.kind, ParameterKind::Secure { .. })
    }

    /// parameter arns drop the leading slash of the name.
    pub fn arn(&self) -> StrVal {
        let name = self.name.trim_start_matches('/');
        sub(format!("arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter/{name}")).into()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.name.starts_with('/') {
            return Err(format!("parameter name {:?} must be a path starting with '/'", self.name));
        }
        if self.name.len() > 2048 {
            return Err(format!("parameter name {:?} is too long", self.name));
        }
        let valid = |c: char| c.is_ascii_alphanumeric() || "_.-/".contains(c);
        if !self.name.chars().all(valid) {
            return Err(format!("parameter name {:?} contains invalid characters", self.name));
        }
        if let ParameterKind::Secure { version: 0 } = self.kind {
            return Err(format!("parameter {:?} pins version 0, versions start at 1", self.name));
        }
        Ok(())
    }
}

/// The credentials and broker address the set-led function needs to reach
/// the MQTT broker.
pub fn mqtt_parameters(secure_version: u32) -> Vec<ParameterRef> {
    vec![
        ParameterRef::secure("MQTT_USERNAME_SSM", "/iot/mqtt/username", secure_version),
        ParameterRef::secure("MQTT_PASSWORD_SSM", "/iot/mqtt/password", secure_version),
        ParameterRef::plain("MQTT_BROKER_SSM", "/iot/mqtt/broker"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_selectors_carry_version() {
        let params = mqtt_parameters(1);
        let selectors: Vec<String> = params.iter().map(|p| p.selector()).collect();
        assert_eq!(
            selectors,
            vec!["/iot/mqtt/username:1", "/iot/mqtt/password:1", "/iot/mqtt/broker"]
        );
        assert!(params.iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn arn_strips_leading_slash() {
        let p = ParameterRef::plain("MQTT_BROKER_SSM", "/iot/mqtt/broker");
        let arn = serde_json::to_value(p.arn()).unwrap();
        assert!(render_pattern(&arn).ends_with(":parameter/iot/mqtt/broker"));
    }

    #[test]
    fn relative_names_rejected() {
        let p = ParameterRef::plain("X", "iot/mqtt/broker");
        assert!(p.validate().is_err());
        let p = ParameterRef::secure("X", "/iot/mqtt/username", 0);
        assert!(p.validate().unwrap_err().contains("version 0"));
    }
}
