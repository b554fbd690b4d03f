use serde::Serialize;

use super::*;

/// policy variable resolving to the thing name bound to the connecting
/// certificate.
pub const THING_NAME_CLAIM: &str = "${iot:Connection.Thing.ThingName}";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Thing {
    pub thing_name: String,
}

impl CfnResource for Thing {
    fn type_string(&self) -> &'static str {
        "AWS::IoT::Thing"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        let valid = |c: char| c.is_ascii_alphanumeric() || ":_-".contains(c);
        if self.thing_name.is_empty() || self.thing_name.len() > 128 || !self.thing_name.chars().all(valid) {
            return Err(format!("invalid thing name {:?}", self.thing_name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceStatement {
    pub effect: iam::Effect,
    pub action: Vec<String>,
    pub resource: Vec<StrVal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DevicePolicyDocument {
    pub version: String,
    pub statement: Vec<DeviceStatement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DevicePolicy {
    pub policy_name: String,
    pub policy_document: DevicePolicyDocument,
}

/// `arn:aws:iot:<region>:<account>:<suffix>`, left for the engine to fill in.
/// Joined rather than substituted so policy variables can stay literal.
pub fn iot_arn(suffix: &str) -> StrVal {
    join(vec![
        "arn:".into(),
        get_ref("AWS::Partition"),
        ":iot:".into(),
        get_ref("AWS::Region"),
        ":".into(),
        get_ref("AWS::AccountId"),
        format!(":{suffix}").into(),
    ])
    .into()
}

impl DevicePolicy {
    /// A device may connect only as itself and may only listen on
    /// `<topic_prefix>/#`. No publish permission is granted.
    pub fn command_listener(policy_name: &str, topic_prefix: &str) -> Self {
        let topic_prefix = topic_prefix.trim_end_matches('/');
        let connect = DeviceStatement {
            effect: iam::Effect::Allow,
            action: vec!["iot:Connect".into()],
            resource: vec![iot_arn(&format!("client/{THING_NAME_CLAIM}"))],
        };
        let listen = DeviceStatement {
            effect: iam::Effect::Allow,
            action: vec!["iot:Subscribe".into(), "iot:Receive".into()],
            resource: vec![
                iot_arn(&format!("topicfilter/{topic_prefix}/#")),
                iot_arn(&format!("topic/{topic_prefix}/*")),
            ],
        };
        Self {
            policy_name: policy_name.to_string(),
            policy_document: DevicePolicyDocument {
                version: iam::POLICY_VERSION.into(),
                statement: vec![connect, listen],
            },
        }
    }
}

impl CfnResource for DevicePolicy {
    fn type_string(&self) -> &'static str {
        "AWS::IoT::Policy"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.policy_name.is_empty() || self.policy_name.len() > 128 {
            return Err(format!("invalid iot policy name {:?}", self.policy_name));
        }
        if self.policy_document.statement.is_empty() {
            return Err("iot policy must contain at least one statement".into());
        }
        for statement in &self.policy_document.statement {
            if let Some(action) = statement.action.iter().find(|a| !a.starts_with("iot:")) {
                return Err(format!("action {action:?} does not belong in an iot policy"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyPrincipalAttachment {
    pub policy_name: StrVal,
    pub principal: String,
}

impl CfnResource for PolicyPrincipalAttachment {
    fn type_string(&self) -> &'static str {
        "AWS::IoT::PolicyPrincipalAttachment"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        validate_certificate_arn(&self.principal)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThingPrincipalAttachment {
    pub thing_name: StrVal,
    pub principal: String,
}

impl CfnResource for ThingPrincipalAttachment {
    fn type_string(&self) -> &'static str {
        "AWS::IoT::ThingPrincipalAttachment"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        validate_certificate_arn(&self.principal)
    }
}

/// `arn:<partition>:iot:<region>:<account>:cert/<64 hex chars>`
pub fn validate_certificate_arn(arn: &str) -> Result<(), String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let [prefix, _partition, service, region, account, resource] = parts.as_slice() else {
        return Err(format!("invalid certificate arn {arn:?}"));
    };
    if *prefix != "arn" || *service != "iot" || region.is_empty() {
        return Err(format!("invalid certificate arn {arn:?}"));
    }
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("certificate arn {arn:?} has an invalid account id"));
    }
    let Some(cert_id) = resource.strip_prefix("cert/") else {
        return Err(format!("certificate arn {arn:?} does not name a certificate"));
    };
    if cert_id.len() != 64 || !cert_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("certificate arn {arn:?} has an invalid certificate id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    const CERT: &str =
        "arn:aws:iot:eu-central-1:362554412840:cert/a6a16362059843b24e67a99ec569ef8301005a7dcad0794376cb4561c53f72de";

    #[test]
    fn listener_policy_is_self_scoped() {
        let policy = DevicePolicy::command_listener("EspPolicy", "esp8266/commands/");
        let props = policy.properties().unwrap();
        let connect = render_pattern(&props["PolicyDocument"]["Statement"][0]["Resource"][0]);
        assert_eq!(
            connect,
            "arn:${AWS::Partition}:iot:${AWS::Region}:${AWS::AccountId}:client/${iot:Connection.Thing.ThingName}"
        );
        let filter = render_pattern(&props["PolicyDocument"]["Statement"][1]["Resource"][0]);
        assert!(filter.ends_with(":topicfilter/esp8266/commands/#"), "{filter}");
        assert!(policy.validate().is_ok());
    }

    #[parameterized(
        valid = { CERT, true },
        not_cert = { "arn:aws:iot:eu-central-1:362554412840:thing/esp", false },
        short_account = { "arn:aws:iot:eu-central-1:3625:cert/a6a16362059843b24e67a99ec569ef8301005a7dcad0794376cb4561c53f72de", false },
        garbage = { "not-an-arn", false },
    )]
    fn certificate_arns(arn: &str, ok: bool) {
        assert_eq!(validate_certificate_arn(arn).is_ok(), ok);
    }
}
