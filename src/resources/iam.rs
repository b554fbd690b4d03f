use serde::Serialize;

use super::*;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Principal {
    Service(String),
    #[serde(rename = "AWS")]
    Aws(StrVal),
}

impl Principal {
    pub fn service(name: &str) -> Self {
        Principal::Service(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<StrVal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

impl Statement {
    pub fn allow<A: AsRef<str>>(actions: &[A], resources: Vec<StrVal>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resource: resources,
            condition: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// `{ "StringEquals": { key: value } }`
    pub fn with_string_equals(mut self, key: &str, value: StrVal) -> Self {
        self.condition = Some(json!({ "StringEquals": { key: value } }));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.statement.is_empty() {
            return Err("policy document must contain at least one statement".into());
        }
        for (i, statement) in self.statement.iter().enumerate() {
            if statement.action.is_empty() {
                return Err(format!("policy statement {i} has no actions"));
            }
            if statement.resource.is_empty() {
                return Err(format!("policy statement {i} has no resources"));
            }
        }
        Ok(())
    }
}

/// the trust policy that lets lambda assume a role.
pub fn lambda_assume_role_policy() -> PolicyDocument {
    let statement = Statement {
        effect: Effect::Allow,
        principal: Some(Principal::service("lambda.amazonaws.com")),
        action: vec!["sts:AssumeRole".to_string()],
        resource: vec![],
        condition: None,
    };
    PolicyDocument::new(vec![statement])
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<StrVal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}

impl Role {
    pub fn for_lambda() -> Self {
        Self {
            assume_role_policy_document: lambda_assume_role_policy(),
            managed_policy_arns: vec![sub(
                "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
            )
            .into()],
            policies: vec![],
        }
    }
}

impl CfnResource for Role {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        for policy in &self.policies {
            if policy.policy_name.is_empty() {
                return Err("inline policies must be named".into());
            }
            policy
                .policy_document
                .validate()
                .map_err(|e| format!("inline policy {}: {e}", policy.policy_name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policy_has_no_resource_key() {
        let doc = serde_json::to_value(lambda_assume_role_policy()).unwrap();
        let statement = &doc["Statement"][0];
        assert_eq!(statement["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(statement["Action"][0], "sts:AssumeRole");
        // trust policies reject a Resource element
        assert!(statement.get("Resource").is_none());
        assert!(statement.get("Condition").is_none());
    }

    #[test]
    fn empty_inline_policy_is_rejected() {
        let mut role = Role::for_lambda();
        role.policies.push(InlinePolicy {
            policy_name: "empty".into(),
            policy_document: PolicyDocument::new(vec![]),
        });
        let err = role.validate().unwrap_err();
        assert!(err.contains("at least one statement"));
    }
}
