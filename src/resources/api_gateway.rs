use std::collections::BTreeMap;

use serde::Serialize;

use super::*;

/// headers API Gateway lets through a CORS preflight unless told otherwise.
pub const DEFAULT_CORS_HEADERS: &[&str] = &[
    "Content-Type",
    "X-Amz-Date",
    "Authorization",
    "X-Api-Key",
    "X-Amz-Security-Token",
    "X-Amz-User-Agent",
];

pub const ALL_METHODS: &[HttpMethod] = &[
    HttpMethod::Options,
    HttpMethod::Get,
    HttpMethod::Put,
    HttpMethod::Post,
    HttpMethod::Delete,
    HttpMethod::Patch,
    HttpMethod::Head,
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestApi {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl CfnResource for RestApi {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::RestApi"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("rest api must have a name".into());
        }
        Ok(())
    }
}

/// one path segment under the api root.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestResource {
    pub parent_id: StrVal,
    pub path_part: String,
    pub rest_api_id: StrVal,
}

impl RestResource {
    pub fn under_root(api_logical_id: &str, path_part: &str) -> Self {
        Self {
            parent_id: get_att(api_logical_id, "RootResourceId").into(),
            path_part: path_part.to_string(),
            rest_api_id: get_ref(api_logical_id).into(),
        }
    }
}

impl CfnResource for RestResource {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::Resource"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        let valid = |c: char| c.is_ascii_alphanumeric() || "-_.:{}+".contains(c);
        if self.path_part.is_empty() || !self.path_part.chars().all(valid) {
            return Err(format!("invalid path part {:?}", self.path_part));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationType {
    None,
    CognitoUserPools,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationResponse {
    pub status_code: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Integration {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_http_method: Option<HttpMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<StrVal>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_templates: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub integration_responses: Vec<IntegrationResponse>,
}

impl Integration {
    /// proxy every request to a lambda function.
    pub fn lambda_proxy(function_logical_id: &str) -> Self {
        let uri = sub(format!(
            "arn:${{AWS::Partition}}:apigateway:${{AWS::Region}}:lambda:path/2015-03-31/functions/${{{function_logical_id}.Arn}}/invocations"
        ));
        Self {
            ty: "AWS_PROXY".into(),
            integration_http_method: Some(HttpMethod::Post),
            uri: Some(uri.into()),
            request_templates: Default::default(),
            integration_responses: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodResponse {
    pub status_code: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_parameters: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Method {
    pub http_method: HttpMethod,
    pub resource_id: StrVal,
    pub rest_api_id: StrVal,
    pub authorization_type: AuthorizationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_id: Option<StrVal>,
    pub integration: Integration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub method_responses: Vec<MethodResponse>,
}

impl CfnResource for Method {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::Method"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        match (self.authorization_type, &self.authorizer_id) {
            (AuthorizationType::CognitoUserPools, None) => {
                Err("COGNITO_USER_POOLS authorization requires an authorizer".into())
            }
            (AuthorizationType::None, Some(_)) => {
                Err("an authorizer is set but authorization type is NONE".into())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<HttpMethod>,
    pub allow_headers: Vec<String>,
}

impl CorsOptions {
    /// any origin, any method, the default headers plus `extra_headers`.
    pub fn permissive(extra_headers: &[&str]) -> Self {
        let mut allow_headers: Vec<String> = DEFAULT_CORS_HEADERS.iter().map(|h| h.to_string()).collect();
        for header in extra_headers {
            if !allow_headers.iter().any(|h| h.eq_ignore_ascii_case(header)) {
                allow_headers.push(header.to_string());
            }
        }
        Self {
            allow_origins: vec!["*".into()],
            allow_methods: ALL_METHODS.to_vec(),
            allow_headers,
        }
    }

    fn response_headers(&self) -> BTreeMap<String, String> {
        let quote = |s: String| format!("'{s}'");
        let methods: Vec<String> = self.allow_methods.iter().map(|m| m.to_string()).collect();
        let mut out = BTreeMap::new();
        out.insert(
            "method.response.header.Access-Control-Allow-Headers".to_string(),
            quote(self.allow_headers.join(",")),
        );
        out.insert(
            "method.response.header.Access-Control-Allow-Origin".to_string(),
            quote(self.allow_origins.join(",")),
        );
        out.insert(
            "method.response.header.Access-Control-Allow-Methods".to_string(),
            quote(methods.join(",")),
        );
        out
    }

    /// an unauthenticated `OPTIONS` method answering preflight requests
    /// from a mock integration.
    pub fn preflight_method(&self, api_logical_id: &str, resource_logical_id: &str) -> Method {
        let headers = self.response_headers();
        let declared = headers.keys().map(|k| (k.clone(), true)).collect();
        let mut request_templates = BTreeMap::new();
        request_templates.insert("application/json".to_string(), "{ statusCode: 200 }".to_string());
        Method {
            http_method: HttpMethod::Options,
            resource_id: get_ref(resource_logical_id).into(),
            rest_api_id: get_ref(api_logical_id).into(),
            authorization_type: AuthorizationType::None,
            authorizer_id: None,
            integration: Integration {
                ty: "MOCK".into(),
                integration_http_method: None,
                uri: None,
                request_templates,
                integration_responses: vec![IntegrationResponse {
                    status_code: "204".into(),
                    response_parameters: headers,
                }],
            },
            method_responses: vec![MethodResponse {
                status_code: "204".into(),
                response_parameters: declared,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authorizer {
    pub name: String,
    pub rest_api_id: StrVal,
    #[serde(rename = "Type")]
    pub ty: String,
    pub identity_source: String,
    #[serde(rename = "ProviderARNs")]
    pub provider_arns: Vec<StrVal>,
}

impl Authorizer {
    /// validates tokens issued by the given user pool, read from a header.
    pub fn cognito(name: &str, api_logical_id: &str, user_pool_logical_id: &str, header: &str) -> Self {
        Self {
            name: name.to_string(),
            rest_api_id: get_ref(api_logical_id).into(),
            ty: "COGNITO_USER_POOLS".into(),
            identity_source: format!("method.request.header.{header}"),
            provider_arns: vec![get_att(user_pool_logical_id, "Arn").into()],
        }
    }
}

impl CfnResource for Authorizer {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::Authorizer"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.provider_arns.is_empty() {
            return Err("cognito authorizer needs at least one user pool".into());
        }
        if !self.identity_source.starts_with("method.request.") {
            return Err(format!("invalid identity source {:?}", self.identity_source));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    pub rest_api_id: StrVal,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl CfnResource for Deployment {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::Deployment"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stage {
    pub rest_api_id: StrVal,
    pub deployment_id: StrVal,
    pub stage_name: String,
}

impl CfnResource for Stage {
    fn type_string(&self) -> &'static str {
        "AWS::ApiGateway::Stage"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        let valid = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if self.stage_name.is_empty() || !self.stage_name.chars().all(valid) {
            return Err(format!("invalid stage name {:?}", self.stage_name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_cors_does_not_duplicate_headers() {
        let cors = CorsOptions::permissive(&["Accept", "Authorization"]);
        let count = cors.allow_headers.iter().filter(|h| *h == "Authorization").count();
        assert_eq!(count, 1);
        assert_eq!(cors.allow_headers.last().unwrap(), "Accept");
        assert_eq!(cors.allow_origins, vec!["*"]);
    }

    #[test]
    fn preflight_answers_with_quoted_headers() {
        let cors = CorsOptions::permissive(&[]);
        let method = cors.preflight_method("Api", "SetLed");
        let props = method.properties().unwrap();
        assert_eq!(props["HttpMethod"], "OPTIONS");
        assert_eq!(props["AuthorizationType"], "NONE");
        let params = &props["Integration"]["IntegrationResponses"][0]["ResponseParameters"];
        assert_eq!(params["method.response.header.Access-Control-Allow-Origin"], "'*'");
        assert_eq!(
            params["method.response.header.Access-Control-Allow-Methods"],
            "'OPTIONS,GET,PUT,POST,DELETE,PATCH,HEAD'"
        );
        assert_eq!(
            props["MethodResponses"][0]["ResponseParameters"]["method.response.header.Access-Control-Allow-Origin"],
            true
        );
    }

    #[test]
    fn cognito_method_requires_authorizer() {
        let mut method = CorsOptions::permissive(&[]).preflight_method("Api", "SetLed");
        method.authorization_type = AuthorizationType::CognitoUserPools;
        assert!(method.validate().is_err());
        method.authorizer_id = Some(get_ref("Authorizer").into());
        assert!(method.validate().is_ok());
    }

    #[test]
    fn proxy_integration_targets_function_arn() {
        let integration = Integration::lambda_proxy("SetLedLambdaGo");
        let uri = serde_json::to_value(integration.uri.unwrap()).unwrap();
        let mut refs = vec![];
        collect_references(&uri, &mut refs);
        assert_eq!(refs, vec!["SetLedLambdaGo"]);
    }
}
