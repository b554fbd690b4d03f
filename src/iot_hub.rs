//! The IoT hub stack: a private bucket served through CloudFront, the
//! set-led function behind a REST API, the user pool guarding it, and the
//! identity of the ESP8266 that listens for LED commands.

use tracing::{info, instrument};

use crate::assets::AssetManifest;
use crate::config::{ApiMode, StackConfig};
use crate::error::{Result, StackError};
use crate::resources::api_gateway::{
    AuthorizationType, Authorizer, CorsOptions, Deployment, Integration, Method, RestApi, RestResource, Stage,
};
use crate::resources::cloudfront::{
    DefaultCacheBehavior, Distribution, DistributionConfig, ForwardedValues, Origin, OriginAccessControl,
    S3OriginConfig, SAFE_METHODS,
};
use crate::resources::cognito::{UserPool, UserPoolClient};
use crate::resources::iam::{InlinePolicy, PolicyDocument, Principal, Role, Statement};
use crate::resources::iot::{DevicePolicy, PolicyPrincipalAttachment, Thing, ThingPrincipalAttachment};
use crate::resources::lambda::{Code, Function, Permission};
use crate::resources::s3_bucket::{arn_for_objects, Bucket, BucketPolicy};
use crate::resources::ssm::{mqtt_parameters, ParameterRef, READ_ACTIONS};
use crate::resources::{get_att, get_ref, sub, HttpMethod};
use crate::stack::{RemovalPolicy, Resource, Stack, TemplateParameter};

/// logical ids of everything this stack declares. Reference these when
/// inspecting a rendered template.
pub mod logical_ids {
    pub const BUCKET: &str = "FrontendWebsiteBucket";
    pub const BUCKET_POLICY: &str = "FrontendWebsiteBucketPolicy";
    pub const ACCESS_CONTROL: &str = "OAC";
    pub const DISTRIBUTION: &str = "WebsiteDistribution";
    pub const FUNCTION: &str = "SetLedLambdaGo";
    pub const FUNCTION_ROLE: &str = "SetLedLambdaGoRole";
    pub const API: &str = "IoTHubAPI";
    pub const API_RESOURCE: &str = "IoTHubAPIsetled";
    pub const API_METHOD: &str = "IoTHubAPIsetledPOST";
    pub const API_PREFLIGHT: &str = "IoTHubAPIsetledOPTIONS";
    pub const API_DEPLOYMENT: &str = "IoTHubAPIDeployment";
    pub const API_STAGE: &str = "IoTHubAPIDeploymentStageprod";
    pub const API_PERMISSION: &str = "IoTHubAPIsetledPOSTPermission";
    pub const AUTHORIZER: &str = "IoTHubAuthorizer";
    pub const USER_POOL: &str = "IoTHubUserPool";
    pub const USER_POOL_CLIENT: &str = "IoTHubUserPoolIoTHubAppClient";
    pub const THING: &str = "EspThing";
    pub const DEVICE_POLICY: &str = "EspPolicy";
    pub const POLICY_ATTACHMENT: &str = "AttachPol";
    pub const THING_ATTACHMENT: &str = "AttachThing";
}

pub mod parameters {
    pub const ARTIFACT_BUCKET: &str = "ParamArtifactBucket";
    pub const FUNCTION_CODE_KEY: &str = "ParamSetLedCodeKey";
}

pub mod outputs {
    pub const CLOUDFRONT_URL: &str = "CloudFrontURL";
    pub const API_URL: &str = "ApiURL";
    pub const USER_POOL_ID: &str = "UserPoolId";
    pub const USER_POOL_CLIENT_ID: &str = "UserPoolClientId";
    pub const ALL: &[&str] = &[CLOUDFRONT_URL, API_URL, USER_POOL_ID, USER_POOL_CLIENT_ID];
}

pub const FUNCTION_NAME: &str = "set-led";
pub const API_PATH: &str = "set-led";
pub const API_STAGE_NAME: &str = "prod";
pub const AUTH_HEADER: &str = "Authorization";

use logical_ids as ids;

pub struct IotHubStack<'a> {
    config: &'a StackConfig,
    assets: Option<&'a AssetManifest>,
}

impl<'a> IotHubStack<'a> {
    pub fn new(config: &'a StackConfig) -> Self {
        Self { config, assets: None }
    }

    /// Pins the function code key and records the site fingerprint on the
    /// bucket. Without assets the code key must be passed as a parameter at
    /// deploy time.
    pub fn with_assets(mut self, assets: &'a AssetManifest) -> Self {
        self.assets = Some(assets);
        self
    }

    #[instrument(skip(self), fields(stack = %self.config.stack_name, api_mode = %self.config.api_mode))]
    pub fn build(&self) -> Result<Stack> {
        self.config.validate()?;
        let mut stack = Stack::new(&self.config.stack_name);
        stack.description = format!("IoT hub ({} api)", self.config.api_mode);

        self.add_storage(&mut stack);
        self.add_content_delivery(&mut stack);
        let params = mqtt_parameters(self.config.function.secure_parameter_version);
        self.add_function(&mut stack, &params)?;
        self.add_user_directory(&mut stack);
        self.add_api(&mut stack);
        self.add_device(&mut stack);
        self.add_outputs(&mut stack);

        info!(resources = stack.resources.len(), "evaluated stack");
        Ok(stack)
    }

    fn add_storage(&self, stack: &mut Stack) {
        let mut bucket = Resource::new(ids::BUCKET, Bucket::private(&self.config.website.bucket_name))
            .removal_policy(RemovalPolicy::Destroy);
        if let Some(assets) = self.assets {
            bucket = bucket.metadata("AssetFingerprint", assets.website.digest.clone());
        }
        stack.add_resource(bucket);

        // the only reader of the bucket is this stack's distribution
        let source_arn = sub(format!(
            "arn:${{AWS::Partition}}:cloudfront::${{AWS::AccountId}}:distribution/${{{}}}",
            ids::DISTRIBUTION
        ));
        let statement = Statement::allow(&["s3:GetObject"], vec![arn_for_objects(ids::BUCKET, "*")])
            .with_principal(Principal::service("cloudfront.amazonaws.com"))
            .with_string_equals("AWS:SourceArn", source_arn.into());
        let policy = BucketPolicy {
            bucket: get_ref(ids::BUCKET).into(),
            policy_document: PolicyDocument::new(vec![statement]),
        };
        stack.add_resource(Resource::new(ids::BUCKET_POLICY, policy));
    }

    fn add_content_delivery(&self, stack: &mut Stack) {
        let oac = OriginAccessControl::for_s3(&self.config.website.access_control_name);
        stack.add_resource(Resource::new(ids::ACCESS_CONTROL, oac));

        let origin_id = "S3Origin";
        let distribution = Distribution {
            distribution_config: DistributionConfig {
                enabled: true,
                default_root_object: "index.html".into(),
                origins: vec![Origin {
                    domain_name: get_att(ids::BUCKET, "RegionalDomainName").into(),
                    id: origin_id.into(),
                    s3_origin_config: S3OriginConfig {
                        origin_access_identity: String::new(),
                    },
                    origin_access_control_id: Some(get_ref(ids::ACCESS_CONTROL).into()),
                }],
                default_cache_behavior: DefaultCacheBehavior {
                    target_origin_id: origin_id.into(),
                    viewer_protocol_policy: "redirect-to-https".into(),
                    allowed_methods: SAFE_METHODS.to_vec(),
                    cached_methods: vec![HttpMethod::Get, HttpMethod::Head],
                    compress: true,
                    forwarded_values: ForwardedValues::none(),
                },
            },
        };
        stack.add_resource(Resource::new(ids::DISTRIBUTION, distribution));
    }

    fn add_function(&self, stack: &mut Stack, params: &[ParameterRef]) -> Result<()> {
        let function_config = &self.config.function;
        let mut code_key = TemplateParameter::string("object key of the zipped set-led artifact");
        if let Some(assets) = self.assets {
            code_key = code_key.with_default(assets.function_key(FUNCTION_NAME));
        }
        let mut artifact_bucket = TemplateParameter::string("bucket holding build artifacts");
        if !function_config.artifact_bucket.is_empty() {
            artifact_bucket = artifact_bucket.with_default(function_config.artifact_bucket.clone());
        }
        stack.add_parameter(parameters::ARTIFACT_BUCKET, artifact_bucket);
        stack.add_parameter(parameters::FUNCTION_CODE_KEY, code_key);

        // read access to exactly the referenced parameters, nothing else
        let mut role = Role::for_lambda();
        let param_arns = params.iter().map(ParameterRef::arn).collect();
        role.policies.push(InlinePolicy {
            policy_name: "ssm-parameter-read".into(),
            policy_document: PolicyDocument::new(vec![Statement::allow(READ_ACTIONS, param_arns)]),
        });
        stack.add_resource(Resource::new(ids::FUNCTION_ROLE, role));

        let code = Code {
            s3_bucket: get_ref(parameters::ARTIFACT_BUCKET).into(),
            s3_key: get_ref(parameters::FUNCTION_CODE_KEY).into(),
        };
        let mut function = Function::provided(code, get_att(ids::FUNCTION_ROLE, "Arn").into());
        function.memory_size = function_config.memory_size;
        function.timeout = function_config.timeout;
        function.description = "publishes LED commands to the device topic".into();
        for param in params {
            param.validate().map_err(|e| StackError::validation(ids::FUNCTION, e))?;
            // the function gets the parameter name, never the value
            function.env_var(&param.env_key, &param.name);
        }
        stack.add_resource(Resource::new(ids::FUNCTION, function));
        Ok(())
    }

    fn add_user_directory(&self, stack: &mut Stack) {
        let pool = UserPool::email_with_totp(&self.config.identity.user_pool_name);
        stack.add_resource(Resource::new(ids::USER_POOL, pool).removal_policy(RemovalPolicy::Destroy));

        let minutes = self.config.identity.token_validity_hours * 60;
        let client = UserPoolClient::public_client(get_ref(ids::USER_POOL).into(), minutes);
        stack.add_resource(Resource::new(ids::USER_POOL_CLIENT, client));
    }

    fn add_api(&self, stack: &mut Stack) {
        let api = RestApi {
            name: "IoT Hub API".into(),
            description: "IoT Hub API".into(),
        };
        stack.add_resource(Resource::new(ids::API, api));
        stack.add_resource(Resource::new(ids::API_RESOURCE, RestResource::under_root(ids::API, API_PATH)));

        let (authorization_type, authorizer_id, cors) = match self.config.api_mode {
            ApiMode::Public => (AuthorizationType::None, None, CorsOptions::permissive(&[])),
            ApiMode::Authenticated => {
                let authorizer = Authorizer::cognito(ids::AUTHORIZER, ids::API, ids::USER_POOL, AUTH_HEADER);
                stack.add_resource(Resource::new(ids::AUTHORIZER, authorizer));
                (
                    AuthorizationType::CognitoUserPools,
                    Some(get_ref(ids::AUTHORIZER).into()),
                    CorsOptions::permissive(&["Accept", AUTH_HEADER]),
                )
            }
        };
        let method = Method {
            http_method: HttpMethod::Post,
            resource_id: get_ref(ids::API_RESOURCE).into(),
            rest_api_id: get_ref(ids::API).into(),
            authorization_type,
            authorizer_id,
            integration: Integration::lambda_proxy(ids::FUNCTION),
            method_responses: vec![],
        };
        stack.add_resource(Resource::new(ids::API_METHOD, method));
        stack.add_resource(Resource::new(
            ids::API_PREFLIGHT,
            cors.preflight_method(ids::API, ids::API_RESOURCE),
        ));

        // a deployment snapshots the methods that exist when it is created
        let deployment = Deployment {
            rest_api_id: get_ref(ids::API).into(),
            description: "IoT Hub API".into(),
        };
        stack.add_resource(
            Resource::new(ids::API_DEPLOYMENT, deployment)
                .depends_on(ids::API_METHOD)
                .depends_on(ids::API_PREFLIGHT),
        );
        let stage = Stage {
            rest_api_id: get_ref(ids::API).into(),
            deployment_id: get_ref(ids::API_DEPLOYMENT).into(),
            stage_name: API_STAGE_NAME.into(),
        };
        stack.add_resource(Resource::new(ids::API_STAGE, stage));

        let source_arn = sub(format!(
            "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{}}}/*/POST/{API_PATH}",
            ids::API
        ));
        let permission = Permission::invoke(
            get_att(ids::FUNCTION, "Arn").into(),
            "apigateway.amazonaws.com",
            source_arn.into(),
        );
        stack.add_resource(Resource::new(ids::API_PERMISSION, permission));
    }

    fn add_device(&self, stack: &mut Stack) {
        let device = &self.config.device;
        stack.add_resource(Resource::new(
            ids::THING,
            Thing {
                thing_name: device.thing_name.clone(),
            },
        ));
        stack.add_resource(Resource::new(
            ids::DEVICE_POLICY,
            DevicePolicy::command_listener(&device.policy_name, &device.command_topic),
        ));
        // one certificate, bound to both the policy and the thing
        stack.add_resource(Resource::new(
            ids::POLICY_ATTACHMENT,
            PolicyPrincipalAttachment {
                policy_name: get_ref(ids::DEVICE_POLICY).into(),
                principal: device.certificate_arn.clone(),
            },
        ));
        stack.add_resource(Resource::new(
            ids::THING_ATTACHMENT,
            ThingPrincipalAttachment {
                thing_name: get_ref(ids::THING).into(),
                principal: device.certificate_arn.clone(),
            },
        ));
    }

    fn add_outputs(&self, stack: &mut Stack) {
        stack.add_output(
            outputs::CLOUDFRONT_URL,
            "frontend url",
            sub(format!("https://${{{}.DomainName}}", ids::DISTRIBUTION)),
        );
        stack.add_output(
            outputs::API_URL,
            "set-led api base url",
            sub(format!(
                "https://${{{}}}.execute-api.${{AWS::Region}}.${{AWS::URLSuffix}}/{API_STAGE_NAME}/",
                ids::API
            )),
        );
        stack.add_output(outputs::USER_POOL_ID, "user pool id", get_ref(ids::USER_POOL));
        stack.add_output(outputs::USER_POOL_CLIENT_ID, "app client id", get_ref(ids::USER_POOL_CLIENT));
    }
}
