use std::collections::HashMap;

use iothub::iot_hub::{logical_ids as ids, outputs};
use iothub::resources::iam::{PolicyDocument, Principal, Statement};
use iothub::resources::s3_bucket::{arn_for_objects, BucketPolicy};
use iothub::resources::{get_ref, StrVal};
use iothub::{audit, ApiMode, IotHubStack, SavedTemplate, StackConfig};
use yare::parameterized;

fn render(config: &StackConfig) -> SavedTemplate {
    IotHubStack::new(config).build().unwrap().to_template().unwrap()
}

#[parameterized(
    public = { ApiMode::Public, 0 },
    authenticated = { ApiMode::Authenticated, 1 },
)]
fn default_evaluation_counts(mode: ApiMode, authorizers: usize) {
    let template = render(&StackConfig::for_profile(mode));
    for ty in [
        "AWS::S3::Bucket",
        "AWS::CloudFront::Distribution",
        "AWS::CloudFront::OriginAccessControl",
        "AWS::Lambda::Function",
        "AWS::ApiGateway::Resource",
        "AWS::Cognito::UserPool",
        "AWS::Cognito::UserPoolClient",
        "AWS::IoT::Thing",
        "AWS::IoT::Policy",
        "AWS::IoT::PolicyPrincipalAttachment",
        "AWS::IoT::ThingPrincipalAttachment",
    ] {
        assert_eq!(template.count_of_type(ty), 1, "{ty}");
    }
    let integrated = template
        .resources_of_type("AWS::ApiGateway::Method")
        .filter(|(_, m)| m.properties["Integration"]["Type"] == "AWS_PROXY")
        .count();
    assert_eq!(integrated, 1);
    assert_eq!(template.count_of_type("AWS::ApiGateway::Authorizer"), authorizers);
    let names: Vec<&str> = template.outputs.keys().map(String::as_str).collect();
    let mut expected = outputs::ALL.to_vec();
    expected.sort();
    assert_eq!(names, expected);
}

#[parameterized(
    public = { ApiMode::Public },
    authenticated = { ApiMode::Authenticated },
)]
fn default_evaluation_passes_audit(mode: ApiMode) {
    let config = StackConfig::for_profile(mode);
    let stack = IotHubStack::new(&config).build().unwrap();
    let report = audit(&stack, &config);
    assert!(report.is_ok(), "{report}");
}

#[test]
fn bucket_policy_only_admits_the_distribution() {
    let template = render(&StackConfig::default());
    let policy = &template.resources[ids::BUCKET_POLICY].properties;
    insta::with_settings!({sort_maps => true}, {
        insta::assert_json_snapshot!(policy, @r#"
        {
          "Bucket": {
            "Ref": "FrontendWebsiteBucket"
          },
          "PolicyDocument": {
            "Statement": [
              {
                "Action": [
                  "s3:GetObject"
                ],
                "Condition": {
                  "StringEquals": {
                    "AWS:SourceArn": {
                      "Fn::Sub": "arn:${AWS::Partition}:cloudfront::${AWS::AccountId}:distribution/${WebsiteDistribution}"
                    }
                  }
                },
                "Effect": "Allow",
                "Principal": {
                  "Service": "cloudfront.amazonaws.com"
                },
                "Resource": [
                  {
                    "Fn::Sub": "${FrontendWebsiteBucket.Arn}/*"
                  }
                ]
              }
            ],
            "Version": "2012-10-17"
          }
        }
        "#);
    });
}

#[test]
fn function_gets_parameter_names_not_values() {
    let template = render(&StackConfig::default());
    let vars = &template.resources[ids::FUNCTION].properties["Environment"]["Variables"];
    assert_eq!(
        vars,
        &serde_json::json!({
            "MQTT_USERNAME_SSM": "/iot/mqtt/username",
            "MQTT_PASSWORD_SSM": "/iot/mqtt/password",
            "MQTT_BROKER_SSM": "/iot/mqtt/broker",
        })
    );
}

#[test]
fn rendering_is_deterministic() {
    let config = StackConfig::default();
    let first = render(&config).to_json_pretty().unwrap();
    let second = render(&config).to_json_pretty().unwrap();
    assert_eq!(first, second);
}

#[test]
fn config_file_then_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iothub.toml");
    std::fs::write(&path, "api_mode = \"public\"\n\n[identity]\ntoken_validity_hours = 4\n").unwrap();
    let mut config = StackConfig::load(&path).unwrap();
    let overrides = HashMap::from([("IOTHUB_STACK_NAME".to_string(), "iot-hub-staging".to_string())]);
    config.apply_overrides(&overrides).unwrap();

    let template = render(&config);
    assert_eq!(template.count_of_type("AWS::ApiGateway::Authorizer"), 0);
    assert_eq!(template.resources[ids::USER_POOL_CLIENT].properties["IdTokenValidity"], 240);
    let stack = IotHubStack::new(&config).build().unwrap();
    assert_eq!(stack.name, "iot-hub-staging");
    assert!(audit(&stack, &config).is_ok());
}

#[test]
fn widened_bucket_policy_fails_audit() {
    let config = StackConfig::default();
    let mut stack = IotHubStack::new(&config).build().unwrap();
    let statement = Statement::allow(&["s3:GetObject"], vec![arn_for_objects(ids::BUCKET, "*")])
        .with_principal(Principal::Aws(StrVal::from("*")));
    let widened = BucketPolicy {
        bucket: get_ref(ids::BUCKET).into(),
        policy_document: PolicyDocument::new(vec![statement]),
    };
    let resource = stack.resources.iter_mut().find(|r| r.name == ids::BUCKET_POLICY).unwrap();
    resource.properties = Box::new(widened);

    let report = audit(&stack, &config);
    let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
    assert_eq!(failed, ["bucket-policy-scoped"]);
    assert!(report.into_result().is_err());
}
