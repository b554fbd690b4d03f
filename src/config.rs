//! Stack configuration: defaults describe the reference deployment, a TOML
//! file can replace any of them, and `IOTHUB_*` overrides win over both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{Result, StackError};
use crate::variables::load_dot_env;

pub const VALID_AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-north-1",
    "eu-west-3",
    "eu-west-2",
    "eu-west-1",
    "eu-central-1",
    "eu-south-1",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-east-1",
    "sa-east-1",
    "cn-north-1",
    "cn-northwest-1",
    "us-gov-east-1",
    "us-gov-west-1",
    "me-south-1",
    "af-south-1",
];

/// Whether the set-led endpoint sits behind the user pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApiMode {
    /// anyone may call the endpoint; the frontend gates access in its UI.
    Public,
    /// callers present a user pool token in the `Authorization` header.
    #[default]
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsiteConfig {
    pub bucket_name: String,
    /// pre-built static site, synced into the bucket on every deploy.
    pub build_dir: PathBuf,
    pub access_control_name: String,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            bucket_name: "iot-hub-frontend-cloudfront".into(),
            build_dir: PathBuf::from("../frontend/iot-hub/build"),
            access_control_name: "OAC-iot-hub-Frontend".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    /// directory holding the pre-built `bootstrap` executable.
    pub artifact_dir: PathBuf,
    /// bucket the zipped artifact is uploaded to before deploying.
    /// Only required when producing a deploy plan.
    pub artifact_bucket: String,
    pub memory_size: u32,
    pub timeout: u32,
    pub secure_parameter_version: u32,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("../backend/set_led_go"),
            artifact_bucket: String::new(),
            memory_size: 128,
            timeout: 30,
            secure_parameter_version: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_pool_name: String,
    /// upper bound for id, access and refresh token lifetimes.
    pub token_validity_hours: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_pool_name: "iot-hub-users".into(),
            token_validity_hours: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub thing_name: String,
    pub policy_name: String,
    /// the device may subscribe below this prefix, nowhere else.
    pub command_topic: String,
    /// certificate issued out of band and registered with IoT Core.
    pub certificate_arn: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            thing_name: "esp8266-001".into(),
            policy_name: "EspPolicy".into(),
            command_topic: "esp8266/commands".into(),
            certificate_arn: "arn:aws:iot:eu-central-1:362554412840:cert/a6a16362059843b24e67a99ec569ef8301005a7dcad0794376cb4561c53f72de".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack_name: String,
    pub region: String,
    pub api_mode: ApiMode,
    pub website: WebsiteConfig,
    pub function: FunctionConfig,
    pub identity: IdentityConfig,
    pub device: DeviceConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "iot-hub-infra".into(),
            region: "eu-central-1".into(),
            api_mode: ApiMode::default(),
            website: Default::default(),
            function: Default::default(),
            identity: Default::default(),
            device: Default::default(),
        }
    }
}

impl StackConfig {
    pub fn for_profile(api_mode: ApiMode) -> Self {
        Self {
            api_mode,
            ..Default::default()
        }
    }

    pub fn from_toml(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| StackError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| StackError::io(path, e))?;
        let config = Self::from_toml(&contents, path)?;
        debug!(?path, stack = %config.stack_name, "loaded stack config");
        Ok(config)
    }

    /// Applies `IOTHUB_*` overrides. Unknown keys are ignored so a shared
    /// `.env` can carry unrelated values.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> Result<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "IOTHUB_STACK_NAME" => self.stack_name = value.clone(),
                "IOTHUB_REGION" => self.region = value.clone(),
                "IOTHUB_API_MODE" => {
                    self.api_mode = value
                        .parse()
                        .map_err(|_| StackError::Config(format!("unknown api mode {value:?}, expected public or authenticated")))?;
                }
                "IOTHUB_BUCKET_NAME" => self.website.bucket_name = value.clone(),
                "IOTHUB_BUILD_DIR" => self.website.build_dir = PathBuf::from(value),
                "IOTHUB_ARTIFACT_DIR" => self.function.artifact_dir = PathBuf::from(value),
                "IOTHUB_ARTIFACT_BUCKET" => self.function.artifact_bucket = value.clone(),
                "IOTHUB_CERTIFICATE_ARN" => self.device.certificate_arn = value.clone(),
                "IOTHUB_TOKEN_VALIDITY_HOURS" => {
                    self.identity.token_validity_hours = value
                        .parse()
                        .map_err(|_| StackError::Config(format!("token validity {value:?} is not a whole number of hours")))?;
                }
                _ => continue,
            }
            debug!(%key, "applied override");
        }
        Ok(())
    }

    /// Layers every configuration source, later ones winning: the config
    /// file (or defaults), the `.env` file, the process environment, then
    /// an explicit profile. The result is validated.
    pub fn resolve(
        file: Option<&Path>,
        env_file: Option<&Path>,
        env: &HashMap<String, String>,
        profile: Option<ApiMode>,
    ) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(path) = env_file {
            config.apply_overrides(&load_dot_env(path)?)?;
        }
        config.apply_overrides(env)?;
        if let Some(profile) = profile {
            config.api_mode = profile;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_AWS_REGIONS.contains(&self.region.as_str()) {
            return Err(StackError::Config(format!(
                "Invalid region code {:?}\nMust be one of {:?}",
                self.region, VALID_AWS_REGIONS
            )));
        }
        // refresh tokens live at least an hour, id/access tokens at most a day
        if !(1..=24).contains(&self.identity.token_validity_hours) {
            return Err(StackError::Config(format!(
                "token validity of {} hours must be between 1 and 24",
                self.identity.token_validity_hours
            )));
        }
        if self.device.command_topic.trim_matches('/').is_empty() || self.device.command_topic.contains(['#', '+']) {
            return Err(StackError::Config(format!(
                "command topic {:?} must be a concrete topic prefix without wildcards",
                self.device.command_topic
            )));
        }
        if self.function.secure_parameter_version == 0 {
            return Err(StackError::Config("secure parameter versions start at 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn default_is_valid_reference_deployment() {
        let config = StackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_mode, ApiMode::Authenticated);
        assert_eq!(config.identity.token_validity_hours, 1);
        assert_eq!(config.function.secure_parameter_version, 1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = StackConfig::from_toml(
            r#"
stack_name = "iot-hub-dev"
api_mode = "public"

[device]
thing_name = "esp8266-002"
"#,
            Path::new("iothub.toml"),
        )
        .unwrap();
        assert_eq!(config.stack_name, "iot-hub-dev");
        assert_eq!(config.api_mode, ApiMode::Public);
        assert_eq!(config.device.thing_name, "esp8266-002");
        assert_eq!(config.device.policy_name, "EspPolicy");
        assert_eq!(config.website, WebsiteConfig::default());
    }

    #[test]
    fn bad_toml_names_the_file() {
        let err = StackConfig::from_toml("api_mode = 3", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"), "{err}");
    }

    #[test]
    fn overrides_win() {
        let mut config = StackConfig::default();
        let overrides = HashMap::from([
            ("IOTHUB_API_MODE".to_string(), "public".to_string()),
            ("IOTHUB_ARTIFACT_BUCKET".to_string(), "artifacts".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        config.apply_overrides(&overrides).unwrap();
        assert_eq!(config.api_mode, ApiMode::Public);
        assert_eq!(config.function.artifact_bucket, "artifacts");
    }

    #[test]
    fn sources_layer_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("iothub.toml");
        std::fs::write(&file, "stack_name = \"from-file\"\nregion = \"us-east-1\"\n").unwrap();
        let dot_env = dir.path().join(".env");
        std::fs::write(&dot_env, "IOTHUB_STACK_NAME=from-dot-env\nIOTHUB_API_MODE=public\n").unwrap();
        let env = HashMap::from([("IOTHUB_STACK_NAME".to_string(), "from-env".to_string())]);

        let config = StackConfig::resolve(Some(&file), Some(&dot_env), &env, None).unwrap();
        assert_eq!(config.stack_name, "from-env");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.api_mode, ApiMode::Public);
    }

    #[parameterized(
        no_profile = { None, ApiMode::Public },
        profile_wins = { Some(ApiMode::Authenticated), ApiMode::Authenticated },
    )]
    fn profile_beats_environment(profile: Option<ApiMode>, expected: ApiMode) {
        let env = HashMap::from([("IOTHUB_API_MODE".to_string(), "public".to_string())]);
        let config = StackConfig::resolve(None, None, &env, profile).unwrap();
        assert_eq!(config.api_mode, expected);
    }

    #[test]
    fn resolved_config_is_validated() {
        let env = HashMap::from([("IOTHUB_TOKEN_VALIDITY_HOURS".to_string(), "48".to_string())]);
        let err = StackConfig::resolve(None, None, &env, None).unwrap_err();
        assert!(matches!(err, StackError::Config(_)), "{err}");
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut config = StackConfig::default();
        let overrides = HashMap::from([("IOTHUB_API_MODE".to_string(), "private".to_string())]);
        assert!(matches!(config.apply_overrides(&overrides), Err(StackError::Config(_))));
    }

    #[parameterized(
        bad_region = { |c: &mut StackConfig| c.region = "mars-1".into(), "Invalid region" },
        zero_hours = { |c: &mut StackConfig| c.identity.token_validity_hours = 0, "token validity" },
        long_tokens = { |c: &mut StackConfig| c.identity.token_validity_hours = 48, "token validity" },
        wildcard_topic = { |c: &mut StackConfig| c.device.command_topic = "esp8266/#".into(), "wildcards" },
        version_zero = { |c: &mut StackConfig| c.function.secure_parameter_version = 0, "start at 1" },
    )]
    fn invalid_configs(mutate: fn(&mut StackConfig), expected: &str) {
        let mut config = StackConfig::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
    }
}
