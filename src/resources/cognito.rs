use serde::Serialize;

use super::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdminCreateUserConfig {
    pub allow_admin_create_user_only: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecoveryOption {
    pub name: String,
    pub priority: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRecoverySetting {
    pub recovery_mechanisms: Vec<RecoveryOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MfaConfiguration {
    Off,
    On,
    Optional,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserPool {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_pool_name: String,
    pub admin_create_user_config: AdminCreateUserConfig,
    pub username_attributes: Vec<String>,
    pub auto_verified_attributes: Vec<String>,
    pub account_recovery_setting: AccountRecoverySetting,
    pub mfa_configuration: MfaConfiguration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_mfas: Vec<String>,
}

impl UserPool {
    /// admin-provisioned users only, signing in with their email, with a
    /// mandatory authenticator-app second factor.
    pub fn email_with_totp(user_pool_name: &str) -> Self {
        Self {
            user_pool_name: user_pool_name.to_string(),
            admin_create_user_config: AdminCreateUserConfig {
                allow_admin_create_user_only: true,
            },
            username_attributes: vec!["email".into()],
            auto_verified_attributes: vec!["email".into()],
            account_recovery_setting: AccountRecoverySetting {
                recovery_mechanisms: vec![RecoveryOption {
                    name: "verified_email".into(),
                    priority: 1,
                }],
            },
            mfa_configuration: MfaConfiguration::On,
            enabled_mfas: vec!["SOFTWARE_TOKEN_MFA".into()],
        }
    }
}

impl CfnResource for UserPool {
    fn type_string(&self) -> &'static str {
        "AWS::Cognito::UserPool"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.mfa_configuration != MfaConfiguration::Off && self.enabled_mfas.is_empty() {
            return Err("mfa is enabled but no second factor is allowed".into());
        }
        if self.enabled_mfas.iter().any(|m| m == "SMS_MFA") {
            return Err("SMS_MFA requires an sms configuration, which this pool does not declare".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenValidityUnits {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenValidityUnits {
    pub fn minutes() -> Self {
        Self {
            id_token: "minutes".into(),
            access_token: "minutes".into(),
            refresh_token: "minutes".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserPoolClient {
    pub user_pool_id: StrVal,
    pub explicit_auth_flows: Vec<String>,
    pub generate_secret: bool,
    pub id_token_validity: u32,
    pub access_token_validity: u32,
    pub refresh_token_validity: u32,
    pub token_validity_units: TokenValidityUnits,
    pub enable_token_revocation: bool,
    pub supported_identity_providers: Vec<String>,
}

impl UserPoolClient {
    /// a public app client whose id, access and refresh tokens all expire
    /// after `validity_minutes`.
    pub fn public_client(user_pool_id: StrVal, validity_minutes: u32) -> Self {
        Self {
            user_pool_id,
            explicit_auth_flows: vec![
                "ALLOW_USER_SRP_AUTH".into(),
                "ALLOW_USER_PASSWORD_AUTH".into(),
                "ALLOW_ADMIN_USER_PASSWORD_AUTH".into(),
                "ALLOW_REFRESH_TOKEN_AUTH".into(),
            ],
            generate_secret: false,
            id_token_validity: validity_minutes,
            access_token_validity: validity_minutes,
            refresh_token_validity: validity_minutes,
            token_validity_units: TokenValidityUnits::minutes(),
            enable_token_revocation: true,
            supported_identity_providers: vec!["COGNITO".into()],
        }
    }
}

impl CfnResource for UserPoolClient {
    fn type_string(&self) -> &'static str {
        "AWS::Cognito::UserPoolClient"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        to_properties(self)
    }
    fn validate(&self) -> Result<(), String> {
        // limits in minutes, from the cognito api reference
        let one_day = 24 * 60;
        for (name, minutes) in [("id", self.id_token_validity), ("access", self.access_token_validity)] {
            if !(5..=one_day).contains(&minutes) {
                return Err(format!("{name} token validity of {minutes} minutes must be between 5 minutes and 1 day"));
            }
        }
        let ten_years = 10 * 365 * one_day;
        if !(60..=ten_years).contains(&self.refresh_token_validity) {
            return Err(format!(
                "refresh token validity of {} minutes must be between 60 minutes and 10 years",
                self.refresh_token_validity
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn pool_requires_totp_and_admin_signup() {
        let props = UserPool::email_with_totp("iot-hub-users").properties().unwrap();
        assert_eq!(props["AdminCreateUserConfig"]["AllowAdminCreateUserOnly"], true);
        assert_eq!(props["MfaConfiguration"], "ON");
        assert_eq!(props["EnabledMfas"], json!(["SOFTWARE_TOKEN_MFA"]));
        assert_eq!(props["AccountRecoverySetting"]["RecoveryMechanisms"][0]["Name"], "verified_email");
    }

    #[test]
    fn mfa_on_without_factors_is_invalid() {
        let mut pool = UserPool::email_with_totp("p");
        pool.enabled_mfas.clear();
        assert!(pool.validate().is_err());
    }

    #[parameterized(
        one_hour = { 60, true },
        refresh_too_short = { 30, false },
        over_a_day = { 25 * 60, false },
    )]
    fn client_validity_limits(minutes: u32, ok: bool) {
        let client = UserPoolClient::public_client(get_ref("Pool").into(), minutes);
        assert_eq!(client.validate().is_ok(), ok);
    }
}
