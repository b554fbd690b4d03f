//! Deploy and teardown scripts for the stack.
//!
//! `deploy.sh` moves to the directory the plan was made from, so relative
//! artifact and site paths resolve the same wherever it is run. It then
//! checks that the referenced parameters exist, zips and uploads
//! the function artifact under a content-addressed key, applies the
//! template, then mirrors the static site into the website bucket.
//! `destroy.sh` empties the website bucket first, since the engine refuses
//! to delete a bucket that still holds objects.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::assets::AssetManifest;
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::iot_hub::{logical_ids, parameters, FUNCTION_NAME};
use crate::resources::ssm::{mqtt_parameters, ParameterRef};
use crate::stack::SavedTemplate;

pub const TEMPLATE_FILE: &str = "deploy.json";
pub const DEPLOY_SCRIPT: &str = "deploy.sh";
pub const DESTROY_SCRIPT: &str = "destroy.sh";
pub const OUT_DIR: &str = "./iothub/out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    /// directory relative paths in the plan are resolved against.
    pub root: PathBuf,
    pub stack_name: String,
    pub region: String,
    pub artifact_bucket: String,
    pub function_dir: PathBuf,
    pub function_key: String,
    pub website_dir: PathBuf,
    pub parameters: Vec<ParameterRef>,
}

impl DeployPlan {
    pub fn new(config: &StackConfig, assets: &AssetManifest) -> Result<Self> {
        config.validate()?;
        if config.function.artifact_bucket.is_empty() {
            return Err(StackError::Config(
                "no artifact bucket configured. Set function.artifact_bucket or IOTHUB_ARTIFACT_BUCKET".into(),
            ));
        }
        let root = std::env::current_dir().map_err(|e| StackError::io(Path::new("."), e))?;
        Ok(Self {
            root,
            stack_name: config.stack_name.clone(),
            region: config.region.clone(),
            artifact_bucket: config.function.artifact_bucket.clone(),
            function_dir: config.function.artifact_dir.clone(),
            function_key: assets.function_key(FUNCTION_NAME),
            website_dir: config.website.build_dir.clone(),
            parameters: mqtt_parameters(config.function.secure_parameter_version),
        })
    }

    pub fn parameter_overrides(&self) -> Vec<(&'static str, &str)> {
        vec![
            (parameters::ARTIFACT_BUCKET, self.artifact_bucket.as_str()),
            (parameters::FUNCTION_CODE_KEY, self.function_key.as_str()),
        ]
    }

    fn aws(&self) -> String {
        format!("aws --region {}", quote(&self.region))
    }

    fn website_bucket_lookup(&self) -> String {
        format!(
            "bucket=$({} cloudformation describe-stack-resource --stack-name {} --logical-resource-id {} --query StackResourceDetail.PhysicalResourceId --output text)\n",
            self.aws(),
            quote(&self.stack_name),
            logical_ids::BUCKET,
        )
    }

    /// `template` is where the rendered template will be found, relative
    /// to `root` unless absolute.
    pub fn render_script(&self, template: &Path) -> String {
        let aws = self.aws();
        let mut out = String::from("#!/usr/bin/env bash\nset -euo pipefail\n");
        let _ = writeln!(out, "cd {}", quote_path(&self.root));

        out.push_str("\n# preflight:\n");
        for param in &self.parameters {
            let decrypt = if param.is_secure() { " --with-decryption" } else { "" };
            let _ = writeln!(
                out,
                "{aws} ssm get-parameter --name {}{decrypt} > /dev/null",
                quote(&param.selector())
            );
        }

        out.push_str("\n# build:\n");
        let _ = writeln!(out, "rm -rf {OUT_DIR}/ && mkdir -p {OUT_DIR}");
        let _ = writeln!(
            out,
            "(cd {} && zip -qr - .) > {OUT_DIR}/{}",
            quote_path(&self.function_dir),
            self.function_key
        );

        out.push_str("\n# package:\n");
        let _ = writeln!(
            out,
            "aws s3 sync --size-only {OUT_DIR}/ s3://{}",
            quote(&self.artifact_bucket)
        );

        out.push_str("\n# deploy:\n");
        let region = quote(&self.region);
        let _ = write!(
            out,
            "AWS_REGION={region} {aws} cloudformation deploy --stack-name {} --template-file {} --capabilities CAPABILITY_NAMED_IAM --parameter-overrides",
            quote(&self.stack_name),
            quote_path(template)
        );
        for (key, value) in self.parameter_overrides() {
            let _ = write!(out, " {key}={}", quote(value));
        }
        out.push('\n');

        out.push_str("\n# assets:\n");
        out.push_str(&self.website_bucket_lookup());
        let _ = writeln!(out, "aws s3 sync --delete {} \"s3://$bucket\"", quote_path(&self.website_dir));
        out
    }

    pub fn render_destroy_script(&self) -> String {
        let mut out = String::from("#!/usr/bin/env bash\nset -euo pipefail\n\n");
        out.push_str(&self.website_bucket_lookup());
        out.push_str("aws s3 rm --recursive \"s3://$bucket\"\n");
        let stack = quote(&self.stack_name);
        let _ = writeln!(out, "{} cloudformation delete-stack --stack-name {stack}", self.aws());
        let _ = writeln!(
            out,
            "{} cloudformation wait stack-delete-complete --stack-name {stack}",
            self.aws()
        );
        out
    }

    /// Writes the template and both scripts into `dir`. A relative `dir` is
    /// taken relative to `root`.
    #[instrument(skip(self, template), fields(stack = %self.stack_name))]
    pub fn write_to(&self, dir: &Path, template: &SavedTemplate) -> Result<()> {
        let dir = self.root.join(dir);
        let dir = dir.as_path();
        std::fs::create_dir_all(dir).map_err(|e| StackError::io(dir, e))?;
        let template_path = dir.join(TEMPLATE_FILE);
        write_file(&template_path, &template.to_json_pretty()?, false)?;
        write_file(&dir.join(DEPLOY_SCRIPT), &self.render_script(&template_path), true)?;
        write_file(&dir.join(DESTROY_SCRIPT), &self.render_destroy_script(), true)?;
        info!(?dir, key = %self.function_key, "wrote deploy plan");
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str, executable: bool) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| StackError::io(path, e))?;
    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(path, permissions).map_err(|e| StackError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    Ok(())
}

/// single-quotes `value` unless it is made only of characters the shell
/// leaves alone.
fn quote(value: &str) -> String {
    let plain = |c: char| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c);
    if !value.is_empty() && value.chars().all(plain) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}
