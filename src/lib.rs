//! Declares the IoT hub stack as a CloudFormation template, checks the
//! rendered template against the hub's security rules, and plans the
//! scripts that upload assets and apply the stack.

pub mod assets;
pub mod audit;
pub mod config;
pub mod deploy;
pub mod error;
pub mod iot_hub;
pub mod resources;
pub mod stack;
pub mod variables;
pub mod verify;

pub use assets::{AssetManifest, Fingerprint};
pub use audit::{audit, Report};
pub use config::{ApiMode, StackConfig};
pub use deploy::DeployPlan;
pub use error::{Result, StackError};
pub use iot_hub::IotHubStack;
pub use stack::{SavedTemplate, Stack};
