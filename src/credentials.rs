//! AWS credential chain.
//!
//! Layers are tried in order and the first one that yields credentials wins:
//! environment variables, then the shared credentials file, then the EC2
//! instance role. `--aws-iam-profile` narrows the chain to the instance role.

use aws_config::environment::credentials::EnvironmentVariableCredentialsProvider;
use aws_config::imds::credentials::ImdsCredentialsProvider;
use aws_config::meta::credentials::CredentialsProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_cloudwatch::config::SharedCredentialsProvider;
use std::path::PathBuf;
use tracing::debug;

use crate::config::AwsSettings;

/// One source of AWS credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLayer {
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
    Environment,
    /// Shared credentials file; `None` fields fall back to the SDK defaults
    SharedFile {
        path: Option<PathBuf>,
        profile: Option<String>,
    },
    /// EC2 instance metadata role
    InstanceRole,
}

impl CredentialLayer {
    fn name(&self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::SharedFile { .. } => "SharedFile",
            Self::InstanceRole => "InstanceRole",
        }
    }

    fn provider(&self) -> SharedCredentialsProvider {
        match self {
            Self::Environment => {
                SharedCredentialsProvider::new(EnvironmentVariableCredentialsProvider::new())
            }
            Self::SharedFile { path, profile } => {
                let mut builder = ProfileFileCredentialsProvider::builder();
                if let Some(path) = path {
                    builder = builder.profile_files(
                        EnvConfigFiles::builder()
                            .with_file(EnvConfigFileKind::Credentials, path)
                            .build(),
                    );
                }
                if let Some(profile) = profile {
                    builder = builder.profile_name(profile);
                }
                SharedCredentialsProvider::new(builder.build())
            }
            Self::InstanceRole => {
                SharedCredentialsProvider::new(ImdsCredentialsProvider::builder().build())
            }
        }
    }
}

/// Layers to try, in order, for these settings.
pub fn credential_layers(aws: &AwsSettings) -> Vec<CredentialLayer> {
    if aws.use_iam {
        return vec![CredentialLayer::InstanceRole];
    }
    vec![
        CredentialLayer::Environment,
        CredentialLayer::SharedFile {
            path: aws.credential_file.clone(),
            profile: aws.credential_profile.clone(),
        },
        CredentialLayer::InstanceRole,
    ]
}

/// Chain the layers into one provider. `None` for an empty list.
pub fn build_chain(layers: &[CredentialLayer]) -> Option<CredentialsProviderChain> {
    let (first, rest) = layers.split_first()?;
    let chain = CredentialsProviderChain::first_try(first.name(), first.provider());
    Some(rest.iter().fold(chain, |chain, layer| {
        chain.or_else(layer.name(), layer.provider())
    }))
}

/// Region + credential chain as an `SdkConfig` for the CloudWatch client.
pub async fn load_sdk_config(aws: &AwsSettings) -> SdkConfig {
    let layers = credential_layers(aws);
    debug!(layers = ?layers, region = %aws.region, "building AWS credential chain");

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
    if let Some(chain) = build_chain(&layers) {
        loader = loader.credentials_provider(chain);
    }
    loader.load().await
}
