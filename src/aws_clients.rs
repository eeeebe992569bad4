use crate::config::Config;
use crate::errors::AppError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use tracing;

// Builds the shared SDK configuration from the application config.
// With an endpoint override (LocalStack) and no credentials in the
// environment, static dummy credentials are used so no profile lookup runs.
pub async fn create_sdk_config(config: &Config) -> Result<SdkConfig, AppError> {
    let region = Region::new(config.aws_region.clone());
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    if let Some(endpoint_url) = &config.localstack_endpoint {
        tracing::info!("Using localstack endpoint override: {}", endpoint_url);
        config_loader = config_loader.endpoint_url(endpoint_url);
        if std::env::var("AWS_ACCESS_KEY_ID").is_err() {
            tracing::debug!("No AWS credentials in environment, using static test credentials");
            config_loader =
                config_loader.credentials_provider(Credentials::new("test", "test", None, None, "imagi-localstack"));
        }
    } else {
        tracing::info!("Using default AWS endpoints and credential resolution.");
    }

    Ok(config_loader.load().await)
}

pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

// Path-style addressing keeps bucket URLs valid against LocalStack.
pub fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
