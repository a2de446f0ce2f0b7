//! DynamoDB client construction.
//!
//! The client is built once per process and shared by every operation; the
//! SDK client keeps its own connection pool, so nothing here pools or tears
//! down connections.

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::ClientConfig;

/// Process-wide client.
static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Get the shared client, building it from `config` on first use.
///
/// `config` is only consulted by the first caller; later calls get the
/// client that already exists.
pub async fn shared_client(config: &ClientConfig) -> &'static Client {
    CLIENT.get_or_init(|| build_client(config)).await
}

/// Install `client` as the shared client. Returns `false` if one already
/// existed.
pub fn install_client(client: Client) -> bool {
    CLIENT.set(client).is_ok()
}

/// Build a DynamoDB client with the given configuration.
pub async fn build_client(config: &ClientConfig) -> Client {
    let region_provider = RegionProviderChain::first_try(
        config
            .region
            .clone()
            .map(aws_sdk_dynamodb::config::Region::new),
    )
    .or_default_provider()
    .or_else("us-east-1");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    // Credentials priority: static > profile > env/default chain
    if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
        let creds = Credentials::new(
            ak.clone(),
            sk.clone(),
            config.session_token.clone(),
            None,
            "dynomap-static",
        );
        config_loader = config_loader.credentials_provider(creds);
    } else if let Some(profile_name) = &config.profile {
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(profile_name)
            .build();
        config_loader = config_loader.credentials_provider(profile_provider);
    }

    let sdk_config = config_loader.load().await;

    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

    if let Some(url) = &config.endpoint_url {
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    debug!(
        region = ?sdk_config.region(),
        endpoint = ?config.endpoint_url,
        "built DynamoDB client"
    );

    Client::from_conf(dynamo_config.build())
}
