//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction for both the management cluster and an instance's
//! own cluster, `ApiResource` building for the untyped Cluster API kinds,
//! and a stable content hash.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};

use crate::Error;

/// Build an `ApiResource` from an explicit apiVersion and kind
///
/// ```ignore
/// let ar = build_api_resource("cluster.x-k8s.io/v1alpha3", "Cluster");
/// let api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); core resources have an empty group
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Known Cluster API pluralizations for the kinds an instance is made of
const KIND_PLURALS: &[(&str, &str)] = &[
    ("cluster", "clusters"),
    ("machinedeployment", "machinedeployments"),
    ("kubeadmcontrolplane", "kubeadmcontrolplanes"),
    ("kubeadmconfigtemplate", "kubeadmconfigtemplates"),
    ("packetcluster", "packetclusters"),
    ("packetmachine", "packetmachines"),
    ("packetmachinetemplate", "packetmachinetemplates"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses the lookup table first, falling back to simple English rules.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Truncated SHA-256; stable across toolchains so it can be persisted in
/// resource names.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default timeouts
///
/// Without a path the config is inferred (in-cluster service account or
/// `$KUBECONFIG`).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            config_from_kubeconfig(kubeconfig).await?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    client_from_config(config)
}

/// Create a client scoped to another cluster from raw kubeconfig bytes
///
/// `timeout` bounds both connect and read so callers can keep a
/// best-effort lookup short.
pub async fn client_from_kubeconfig_bytes(bytes: &[u8], timeout: Duration) -> Result<Client, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        Error::internal_with_context("scoped_client", format!("kubeconfig is not utf-8: {}", e))
    })?;
    let kubeconfig = Kubeconfig::from_yaml(text).map_err(|e| {
        Error::internal_with_context("scoped_client", format!("failed to parse kubeconfig: {}", e))
    })?;
    let mut config = config_from_kubeconfig(kubeconfig).await?;
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    client_from_config(config)
}

async fn config_from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Config, Error> {
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to load kubeconfig: {}", e))
        })
}

fn client_from_config(config: Config) -> Result<Client, Error> {
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Get one data value out of a secret
///
/// A missing secret is reported as `NotFound`; a secret without the key
/// is an internal error.
pub async fn get_secret_data(
    client: &Client,
    name: &str,
    namespace: &str,
    key: &str,
) -> Result<Vec<u8>, Error> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let secret = secrets
        .get(name)
        .await
        .map_err(|e| Error::from_kube("Secret", name, e))?;

    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| {
            Error::internal_with_context(
                "get_secret_data",
                format!("Secret {}/{} missing key {}", namespace, name, key),
            )
        })?;

    Ok(data.0.clone())
}
