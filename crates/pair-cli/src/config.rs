//! Connection settings, expansion defaults and output rendering
//!
//! Every expansion default can come from a flag or from the environment
//! the manager used to be deployed with (`APP_*`).

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use pair_common::DEFAULT_TARGET_NAMESPACE;
use pair_instance::config::{
    DEFAULT_KUBERNETES_VERSION, DEFAULT_NODE_SIZE, DEFAULT_TIMEZONE,
};
use pair_instance::{InstanceDefaults, ManagerConfig};
use serde::Serialize;

use crate::Result;

/// Where the management cluster is and which namespace holds instances
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Path to kubeconfig file (default: $KUBECONFIG, ~/.kube/config or in-cluster)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace holding instance resources
    #[arg(
        short,
        long,
        env = "APP_TARGET_NAMESPACE",
        default_value = DEFAULT_TARGET_NAMESPACE,
        global = true
    )]
    pub namespace: String,
}

/// Values expanded into every new instance
#[derive(Args, Debug)]
pub struct DefaultsArgs {
    /// Cloud project the machines are billed to
    #[arg(long, env = "APP_PACKET_PROJECT_ID", default_value = "", global = true)]
    pub project_id: String,

    /// Machine type used when a spec leaves nodeSize empty
    #[arg(long, env = "APP_INSTANCE_NODE_SIZE", default_value = DEFAULT_NODE_SIZE, global = true)]
    pub node_size: String,

    /// Kubernetes version of new instances
    #[arg(
        long,
        env = "APP_INSTANCE_KUBERNETES_VERSION",
        default_value = DEFAULT_KUBERNETES_VERSION,
        global = true
    )]
    pub kubernetes_version: String,

    /// Timezone used when a spec leaves setup.timezone empty
    #[arg(
        long,
        env = "APP_INSTANCE_DEFAULT_TIMEZONE",
        default_value = DEFAULT_TIMEZONE,
        global = true
    )]
    pub timezone: String,

    /// Instances one user may hold at once; negative means unlimited
    #[arg(
        long,
        env = "APP_NON_ADMIN_INSTANCE_MAX_AMOUNT",
        default_value_t = -1,
        allow_negative_numbers = true,
        global = true
    )]
    pub max_instances_per_user: i64,
}

impl DefaultsArgs {
    /// Manager settings for `namespace` with these defaults applied
    pub fn manager_config(&self, namespace: &str) -> ManagerConfig {
        ManagerConfig {
            defaults: InstanceDefaults {
                project_id: self.project_id.clone(),
                node_size: self.node_size.clone(),
                kubernetes_version: self.kubernetes_version.clone(),
                timezone: self.timezone.clone(),
                ..Default::default()
            },
            max_instances_per_user: usize::try_from(self.max_instances_per_user).ok(),
            ..ManagerConfig::for_namespace(namespace)
        }
    }
}

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML (default)
    #[default]
    Yaml,
    /// JSON
    Json,
}

impl OutputFormat {
    /// Render a value in this format
    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            OutputFormat::Json => {
                let mut out = serde_json::to_string_pretty(value)?;
                out.push('\n');
                Ok(out)
            }
        }
    }
}
