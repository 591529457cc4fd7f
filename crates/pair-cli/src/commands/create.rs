//! `pair create` - create an instance from a spec file
//!
//! ```bash
//! pair create -f alice.yaml
//!
//! # Print the resources that would be submitted, touching nothing
//! pair create -f alice.yaml --dry-run
//! ```

use std::path::{Path, PathBuf};

use clap::Args;
use pair_instance::{InstanceSpec, ManagerConfig};
use tracing::info;

use crate::config::{ClusterArgs, OutputFormat};
use crate::{Error, Result};

/// Create an instance
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Instance spec (YAML or JSON); `-` reads stdin
    #[arg(short, long)]
    pub file: PathBuf,

    /// Print the expanded resources instead of creating them
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Run the create command
pub async fn run(args: CreateArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let spec = read_spec(&args.file)?;

    // Client construction makes no API calls; a dry run stays offline
    let client = super::connect(cluster).await?;
    let manager = super::kube_manager(client, config)?;

    if args.dry_run {
        let plan = manager.plan(spec)?;
        info!(instance = %plan.spec.name, resources = plan.resources.len(), "Dry run");
        print!("{}", args.output.render(&plan.resources.to_values()?)?);
        return Ok(());
    }

    let instance = manager.create(spec).await?;
    info!(instance = %instance.spec.name, "Instance created");
    print!("{}", args.output.render(&instance)?);
    Ok(())
}

/// Parse a spec file; YAML is a superset of JSON so one parser covers both
pub fn read_spec(path: &Path) -> Result<InstanceSpec> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path).map_err(|source| Error::ReadSpec {
            path: path.to_path_buf(),
            source,
        })?
    };
    parse_spec(&text)
}

fn parse_spec(text: &str) -> Result<InstanceSpec> {
    if text.trim().is_empty() {
        return Err(Error::validation("instance spec is empty"));
    }
    Ok(serde_yaml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pair_instance::InstanceType;

    #[test]
    fn parses_a_yaml_spec() {
        let spec = parse_spec(
            r#"
type: Kubernetes
facility: sjc1
setup:
  user: alice
  guests: [bob]
  repos: [alice/project]
  fullname: Alice A
  email: alice@example.com
"#,
        )
        .unwrap();
        assert_eq!(spec.instance_type, Some(InstanceType::Kubernetes));
        assert_eq!(spec.setup.user, "alice");
        assert_eq!(spec.setup.guests, vec!["bob"]);
        assert_eq!(spec.facility, "sjc1");
        assert!(spec.name.is_empty());
    }

    #[test]
    fn parses_a_json_spec() {
        let spec =
            parse_spec(r#"{"name": "alice-1", "nodeSize": "c3.small.x86", "setup": {"user": "alice"}}"#)
                .unwrap();
        assert_eq!(spec.name, "alice-1");
        assert_eq!(spec.node_size, "c3.small.x86");
        assert_eq!(spec.instance_type, None);
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(matches!(parse_spec("  \n"), Err(Error::Validation { .. })));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spec(Path::new("/nonexistent/alice.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/alice.yaml"));
    }
}
