//! Resource template expander
//!
//! Turns one validated [`InstanceSpec`] into the seven documents of its
//! [`ResourceSet`]. Every call builds its documents and command lists from
//! scratch out of `&'static` templates, so nothing is shared between
//! expansions.
//!
//! Three cloud-init commands carry per-instance values and go through a
//! substitution pass (`${...}` syntax). The `{{ .controlPlaneEndpoint }}`
//! and `{{ .apiKey }}` placeholders are filled on the node by the Cluster
//! API controllers and pass through untouched.

use std::collections::BTreeMap;

use pair_common::template::TemplateEngine;
use pair_common::{Error, Result, CLUSTER_NAME_LABEL};
use serde::Serialize;
use serde_json::{json, Value};

use crate::annotations;
use crate::config::InstanceDefaults;
use crate::resources::{
    ResourceDocument, ResourceKind, ResourceSet, BOOTSTRAP_API_VERSION, CONTROL_PLANE_API_VERSION,
    INFRASTRUCTURE_API_VERSION, WORKER_POOL_SUFFIX,
};
use crate::spec::{InstanceSpec, SetupSpec};

/// Label selecting the worker pool's machines
const POOL_LABEL: &str = "pool";

/// Node setup shared by control plane and worker nodes
const NODE_PREPARE_COMMANDS: &[&str] = &[
    r"sed -ri '/\sswap\s/s/^#?/#/' /etc/fstab",
    "swapoff -a",
    "mount -a",
    "apt-get -y update",
    "DEBIAN_FRONTEND=noninteractive apt-get install -y apt-transport-https curl",
    "curl -s https://packages.cloud.google.com/apt/doc/apt-key.gpg | sudo apt-key add -",
    r#"echo "deb https://apt.kubernetes.io/ kubernetes-xenial main" > /etc/apt/sources.list.d/kubernetes.list"#,
    "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo apt-key add -",
    "apt-key fingerprint 0EBFCD88",
    r#"add-apt-repository "deb [arch=amd64] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable""#,
    "apt-get update -y",
    "apt-get install -y ca-certificates socat jq ebtables apt-transport-https cloud-utils prips docker-ce docker-ce-cli containerd.io kubelet kubeadm kubectl",
    "systemctl daemon-reload",
    "systemctl enable docker",
    "systemctl start docker",
    "chgrp users /var/run/docker.sock",
];

/// Audit policy and sink the API server is pointed at
const AUDIT_SETUP_COMMANDS: &[&str] = &[
    "mkdir -p /etc/kubernetes/pki",
    r#"cat <<EOF > /etc/kubernetes/pki/audit-policy.yaml
apiVersion: audit.k8s.io/v1
kind: Policy
rules:
- level: RequestResponse
EOF"#,
    r#"cat <<EOF > /etc/kubernetes/pki/audit-sink.yaml
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: http://10.96.96.96:9900/events
  name: auditsink-cluster
contexts:
- context:
    cluster: auditsink-cluster
    user: ""
  name: auditsink-context
current-context: auditsink-context
users: []
preferences: {}
EOF"#,
];

const CONTROL_PLANE_ENDPOINT_COMMAND: &str = "ping -c 3 -q {{ .controlPlaneEndpoint }} && echo OK || ip addr add {{ .controlPlaneEndpoint }} dev lo";

const KUBECONFIG_SETUP_COMMANDS: &[&str] = &[
    r#"cat <<EOF >> /etc/network/interfaces
auto lo:0
iface lo:0 inet static
  address {{ .controlPlaneEndpoint }}
  netmask 255.255.255.255
EOF
"#,
    "systemctl restart networking",
    "mkdir -p /root/.kube",
    "cp -i /etc/kubernetes/admin.conf /root/.kube/config",
    "export KUBECONFIG=/root/.kube/config",
    "kubectl taint node --all node-role.kubernetes.io/master-",
];

/// Cloud provider credentials; the API key is filled on the node
const CLOUD_CONFIG_SECRET_COMMAND: &str = r#"kubectl create secret generic -n kube-system packet-cloud-config --from-literal=cloud-sa.json='{"apiKey": "{{ .apiKey }}","projectID": "${project_id}", "eipTag": "cluster-api-provider-packet:cluster-id:${name}"}'"#;

const CLUSTER_ADDON_COMMANDS: &[&str] = &[
    "kubectl apply -f https://github.com/packethost/packet-ccm/releases/download/v1.1.0/deployment.yaml",
    "kubectl apply -f https://github.com/packethost/csi-packet/raw/master/deploy/kubernetes/setup.yaml",
    "kubectl apply -f https://github.com/packethost/csi-packet/raw/master/deploy/kubernetes/controller.yaml",
    "kubectl apply -f https://github.com/jetstack/cert-manager/releases/download/v1.0.1/cert-manager.yaml",
    r#"kubectl apply -f "https://cloud.weave.works/k8s/net?k8s-version=$(kubectl version | base64 | tr -d '\n')&env.IPALLOC_RANGE=192.168.0.0/16""#,
    "curl -L https://get.helm.sh/helm-v3.3.0-linux-amd64.tar.gz | tar --directory /usr/local/bin --extract -xz --strip-components 1 linux-amd64/helm",
    r#"(
  helm repo add nginx-ingress https://kubernetes.github.io/ingress-nginx;
  kubectl create ns nginx-ingress;
  helm install nginx-ingress -n nginx-ingress nginx-ingress/ingress-nginx --set controller.service.externalTrafficPolicy=Local --version 2.16.0;
  kubectl wait -n nginx-ingress --for=condition=ready pod --selector=app.kubernetes.io/component=controller --timeout=90s
)
"#,
    r#"kubectl get configmap kube-proxy -n kube-system -o yaml | sed -e "s/strictARP: false/strictARP: true/" | kubectl apply -f - -n kube-system"#,
    r#"cat <<EOF > /root/metallb-system-config.yaml
apiVersion: v1
kind: ConfigMap
metadata:
  namespace: metallb-system
  name: config
data:
  config: |
    address-pools:
      - name: default
        protocol: layer2
        addresses:
          - {{ .controlPlaneEndpoint }}/32
EOF"#,
    r#"(
  kubectl apply -f https://raw.githubusercontent.com/metallb/metallb/v0.9.3/manifests/namespace.yaml;
  kubectl apply -f https://raw.githubusercontent.com/metallb/metallb/v0.9.3/manifests/metallb.yaml;
  kubectl create secret generic -n metallb-system memberlist --from-literal=secretkey="$(openssl rand -base64 128)";
  kubectl apply -f /root/metallb-system-config.yaml
)
"#,
];

/// Installs the interactive-session release `<name>` into namespace `<name>`
const SESSION_WORKLOAD_COMMAND: &str = r#"(
  set -x;
  cd /root;
  git clone https://github.com/humacs/humacs;
  cd humacs;
  kubectl create ns ${name};
  helm install ${name} -n ${name} -f chart/humacs/values/apisnoop.yaml --set options.timezone=${setup.timezone | shell_quote} --set options.gitName=${setup.fullname | shell_quote} --set options.gitEmail=${setup.email | shell_quote} --set options.user=${setup.user | shell_quote} {% for repo in setup.repos %}--set options.repos[${loop.index0}]=${repo | shell_quote} {% endfor %}{% for guest in setup.guests if guest %}--set options.guests[${loop.index0}]=${guest | shell_quote} {% endfor %}chart/humacs
)
"#;

/// Authorizes the user's and every guest's public keys for root
const SSH_IMPORT_COMMAND: &str = "ssh-import-id -o /root/.ssh/authorized_keys gh:${setup.user | shell_quote}{% for guest in setup.guests if guest %} gh:${guest | shell_quote}{% endfor %}";

/// Creates the shared session user; copies root's keys, so runs after the import
const SESSION_USER_COMMAND: &str = r#"(
  mkdir -p /etc/sudoers.d
  echo "%sudo    ALL=(ALL:ALL) NOPASSWD: ALL" > /etc/sudoers.d/sudo
  cp -a /root/.ssh /etc/skel/.ssh
  useradd -m -G users,sudo -u 1000 -s /bin/bash ii
)
"#;

/// Values visible to the substitution pass
#[derive(Serialize)]
struct CommandContext<'a> {
    name: &'a str,
    project_id: &'a str,
    setup: &'a SetupSpec,
}

/// The three command templates that go through the substitution pass
#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandTemplates {
    pub cloud_config_secret: &'static str,
    pub session_workload: &'static str,
    pub ssh_import: &'static str,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            cloud_config_secret: CLOUD_CONFIG_SECRET_COMMAND,
            session_workload: SESSION_WORKLOAD_COMMAND,
            ssh_import: SSH_IMPORT_COMMAND,
        }
    }
}

/// Expands instance specs into resource sets
pub struct TemplateExpander {
    engine: TemplateEngine,
    defaults: InstanceDefaults,
    templates: CommandTemplates,
}

impl TemplateExpander {
    /// Create an expander over the given defaults
    pub fn new(defaults: InstanceDefaults) -> Result<Self> {
        Self::with_templates(defaults, CommandTemplates::default())
    }

    pub(crate) fn with_templates(
        defaults: InstanceDefaults,
        templates: CommandTemplates,
    ) -> Result<Self> {
        Ok(Self {
            engine: TemplateEngine::new()?,
            defaults,
            templates,
        })
    }

    /// Defaults this expander fills in
    pub fn defaults(&self) -> &InstanceDefaults {
        &self.defaults
    }

    /// Build the seven documents for `spec` in `namespace`
    ///
    /// The spec must already be validated and named. Fails with
    /// `Templating` if any command substitution fails; nothing is partially
    /// returned.
    pub fn expand(&self, spec: &InstanceSpec, namespace: &str) -> Result<ResourceSet> {
        let name = spec.name.as_str();
        if name.is_empty() {
            return Err(Error::internal_with_context(
                "expand",
                "instance spec has no name",
            ));
        }

        let ctx = CommandContext {
            name,
            project_id: &self.defaults.project_id,
            setup: &spec.setup,
        };
        let node_size = if spec.node_size.is_empty() {
            self.defaults.node_size.as_str()
        } else {
            spec.node_size.as_str()
        };

        let bag = annotations::encode(spec);
        let labels = instance_labels(name);
        let doc = |kind: ResourceKind, spec: Value| {
            ResourceDocument::new(kind, kind.resource_name(name), namespace)
                .with_labels(labels.clone())
                .with_annotations(bag.clone())
                .with_spec(spec)
        };

        let mut worker_deployment = doc(
            ResourceKind::WorkerMachineDeployment,
            self.machine_deployment_spec(name),
        );
        worker_deployment
            .labels
            .insert(POOL_LABEL.to_string(), WORKER_POOL_SUFFIX.to_string());

        ResourceSet::new(vec![
            doc(ResourceKind::ControlPlane, self.control_plane_spec(&ctx)?),
            doc(
                ResourceKind::ControlPlaneMachineTemplate,
                self.machine_template_spec(node_size),
            ),
            doc(
                ResourceKind::InfraCluster,
                json!({
                    "projectID": self.defaults.project_id,
                    "facility": spec.facility,
                }),
            ),
            doc(ResourceKind::Cluster, self.cluster_spec(name)),
            worker_deployment,
            doc(
                ResourceKind::WorkerBootstrapConfigTemplate,
                json!({
                    "template": {
                        "spec": {
                            "preKubeadmCommands": owned(NODE_PREPARE_COMMANDS),
                            "joinConfiguration": external_cloud_registration(),
                        }
                    }
                }),
            ),
            doc(
                ResourceKind::WorkerMachineTemplate,
                self.machine_template_spec(node_size),
            ),
        ])
    }

    fn control_plane_spec(&self, ctx: &CommandContext<'_>) -> Result<Value> {
        let mut pre = owned(AUDIT_SETUP_COMMANDS);
        pre.extend(owned(NODE_PREPARE_COMMANDS));
        pre.push(CONTROL_PLANE_ENDPOINT_COMMAND.to_string());

        let mut post = owned(KUBECONFIG_SETUP_COMMANDS);
        let templates = &self.templates;
        post.push(self.render_command("cloud-config secret", templates.cloud_config_secret, ctx)?);
        post.extend(owned(CLUSTER_ADDON_COMMANDS));
        post.push(self.render_command("session workload", templates.session_workload, ctx)?);
        post.push(self.render_command("ssh key import", templates.ssh_import, ctx)?);
        post.push(SESSION_USER_COMMAND.to_string());

        Ok(json!({
            "version": self.defaults.versioned_kubernetes(),
            "replicas": 1,
            "infrastructureTemplate": {
                "apiVersion": INFRASTRUCTURE_API_VERSION,
                "kind": ResourceKind::ControlPlaneMachineTemplate.kind(),
                "name": ResourceKind::ControlPlaneMachineTemplate.resource_name(ctx.name),
            },
            "kubeadmConfigSpec": {
                "initConfiguration": external_cloud_registration(),
                "clusterConfiguration": {
                    "apiServer": {
                        "extraArgs": {
                            "cloud-provider": "external",
                            "audit-policy-file": "/etc/kubernetes/pki/audit-policy.yaml",
                            "audit-log-path": "-",
                            "audit-webhook-config-file": "/etc/kubernetes/pki/audit-sink.yaml",
                            "v": "99",
                        }
                    },
                    "controllerManager": {
                        "extraArgs": {"cloud-provider": "external"}
                    },
                },
                "joinConfiguration": external_cloud_registration(),
                "preKubeadmCommands": pre,
                "postKubeadmCommands": post,
            }
        }))
    }

    fn machine_template_spec(&self, node_size: &str) -> Value {
        json!({
            "template": {
                "spec": {
                    "OS": self.defaults.machine_os,
                    "billingCycle": self.defaults.billing_cycle,
                    "machineType": node_size,
                }
            }
        })
    }

    fn cluster_spec(&self, name: &str) -> Value {
        json!({
            "clusterNetwork": {
                "pods": {"cidrBlocks": [self.defaults.pod_cidr]},
                "services": {"cidrBlocks": [self.defaults.service_cidr]},
            },
            "infrastructureRef": {
                "apiVersion": INFRASTRUCTURE_API_VERSION,
                "kind": ResourceKind::InfraCluster.kind(),
                "name": ResourceKind::InfraCluster.resource_name(name),
            },
            "controlPlaneRef": {
                "apiVersion": CONTROL_PLANE_API_VERSION,
                "kind": ResourceKind::ControlPlane.kind(),
                "name": ResourceKind::ControlPlane.resource_name(name),
            },
        })
    }

    fn machine_deployment_spec(&self, name: &str) -> Value {
        let mut pool_labels = instance_labels(name);
        pool_labels.insert(POOL_LABEL.to_string(), WORKER_POOL_SUFFIX.to_string());

        json!({
            "clusterName": name,
            "replicas": self.defaults.worker_replicas,
            "selector": {
                "matchLabels": {
                    POOL_LABEL: WORKER_POOL_SUFFIX,
                    CLUSTER_NAME_LABEL: name,
                }
            },
            "template": {
                "metadata": {"labels": pool_labels},
                "spec": {
                    "version": self.defaults.versioned_kubernetes(),
                    "clusterName": name,
                    "bootstrap": {
                        "configRef": {
                            "apiVersion": BOOTSTRAP_API_VERSION,
                            "kind": ResourceKind::WorkerBootstrapConfigTemplate.kind(),
                            "name": ResourceKind::WorkerBootstrapConfigTemplate.resource_name(name),
                        }
                    },
                    "infrastructureRef": {
                        "apiVersion": INFRASTRUCTURE_API_VERSION,
                        "kind": ResourceKind::WorkerMachineTemplate.kind(),
                        "name": ResourceKind::WorkerMachineTemplate.resource_name(name),
                    },
                }
            }
        })
    }

    fn render_command(
        &self,
        label: &str,
        template: &str,
        ctx: &CommandContext<'_>,
    ) -> Result<String> {
        self.engine
            .render(template, ctx)
            .map_err(|e| Error::templating(format!("{} command: {}", label, e)))
    }
}

/// Ownership plus cluster-name labels shared by every document
fn instance_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = annotations::ownership_labels();
    labels.insert(CLUSTER_NAME_LABEL.to_string(), name.to_string());
    labels
}

fn external_cloud_registration() -> Value {
    json!({"nodeRegistration": {"kubeletExtraArgs": {"cloud-provider": "external"}}})
}

fn owned(commands: &[&str]) -> Vec<String> {
    commands.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::CREATE_ORDER;
    use crate::spec::InstanceType;

    fn alice() -> InstanceSpec {
        InstanceSpec {
            name: "alice-1a2b3c4d".to_string(),
            instance_type: Some(InstanceType::Kubernetes),
            node_size: String::new(),
            facility: "sjc1".to_string(),
            setup: SetupSpec {
                user: "alice".to_string(),
                guests: vec!["bob".to_string()],
                repos: vec![
                    "https://github.com/alice/project".to_string(),
                    "https://github.com/alice/dotfiles".to_string(),
                ],
                timezone: "UTC".to_string(),
                fullname: "Alice A".to_string(),
                email: "alice@example.com".to_string(),
            },
        }
    }

    fn expander() -> TemplateExpander {
        let defaults = InstanceDefaults {
            project_id: "proj-42".to_string(),
            ..Default::default()
        };
        TemplateExpander::new(defaults).unwrap()
    }

    fn commands(set: &ResourceSet, key: &str) -> Vec<String> {
        let cp = set.get(ResourceKind::ControlPlane).unwrap();
        serde_json::from_value(cp.spec["kubeadmConfigSpec"][key].clone()).unwrap()
    }

    #[test]
    fn every_document_is_owned_and_carries_the_same_bag() {
        let spec = alice();
        let set = expander().expand(&spec, "pairs").unwrap();
        assert_eq!(set.len(), 7);

        let bag = annotations::encode(&spec);
        for kind in CREATE_ORDER {
            let doc = set.get(kind).unwrap();
            assert_eq!(doc.name, kind.resource_name(&spec.name));
            assert_eq!(doc.namespace, "pairs");
            assert!(doc.is_owned(), "{kind:?} is not owned");
            assert_eq!(doc.labels[CLUSTER_NAME_LABEL], spec.name);
            assert_eq!(doc.annotations, bag, "{kind:?} has a different bag");
        }
        assert_eq!(
            set.get(ResourceKind::WorkerMachineDeployment).unwrap().labels[POOL_LABEL],
            "worker-a"
        );
    }

    #[test]
    fn cross_references_point_at_derived_names() {
        let set = expander().expand(&alice(), "pairs").unwrap();

        let cluster = &set.get(ResourceKind::Cluster).unwrap().spec;
        assert_eq!(cluster["controlPlaneRef"]["name"], "alice-1a2b3c4d-control-plane");
        assert_eq!(cluster["controlPlaneRef"]["kind"], "KubeadmControlPlane");
        assert_eq!(cluster["infrastructureRef"]["name"], "alice-1a2b3c4d");
        assert_eq!(cluster["clusterNetwork"]["pods"]["cidrBlocks"][0], "10.244.0.0/16");

        let cp = &set.get(ResourceKind::ControlPlane).unwrap().spec;
        assert_eq!(cp["infrastructureTemplate"]["name"], "alice-1a2b3c4d-control-plane");
        assert_eq!(cp["version"], "v1.19.0");
        assert_eq!(cp["replicas"], 1);

        let md = &set.get(ResourceKind::WorkerMachineDeployment).unwrap().spec;
        assert_eq!(md["clusterName"], "alice-1a2b3c4d");
        assert_eq!(md["replicas"], 0);
        assert_eq!(md["selector"]["matchLabels"][CLUSTER_NAME_LABEL], "alice-1a2b3c4d");
        assert_eq!(
            md["template"]["spec"]["bootstrap"]["configRef"]["name"],
            "alice-1a2b3c4d-worker-a"
        );
        assert_eq!(
            md["template"]["spec"]["infrastructureRef"]["name"],
            "alice-1a2b3c4d-worker-a"
        );
        assert_eq!(md["template"]["metadata"]["labels"][POOL_LABEL], "worker-a");
    }

    #[test]
    fn machine_templates_fall_back_to_default_node_size() {
        let set = expander().expand(&alice(), "pairs").unwrap();
        for kind in [
            ResourceKind::ControlPlaneMachineTemplate,
            ResourceKind::WorkerMachineTemplate,
        ] {
            let spec = &set.get(kind).unwrap().spec["template"]["spec"];
            assert_eq!(spec["machineType"], "c1.small.x86");
            assert_eq!(spec["OS"], "ubuntu_20_04");
            assert_eq!(spec["billingCycle"], "hourly");
        }

        let mut spec = alice();
        spec.node_size = "c3.medium.x86".to_string();
        let set = expander().expand(&spec, "pairs").unwrap();
        assert_eq!(
            set.get(ResourceKind::WorkerMachineTemplate).unwrap().spec["template"]["spec"]
                ["machineType"],
            "c3.medium.x86"
        );
    }

    #[test]
    fn infra_cluster_carries_project_and_facility() {
        let set = expander().expand(&alice(), "pairs").unwrap();
        let infra = &set.get(ResourceKind::InfraCluster).unwrap().spec;
        assert_eq!(infra["projectID"], "proj-42");
        assert_eq!(infra["facility"], "sjc1");
    }

    #[test]
    fn secret_command_leaves_api_key_for_the_node() {
        let post = commands(&expander().expand(&alice(), "pairs").unwrap(), "postKubeadmCommands");
        let secret = post
            .iter()
            .find(|c| c.contains("packet-cloud-config"))
            .unwrap();
        assert!(secret.contains(r#""apiKey": "{{ .apiKey }}""#));
        assert!(secret.contains(r#""projectID": "proj-42""#));
        assert!(secret.contains("cluster-api-provider-packet:cluster-id:alice-1a2b3c4d"));
    }

    #[test]
    fn endpoint_placeholders_pass_through() {
        let set = expander().expand(&alice(), "pairs").unwrap();
        let pre = commands(&set, "preKubeadmCommands");
        assert!(pre
            .last()
            .unwrap()
            .contains("ip addr add {{ .controlPlaneEndpoint }} dev lo"));
        let post = commands(&set, "postKubeadmCommands");
        assert!(post[0].contains("address {{ .controlPlaneEndpoint }}"));
    }

    #[test]
    fn workload_command_receives_the_setup_block() {
        let post = commands(&expander().expand(&alice(), "pairs").unwrap(), "postKubeadmCommands");
        let install = post.iter().find(|c| c.contains("helm install alice-1a2b3c4d")).unwrap();
        assert!(install.contains("kubectl create ns alice-1a2b3c4d;"));
        assert!(install.contains("-n alice-1a2b3c4d"));
        assert!(install.contains("--set options.timezone='UTC'"));
        assert!(install.contains("--set options.gitName='Alice A'"));
        assert!(install.contains("--set options.gitEmail='alice@example.com'"));
        assert!(install.contains("--set options.repos[0]='https://github.com/alice/project'"));
        assert!(install.contains("--set options.repos[1]='https://github.com/alice/dotfiles'"));
        assert!(install.contains("--set options.guests[0]='bob'"));
        assert!(install.contains("chart/humacs\n)"));
    }

    #[test]
    fn ssh_import_covers_user_and_guests_before_user_creation() {
        let mut spec = alice();
        spec.setup.guests = vec!["bob".to_string(), String::new(), "carol".to_string()];
        let post = commands(&expander().expand(&spec, "pairs").unwrap(), "postKubeadmCommands");

        let import = post.iter().position(|c| c.starts_with("ssh-import-id")).unwrap();
        assert_eq!(
            post[import],
            "ssh-import-id -o /root/.ssh/authorized_keys gh:'alice' gh:'bob' gh:'carol'"
        );
        let useradd = post.iter().position(|c| c.contains("useradd")).unwrap();
        assert_eq!(useradd, import + 1);
    }

    #[test]
    fn quoting_survives_hostile_full_names() {
        let mut spec = alice();
        spec.setup.fullname = "Alice O'Brien; rm -rf /".to_string();
        let post = commands(&expander().expand(&spec, "pairs").unwrap(), "postKubeadmCommands");
        let install = post.iter().find(|c| c.contains("helm install")).unwrap();
        assert!(install.contains(r"--set options.gitName='Alice O'\''Brien; rm -rf /'"));
    }

    #[test]
    fn expansions_do_not_leak_into_each_other() {
        // Two back-to-back expansions must not see each other's values.
        let expander = expander();
        let first = expander.expand(&alice(), "pairs").unwrap();

        let mut bob = alice();
        bob.name = "bob-99999999".to_string();
        bob.setup.user = "bob".to_string();
        bob.setup.guests.clear();
        let second = expander.expand(&bob, "pairs").unwrap();

        let first_post = commands(&first, "postKubeadmCommands");
        let second_post = commands(&second, "postKubeadmCommands");
        assert_eq!(first_post.len(), second_post.len());
        assert!(first_post.iter().all(|c| !c.contains("bob-99999999")));
        assert!(second_post.iter().all(|c| !c.contains("alice-1a2b3c4d")));
        assert!(second_post.contains(&"ssh-import-id -o /root/.ssh/authorized_keys gh:'bob'".to_string()));

        let again = expander.expand(&alice(), "pairs").unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn worker_bootstrap_uses_node_prepare_commands() {
        let set = expander().expand(&alice(), "pairs").unwrap();
        let kct = &set.get(ResourceKind::WorkerBootstrapConfigTemplate).unwrap().spec;
        let pre: Vec<String> =
            serde_json::from_value(kct["template"]["spec"]["preKubeadmCommands"].clone()).unwrap();
        assert_eq!(pre, owned(NODE_PREPARE_COMMANDS));
        assert_eq!(
            kct["template"]["spec"]["joinConfiguration"]["nodeRegistration"]["kubeletExtraArgs"]
                ["cloud-provider"],
            "external"
        );
    }

    #[test]
    fn unnamed_spec_is_rejected() {
        let mut spec = alice();
        spec.name.clear();
        assert!(matches!(
            expander().expand(&spec, "pairs"),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn substitution_failure_is_a_templating_error() {
        let spec = alice();
        let expander = expander();
        let ctx = CommandContext {
            name: &spec.name,
            project_id: "p",
            setup: &spec.setup,
        };
        let err = expander
            .render_command("broken", "echo ${setup.nickname}", &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Templating { .. }));
        assert!(err.to_string().contains("broken command"));
    }

    #[test]
    fn broken_template_fails_the_whole_expansion() {
        let templates = CommandTemplates {
            ssh_import: "ssh-import-id gh:${setup.nickname}",
            ..Default::default()
        };
        let expander = TemplateExpander::with_templates(InstanceDefaults::default(), templates)
            .unwrap();
        let err = expander.expand(&alice(), "pairs").unwrap_err();
        assert!(matches!(err, Error::Templating { .. }));
        assert!(err.to_string().contains("ssh key import command"));
    }
}
