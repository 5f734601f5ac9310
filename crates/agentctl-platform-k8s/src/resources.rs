//! Pure builders: domain specs in, Kubernetes API objects out. Kept free of
//! any client so they can be exercised without a cluster.

use std::collections::BTreeMap;

use agentctl_core::{BuildJobSpec, DeploymentSpec, ServiceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec as K8sDeploymentSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ExecAction, Lifecycle, LifecycleHandler, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, SecretVolumeSource, Service as K8sService, ServicePort, ServiceSpec as K8sServiceSpec,
    Volume, VolumeMount,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;

const KANIKO_EXECUTOR_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";

/// Shared configuration for every build Job: where the tar-context PVC and
/// the registry credentials secret live. Both are provisioned once, outside
/// this crate, and referenced by name here.
#[derive(Debug, Clone)]
pub struct BuildJobConfig {
    pub build_context_pvc_name: String,
    pub build_registry_secret_name: String,
    pub build_contexts_mount_path: String,
}

/// A Kaniko Job that builds `spec.tar_path` and pushes to
/// `spec.destination_image`, then deletes the tar via a pre-stop hook.
pub fn build_job(spec: &BuildJobSpec, config: &BuildJobConfig) -> Job {
    let labels = BTreeMap::from([("app".to_string(), spec.job_name.clone())]);

    Job {
        metadata: ObjectMeta {
            name: Some(spec.job_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "kaniko".to_string(),
                        image: Some(KANIKO_EXECUTOR_IMAGE.to_string()),
                        args: Some(vec![
                            format!("--context=tar://{}", spec.tar_path),
                            "--dockerfile=Dockerfile".to_string(),
                            format!("--destination={}", spec.destination_image),
                        ]),
                        env: Some(vec![EnvVar {
                            name: "DOCKER_CONFIG".to_string(),
                            value: Some("/kaniko/.docker".to_string()),
                            ..Default::default()
                        }]),
                        lifecycle: Some(Lifecycle {
                            pre_stop: Some(LifecycleHandler {
                                exec: Some(ExecAction {
                                    command: Some(vec![
                                        "sh".to_string(),
                                        "-c".to_string(),
                                        format!("rm -f {}", spec.tar_path),
                                    ]),
                                }),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "build-context".to_string(),
                                mount_path: config.build_contexts_mount_path.clone(),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "registry-credentials".to_string(),
                                mount_path: "/kaniko/.docker".to_string(),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: "build-context".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: config.build_context_pvc_name.clone(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "registry-credentials".to_string(),
                            secret: Some(SecretVolumeSource {
                                secret_name: Some(config.build_registry_secret_name.clone()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A single-container Deployment exposing `spec.container_port`.
pub fn deployment(spec: &DeploymentSpec) -> Deployment {
    let labels = BTreeMap::from([("app".to_string(), spec.name.clone())]);

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(K8sDeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: spec.name.clone(),
                        image: Some(spec.image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: spec.container_port as i32,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// A ClusterIP Service routing `service_port` to the Deployment's
/// `container_port`, selecting pods by `app: {name}`.
pub fn service(spec: &ServiceSpec) -> K8sService {
    K8sService {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            selector: Some(BTreeMap::from([("app".to_string(), spec.name.clone())])),
            ports: Some(vec![ServicePort {
                port: spec.service_port as i32,
                target_port: Some(IntOrString::Int(spec.container_port as i32)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// A PodDisruptionBudget guarding `min_available` replicas of `app: {name}`.
pub fn pod_disruption_budget(name: &str, namespace: &str, min_available: u32) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available as i32)),
            selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_config() -> BuildJobConfig {
        BuildJobConfig {
            build_context_pvc_name: "build-contexts".to_string(),
            build_registry_secret_name: "registry-creds".to_string(),
            build_contexts_mount_path: "/workspace/contexts".to_string(),
        }
    }

    #[test]
    fn build_job_sets_kaniko_args() {
        let spec = BuildJobSpec {
            job_name: "build-myagent-v1-abcd1234".to_string(),
            namespace: "agents".to_string(),
            tar_path: "/workspace/contexts/myagent.tar".to_string(),
            destination_image: "registry.internal/myagent:v1".to_string(),
        };
        let job = build_job(&spec, &build_config());
        assert_eq!(job.metadata.name.as_deref(), Some("build-myagent-v1-abcd1234"));
        let container = &job.spec.unwrap().template.spec.unwrap().containers[0];
        let args = container.args.as_ref().unwrap();
        assert!(args.contains(&"--context=tar:///workspace/contexts/myagent.tar".to_string()));
        assert!(args.contains(&"--destination=registry.internal/myagent:v1".to_string()));
        assert_eq!(container.image.as_deref(), Some(KANIKO_EXECUTOR_IMAGE));
    }

    #[test]
    fn build_job_restart_policy_is_never() {
        let spec = BuildJobSpec {
            job_name: "build-x-v1-1".to_string(),
            namespace: "ns".to_string(),
            tar_path: "/t.tar".to_string(),
            destination_image: "reg/x:v1".to_string(),
        };
        let job = build_job(&spec, &build_config());
        assert_eq!(job.spec.unwrap().template.spec.unwrap().restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn deployment_exposes_container_port() {
        let spec = DeploymentSpec::new("myagent", "agents", "registry.internal/myagent:v1");
        let deploy = deployment(&spec);
        let pod_spec = deploy.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.containers[0].ports.as_ref().unwrap()[0].container_port, 8000);
    }

    #[test]
    fn service_targets_container_port() {
        let spec = ServiceSpec::new("myagent", "agents");
        let svc = service(&spec);
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8000)));
    }

    #[test]
    fn pdb_guards_named_selector() {
        let pdb = pod_disruption_budget("myagent", "agents", 1);
        let selector = pdb.spec.unwrap().selector.unwrap();
        assert_eq!(selector.match_labels.unwrap().get("app"), Some(&"myagent".to_string()));
    }
}
