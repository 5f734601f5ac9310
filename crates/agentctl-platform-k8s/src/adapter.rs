use agentctl_core::{
    deployment_status_from_available_replicas, job_status_from_counts, BuildJobSpec, CoreError, Deployment,
    DeploymentSpec, Job, PlatformPort, PodDisruptionBudget, Result, Service, ServiceSpec,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment as K8sDeployment;
use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::Service as K8sService;
use k8s_openapi::api::policy::v1::PodDisruptionBudget as K8sPodDisruptionBudget;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use crate::resources::{self, BuildJobConfig};

pub struct KubernetesPlatform {
    client: Client,
    build_job_config: BuildJobConfig,
    http: reqwest::Client,
}

impl KubernetesPlatform {
    pub async fn connect_in_cluster(build_job_config: BuildJobConfig) -> Result<Self> {
        let client = Client::try_default().await.map_err(|e| CoreError::service(e.to_string()))?;
        Ok(Self { client, build_job_config, http: reqwest::Client::new() })
    }

    pub fn new(client: Client, build_job_config: BuildJobConfig) -> Self {
        Self { client, build_job_config, http: reqwest::Client::new() }
    }

    fn jobs(&self, namespace: &str) -> Api<K8sJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<K8sDeployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<K8sService> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pdbs(&self, namespace: &str) -> Api<K8sPodDisruptionBudget> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// True when a kube error wraps a 409 Conflict, i.e. the object already exists.
fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

fn job_from_k8s(job: K8sJob) -> Job {
    let status = job.status.unwrap_or_default();
    let name = job.metadata.name.unwrap_or_default();
    let namespace = job.metadata.namespace.unwrap_or_default();
    let started_at = status.start_time.map(|t| t.0);
    let completed_at = status.completion_time.map(|t| t.0);
    let domain_status = job_status_from_counts(
        status.succeeded.unwrap_or(0),
        status.failed.unwrap_or(0),
        status.active.unwrap_or(0),
        started_at.is_some(),
    );
    Job { name, namespace, status: domain_status, started_at, completed_at }
}

fn deployment_from_k8s(deployment: K8sDeployment) -> Deployment {
    let status = deployment.status.unwrap_or_default();
    let name = deployment.metadata.name.unwrap_or_default();
    let namespace = deployment.metadata.namespace.unwrap_or_default();
    let domain_status = deployment_status_from_available_replicas(status.available_replicas);
    Deployment { name, namespace, status: domain_status }
}

fn service_from_k8s(service: K8sService) -> Service {
    Service { name: service.metadata.name.unwrap_or_default(), namespace: service.metadata.namespace.unwrap_or_default() }
}

fn pdb_from_k8s(pdb: K8sPodDisruptionBudget) -> PodDisruptionBudget {
    PodDisruptionBudget {
        name: pdb.metadata.name.unwrap_or_default(),
        namespace: pdb.metadata.namespace.unwrap_or_default(),
    }
}

#[async_trait]
impl PlatformPort for KubernetesPlatform {
    async fn create_job(&self, namespace: &str, spec: &BuildJobSpec, overwrite: bool) -> Result<Job> {
        let api = self.jobs(namespace);
        let job = resources::build_job(spec, &self.build_job_config);
        match api.create(&PostParams::default(), &job).await {
            Ok(created) => Ok(job_from_k8s(created)),
            Err(error) if !overwrite && is_conflict(&error) => {
                let existing = api.get(&spec.job_name).await.map_err(|e| CoreError::service(e.to_string()))?;
                Ok(job_from_k8s(existing))
            }
            Err(error) => Err(CoreError::service(format!("creating job {}: {error}", spec.job_name))),
        }
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        match self.jobs(namespace).get_opt(name).await {
            Ok(found) => Ok(found.map(job_from_k8s)),
            Err(error) => Err(CoreError::service(format!("getting job {name}: {error}"))),
        }
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| CoreError::service(format!("deleting job {name}: {e}")))?;
        Ok(())
    }

    async fn create_deployment(&self, namespace: &str, spec: &DeploymentSpec, overwrite: bool) -> Result<Deployment> {
        let api = self.deployments(namespace);
        let deployment = resources::deployment(spec);
        match api.create(&PostParams::default(), &deployment).await {
            Ok(created) => Ok(deployment_from_k8s(created)),
            Err(error) if !overwrite && is_conflict(&error) => {
                let existing = api.get(&spec.name).await.map_err(|e| CoreError::service(e.to_string()))?;
                Ok(deployment_from_k8s(existing))
            }
            Err(error) => Err(CoreError::service(format!("creating deployment {}: {error}", spec.name))),
        }
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        match self.deployments(namespace).get_opt(name).await {
            Ok(found) => Ok(found.map(deployment_from_k8s)),
            Err(error) => Err(CoreError::service(format!("getting deployment {name}: {error}"))),
        }
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        self.deployments(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| CoreError::service(format!("deleting deployment {name}: {e}")))?;
        Ok(())
    }

    async fn create_service(&self, namespace: &str, spec: &ServiceSpec, overwrite: bool) -> Result<Service> {
        let api = self.services(namespace);
        let service = resources::service(spec);
        match api.create(&PostParams::default(), &service).await {
            Ok(created) => Ok(service_from_k8s(created)),
            Err(error) if !overwrite && is_conflict(&error) => {
                let existing = api.get(&spec.name).await.map_err(|e| CoreError::service(e.to_string()))?;
                Ok(service_from_k8s(existing))
            }
            Err(error) => Err(CoreError::service(format!("creating service {}: {error}", spec.name))),
        }
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        match self.services(namespace).get_opt(name).await {
            Ok(found) => Ok(found.map(service_from_k8s)),
            Err(error) => Err(CoreError::service(format!("getting service {name}: {error}"))),
        }
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| CoreError::service(format!("deleting service {name}: {e}")))?;
        Ok(())
    }

    async fn create_pod_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
        min_available: u32,
        overwrite: bool,
    ) -> Result<PodDisruptionBudget> {
        let api = self.pdbs(namespace);
        let pdb = resources::pod_disruption_budget(name, namespace, min_available);
        match api.create(&PostParams::default(), &pdb).await {
            Ok(created) => Ok(pdb_from_k8s(created)),
            Err(error) if !overwrite && is_conflict(&error) => {
                let existing = api.get(name).await.map_err(|e| CoreError::service(e.to_string()))?;
                Ok(pdb_from_k8s(existing))
            }
            Err(error) => Err(CoreError::service(format!("creating pdb {name}: {error}"))),
        }
    }

    async fn delete_pod_disruption_budget(&self, namespace: &str, name: &str) -> Result<()> {
        self.pdbs(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| CoreError::service(format!("deleting pdb {name}: {e}")))?;
        Ok(())
    }

    async fn call_service(
        &self,
        namespace: &str,
        name: &str,
        port: Option<u16>,
        path: &str,
        method: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let port = port.unwrap_or(80);
        let url = format!("http://{name}.{namespace}.svc.cluster.local:{port}/{}", path.trim_start_matches('/'));
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| CoreError::client(format!("invalid HTTP method: {method}")))?;
        let mut request = self.http.request(method, &url);
        if let Some(payload) = payload {
            request = request.json(&payload);
        }
        let response = request.send().await.map_err(|e| CoreError::service(format!("calling {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::service(format!("{url} returned {}", response.status())));
        }
        response.json().await.map_err(|e| CoreError::service(format!("decoding response from {url}: {e}")))
    }
}
