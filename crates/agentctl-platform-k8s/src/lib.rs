//! Kubernetes-backed `PlatformPort`: Job/Deployment/Service/PodDisruptionBudget
//! CRUD plus HTTP calls into an agent's Service, built on kube-rs.

pub mod adapter;
pub mod resources;

pub use adapter::KubernetesPlatform;
pub use resources::BuildJobConfig;
