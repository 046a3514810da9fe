//! Service targets validated by the harness.
//!
//! Each target is an externally-owned HTTP endpoint. The order of
//! [`TargetKind::DEPLOYMENT_ORDER`] is the order in which the services must be
//! deployed: the AWS edge and its dependents first, then the application
//! services, each of which relies on state created by the ones before it.

use crate::profile::{Environment, EnvironmentProfile, TargetEndpoint};
use std::fmt;

/// Identity of a service target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    /// AWS API edge (the emulation layer on `local`).
    AwsEdge,
    SearchIndex,
    RelationalStore,
    Knox,
    Alchemy,
    Heimdall,
    TaxEngine,
}

/// What a health response must look like for a target to count as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessExpectation {
    /// Any 2xx status.
    SuccessStatus,
    /// 2xx status and a JSON object body containing the key.
    JsonKey(&'static str),
    /// 2xx status and a JSON body whose `status` field is not `red`.
    ClusterStatusNotRed,
}

impl TargetKind {
    /// Required deployment order. Never reordered.
    pub const DEPLOYMENT_ORDER: [TargetKind; 7] = [
        TargetKind::AwsEdge,
        TargetKind::SearchIndex,
        TargetKind::RelationalStore,
        TargetKind::Knox,
        TargetKind::Alchemy,
        TargetKind::Heimdall,
        TargetKind::TaxEngine,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetKind::AwsEdge => "aws_edge",
            TargetKind::SearchIndex => "search_index",
            TargetKind::RelationalStore => "relational_store",
            TargetKind::Knox => "knox",
            TargetKind::Alchemy => "alchemy",
            TargetKind::Heimdall => "heimdall",
            TargetKind::TaxEngine => "tax_engine",
        }
    }

    /// Variable holding the target's base URL. `None` for the edge, which uses
    /// the profile base URL.
    pub fn endpoint_var(&self) -> Option<&'static str> {
        match self {
            TargetKind::AwsEdge => None,
            TargetKind::SearchIndex => Some("SEARCH_INDEX_ENDPOINT"),
            TargetKind::RelationalStore => Some("RELATIONAL_STORE_ENDPOINT"),
            TargetKind::Knox => Some("KNOX_ENDPOINT"),
            TargetKind::Alchemy => Some("ALCHEMY_ENDPOINT"),
            TargetKind::Heimdall => Some("HEIMDALL_ENDPOINT"),
            TargetKind::TaxEngine => Some("TAX_ENGINE_ENDPOINT"),
        }
    }

    /// Variable overriding the target's health path.
    pub fn health_path_var(&self) -> &'static str {
        match self {
            TargetKind::AwsEdge => "AWS_EDGE_HEALTH_PATH",
            TargetKind::SearchIndex => "SEARCH_INDEX_HEALTH_PATH",
            TargetKind::RelationalStore => "RELATIONAL_STORE_HEALTH_PATH",
            TargetKind::Knox => "KNOX_HEALTH_PATH",
            TargetKind::Alchemy => "ALCHEMY_HEALTH_PATH",
            TargetKind::Heimdall => "HEIMDALL_HEALTH_PATH",
            TargetKind::TaxEngine => "TAX_ENGINE_HEALTH_PATH",
        }
    }

    /// Endpoint used on `local` when the variable is absent (compose port map).
    pub fn default_local_endpoint(&self) -> &'static str {
        match self {
            TargetKind::AwsEdge => crate::profile::DEFAULT_LOCAL_BASE_URL,
            TargetKind::SearchIndex => "http://localhost:9200",
            TargetKind::RelationalStore => "http://localhost:8008",
            TargetKind::Knox => "http://localhost:8000",
            TargetKind::Alchemy => "http://localhost:8001",
            TargetKind::Heimdall => "http://localhost:8002",
            TargetKind::TaxEngine => "http://localhost:8003",
        }
    }

    /// Health path used when `<TARGET>_HEALTH_PATH` is absent.
    ///
    /// Only the local emulation layer exposes `/_localstack/health`; a real
    /// regional endpoint is probed at its root.
    pub fn default_health_path(&self, environment: Environment) -> &'static str {
        match self {
            TargetKind::AwsEdge if environment == Environment::Local => "/_localstack/health",
            TargetKind::AwsEdge => "/",
            TargetKind::SearchIndex => "/_cluster/health",
            TargetKind::RelationalStore => "/health",
            TargetKind::Knox => "/v1/health",
            TargetKind::Alchemy => "/v1/health",
            TargetKind::Heimdall => "/api/v1/health",
            TargetKind::TaxEngine => "/health",
        }
    }

    pub fn expectation(&self, environment: Environment) -> ReadinessExpectation {
        match self {
            TargetKind::AwsEdge if environment == Environment::Local => {
                ReadinessExpectation::JsonKey("services")
            }
            TargetKind::SearchIndex => ReadinessExpectation::ClusterStatusNotRed,
            _ => ReadinessExpectation::SuccessStatus,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A service target resolved against one environment profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub kind: TargetKind,
    pub endpoint: TargetEndpoint,
    pub expectation: ReadinessExpectation,
}

impl ServiceTarget {
    /// Resolve one target from the profile.
    pub fn resolve(profile: &EnvironmentProfile, kind: TargetKind) -> Option<Self> {
        profile.target(kind).map(|endpoint| Self {
            kind,
            endpoint: endpoint.clone(),
            expectation: kind.expectation(profile.environment()),
        })
    }

    /// All targets of the profile, in deployment order.
    pub fn deployment_order(profile: &EnvironmentProfile) -> Vec<Self> {
        TargetKind::DEPLOYMENT_ORDER
            .iter()
            .filter_map(|kind| Self::resolve(profile, *kind))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn health_url(&self) -> String {
        self.endpoint.health_url()
    }
}
