//! Workload profiles: named templates combining an operations mix with a
//! load shape and the optional phased controllers.

use serde::{Deserialize, Serialize};

use crate::shapes::LoadShape;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The MCP operations the driver can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "tools/list")]
    ToolsList,
    #[serde(rename = "tools/call")]
    ToolsCall,
    #[serde(rename = "resources/list")]
    ResourcesList,
    #[serde(rename = "resources/read")]
    ResourcesRead,
    #[serde(rename = "resources/templates/list")]
    ResourcesTemplatesList,
    #[serde(rename = "prompts/list")]
    PromptsList,
    #[serde(rename = "prompts/get")]
    PromptsGet,
    /// Only used by the connection-churn controller to account handshakes.
    #[serde(rename = "initialize")]
    Initialize,
}

impl OpKind {
    /// The JSON-RPC method name, without per-tool specialisation.
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::ResourcesTemplatesList => "resources/templates/list",
            Self::PromptsList => "prompts/list",
            Self::PromptsGet => "prompts/get",
            Self::Initialize => "initialize",
        }
    }
}

/// One weighted entry in a profile's operations mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMix {
    pub op: OpKind,
    /// Pin `tools/call` to a single tool; `None` round-robins over
    /// discovered tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl OperationMix {
    pub fn new(op: OpKind, weight: u32) -> Self {
        Self {
            op,
            tool: None,
            weight,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Find-ceiling configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the auto-scaling ceiling finder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindCeilingConfig {
    #[serde(default = "default_phase_duration")]
    pub phase_duration_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    /// Minimum relative rps gain that still counts as progress.
    #[serde(default = "default_plateau_threshold")]
    pub plateau_threshold: f64,
}

fn default_phase_duration() -> u64 {
    10
}

fn default_max_concurrency() -> u32 {
    100
}

fn default_plateau_threshold() -> f64 {
    0.05
}

impl Default for FindCeilingConfig {
    fn default() -> Self {
        Self {
            phase_duration_secs: default_phase_duration(),
            max_concurrency: default_max_concurrency(),
            plateau_threshold: default_plateau_threshold(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profiles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named workload template. CLI flags override individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadProfile {
    pub name: String,
    pub description: String,
    pub operations: Vec<OperationMix>,
    #[serde(default)]
    pub shape: LoadShape,
    #[serde(default = "default_duration")]
    pub duration_secs: u64,
    /// Request cap; the run stops at whichever of duration/requests hits
    /// first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_ceiling: Option<FindCeilingConfig>,
    #[serde(default)]
    pub connection_churn: bool,
}

fn default_duration() -> u64 {
    30
}

fn default_concurrency() -> u32 {
    10
}

impl WorkloadProfile {
    fn base(name: &str, description: &str, operations: Vec<OperationMix>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            operations,
            shape: LoadShape::Constant,
            duration_secs: default_duration(),
            requests: None,
            concurrency: default_concurrency(),
            find_ceiling: None,
            connection_churn: false,
        }
    }
}

/// All built-in profiles, in listing order.
pub fn builtin_profiles() -> Vec<WorkloadProfile> {
    vec![
        WorkloadProfile::base(
            "baseline",
            "ping only, constant concurrency",
            vec![OperationMix::new(OpKind::Ping, 1)],
        ),
        {
            let mut p = WorkloadProfile::base(
                "mixed",
                "ping, tools/list and tools/call under a linear ramp",
                vec![
                    OperationMix::new(OpKind::Ping, 2),
                    OperationMix::new(OpKind::ToolsList, 1),
                    OperationMix::new(OpKind::ToolsCall, 2),
                ],
            );
            p.shape = LoadShape::LinearRamp;
            p
        },
        WorkloadProfile::base(
            "tools",
            "tools/call only, constant concurrency",
            vec![OperationMix::new(OpKind::ToolsCall, 1)],
        ),
        {
            let mut p = WorkloadProfile::base(
                "discovery",
                "capability listings under a step shape",
                vec![
                    OperationMix::new(OpKind::ToolsList, 2),
                    OperationMix::new(OpKind::ResourcesList, 1),
                    OperationMix::new(OpKind::ResourcesTemplatesList, 1),
                    OperationMix::new(OpKind::PromptsList, 1),
                ],
            );
            p.shape = LoadShape::Step;
            p
        },
        {
            let mut p = WorkloadProfile::base(
                "soak",
                "mixed operations at constant concurrency for five minutes",
                vec![
                    OperationMix::new(OpKind::Ping, 1),
                    OperationMix::new(OpKind::ToolsList, 1),
                    OperationMix::new(OpKind::ToolsCall, 1),
                ],
            );
            p.duration_secs = 300;
            p
        },
        {
            let mut p = WorkloadProfile::base(
                "spike-test",
                "mixed operations with a central full-peak spike",
                vec![
                    OperationMix::new(OpKind::Ping, 1),
                    OperationMix::new(OpKind::ToolsCall, 1),
                ],
            );
            p.shape = LoadShape::Spike;
            p
        },
        {
            let mut p = WorkloadProfile::base(
                "find-ceiling",
                "step concurrency upward until throughput plateaus",
                vec![OperationMix::new(OpKind::Ping, 1)],
            );
            p.duration_secs = 60;
            p.find_ceiling = Some(FindCeilingConfig::default());
            p
        },
        {
            let mut p = WorkloadProfile::base(
                "connection-churn",
                "open, handshake, ping and close fresh sessions in a loop",
                vec![OperationMix::new(OpKind::Ping, 1)],
            );
            p.connection_churn = true;
            p
        },
    ]
}

/// Look up a built-in profile by name.
pub fn find_profile(name: &str) -> Option<WorkloadProfile> {
    builtin_profiles().into_iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        let profiles = builtin_profiles();
        let mut names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), profiles.len());
    }

    #[test]
    fn find_profile_hits_and_misses() {
        assert!(find_profile("baseline").is_some());
        assert!(find_profile("find-ceiling")
            .unwrap()
            .find_ceiling
            .is_some());
        assert!(find_profile("connection-churn").unwrap().connection_churn);
        assert!(find_profile("nope").is_none());
    }

    #[test]
    fn op_kind_serialises_as_method_name() {
        let json = serde_json::to_string(&OpKind::ToolsCall).unwrap();
        assert_eq!(json, "\"tools/call\"");
        let back: OpKind = serde_json::from_str("\"resources/templates/list\"").unwrap();
        assert_eq!(back, OpKind::ResourcesTemplatesList);
    }

    #[test]
    fn every_profile_has_operations() {
        for p in builtin_profiles() {
            assert!(!p.operations.is_empty(), "{} has no operations", p.name);
            assert!(p.operations.iter().all(|m| m.weight >= 1));
        }
    }
}
