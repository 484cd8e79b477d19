use serde::{Deserialize, Serialize};

// ── Helper defaults for serde ──

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

fn is_false(v: &bool) -> bool {
    !v
}

// ── Top-level DTO ──

/// Authoring form of one process, as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDto {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub edges: Vec<EdgeDto>,
}

// ── Edge ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDto {
    /// Defaults to `{from}->{to}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    /// Expression, e.g. `=amount > 100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
}

impl EdgeDto {
    pub fn flow_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.from, self.to))
    }
}

// ── Activity extras ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDto {
    /// Expression evaluated in the element's scope.
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiInstanceDto {
    pub input_collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_condition: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sequential: bool,
}

/// Fields shared by every activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDto {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<MappingDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<MappingDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_instance: Option<MultiInstanceDto>,
    /// Id of the activity that compensates this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_handler: Option<String>,
}

// ── Node (tagged enum) ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeDto {
    StartEvent {
        id: String,
    },
    MessageStartEvent {
        id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        output: Vec<MappingDto>,
    },
    EndEvent {
        id: String,
    },
    ServiceTask {
        id: String,
        job_type: String,
        #[serde(default = "default_retries")]
        retries: u32,
        #[serde(flatten)]
        activity: ActivityDto,
    },
    UserTask {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidate_groups: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form_key: Option<String>,
        #[serde(flatten)]
        activity: ActivityDto,
    },
    ReceiveTask {
        id: String,
        message: String,
        correlation_key: String,
        #[serde(flatten)]
        activity: ActivityDto,
    },
    BusinessRuleTask {
        id: String,
        decision_id: String,
        result_variable: String,
        #[serde(flatten)]
        activity: ActivityDto,
    },
    ExclusiveGateway {
        id: String,
    },
    ParallelGateway {
        id: String,
    },
    MessageCatchEvent {
        id: String,
        message: String,
        correlation_key: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        output: Vec<MappingDto>,
    },
    SignalCatchEvent {
        id: String,
        signal: String,
    },
    SignalThrowEvent {
        id: String,
        signal: String,
    },
    LinkThrowEvent {
        id: String,
        link: String,
    },
    LinkCatchEvent {
        id: String,
        link: String,
    },
    CompensationThrowEvent {
        id: String,
        /// Compensate only this activity; all completed activities otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        activity: Option<String>,
    },
    MessageBoundaryEvent {
        id: String,
        attached_to: String,
        message: String,
        correlation_key: String,
        #[serde(default = "default_true")]
        interrupting: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        output: Vec<MappingDto>,
    },
    SubProcess {
        id: String,
        nodes: Vec<NodeDto>,
        #[serde(default)]
        edges: Vec<EdgeDto>,
        #[serde(flatten)]
        activity: ActivityDto,
    },
    CallActivity {
        id: String,
        process_id: String,
        #[serde(flatten)]
        activity: ActivityDto,
    },
}

// ── NodeDto helpers ──

impl NodeDto {
    /// Returns the id regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            NodeDto::StartEvent { id }
            | NodeDto::MessageStartEvent { id, .. }
            | NodeDto::EndEvent { id }
            | NodeDto::ServiceTask { id, .. }
            | NodeDto::UserTask { id, .. }
            | NodeDto::ReceiveTask { id, .. }
            | NodeDto::BusinessRuleTask { id, .. }
            | NodeDto::ExclusiveGateway { id }
            | NodeDto::ParallelGateway { id }
            | NodeDto::MessageCatchEvent { id, .. }
            | NodeDto::SignalCatchEvent { id, .. }
            | NodeDto::SignalThrowEvent { id, .. }
            | NodeDto::LinkThrowEvent { id, .. }
            | NodeDto::LinkCatchEvent { id, .. }
            | NodeDto::CompensationThrowEvent { id, .. }
            | NodeDto::MessageBoundaryEvent { id, .. }
            | NodeDto::SubProcess { id, .. }
            | NodeDto::CallActivity { id, .. } => id,
        }
    }

    pub fn activity(&self) -> Option<&ActivityDto> {
        match self {
            NodeDto::ServiceTask { activity, .. }
            | NodeDto::UserTask { activity, .. }
            | NodeDto::ReceiveTask { activity, .. }
            | NodeDto::BusinessRuleTask { activity, .. }
            | NodeDto::SubProcess { activity, .. }
            | NodeDto::CallActivity { activity, .. } => Some(activity),
            _ => None,
        }
    }

    /// Nodes entered without an incoming sequence flow.
    pub fn is_entry_point(&self) -> bool {
        matches!(
            self,
            NodeDto::StartEvent { .. }
                | NodeDto::MessageStartEvent { .. }
                | NodeDto::MessageBoundaryEvent { .. }
                | NodeDto::LinkCatchEvent { .. }
        )
    }
}
