use super::dto::*;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

fn error(errors: &mut Vec<ValidationError>, rule: &str, message: String) {
    errors.push(ValidationError {
        rule: rule.to_string(),
        message,
    });
}

/// Validate a ProcessDto before compiling it. Returns all errors found.
pub fn validate_process(dto: &ProcessDto) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // V1: Element ids are unique across all scopes
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(dto.id.as_str());
    collect_ids(&dto.nodes, &mut seen, &mut errors);

    validate_scope(&dto.id, &dto.nodes, &dto.edges, true, &mut errors);
    errors
}

fn collect_ids<'a>(
    nodes: &'a [NodeDto],
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    for node in nodes {
        if !seen.insert(node.id()) {
            error(errors, "V1", format!("Duplicate element id: {}", node.id()));
        }
        if let NodeDto::SubProcess { nodes, .. } = node {
            collect_ids(nodes, seen, errors);
        }
    }
}

fn validate_scope(
    scope_id: &str,
    nodes: &[NodeDto],
    edges: &[EdgeDto],
    is_process: bool,
    errors: &mut Vec<ValidationError>,
) {
    let node_map: HashMap<&str, &NodeDto> = nodes.iter().map(|n| (n.id(), n)).collect();

    // V2: Edges reference elements of the same scope
    for edge in edges {
        for (end, id) in [("from", &edge.from), ("to", &edge.to)] {
            if !node_map.contains_key(id.as_str()) {
                error(
                    errors,
                    "V2",
                    format!("Edge {}→{}: '{}' ({end}) is not an element of scope '{scope_id}'", edge.from, edge.to, id),
                );
            }
        }
    }

    // V3: Start events
    let none_starts = nodes
        .iter()
        .filter(|n| matches!(n, NodeDto::StartEvent { .. }))
        .count();
    let message_starts = nodes
        .iter()
        .filter(|n| matches!(n, NodeDto::MessageStartEvent { .. }))
        .count();
    if none_starts > 1 {
        error(
            errors,
            "V3",
            format!("Scope '{scope_id}' has {none_starts} none start events, expected at most one"),
        );
    }
    if is_process && none_starts + message_starts == 0 {
        error(errors, "V3", format!("Process '{scope_id}' has no start event"));
    }
    if !is_process {
        if none_starts != 1 {
            error(
                errors,
                "V3",
                format!("Sub-process '{scope_id}' must have exactly one none start event"),
            );
        }
        if message_starts > 0 {
            error(
                errors,
                "V3",
                format!("Sub-process '{scope_id}' must not have message start events"),
            );
        }
    }

    // V4: Boundary events attach to an activity of the same scope
    for node in nodes {
        if let NodeDto::MessageBoundaryEvent { id, attached_to, .. } = node {
            let valid = node_map
                .get(attached_to.as_str())
                .is_some_and(|host| host.activity().is_some());
            if !valid {
                error(
                    errors,
                    "V4",
                    format!("Boundary event {id}: host '{attached_to}' is not an activity of scope '{scope_id}'"),
                );
            }
        }
    }

    // V5: Entry points have no incoming edges, end events no outgoing edges
    for edge in edges {
        if node_map.get(edge.to.as_str()).is_some_and(|n| n.is_entry_point()) {
            error(
                errors,
                "V5",
                format!("Edge {}→{}: '{}' cannot have incoming sequence flows", edge.from, edge.to, edge.to),
            );
        }
        if node_map
            .get(edge.from.as_str())
            .is_some_and(|n| matches!(n, NodeDto::EndEvent { .. } | NodeDto::LinkThrowEvent { .. }))
        {
            error(
                errors,
                "V5",
                format!("Edge {}→{}: '{}' cannot have outgoing sequence flows", edge.from, edge.to, edge.from),
            );
        }
    }

    // V6: Link throws have exactly one matching catch in the same scope
    let mut catches: HashMap<&str, usize> = HashMap::new();
    for node in nodes {
        if let NodeDto::LinkCatchEvent { link, .. } = node {
            *catches.entry(link.as_str()).or_default() += 1;
        }
    }
    for (link, count) in &catches {
        if *count > 1 {
            error(
                errors,
                "V6",
                format!("Link '{link}' has {count} catch events in scope '{scope_id}'"),
            );
        }
    }
    for node in nodes {
        if let NodeDto::LinkThrowEvent { id, link } = node {
            if !catches.contains_key(link.as_str()) {
                error(
                    errors,
                    "V6",
                    format!("Link throw {id}: no catch event for link '{link}' in scope '{scope_id}'"),
                );
            }
        }
    }

    // V7: Exclusive gateways have at most one default flow
    for node in nodes {
        if let NodeDto::ExclusiveGateway { id } = node {
            let defaults = edges.iter().filter(|e| e.from == *id && e.default).count();
            if defaults > 1 {
                error(
                    errors,
                    "V7",
                    format!("ExclusiveGateway {id}: {defaults} default flows, expected at most one"),
                );
            }
        }
    }
    for edge in edges {
        if edge.default && edge.condition.is_some() {
            error(
                errors,
                "V7",
                format!("Edge {}→{}: condition and default are mutually exclusive", edge.from, edge.to),
            );
        }
    }

    // V8: Compensation references resolve within the scope
    let mut handlers: HashSet<&str> = HashSet::new();
    for node in nodes {
        if let Some(handler) = node.activity().and_then(|a| a.compensation_handler.as_deref()) {
            match node_map.get(handler) {
                Some(target) if target.activity().is_some() => {
                    handlers.insert(handler);
                }
                _ => error(
                    errors,
                    "V8",
                    format!("Activity {}: compensation handler '{handler}' is not an activity of scope '{scope_id}'", node.id()),
                ),
            }
        }
        if let NodeDto::CompensationThrowEvent {
            id,
            activity: Some(activity),
        } = node
        {
            if !node_map.contains_key(activity.as_str()) {
                error(
                    errors,
                    "V8",
                    format!("Compensation throw {id}: activity '{activity}' is not in scope '{scope_id}'"),
                );
            }
        }
    }
    for handler in &handlers {
        if edges.iter().any(|e| e.from == *handler || e.to == *handler) {
            error(
                errors,
                "V8",
                format!("Compensation handler {handler} must not have sequence flows"),
            );
        }
    }

    // V9: Every element is reachable from an entry point
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in nodes {
        index.insert(node.id(), graph.add_node(node.id()));
    }
    for edge in edges {
        if let (Some(from), Some(to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
            graph.add_edge(*from, *to, ());
        }
    }
    let mut reached: HashSet<NodeIndex> = HashSet::new();
    for node in nodes {
        if node.is_entry_point() || handlers.contains(node.id()) {
            let mut dfs = Dfs::new(&graph, index[node.id()]);
            while let Some(visited) = dfs.next(&graph) {
                reached.insert(visited);
            }
        }
    }
    for node in nodes {
        if !reached.contains(&index[node.id()]) {
            error(
                errors,
                "V9",
                format!("Element {} is not reachable from a start event", node.id()),
            );
        }
    }

    for node in nodes {
        if let NodeDto::SubProcess { id, nodes, edges, .. } = node {
            validate_scope(id, nodes, edges, false, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::yaml::parse_process_yaml;

    fn rules(yaml: &str) -> Vec<String> {
        let dto = parse_process_yaml(yaml).unwrap();
        validate_process(&dto).into_iter().map(|e| e.rule).collect()
    }

    #[test]
    fn valid_process_has_no_errors() {
        let yaml = r#"
id: ok
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: task
    job_type: work
    compensation_handler: undo
  - kind: ServiceTask
    id: undo
    job_type: undo-work
  - kind: MessageBoundaryEvent
    id: cancelled
    attached_to: task
    message: cancel
    correlation_key: "=orderId"
  - kind: LinkThrowEvent
    id: jump
    link: tail
  - kind: LinkCatchEvent
    id: land
    link: tail
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: end_cancelled
edges:
  - from: start
    to: task
  - from: task
    to: jump
  - from: land
    to: end
  - from: cancelled
    to: end_cancelled
"#;
        assert!(rules(yaml).is_empty(), "{:?}", rules(yaml));
    }

    #[test]
    fn duplicate_ids_across_scopes() {
        let yaml = r#"
id: dup
nodes:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: sub
    nodes:
      - kind: StartEvent
        id: start
    edges: []
edges:
  - from: start
    to: sub
"#;
        assert!(rules(yaml).contains(&"V1".to_string()));
    }

    #[test]
    fn edges_must_stay_in_scope() {
        let yaml = r#"
id: leak
nodes:
  - kind: StartEvent
    id: start
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: nowhere
"#;
        let found = rules(yaml);
        assert!(found.contains(&"V2".to_string()));
        assert!(found.contains(&"V9".to_string()));
    }

    #[test]
    fn boundary_host_must_be_an_activity() {
        let yaml = r#"
id: b
nodes:
  - kind: StartEvent
    id: start
  - kind: EndEvent
    id: end
  - kind: MessageBoundaryEvent
    id: boundary
    attached_to: end
    message: m
    correlation_key: "=k"
edges:
  - from: start
    to: end
"#;
        assert_eq!(rules(yaml), vec!["V4".to_string()]);
    }

    #[test]
    fn unpaired_link_throw() {
        let yaml = r#"
id: l
nodes:
  - kind: StartEvent
    id: start
  - kind: LinkThrowEvent
    id: jump
    link: missing
edges:
  - from: start
    to: jump
"#;
        assert_eq!(rules(yaml), vec!["V6".to_string()]);
    }

    #[test]
    fn two_default_flows() {
        let yaml = r#"
id: g
nodes:
  - kind: StartEvent
    id: start
  - kind: ExclusiveGateway
    id: gw
  - kind: EndEvent
    id: a
  - kind: EndEvent
    id: b
edges:
  - from: start
    to: gw
  - from: gw
    to: a
    default: true
  - from: gw
    to: b
    default: true
"#;
        assert_eq!(rules(yaml), vec!["V7".to_string()]);
    }
}
