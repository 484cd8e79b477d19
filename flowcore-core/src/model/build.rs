use super::dto::*;
use super::*;
use crate::expression::Expression;
use crate::types::{BpmnEventType, ElementType, Key};
use std::collections::BTreeMap;

/// Compile a validated ProcessDto into an ExecutableProcess.
pub fn build_process(dto: &ProcessDto, key: Key, version: u32) -> Result<ExecutableProcess, ModelError> {
    let mut elements = BTreeMap::new();
    let root = ExecutableElement {
        id: dto.id.clone(),
        element_type: ElementType::Process,
        none_start_event: none_start(&dto.nodes),
        ..Default::default()
    };
    elements.insert(root.id.clone(), root);
    build_scope(&dto.id, &dto.nodes, &dto.edges, &mut elements)?;

    let message_start_events = dto
        .nodes
        .iter()
        .filter(|n| matches!(n, NodeDto::MessageStartEvent { .. }))
        .map(|n| n.id().to_string())
        .collect();

    let sequence_flows = elements
        .values()
        .flat_map(|e| e.outgoing.iter())
        .map(|flow| (flow.id.clone(), flow.clone()))
        .collect();

    Ok(ExecutableProcess {
        key,
        bpmn_process_id: dto.id.clone(),
        version,
        elements,
        sequence_flows,
        message_start_events,
    })
}

fn none_start(nodes: &[NodeDto]) -> Option<String> {
    nodes
        .iter()
        .find(|n| matches!(n, NodeDto::StartEvent { .. }))
        .map(|n| n.id().to_string())
}

fn parse(element_id: &str, source: &str) -> Result<Expression, ModelError> {
    Expression::parse(source).map_err(|message| ModelError::Expression {
        element_id: element_id.to_string(),
        message,
    })
}

fn mappings(element_id: &str, dtos: &[MappingDto]) -> Result<Vec<VariableMapping>, ModelError> {
    dtos.iter()
        .map(|m| {
            Ok(VariableMapping {
                source: parse(element_id, &m.source)?,
                target: m.target.clone(),
            })
        })
        .collect()
}

fn message(id: &str, name: &str, correlation_key: &str) -> Result<MessageDefinition, ModelError> {
    Ok(MessageDefinition {
        name: name.to_string(),
        correlation_key: Some(parse(id, correlation_key)?),
    })
}

fn build_scope(
    scope_id: &str,
    nodes: &[NodeDto],
    edges: &[EdgeDto],
    elements: &mut BTreeMap<String, ExecutableElement>,
) -> Result<(), ModelError> {
    let mut scope_elements: Vec<ExecutableElement> = Vec::with_capacity(nodes.len());

    for node in nodes {
        let id = node.id().to_string();
        let mut element = ExecutableElement {
            id: id.clone(),
            flow_scope: Some(scope_id.to_string()),
            ..Default::default()
        };

        match node {
            NodeDto::StartEvent { .. } => element.element_type = ElementType::StartEvent,
            NodeDto::MessageStartEvent {
                message: name,
                output,
                ..
            } => {
                element.element_type = ElementType::StartEvent;
                element.event_type = BpmnEventType::Message;
                element.message = Some(MessageDefinition {
                    name: name.clone(),
                    correlation_key: None,
                });
                element.output_mappings = mappings(&id, output)?;
            }
            NodeDto::EndEvent { .. } => element.element_type = ElementType::EndEvent,
            NodeDto::ServiceTask {
                job_type, retries, ..
            } => {
                element.element_type = ElementType::ServiceTask;
                element.job_type = Some(parse(&id, job_type)?);
                element.job_retries = *retries;
            }
            NodeDto::UserTask {
                assignee,
                candidate_groups,
                form_key,
                ..
            } => {
                element.element_type = ElementType::UserTask;
                element.user_task = Some(UserTaskProperties {
                    assignee: assignee.as_deref().map(|a| parse(&id, a)).transpose()?,
                    candidate_groups: candidate_groups.clone(),
                    form_key: form_key.clone(),
                });
            }
            NodeDto::ReceiveTask {
                message: name,
                correlation_key,
                ..
            } => {
                element.element_type = ElementType::ReceiveTask;
                element.event_type = BpmnEventType::Message;
                element.message = Some(message(&id, name, correlation_key)?);
            }
            NodeDto::BusinessRuleTask {
                decision_id,
                result_variable,
                ..
            } => {
                element.element_type = ElementType::BusinessRuleTask;
                element.decision = Some(DecisionProperties {
                    decision_id: decision_id.clone(),
                    result_variable: result_variable.clone(),
                });
            }
            NodeDto::ExclusiveGateway { .. } => element.element_type = ElementType::ExclusiveGateway,
            NodeDto::ParallelGateway { .. } => element.element_type = ElementType::ParallelGateway,
            NodeDto::MessageCatchEvent {
                message: name,
                correlation_key,
                output,
                ..
            } => {
                element.element_type = ElementType::IntermediateCatchEvent;
                element.event_type = BpmnEventType::Message;
                element.message = Some(message(&id, name, correlation_key)?);
                element.output_mappings = mappings(&id, output)?;
            }
            NodeDto::SignalCatchEvent { signal, .. } => {
                element.element_type = ElementType::IntermediateCatchEvent;
                element.event_type = BpmnEventType::Signal;
                element.signal_name = Some(signal.clone());
            }
            NodeDto::SignalThrowEvent { signal, .. } => {
                element.element_type = ElementType::IntermediateThrowEvent;
                element.event_type = BpmnEventType::Signal;
                element.signal_name = Some(signal.clone());
            }
            NodeDto::LinkThrowEvent { link, .. } => {
                element.element_type = ElementType::IntermediateThrowEvent;
                element.event_type = BpmnEventType::Link;
                element.link_name = Some(link.clone());
            }
            NodeDto::LinkCatchEvent { link, .. } => {
                element.element_type = ElementType::IntermediateCatchEvent;
                element.event_type = BpmnEventType::Link;
                element.link_name = Some(link.clone());
            }
            NodeDto::CompensationThrowEvent { activity, .. } => {
                element.element_type = ElementType::IntermediateThrowEvent;
                element.event_type = BpmnEventType::Compensation;
                element.activity_ref = activity.clone();
            }
            NodeDto::MessageBoundaryEvent {
                attached_to,
                message: name,
                correlation_key,
                interrupting,
                output,
                ..
            } => {
                element.element_type = ElementType::BoundaryEvent;
                element.event_type = BpmnEventType::Message;
                element.attached_to = Some(attached_to.clone());
                element.interrupting = *interrupting;
                element.message = Some(message(&id, name, correlation_key)?);
                element.output_mappings = mappings(&id, output)?;
            }
            NodeDto::SubProcess {
                nodes: children,
                edges: child_edges,
                ..
            } => {
                element.element_type = ElementType::SubProcess;
                element.none_start_event = none_start(children);
                build_scope(&id, children, child_edges, elements)?;
            }
            NodeDto::CallActivity { process_id, .. } => {
                element.element_type = ElementType::CallActivity;
                element.called_process_id = Some(process_id.clone());
            }
        }

        if let Some(activity) = node.activity() {
            element.input_mappings = mappings(&id, &activity.input)?;
            element.output_mappings = mappings(&id, &activity.output)?;
            element.compensation_handler = activity.compensation_handler.clone();
        }

        for edge in edges {
            if edge.to == id {
                element.incoming.push(edge.flow_id());
            }
            if edge.from == id {
                element.outgoing.push(SequenceFlow {
                    id: edge.flow_id(),
                    source: edge.from.clone(),
                    target: edge.to.clone(),
                    condition: edge.condition.as_deref().map(|c| parse(&id, c)).transpose()?,
                    is_default: edge.default,
                });
            }
        }

        scope_elements.push(element);
    }

    // Boundary events are listed on their host.
    let boundaries: Vec<(String, String)> = scope_elements
        .iter()
        .filter_map(|e| e.attached_to.clone().map(|host| (host, e.id.clone())))
        .collect();
    for (host, boundary) in boundaries {
        if let Some(element) = scope_elements.iter_mut().find(|e| e.id == host) {
            element.boundary_events.push(boundary);
        }
    }

    for (node, element) in nodes.iter().zip(scope_elements) {
        let element = match node.activity().and_then(|a| a.multi_instance.as_ref()) {
            Some(mi) => wrap_in_multi_instance_body(element, mi)?,
            None => element,
        };
        elements.insert(element.id.clone(), element);
    }
    Ok(())
}

/// The body takes the activity's place in its scope: it owns the sequence
/// flows and boundary events, the activity becomes its only child.
fn wrap_in_multi_instance_body(
    mut inner: ExecutableElement,
    mi: &MultiInstanceDto,
) -> Result<ExecutableElement, ModelError> {
    let id = inner.id.clone();
    let loop_characteristics = LoopCharacteristics {
        input_collection: parse(&id, &mi.input_collection)?,
        input_element: mi.input_element.clone(),
        output_collection: mi.output_collection.clone(),
        output_element: mi
            .output_element
            .as_deref()
            .map(|e| parse(&id, e))
            .transpose()?,
        completion_condition: mi
            .completion_condition
            .as_deref()
            .map(|c| parse(&id, c))
            .transpose()?,
        sequential: mi.sequential,
    };

    let body = ExecutableElement {
        id: id.clone(),
        element_type: ElementType::MultiInstanceBody,
        flow_scope: inner.flow_scope.take(),
        incoming: std::mem::take(&mut inner.incoming),
        outgoing: std::mem::take(&mut inner.outgoing),
        boundary_events: std::mem::take(&mut inner.boundary_events),
        compensation_handler: inner.compensation_handler.take(),
        multi_instance: Some(loop_characteristics),
        ..Default::default()
    };
    inner.flow_scope = Some(id);
    Ok(ExecutableElement {
        inner_activity: Some(Box::new(inner)),
        ..body
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::yaml::parse_process_yaml;

    #[test]
    fn builds_flows_and_scopes() {
        let dto = parse_process_yaml(
            r#"
id: p
nodes:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: sub
    nodes:
      - kind: StartEvent
        id: inner_start
      - kind: EndEvent
        id: inner_end
    edges:
      - from: inner_start
        to: inner_end
  - kind: ReceiveTask
    id: wait
    message: paid
    correlation_key: "=orderId"
  - kind: MessageBoundaryEvent
    id: cancel
    attached_to: wait
    message: cancel
    correlation_key: "=orderId"
    interrupting: false
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: cancelled
edges:
  - from: start
    to: sub
  - from: sub
    to: wait
  - from: wait
    to: end
  - from: cancel
    to: cancelled
"#,
        )
        .unwrap();
        let process = build_process(&dto, 1, 1).unwrap();

        let root = process.root().unwrap();
        assert_eq!(root.element_type, ElementType::Process);
        assert_eq!(root.none_start_event.as_deref(), Some("start"));

        let sub = process.element("sub", ElementType::SubProcess).unwrap();
        assert_eq!(sub.none_start_event.as_deref(), Some("inner_start"));
        let inner_end = process.element_by_id("inner_end").unwrap();
        assert_eq!(inner_end.flow_scope.as_deref(), Some("sub"));

        let wait = process.element("wait", ElementType::ReceiveTask).unwrap();
        assert_eq!(wait.boundary_events, vec!["cancel".to_string()]);
        assert_eq!(wait.outgoing[0].target, "end");
        assert!(wait.is_message_catch());

        let cancel = process.element("cancel", ElementType::BoundaryEvent).unwrap();
        assert!(!cancel.interrupting);
        assert_eq!(cancel.attached_to.as_deref(), Some("wait"));
    }

    #[test]
    fn invalid_condition_is_reported_with_element() {
        let dto = parse_process_yaml(
            r#"
id: p
nodes:
  - kind: StartEvent
    id: start
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: end
    condition: "=a..b"
"#,
        )
        .unwrap();
        let err = build_process(&dto, 1, 1).unwrap_err();
        assert!(matches!(err, ModelError::Expression { element_id, .. } if element_id == "start"));
    }
}
