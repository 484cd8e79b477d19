use super::dto::ProcessDto;
use anyhow::{Context, Result};

/// Parse a YAML string into a ProcessDto.
///
/// Validation is NOT performed here; `ProcessRegistry::deploy` validates
/// before compiling.
pub fn parse_process_yaml(yaml_str: &str) -> Result<ProcessDto> {
    let dto: ProcessDto = serde_yaml::from_str(yaml_str).context("invalid process YAML")?;
    Ok(dto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dto::*;

    #[test]
    fn test_basic_yaml_parse() {
        let yaml = r#"
id: payment
nodes:
  - kind: MessageStartEvent
    id: paid
    message: orderPaid
  - kind: ServiceTask
    id: charge
    job_type: charge-card
    output:
      - source: "=receipt"
        target: receipt
  - kind: EndEvent
    id: end
edges:
  - from: paid
    to: charge
  - from: charge
    to: end
"#;
        let dto = parse_process_yaml(yaml).unwrap();
        assert_eq!(dto.id, "payment");
        assert_eq!(dto.nodes.len(), 3);
        assert_eq!(dto.edges.len(), 2);

        match &dto.nodes[1] {
            NodeDto::ServiceTask {
                job_type,
                retries,
                activity,
                ..
            } => {
                assert_eq!(job_type, "charge-card");
                assert_eq!(*retries, 3);
                assert_eq!(activity.output.len(), 1);
                assert!(activity.multi_instance.is_none());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_nested_sub_process_and_conditions() {
        let yaml = r#"
id: review
nodes:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: sub
    nodes:
      - kind: StartEvent
        id: sub_start
      - kind: EndEvent
        id: sub_end
    edges:
      - from: sub_start
        to: sub_end
  - kind: ExclusiveGateway
    id: gw
  - kind: EndEvent
    id: big
  - kind: EndEvent
    id: small
edges:
  - from: start
    to: sub
  - from: sub
    to: gw
  - from: gw
    to: big
    condition: "=amount > 100"
  - from: gw
    to: small
    default: true
"#;
        let dto = parse_process_yaml(yaml).unwrap();
        assert!(matches!(&dto.nodes[1], NodeDto::SubProcess { nodes, .. } if nodes.len() == 2));
        assert_eq!(dto.edges[2].condition.as_deref(), Some("=amount > 100"));
        assert!(dto.edges[3].default);
        assert_eq!(dto.edges[3].flow_id(), "gw->small");
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let yaml = "id: x\nnodes:\n  - kind: TimerWait\n    id: t\n";
        assert!(parse_process_yaml(yaml).is_err());
    }
}
