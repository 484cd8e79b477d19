//! End-to-end runs through the engine: deploy, feed client commands and
//! look at the state and the log.

use std::sync::Arc;

use flowcore_core::behavior::StaticDecisionEvaluator;
use flowcore_core::intent::{Intent, ProcessInstanceIntent};
use flowcore_core::{
    document, ChannelJobNotifier, ClientCommand, CommandRequest, ControlledClock, ElementAction, ElementType,
    Engine, EngineConfig, Key, Position, RecordLog, RecordType, RecordValue, RejectionType, Services,
};
use serde_json::{json, Map, Value};

const CHARGE: &str = r#"
id: charge
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: charge_card
    job_type: charge
    retries: 2
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: charge_card
  - from: charge_card
    to: end
"#;

const FAN_OUT: &str = r#"
id: fan_out
nodes:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: a
    job_type: a
  - kind: ServiceTask
    id: b
    job_type: b
  - kind: ServiceTask
    id: c
    job_type: c
  - kind: ParallelGateway
    id: join
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: fork
  - from: fork
    to: a
  - from: fork
    to: b
  - from: fork
    to: c
  - from: a
    to: join
  - from: b
    to: join
  - from: c
    to: join
  - from: join
    to: end
"#;

const ROUTING: &str = r#"
id: routing
nodes:
  - kind: StartEvent
    id: start
  - kind: ExclusiveGateway
    id: split
  - kind: EndEvent
    id: big
  - kind: EndEvent
    id: small
edges:
  - from: start
    to: split
  - from: split
    to: big
    condition: "=amount > 100"
  - from: split
    to: small
    default: true
"#;

const AWAIT_PAYMENT: &str = r#"
id: await_payment
nodes:
  - kind: StartEvent
    id: start
  - kind: MessageCatchEvent
    id: paid
    message: paid
    correlation_key: "=orderId"
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: paid
  - from: paid
    to: end
"#;

const ORDER_BY_MESSAGE: &str = r#"
id: order
nodes:
  - kind: MessageStartEvent
    id: placed
    message: orderPlaced
  - kind: ServiceTask
    id: ship
    job_type: ship
  - kind: EndEvent
    id: end
edges:
  - from: placed
    to: ship
  - from: ship
    to: end
"#;

const WAIT_FOR_SIGNAL: &str = r#"
id: wait_for_signal
nodes:
  - kind: StartEvent
    id: start
  - kind: SignalCatchEvent
    id: go
    signal: go
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: go
  - from: go
    to: end
"#;

const REVIEWS: &str = r#"
id: reviews
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: review
    job_type: review
    output:
      - source: "=verdict"
        target: verdict
    multi_instance:
      input_collection: "=reviewers"
      input_element: reviewer
      output_collection: verdicts
      output_element: "=verdict"
  - kind: ServiceTask
    id: publish
    job_type: publish
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: review
  - from: review
    to: publish
  - from: publish
    to: end
"#;

const REVIEWS_IN_TURN: &str = r#"
id: reviews_in_turn
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: review
    job_type: review
    multi_instance:
      input_collection: "=reviewers"
      input_element: reviewer
      output_collection: reviewed_by
      output_element: "=reviewer"
      sequential: true
  - kind: ServiceTask
    id: publish
    job_type: publish
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: review
  - from: review
    to: publish
  - from: publish
    to: end
"#;

const FIRST_APPROVAL_WINS: &str = r#"
id: first_approval_wins
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: approve
    job_type: approve
    output:
      - source: "=approved"
        target: approved
    multi_instance:
      input_collection: "=approvers"
      completion_condition: "=approved == true"
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: approve
  - from: approve
    to: end
"#;

const CHECKOUT: &str = r#"
id: checkout
nodes:
  - kind: StartEvent
    id: start
  - kind: CallActivity
    id: pay
    process_id: charge
  - kind: ServiceTask
    id: ship
    job_type: ship
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: pay
  - from: pay
    to: ship
  - from: ship
    to: end
"#;

const DELIVERY: &str = r#"
id: delivery
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: deliver
    job_type: deliver
  - kind: MessageBoundaryEvent
    id: cancelled
    attached_to: deliver
    message: cancelled
    correlation_key: "=orderId"
  - kind: EndEvent
    id: delivered
  - kind: EndEvent
    id: refunded
edges:
  - from: start
    to: deliver
  - from: deliver
    to: delivered
  - from: cancelled
    to: refunded
"#;

const DELIVERY_WITH_REMINDER: &str = r#"
id: delivery_with_reminder
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: deliver
    job_type: deliver
  - kind: MessageBoundaryEvent
    id: nudge
    attached_to: deliver
    message: nudge
    correlation_key: "=orderId"
    interrupting: false
  - kind: ServiceTask
    id: notify
    job_type: notify
  - kind: EndEvent
    id: delivered
  - kind: EndEvent
    id: notified
edges:
  - from: start
    to: deliver
  - from: deliver
    to: delivered
  - from: nudge
    to: notify
  - from: notify
    to: notified
"#;

const TRIP: &str = r#"
id: trip
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: book_hotel
    job_type: book_hotel
    compensation_handler: cancel_hotel
  - kind: ServiceTask
    id: book_flight
    job_type: book_flight
    compensation_handler: cancel_flight
  - kind: ServiceTask
    id: cancel_hotel
    job_type: cancel_hotel
  - kind: ServiceTask
    id: cancel_flight
    job_type: cancel_flight
  - kind: CompensationThrowEvent
    id: undo
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: book_hotel
  - from: book_hotel
    to: book_flight
  - from: book_flight
    to: undo
  - from: undo
    to: end
"#;

const JUMP: &str = r#"
id: jump
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: first
    job_type: first
  - kind: LinkThrowEvent
    id: to_tail
    link: tail
  - kind: LinkCatchEvent
    id: from_head
    link: tail
  - kind: ServiceTask
    id: second
    job_type: second
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: first
  - from: first
    to: to_tail
  - from: from_head
    to: second
  - from: second
    to: end
"#;

const ONBOARDING: &str = r#"
id: onboarding
nodes:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: setup
    nodes:
      - kind: StartEvent
        id: setup_start
      - kind: ServiceTask
        id: provision
        job_type: provision
      - kind: EndEvent
        id: setup_end
    edges:
      - from: setup_start
        to: provision
      - from: provision
        to: setup_end
  - kind: ServiceTask
    id: welcome
    job_type: welcome
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: setup
  - from: setup
    to: welcome
  - from: welcome
    to: end
"#;

const SIGN_OFF: &str = r#"
id: sign_off
nodes:
  - kind: StartEvent
    id: start
  - kind: UserTask
    id: sign
    assignee: "=owner"
    candidate_groups: [managers]
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: sign
  - from: sign
    to: end
"#;

const SCORING: &str = r#"
id: scoring
nodes:
  - kind: StartEvent
    id: start
  - kind: BusinessRuleTask
    id: assess
    decision_id: risk
    result_variable: risk
  - kind: ServiceTask
    id: review
    job_type: review
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: assess
  - from: assess
    to: review
  - from: review
    to: end
"#;

const MERGE: &str = r#"
id: merge
nodes:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: a
    job_type: a
  - kind: ServiceTask
    id: b
    job_type: b
  - kind: ExclusiveGateway
    id: either
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: fork
  - from: fork
    to: a
  - from: fork
    to: b
  - from: a
    to: either
  - from: b
    to: either
  - from: either
    to: end
"#;

fn engine() -> Engine {
    Engine::new(
        EngineConfig::default(),
        Services::new(Arc::new(ControlledClock::new(1_000))),
    )
}

fn send(engine: &mut Engine, command: Value) {
    let command: ClientCommand = serde_json::from_value(command).unwrap();
    engine.execute(CommandRequest::try_from(command).unwrap()).unwrap();
    engine.process_pending();
}

fn create(engine: &mut Engine, bpmn_process_id: &str, variables: Value) -> Key {
    let before = engine.log().last_position();
    send(
        engine,
        json!({"command": "create_instance", "bpmn_process_id": bpmn_process_id, "variables": variables}),
    );
    engine.log().records()[before as usize..]
        .iter()
        .find(|r| r.intent == Intent::ProcessInstanceCreation(flowcore_core::intent::ProcessInstanceCreationIntent::Created))
        .and_then(|r| r.key)
        .expect("instance created")
}

fn job_of(engine: &Engine, job_type: &str) -> Key {
    let jobs = engine.state().jobs.activatable(job_type);
    assert_eq!(jobs.len(), 1, "expected one '{job_type}' job");
    jobs[0].0
}

fn complete_job(engine: &mut Engine, job_type: &str, variables: Value) {
    let job_key = job_of(engine, job_type);
    send(engine, json!({"command": "complete_job", "job_key": job_key, "variables": variables}));
}

/// How often `element_id` reached `intent`, according to the log.
fn count(engine: &Engine, element_id: &str, intent: ProcessInstanceIntent) -> usize {
    engine
        .log()
        .records()
        .iter()
        .filter(|r| r.record_type == RecordType::Event && r.intent == Intent::ProcessInstance(intent))
        .filter(|r| matches!(&r.value, RecordValue::ProcessInstance(pi) if pi.element_id == element_id))
        .count()
}

fn rejections(engine: &Engine) -> Vec<RejectionType> {
    engine
        .log()
        .records()
        .iter()
        .filter_map(|r| r.rejection.as_ref().map(|rejection| rejection.rejection_type))
        .collect()
}

/// Jobs of `job_type` as (job key, element instance key), ascending by key.
fn jobs_of(engine: &Engine, job_type: &str) -> Vec<(Key, Key)> {
    engine
        .state()
        .jobs
        .activatable(job_type)
        .into_iter()
        .map(|(key, job)| (key, job.element_instance_key))
        .collect()
}

fn complete_job_with_key(engine: &mut Engine, job_key: Key, variables: Value) {
    send(engine, json!({"command": "complete_job", "job_key": job_key, "variables": variables}));
}

fn local(engine: &Engine, scope_key: Key, name: &str) -> Option<Value> {
    engine
        .state()
        .variables
        .get_local(scope_key, name)
        .map(|variable| document::decode(&variable.value).unwrap())
}

fn visible(engine: &Engine, scope_key: Key) -> Map<String, Value> {
    engine.state().variables.visible_json(scope_key).unwrap()
}

/// Log position of the first time `element_id` reached `intent`.
fn position_of(engine: &Engine, element_id: &str, intent: ProcessInstanceIntent) -> Position {
    engine
        .log()
        .records()
        .iter()
        .filter(|r| r.record_type == RecordType::Event && r.intent == Intent::ProcessInstance(intent))
        .find(|r| matches!(&r.value, RecordValue::ProcessInstance(pi) if pi.element_id == element_id))
        .map(|r| r.position)
        .expect("element reached the intent")
}

#[test]
fn service_task_waits_for_its_job() {
    let (notifier, mut work_available) = ChannelJobNotifier::channel();
    let mut engine = Engine::new(
        EngineConfig::default(),
        Services::new(Arc::new(ControlledClock::new(1_000))).with_notifier(notifier),
    );
    engine.deploy_yaml(CHARGE).unwrap();

    let pi = create(&mut engine, "charge", json!({"amount": 42}));
    assert!(engine.state().element_instances.contains(pi));
    assert_eq!(work_available.try_recv().ok().as_deref(), Some("charge"));

    let job_key = job_of(&engine, "charge");
    assert_eq!(engine.state().jobs.get(job_key).map(|job| job.retries), Some(2));

    complete_job(&mut engine, "charge", json!({"paid": true}));

    assert!(engine.state().element_instances.is_empty());
    assert!(engine.state().jobs.is_empty());
    assert_eq!(count(&engine, "charge", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(engine.metrics().count(ElementType::ServiceTask, ElementAction::Completed), 1);
    assert!(rejections(&engine).is_empty());
}

#[test]
fn completing_a_job_twice_is_rejected() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    create(&mut engine, "charge", json!({}));
    let job_key = job_of(&engine, "charge");

    send(&mut engine, json!({"command": "complete_job", "job_key": job_key}));
    send(&mut engine, json!({"command": "complete_job", "job_key": job_key}));

    assert_eq!(rejections(&engine), vec![RejectionType::NotFound]);
}

#[test]
fn parallel_join_waits_for_every_branch() {
    let mut engine = engine();
    engine.deploy_yaml(FAN_OUT).unwrap();
    let pi = create(&mut engine, "fan_out", json!({}));

    complete_job(&mut engine, "b", json!({}));
    complete_job(&mut engine, "a", json!({}));
    assert_eq!(count(&engine, "join", ProcessInstanceIntent::ElementActivated), 0);
    assert!(engine.state().element_instances.contains(pi));

    complete_job(&mut engine, "c", json!({}));
    assert_eq!(count(&engine, "join", ProcessInstanceIntent::ElementActivated), 1);
    assert_eq!(count(&engine, "end", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(engine.metrics().count(ElementType::ParallelGateway, ElementAction::Completed), 2);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn incident_is_resolved_after_the_variable_is_set() {
    let mut engine = engine();
    engine.deploy_yaml(ROUTING).unwrap();
    let pi = create(&mut engine, "routing", json!({}));

    let (incident_key, incident) = engine
        .state()
        .incidents
        .iter()
        .next()
        .map(|(key, incident)| (key, incident.clone()))
        .expect("an incident on the gateway");
    assert_eq!(incident.element_id, "split");
    assert_eq!(incident.process_instance_key, pi);
    assert_eq!(count(&engine, "split", ProcessInstanceIntent::ElementActivated), 0);

    send(&mut engine, json!({"command": "set_variables", "scope_key": pi, "variables": {"amount": 150}}));
    send(&mut engine, json!({"command": "resolve_incident", "incident_key": incident_key}));

    assert!(engine.state().incidents.is_empty());
    assert_eq!(count(&engine, "big", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "small", ProcessInstanceIntent::ElementActivating), 0);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn default_flow_is_taken_when_the_condition_is_false() {
    let mut engine = engine();
    engine.deploy_yaml(ROUTING).unwrap();
    create(&mut engine, "routing", json!({"amount": 7}));

    assert_eq!(count(&engine, "small", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "big", ProcessInstanceIntent::ElementActivating), 0);
}

#[test]
fn message_is_correlated_to_a_waiting_instance() {
    let mut engine = engine();
    engine.deploy_yaml(AWAIT_PAYMENT).unwrap();
    let pi = create(&mut engine, "await_payment", json!({"orderId": "o-1"}));
    assert_eq!(count(&engine, "paid", ProcessInstanceIntent::ElementActivated), 1);

    send(
        &mut engine,
        json!({"command": "publish_message", "name": "paid", "correlation_key": "o-2", "time_to_live_ms": 0}),
    );
    assert!(engine.state().element_instances.contains(pi));

    send(
        &mut engine,
        json!({"command": "publish_message", "name": "paid", "correlation_key": "o-1", "time_to_live_ms": 0}),
    );
    assert_eq!(count(&engine, "paid", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
    assert!(engine.state().message_subscriptions.is_empty());
    assert!(engine.state().process_message_subscriptions.is_empty());
}

#[test]
fn buffered_message_is_correlated_when_the_subscription_opens() {
    let mut engine = engine();
    engine.deploy_yaml(AWAIT_PAYMENT).unwrap();
    send(
        &mut engine,
        json!({"command": "publish_message", "name": "paid", "correlation_key": "o-1", "time_to_live_ms": 60_000}),
    );
    assert_eq!(engine.state().messages.len(), 1);

    create(&mut engine, "await_payment", json!({"orderId": "o-1"}));

    assert_eq!(count(&engine, "paid", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
    // The message stays until its time to live runs out.
    assert_eq!(engine.state().messages.len(), 1);
}

#[test]
fn message_start_waits_for_the_running_instance_of_the_same_key() {
    let mut engine = engine();
    engine.deploy_yaml(ORDER_BY_MESSAGE).unwrap();
    assert_eq!(engine.state().message_start_subscriptions.len(), 1);

    for _ in 0..2 {
        send(
            &mut engine,
            json!({"command": "publish_message", "name": "orderPlaced", "correlation_key": "c-1", "time_to_live_ms": 60_000}),
        );
    }
    assert_eq!(engine.metrics().count(ElementType::Process, ElementAction::Activated), 1);
    assert_eq!(engine.state().messages.len(), 2);

    complete_job(&mut engine, "ship", json!({}));
    assert_eq!(engine.metrics().count(ElementType::Process, ElementAction::Completed), 1);
    assert_eq!(engine.metrics().count(ElementType::Process, ElementAction::Activated), 2);

    complete_job(&mut engine, "ship", json!({}));
    assert_eq!(engine.metrics().count(ElementType::Process, ElementAction::Activated), 2);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn cancelling_an_instance_cancels_its_job() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    let pi = create(&mut engine, "charge", json!({}));
    assert_eq!(engine.state().jobs.len(), 1);

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": pi}));

    assert!(engine.state().element_instances.is_empty());
    assert!(engine.state().jobs.is_empty());
    assert_eq!(count(&engine, "charge", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "charge_card", ProcessInstanceIntent::ElementTerminated), 1);
}

#[test]
fn failing_the_last_retry_raises_an_incident_that_retries_fix() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    create(&mut engine, "charge", json!({}));
    let job_key = job_of(&engine, "charge");

    send(
        &mut engine,
        json!({"command": "fail_job", "job_key": job_key, "retries": 0, "error_message": "card declined"}),
    );
    let (incident_key, incident) = engine
        .state()
        .incidents
        .iter()
        .next()
        .map(|(key, incident)| (key, incident.clone()))
        .expect("a job incident");
    assert_eq!(incident.job_key, Some(job_key));
    assert_eq!(incident.error_message, "card declined");
    assert!(engine.state().jobs.activatable("charge").is_empty());

    send(&mut engine, json!({"command": "update_job_retries", "job_key": job_key, "retries": 1}));
    send(&mut engine, json!({"command": "resolve_incident", "incident_key": incident_key}));
    assert!(engine.state().incidents.is_empty());

    complete_job(&mut engine, "charge", json!({}));
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn signal_reaches_every_waiting_instance() {
    let mut engine = engine();
    engine.deploy_yaml(WAIT_FOR_SIGNAL).unwrap();
    create(&mut engine, "wait_for_signal", json!({}));
    create(&mut engine, "wait_for_signal", json!({}));
    assert_eq!(engine.state().signal_subscriptions.len(), 2);

    send(&mut engine, json!({"command": "broadcast_signal", "signal_name": "go"}));

    assert_eq!(count(&engine, "go", ProcessInstanceIntent::ElementCompleted), 2);
    assert!(engine.state().element_instances.is_empty());
    assert!(engine.state().signal_subscriptions.is_empty());
}

#[test]
fn same_commands_produce_the_same_log() {
    let run = || {
        let mut engine = engine();
        engine.deploy_yaml(FAN_OUT).unwrap();
        engine.deploy_yaml(AWAIT_PAYMENT).unwrap();
        create(&mut engine, "fan_out", json!({"x": 1}));
        create(&mut engine, "await_payment", json!({"orderId": "o-9"}));
        send(
            &mut engine,
            json!({"command": "publish_message", "name": "paid", "correlation_key": "o-9", "time_to_live_ms": 5_000}),
        );
        for job_type in ["c", "a", "b"] {
            complete_job(&mut engine, job_type, json!({"done": job_type}));
        }
        (engine.log().records().to_vec(), engine.state().clone())
    };

    let (first_log, first_state) = run();
    let (second_log, second_state) = run();
    assert_eq!(first_log, second_log);
    assert_eq!(first_state, second_state);
}

#[test]
fn unknown_commands_are_refused_before_reaching_the_log() {
    let parsed = serde_json::from_value::<ClientCommand>(json!({"command": "reboot"}));
    assert!(parsed.is_err());

    let refused = CommandRequest::try_from(ClientCommand::CreateInstance {
        bpmn_process_id: "charge".to_string(),
        variables: json!("not a map"),
    });
    assert!(refused.is_err());
}

#[test]
fn cancelling_an_inner_element_is_rejected_and_the_instance_carries_on() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    let pi = create(&mut engine, "charge", json!({}));
    let task_key = engine
        .state()
        .element_instances
        .instances_of(pi)
        .into_iter()
        .find(|instance| instance.value.element_type == ElementType::ServiceTask)
        .map(|instance| instance.key)
        .expect("the service task is waiting");

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": task_key}));

    assert_eq!(rejections(&engine), vec![RejectionType::NotFound]);
    assert_eq!(count(&engine, "charge_card", ProcessInstanceIntent::ElementTerminating), 0);
    assert!(engine.state().element_instances.contains(task_key));

    complete_job(&mut engine, "charge", json!({}));
    assert_eq!(count(&engine, "charge", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn a_called_instance_is_cancelled_through_its_root() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    engine.deploy_yaml(CHECKOUT).unwrap();
    let pi = create(&mut engine, "checkout", json!({}));
    let child = engine.state().jobs.get(job_of(&engine, "charge")).unwrap().process_instance_key;
    assert_ne!(child, pi);

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": child}));
    assert_eq!(rejections(&engine), vec![RejectionType::InvalidState]);
    assert!(engine.state().element_instances.contains(child));

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": pi}));
    assert_eq!(rejections(&engine).len(), 1);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn parallel_multi_instance_collects_outputs_in_input_order() {
    let mut engine = engine();
    engine.deploy_yaml(REVIEWS).unwrap();
    let pi = create(&mut engine, "reviews", json!({"reviewers": ["ann", "bob", "cid"]}));

    let jobs = jobs_of(&engine, "review");
    assert_eq!(jobs.len(), 3);
    // Finish the last one first; the collection still follows the input.
    for (job_key, element_instance_key) in jobs.into_iter().rev() {
        let reviewer = local(&engine, element_instance_key, "reviewer").expect("input element");
        let verdict = format!("seen by {}", reviewer.as_str().unwrap());
        complete_job_with_key(&mut engine, job_key, json!({"verdict": verdict}));
    }

    // Three inner instances and the body.
    assert_eq!(count(&engine, "review", ProcessInstanceIntent::ElementCompleted), 4);
    job_of(&engine, "publish");
    let variables = visible(&engine, pi);
    assert_eq!(variables["verdicts"], json!(["seen by ann", "seen by bob", "seen by cid"]));
    assert!(!variables.contains_key("verdict"));
    assert!(!variables.contains_key("reviewer"));
}

#[test]
fn sequential_multi_instance_runs_one_item_at_a_time() {
    let mut engine = engine();
    engine.deploy_yaml(REVIEWS_IN_TURN).unwrap();
    let pi = create(&mut engine, "reviews_in_turn", json!({"reviewers": ["ann", "bob"]}));

    for (loop_counter, reviewer) in [(1, "ann"), (2, "bob")] {
        let jobs = jobs_of(&engine, "review");
        assert_eq!(jobs.len(), 1);
        let (job_key, element_instance_key) = jobs[0];
        assert_eq!(local(&engine, element_instance_key, "reviewer"), Some(json!(reviewer)));
        assert_eq!(local(&engine, element_instance_key, "loopCounter"), Some(json!(loop_counter)));
        complete_job_with_key(&mut engine, job_key, json!({}));
    }

    job_of(&engine, "publish");
    assert_eq!(visible(&engine, pi)["reviewed_by"], json!(["ann", "bob"]));
}

#[test]
fn completion_condition_terminates_the_remaining_instances() {
    let mut engine = engine();
    engine.deploy_yaml(FIRST_APPROVAL_WINS).unwrap();
    create(&mut engine, "first_approval_wins", json!({"approvers": ["ann", "bob", "cid"]}));
    let jobs = jobs_of(&engine, "approve");
    assert_eq!(jobs.len(), 3);

    complete_job_with_key(&mut engine, jobs[0].0, json!({"approved": false}));
    assert_eq!(jobs_of(&engine, "approve").len(), 2);
    assert_eq!(count(&engine, "approve", ProcessInstanceIntent::ElementTerminated), 0);

    complete_job_with_key(&mut engine, jobs[1].0, json!({"approved": true}));

    assert!(engine.state().jobs.is_empty());
    assert_eq!(count(&engine, "approve", ProcessInstanceIntent::ElementTerminated), 1);
    // Two inner instances and the body.
    assert_eq!(count(&engine, "approve", ProcessInstanceIntent::ElementCompleted), 3);
    assert_eq!(count(&engine, "end", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn called_process_hands_its_variables_back() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    engine.deploy_yaml(CHECKOUT).unwrap();
    let pi = create(&mut engine, "checkout", json!({"amount": 30}));

    let child = engine.state().jobs.get(job_of(&engine, "charge")).unwrap().process_instance_key;
    assert_ne!(child, pi);
    assert_eq!(visible(&engine, child)["amount"], json!(30));

    complete_job(&mut engine, "charge", json!({"receipt": "r-7"}));

    assert!(!engine.state().element_instances.contains(child));
    assert_eq!(count(&engine, "pay", ProcessInstanceIntent::ElementCompleted), 1);
    job_of(&engine, "ship");
    assert_eq!(visible(&engine, pi)["receipt"], json!("r-7"));
}

#[test]
fn cancelling_the_caller_cancels_the_called_process() {
    let mut engine = engine();
    engine.deploy_yaml(CHARGE).unwrap();
    engine.deploy_yaml(CHECKOUT).unwrap();
    let pi = create(&mut engine, "checkout", json!({}));
    assert_eq!(engine.state().jobs.len(), 1);

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": pi}));

    assert!(engine.state().element_instances.is_empty());
    assert!(engine.state().jobs.is_empty());
    assert_eq!(count(&engine, "charge_card", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "charge", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "pay", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "checkout", ProcessInstanceIntent::ElementTerminated), 1);
    assert!(rejections(&engine).is_empty());
}

#[test]
fn interrupting_boundary_message_replaces_the_task() {
    let mut engine = engine();
    engine.deploy_yaml(DELIVERY).unwrap();
    create(&mut engine, "delivery", json!({"orderId": "o-1"}));
    assert_eq!(engine.state().jobs.len(), 1);

    send(
        &mut engine,
        json!({"command": "publish_message", "name": "cancelled", "correlation_key": "o-1", "time_to_live_ms": 0}),
    );

    assert_eq!(count(&engine, "deliver", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "cancelled", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "refunded", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "delivered", ProcessInstanceIntent::ElementActivating), 0);
    assert!(engine.state().jobs.is_empty());
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn non_interrupting_boundary_message_runs_beside_the_task() {
    let mut engine = engine();
    engine.deploy_yaml(DELIVERY_WITH_REMINDER).unwrap();
    let pi = create(&mut engine, "delivery_with_reminder", json!({"orderId": "o-2"}));

    send(
        &mut engine,
        json!({"command": "publish_message", "name": "nudge", "correlation_key": "o-2", "time_to_live_ms": 0}),
    );

    assert_eq!(count(&engine, "nudge", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "deliver", ProcessInstanceIntent::ElementTerminating), 0);
    job_of(&engine, "deliver");

    complete_job(&mut engine, "notify", json!({}));
    assert_eq!(count(&engine, "notified", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.contains(pi));

    complete_job(&mut engine, "deliver", json!({}));
    assert_eq!(count(&engine, "delivered", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn compensation_undoes_the_latest_activity_first() {
    let mut engine = engine();
    engine.deploy_yaml(TRIP).unwrap();
    create(&mut engine, "trip", json!({}));
    complete_job(&mut engine, "book_hotel", json!({}));
    complete_job(&mut engine, "book_flight", json!({}));

    assert_eq!(count(&engine, "undo", ProcessInstanceIntent::ElementActivated), 1);
    assert!(
        position_of(&engine, "cancel_flight", ProcessInstanceIntent::ElementActivated)
            < position_of(&engine, "cancel_hotel", ProcessInstanceIntent::ElementActivated)
    );
    assert_eq!(engine.state().compensation_subscriptions.len(), 2);

    complete_job(&mut engine, "cancel_flight", json!({}));
    assert_eq!(count(&engine, "undo", ProcessInstanceIntent::ElementCompleted), 0);

    complete_job(&mut engine, "cancel_hotel", json!({}));
    assert_eq!(count(&engine, "undo", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "end", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().compensation_subscriptions.is_empty());
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn link_throw_continues_at_its_catch() {
    let mut engine = engine();
    engine.deploy_yaml(JUMP).unwrap();
    let pi = create(&mut engine, "jump", json!({}));

    complete_job(&mut engine, "first", json!({}));

    assert_eq!(count(&engine, "to_tail", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "from_head", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.contains(pi));
    complete_job(&mut engine, "second", json!({}));
    assert_eq!(count(&engine, "jump", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn sub_process_runs_its_own_flow_and_shares_variables() {
    let mut engine = engine();
    engine.deploy_yaml(ONBOARDING).unwrap();
    let pi = create(&mut engine, "onboarding", json!({}));

    let (_, provision_key) = jobs_of(&engine, "provision")[0];
    let scope_key = engine.state().element_instances.get(provision_key).and_then(|i| i.flow_scope_key());
    let scope = scope_key.and_then(|key| engine.state().element_instances.get(key)).expect("sub-process scope");
    assert_eq!(scope.value.element_id, "setup");
    assert_eq!(scope.value.element_type, ElementType::SubProcess);

    complete_job(&mut engine, "provision", json!({"account": "a-1"}));

    assert_eq!(count(&engine, "setup_end", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(count(&engine, "setup", ProcessInstanceIntent::ElementCompleted), 1);
    job_of(&engine, "welcome");
    assert_eq!(visible(&engine, pi)["account"], json!("a-1"));
}

#[test]
fn cancelling_terminates_the_sub_process_contents() {
    let mut engine = engine();
    engine.deploy_yaml(ONBOARDING).unwrap();
    let pi = create(&mut engine, "onboarding", json!({}));

    send(&mut engine, json!({"command": "cancel_instance", "process_instance_key": pi}));

    assert_eq!(count(&engine, "provision", ProcessInstanceIntent::ElementTerminated), 1);
    assert_eq!(count(&engine, "setup", ProcessInstanceIntent::ElementTerminated), 1);
    assert!(engine.state().jobs.is_empty());
    assert!(engine.state().element_instances.is_empty());
}

#[test]
fn user_task_completes_with_its_variables() {
    let mut engine = engine();
    engine.deploy_yaml(SIGN_OFF).unwrap();
    create(&mut engine, "sign_off", json!({"owner": "kim"}));

    let (user_task_key, task) = engine
        .state()
        .user_tasks
        .iter()
        .next()
        .map(|(key, task)| (key, task.clone()))
        .expect("a user task");
    assert_eq!(task.assignee.as_deref(), Some("kim"));
    assert_eq!(task.candidate_groups, vec!["managers".to_string()]);

    send(
        &mut engine,
        json!({"command": "complete_user_task", "user_task_key": user_task_key, "variables": {"signed": true}}),
    );
    assert!(engine.state().user_tasks.is_empty());
    assert_eq!(count(&engine, "sign", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.is_empty());

    send(&mut engine, json!({"command": "complete_user_task", "user_task_key": user_task_key}));
    assert_eq!(rejections(&engine), vec![RejectionType::NotFound]);
}

#[test]
fn business_rule_task_stores_the_decision_result() {
    let mut engine = Engine::new(
        EngineConfig::default(),
        Services::new(Arc::new(ControlledClock::new(1_000)))
            .with_decisions(StaticDecisionEvaluator::new().with_decision("risk", json!({"level": "low"}))),
    );
    engine.deploy_yaml(SCORING).unwrap();
    let pi = create(&mut engine, "scoring", json!({}));

    assert_eq!(count(&engine, "assess", ProcessInstanceIntent::ElementCompleted), 1);
    assert_eq!(visible(&engine, pi)["risk"], json!({"level": "low"}));
    job_of(&engine, "review");
}

#[test]
fn unknown_decision_raises_an_incident() {
    let mut engine = engine();
    engine.deploy_yaml(SCORING).unwrap();
    create(&mut engine, "scoring", json!({}));

    let incident = engine
        .state()
        .incidents
        .iter()
        .next()
        .map(|(_, incident)| incident.clone())
        .expect("an incident on the task");
    assert_eq!(incident.element_id, "assess");
    assert_eq!(count(&engine, "assess", ProcessInstanceIntent::ElementActivated), 0);
    assert!(engine.state().jobs.is_empty());
}

#[test]
fn exclusive_gateway_passes_every_arriving_path_through() {
    let mut engine = engine();
    engine.deploy_yaml(MERGE).unwrap();
    let pi = create(&mut engine, "merge", json!({}));

    complete_job(&mut engine, "a", json!({}));
    assert_eq!(count(&engine, "either", ProcessInstanceIntent::ElementCompleted), 1);
    assert!(engine.state().element_instances.contains(pi));

    complete_job(&mut engine, "b", json!({}));
    assert_eq!(count(&engine, "either", ProcessInstanceIntent::ElementCompleted), 2);
    assert_eq!(count(&engine, "end", ProcessInstanceIntent::ElementCompleted), 2);
    assert_eq!(engine.metrics().count(ElementType::Process, ElementAction::Completed), 1);
    assert!(engine.state().element_instances.is_empty());
}
