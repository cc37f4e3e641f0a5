use flowtree::compiler::core::Compiler;
use flowtree::dsl::builder::ProcessBuilder;
use flowtree::dsl::Process;
use flowtree::runtime::context::Data;
use flowtree::actions::DecisionTable;
use flowtree::{Engine, EngineConfig, EngineError, ProcessInstance, Signal, TaskState};
use serde_json::{json, Value};
use std::sync::Arc;

fn data(value: Value) -> Data {
    serde_json::from_value(value).expect("object literal")
}

fn start(engine: Engine, process: Process) -> ProcessInstance {
    let graph = Compiler::new().compile(process).expect("Compilation failed");
    let id = graph.id.clone();
    engine.register_process(graph);
    Arc::new(engine).instantiate(&id).expect("Failed to instantiate")
}

fn ready_id(instance: &ProcessInstance, name: &str) -> usize {
    instance
        .ready_tasks()
        .into_iter()
        .find(|t| t.name() == name)
        .map(|t| t.id())
        .unwrap_or_else(|| panic!("{} is not ready", name))
}

fn states(instance: &ProcessInstance) -> Vec<(usize, TaskState)> {
    instance.tasks().map(|t| (t.id(), t.state())).collect()
}

fn linear_process() -> Process {
    ProcessBuilder::new("engine-test-linear")
        .start("start")
        .script("prepare", "x = 1")
        .user("Approve")
        .script("finish", "y = x + 1")
        .end("end")
        .connect("start", "prepare")
        .connect("prepare", "Approve")
        .connect("Approve", "finish")
        .connect("finish", "end")
        .build()
}

#[test]
fn test_linear_execution_waits_for_human_task() {
    let mut instance = start(Engine::new(), linear_process());
    instance.advance().unwrap();

    let ready: Vec<&str> = instance.ready_tasks().iter().map(|t| t.name()).collect();
    assert_eq!(ready, vec!["Approve"]);
    assert_eq!(instance.state(), TaskState::Started);
    assert_eq!(instance.data().get("x"), Some(&json!(1)));

    let approve = ready_id(&instance, "Approve");
    instance.complete(approve, data(json!({"approved": true}))).unwrap();
    instance.advance().unwrap();

    assert!(instance.is_completed());
    let result = instance.data();
    assert_eq!(result.get("y"), Some(&json!(2)));
    assert_eq!(result.get("approved"), Some(&json!(true)));
    assert_eq!(instance.last_task().map(|t| t.name()), Some("end"));
}

#[test]
fn test_advance_is_idempotent() {
    let mut instance = start(Engine::new(), linear_process());
    instance.advance().unwrap();
    let before = states(&instance);
    let nav_before = instance.navigation();

    instance.advance().unwrap();
    instance.advance().unwrap();

    assert_eq!(states(&instance), before);
    assert_eq!(instance.navigation(), nav_before);
}

#[test]
fn test_api_misuse_leaves_instance_untouched() {
    let mut instance = start(Engine::new(), linear_process());
    instance.advance().unwrap();
    let before = states(&instance);

    let prepare = instance.tasks_for_spec("prepare")[0].id();
    let err = instance.complete(prepare, Data::new()).unwrap_err();
    assert_eq!(err, EngineError::InvalidState { task: prepare, state: TaskState::Completed });

    assert_eq!(instance.complete(999, Data::new()), Err(EngineError::UnknownTask(999)));
    assert_eq!(
        instance.raise_signal(Signal::error(None, "boom"), Some(999)),
        Err(EngineError::UnknownTask(999))
    );
    assert!(matches!(
        instance.raise_signal(Signal::Cancel, None),
        Err(EngineError::MissingSignalTarget(_))
    ));

    assert_eq!(states(&instance), before);
}

#[test]
fn test_prescript_and_postscript_wrap_the_behaviour() {
    let process = ProcessBuilder::new("scripts")
        .var("base", 10)
        .start("start")
        .script("calc", "total = base + bonus")
            .prescript("bonus = 5")
            .postscript("total = total * 2")
        .end("end")
        .connect("start", "calc")
        .connect("calc", "end")
        .build();
    let mut instance = start(Engine::new(), process);
    instance.advance().unwrap();

    assert!(instance.is_completed());
    assert_eq!(instance.data().get("total"), Some(&json!(30)));
    assert_eq!(instance.data().get("bonus"), Some(&json!(5)));
}

#[test]
fn test_instantiate_overrides_default_variables() {
    let process = ProcessBuilder::new("defaults")
        .var("greeting", "hello")
        .var("name", "nobody")
        .start("start")
        .end("end")
        .connect("start", "end")
        .build();
    let graph = Compiler::new().compile(process).unwrap();
    let engine = Engine::new();
    engine.register_process(graph);
    let engine = Arc::new(engine);

    let mut instance = engine.instantiate_with("defaults", data(json!({"name": "ada"}))).unwrap();
    instance.advance().unwrap();

    assert!(instance.is_completed());
    assert_eq!(instance.data().get("greeting"), Some(&json!("hello")));
    assert_eq!(instance.data().get("name"), Some(&json!("ada")));
    assert!(matches!(engine.instantiate("missing"), Err(EngineError::ProcessNotFound(_))));
}

#[test]
fn test_terminate_end_cancels_the_rest_of_the_scope() {
    let process = ProcessBuilder::new("terminate")
        .start("start")
        .parallel_gateway("split")
        .user("Wait")
        .terminate_end("stop")
        .end("end")
        .connect("start", "split")
        .connect("split", "Wait")
        .connect("split", "stop")
        .connect("Wait", "end")
        .build();
    let mut instance = start(Engine::new(), process);
    instance.advance().unwrap();

    assert!(instance.is_completed());
    assert_eq!(instance.tasks_for_spec("Wait")[0].state(), TaskState::Cancelled);
    assert_eq!(instance.tasks_for_spec("end")[0].state(), TaskState::Cancelled);
    assert!(instance.ready_tasks().is_empty());
}

#[test]
fn test_step_limit_stops_runaway_loops() {
    let process = ProcessBuilder::new("runaway")
        .var("n", 0)
        .start("start")
        .script("bump", "n = n + 1")
        .exclusive("again")
        .end("end")
        .connect("start", "bump")
        .connect("bump", "again")
        .connect_if("again", "bump", "n < 1000000")
        .connect_default("again", "end")
        .build();
    let config = EngineConfig { max_steps: 50, ..EngineConfig::default() };
    let mut instance = start(Engine::with_config(config), process);

    assert_eq!(instance.advance(), Err(EngineError::StepLimitExceeded(50)));
}

#[test]
fn test_custom_functions_are_callable_from_guards() {
    let process = ProcessBuilder::new("functions")
        .var("word", "level")
        .start("start")
        .exclusive("check")
        .script("yes", "palindrome = true")
        .script("no", "palindrome = false")
        .end("end")
        .connect("start", "check")
        .connect_if("check", "yes", "is_palindrome(word)")
        .connect_default("check", "no")
        .connect("yes", "end")
        .connect("no", "end")
        .build();

    let mut engine = Engine::new();
    engine.register_function("is_palindrome", |args: Vec<Value>| -> Result<Value, String> {
        let word = args.first().and_then(|v| v.as_str()).ok_or("expected a string")?;
        Ok(json!(word.chars().eq(word.chars().rev())))
    });
    let mut instance = start(engine, process);
    instance.advance().unwrap();

    assert!(instance.is_completed());
    assert_eq!(instance.data().get("palindrome"), Some(&json!(true)));
}

#[test]
fn test_failed_script_fails_the_instance() {
    let process = ProcessBuilder::new("broken")
        .start("start")
        .script("divide", "x = 1 / missing")
        .end("end")
        .connect("start", "divide")
        .connect("divide", "end")
        .build();
    let mut instance = start(Engine::new(), process);

    let err = instance.advance().unwrap_err();
    assert!(matches!(err, EngineError::Expression { .. }));
    assert_eq!(instance.state(), TaskState::Error);

    let divide = instance.tasks_for_spec("divide")[0];
    assert_eq!(divide.state(), TaskState::Error);
    let failure = instance.failure().expect("failure recorded");
    assert_eq!(failure.task, divide.id());
    assert_eq!(failure.signal.code(), Some("ExpressionError"));
    assert_eq!(instance.tasks_for_spec("end")[0].state(), TaskState::Cancelled);
}

#[derive(Debug)]
struct DiscountTable;

impl DecisionTable for DiscountTable {
    fn name(&self) -> &str {
        "discount"
    }

    fn evaluate(&self, input: &Data) -> anyhow::Result<Data> {
        let total = input
            .get("total")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("total is missing"))?;
        let rate = if total >= 100.0 { 0.1 } else { 0.0 };
        Ok(data(json!({"discount_rate": rate})))
    }
}

fn discount_process() -> Process {
    ProcessBuilder::new("discount")
        .start("start")
        .business_rule("Decide_Discount", "discount")
        .end("end")
        .connect("start", "Decide_Discount")
        .connect("Decide_Discount", "end")
        .build()
}

#[test]
fn test_business_rule_task_merges_decision_output() {
    let mut engine = Engine::new();
    engine.register_decision(Arc::new(DiscountTable));
    let graph = Compiler::new().compile(discount_process()).unwrap();
    engine.register_process(graph);
    let engine = Arc::new(engine);

    let mut instance = engine.instantiate_with("discount", data(json!({"total": 150}))).unwrap();
    instance.advance().unwrap();
    assert!(instance.is_completed());
    assert_eq!(instance.data().get("discount_rate"), Some(&json!(0.1)));

    let mut instance = engine.instantiate("discount").unwrap();
    let err = instance.advance().unwrap_err();
    assert!(matches!(err, EngineError::Data { ref task, .. } if task == "Decide_Discount"));
}

#[test]
fn test_unregistered_decision_is_reported() {
    let mut instance = start(Engine::new(), discount_process());
    assert_eq!(instance.advance(), Err(EngineError::DecisionNotFound("discount".to_string())));
    assert_eq!(instance.state(), TaskState::Error);
}
