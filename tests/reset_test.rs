use flowtree::compiler::core::Compiler;
use flowtree::dsl::builder::ProcessBuilder;
use flowtree::dsl::Process;
use flowtree::runtime::context::Data;
use flowtree::{Engine, EngineError, ProcessInstance, TaskState};
use serde_json::{json, Value};
use std::sync::Arc;

fn data(value: Value) -> Data {
    serde_json::from_value(value).expect("object literal")
}

/// Start -> Task1 -> [Sub: SubTask2] -> Task2 -> End
fn nested_process() -> Process {
    let body = ProcessBuilder::new("body")
        .start("Sub_Start")
        .user("SubTask2")
        .end("Sub_End")
        .connect("Sub_Start", "SubTask2")
        .connect("SubTask2", "Sub_End");

    ProcessBuilder::new("resettable")
        .start("start")
        .user("Task1")
        .subprocess("Sub", body)
        .user("Task2")
        .end("end")
        .connect("start", "Task1")
        .connect("Task1", "Sub")
        .connect("Sub", "Task2")
        .connect("Task2", "end")
        .build()
}

fn start() -> ProcessInstance {
    let graph = Compiler::new().compile(nested_process()).expect("Compilation failed");
    let engine = Engine::new();
    engine.register_process(graph);
    let mut instance = Arc::new(engine).instantiate("resettable").unwrap();
    instance.advance().unwrap();
    instance
}

fn ready_names(instance: &ProcessInstance) -> Vec<&str> {
    instance.ready_tasks().iter().map(|t| t.name()).collect()
}

fn answer(instance: &mut ProcessInstance, name: &str, input: Value) {
    let id = instance
        .ready_tasks()
        .into_iter()
        .find(|t| t.name() == name)
        .map(|t| t.id())
        .unwrap_or_else(|| panic!("{} is not ready", name));
    instance.complete(id, data(input)).unwrap();
    instance.advance().unwrap();
}

#[test]
fn test_reset_to_outer_task_while_inside_subprocess() {
    let mut instance = start();
    answer(&mut instance, "Task1", json!({"choice": "a"}));
    assert_eq!(ready_names(&instance), vec!["SubTask2"]);

    let task1 = instance.tasks_for_spec("Task1")[0].id();
    instance.reset_to(task1).unwrap();
    instance.advance().unwrap();

    assert_eq!(ready_names(&instance), vec!["Task1"]);
    assert_eq!(instance.tasks_for_spec("Sub")[0].state(), TaskState::Cancelled);
    assert_eq!(instance.tasks_for_spec("SubTask2")[0].state(), TaskState::Cancelled);
    // earlier answers are kept
    assert_eq!(instance.data().get("choice"), Some(&json!("a")));

    answer(&mut instance, "Task1", json!({"choice": "b"}));
    assert_eq!(ready_names(&instance), vec!["SubTask2"]);
    assert_eq!(instance.tasks_for_spec("SubTask2").len(), 2);

    answer(&mut instance, "SubTask2", json!({}));
    answer(&mut instance, "Task2", json!({}));
    assert!(instance.is_completed());
    assert_eq!(instance.data().get("choice"), Some(&json!("b")));
}

#[test]
fn test_reset_needs_a_completed_task_in_an_open_scope() {
    let mut instance = start();
    let task1 = instance.tasks_for_spec("Task1")[0].id();
    assert_eq!(
        instance.reset_to(task1),
        Err(EngineError::InvalidState { task: task1, state: TaskState::Ready })
    );
    assert_eq!(instance.reset_to(999), Err(EngineError::UnknownTask(999)));

    answer(&mut instance, "Task1", json!({}));
    answer(&mut instance, "SubTask2", json!({}));
    assert_eq!(ready_names(&instance), vec!["Task2"]);

    // the subprocess around it already finished
    let sub = instance.tasks_for_spec("Sub")[0].id();
    let inner = instance.tasks_for_spec("SubTask2")[0].id();
    assert_eq!(
        instance.reset_to(inner),
        Err(EngineError::InvalidState { task: sub, state: TaskState::Completed })
    );

    answer(&mut instance, "Task2", json!({}));
    assert!(instance.is_completed());
    assert_eq!(
        instance.reset_to(task1),
        Err(EngineError::InvalidState { task: 0, state: TaskState::Completed })
    );
}
