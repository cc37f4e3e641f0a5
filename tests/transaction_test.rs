use flowtree::compiler::core::Compiler;
use flowtree::dsl::builder::ProcessBuilder;
use flowtree::dsl::{Process, TriggerDef};
use flowtree::runtime::context::Data;
use flowtree::runtime::task::ScopeState;
use flowtree::{Engine, ProcessInstance, Signal, TaskState};
use serde_json::{json, Value};
use std::sync::Arc;

fn data(value: Value) -> Data {
    serde_json::from_value(value).expect("object literal")
}

/// Start -> [Subprocess: transaction] -> Activity_Print_Data -> End, with an
/// error "1" (non-interrupting), a catch-all error and a cancel boundary on
/// the transaction.
fn transaction_process() -> Process {
    let body = ProcessBuilder::new("body")
        .start("Tx_Start")
        .user("Activity_Get_Data")
        .exclusive("Gateway_Value")
        .cancel_end("Cancel_End")
        .user("Activity_Get_Quantity")
        .exclusive("Gateway_Quantity")
        .error_end("Error_None", None)
        .error_end("Error_1", Some("1"))
        .end("Tx_End")
        .connect("Tx_Start", "Activity_Get_Data")
        .connect("Activity_Get_Data", "Gateway_Value")
        .connect_if("Gateway_Value", "Cancel_End", "value == \"\"")
        .connect_default("Gateway_Value", "Activity_Get_Quantity")
        .connect("Activity_Get_Quantity", "Gateway_Quantity")
        .connect_if("Gateway_Quantity", "Error_None", "quantity == 0")
        .connect_if("Gateway_Quantity", "Error_1", "quantity < 0")
        .connect_default("Gateway_Quantity", "Tx_End");

    ProcessBuilder::new("transaction-subprocess")
        .start("Start")
        .transaction("Subprocess", body)
        .script("Activity_Print_Data", "printed = true")
        .end("End")
        .non_interrupting_boundary("Catch_Error_1", "Subprocess", TriggerDef::error(Some("1")))
        .script("Activity_Error_1", "error_1_seen = true")
        .end("End_Error_1")
        .boundary("Catch_Error_None", "Subprocess", TriggerDef::error(None))
        .end("End_Error_None")
        .boundary("Catch_Cancel_Event", "Subprocess", TriggerDef::Cancel)
        .script("Cancel_Action", "cancelled = true")
        .end("End_Cancel")
        .connect("Start", "Subprocess")
        .connect("Subprocess", "Activity_Print_Data")
        .connect("Activity_Print_Data", "End")
        .connect("Catch_Error_1", "Activity_Error_1")
        .connect("Activity_Error_1", "End_Error_1")
        .connect("Catch_Error_None", "End_Error_None")
        .connect("Catch_Cancel_Event", "Cancel_Action")
        .connect("Cancel_Action", "End_Cancel")
        .build()
}

fn start() -> ProcessInstance {
    let graph = Compiler::new().compile(transaction_process()).expect("Compilation failed");
    let engine = Engine::new();
    engine.register_process(graph);
    let mut instance = Arc::new(engine).instantiate("transaction-subprocess").unwrap();
    instance.advance().unwrap();
    instance
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

fn run(value: &str, quantity: Option<i64>) -> ProcessInstance {
    let mut instance = start();
    answer(&mut instance, "Activity_Get_Data", json!({"value": value}));
    if let Some(quantity) = quantity {
        answer(&mut instance, "Activity_Get_Quantity", json!({"quantity": quantity}));
    }
    instance
}

fn state_of(instance: &ProcessInstance, name: &str) -> TaskState {
    let tasks = instance.tasks_for_spec(name);
    assert_eq!(tasks.len(), 1, "expected exactly one task for {}", name);
    tasks[0].state()
}

fn final_data(instance: &ProcessInstance) -> Data {
    let last = instance.last_task().expect("a task completed");
    instance.task_data(last.id()).expect("known task")
}

#[test]
fn test_normal_completion_commits_the_transaction() {
    let instance = run("asdf", Some(2));

    assert!(instance.is_completed());
    assert_eq!(state_of(&instance, "Catch_Error_1"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Catch_Error_None"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Catch_Cancel_Event"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Subprocess"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Activity_Print_Data"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Cancel_Action"), TaskState::Cancelled);

    let data = final_data(&instance);
    assert_eq!(data.get("value"), Some(&json!("asdf")));
    assert_eq!(data.get("quantity"), Some(&json!(2)));
    assert_eq!(data.get("printed"), Some(&json!(true)));

    let tx = instance.tasks_for_spec("Subprocess")[0];
    assert_eq!(tx.scope_state(), Some(ScopeState::Committed));
}

#[test]
fn test_cancel_end_rolls_back_and_runs_cancel_handler() {
    let instance = run("", None);

    assert!(instance.is_completed());
    assert_eq!(state_of(&instance, "Cancel_Action"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Catch_Cancel_Event"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Catch_Error_1"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Catch_Error_None"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Activity_Print_Data"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Subprocess"), TaskState::Cancelled);

    let data = final_data(&instance);
    assert!(!data.contains_key("value"));
    assert_eq!(data.get("cancelled"), Some(&json!(true)));

    let tx = instance.tasks_for_spec("Subprocess")[0];
    assert_eq!(tx.scope_state(), Some(ScopeState::RolledBack));
    assert_eq!(tx.own_data().map(|d| d.len()), Some(0));
}

#[test]
fn test_uncoded_error_is_caught_by_the_catch_all() {
    let instance = run("asdf", Some(0));

    assert!(instance.is_completed());
    assert_eq!(state_of(&instance, "Catch_Error_None"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Catch_Error_1"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Catch_Cancel_Event"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Activity_Print_Data"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "End_Error_None"), TaskState::Completed);

    let data = final_data(&instance);
    assert!(!data.contains_key("value"));
    assert!(!data.contains_key("quantity"));
}

#[test]
fn test_coded_error_fires_both_error_boundaries() {
    let instance = run("asdf", Some(-1));

    assert!(instance.is_completed());
    assert_eq!(state_of(&instance, "Catch_Error_1"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Catch_Error_None"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Catch_Cancel_Event"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Activity_Error_1"), TaskState::Completed);
    assert_eq!(state_of(&instance, "Activity_Print_Data"), TaskState::Cancelled);

    let data = final_data(&instance);
    assert!(!data.contains_key("value"));
    assert_eq!(instance.data().get("error_1_seen"), Some(&json!(true)));
}

#[test]
fn test_transaction_writes_stay_invisible_until_commit() {
    let mut instance = start();
    answer(&mut instance, "Activity_Get_Data", json!({"value": "pending"}));

    assert!(!instance.data().contains_key("value"));
    let inside = instance.ready_tasks()[0].id();
    assert_eq!(
        instance.task_data(inside).and_then(|d| d.get("value").cloned()),
        Some(json!("pending"))
    );
}

#[test]
fn test_fired_boundary_remembers_its_signal() {
    let instance = run("asdf", Some(-1));
    let fired = instance.tasks_for_spec("Catch_Error_1")[0].fired().cloned();
    assert_eq!(fired.and_then(|s| s.code().map(str::to_string)), Some("1".to_string()));
}

fn subprocess_process(outputs: &[&str]) -> Process {
    let body = ProcessBuilder::new("body")
        .start("Calc_Start")
        .script("Multiply", "total = price * quantity; scratch = 1")
        .end("Calc_End")
        .connect("Calc_Start", "Multiply")
        .connect("Multiply", "Calc_End");

    ProcessBuilder::new("embedded")
        .var("price", 3)
        .var("quantity", 4)
        .start("start")
        .subprocess("Calc", body)
        .outputs(outputs)
        .postscript("with_tax = total + 1")
        .end("end")
        .connect("start", "Calc")
        .connect("Calc", "end")
        .build()
}

fn run_to_end(process: Process) -> ProcessInstance {
    let graph = Compiler::new().compile(process).expect("Compilation failed");
    let id = graph.id.clone();
    let engine = Engine::new();
    engine.register_process(graph);
    let mut instance = Arc::new(engine).instantiate(&id).unwrap();
    instance.advance().unwrap();
    instance
}

#[test]
fn test_subprocess_merges_declared_outputs_only() {
    let instance = run_to_end(subprocess_process(&["total"]));

    assert!(instance.is_completed());
    let data = instance.data();
    assert_eq!(data.get("total"), Some(&json!(12)));
    assert_eq!(data.get("with_tax"), Some(&json!(13)));
    assert!(!data.contains_key("scratch"));
}

#[test]
fn test_subprocess_without_outputs_merges_everything() {
    let instance = run_to_end(subprocess_process(&[]));

    let data = instance.data();
    assert_eq!(data.get("total"), Some(&json!(12)));
    assert_eq!(data.get("scratch"), Some(&json!(1)));
}

/// An unguarded transaction inside a subprocess that catches every error.
fn nested_transaction_process() -> Process {
    let ledger = ProcessBuilder::new("ledger")
        .start("Tx_Start")
        .script("Stage", "staged = true")
        .user("Confirm")
        .end("Tx_End")
        .connect("Tx_Start", "Stage")
        .connect("Stage", "Confirm")
        .connect("Confirm", "Tx_End");
    let body = ProcessBuilder::new("body")
        .start("Sub_Start")
        .transaction("Ledger", ledger)
        .end("Sub_End")
        .connect("Sub_Start", "Ledger")
        .connect("Ledger", "Sub_End");

    ProcessBuilder::new("nested-transaction")
        .start("start")
        .subprocess("Booking", body)
        .end("end")
        .boundary("Booking_Failed", "Booking", TriggerDef::error(None))
        .script("Recover", "recovered = true")
        .end("end_recovered")
        .connect("start", "Booking")
        .connect("Booking", "end")
        .connect("Booking_Failed", "Recover")
        .connect("Recover", "end_recovered")
        .build()
}

#[test]
fn test_uncaught_error_rolls_back_transaction_and_propagates() {
    let mut instance = run_to_end(nested_transaction_process());
    let confirm = instance.tasks_for_spec("Confirm")[0].id();
    assert_eq!(
        instance.task_data(confirm).and_then(|d| d.get("staged").cloned()),
        Some(json!(true))
    );

    let caught = instance
        .raise_signal(Signal::error(Some("ledger_locked"), "locked"), Some(confirm))
        .unwrap();
    assert!(caught);
    instance.advance().unwrap();

    assert!(instance.is_completed());
    assert_eq!(state_of(&instance, "Confirm"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Ledger"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Booking"), TaskState::Cancelled);
    assert_eq!(state_of(&instance, "Booking_Failed"), TaskState::Completed);
    assert_eq!(state_of(&instance, "end"), TaskState::Cancelled);

    let ledger = instance.tasks_for_spec("Ledger")[0];
    assert_eq!(ledger.scope_state(), Some(ScopeState::RolledBack));
    assert_eq!(ledger.own_data().map(|d| d.len()), Some(0));

    let data = instance.data();
    assert!(!data.contains_key("staged"));
    assert_eq!(data.get("recovered"), Some(&json!(true)));
}
