//! Interpreter-level scenarios: inheritance and pass(), the exception
//! model, resource quotas, and the eval contract, run against a real
//! in-memory world with no scheduler loop.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use warren_common::model::{VerbArgsSpec, VerbFlag};
use warren_common::tasks::{AbortLimitReason, NoopSession, TaskId};
use warren_db::{ObjectStore, WorldState};
use warren_kernel::config::Config;
use warren_kernel::tasks::TaskSchedulerClient;
use warren_kernel::vm::{TaskOutcome, VM, VMExecState};
use warren_kernel::BuiltinRegistry;
use warren_var::{NOTHING, Obj, Symbol, Var, v_int, v_list, v_str};

const WIZARD: Obj = Obj::mk_id(1);

/// Keep the control channel's receiver alive so scheduler-bound builtins
/// fail soft rather than panicking.
struct Harness {
    world: WorldState,
    vm: VM,
    _control: flume::Receiver<(TaskId, warren_kernel::tasks::SchedulerControlMsg)>,
}

fn harness() -> Harness {
    let world = WorldState::new(ObjectStore::bootstrap_minimal());
    let (sender, receiver) = flume::unbounded();
    let vm = VM {
        world: world.clone(),
        session: Arc::new(NoopSession),
        scheduler: TaskSchedulerClient::new(0, sender),
        config: Arc::new(Config::default()),
        kill_switch: Arc::new(AtomicBool::new(false)),
        builtins: Arc::new(BuiltinRegistry::new()),
    };
    Harness {
        world,
        vm,
        _control: receiver,
    }
}

fn add_verb(h: &Harness, obj: Obj, name: &str, code: &[&str]) {
    h.world
        .with_write(|s| {
            let idx = s
                .add_verb(
                    obj,
                    vec![name.to_string()],
                    WIZARD,
                    VerbFlag::rxd(),
                    VerbArgsSpec::this_none_this(),
                )
                .unwrap();
            s.set_verb_code(obj, idx, code.iter().map(|l| l.to_string()).collect())
        })
        .unwrap();
}

fn exec_state() -> VMExecState {
    VMExecState::new(0, WIZARD, 10_000, 30)
}

fn eval(h: &Harness, source: &str) -> TaskOutcome {
    let mut exec = exec_state();
    h.vm.execute_eval(&mut exec, source)
}

fn eval_ok(h: &Harness, source: &str) -> Var {
    match eval(h, source) {
        TaskOutcome::Success(v) => {
            let l = v.as_list().expect("eval returns a pair").clone();
            assert_eq!(l.index(1).unwrap(), v_int(1), "eval failed: {l:?}");
            l.index(2).unwrap()
        }
        other => panic!("eval aborted: {other:?}"),
    }
}

fn eval_err(h: &Harness, source: &str) -> String {
    match eval(h, source) {
        TaskOutcome::Success(v) => {
            let l = v.as_list().expect("eval returns a pair").clone();
            assert_eq!(l.index(1).unwrap(), v_int(0), "eval succeeded: {l:?}");
            l.index(2).unwrap().to_display_string()
        }
        other => panic!("eval aborted: {other:?}"),
    }
}

#[test]
fn arithmetic_and_logic() {
    let h = harness();
    assert_eq!(eval_ok(&h, "return 1 + 2 * 3;"), v_int(7));
    assert_eq!(eval_ok(&h, "return \"a\" + \"b\";"), v_str("ab"));
    // Short-circuit operators return the deciding operand, not a boolean.
    assert_eq!(eval_ok(&h, "return 0 || \"x\";"), v_str("x"));
    assert_eq!(eval_ok(&h, "return 1 && 2;"), v_int(2));
    assert_eq!(eval_ok(&h, "return 0 && 2;"), v_int(0));
    assert_eq!(eval_ok(&h, "return 3 ? \"yes\" | \"no\";"), v_str("yes"));
}

#[test]
fn division_by_zero_raises() {
    let h = harness();
    let msg = eval_err(&h, "return 1 / 0;");
    assert!(msg.contains("Division by zero"), "got: {msg}");
    let msg = eval_err(&h, "return 1 % 0;");
    assert!(msg.contains("Division by zero"), "got: {msg}");
}

#[test]
fn catch_expression_filters_codes() {
    let h = harness();
    // The matching code yields the default.
    assert_eq!(eval_ok(&h, "return `1 / 0 ! E_DIV => 42';"), v_int(42));
    // A non-matching code keeps propagating.
    let msg = eval_err(&h, "return `1 / 0 ! E_PERM => 42';");
    assert!(msg.contains("Division by zero"), "got: {msg}");
    // Without a default, the caught code itself is the value.
    assert_eq!(
        eval_ok(&h, "return `1 / 0 ! ANY';").to_literal(),
        "E_DIV"
    );
}

#[test]
fn try_except_and_finally() {
    let h = harness();
    assert_eq!(
        eval_ok(
            &h,
            "try return 1 / 0; except e (E_DIV) return e[1]; endtry"
        )
        .to_literal(),
        "E_DIV"
    );
    // finally runs on the return path but does not replace the value.
    assert_eq!(
        eval_ok(&h, "x = 1; try return 2; finally x = 3; endtry return x;"),
        v_int(2)
    );
    // An error value flowing normally is not caught.
    assert_eq!(
        eval_ok(
            &h,
            "try x = length(1); except (ANY) return \"caught\"; endtry return \"flowed\";"
        ),
        v_str("flowed")
    );
}

#[test]
fn unbound_variable_raises_varnf() {
    let h = harness();
    let msg = eval_err(&h, "return frobnitz;");
    assert!(msg.contains("Variable not found"), "got: {msg}");
}

#[test]
fn indexing_and_dollar() {
    let h = harness();
    assert_eq!(eval_ok(&h, "l = {10, 20, 30}; return l[$];"), v_int(30));
    assert_eq!(
        eval_ok(&h, "s = \"frobozz\"; return s[2..$];"),
        v_str("robozz")
    );
    let msg = eval_err(&h, "l = {1}; return l[2];");
    assert!(msg.contains("Range error"), "got: {msg}");
    // Assignment through an index rebuilds and rebinds the base.
    assert_eq!(
        eval_ok(&h, "l = {1, {2, 3}}; l[2][1] = 9; return l;"),
        v_list(&[v_int(1), v_list(&[v_int(9), v_int(3)])])
    );
}

#[test]
fn splice_and_scatter() {
    let h = harness();
    assert_eq!(
        eval_ok(&h, "a = {2, 3}; return {1, @a, 4};"),
        v_list(&[v_int(1), v_int(2), v_int(3), v_int(4)])
    );
    assert_eq!(
        eval_ok(
            &h,
            "{a, ?b, ?c = 10, @rest} = {1, 2, 3, 4, 5}; return {a, b, c, rest};"
        ),
        v_list(&[
            v_int(1),
            v_int(2),
            v_int(3),
            v_list(&[v_int(4), v_int(5)])
        ])
    );
    // Optionals fall back to defaults when the list is short.
    assert_eq!(
        eval_ok(&h, "{a, ?b, ?c = 10, @rest} = {1}; return {a, c, rest};"),
        v_list(&[v_int(1), v_int(10), v_list(&[])])
    );
    let msg = eval_err(&h, "{a, b} = {1};");
    assert!(msg.contains("arguments"), "got: {msg}");
}

#[test]
fn inheritance_and_pass() {
    let h = harness();
    let parent = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    let child = h
        .world
        .with_write(|s| s.create_object(parent, WIZARD))
        .unwrap();
    add_verb(&h, parent, "test", &["return \"parent\";"]);
    add_verb(&h, child, "test", &["return pass();"]);

    let mut exec = exec_state();
    let outcome = h.vm.execute_verb(&mut exec, child, "test", vec![], WIZARD);
    match outcome {
        TaskOutcome::Success(v) => assert_eq!(v, v_str("parent")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn verb_dispatch_switches_perms() {
    let h = harness();
    let owner = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    let obj = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    h.world
        .with_write(|s| {
            let idx = s
                .add_verb(
                    obj,
                    vec!["whoami".to_string()],
                    owner,
                    VerbFlag::rxd(),
                    VerbArgsSpec::this_none_this(),
                )
                .unwrap();
            s.set_verb_code(obj, idx, vec!["return caller_perms();".to_string()])
        })
        .unwrap();

    // From eval (running as the wizard), the verb's caller_perms is the
    // eval frame's authority.
    let v = eval_ok(&h, &format!("return {obj}:whoami();"));
    assert_eq!(v.to_literal(), WIZARD.to_string());
}

#[test]
fn verb_ast_is_cached_after_first_run() {
    let h = harness();
    let obj = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    add_verb(&h, obj, "probe", &["return 7;"]);

    let cached_before = h
        .world
        .with_read(|s| s.get(obj).unwrap().verbs[0].program.is_some());
    assert!(!cached_before);

    assert_eq!(eval_ok(&h, &format!("return {obj}:probe();")), v_int(7));
    let cached_after = h
        .world
        .with_read(|s| s.get(obj).unwrap().verbs[0].program.is_some());
    assert!(cached_after);

    // Editing the source invalidates the cache.
    h.world
        .with_write(|s| s.set_verb_code(obj, 0, vec!["return 8;".to_string()]))
        .unwrap();
    let cached = h
        .world
        .with_read(|s| s.get(obj).unwrap().verbs[0].program.is_some());
    assert!(!cached);
    assert_eq!(eval_ok(&h, &format!("return {obj}:probe();")), v_int(8));
}

#[test]
fn tick_quota_aborts_infinite_loop() {
    let h = harness();
    let obj = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    add_verb(&h, obj, "spin", &["while (1)", "endwhile"]);

    let mut exec = exec_state();
    let outcome = h.vm.execute_verb(&mut exec, obj, "spin", vec![], WIZARD);
    match outcome {
        TaskOutcome::AbortLimit(AbortLimitReason::Ticks(n)) => assert_eq!(n, 10_000),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn excessive_recursion_raises_maxrec() {
    let h = harness();
    let obj = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    add_verb(&h, obj, "loop", &["return this:loop();"]);
    let msg = eval_err(&h, &format!("return {obj}:loop();"));
    assert!(msg.contains("Too many verb calls"), "got: {msg}");
}

#[test]
fn eval_contract_shapes() {
    let h = harness();
    // Success pair.
    assert_eq!(eval_ok(&h, "return 1 + 1;"), v_int(2));
    // Parse failure is {0, message}, not an abort.
    let msg = eval_err(&h, "return 1 +;");
    assert!(!msg.is_empty());
    // Builtin failures come back as error values, which the caller
    // inspects rather than catches.
    assert_eq!(
        eval_ok(&h, "return typeof(length(1));"),
        v_int(3) // ERR
    );
}

#[test]
fn property_access_from_code() {
    let h = harness();
    let obj = h
        .world
        .with_write(|s| s.create_object(NOTHING, WIZARD))
        .unwrap();
    h.world
        .with_write(|s| {
            s.add_property(
                obj,
                Symbol::mk("color"),
                v_str("red"),
                WIZARD,
                warren_common::model::PropFlag::rc(),
            )
        })
        .unwrap();
    assert_eq!(eval_ok(&h, &format!("return {obj}.color;")), v_str("red"));
    assert_eq!(
        eval_ok(&h, &format!("{obj}.color = \"blue\"; return {obj}.color;")),
        v_str("blue")
    );
    let msg = eval_err(&h, &format!("return {obj}.missing;"));
    assert!(msg.contains("Property not found"), "got: {msg}");
    let msg = eval_err(&h, "return #999.name;");
    assert!(msg.contains("Invalid indirection"), "got: {msg}");
    // Dynamic property reference.
    assert_eq!(
        eval_ok(&h, &format!("return {obj}.(\"col\" + \"or\");")),
        v_str("blue")
    );
}

#[test]
fn builtin_dispatch_through_call_function() {
    let h = harness();
    assert_eq!(
        eval_ok(&h, "return call_function(\"length\", {1, 2, 3});"),
        v_int(3)
    );
    let msg = eval_err(&h, "return no_such_builtin();");
    assert!(msg.contains("Unknown built-in"), "got: {msg}");
}

#[test]
fn builtin_laws_and_boundaries() {
    let h = harness();
    // encode_binary is the left inverse of decode_binary on strings.
    assert_eq!(
        eval_ok(&h, "return encode_binary(@decode_binary(\"foo~0Abar~7E\"));"),
        v_str("foo~0Abar~7E")
    );
    assert_eq!(
        eval_ok(&h, "return decode_binary(\"a~00b\");").to_literal(),
        "{\"a\", 0, \"b\"}"
    );
    // tostr(toint(s)) = s for integer strings.
    assert_eq!(eval_ok(&h, "return tostr(toint(\"-42\"));"), v_str("-42"));
    // Empty collections measure zero.
    assert_eq!(eval_ok(&h, "return length(\"\");"), v_int(0));
    assert_eq!(eval_ok(&h, "return length({});"), v_int(0));
    // Regex dialect: grouping and the nine-slot capture contract.
    assert_eq!(
        eval_ok(
            &h,
            "m = match(\"foobar\", \"f%(o+%)b\"); return {m[1], m[2], m[3][1], m[4]};"
        ),
        v_list(&[
            v_int(1),
            v_int(4),
            v_list(&[v_int(2), v_int(3)]),
            v_str("foob")
        ])
    );
    assert_eq!(
        eval_ok(&h, "return match(\"xyz\", \"q\");"),
        v_list(&[])
    );
    // rmatch finds the rightmost occurrence.
    assert_eq!(
        eval_ok(&h, "return rmatch(\"foofoo\", \"foo\")[1];"),
        v_int(4)
    );
}

#[test]
fn raise_carries_message_and_value() {
    let h = harness();
    assert_eq!(
        eval_ok(
            &h,
            "try raise(E_PERM, \"nope\", 99); except e (E_PERM) return {e[2], e[3]}; endtry"
        ),
        v_list(&[v_str("nope"), v_int(99)])
    );
    // The permissive widening: string codes raise and match by value.
    assert_eq!(
        eval_ok(
            &h,
            "try raise(\"custom\"); except e (\"custom\") return \"caught\"; endtry"
        ),
        v_str("caught")
    );
}
