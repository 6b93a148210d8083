//! Built-in conformance suite for the legacy layers, run by the `jsse-legacy`
//! binary. Each check gets a fresh [`Interpreter`].

use crate::interpreter::generator::{FnGenerator, GeneratorStep, ListGenerator, Resumption};
use crate::interpreter::{
    Completion, GeneratorState, JsFunction, LegacyGenerator, PropertyDescriptor,
    create_virtual_function, create_virtual_object, normalize_and_complete_property_descriptor,
    strict_equality, to_js_string, to_property_key,
};
use crate::types::{JsObject, JsValue};
use crate::Interpreter;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckFailure {
    #[error("{0}")]
    Assertion(String),
    #[error("uncaught exception: {0}")]
    Uncaught(String),
}

type CheckResult = Result<(), CheckFailure>;

pub struct Check {
    pub name: &'static str,
    pub description: &'static str,
    body: fn(&mut Interpreter) -> CheckResult,
}

impl Check {
    pub fn run(&self) -> CheckResult {
        log::debug!("running check {}", self.name);
        let mut interp = Interpreter::new();
        (self.body)(&mut interp)
    }
}

pub static CHECKS: &[Check] = &[
    Check {
        name: "newborn-close",
        description: "closing a fresh generator never resumes it",
        body: newborn_close,
    },
    Check {
        name: "next-suspends",
        description: "next returns the yielded value and leaves the generator suspended",
        body: next_suspends,
    },
    Check {
        name: "completion-throws-stop-iteration",
        description: "finishing throws the StopIteration singleton and closes",
        body: completion_throws_stop_iteration,
    },
    Check {
        name: "reentry-is-type-error",
        description: "next/send/close/throw from inside the body are TypeErrors",
        body: reentry_is_type_error,
    },
    Check {
        name: "throw-on-newborn-rethrows",
        description: "throw on a fresh generator rethrows the same value and closes",
        body: throw_on_newborn_rethrows,
    },
    Check {
        name: "closed-is-terminal",
        description: "a closed generator keeps signalling completion",
        body: closed_is_terminal,
    },
    Check {
        name: "direct-get-trap",
        description: "a handler get trap answers every property read",
        body: direct_get_trap,
    },
    Check {
        name: "get-from-property-descriptor",
        description: "get is derived from getPropertyDescriptor",
        body: get_from_property_descriptor,
    },
    Check {
        name: "derived-set-round-trip",
        description: "derived set defines a new property that get then observes",
        body: derived_set_round_trip,
    },
    Check {
        name: "derived-set-read-only",
        description: "derived set fails on a read-only property without defining",
        body: derived_set_read_only,
    },
    Check {
        name: "descriptor-conflict",
        description: "a descriptor with both value and get is rejected",
        body: descriptor_conflict,
    },
    Check {
        name: "virtual-function-shared-trap",
        description: "createVirtualFunction uses the call trap for construct too",
        body: virtual_function_shared_trap,
    },
    Check {
        name: "descriptor-only-handler",
        description: "in and property reads through a getPropertyDescriptor-only handler",
        body: descriptor_only_handler,
    },
];

pub fn find(name: &str) -> Option<&'static Check> {
    CHECKS.iter().find(|c| c.name == name)
}

fn ensure(cond: bool, what: impl Into<String>) -> CheckResult {
    if cond {
        Ok(())
    } else {
        Err(CheckFailure::Assertion(what.into()))
    }
}

trait OrUncaught<T> {
    fn or_uncaught(self, interp: &Interpreter) -> Result<T, CheckFailure>;
}

impl<T> OrUncaught<T> for Result<T, JsValue> {
    fn or_uncaught(self, interp: &Interpreter) -> Result<T, CheckFailure> {
        self.map_err(|e| CheckFailure::Uncaught(describe(interp, &e)))
    }
}

fn describe(interp: &Interpreter, value: &JsValue) -> String {
    if interp.is_stop_iteration(value) {
        return "StopIteration".to_string();
    }
    match interp.error_message(value) {
        Some(message) if interp.is_type_error(value) => format!("TypeError: {message}"),
        Some(message) => message,
        None => to_js_string(value),
    }
}

fn expect_throw<T>(result: Result<T, JsValue>, what: &str) -> Result<JsValue, CheckFailure> {
    match result {
        Err(e) => Ok(e),
        Ok(_) => Err(CheckFailure::Assertion(format!(
            "{what}: expected an exception"
        ))),
    }
}

fn counting_generator(
    interp: &mut Interpreter,
    limit: usize,
) -> Result<(LegacyGenerator, Rc<RefCell<usize>>), CheckFailure> {
    let resumes = Rc::new(RefCell::new(0usize));
    let counter = resumes.clone();
    let generator = interp.create_legacy_generator(FnGenerator::new(move |_, resumption| {
        if let Resumption::Throw(e) = resumption {
            return Err(e);
        }
        let mut n = counter.borrow_mut();
        *n += 1;
        if *n > limit {
            Ok(GeneratorStep::Return(JsValue::Undefined))
        } else {
            Ok(GeneratorStep::Yield(JsValue::Number(*n as f64)))
        }
    }));
    let legacy = LegacyGenerator::new(interp, &generator).or_uncaught(interp)?;
    Ok((legacy, resumes))
}

fn newborn_close(interp: &mut Interpreter) -> CheckResult {
    let (g, resumes) = counting_generator(interp, 3)?;
    ensure(g.state(interp) == GeneratorState::Newborn, "fresh generator is newborn")?;
    g.close(interp).or_uncaught(interp)?;
    ensure(g.state(interp) == GeneratorState::Closed, "close moves to closed")?;
    ensure(*resumes.borrow() == 0, "close must not resume the body")
}

fn next_suspends(interp: &mut Interpreter) -> CheckResult {
    let (g, resumes) = counting_generator(interp, 3)?;
    let first = g.next(interp).or_uncaught(interp)?;
    ensure(matches!(first, JsValue::Number(n) if n == 1.0), "first value is 1")?;
    ensure(g.state(interp) == GeneratorState::Suspended, "suspended after a yield")?;
    g.next(interp).or_uncaught(interp)?;
    ensure(*resumes.borrow() == 2, "second next resumes again")
}

fn completion_throws_stop_iteration(interp: &mut Interpreter) -> CheckResult {
    let (g, _) = counting_generator(interp, 1)?;
    g.next(interp).or_uncaught(interp)?;
    let thrown = expect_throw(g.next(interp), "next past the end")?;
    ensure(g.state(interp) == GeneratorState::Closed, "closed after completion")?;
    let global = interp.global_object();
    let exported = interp.get_v(&global, "StopIteration").or_uncaught(interp)?;
    ensure(
        interp.is_stop_iteration(&thrown) && strict_equality(&thrown, &exported),
        format!("expected StopIteration, got {}", describe(interp, &thrown)),
    )
}

fn reentry_is_type_error(interp: &mut Interpreter) -> CheckResult {
    let outcomes: Rc<RefCell<Vec<Option<JsValue>>>> = Rc::new(RefCell::new(Vec::new()));
    let record = outcomes.clone();
    let generator = interp.create_legacy_generator(FnGenerator::new(move |interp, _| {
        let global = interp.global_object();
        let me = interp.get_v(&global, "reentrant")?;
        let g = LegacyGenerator::new(interp, &me)?;
        let mut out = record.borrow_mut();
        out.push(g.next(interp).err());
        out.push(g.send(interp, JsValue::Undefined).err());
        out.push(g.close(interp).err());
        out.push(g.throw(interp, JsValue::Undefined).err());
        Ok(GeneratorStep::Yield(JsValue::Undefined))
    }));
    let global = interp.global_object();
    if let Some(global) = global.as_object() {
        interp
            .obj(global)
            .borrow_mut()
            .insert_value("reentrant".to_string(), generator.clone());
    }
    let g = LegacyGenerator::new(interp, &generator).or_uncaught(interp)?;
    g.next(interp).or_uncaught(interp)?;
    let outcomes = outcomes.borrow();
    ensure(outcomes.len() == 4, "all four operations attempted")?;
    for (op, outcome) in ["next", "send", "close", "throw"].iter().zip(outcomes.iter()) {
        ensure(
            outcome.as_ref().is_some_and(|e| interp.is_type_error(e)),
            format!("{op} while executing must be a TypeError"),
        )?;
    }
    Ok(())
}

fn throw_on_newborn_rethrows(interp: &mut Interpreter) -> CheckResult {
    let (g, resumes) = counting_generator(interp, 3)?;
    let exception: JsValue = interp.create_object().into();
    let thrown = expect_throw(g.throw(interp, exception.clone()), "throw on newborn")?;
    ensure(strict_equality(&thrown, &exception), "rethrows the identical value")?;
    ensure(g.state(interp) == GeneratorState::Closed, "closed afterwards")?;
    ensure(*resumes.borrow() == 0, "body never ran")
}

fn closed_is_terminal(interp: &mut Interpreter) -> CheckResult {
    let generator = interp.create_legacy_generator(ListGenerator::new(Vec::new()));
    let g = LegacyGenerator::new(interp, &generator).or_uncaught(interp)?;
    g.close(interp).or_uncaught(interp)?;
    for round in 0..3 {
        let e = expect_throw(g.next(interp), "next on closed")?;
        ensure(interp.is_stop_iteration(&e), format!("round {round}: next signals completion"))?;
        let e = expect_throw(g.send(interp, JsValue::Null), "send on closed")?;
        ensure(interp.is_stop_iteration(&e), format!("round {round}: send signals completion"))?;
        let value = JsValue::Number(round as f64);
        let e = expect_throw(g.throw(interp, value.clone()), "throw on closed")?;
        ensure(strict_equality(&e, &value), format!("round {round}: throw rethrows"))?;
        g.close(interp).or_uncaught(interp)?;
    }
    ensure(g.state(interp) == GeneratorState::Closed, "still closed")
}

fn method(
    interp: &mut Interpreter,
    target: JsObject,
    name: &str,
    f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
) {
    let target = interp.obj(target);
    interp.define_native_method(&target, name, 0, f);
}

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

fn descriptor_value(interp: &mut Interpreter, value: JsValue, writable: bool) -> JsValue {
    let desc = PropertyDescriptor {
        value: Some(value),
        writable: Some(writable),
        enumerable: Some(true),
        configurable: Some(true),
        ..Default::default()
    };
    interp.from_property_descriptor(&desc)
}

fn virtual_object(
    interp: &mut Interpreter,
    handler: JsObject,
) -> Result<(JsObject, JsValue), CheckFailure> {
    let obj = create_virtual_object(interp, &handler.into(), &JsValue::Null).or_uncaught(interp)?;
    match obj.as_object() {
        Some(o) => Ok((o, obj)),
        None => Err(CheckFailure::Assertion("createVirtualObject returned a non-object".into())),
    }
}

fn direct_get_trap(interp: &mut Interpreter) -> CheckResult {
    let handler = interp.create_object();
    let derived = Rc::new(RefCell::new(false));
    let flag = derived.clone();
    method(interp, handler, "get", |_, _, _| Completion::Normal(JsValue::Number(42.0)));
    method(interp, handler, "getPropertyDescriptor", move |_, _, _| {
        *flag.borrow_mut() = true;
        Completion::Normal(JsValue::Undefined)
    });
    let (obj, recv) = virtual_object(interp, handler)?;
    for key in ["x", "toString", "7"] {
        let v = interp.get(obj, key, &recv).or_uncaught(interp)?;
        ensure(matches!(v, JsValue::Number(n) if n == 42.0), format!("obj.{key} is 42"))?;
    }
    ensure(!*derived.borrow(), "getPropertyDescriptor is not consulted")
}

fn get_from_property_descriptor(interp: &mut Interpreter) -> CheckResult {
    let handler = interp.create_object();
    method(interp, handler, "getPropertyDescriptor", |interp, _, _| {
        Completion::Normal(descriptor_value(interp, JsValue::Number(1.0), false))
    });
    let (obj, recv) = virtual_object(interp, handler)?;
    let v = interp.get(obj, "p", &recv).or_uncaught(interp)?;
    ensure(matches!(v, JsValue::Number(n) if n == 1.0), "obj.p is 1")
}

fn store_backed_handler(interp: &mut Interpreter) -> (JsObject, Rc<RefCell<usize>>) {
    let handler = interp.create_object();
    let store = interp.create_object();
    let defines = Rc::new(RefCell::new(0usize));
    method(interp, handler, "getOwnPropertyDescriptor", move |interp, _, args| {
        let key = to_property_key(&arg(args, 0));
        let desc = interp.obj(store).borrow().get_property_value(&key);
        Completion::Normal(desc.unwrap_or(JsValue::Undefined))
    });
    let counter = defines.clone();
    method(interp, handler, "defineProperty", move |interp, _, args| {
        *counter.borrow_mut() += 1;
        let key = to_property_key(&arg(args, 0));
        interp.obj(store).borrow_mut().insert_value(key, arg(args, 1));
        Completion::Normal(JsValue::Undefined)
    });
    (handler, defines)
}

fn derived_set_round_trip(interp: &mut Interpreter) -> CheckResult {
    let (handler, defines) = store_backed_handler(interp);
    let (obj, recv) = virtual_object(interp, handler)?;
    let ok = interp.set(obj, "fresh", JsValue::Number(5.0), &recv).or_uncaught(interp)?;
    ensure(ok, "set reports success")?;
    ensure(*defines.borrow() == 1, "defineProperty called once")?;
    let v = interp.get(obj, "fresh", &recv).or_uncaught(interp)?;
    ensure(matches!(v, JsValue::Number(n) if n == 5.0), "obj.fresh reads back 5")
}

fn derived_set_read_only(interp: &mut Interpreter) -> CheckResult {
    let handler = interp.create_object();
    let defines = Rc::new(RefCell::new(0usize));
    let counter = defines.clone();
    method(interp, handler, "getOwnPropertyDescriptor", |interp, _, _| {
        Completion::Normal(descriptor_value(interp, JsValue::Number(1.0), false))
    });
    method(interp, handler, "defineProperty", move |_, _, _| {
        *counter.borrow_mut() += 1;
        Completion::Normal(JsValue::Undefined)
    });
    let (obj, recv) = virtual_object(interp, handler)?;
    let ok = interp.set(obj, "ro", JsValue::Number(2.0), &recv).or_uncaught(interp)?;
    ensure(!ok, "set on a read-only property fails")?;
    ensure(*defines.borrow() == 0, "defineProperty not called")
}

fn descriptor_conflict(interp: &mut Interpreter) -> CheckResult {
    let raw = interp.create_object();
    let getter = interp.create_function(JsFunction::native("get", 0, |_, _, _| {
        Completion::Normal(JsValue::Undefined)
    }));
    {
        let data = interp.obj(raw);
        let mut r = data.borrow_mut();
        r.insert_value("value".to_string(), JsValue::Number(1.0));
        r.insert_value("get".to_string(), getter);
    }
    let result = normalize_and_complete_property_descriptor(interp, &raw.into());
    let e = expect_throw(result, "normalizing {value, get}")?;
    ensure(interp.is_type_error(&e), "conflict is a TypeError")
}

fn virtual_function_shared_trap(interp: &mut Interpreter) -> CheckResult {
    let calls: Rc<RefCell<Vec<(JsValue, JsValue)>>> = Rc::new(RefCell::new(Vec::new()));
    let record = calls.clone();
    let trap = interp.create_function(JsFunction::constructor("trap", 1, move |interp, _, args| {
        record.borrow_mut().push((arg(args, 0), interp.new_target()));
        Completion::Normal(JsValue::Undefined)
    }));
    let handler = interp.create_object();
    method(interp, handler, "getOwnPropertyDescriptor", |_, _, _| {
        Completion::Normal(JsValue::Undefined)
    });
    let func = create_virtual_function(interp, &handler.into(), &trap, None).or_uncaught(interp)?;
    interp
        .call_function(&func, &JsValue::Undefined, &[JsValue::string("called")])
        .into_result()
        .or_uncaught(interp)?;
    interp
        .construct(&func, &[JsValue::string("constructed")], None)
        .or_uncaught(interp)?;
    let calls = calls.borrow();
    ensure(calls.len() == 2, "trap ran for call and construct")?;
    ensure(to_js_string(&calls[0].0) == "called", "call forwards arguments")?;
    ensure(calls[0].1.is_undefined(), "call has no new.target")?;
    ensure(to_js_string(&calls[1].0) == "constructed", "construct forwards arguments")?;
    ensure(strict_equality(&calls[1].1, &func), "construct forwards new.target")
}

fn descriptor_only_handler(interp: &mut Interpreter) -> CheckResult {
    let handler = interp.create_object();
    method(interp, handler, "getPropertyDescriptor", |interp, _, args| {
        if to_property_key(&arg(args, 0)) == "x" {
            Completion::Normal(descriptor_value(interp, JsValue::Number(7.0), false))
        } else {
            Completion::Normal(JsValue::Undefined)
        }
    });
    let (obj, recv) = virtual_object(interp, handler)?;
    ensure(interp.has_property(obj, "x").or_uncaught(interp)?, "\"x\" in obj")?;
    let x = interp.get(obj, "x", &recv).or_uncaught(interp)?;
    ensure(matches!(x, JsValue::Number(n) if n == 7.0), "obj.x is 7")?;
    ensure(!interp.has_property(obj, "y").or_uncaught(interp)?, "!(\"y\" in obj)")
}
