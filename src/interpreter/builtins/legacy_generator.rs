//! Legacy (pre-ES2015) generator protocol over modern generator objects.
//!
//! Legacy generators expose `next`, `send`, `close` and `throw`. Resumption
//! returns the yielded value directly and completion is signalled by throwing
//! the realm's `StopIteration` object. The protocol state lives in a side
//! table keyed by generator identity, never on the generator object itself.

use super::super::generator::{GeneratorBody, Resumption};
use super::super::*;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Newborn,
    Executing,
    Suspended,
    Closed,
}

/// Legacy protocol state per generator object. Entries are created lazily as
/// `Newborn` on first lookup.
#[derive(Debug, Default)]
pub struct GeneratorStateTable {
    states: FxHashMap<u64, GeneratorState>,
}

impl GeneratorStateTable {
    pub fn get(&mut self, generator: JsObject) -> GeneratorState {
        *self
            .states
            .entry(generator.id)
            .or_insert(GeneratorState::Newborn)
    }

    fn set(&mut self, generator: JsObject, state: GeneratorState) {
        let previous = self.states.insert(generator.id, state);
        log::debug!(
            "legacy generator #{}: {:?} -> {state:?}",
            generator.id,
            previous.unwrap_or(GeneratorState::Newborn)
        );
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Outcome of one resumption before it reaches the legacy boundary.
enum LegacyStep {
    Value(JsValue),
    Complete,
}

/// Legacy view of a generator object. Cheap to create; any number of views
/// over the same generator share its state.
#[derive(Debug, Clone, Copy)]
pub struct LegacyGenerator {
    generator: JsObject,
}

impl LegacyGenerator {
    pub fn new(interp: &mut Interpreter, value: &JsValue) -> Result<Self, JsValue> {
        Self::for_operation(interp, value, "LegacyGenerator")
    }

    fn for_operation(
        interp: &mut Interpreter,
        value: &JsValue,
        operation: &'static str,
    ) -> Result<Self, JsValue> {
        match value.as_object() {
            Some(generator) if interp.is_generator_object(value) => Ok(Self { generator }),
            _ => Err(interp.throw_error(LegacyError::NotAGenerator { operation })),
        }
    }

    pub fn object(&self) -> JsObject {
        self.generator
    }

    pub fn state(&self, interp: &mut Interpreter) -> GeneratorState {
        interp.legacy_generator_states.get(self.generator)
    }

    fn set_state(&self, interp: &mut Interpreter, state: GeneratorState) {
        interp.legacy_generator_states.set(self.generator, state);
    }

    pub fn next(&self, interp: &mut Interpreter) -> Result<JsValue, JsValue> {
        self.send_with(interp, "next", JsValue::Undefined)
    }

    /// Resumes with `value` as the result of the pending `yield`.
    pub fn send(&self, interp: &mut Interpreter, value: JsValue) -> Result<JsValue, JsValue> {
        self.send_with(interp, "send", value)
    }

    fn send_with(
        &self,
        interp: &mut Interpreter,
        operation: &'static str,
        value: JsValue,
    ) -> Result<JsValue, JsValue> {
        let step = match self.state(interp) {
            GeneratorState::Executing => {
                return Err(interp.throw_error(LegacyError::AlreadyRunning { operation }));
            }
            GeneratorState::Closed => Ok(LegacyStep::Complete),
            GeneratorState::Newborn | GeneratorState::Suspended => {
                self.resume(interp, Resumption::Next(value))
            }
        };
        finish(interp, step)
    }

    pub fn close(&self, interp: &mut Interpreter) -> Result<(), JsValue> {
        match self.state(interp) {
            GeneratorState::Executing => {
                Err(interp.throw_error(LegacyError::AlreadyRunning { operation: "close" }))
            }
            GeneratorState::Closed => Ok(()),
            GeneratorState::Newborn => {
                self.set_state(interp, GeneratorState::Closed);
                Ok(())
            }
            GeneratorState::Suspended => {
                self.set_state(interp, GeneratorState::Executing);
                let result = interp.generator_resume_abrupt(
                    &self.generator.into(),
                    Resumption::Return(JsValue::Undefined),
                );
                self.set_state(interp, GeneratorState::Closed);
                match result {
                    Ok(r) if !r.done => {
                        Err(interp.throw_error(LegacyError::YieldFromClosingGenerator))
                    }
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Throws `exception` at the current suspension point. A generator that
    /// never started, or already finished, just rethrows it.
    pub fn throw(&self, interp: &mut Interpreter, exception: JsValue) -> Result<JsValue, JsValue> {
        match self.state(interp) {
            GeneratorState::Executing => {
                Err(interp.throw_error(LegacyError::AlreadyRunning { operation: "throw" }))
            }
            GeneratorState::Newborn => {
                self.set_state(interp, GeneratorState::Closed);
                Err(exception)
            }
            GeneratorState::Closed => Err(exception),
            GeneratorState::Suspended => {
                let step = self.resume(interp, Resumption::Throw(exception));
                finish(interp, step)
            }
        }
    }

    fn resume(
        &self,
        interp: &mut Interpreter,
        resumption: Resumption,
    ) -> Result<LegacyStep, JsValue> {
        self.set_state(interp, GeneratorState::Executing);
        let gen_val: JsValue = self.generator.into();
        let result = match resumption {
            Resumption::Next(v) => interp.generator_resume(&gen_val, v),
            abrupt => interp.generator_resume_abrupt(&gen_val, abrupt),
        };
        match result {
            Ok(r) if r.done => {
                self.set_state(interp, GeneratorState::Closed);
                Ok(LegacyStep::Complete)
            }
            Ok(r) => {
                self.set_state(interp, GeneratorState::Suspended);
                Ok(LegacyStep::Value(r.value))
            }
            Err(e) => {
                self.set_state(interp, GeneratorState::Closed);
                Err(e)
            }
        }
    }
}

fn finish(interp: &mut Interpreter, step: Result<LegacyStep, JsValue>) -> Result<JsValue, JsValue> {
    match step? {
        LegacyStep::Value(v) => Ok(v),
        LegacyStep::Complete => Err(interp.stop_iteration()),
    }
}

impl Interpreter {
    /// Creates a generator object that speaks the legacy protocol through
    /// %LegacyGeneratorPrototype%.
    pub fn create_legacy_generator(&mut self, body: impl GeneratorBody + 'static) -> JsValue {
        let proto = self.legacy_generator_prototype.clone();
        self.create_generator_with_proto(Box::new(body), proto).into()
    }

    pub(crate) fn setup_legacy_generator(&mut self) {
        let stop = self.create_object();
        {
            let data = self.obj(stop);
            let mut s = data.borrow_mut();
            s.class_name = "StopIteration".to_string();
            s.extensible = false;
        }
        self.stop_iteration = Some(stop);
        if let Some(global) = self.global_object.clone() {
            global.borrow_mut().insert_property(
                "StopIteration".to_string(),
                PropertyDescriptor::data(stop.into(), false, false, false),
            );
        }

        let proto_obj = self.create_object();
        let proto = self.obj(proto_obj);
        proto.borrow_mut().class_name = "LegacyGenerator".to_string();

        self.define_native_method(&proto, "next", 0, |interp, this, _args| {
            let result =
                LegacyGenerator::for_operation(interp, this, "next").and_then(|g| g.next(interp));
            result.into()
        });
        self.define_native_method(&proto, "send", 1, |interp, this, args| {
            let value = args.first().cloned().unwrap_or(JsValue::Undefined);
            let result = LegacyGenerator::for_operation(interp, this, "send")
                .and_then(|g| g.send(interp, value));
            result.into()
        });
        self.define_native_method(&proto, "close", 0, |interp, this, _args| {
            let result = LegacyGenerator::for_operation(interp, this, "close")
                .and_then(|g| g.close(interp));
            match result {
                Ok(()) => Completion::Normal(JsValue::Undefined),
                Err(e) => Completion::Throw(e),
            }
        });
        self.define_native_method(&proto, "throw", 1, |interp, this, args| {
            let exception = args.first().cloned().unwrap_or(JsValue::Undefined);
            let result = LegacyGenerator::for_operation(interp, this, "throw")
                .and_then(|g| g.throw(interp, exception));
            result.into()
        });
        self.define_native_method(&proto, "iterator", 0, |_interp, this, _args| {
            Completion::Normal(this.clone())
        });

        self.legacy_generator_prototype = Some(proto);
    }
}
