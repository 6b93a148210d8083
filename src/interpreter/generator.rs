//! Modern generator objects (§27.5): a body that can be resumed with a value,
//! an exception or a return, reporting `{ value, done }` per step.
//!
//! The body is an opaque [`GeneratorBody`]; this crate has no evaluator, so
//! hosts (and tests) drive generators from Rust.

use super::*;
use std::collections::VecDeque;

/// How a suspended generator is being resumed.
#[derive(Debug, Clone)]
pub enum Resumption {
    Next(JsValue),
    Throw(JsValue),
    Return(JsValue),
}

/// What the body did with a resumption.
#[derive(Debug, Clone)]
pub enum GeneratorStep {
    Yield(JsValue),
    Return(JsValue),
}

#[derive(Debug, Clone)]
pub struct IterResult {
    pub value: JsValue,
    pub done: bool,
}

pub trait GeneratorBody {
    /// Runs the body from its current suspension point. `Err` is an exception
    /// escaping the body, which completes the generator.
    fn resume(
        &mut self,
        interp: &mut Interpreter,
        resumption: Resumption,
    ) -> Result<GeneratorStep, JsValue>;
}

// §27.5.3 [[GeneratorState]]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModernGeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

pub struct GeneratorData {
    pub(crate) state: ModernGeneratorState,
    pub(crate) body: Option<Box<dyn GeneratorBody>>,
}

/// Body driven by a closure; each call receives the resumption and decides
/// whether to yield or return.
pub struct FnGenerator<F>(F);

impl<F> FnGenerator<F>
where
    F: FnMut(&mut Interpreter, Resumption) -> Result<GeneratorStep, JsValue>,
{
    pub fn new(f: F) -> Self {
        FnGenerator(f)
    }
}

impl<F> GeneratorBody for FnGenerator<F>
where
    F: FnMut(&mut Interpreter, Resumption) -> Result<GeneratorStep, JsValue>,
{
    fn resume(
        &mut self,
        interp: &mut Interpreter,
        resumption: Resumption,
    ) -> Result<GeneratorStep, JsValue> {
        (self.0)(interp, resumption)
    }
}

/// Yields a fixed list, then returns `undefined`. Values sent into a started
/// generator are recorded in `sent`; the first `next` argument is discarded,
/// as a `yield`-less prologue would.
pub struct ListGenerator {
    values: VecDeque<JsValue>,
    started: bool,
    sent: Rc<RefCell<Vec<JsValue>>>,
}

impl ListGenerator {
    pub fn new(values: Vec<JsValue>) -> Self {
        Self {
            values: values.into(),
            started: false,
            sent: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared log of values received by `yield` expressions.
    pub fn sent_log(&self) -> Rc<RefCell<Vec<JsValue>>> {
        self.sent.clone()
    }
}

impl GeneratorBody for ListGenerator {
    fn resume(
        &mut self,
        _interp: &mut Interpreter,
        resumption: Resumption,
    ) -> Result<GeneratorStep, JsValue> {
        match resumption {
            Resumption::Next(v) => {
                if self.started {
                    self.sent.borrow_mut().push(v);
                }
                self.started = true;
                Ok(match self.values.pop_front() {
                    Some(v) => GeneratorStep::Yield(v),
                    None => GeneratorStep::Return(JsValue::Undefined),
                })
            }
            Resumption::Throw(e) => Err(e),
            Resumption::Return(v) => Ok(GeneratorStep::Return(v)),
        }
    }
}

impl Interpreter {
    /// Creates a generator object inheriting from %GeneratorPrototype%.
    pub fn create_generator(&mut self, body: impl GeneratorBody + 'static) -> JsValue {
        let proto = self.generator_prototype.clone();
        self.create_generator_with_proto(Box::new(body), proto).into()
    }

    pub(crate) fn create_generator_with_proto(
        &mut self,
        body: Box<dyn GeneratorBody>,
        proto: Option<Rc<RefCell<JsObjectData>>>,
    ) -> JsObject {
        let gen_obj = self.create_object_with_proto(proto);
        let data = self.obj(gen_obj);
        let mut g = data.borrow_mut();
        g.class_name = "Generator".to_string();
        g.generator = Some(Rc::new(RefCell::new(GeneratorData {
            state: ModernGeneratorState::SuspendedStart,
            body: Some(body),
        })));
        drop(g);
        gen_obj
    }

    pub fn is_generator_object(&self, val: &JsValue) -> bool {
        val.as_object()
            .and_then(|o| self.get_object(o.id))
            .is_some_and(|o| o.borrow().generator.is_some())
    }

    pub fn generator_state(&self, val: &JsValue) -> Option<ModernGeneratorState> {
        let obj = self.get_object(val.as_object()?.id)?;
        let data = obj.borrow().generator.clone()?;
        let state = data.borrow().state;
        Some(state)
    }

    // §27.5.3.2 GeneratorValidate
    fn generator_validate(
        &mut self,
        gen_val: &JsValue,
        method: &str,
    ) -> Result<Rc<RefCell<GeneratorData>>, JsValue> {
        let data = gen_val
            .as_object()
            .and_then(|o| self.get_object(o.id))
            .and_then(|o| o.borrow().generator.clone());
        let Some(data) = data else {
            return Err(self.create_type_error(&format!(
                "{method} method called on incompatible receiver {}",
                to_js_string(gen_val)
            )));
        };
        if data.borrow().state == ModernGeneratorState::Executing {
            return Err(self.create_type_error("Generator is already running"));
        }
        Ok(data)
    }

    // §27.5.3.3 GeneratorResume
    pub fn generator_resume(&mut self, gen_val: &JsValue, value: JsValue) -> Result<IterResult, JsValue> {
        let data = self.generator_validate(gen_val, "next")?;
        if data.borrow().state == ModernGeneratorState::Completed {
            return Ok(IterResult {
                value: JsValue::Undefined,
                done: true,
            });
        }
        self.run_generator(&data, Resumption::Next(value))
    }

    // §27.5.3.4 GeneratorResumeAbrupt
    pub fn generator_resume_abrupt(
        &mut self,
        gen_val: &JsValue,
        abrupt: Resumption,
    ) -> Result<IterResult, JsValue> {
        let method = match abrupt {
            Resumption::Next(v) => return self.generator_resume(gen_val, v),
            Resumption::Throw(_) => "throw",
            Resumption::Return(_) => "return",
        };
        let data = self.generator_validate(gen_val, method)?;
        let state = data.borrow().state;
        if state == ModernGeneratorState::SuspendedStart {
            let mut d = data.borrow_mut();
            d.state = ModernGeneratorState::Completed;
            d.body = None;
        }
        if matches!(
            state,
            ModernGeneratorState::SuspendedStart | ModernGeneratorState::Completed
        ) {
            return match abrupt {
                Resumption::Return(value) => Ok(IterResult { value, done: true }),
                Resumption::Throw(e) | Resumption::Next(e) => Err(e),
            };
        }
        self.run_generator(&data, abrupt)
    }

    fn run_generator(
        &mut self,
        data: &Rc<RefCell<GeneratorData>>,
        resumption: Resumption,
    ) -> Result<IterResult, JsValue> {
        let body = {
            let mut d = data.borrow_mut();
            d.state = ModernGeneratorState::Executing;
            d.body.take()
        };
        let Some(mut body) = body else {
            data.borrow_mut().state = ModernGeneratorState::Completed;
            return Ok(IterResult {
                value: JsValue::Undefined,
                done: true,
            });
        };
        let outcome = body.resume(self, resumption);
        let mut d = data.borrow_mut();
        match outcome {
            Ok(GeneratorStep::Yield(value)) => {
                d.state = ModernGeneratorState::SuspendedYield;
                d.body = Some(body);
                Ok(IterResult { value, done: false })
            }
            Ok(GeneratorStep::Return(value)) => {
                d.state = ModernGeneratorState::Completed;
                Ok(IterResult { value, done: true })
            }
            Err(e) => {
                d.state = ModernGeneratorState::Completed;
                Err(e)
            }
        }
    }

    fn iter_result_completion(&mut self, result: Result<IterResult, JsValue>) -> Completion {
        match result {
            Ok(r) => Completion::Normal(self.create_iter_result_object(r.value, r.done)),
            Err(e) => Completion::Throw(e),
        }
    }

    // §27.5.1 %GeneratorPrototype%
    pub(crate) fn setup_generator_prototype(&mut self) {
        let proto_obj = self.create_object_with_proto(self.iterator_prototype.clone());
        let proto = self.obj(proto_obj);
        proto.borrow_mut().class_name = "Generator".to_string();

        self.define_native_method(&proto, "next", 1, |interp, this, args| {
            let value = args.first().cloned().unwrap_or(JsValue::Undefined);
            let result = interp.generator_resume(this, value);
            interp.iter_result_completion(result)
        });
        self.define_native_method(&proto, "return", 1, |interp, this, args| {
            let value = args.first().cloned().unwrap_or(JsValue::Undefined);
            let result = interp.generator_resume_abrupt(this, Resumption::Return(value));
            interp.iter_result_completion(result)
        });
        self.define_native_method(&proto, "throw", 1, |interp, this, args| {
            let exception = args.first().cloned().unwrap_or(JsValue::Undefined);
            let result = interp.generator_resume_abrupt(this, Resumption::Throw(exception));
            interp.iter_result_completion(result)
        });

        self.generator_prototype = Some(proto);
    }
}
