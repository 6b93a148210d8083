use crate::types::{JsObject, JsString, JsValue};
use std::cell::RefCell;
use std::rc::Rc;

mod types;
pub use types::*;

mod error;
pub use error::LegacyError;

mod helpers;
pub use helpers::*;

pub mod generator;
mod internal_methods;

mod builtins;
pub use builtins::legacy_generator::{GeneratorState, GeneratorStateTable, LegacyGenerator};
pub use builtins::legacy_proxy::{
    LegacyHandlerTraps, create_virtual_function, create_virtual_object,
    normalize_and_complete_property_descriptor,
};

/// Host runtime for the legacy compatibility layers: object table, intrinsics
/// and the internal-method dispatch every adapter goes through.
pub struct Interpreter {
    objects: Vec<Rc<RefCell<JsObjectData>>>,
    global_object: Option<Rc<RefCell<JsObjectData>>>,
    object_prototype: Option<Rc<RefCell<JsObjectData>>>,
    function_prototype: Option<Rc<RefCell<JsObjectData>>>,
    error_prototype: Option<Rc<RefCell<JsObjectData>>>,
    type_error_prototype: Option<Rc<RefCell<JsObjectData>>>,
    iterator_prototype: Option<Rc<RefCell<JsObjectData>>>,
    generator_prototype: Option<Rc<RefCell<JsObjectData>>>,
    legacy_generator_prototype: Option<Rc<RefCell<JsObjectData>>>,
    stop_iteration: Option<JsObject>,
    pub(crate) legacy_generator_states: GeneratorStateTable,
    new_target: Option<JsValue>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Self {
            objects: Vec::new(),
            global_object: None,
            object_prototype: None,
            function_prototype: None,
            error_prototype: None,
            type_error_prototype: None,
            iterator_prototype: None,
            generator_prototype: None,
            legacy_generator_prototype: None,
            stop_iteration: None,
            legacy_generator_states: GeneratorStateTable::default(),
            new_target: None,
        };
        interp.setup_globals();
        interp
    }

    pub(crate) fn allocate_object_slot(&mut self, obj: Rc<RefCell<JsObjectData>>) -> JsObject {
        let id = self.objects.len() as u64;
        obj.borrow_mut().id = Some(id);
        self.objects.push(obj);
        JsObject { id }
    }

    pub(crate) fn get_object(&self, id: u64) -> Option<Rc<RefCell<JsObjectData>>> {
        self.objects.get(id as usize).cloned()
    }

    /// Handles are only minted by `allocate_object_slot` and slots are never
    /// freed, so every handle indexes a live slot.
    pub(crate) fn obj(&self, o: JsObject) -> Rc<RefCell<JsObjectData>> {
        self.objects[o.id as usize].clone()
    }

    pub(crate) fn alloc(&mut self, data: JsObjectData) -> JsObject {
        self.allocate_object_slot(Rc::new(RefCell::new(data)))
    }

    pub fn create_object(&mut self) -> JsObject {
        let proto = self.object_prototype.clone();
        self.create_object_with_proto(proto)
    }

    pub(crate) fn create_object_with_proto(
        &mut self,
        proto: Option<Rc<RefCell<JsObjectData>>>,
    ) -> JsObject {
        let mut data = JsObjectData::new();
        data.prototype = proto;
        self.alloc(data)
    }

    pub fn create_function(&mut self, func: JsFunction) -> JsValue {
        let name = JsValue::String(JsString::from_str(func.name()));
        let length = JsValue::Number(func.arity() as f64);
        let is_ctor = func.is_constructor();
        let mut data = JsObjectData::new();
        data.class_name = "Function".to_string();
        data.prototype = self.function_prototype.clone();
        data.callable = Some(func);
        data.insert_property(
            "length".to_string(),
            PropertyDescriptor::data(length, false, false, true),
        );
        data.insert_property(
            "name".to_string(),
            PropertyDescriptor::data(name, false, false, true),
        );
        let func_obj = self.alloc(data);
        if is_ctor {
            let proto = self.create_object();
            self.obj(proto)
                .borrow_mut()
                .insert_builtin("constructor".to_string(), func_obj.into());
            self.obj(func_obj).borrow_mut().insert_property(
                "prototype".to_string(),
                PropertyDescriptor::data(proto.into(), true, false, false),
            );
        }
        func_obj.into()
    }

    /// Installs a native method as a non-enumerable property of `target`.
    pub(crate) fn define_native_method(
        &mut self,
        target: &Rc<RefCell<JsObjectData>>,
        name: &str,
        arity: usize,
        f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
    ) {
        let func = self.create_function(JsFunction::native(name, arity, f));
        target.borrow_mut().insert_builtin(name.to_string(), func);
    }

    pub fn create_array(&mut self, values: Vec<JsValue>) -> JsValue {
        let arr = self.create_object();
        let data = self.obj(arr);
        let mut a = data.borrow_mut();
        a.class_name = "Array".to_string();
        let len = values.len();
        for (i, v) in values.into_iter().enumerate() {
            a.insert_value(i.to_string(), v);
        }
        a.insert_property(
            "length".to_string(),
            PropertyDescriptor::data(JsValue::Number(len as f64), true, false, false),
        );
        drop(a);
        arr.into()
    }

    pub fn create_error(&mut self, name: &str, msg: &str) -> JsValue {
        let proto = match name {
            "TypeError" => self.type_error_prototype.clone(),
            _ => self.error_prototype.clone(),
        };
        let obj = self.create_object_with_proto(proto);
        {
            let data = self.obj(obj);
            let mut o = data.borrow_mut();
            o.class_name = name.to_string();
            o.insert_builtin(
                "message".to_string(),
                JsValue::String(JsString::from_str(msg)),
            );
        }
        obj.into()
    }

    pub fn create_type_error(&mut self, msg: &str) -> JsValue {
        self.create_error("TypeError", msg)
    }

    /// Reports an adapter failure to script code as the error object it maps to.
    pub fn throw_error(&mut self, err: LegacyError) -> JsValue {
        log::debug!("throwing {}: {err}", err.error_name());
        self.create_error(err.error_name(), &err.to_string())
    }

    pub fn is_error_of_kind(&self, val: &JsValue, name: &str) -> bool {
        val.as_object()
            .and_then(|o| self.get_object(o.id))
            .is_some_and(|o| o.borrow().class_name == name)
    }

    pub fn is_type_error(&self, val: &JsValue) -> bool {
        self.is_error_of_kind(val, "TypeError")
    }

    /// The `message` of an error object, if it has one of its own.
    pub fn error_message(&self, val: &JsValue) -> Option<String> {
        let obj = self.get_object(val.as_object()?.id)?;
        let message = obj.borrow().get_property_value("message")?;
        Some(to_js_string(&message))
    }

    pub fn global_object(&self) -> JsValue {
        self.global_object
            .as_ref()
            .and_then(|g| g.borrow().id)
            .map_or(JsValue::Undefined, |id| JsValue::Object(JsObject { id }))
    }

    /// The runtime's single `StopIteration` sentinel.
    pub fn stop_iteration(&self) -> JsValue {
        self.stop_iteration
            .map_or(JsValue::Undefined, JsValue::Object)
    }

    pub fn is_stop_iteration(&self, val: &JsValue) -> bool {
        matches!((val, self.stop_iteration), (JsValue::Object(o), Some(s)) if *o == s)
    }

    pub fn is_callable(&self, val: &JsValue) -> bool {
        let Some(obj) = val.as_object().and_then(|o| self.get_object(o.id)) else {
            return false;
        };
        let b = obj.borrow();
        if let Some(ref proxy) = b.proxy {
            return self.is_callable(&proxy.target.into());
        }
        b.callable.is_some()
    }

    pub fn is_constructor(&self, val: &JsValue) -> bool {
        let Some(obj) = val.as_object().and_then(|o| self.get_object(o.id)) else {
            return false;
        };
        let b = obj.borrow();
        if let Some(ref proxy) = b.proxy {
            return self.is_constructor(&proxy.target.into());
        }
        b.callable.as_ref().is_some_and(JsFunction::is_constructor)
    }

    /// `new.target` of the innermost native constructor call, if any.
    pub fn new_target(&self) -> JsValue {
        self.new_target.clone().unwrap_or(JsValue::Undefined)
    }

    pub fn create_proxy(&mut self, target: JsObject, handler: Rc<dyn ProxyHandler>) -> JsValue {
        let class_name = self.obj(target).borrow().class_name.clone();
        let mut data = JsObjectData::new();
        data.class_name = class_name;
        data.proxy = Some(ProxyData { target, handler });
        self.alloc(data).into()
    }

    pub fn call_function(&mut self, func_val: &JsValue, this_val: &JsValue, args: &[JsValue]) -> Completion {
        let Some(obj) = func_val.as_object().and_then(|o| self.get_object(o.id)) else {
            let err = self.create_type_error(&format!("{} is not a function", to_js_string(func_val)));
            return Completion::Throw(err);
        };
        let proxy = obj.borrow().proxy.clone();
        if let Some(ProxyData { target, handler }) = proxy {
            if !self.is_callable(&target.into()) {
                let err = self.create_type_error("proxy is not a function");
                return Completion::Throw(err);
            }
            return handler.apply(self, target, this_val, args).into();
        }
        let callable = obj.borrow().callable.clone();
        match callable {
            Some(func) => {
                let prev_new_target = self.new_target.take();
                let result = func.body()(self, this_val, args);
                self.new_target = prev_new_target;
                result
            }
            None => {
                let err = self.create_type_error(&format!("{} is not a function", to_js_string(func_val)));
                Completion::Throw(err)
            }
        }
    }

    /// §7.3.15 Construct. `new_target` defaults to `func`.
    pub fn construct(
        &mut self,
        func: &JsValue,
        args: &[JsValue],
        new_target: Option<&JsValue>,
    ) -> Result<JsValue, JsValue> {
        let new_target = new_target.cloned().unwrap_or_else(|| func.clone());
        let Some(func_obj) = func.as_object().filter(|_| self.is_constructor(func)) else {
            return Err(self.create_type_error(&format!("{} is not a constructor", to_js_string(func))));
        };
        let proxy = self.obj(func_obj).borrow().proxy.clone();
        if let Some(ProxyData { target, handler }) = proxy {
            let result = handler.construct(self, target, args, &new_target)?;
            if !result.is_object() {
                return Err(self.create_type_error("'construct' on proxy: trap returned non-Object"));
            }
            return Ok(result);
        }
        let proto = match new_target.as_object() {
            Some(nt) => self.get(nt, "prototype", &new_target)?,
            None => JsValue::Undefined,
        };
        let proto = match proto.as_object() {
            Some(p) => Some(self.obj(p)),
            None => self.object_prototype.clone(),
        };
        let this_obj = self.create_object_with_proto(proto);
        let this_val: JsValue = this_obj.into();
        let Some(func) = self.obj(func_obj).borrow().callable.clone() else {
            return Err(self.create_type_error("not a constructor"));
        };
        let prev_new_target = self.new_target.replace(new_target);
        let result = func.body()(self, &this_val, args);
        self.new_target = prev_new_target;
        match result {
            Completion::Normal(v) if v.is_object() => Ok(v),
            Completion::Normal(_) => Ok(this_val),
            Completion::Throw(e) => Err(e),
        }
    }
}
