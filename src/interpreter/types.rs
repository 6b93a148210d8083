use crate::types::{JsObject, JsValue};
use std::cell::RefCell;
use std::rc::Rc;

use super::Interpreter;
use super::generator::GeneratorData;

#[derive(Debug)]
pub enum Completion {
    Normal(JsValue),
    Throw(JsValue),
}

impl Completion {
    pub fn into_result(self) -> Result<JsValue, JsValue> {
        match self {
            Completion::Normal(v) => Ok(v),
            Completion::Throw(e) => Err(e),
        }
    }
}

impl From<Result<JsValue, JsValue>> for Completion {
    fn from(r: Result<JsValue, JsValue>) -> Self {
        match r {
            Ok(v) => Completion::Normal(v),
            Err(e) => Completion::Throw(e),
        }
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion>;

pub enum JsFunction {
    Native(String, usize, NativeFn),
    /// Like `Native`, but also usable with `new`; the body reads `new.target`
    /// from the interpreter.
    Constructor(String, usize, NativeFn),
}

impl JsFunction {
    pub fn native(
        name: &str,
        arity: usize,
        f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
    ) -> Self {
        JsFunction::Native(name.to_string(), arity, Rc::new(f))
    }

    pub fn constructor(
        name: &str,
        arity: usize,
        f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
    ) -> Self {
        JsFunction::Constructor(name.to_string(), arity, Rc::new(f))
    }

    pub fn name(&self) -> &str {
        match self {
            JsFunction::Native(name, ..) | JsFunction::Constructor(name, ..) => name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            JsFunction::Native(_, arity, _) | JsFunction::Constructor(_, arity, _) => *arity,
        }
    }

    pub fn body(&self) -> NativeFn {
        match self {
            JsFunction::Native(_, _, f) | JsFunction::Constructor(_, _, f) => f.clone(),
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, JsFunction::Constructor(..))
    }
}

impl Clone for JsFunction {
    fn clone(&self) -> Self {
        match self {
            JsFunction::Native(name, arity, f) => JsFunction::Native(name.clone(), *arity, f.clone()),
            JsFunction::Constructor(name, arity, f) => {
                JsFunction::Constructor(name.clone(), *arity, f.clone())
            }
        }
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsFunction::Native(name, arity, _) => {
                write!(f, "JsFunction::Native({name:?}, {arity})")
            }
            JsFunction::Constructor(name, arity, _) => {
                write!(f, "JsFunction::Constructor({name:?}, {arity})")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }

    pub fn accessor(get: JsValue, set: JsValue, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: None,
            writable: None,
            get: Some(get),
            set: Some(set),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable == Some(true)
    }

    pub fn is_writable(&self) -> bool {
        self.writable == Some(true)
    }

    /// The setter, if this accessor has a callable one.
    pub fn setter(&self) -> Option<&JsValue> {
        self.set.as_ref().filter(|s| !s.is_undefined())
    }

    pub fn getter(&self) -> Option<&JsValue> {
        self.get.as_ref().filter(|g| !g.is_undefined())
    }
}

/// Modern object-virtualization interface. A proxy object routes each of its
/// internal methods to one of these traps, passing its concrete target.
pub trait ProxyHandler {
    fn get_prototype_of(&self, interp: &mut Interpreter, target: JsObject)
    -> Result<JsValue, JsValue>;

    fn set_prototype_of(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        proto: &JsValue,
    ) -> Result<bool, JsValue>;

    fn is_extensible(&self, interp: &mut Interpreter, target: JsObject) -> Result<bool, JsValue>;

    fn prevent_extensions(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
    ) -> Result<bool, JsValue>;

    fn get_own_property(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue>;

    fn define_own_property(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Result<bool, JsValue>;

    fn has(&self, interp: &mut Interpreter, target: JsObject, key: &str) -> Result<bool, JsValue>;

    fn get(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        receiver: &JsValue,
    ) -> Result<JsValue, JsValue>;

    fn set(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsValue>;

    fn delete(&self, interp: &mut Interpreter, target: JsObject, key: &str)
    -> Result<bool, JsValue>;

    /// Returns an iterator object over the for-in keys.
    fn enumerate(&self, interp: &mut Interpreter, target: JsObject) -> Result<JsValue, JsValue>;

    fn keys(&self, interp: &mut Interpreter, target: JsObject) -> Result<Vec<String>, JsValue>;

    fn own_keys(&self, interp: &mut Interpreter, target: JsObject)
    -> Result<Vec<String>, JsValue>;

    fn apply(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        this: &JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsValue> {
        interp.call_function(&target.into(), this, args).into_result()
    }

    fn construct(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        args: &[JsValue],
        new_target: &JsValue,
    ) -> Result<JsValue, JsValue> {
        interp.construct(&target.into(), args, Some(new_target))
    }
}

#[derive(Clone)]
pub struct ProxyData {
    pub target: JsObject,
    pub handler: Rc<dyn ProxyHandler>,
}

pub struct JsObjectData {
    pub id: Option<u64>,
    pub properties: rustc_hash::FxHashMap<String, PropertyDescriptor>,
    pub property_order: Vec<String>,
    pub prototype: Option<Rc<RefCell<JsObjectData>>>,
    pub callable: Option<JsFunction>,
    pub class_name: String,
    pub extensible: bool,
    pub generator: Option<Rc<RefCell<GeneratorData>>>,
    pub proxy: Option<ProxyData>,
}

impl JsObjectData {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            properties: rustc_hash::FxHashMap::default(),
            property_order: Vec::new(),
            prototype: None,
            callable: None,
            class_name: "Object".to_string(),
            extensible: true,
            generator: None,
            proxy: None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn prototype_id(&self) -> Option<u64> {
        self.prototype.as_ref().and_then(|p| p.borrow().id)
    }

    pub fn get_own_property(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.property_order.clone()
    }

    pub fn own_enumerable_keys(&self) -> Vec<String> {
        self.property_order
            .iter()
            .filter(|k| self.properties.get(*k).is_some_and(|d| d.enumerable != Some(false)))
            .cloned()
            .collect()
    }

    // §10.1.6.3 ValidateAndApplyPropertyDescriptor, without the SameValue refinements
    pub fn define_own_property(&mut self, key: String, desc: PropertyDescriptor) -> bool {
        if let Some(current) = self.properties.get(&key) {
            if current.configurable == Some(false) {
                if desc.configurable == Some(true) {
                    return false;
                }
                if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                    return false;
                }
                if current.is_data_descriptor() != desc.is_data_descriptor()
                    && (desc.is_data_descriptor() || desc.is_accessor_descriptor())
                {
                    return false;
                }
                if current.is_data_descriptor()
                    && desc.is_data_descriptor()
                    && current.writable == Some(false)
                {
                    if desc.writable == Some(true) {
                        return false;
                    }
                    if desc.value.is_some() {
                        return false;
                    }
                }
            }
            let merged = merge_descriptor(current, desc);
            self.properties.insert(key, merged);
            return true;
        } else if !self.extensible {
            return false;
        }
        self.property_order.push(key.clone());
        self.properties.insert(key, complete_descriptor(desc));
        true
    }

    pub fn remove_property(&mut self, key: &str) -> bool {
        match self.properties.get(key) {
            None => true,
            Some(d) if d.configurable == Some(false) => false,
            Some(_) => {
                self.properties.remove(key);
                self.property_order.retain(|k| k != key);
                true
            }
        }
    }

    pub fn insert_value(&mut self, key: String, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data_default(value));
    }

    pub fn insert_builtin(&mut self, key: String, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data(value, true, false, true));
    }

    pub fn insert_property(&mut self, key: String, desc: PropertyDescriptor) {
        if !self.properties.contains_key(&key) {
            self.property_order.push(key.clone());
        }
        self.properties.insert(key, desc);
    }

    pub fn get_property_value(&self, key: &str) -> Option<JsValue> {
        self.properties.get(key).and_then(|d| d.value.clone())
    }
}

// Fields absent from `desc` keep their current values; switching between data
// and accessor shape drops the other shape's fields.
fn merge_descriptor(current: &PropertyDescriptor, desc: PropertyDescriptor) -> PropertyDescriptor {
    let mut merged = current.clone();
    if desc.is_accessor_descriptor() && current.is_data_descriptor() {
        merged.value = None;
        merged.writable = None;
        merged.get = Some(JsValue::Undefined);
        merged.set = Some(JsValue::Undefined);
    } else if desc.is_data_descriptor() && current.is_accessor_descriptor() {
        merged.get = None;
        merged.set = None;
        merged.value = Some(JsValue::Undefined);
        merged.writable = Some(false);
    }
    if desc.value.is_some() {
        merged.value = desc.value;
    }
    if desc.writable.is_some() {
        merged.writable = desc.writable;
    }
    if desc.get.is_some() {
        merged.get = desc.get;
    }
    if desc.set.is_some() {
        merged.set = desc.set;
    }
    if desc.enumerable.is_some() {
        merged.enumerable = desc.enumerable;
    }
    if desc.configurable.is_some() {
        merged.configurable = desc.configurable;
    }
    merged
}

/// §6.2.6.6 CompletePropertyDescriptor
pub fn complete_descriptor(mut desc: PropertyDescriptor) -> PropertyDescriptor {
    if desc.is_accessor_descriptor() {
        desc.get = desc.get.or(Some(JsValue::Undefined));
        desc.set = desc.set.or(Some(JsValue::Undefined));
    } else {
        desc.value = desc.value.or(Some(JsValue::Undefined));
        desc.writable = desc.writable.or(Some(false));
    }
    desc.enumerable = desc.enumerable.or(Some(false));
    desc.configurable = desc.configurable.or(Some(false));
    desc
}
