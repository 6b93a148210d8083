//! Old-style (`Proxy.create`) handlers adapted to the modern trap set.
//!
//! A legacy handler may implement only a few fundamental traps. Which legacy
//! member backs each modern trap is decided once, when the handler is
//! wrapped, and recorded in a [`TrapPlan`]. The members themselves are read
//! from the handler on every call.

use super::super::*;
use rustc_hash::FxHashSet;

mod trap {
    pub const GET_OWN_PROPERTY_DESCRIPTOR: &str = "getOwnPropertyDescriptor";
    pub const GET_PROPERTY_DESCRIPTOR: &str = "getPropertyDescriptor";
    pub const DEFINE_PROPERTY: &str = "defineProperty";
    pub const DELETE: &str = "delete";
    pub const HAS: &str = "has";
    pub const GET: &str = "get";
    pub const SET: &str = "set";
    pub const ITERATE: &str = "iterate";
    pub const ENUMERATE: &str = "enumerate";
    pub const GET_PROPERTY_NAMES: &str = "getPropertyNames";
    pub const GET_OWN_PROPERTY_NAMES: &str = "getOwnPropertyNames";
    pub const KEYS: &str = "keys";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnDescriptorSource {
    GetOwnPropertyDescriptor,
    GetPropertyDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InheritedDescriptorSource {
    GetPropertyDescriptor,
    /// Own descriptor, then an ordinary lookup along the target's prototypes.
    OwnThenTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrapOrDerived {
    Trap,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumerateStrategy {
    Iterate,
    Enumerate,
    FromPropertyNames,
    FromTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnKeysSource {
    Keys,
    GetOwnPropertyNames,
}

#[derive(Debug, Clone, Copy)]
struct TrapPlan {
    own_descriptor: OwnDescriptorSource,
    inherited_descriptor: InheritedDescriptorSource,
    has: TrapOrDerived,
    get: TrapOrDerived,
    set: TrapOrDerived,
    enumerate: EnumerateStrategy,
    keys: TrapOrDerived,
    own_keys: OwnKeysSource,
}

impl TrapPlan {
    fn for_handler(interp: &mut Interpreter, handler: JsObject) -> Result<Self, JsValue> {
        let mut defines = |name: &str| interp.has_property(handler, name);
        let trap_or_derived = |present: bool| {
            if present {
                TrapOrDerived::Trap
            } else {
                TrapOrDerived::Derived
            }
        };

        let has_own = defines(trap::GET_OWN_PROPERTY_DESCRIPTOR)?;
        let has_inherited = defines(trap::GET_PROPERTY_DESCRIPTOR)?;
        let own_descriptor = if !has_own && has_inherited {
            OwnDescriptorSource::GetPropertyDescriptor
        } else {
            OwnDescriptorSource::GetOwnPropertyDescriptor
        };
        let inherited_descriptor = if has_inherited {
            InheritedDescriptorSource::GetPropertyDescriptor
        } else {
            InheritedDescriptorSource::OwnThenTarget
        };
        let has = trap_or_derived(defines(trap::HAS)?);
        let get = trap_or_derived(defines(trap::GET)?);
        let set = trap_or_derived(defines(trap::SET)?);
        let enumerate = if defines(trap::ITERATE)? {
            EnumerateStrategy::Iterate
        } else if defines(trap::ENUMERATE)? {
            EnumerateStrategy::Enumerate
        } else if defines(trap::GET_PROPERTY_NAMES)? {
            EnumerateStrategy::FromPropertyNames
        } else {
            EnumerateStrategy::FromTarget
        };
        let has_keys = defines(trap::KEYS)?;
        let keys = trap_or_derived(has_keys);
        let own_keys = if has_keys {
            OwnKeysSource::Keys
        } else {
            OwnKeysSource::GetOwnPropertyNames
        };

        Ok(Self {
            own_descriptor,
            inherited_descriptor,
            has,
            get,
            set,
            enumerate,
            keys,
            own_keys,
        })
    }
}

/// §6.2.6.6 CompletePropertyDescriptor over a descriptor object returned by a
/// legacy trap. `undefined` and `null` mean "no such property".
pub fn normalize_and_complete_property_descriptor(
    interp: &mut Interpreter,
    raw: &JsValue,
) -> Result<Option<PropertyDescriptor>, JsValue> {
    if raw.is_nullish() {
        return Ok(None);
    }
    let desc = interp.to_property_descriptor(raw)?;
    Ok(Some(complete_descriptor(desc)))
}

/// Modern trap record derived from a legacy handler object.
pub struct LegacyHandlerTraps {
    handler: JsObject,
    plan: TrapPlan,
    call_trap: Option<JsValue>,
    construct_trap: Option<JsValue>,
}

impl LegacyHandlerTraps {
    pub fn new(
        interp: &mut Interpreter,
        handler: JsObject,
        call_trap: Option<JsValue>,
        construct_trap: Option<JsValue>,
    ) -> Result<Self, JsValue> {
        let plan = TrapPlan::for_handler(interp, handler)?;
        log::debug!("legacy handler #{}: {plan:?}", handler.id);
        Ok(Self {
            handler,
            plan,
            call_trap,
            construct_trap,
        })
    }

    /// Calls `handler[name](...args)` with the handler as `this`.
    fn invoke(
        &self,
        interp: &mut Interpreter,
        name: &str,
        args: &[JsValue],
    ) -> Result<JsValue, JsValue> {
        let handler: JsValue = self.handler.into();
        let member = interp.get(self.handler, name, &handler)?;
        if !interp.is_callable(&member) {
            return Err(interp.throw_error(LegacyError::NotCallable(name.to_string())));
        }
        log::trace!("legacy handler #{}: {name}", self.handler.id);
        interp.call_function(&member, &handler, args).into_result()
    }

    fn invoke_for_keys(
        &self,
        interp: &mut Interpreter,
        name: &str,
    ) -> Result<Vec<String>, JsValue> {
        let result = self.invoke(interp, name, &[])?;
        materialize_keys(interp, &result)
    }

    fn own_descriptor(
        &self,
        interp: &mut Interpreter,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue> {
        let name = match self.plan.own_descriptor {
            OwnDescriptorSource::GetOwnPropertyDescriptor => trap::GET_OWN_PROPERTY_DESCRIPTOR,
            OwnDescriptorSource::GetPropertyDescriptor => trap::GET_PROPERTY_DESCRIPTOR,
        };
        let raw = self.invoke(interp, name, &[JsValue::string(key)])?;
        normalize_and_complete_property_descriptor(interp, &raw)
    }

    fn inherited_descriptor(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue> {
        if self.plan.inherited_descriptor == InheritedDescriptorSource::GetPropertyDescriptor {
            let raw = self.invoke(interp, trap::GET_PROPERTY_DESCRIPTOR, &[JsValue::string(key)])?;
            return normalize_and_complete_property_descriptor(interp, &raw);
        }
        if let Some(desc) = self.own_descriptor(interp, key)? {
            return Ok(Some(desc));
        }
        Self::target_chain_descriptor(interp, target, key)
    }

    /// Descriptor found along the concrete target's prototype chain.
    fn target_chain_descriptor(
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue> {
        let mut proto = interp.get_prototype_of(target)?;
        while let Some(p) = proto.as_object() {
            if let Some(desc) = interp.get_own_property(p, key)? {
                return Ok(Some(desc));
            }
            proto = interp.get_prototype_of(p)?;
        }
        Ok(None)
    }

    fn call_setter(
        interp: &mut Interpreter,
        desc: &PropertyDescriptor,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsValue> {
        match desc.setter() {
            Some(setter) => {
                interp.call_function(setter, receiver, &[value]).into_result()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn derived_set(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsValue> {
        if let Some(mut desc) = self.own_descriptor(interp, key)? {
            if desc.is_accessor_descriptor() {
                return Self::call_setter(interp, &desc, value, receiver);
            }
            if !desc.is_writable() {
                return Ok(false);
            }
            desc.value = Some(value);
            let desc_obj = interp.from_property_descriptor(&desc);
            self.invoke(interp, trap::DEFINE_PROPERTY, &[JsValue::string(key), desc_obj])?;
            return Ok(true);
        }
        // own lookup already missed
        let inherited = match self.plan.inherited_descriptor {
            InheritedDescriptorSource::GetPropertyDescriptor => {
                self.inherited_descriptor(interp, target, key)?
            }
            InheritedDescriptorSource::OwnThenTarget => {
                Self::target_chain_descriptor(interp, target, key)?
            }
        };
        if let Some(desc) = inherited {
            if desc.is_accessor_descriptor() {
                return Self::call_setter(interp, &desc, value, receiver);
            }
            if !desc.is_writable() {
                return Ok(false);
            }
        }
        let Some(recv) = receiver.as_object() else {
            return Ok(false);
        };
        if !interp.is_extensible(recv)? {
            return Ok(false);
        }
        interp.define_own_property(recv, key, PropertyDescriptor::data_default(value))
    }
}

fn materialize_keys(interp: &mut Interpreter, list: &JsValue) -> Result<Vec<String>, JsValue> {
    Ok(interp
        .list_from_array_like(list)?
        .iter()
        .map(to_property_key)
        .collect())
}

fn key_iterator(interp: &mut Interpreter, keys: Vec<String>) -> JsValue {
    let values = keys.iter().map(|k| JsValue::string(k)).collect();
    interp.create_list_iterator(values)
}

impl ProxyHandler for LegacyHandlerTraps {
    fn get_prototype_of(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
    ) -> Result<JsValue, JsValue> {
        interp.get_prototype_of(target)
    }

    fn set_prototype_of(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        proto: &JsValue,
    ) -> Result<bool, JsValue> {
        interp.set_prototype_of(target, proto)
    }

    fn is_extensible(&self, interp: &mut Interpreter, target: JsObject) -> Result<bool, JsValue> {
        interp.is_extensible(target)
    }

    fn prevent_extensions(
        &self,
        _interp: &mut Interpreter,
        _target: JsObject,
    ) -> Result<bool, JsValue> {
        Ok(false)
    }

    fn get_own_property(
        &self,
        interp: &mut Interpreter,
        _target: JsObject,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue> {
        self.own_descriptor(interp, key)
    }

    fn define_own_property(
        &self,
        interp: &mut Interpreter,
        _target: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Result<bool, JsValue> {
        let desc_obj = interp.from_property_descriptor(&desc);
        self.invoke(interp, trap::DEFINE_PROPERTY, &[JsValue::string(key), desc_obj])?;
        Ok(true)
    }

    fn has(&self, interp: &mut Interpreter, target: JsObject, key: &str) -> Result<bool, JsValue> {
        match self.plan.has {
            TrapOrDerived::Trap => {
                let result = self.invoke(interp, trap::HAS, &[JsValue::string(key)])?;
                Ok(to_boolean(&result))
            }
            TrapOrDerived::Derived => Ok(self.inherited_descriptor(interp, target, key)?.is_some()),
        }
    }

    fn get(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        receiver: &JsValue,
    ) -> Result<JsValue, JsValue> {
        if self.plan.get == TrapOrDerived::Trap {
            return self.invoke(interp, trap::GET, &[receiver.clone(), JsValue::string(key)]);
        }
        match self.inherited_descriptor(interp, target, key)? {
            Some(desc) if desc.is_accessor_descriptor() => match desc.getter() {
                Some(getter) => interp.call_function(getter, receiver, &[]).into_result(),
                None => Ok(JsValue::Undefined),
            },
            Some(desc) => Ok(desc.value.unwrap_or(JsValue::Undefined)),
            None => Ok(JsValue::Undefined),
        }
    }

    fn set(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsValue> {
        match self.plan.set {
            TrapOrDerived::Trap => {
                let args = [receiver.clone(), JsValue::string(key), value];
                Ok(to_boolean(&self.invoke(interp, trap::SET, &args)?))
            }
            TrapOrDerived::Derived => self.derived_set(interp, target, key, value, receiver),
        }
    }

    fn delete(&self, interp: &mut Interpreter, _target: JsObject, key: &str) -> Result<bool, JsValue> {
        let result = self.invoke(interp, trap::DELETE, &[JsValue::string(key)])?;
        Ok(to_boolean(&result))
    }

    fn enumerate(&self, interp: &mut Interpreter, target: JsObject) -> Result<JsValue, JsValue> {
        let keys = match self.plan.enumerate {
            EnumerateStrategy::Iterate => {
                let result = self.invoke(interp, trap::ITERATE, &[])?;
                if interp.is_iterator_object(&result)? {
                    return Ok(result);
                }
                materialize_keys(interp, &result)?
            }
            EnumerateStrategy::Enumerate => self.invoke_for_keys(interp, trap::ENUMERATE)?,
            EnumerateStrategy::FromPropertyNames => {
                let names = self.invoke_for_keys(interp, trap::GET_PROPERTY_NAMES)?;
                let mut keys = Vec::with_capacity(names.len());
                for name in names {
                    if self
                        .inherited_descriptor(interp, target, &name)?
                        .is_some_and(|d| d.is_enumerable())
                    {
                        keys.push(name);
                    }
                }
                keys
            }
            EnumerateStrategy::FromTarget => {
                let mut keys = self.keys(interp, target)?;
                if let Some(proto) = interp.get_prototype_of(target)?.as_object() {
                    let mut seen: FxHashSet<String> = keys.iter().cloned().collect();
                    for key in interp.for_in_keys(proto)? {
                        if seen.insert(key.clone()) {
                            keys.push(key);
                        }
                    }
                }
                keys
            }
        };
        Ok(key_iterator(interp, keys))
    }

    fn keys(&self, interp: &mut Interpreter, _target: JsObject) -> Result<Vec<String>, JsValue> {
        if self.plan.keys == TrapOrDerived::Trap {
            return self.invoke_for_keys(interp, trap::KEYS);
        }
        let names = self.invoke_for_keys(interp, trap::GET_OWN_PROPERTY_NAMES)?;
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            if self
                .own_descriptor(interp, &name)?
                .is_some_and(|d| d.is_enumerable())
            {
                keys.push(name);
            }
        }
        Ok(keys)
    }

    fn own_keys(&self, interp: &mut Interpreter, _target: JsObject) -> Result<Vec<String>, JsValue> {
        match self.plan.own_keys {
            OwnKeysSource::Keys => self.invoke_for_keys(interp, trap::KEYS),
            OwnKeysSource::GetOwnPropertyNames => {
                self.invoke_for_keys(interp, trap::GET_OWN_PROPERTY_NAMES)
            }
        }
    }

    fn apply(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        this: &JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsValue> {
        let callee = self.call_trap.clone().unwrap_or_else(|| target.into());
        interp.call_function(&callee, this, args).into_result()
    }

    fn construct(
        &self,
        interp: &mut Interpreter,
        target: JsObject,
        args: &[JsValue],
        new_target: &JsValue,
    ) -> Result<JsValue, JsValue> {
        let callee = self.construct_trap.clone().unwrap_or_else(|| target.into());
        interp.construct(&callee, args, Some(new_target))
    }
}

fn handler_object(
    interp: &mut Interpreter,
    handler: &JsValue,
    operation: &'static str,
) -> Result<JsObject, JsValue> {
    handler
        .as_object()
        .ok_or_else(|| interp.throw_error(LegacyError::HandlerNotObject(operation)))
}

/// `Proxy.create(handler, proto)`: a virtual object over a fresh ordinary
/// target whose prototype is `proto` (`undefined` means `null`).
pub fn create_virtual_object(
    interp: &mut Interpreter,
    handler: &JsValue,
    proto: &JsValue,
) -> Result<JsValue, JsValue> {
    let handler = handler_object(interp, handler, "createVirtualObject")?;
    let proto = match proto {
        JsValue::Object(p) => Some(interp.obj(*p)),
        JsValue::Null | JsValue::Undefined => None,
        _ => return Err(interp.throw_error(LegacyError::InvalidPrototype)),
    };
    let target = interp.create_object_with_proto(proto);
    let traps = LegacyHandlerTraps::new(interp, handler, None, None)?;
    Ok(interp.create_proxy(target, Rc::new(traps)))
}

/// `Proxy.createFunction(handler, callTrap, constructTrap)`. A missing or
/// `undefined` construct trap falls back to the call trap.
pub fn create_virtual_function(
    interp: &mut Interpreter,
    handler: &JsValue,
    call_trap: &JsValue,
    construct_trap: Option<&JsValue>,
) -> Result<JsValue, JsValue> {
    let handler = handler_object(interp, handler, "createVirtualFunction")?;
    if !interp.is_callable(call_trap) {
        return Err(interp.throw_error(LegacyError::NotCallable("callTrap".to_string())));
    }
    let construct_trap = construct_trap
        .filter(|c| !c.is_undefined())
        .unwrap_or(call_trap)
        .clone();
    if !interp.is_callable(&construct_trap) {
        return Err(interp.throw_error(LegacyError::NotCallable("constructTrap".to_string())));
    }
    let target = interp.create_function(JsFunction::constructor("", 0, |_, _, _| {
        Completion::Normal(JsValue::Undefined)
    }));
    let Some(target) = target.as_object() else {
        return Err(interp.create_type_error("createVirtualFunction: target is not an object"));
    };
    let traps = LegacyHandlerTraps::new(
        interp,
        handler,
        Some(call_trap.clone()),
        Some(construct_trap),
    )?;
    Ok(interp.create_proxy(target, Rc::new(traps)))
}

impl Interpreter {
    pub(crate) fn setup_proxy(&mut self) {
        let namespace = self.create_object();
        let proxy = self.obj(namespace);
        proxy.borrow_mut().class_name = "Proxy".to_string();

        self.define_native_method(&proxy, "create", 2, |interp, _this, args| {
            let handler = args.first().cloned().unwrap_or(JsValue::Undefined);
            let proto = args.get(1).cloned().unwrap_or(JsValue::Undefined);
            create_virtual_object(interp, &handler, &proto).into()
        });
        self.define_native_method(&proxy, "createFunction", 3, |interp, _this, args| {
            let handler = args.first().cloned().unwrap_or(JsValue::Undefined);
            let call_trap = args.get(1).cloned().unwrap_or(JsValue::Undefined);
            create_virtual_function(interp, &handler, &call_trap, args.get(2)).into()
        });

        if let Some(global) = self.global_object.clone() {
            global
                .borrow_mut()
                .insert_builtin("Proxy".to_string(), namespace.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn number(v: &JsValue) -> f64 {
        match v {
            JsValue::Number(n) => *n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    fn virtual_object(interp: &mut Interpreter, handler: JsObject) -> (JsObject, JsValue) {
        let obj = create_virtual_object(interp, &handler.into(), &JsValue::Null).unwrap();
        (obj.as_object().unwrap(), obj)
    }

    /// Handler whose own descriptors live as descriptor objects on `store`.
    fn store_backed_handler(interp: &mut Interpreter) -> (JsObject, JsObject, Rc<RefCell<usize>>) {
        let handler = interp.create_object();
        let store = interp.create_object();
        let defines = Rc::new(RefCell::new(0));
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
        (handler, store, defines)
    }

    #[test]
    fn direct_get_trap_wins_over_descriptor_derivation() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let consulted = Rc::new(RefCell::new(false));
        let flag = consulted.clone();
        method(&mut interp, handler, "get", |_, _, _| Completion::Normal(JsValue::Number(42.0)));
        method(&mut interp, handler, "getPropertyDescriptor", move |_, _, _| {
            *flag.borrow_mut() = true;
            Completion::Normal(JsValue::Undefined)
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        for key in ["a", "length", "0"] {
            assert_eq!(number(&interp.get(obj, key, &recv).unwrap()), 42.0);
        }
        assert!(!*consulted.borrow());
    }

    #[test]
    fn get_trap_receives_receiver_and_key() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "get", |_, this, args| {
            let receiver_is_object = arg(args, 0).is_object();
            let handler_is_this = this.is_object();
            let key = to_js_string(&arg(args, 1));
            Completion::Normal(JsValue::string(&format!(
                "{receiver_is_object}:{handler_is_this}:{key}"
            )))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert_eq!(to_js_string(&interp.get(obj, "k", &recv).unwrap()), "true:true:k");
    }

    #[test]
    fn get_derives_from_property_descriptor() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "getPropertyDescriptor", |interp, _, _| {
            let desc = PropertyDescriptor {
                value: Some(JsValue::Number(1.0)),
                enumerable: Some(true),
                configurable: Some(true),
                ..Default::default()
            };
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert_eq!(number(&interp.get(obj, "anything", &recv).unwrap()), 1.0);
        let own = interp.get_own_property(obj, "anything").unwrap().unwrap();
        assert_eq!(own.writable, Some(false));
    }

    #[test]
    fn derived_get_invokes_getter_on_receiver() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "getPropertyDescriptor", |interp, _, _| {
            let getter = interp.create_function(JsFunction::native("g", 0, |interp, this, _| {
                interp.get_v(this, "base").into()
            }));
            let desc = PropertyDescriptor {
                get: Some(getter),
                ..Default::default()
            };
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let (_, proxy) = virtual_object(&mut interp, handler);
        let receiver = interp.create_object();
        interp
            .obj(receiver)
            .borrow_mut()
            .insert_value("base".to_string(), JsValue::Number(5.0));
        let obj = proxy.as_object().unwrap();
        assert_eq!(number(&interp.get(obj, "derived", &receiver.into()).unwrap()), 5.0);
    }

    #[test]
    fn derived_set_defines_on_receiver_then_reads_back() {
        let mut interp = Interpreter::new();
        let (handler, store, defines) = store_backed_handler(&mut interp);
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(interp.set(obj, "fresh", JsValue::Number(5.0), &recv).unwrap());
        assert_eq!(*defines.borrow(), 1);
        assert!(interp.obj(store).borrow().has_own_property("fresh"));
        assert_eq!(number(&interp.get(obj, "fresh", &recv).unwrap()), 5.0);
        assert!(interp.set(obj, "fresh", JsValue::Number(6.0), &recv).unwrap());
        assert_eq!(number(&interp.get(obj, "fresh", &recv).unwrap()), 6.0);
        assert_eq!(*defines.borrow(), 2);
    }

    #[test]
    fn derived_set_fails_on_read_only_without_defining() {
        let mut interp = Interpreter::new();
        let (handler, store, defines) = store_backed_handler(&mut interp);
        let read_only = interp.from_property_descriptor(&PropertyDescriptor::data(
            JsValue::Number(1.0),
            false,
            true,
            true,
        ));
        interp
            .obj(store)
            .borrow_mut()
            .insert_value("ro".to_string(), read_only);
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(!interp.set(obj, "ro", JsValue::Number(2.0), &recv).unwrap());
        assert_eq!(*defines.borrow(), 0);
    }

    #[test]
    fn derived_set_fails_on_inherited_read_only() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "getOwnPropertyDescriptor", |_, _, _| {
            Completion::Normal(JsValue::Undefined)
        });
        method(&mut interp, handler, "getPropertyDescriptor", |interp, _, _| {
            let desc = PropertyDescriptor::data(JsValue::Null, false, true, true);
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        method(&mut interp, handler, "defineProperty", |_, _, _| {
            panic!("defineProperty must not be reached")
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(!interp.set(obj, "x", JsValue::Number(1.0), &recv).unwrap());
    }

    #[test]
    fn derived_set_uses_inherited_setter() {
        let mut interp = Interpreter::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_in_setter = seen.clone();
        let setter = interp.create_function(JsFunction::native("s", 1, move |_, _, args| {
            *seen_in_setter.borrow_mut() = Some(arg(args, 0));
            Completion::Normal(JsValue::Undefined)
        }));
        let handler = interp.create_object();
        method(&mut interp, handler, "getOwnPropertyDescriptor", |_, _, _| {
            Completion::Normal(JsValue::Undefined)
        });
        method(&mut interp, handler, "getPropertyDescriptor", move |interp, _, _| {
            let desc = PropertyDescriptor::accessor(JsValue::Undefined, setter.clone(), true, true);
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(interp.set(obj, "x", JsValue::Number(3.0), &recv).unwrap());
        assert_eq!(seen.borrow().as_ref().map(number), Some(3.0));
    }

    #[test]
    fn set_trap_is_called_with_receiver_key_value() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_in_trap = log.clone();
        method(&mut interp, handler, "set", move |_, _, args| {
            log_in_trap
                .borrow_mut()
                .push((to_js_string(&arg(args, 1)), arg(args, 2)));
            Completion::Normal(JsValue::Boolean(true))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(interp.set(obj, "k", JsValue::Number(8.0), &recv).unwrap());
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "k");
        assert_eq!(number(&log[0].1), 8.0);
    }

    #[test]
    fn conflicting_descriptor_is_a_type_error() {
        let mut interp = Interpreter::new();
        let raw = interp.create_object();
        let getter = interp.create_function(JsFunction::native("g", 0, |_, _, _| {
            Completion::Normal(JsValue::Undefined)
        }));
        {
            let data = interp.obj(raw);
            let mut r = data.borrow_mut();
            r.insert_value("value".to_string(), JsValue::Number(1.0));
            r.insert_value("get".to_string(), getter);
        }
        let err = normalize_and_complete_property_descriptor(&mut interp, &raw.into()).unwrap_err();
        assert!(interp.is_type_error(&err));
        assert!(
            normalize_and_complete_property_descriptor(&mut interp, &JsValue::Undefined)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn normalization_defaults_missing_attributes() {
        let mut interp = Interpreter::new();
        let raw = interp.create_object();
        interp
            .obj(raw)
            .borrow_mut()
            .insert_value("value".to_string(), JsValue::Number(1.0));
        let desc = normalize_and_complete_property_descriptor(&mut interp, &raw.into())
            .unwrap()
            .unwrap();
        assert_eq!(desc.writable, Some(false));
        assert_eq!(desc.enumerable, Some(false));
        assert_eq!(desc.configurable, Some(false));
    }

    #[test]
    fn virtual_function_routes_call_and_construct_to_one_trap() {
        let mut interp = Interpreter::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let calls_in_trap = calls.clone();
        let trap = interp.create_function(JsFunction::constructor("trap", 1, move |interp, _, args| {
            calls_in_trap
                .borrow_mut()
                .push((arg(args, 0), interp.new_target()));
            Completion::Normal(JsValue::Undefined)
        }));
        let handler = interp.create_object();
        method(&mut interp, handler, "getOwnPropertyDescriptor", |_, _, _| {
            Completion::Normal(JsValue::Undefined)
        });
        let func = create_virtual_function(&mut interp, &handler.into(), &trap, None).unwrap();
        assert!(interp.is_callable(&func));
        assert!(interp.is_constructor(&func));
        interp
            .call_function(&func, &JsValue::Undefined, &[JsValue::Number(1.0)])
            .into_result()
            .unwrap();
        let made = interp.construct(&func, &[JsValue::Number(2.0)], None).unwrap();
        assert!(made.is_object());
        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(number(&calls[0].0), 1.0);
        assert!(calls[0].1.is_undefined());
        assert_eq!(number(&calls[1].0), 2.0);
        assert!(strict_equality(&calls[1].1, &func));
    }

    #[test]
    fn virtual_function_rejects_bad_arguments() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let err = create_virtual_function(&mut interp, &handler.into(), &JsValue::Null, None).unwrap_err();
        assert_eq!(interp.error_message(&err).as_deref(), Some("callTrap is not a function"));
        let f = interp.create_function(JsFunction::native("f", 0, |_, _, _| {
            Completion::Normal(JsValue::Undefined)
        }));
        let err = create_virtual_function(&mut interp, &JsValue::Number(1.0), &f, None).unwrap_err();
        assert!(interp.is_type_error(&err));
        let bad = JsValue::Number(2.0);
        let err = create_virtual_function(&mut interp, &handler.into(), &f, Some(&bad)).unwrap_err();
        assert_eq!(
            interp.error_message(&err).as_deref(),
            Some("constructTrap is not a function")
        );
    }

    #[test]
    fn has_derives_from_descriptor_presence() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "getPropertyDescriptor", |interp, _, args| {
            if to_property_key(&arg(args, 0)) != "x" {
                return Completion::Normal(JsValue::Undefined);
            }
            let desc = PropertyDescriptor {
                value: Some(JsValue::Number(7.0)),
                enumerable: Some(true),
                configurable: Some(true),
                ..Default::default()
            };
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(interp.has_property(obj, "x").unwrap());
        assert_eq!(number(&interp.get(obj, "x", &recv).unwrap()), 7.0);
        assert!(!interp.has_property(obj, "y").unwrap());
    }

    #[test]
    fn missing_derivation_source_reports_the_missing_trap() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let (obj, recv) = virtual_object(&mut interp, handler);
        let err = interp.get(obj, "x", &recv).unwrap_err();
        assert_eq!(
            interp.error_message(&err).as_deref(),
            Some("getOwnPropertyDescriptor is not a function")
        );
        let err = interp.delete(obj, "x").unwrap_err();
        assert_eq!(interp.error_message(&err).as_deref(), Some("delete is not a function"));
    }

    #[test]
    fn handler_errors_propagate_unchanged() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "has", |_, _, _| {
            Completion::Throw(JsValue::string("from handler"))
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        let err = interp.has_property(obj, "x").unwrap_err();
        assert_eq!(to_js_string(&err), "from handler");
    }

    #[test]
    fn extensibility_and_prototype_come_from_the_target() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let proto = interp.create_object();
        let obj = create_virtual_object(&mut interp, &handler.into(), &proto.into()).unwrap();
        let o = obj.as_object().unwrap();
        assert!(strict_equality(&interp.get_prototype_of(o).unwrap(), &proto.into()));
        assert!(interp.is_extensible(o).unwrap());
        assert!(!interp.prevent_extensions(o).unwrap());
        assert!(interp.is_extensible(o).unwrap());
        let err = create_virtual_object(&mut interp, &handler.into(), &JsValue::Number(1.0)).unwrap_err();
        assert!(interp.is_type_error(&err));
        let err = create_virtual_object(&mut interp, &JsValue::Undefined, &JsValue::Null).unwrap_err();
        assert_eq!(
            interp.error_message(&err).as_deref(),
            Some("createVirtualObject requires that the handler be an object")
        );
    }

    #[test]
    fn define_property_always_reports_success() {
        let mut interp = Interpreter::new();
        let (handler, store, _) = store_backed_handler(&mut interp);
        let (obj, _) = virtual_object(&mut interp, handler);
        let desc = PropertyDescriptor::data(JsValue::Number(1.0), false, false, false);
        assert!(interp.define_own_property(obj, "k", desc).unwrap());
        let stored = interp.obj(store).borrow().get_property_value("k").unwrap();
        assert!(matches!(interp.get_v(&stored, "writable").unwrap(), JsValue::Boolean(false)));
    }

    #[test]
    fn iterate_trap_iterators_are_used_lazily() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "iterate", |interp, _, _| {
            let values = vec![JsValue::string("a"), JsValue::string("b")];
            Completion::Normal(interp.create_list_iterator(values))
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        let iter = interp.enumerate(obj).unwrap();
        assert_eq!(interp.iterator_step(&iter).unwrap().map(|v| to_js_string(&v)).as_deref(), Some("a"));
        assert_eq!(interp.iterate_to_list(&iter).unwrap().len(), 1);
    }

    #[test]
    fn enumerate_trap_result_is_materialized() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "enumerate", |interp, _, _| {
            Completion::Normal(interp.create_array(vec![JsValue::string("p"), JsValue::Number(0.0)]))
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        assert_eq!(interp.for_in_keys(obj).unwrap(), vec!["p", "0"]);
    }

    #[test]
    fn enumerate_filters_property_names_by_enumerability() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "getPropertyNames", |interp, _, _| {
            Completion::Normal(interp.create_array(vec![JsValue::string("shown"), JsValue::string("hidden")]))
        });
        method(&mut interp, handler, "getPropertyDescriptor", |interp, _, args| {
            let enumerable = to_property_key(&arg(args, 0)) == "shown";
            let desc = PropertyDescriptor::data(JsValue::Null, true, enumerable, true);
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        assert_eq!(interp.for_in_keys(obj).unwrap(), vec!["shown"]);
    }

    #[test]
    fn enumerate_without_traps_walks_the_target() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        let proto = interp.create_object();
        interp
            .obj(proto)
            .borrow_mut()
            .insert_value("inherited".to_string(), JsValue::Null);
        method(&mut interp, handler, "getOwnPropertyNames", |interp, _, _| {
            Completion::Normal(interp.create_array(vec![JsValue::string("x")]))
        });
        method(&mut interp, handler, "getOwnPropertyDescriptor", |interp, _, args| {
            if to_property_key(&arg(args, 0)) != "x" {
                return Completion::Normal(JsValue::Undefined);
            }
            let desc = PropertyDescriptor::data(JsValue::Number(1.0), true, true, true);
            Completion::Normal(interp.from_property_descriptor(&desc))
        });
        let obj = create_virtual_object(&mut interp, &handler.into(), &proto.into()).unwrap();
        let obj = obj.as_object().unwrap();
        assert_eq!(interp.keys(obj).unwrap(), vec!["x"]);
        assert_eq!(interp.for_in_keys(obj).unwrap(), vec!["x", "inherited"]);
    }

    #[test]
    fn derived_set_asks_for_the_own_descriptor_once() {
        let mut interp = Interpreter::new();
        let (handler, store, defines) = store_backed_handler(&mut interp);
        let lookups = Rc::new(RefCell::new(0));
        let counter = lookups.clone();
        method(&mut interp, handler, "getOwnPropertyDescriptor", move |interp, _, args| {
            *counter.borrow_mut() += 1;
            let key = to_property_key(&arg(args, 0));
            let desc = interp.obj(store).borrow().get_property_value(&key);
            Completion::Normal(desc.unwrap_or(JsValue::Undefined))
        });
        let (obj, recv) = virtual_object(&mut interp, handler);
        assert!(interp.set(obj, "fresh", JsValue::Number(5.0), &recv).unwrap());
        assert_eq!(*lookups.borrow(), 1);
        assert_eq!(*defines.borrow(), 1);
    }

    #[test]
    fn keys_derive_from_own_property_names() {
        let mut interp = Interpreter::new();
        let (handler, store, _) = store_backed_handler(&mut interp);
        method(&mut interp, handler, "getOwnPropertyNames", move |interp, _, _| {
            let names = interp.obj(store).borrow().own_keys();
            let values = names.iter().map(|k| JsValue::string(k)).collect();
            Completion::Normal(interp.create_array(values))
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        interp
            .define_own_property(obj, "visible", PropertyDescriptor::data_default(JsValue::Null))
            .unwrap();
        interp
            .define_own_property(
                obj,
                "hidden",
                PropertyDescriptor::data(JsValue::Null, true, false, true),
            )
            .unwrap();
        assert_eq!(interp.keys(obj).unwrap(), vec!["visible"]);
        assert_eq!(interp.own_property_keys(obj).unwrap(), vec!["visible", "hidden"]);
    }

    #[test]
    fn own_keys_prefers_keys_trap() {
        let mut interp = Interpreter::new();
        let handler = interp.create_object();
        method(&mut interp, handler, "keys", |interp, _, _| {
            Completion::Normal(interp.create_array(vec![JsValue::string("k")]))
        });
        method(&mut interp, handler, "getOwnPropertyNames", |_, _, _| {
            panic!("getOwnPropertyNames must not be reached")
        });
        let (obj, _) = virtual_object(&mut interp, handler);
        assert_eq!(interp.own_property_keys(obj).unwrap(), vec!["k"]);
        assert_eq!(interp.keys(obj).unwrap(), vec!["k"]);
    }

    #[test]
    fn proxy_global_exposes_factories() {
        let mut interp = Interpreter::new();
        let global = interp.global_object();
        let proxy = interp.get_v(&global, "Proxy").unwrap();
        let create = interp.get_v(&proxy, "create").unwrap();
        let handler = interp.create_object();
        method(&mut interp, handler, "get", |_, _, _| Completion::Normal(JsValue::Number(42.0)));
        let obj = interp
            .call_function(&create, &proxy, &[handler.into()])
            .into_result()
            .unwrap();
        assert_eq!(number(&interp.get_v(&obj, "x").unwrap()), 42.0);
        let create_function = interp.get_v(&proxy, "createFunction").unwrap();
        let err = interp
            .call_function(&create_function, &proxy, &[handler.into()])
            .into_result()
            .unwrap_err();
        assert!(interp.is_type_error(&err));
    }
}
