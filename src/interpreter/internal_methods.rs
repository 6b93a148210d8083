//! Object internal methods (§10.1 ordinary objects, §10.5 proxy exotic objects).
//!
//! Every operation first checks for a proxy slot and, if present, hands the
//! call to the object's [`ProxyHandler`] together with its concrete target.

use super::*;

impl Interpreter {
    pub(crate) fn proxy_of(&self, o: JsObject) -> Option<ProxyData> {
        self.obj(o).borrow().proxy.clone()
    }

    fn ordinary_prototype(&self, o: JsObject) -> Option<JsObject> {
        self.obj(o).borrow().prototype_id().map(|id| JsObject { id })
    }

    // [[GetPrototypeOf]]
    pub fn get_prototype_of(&mut self, o: JsObject) -> Result<JsValue, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: getPrototypeOf", o.id);
            return handler.get_prototype_of(self, target);
        }
        Ok(self.ordinary_prototype(o).map_or(JsValue::Null, JsValue::Object))
    }

    // [[SetPrototypeOf]]
    pub fn set_prototype_of(&mut self, o: JsObject, proto: &JsValue) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: setPrototypeOf", o.id);
            return handler.set_prototype_of(self, target, proto);
        }
        let new_proto = match proto {
            JsValue::Object(p) => Some(*p),
            JsValue::Null => None,
            _ => return Err(self.throw_error(LegacyError::InvalidPrototype)),
        };
        let current = self.ordinary_prototype(o);
        if current == new_proto {
            return Ok(true);
        }
        if !self.obj(o).borrow().extensible {
            return Ok(false);
        }
        // Cycle check stops at proxies, as §10.1.2.1 step 8 does.
        let mut p = new_proto;
        while let Some(cur) = p {
            if cur == o {
                return Ok(false);
            }
            if self.proxy_of(cur).is_some() {
                break;
            }
            p = self.ordinary_prototype(cur);
        }
        let proto_rc = new_proto.map(|p| self.obj(p));
        self.obj(o).borrow_mut().prototype = proto_rc;
        Ok(true)
    }

    // [[IsExtensible]]
    pub fn is_extensible(&mut self, o: JsObject) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: isExtensible", o.id);
            return handler.is_extensible(self, target);
        }
        Ok(self.obj(o).borrow().extensible)
    }

    // [[PreventExtensions]]
    pub fn prevent_extensions(&mut self, o: JsObject) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: preventExtensions", o.id);
            return handler.prevent_extensions(self, target);
        }
        self.obj(o).borrow_mut().extensible = false;
        Ok(true)
    }

    // [[GetOwnProperty]]
    pub fn get_own_property(
        &mut self,
        o: JsObject,
        key: &str,
    ) -> Result<Option<PropertyDescriptor>, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: getOwnPropertyDescriptor {key}", o.id);
            return handler.get_own_property(self, target, key);
        }
        Ok(self.obj(o).borrow().get_own_property(key).cloned())
    }

    // [[DefineOwnProperty]]
    pub fn define_own_property(
        &mut self,
        o: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: defineProperty {key}", o.id);
            return handler.define_own_property(self, target, key, desc);
        }
        Ok(self.obj(o).borrow_mut().define_own_property(key.to_string(), desc))
    }

    // [[HasProperty]]
    pub fn has_property(&mut self, o: JsObject, key: &str) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: has {key}", o.id);
            return handler.has(self, target, key);
        }
        if self.obj(o).borrow().has_own_property(key) {
            return Ok(true);
        }
        match self.ordinary_prototype(o) {
            Some(parent) => self.has_property(parent, key),
            None => Ok(false),
        }
    }

    // [[Get]]
    pub fn get(&mut self, o: JsObject, key: &str, receiver: &JsValue) -> Result<JsValue, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: get {key}", o.id);
            return handler.get(self, target, key, receiver);
        }
        let own = self.obj(o).borrow().get_own_property(key).cloned();
        match own {
            Some(desc) if desc.is_accessor_descriptor() => match desc.getter() {
                Some(getter) => self.call_function(getter, receiver, &[]).into_result(),
                None => Ok(JsValue::Undefined),
            },
            Some(desc) => Ok(desc.value.unwrap_or(JsValue::Undefined)),
            None => match self.ordinary_prototype(o) {
                Some(parent) => self.get(parent, key, receiver),
                None => Ok(JsValue::Undefined),
            },
        }
    }

    // [[Set]], §10.1.9.2 OrdinarySetWithOwnDescriptor
    pub fn set(
        &mut self,
        o: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: set {key}", o.id);
            return handler.set(self, target, key, value, receiver);
        }
        let own = self.obj(o).borrow().get_own_property(key).cloned();
        let desc = match own {
            Some(d) => d,
            None => match self.ordinary_prototype(o) {
                Some(parent) => return self.set(parent, key, value, receiver),
                None => PropertyDescriptor::data_default(JsValue::Undefined),
            },
        };
        if desc.is_accessor_descriptor() {
            return match desc.setter() {
                Some(setter) => {
                    self.call_function(setter, receiver, &[value]).into_result()?;
                    Ok(true)
                }
                None => Ok(false),
            };
        }
        if !desc.is_writable() {
            return Ok(false);
        }
        let Some(recv) = receiver.as_object() else {
            return Ok(false);
        };
        match self.get_own_property(recv, key)? {
            Some(existing) => {
                if existing.is_accessor_descriptor() || !existing.is_writable() {
                    return Ok(false);
                }
                let update = PropertyDescriptor {
                    value: Some(value),
                    ..Default::default()
                };
                self.define_own_property(recv, key, update)
            }
            None => self.define_own_property(recv, key, PropertyDescriptor::data_default(value)),
        }
    }

    // [[Delete]]
    pub fn delete(&mut self, o: JsObject, key: &str) -> Result<bool, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: deleteProperty {key}", o.id);
            return handler.delete(self, target, key);
        }
        Ok(self.obj(o).borrow_mut().remove_property(key))
    }

    // [[OwnPropertyKeys]]
    pub fn own_property_keys(&mut self, o: JsObject) -> Result<Vec<String>, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: ownKeys", o.id);
            return handler.own_keys(self, target);
        }
        Ok(self.obj(o).borrow().own_keys())
    }

    /// Own enumerable string keys, as `Object.keys` reports them.
    pub fn keys(&mut self, o: JsObject) -> Result<Vec<String>, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: keys", o.id);
            return handler.keys(self, target);
        }
        Ok(self.obj(o).borrow().own_enumerable_keys())
    }

    /// Iterator object over the keys a for-in loop visits.
    pub fn enumerate(&mut self, o: JsObject) -> Result<JsValue, JsValue> {
        if let Some(ProxyData { target, handler }) = self.proxy_of(o) {
            log::trace!("proxy #{}: enumerate", o.id);
            return handler.enumerate(self, target);
        }
        let keys = self.for_in_keys(o)?;
        let values = keys.iter().map(|k| JsValue::string(k)).collect();
        Ok(self.create_list_iterator(values))
    }

    /// for-in key order: own enumerable keys first, then each prototype's, with
    /// keys already seen (enumerable or not) shadowing later ones.
    pub fn for_in_keys(&mut self, o: JsObject) -> Result<Vec<String>, JsValue> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut keys = Vec::new();
        let mut current = Some(o);
        while let Some(cur) = current {
            if self.proxy_of(cur).is_some() {
                let iter = self.enumerate(cur)?;
                for k in self.iterate_to_list(&iter)? {
                    let k = to_property_key(&k);
                    if seen.insert(k.clone()) {
                        keys.push(k);
                    }
                }
                break;
            }
            let data = self.obj(cur);
            let d = data.borrow();
            for k in &d.property_order {
                let enumerable = d.properties.get(k).is_some_and(|p| p.enumerable != Some(false));
                if seen.insert(k.clone()) && enumerable {
                    keys.push(k.clone());
                }
            }
            current = d.prototype_id().map(|id| JsObject { id });
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(v: &JsValue) -> f64 {
        match v {
            JsValue::Number(n) => *n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn get_follows_prototype_chain_with_receiver() {
        let mut interp = Interpreter::new();
        let parent = interp.create_object();
        let child = interp.create_object();
        interp.set_prototype_of(child, &parent.into()).unwrap();
        let getter = interp.create_function(JsFunction::native("get", 0, |interp, this, _| {
            let v = interp.get_v(this, "base").unwrap_or(JsValue::Undefined);
            Completion::Normal(v)
        }));
        interp.obj(parent).borrow_mut().insert_property(
            "derived".to_string(),
            PropertyDescriptor::accessor(getter, JsValue::Undefined, true, true),
        );
        interp
            .obj(child)
            .borrow_mut()
            .insert_value("base".to_string(), JsValue::Number(9.0));
        let recv: JsValue = child.into();
        assert_eq!(number(&interp.get(child, "derived", &recv).unwrap()), 9.0);
    }

    #[test]
    fn set_writes_to_receiver_not_prototype() {
        let mut interp = Interpreter::new();
        let parent = interp.create_object();
        let child = interp.create_object();
        interp.set_prototype_of(child, &parent.into()).unwrap();
        interp
            .obj(parent)
            .borrow_mut()
            .insert_value("x".to_string(), JsValue::Number(1.0));
        let recv: JsValue = child.into();
        assert!(interp.set(child, "x", JsValue::Number(2.0), &recv).unwrap());
        assert!(interp.obj(child).borrow().has_own_property("x"));
        let parent_x = interp.get(parent, "x", &parent.into()).unwrap();
        assert_eq!(number(&parent_x), 1.0);
    }

    #[test]
    fn set_fails_on_inherited_read_only() {
        let mut interp = Interpreter::new();
        let parent = interp.create_object();
        let child = interp.create_object();
        interp.set_prototype_of(child, &parent.into()).unwrap();
        interp.obj(parent).borrow_mut().insert_property(
            "ro".to_string(),
            PropertyDescriptor::data(JsValue::Number(1.0), false, true, true),
        );
        let recv: JsValue = child.into();
        assert!(!interp.set(child, "ro", JsValue::Number(2.0), &recv).unwrap());
        assert!(!interp.has_property(child, "missing").unwrap());
        assert!(interp.has_property(child, "ro").unwrap());
    }

    #[test]
    fn prototype_cycles_are_rejected() {
        let mut interp = Interpreter::new();
        let a = interp.create_object();
        let b = interp.create_object();
        assert!(interp.set_prototype_of(b, &a.into()).unwrap());
        assert!(!interp.set_prototype_of(a, &b.into()).unwrap());
        let err = interp.set_prototype_of(a, &JsValue::Number(1.0)).unwrap_err();
        assert!(interp.is_type_error(&err));
    }

    #[test]
    fn prevent_extensions_blocks_new_properties() {
        let mut interp = Interpreter::new();
        let o = interp.create_object();
        assert!(interp.prevent_extensions(o).unwrap());
        assert!(!interp.is_extensible(o).unwrap());
        let recv: JsValue = o.into();
        assert!(!interp.set(o, "x", JsValue::Null, &recv).unwrap());
    }

    #[test]
    fn for_in_keys_shadow_and_skip_non_enumerable() {
        let mut interp = Interpreter::new();
        let parent = interp.create_object();
        let child = interp.create_object();
        interp.set_prototype_of(child, &parent.into()).unwrap();
        {
            let p = interp.obj(parent);
            let mut p = p.borrow_mut();
            p.insert_value("a".to_string(), JsValue::Null);
            p.insert_value("hidden".to_string(), JsValue::Null);
        }
        {
            let c = interp.obj(child);
            let mut c = c.borrow_mut();
            c.insert_value("b".to_string(), JsValue::Null);
            c.insert_builtin("hidden".to_string(), JsValue::Null);
        }
        assert_eq!(interp.for_in_keys(child).unwrap(), vec!["b", "a"]);
        let iter = interp.enumerate(child).unwrap();
        assert_eq!(interp.iterate_to_list(&iter).unwrap().len(), 2);
    }

    #[test]
    fn delete_respects_configurability() {
        let mut interp = Interpreter::new();
        let o = interp.create_object();
        interp
            .obj(o)
            .borrow_mut()
            .insert_value("gone".to_string(), JsValue::Null);
        assert!(interp.delete(o, "gone").unwrap());
        assert!(interp.own_property_keys(o).unwrap().is_empty());
        interp.obj(o).borrow_mut().insert_property(
            "stuck".to_string(),
            PropertyDescriptor::data(JsValue::Null, true, true, false),
        );
        assert!(!interp.delete(o, "stuck").unwrap());
        assert_eq!(interp.keys(o).unwrap(), vec!["stuck"]);
    }
}
