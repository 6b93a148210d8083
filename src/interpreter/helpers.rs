use super::*;
use crate::types::number_ops;

// §7.1.3 ToBoolean
pub fn to_boolean(val: &JsValue) -> bool {
    match val {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::BigInt(b) => b.value.sign() != num_bigint::Sign::NoSign,
        JsValue::Symbol(_) | JsValue::Object(_) => true,
    }
}

pub fn to_js_string(val: &JsValue) -> String {
    format!("{val}")
}

// §7.1.19 ToPropertyKey
pub fn to_property_key(val: &JsValue) -> String {
    match val {
        JsValue::Symbol(s) => s.to_property_key(),
        other => to_js_string(other),
    }
}

// §7.1.20 ToLength, for the number-ish values array-likes carry
fn to_length(val: &JsValue) -> usize {
    let n = match val {
        JsValue::Number(n) => *n,
        JsValue::Boolean(b) => *b as u8 as f64,
        JsValue::String(s) => s.to_rust_string().trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.min(u32::MAX as f64) as usize
    }
}

pub fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

pub fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::equal(*a, *b),
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Symbol(a), JsValue::Symbol(b)) => a.id == b.id,
        (JsValue::BigInt(a), JsValue::BigInt(b)) => a.value == b.value,
        (JsValue::Object(a), JsValue::Object(b)) => a.id == b.id,
        _ => false,
    }
}

impl Interpreter {
    /// Reads `key` from any value; only objects have properties here.
    pub fn get_v(&mut self, val: &JsValue, key: &str) -> Result<JsValue, JsValue> {
        match val.as_object() {
            Some(o) => self.get(o, key, val),
            None => Ok(JsValue::Undefined),
        }
    }

    // §6.2.6.5 ToPropertyDescriptor
    pub fn to_property_descriptor(&mut self, val: &JsValue) -> Result<PropertyDescriptor, JsValue> {
        let Some(obj) = val.as_object() else {
            return Err(self.throw_error(LegacyError::DescriptorNotObject));
        };
        let mut desc = PropertyDescriptor::default();
        if self.has_property(obj, "enumerable")? {
            desc.enumerable = Some(to_boolean(&self.get(obj, "enumerable", val)?));
        }
        if self.has_property(obj, "configurable")? {
            desc.configurable = Some(to_boolean(&self.get(obj, "configurable", val)?));
        }
        if self.has_property(obj, "value")? {
            desc.value = Some(self.get(obj, "value", val)?);
        }
        if self.has_property(obj, "writable")? {
            desc.writable = Some(to_boolean(&self.get(obj, "writable", val)?));
        }
        if self.has_property(obj, "get")? {
            let getter = self.get(obj, "get", val)?;
            if !getter.is_undefined() && !self.is_callable(&getter) {
                return Err(self.throw_error(LegacyError::AccessorNotCallable("Getter")));
            }
            desc.get = Some(getter);
        }
        if self.has_property(obj, "set")? {
            let setter = self.get(obj, "set", val)?;
            if !setter.is_undefined() && !self.is_callable(&setter) {
                return Err(self.throw_error(LegacyError::AccessorNotCallable("Setter")));
            }
            desc.set = Some(setter);
        }
        if desc.is_accessor_descriptor() && desc.is_data_descriptor() {
            return Err(self.throw_error(LegacyError::DescriptorConflict));
        }
        Ok(desc)
    }

    // §6.2.6.4 FromPropertyDescriptor
    pub fn from_property_descriptor(&mut self, desc: &PropertyDescriptor) -> JsValue {
        let result = self.create_object();
        let data = self.obj(result);
        let mut r = data.borrow_mut();
        if let Some(ref val) = desc.value {
            r.insert_value("value".to_string(), val.clone());
        }
        if let Some(w) = desc.writable {
            r.insert_value("writable".to_string(), JsValue::Boolean(w));
        }
        if let Some(ref g) = desc.get {
            r.insert_value("get".to_string(), g.clone());
        }
        if let Some(ref s) = desc.set {
            r.insert_value("set".to_string(), s.clone());
        }
        if let Some(e) = desc.enumerable {
            r.insert_value("enumerable".to_string(), JsValue::Boolean(e));
        }
        if let Some(c) = desc.configurable {
            r.insert_value("configurable".to_string(), JsValue::Boolean(c));
        }
        result.into()
    }

    // §7.3.18 CreateListFromArrayLike
    pub fn list_from_array_like(&mut self, val: &JsValue) -> Result<Vec<JsValue>, JsValue> {
        let Some(obj) = val.as_object() else {
            return Err(self.create_type_error("CreateListFromArrayLike called on non-object"));
        };
        let len = to_length(&self.get(obj, "length", val)?);
        let mut list = Vec::with_capacity(len);
        for i in 0..len {
            list.push(self.get(obj, &i.to_string(), val)?);
        }
        Ok(list)
    }

    pub fn create_iter_result_object(&mut self, value: JsValue, done: bool) -> JsValue {
        let obj = self.create_object();
        let data = self.obj(obj);
        data.borrow_mut().insert_value("value".to_string(), value);
        data.borrow_mut()
            .insert_value("done".to_string(), JsValue::Boolean(done));
        obj.into()
    }

    /// Iterator object stepping through `values` once.
    pub fn create_list_iterator(&mut self, values: Vec<JsValue>) -> JsValue {
        let iter = self.create_object_with_proto(self.iterator_prototype.clone());
        let remaining = Rc::new(RefCell::new(values.into_iter()));
        let next_fn = self.create_function(JsFunction::native("next", 0, move |interp, _this, _args| {
            let next = remaining.borrow_mut().next();
            let result = match next {
                Some(v) => interp.create_iter_result_object(v, false),
                None => interp.create_iter_result_object(JsValue::Undefined, true),
            };
            Completion::Normal(result)
        }));
        self.obj(iter)
            .borrow_mut()
            .insert_builtin("next".to_string(), next_fn);
        iter.into()
    }

    /// Whether `val` looks like an iterator: an object with a callable `next`.
    pub fn is_iterator_object(&mut self, val: &JsValue) -> Result<bool, JsValue> {
        if !val.is_object() {
            return Ok(false);
        }
        let next = self.get_v(val, "next")?;
        Ok(self.is_callable(&next))
    }

    // §7.4.2 IteratorNext + §7.4.3 IteratorComplete/IteratorValue
    pub fn iterator_step(&mut self, iter: &JsValue) -> Result<Option<JsValue>, JsValue> {
        let next = self.get_v(iter, "next")?;
        let result = self.call_function(&next, iter, &[]).into_result()?;
        if !result.is_object() {
            return Err(self.create_type_error(&format!(
                "Iterator result {} is not an object",
                to_js_string(&result)
            )));
        }
        if to_boolean(&self.get_v(&result, "done")?) {
            return Ok(None);
        }
        Ok(Some(self.get_v(&result, "value")?))
    }

    /// Drains an iterator object into a list.
    pub fn iterate_to_list(&mut self, iter: &JsValue) -> Result<Vec<JsValue>, JsValue> {
        let mut values = Vec::new();
        while let Some(v) = self.iterator_step(iter)? {
            values.push(v);
        }
        Ok(values)
    }
}
