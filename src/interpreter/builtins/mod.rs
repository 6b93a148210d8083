use super::*;

pub(crate) mod legacy_generator;
pub(crate) mod legacy_proxy;

impl Interpreter {
    fn intrinsic(
        &mut self,
        proto: Option<Rc<RefCell<JsObjectData>>>,
        class_name: &str,
    ) -> Rc<RefCell<JsObjectData>> {
        let obj = self.create_object_with_proto(proto);
        let data = self.obj(obj);
        data.borrow_mut().class_name = class_name.to_string();
        data
    }

    pub(crate) fn setup_globals(&mut self) {
        // §20.1.3 %Object.prototype% and §20.2.3 %Function.prototype%
        let object_prototype = self.intrinsic(None, "Object");
        self.object_prototype = Some(object_prototype.clone());
        let function_prototype = self.intrinsic(Some(object_prototype.clone()), "Function");
        self.function_prototype = Some(function_prototype);

        // §20.5.3 %Error.prototype%, §20.5.6.3 %NativeError.prototype%
        let error_prototype = self.intrinsic(Some(object_prototype.clone()), "Error");
        {
            let mut e = error_prototype.borrow_mut();
            e.insert_builtin("name".to_string(), JsValue::string("Error"));
            e.insert_builtin("message".to_string(), JsValue::string(""));
        }
        self.error_prototype = Some(error_prototype.clone());
        let type_error_prototype = self.intrinsic(Some(error_prototype), "Error");
        {
            let mut e = type_error_prototype.borrow_mut();
            e.insert_builtin("name".to_string(), JsValue::string("TypeError"));
            e.insert_builtin("message".to_string(), JsValue::string(""));
        }
        self.type_error_prototype = Some(type_error_prototype);

        // §27.1.2 %IteratorPrototype%
        let iterator_prototype = self.intrinsic(Some(object_prototype.clone()), "Iterator");
        self.iterator_prototype = Some(iterator_prototype);

        let global = self.intrinsic(Some(object_prototype), "global");
        self.global_object = Some(global);

        self.setup_generator_prototype();
        self.setup_legacy_generator();
        self.setup_proxy();
    }
}
