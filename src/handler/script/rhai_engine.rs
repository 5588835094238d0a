//! [Rhai](https://rhai.rs) script engine.
//!
//! Scripts see two variables: `content` (a string, constant unless the
//! content is writable) and `metadata`, which offers:
//!
//! | Method | Effect |
//! |---|---|
//! | `addString(field, value \| [values])` | append values |
//! | `setString(field, value \| [values])` | replace values |
//! | `getString(field)` | first value or `()` |
//! | `getStrings(field)` | all values as an array |
//! | `contains(field)` | whether the field exists |
//! | `remove(field)` | drop the field |

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Scope};
use std::cell::RefCell;
use std::rc::Rc;
use tokio_util::sync::CancellationToken;

use crate::doc::Metadata;
use crate::handler::script::engine::{ScriptBindings, ScriptEngine, ScriptError, ScriptValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct RhaiEngine {
    /// Hard cap on evaluated operations, on top of cancellation.
    pub max_operations: Option<u64>,
}

#[derive(Clone)]
struct MetadataHandle(Rc<RefCell<Metadata>>);

impl MetadataHandle {
    fn add_string(&mut self, field: ImmutableString, value: ImmutableString) {
        self.0.borrow_mut().add(field.as_str(), [value.as_str()]);
    }

    fn add_strings(&mut self, field: ImmutableString, values: Array) {
        self.0.borrow_mut().add(field.as_str(), strings(values));
    }

    fn set_string(&mut self, field: ImmutableString, value: ImmutableString) {
        self.0.borrow_mut().set(field.as_str(), [value.as_str()]);
    }

    fn set_strings(&mut self, field: ImmutableString, values: Array) {
        self.0.borrow_mut().set(field.as_str(), strings(values));
    }

    fn get_string(&mut self, field: ImmutableString) -> Dynamic {
        self.0
            .borrow()
            .get_first(field.as_str())
            .map(|v| Dynamic::from(v.to_string()))
            .unwrap_or(Dynamic::UNIT)
    }

    fn get_strings(&mut self, field: ImmutableString) -> Array {
        self.0
            .borrow()
            .get(field.as_str())
            .iter()
            .map(|v| Dynamic::from(v.clone()))
            .collect()
    }

    fn contains(&mut self, field: ImmutableString) -> bool {
        self.0.borrow().contains(field.as_str())
    }

    fn remove(&mut self, field: ImmutableString) {
        self.0.borrow_mut().remove(field.as_str());
    }
}

fn strings(values: Array) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

impl RhaiEngine {
    fn engine(&self, cancel: &CancellationToken) -> Engine {
        let mut engine = Engine::new();
        engine
            .register_type_with_name::<MetadataHandle>("Metadata")
            .register_fn("addString", MetadataHandle::add_string)
            .register_fn("addString", MetadataHandle::add_strings)
            .register_fn("setString", MetadataHandle::set_string)
            .register_fn("setString", MetadataHandle::set_strings)
            .register_fn("getString", MetadataHandle::get_string)
            .register_fn("getStrings", MetadataHandle::get_strings)
            .register_fn("contains", MetadataHandle::contains)
            .register_fn("remove", MetadataHandle::remove);

        if let Some(max) = self.max_operations {
            engine.set_max_operations(max);
        }
        let cancel = cancel.clone();
        engine.on_progress(move |_| cancel.is_cancelled().then_some(Dynamic::UNIT));
        engine
    }
}

impl ScriptEngine for RhaiEngine {
    fn evaluate(
        &self,
        script: &str,
        bindings: &mut ScriptBindings,
        cancel: &CancellationToken,
    ) -> Result<ScriptValue, ScriptError> {
        let engine = self.engine(cancel);
        let ast = engine
            .compile(script)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        let metadata = MetadataHandle(Rc::new(RefCell::new(std::mem::take(&mut bindings.metadata))));
        let mut scope = Scope::new();
        let content = std::mem::take(&mut bindings.content);
        if bindings.content_writable {
            scope.push("content", content);
        } else {
            scope.push_constant("content", content);
        }
        scope.push("metadata", metadata.clone());

        let result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast);

        let content = scope
            .get_value::<Dynamic>("content")
            .and_then(|value| value.into_immutable_string().ok());
        drop(scope);
        bindings.metadata = metadata.0.take();

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                return match *err {
                    EvalAltResult::ErrorTerminated(..) => Err(ScriptError::Cancelled),
                    other => Err(ScriptError::Runtime(other.to_string())),
                };
            }
        };
        // Read-only content is a constant and always comes back intact.
        let Some(content) = content else {
            return Err(ScriptError::Runtime("content must remain a string".to_string()));
        };
        bindings.content = content.to_string();
        Ok(to_script_value(value))
    }
}

fn to_script_value(value: Dynamic) -> ScriptValue {
    if value.is_unit() {
        return ScriptValue::Unit;
    }
    if let Ok(b) = value.as_bool() {
        return ScriptValue::Bool(b);
    }
    if value.is_string() {
        return ScriptValue::Str(value.to_string());
    }
    ScriptValue::Other(value.to_string())
}
