use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_SCRIPT_ENGINE;
use crate::doc::Metadata;
use crate::handler::script::rhai_engine::RhaiEngine;

/// Objects handed to a script for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    /// Decoded document text. Read back afterwards when `content_writable`.
    pub content: String,
    pub metadata: Metadata,
    pub content_writable: bool,
}

impl ScriptBindings {
    pub fn new(content: String, metadata: Metadata, content_writable: bool) -> Self {
        Self {
            content,
            metadata,
            content_writable,
        }
    }
}

/// Value a script evaluated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Unit,
    Bool(bool),
    Str(String),
    Other(String),
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// A scripting language implementation.
pub trait ScriptEngine: Send + Sync {
    /// Evaluates `script` against `bindings`. Long-running evaluations must
    /// stop with [`ScriptError::Cancelled`] once `cancel` fires.
    fn evaluate(
        &self,
        script: &str,
        bindings: &mut ScriptBindings,
        cancel: &CancellationToken,
    ) -> Result<ScriptValue, ScriptError>;
}

/// Registry of script engines by name.
pub struct ScriptEngines {
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
}

impl ScriptEngines {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Register an engine, replacing any engine of the same name.
    pub fn register(&mut self, name: impl Into<String>, engine: Arc<dyn ScriptEngine>) {
        self.engines.insert(name.into(), engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.engines.get(name).cloned()
    }

    /// Get all registered engine names, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ScriptEngines {
    /// A registry holding the default engine.
    fn default() -> Self {
        let mut engines = Self::new();
        engines.register(DEFAULT_SCRIPT_ENGINE, Arc::new(RhaiEngine::default()));
        engines
    }
}
