//! Tool registration (§3 Tool registration, §4.4 Rule 3)
//!
//! A tool couples a JSON-schema definition to a local async handler. The
//! client-side core only reads `name`/`description`/`parameters` and
//! invokes the handler; the remaining metadata is opaque and shipped to the
//! server as-is.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    ClientMode,
    ServerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Synchronous,
    Asynchronous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultHandling {
    ProcessInLlm,
    ProcessInClient,
    IgnoreResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

/// Declarative tool definition. `operation_mode`/`execution_type`/
/// `result_handling`/`language`/`platform` are server-facing metadata the
/// core never branches on; it only reads `name`/`description`/`parameters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_type: Option<ExecutionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_handling: Option<ResultHandling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            operation_mode: None,
            execution_type: None,
            result_handling: None,
            language: None,
            platform: None,
        }
    }

    /// The `{type: "function", name, description, parameters}` shape the
    /// server expects inside `model.tools`.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

pub type ToolResult = Result<Value, String>;
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> + Send + Sync,
>;

#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub handler: ToolHandler,
}

/// Map from tool name to `{definition, handler}`, mutated by
/// `register`/`unregister`/`clear` on `Client`'s behalf.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: std::collections::HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: ToolHandler,
    ) -> Result<(), ToolError> {
        if definition.name.trim().is_empty() {
            return Err(ToolError::EmptyName);
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool { definition, handler },
        );
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<RegisteredTool> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn wire_tools(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.definition.to_wire()).collect()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?
            .clone();
        (tool.handler)(arguments)
            .await
            .map_err(ToolError::HandlerFailed)
    }
}

/// Wrap a plain async closure `Fn(Value) -> Future<Output = ToolResult>`
/// into the boxed/pinned shape `ToolHandler` requires.
pub fn handler_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_invoke_round_trips() {
        let mut registry = ToolRegistry::new();
        let def = ToolDefinition::new("add", "adds two numbers", serde_json::json!({}));
        registry
            .register(
                def,
                handler_fn(|args: Value| async move {
                    let a = args["a"].as_i64().unwrap_or(0);
                    let b = args["b"].as_i64().unwrap_or(0);
                    Ok(serde_json::json!(a + b))
                }),
            )
            .unwrap();

        let result = registry
            .invoke("add", serde_json::json!({"a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(5));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = ToolRegistry::new();
        let def = ToolDefinition::new("", "no name", serde_json::json!({}));
        let err = registry.register(def, handler_fn(|_| async { Ok(Value::Null) }));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unregistered_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", Value::Null).await;
        assert!(matches!(err, Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn unregister_removes_tool() {
        let mut registry = ToolRegistry::new();
        let def = ToolDefinition::new("x", "x", serde_json::json!({}));
        registry
            .register(def, handler_fn(|_| async { Ok(Value::Null) }))
            .unwrap();
        assert!(registry.unregister("x").is_some());
        assert!(registry.invoke("x", Value::Null).await.is_err());
    }
}
