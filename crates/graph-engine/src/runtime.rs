//! Shared runtime: configuration, node type registry and global hooks
//!
//! A [`Runtime`] is shared by every graph (nested graphs included) through an
//! `Arc`. Locks are only held for the duration of a lookup, never across a
//! hook or a node factory.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde_json::{Map, Value};

use crate::callback::{CallbackHandler, HandlerId, HookInfo, HookResult};
use crate::config::RuntimeConfig;
use crate::constants::hooks;
use crate::descriptor::{NodeDescriptor, NodeTypeMetadata};
use crate::error::Result;
use crate::node::{Node, NodeBehavior};
use crate::registry::{NodeFactory, NodeFunction, NodeRegistry, Registration};
use crate::subgraph;
use crate::types::SlotType;

/// Configuration, registry and global hooks shared by graphs
pub struct Runtime {
    config: RwLock<RuntimeConfig>,
    registry: RwLock<NodeRegistry>,
    callbacks: RwLock<CallbackHandler>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &*self.config.read())
            .field("registry", &*self.registry.read())
            .finish()
    }
}

impl Runtime {
    /// Runtime with the built-in graph node types registered
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Self::with_registry(config, NodeRegistry::new())
    }

    /// Runtime over an existing registry; the built-in graph node types are added to it
    pub fn with_registry(config: RuntimeConfig, mut registry: NodeRegistry) -> Arc<Self> {
        subgraph::register_builtins(&mut registry);
        Arc::new(Self {
            config: RwLock::new(config),
            registry: RwLock::new(registry),
            callbacks: RwLock::new(CallbackHandler::new()),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> RuntimeConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, update: impl FnOnce(&mut RuntimeConfig)) {
        update(&mut self.config.write());
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, NodeRegistry> {
        self.registry.read()
    }

    /// Subscribe to a runtime-wide hook (`onNodeCreated`, `onNodeTypeRegistered`, ...)
    pub fn register_callback<F>(&self, name: &str, priority: i32, callback: F) -> HandlerId
    where
        F: Fn(&HookInfo<'_>, &[Value]) -> Option<HookResult> + Send + Sync + 'static,
    {
        self.callbacks.write().register(name, priority, callback)
    }

    pub fn unregister_callback(&self, name: &str, id: HandlerId) -> bool {
        self.callbacks.write().unregister(name, id)
    }

    fn fire(&self, name: &str, args: &[Value]) {
        let plan = self.callbacks.read().plan(name);
        plan.run(args, || None);
    }

    /// Register a node type, firing `onNodeTypeRegistered` (and `onNodeTypeReplaced`)
    pub fn register_node_type(&self, metadata: NodeTypeMetadata, factory: NodeFactory) -> Result<()> {
        let node_type = metadata.node_type.clone();
        let outcome = self.registry.write().register(metadata, factory)?;
        let args = [Value::String(node_type)];
        self.fire(hooks::ON_NODE_TYPE_REGISTERED, &args);
        if let Registration::Replaced(_) = outcome {
            self.fire(hooks::ON_NODE_TYPE_REPLACED, &args);
        }
        Ok(())
    }

    pub fn register_type<T>(&self) -> Result<()>
    where
        T: NodeDescriptor + NodeBehavior + Default,
    {
        self.register_node_type(
            T::descriptor(),
            Arc::new(|_: &Arc<Runtime>| Box::new(T::default()) as Box<dyn NodeBehavior>),
        )
    }

    pub fn unregister_node_type(&self, node_type: &str) -> Result<NodeTypeMetadata> {
        self.registry.write().unregister(node_type)
    }

    /// Drop every registered type; the built-in graph node types are registered again
    pub fn clear_registered_types(&self) {
        let mut registry = self.registry.write();
        registry.clear();
        subgraph::register_builtins(&mut registry);
        log::info!("Cleared registered node types");
    }

    pub fn wrap_function_as_node(
        &self,
        name: &str,
        function: NodeFunction,
        params: &[(&str, SlotType)],
        return_type: SlotType,
        properties: &[(&str, Value)],
    ) -> Result<()> {
        self.registry
            .write()
            .wrap_function_as_node(name, function, params, return_type, properties)?;
        self.fire(hooks::ON_NODE_TYPE_REGISTERED, &[Value::String(name.to_string())]);
        Ok(())
    }

    /// Create a node of a registered type
    ///
    /// Returns `None` for an unknown type. `title` overrides the type title;
    /// `options` are applied as plain node fields (`pos`, `mode`, `color`, ...).
    pub fn create_node(
        self: &Arc<Self>,
        node_type: &str,
        title: Option<&str>,
        options: Option<&Map<String, Value>>,
    ) -> Option<Node> {
        let Some((metadata, factory, revision)) = self.registry.read().factory(node_type) else {
            log::debug!("Node type '{}' not registered", node_type);
            return None;
        };
        let mut node = Node::from_metadata(&metadata, factory(self));
        node.type_revision = revision;
        if let Some(title) = title {
            node.title = title.to_string();
        }
        if let Some(options) = options {
            for (key, value) in options {
                node.apply_fields(key, value);
            }
        }
        self.fire(hooks::ON_NODE_CREATED, &[Value::String(node_type.to_string())]);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_as_any;
    use crate::types::NodeMode;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Blank;

    impl NodeDescriptor for Blank {
        fn descriptor() -> NodeTypeMetadata {
            NodeTypeMetadata::new("test/blank", "Blank").output("out", "number")
        }
    }

    impl NodeBehavior for Blank {
        impl_as_any!();
    }

    #[test]
    fn test_builtins_registered() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let registry = runtime.registry();
        assert!(registry.has_node_type("graph/subgraph"));
        assert!(registry.has_node_type("graph/input"));
        assert!(registry.has_node_type("graph/output"));
    }

    #[test]
    fn test_clear_keeps_builtins() {
        let runtime = Runtime::new(RuntimeConfig::default());
        runtime.register_type::<Blank>().unwrap();
        runtime.clear_registered_types();
        let registry = runtime.registry();
        assert!(!registry.has_node_type(Blank::descriptor().node_type.as_str()));
        assert!(registry.has_node_type("graph/subgraph"));
    }

    #[test]
    fn test_create_node_with_options() {
        let runtime = Runtime::new(RuntimeConfig::default());
        runtime.register_type::<Blank>().unwrap();
        let options = json!({"mode": 2, "pos": [5.0, 6.0]});
        let node = runtime
            .create_node("test/blank", Some("Mine"), options.as_object())
            .unwrap();
        assert_eq!(node.title, "Mine");
        assert_eq!(node.type_title(), "Blank");
        assert_eq!(node.mode, NodeMode::Never);
        assert_eq!(node.pos, [5.0, 6.0]);
        assert!(runtime.create_node("test/missing", None, None).is_none());
    }

    #[test]
    fn test_registration_hooks() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in [hooks::ON_NODE_TYPE_REGISTERED, hooks::ON_NODE_TYPE_REPLACED] {
            let seen = seen.clone();
            runtime.register_callback(name, 0, move |info, _| {
                seen.lock().push(info.name.to_string());
                None
            });
        }
        runtime.register_type::<Blank>().unwrap();
        runtime.register_type::<Blank>().unwrap();
        assert_eq!(
            *seen.lock(),
            vec!["onNodeTypeRegistered", "onNodeTypeRegistered", "onNodeTypeReplaced"]
        );
    }

    #[test]
    fn test_update_config() {
        let runtime = Runtime::new(RuntimeConfig::default());
        runtime.update_config(|c| c.use_uuids = true);
        assert!(runtime.config().use_uuids);
    }
}
