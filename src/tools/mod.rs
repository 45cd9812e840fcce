pub mod base;
pub mod persona;

use crate::services::tool_executor::ToolRegistry;
use std::sync::Arc;

/// Registry with every tool this server exposes.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(base::CreateBaseTool));
    registry.register(Arc::new(persona::GetPersonaTool));
    registry.register(Arc::new(persona::RefreshPersonaTool));
    registry
}
