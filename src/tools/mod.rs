//! Tool subsystem for agent-callable capabilities.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description, a JSON parameter schema, and an async `execute` returning a
//! structured [`ToolResult`]. The fraud agent ships a single tool,
//! [`PublishRecordTool`], assembled by [`default_tools`].

pub mod publish_record;
pub mod traits;

pub use publish_record::PublishRecordTool;
pub use traits::Tool;
#[allow(unused_imports)]
pub use traits::{ToolResult, ToolSpec};

use crate::observability::Metrics;
use crate::pubsub::PublisherRegistry;
use std::sync::Arc;

/// Create the default tool registry.
pub fn default_tools(
    registry: Arc<PublisherRegistry>,
    metrics: Arc<Metrics>,
) -> Vec<Box<dyn Tool>> {
    vec![Box::new(PublishRecordTool::new(registry, metrics))]
}

/// Specs for every tool in `tools`, in order.
pub fn tool_specs(tools: &[Box<dyn Tool>]) -> Vec<ToolSpec> {
    tools.iter().map(|t| t.spec()).collect()
}
