//! The fraud detector agent definition shipped to the hosted runtime.

pub mod prompt;

pub use prompt::{render_instruction, InstructionParams};

use crate::config::AgentConfig;
use crate::tools::{Tool, ToolSpec};
use serde::{Deserialize, Serialize};

pub const AGENT_NAME: &str = "FraudDetector";
pub const AGENT_DESCRIPTION: &str = "Determines risk of fraud in transactions.";

/// Everything the hosted runtime needs to run the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    pub tools: Vec<ToolSpec>,
}

impl AgentDefinition {
    /// Build the fraud detector from `[agent]` config and the tools it may call.
    ///
    /// The instruction references the first tool named `publish_record`.
    pub fn fraud_detector(config: &AgentConfig, tools: &[Box<dyn Tool>]) -> Self {
        let specs: Vec<ToolSpec> = tools.iter().map(|t| t.spec()).collect();
        let publish_tool = specs
            .iter()
            .map(|s| s.name.as_str())
            .find(|n| *n == "publish_record")
            .unwrap_or("publish_record");

        let instruction = render_instruction(&InstructionParams {
            records_topic: &config.records_topic,
            alerts_topic: &config.alerts_topic,
            alert_threshold: config.alert_threshold,
            publish_tool,
        });

        Self {
            name: AGENT_NAME.to_string(),
            model: config.model.clone(),
            description: AGENT_DESCRIPTION.to_string(),
            instruction,
            tools: specs,
        }
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}
