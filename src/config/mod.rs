pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    AgentConfig, Config, DeployConfig, GatewayConfig, GeneratorConfig, ObservabilityConfig,
    ProjectConfig, PubSubConfig, SessionsConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert!(!config.agent.app_name.is_empty());
        assert!(!config.agent.model.is_empty());
        assert!(config.pubsub.publish_timeout_secs > 0);
    }
}
