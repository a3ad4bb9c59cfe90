use std::sync::Arc;

use agent_runtime::{AgentRuntime, RuntimeInitError};
use agent_runtime_mock::{MockRuntime, MOCK_RUNTIME_ID};

use crate::config::Config;

pub const DEFAULT_RUNTIME_ID: &str = MOCK_RUNTIME_ID;

pub fn runtime_for_config(config: &Config) -> Result<Arc<dyn AgentRuntime>, RuntimeInitError> {
    match config.runtime_id.as_str() {
        MOCK_RUNTIME_ID => Ok(Arc::new(
            MockRuntime::default().with_step_delay(config.mock_step_delay),
        )),
        unknown => Err(RuntimeInitError::new(format!(
            "Unsupported runtime '{unknown}'. Available runtimes: {DEFAULT_RUNTIME_ID}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_for_config_supports_mock() {
        let runtime = runtime_for_config(&Config::default()).expect("mock runtime should resolve");
        assert_eq!(runtime.profile().runtime_id, "mock");
    }

    #[test]
    fn runtime_for_config_rejects_unknown_runtime() {
        let config = Config {
            runtime_id: "custom".to_string(),
            ..Config::default()
        };
        let error = match runtime_for_config(&config) {
            Ok(_) => panic!("unknown runtimes should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains("Unsupported runtime 'custom'"));
    }
}
