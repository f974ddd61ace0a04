use crate::config::{Dialect, LlmConfig};
use crate::errors::ClientResult;

use super::{base::Provider, custom::CustomProvider, openai::OpenAiCompatibleProvider};

pub fn get_provider(config: &LlmConfig) -> ClientResult<Box<dyn Provider + Send + Sync>> {
    match config.dialect {
        Dialect::OpenaiCompatible => Ok(Box::new(OpenAiCompatibleProvider::new(config.clone())?)),
        Dialect::Custom => Ok(Box::new(CustomProvider::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_each_dialect() {
        let mut config = LlmConfig {
            api_url: "http://localhost:9000/v1/chat/completions".to_string(),
            api_key: None,
            model: "default".to_string(),
            headers: None,
            dialect: Dialect::OpenaiCompatible,
            max_tokens: 1000,
            temperature: 0.7,
        };
        assert!(get_provider(&config).is_ok());

        config.dialect = Dialect::Custom;
        assert!(get_provider(&config).is_ok());
    }
}
