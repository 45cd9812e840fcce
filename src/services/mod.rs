pub mod logger;
pub mod request_proxy;
pub mod settings;
pub mod token_manager;
pub mod tool_executor;
pub mod validation;
