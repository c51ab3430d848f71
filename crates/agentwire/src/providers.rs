pub mod anthropic;
pub mod base;
pub mod configs;
pub mod factory;
pub mod google;
pub mod openai;
pub mod qwen;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod mock;
