pub mod error;
pub mod ids;
pub mod openai;
pub mod redis;
