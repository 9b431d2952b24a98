pub mod chat_controller;
pub mod file_controller;
pub mod knowledge_base_controller;
pub mod user_controller;
