pub mod conf;
pub mod dify;
pub mod model;
pub mod openai;
pub mod sqlx;
