pub mod prompt_builder;
pub mod prompt_template;
pub mod providers;
pub mod recommendations;
pub mod response_parser;

pub use prompt_builder::PromptBuilder;
pub use prompt_template::PromptTemplate;
pub use providers::{LanguageModel, OllamaClient, OllamaOptions};
pub use response_parser::ResponseParser;
