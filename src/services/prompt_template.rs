use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Template compiled into the binary, used when no template file is available
const BUILTIN_TEMPLATE: &str = include_str!("../../prompts/system_prompt.yaml");

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid"));

#[derive(Debug, Deserialize)]
struct TemplateDocument {
    sections: TemplateSections,
    #[serde(default)]
    footer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateSections {
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    objectives: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    formats: Option<String>,
    #[serde(default)]
    examples: Option<String>,
}

/// Instruction template merged with request data to build the model prompt
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Persona and task description (identity, objectives, context)
    pub persona: String,
    /// Required answer format (formats, examples)
    pub output_format: String,
    pub footer: Option<String>,
}

impl PromptTemplate {
    /// Parses a YAML template document
    pub fn from_yaml(source: &str) -> AppResult<Self> {
        let doc: TemplateDocument = serde_yaml::from_str(source)
            .map_err(|e| AppError::Configuration(format!("invalid prompt template: {}", e)))?;
        let sections = doc.sections;

        let identity = required(sections.identity, "identity")?;
        let formats = required(sections.formats, "formats")?;

        let persona = join_sections([Some(identity), sections.objectives, sections.context]);
        let output_format = join_sections([Some(formats), sections.examples]);
        let footer = doc
            .footer
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        Ok(Self {
            persona,
            output_format,
            footer,
        })
    }

    /// The template shipped with the service
    pub fn builtin() -> AppResult<Self> {
        Self::from_yaml(BUILTIN_TEMPLATE)
    }

    /// Loads the template at `path`, falling back to the built-in one when the
    /// file is missing or unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Prompt template not readable, using built-in template");
                return Self::builtin();
            }
        };

        match Self::from_yaml(&source) {
            Ok(template) => {
                tracing::info!(path = %path.display(), "Prompt template loaded");
                Ok(template)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Invalid prompt template, using built-in template");
                Self::builtin()
            }
        }
    }
}

fn required(section: Option<String>, name: &str) -> AppResult<String> {
    section
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::Configuration(format!("prompt template is missing section '{}'", name))
        })
}

fn join_sections<const N: usize>(sections: [Option<String>; N]) -> String {
    sections
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replaces `{name}` placeholders in a single pass; braces that name no
/// variable are kept as-is and substituted values are never re-expanded.
pub fn render(text: &str, vars: &[(&str, String)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(text, |caps: &Captures| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
