use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::systems::SystemInfo;

const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");

/// Upper bound on followups the model is asked for; the validator enforces it too
pub const MAX_FOLLOWUPS: usize = 3;

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct SystemPromptContext<'a> {
    systems: &'a [SystemInfo],
    max_followups: usize,
}

/// Render the system prompt describing the registered systems and the output contract
pub fn render_system_prompt(systems: &[SystemInfo]) -> Result<String, TeraError> {
    load_prompt(
        SYSTEM_PROMPT,
        &SystemPromptContext {
            systems,
            max_followups: MAX_FOLLOWUPS,
        },
    )
}
