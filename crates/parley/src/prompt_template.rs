use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

const RETRIEVED_CONTEXT_TEMPLATE: &str = include_str!("prompts/retrieved_context.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct RetrievedContext<'a> {
    excerpts: &'a [String],
}

/// Render retrieved excerpts into the context block placed ahead of the
/// user prompt. Returns `None` when there is nothing to inject.
pub fn render_retrieved_context(excerpts: &[String]) -> Result<Option<String>, TeraError> {
    if excerpts.is_empty() {
        return Ok(None);
    }
    let rendered = load_prompt(RETRIEVED_CONTEXT_TEMPLATE, &RetrievedContext { excerpts })?;
    Ok(Some(rendered.trim_end().to_string()))
}
