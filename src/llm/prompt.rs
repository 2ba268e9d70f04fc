use chrono::Local;
use tera::{Context, Tera};
use tracing::error;

use crate::assets::Assets;

/// Render the system prompt template shipped with the binary.
pub fn build_system_prompt() -> String {
    let mut tera = Tera::default();
    let mut context = Context::new();

    let template = Assets::get("system_prompt.md")
        .map(|f| String::from_utf8_lossy(&f.data).into_owned())
        .unwrap_or_default();

    context.insert("date", &Local::now().format("%Y-%m-%d %A").to_string());

    tera.render_str(&template, &context).unwrap_or_else(|e| {
        error!("Failed to render system prompt: {e}");
        template // fallback to the raw template
    })
}
