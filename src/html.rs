//! Embedded HTML templates.
//!
//! All templates carry an `.html` name, so minijinja auto-escapes every
//! interpolated value. Only the outer wrappers (`report.html`,
//! `chat_transcript.html`) mark pre-rendered fragments as `safe`.

use minijinja::Environment;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::DevroomError;

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(build_environment);

fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    macro_rules! tpl {
        ($n:expr) => {
            env.add_template($n, include_str!(concat!("templates/", $n)))
                .expect("embedded template parses")
        };
    }
    tpl!("chat_message.html");
    tpl!("chat_placeholder.html");
    tpl!("chat_system.html");
    tpl!("chat_transcript.html");
    tpl!("error_analysis.html");
    tpl!("execution_failure.html");
    tpl!("execution_success.html");
    tpl!("missing_packages.html");
    tpl!("report.html");
    tpl!("similar_errors.html");
    tpl!("solutions.html");
    tpl!("syntax_error.html");
    tpl!("top_error.html");
    tpl!("validation_success.html");
    env
}

/// Render the embedded template `name` with `ctx`.
pub fn render<S: Serialize>(name: &str, ctx: S) -> Result<String, DevroomError> {
    let tpl = TEMPLATES.get_template(name)?;
    Ok(tpl.render(ctx)?.trim().to_string())
}
