//! Settings commands: get/set/get-all/reset over the tiered settings
//! service, operating on the ambient (process-scope) session context.

use revaer_core::SessionContext;
use serde_json::Value;

use crate::commands::CommandResult;
use crate::engine::Engine;
use crate::output::OutputFormat;

pub(crate) fn handle_get(engine: &Engine, key: &str, format: OutputFormat) -> CommandResult<()> {
    let ctx = SessionContext::default();
    let value = engine.settings.get(&ctx, key)?;
    print_value(&value, format)
}

pub(crate) fn handle_set(engine: &Engine, key: &str, raw_value: &str, format: OutputFormat) -> CommandResult<()> {
    let ctx = SessionContext::default();
    let value = parse_value(raw_value);
    engine.settings.set(&ctx, key, value)?;
    let updated = engine.settings.get(&ctx, key)?;
    print_value(&updated, format)
}

pub(crate) fn handle_get_all(engine: &Engine, format: OutputFormat) -> CommandResult<()> {
    let ctx = SessionContext::default();
    let doc = engine.settings.get_all(&ctx)?;
    print_value(&doc, format)
}

pub(crate) fn handle_reset(engine: &Engine) -> CommandResult<()> {
    let ctx = SessionContext::default();
    engine.settings.reset(&ctx)?;
    Ok(())
}

fn print_value(value: &Value, format: OutputFormat) -> CommandResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => println!("{value}"),
    }
    Ok(())
}

/// Parse a `--value` argument as JSON when it looks like JSON (an object,
/// array, number, boolean, or quoted string); otherwise treat it as a bare
/// string, matching how a shell user expects `--value true` and
/// `--value hello` to behave without needing to quote every scalar.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::build(dir.path()).await.expect("engine builds");
        (dir, engine)
    }

    #[test]
    fn parse_value_prefers_json_over_bare_string() {
        assert_eq!(parse_value("7"), Value::from(7));
        assert_eq!(parse_value("true"), Value::from(true));
        assert_eq!(parse_value("hello"), Value::String("hello".to_string()));
        assert_eq!(parse_value("[1,2]"), serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_the_settings_service() {
        let (_dir, engine) = engine().await;
        handle_set(&engine, "max_concurrent_downloads", "7", OutputFormat::Json).expect("set");
        let ctx = SessionContext::default();
        let value = engine.settings.get(&ctx, "max_concurrent_downloads").expect("get");
        assert_eq!(value, Value::from(7));
    }

    #[tokio::test]
    async fn reset_restores_the_default_document() {
        let (_dir, engine) = engine().await;
        handle_set(&engine, "max_concurrent_downloads", "9", OutputFormat::Table).expect("set");
        handle_reset(&engine).expect("reset");
        let ctx = SessionContext::default();
        let value = engine.settings.get(&ctx, "max_concurrent_downloads").expect("get");
        assert_eq!(value, Value::from(3));
    }

    #[tokio::test]
    async fn get_all_returns_an_object_document() {
        let (_dir, engine) = engine().await;
        let doc = {
            let ctx = SessionContext::default();
            engine.settings.get_all(&ctx).expect("get_all")
        };
        assert!(doc.is_object());
        assert!(doc.get("max_concurrent_downloads").is_some());
    }
}
