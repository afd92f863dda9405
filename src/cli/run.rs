// src/cli/run.rs — `totalcontrol run`: evaluate a script under the timeout supervisor

use std::path::PathBuf;
use std::time::Duration;

use rhai::Dynamic;
use uuid::Uuid;

use crate::infra::config::Config;
use crate::scripting::marshal::{classify, list_to_host, record_to_host, to_host, Shape};
use crate::scripting::ScriptEngine;

/// Run a script file in a fresh, cache-less engine and print what it evaluates to.
pub async fn run_script(config: &Config, script: &str, timeout_secs: u64) -> anyhow::Result<()> {
    let path = PathBuf::from(script);
    let mut options = config.engine_options();
    options.cache_dir = None;
    let timeout = Duration::from_secs(timeout_secs.max(1));

    let output = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let text = std::fs::read_to_string(&path)?;
        let mut engine = ScriptEngine::new(Uuid::new_v4(), options)?;
        let value = engine.eval_with_timeout(&text, timeout)?;
        engine.shutdown();
        render_value(&value)
    })
    .await??;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Text form of a script result: scalars as-is, maps and arrays as JSON.
fn render_value(value: &Dynamic) -> anyhow::Result<String> {
    let json = match classify(value) {
        Shape::Record(map) => {
            serde_json::Value::Object(record_to_host(&map).map_err(anyhow::Error::msg)?)
        }
        Shape::List(items) => {
            serde_json::Value::Array(list_to_host(&items).map_err(anyhow::Error::msg)?)
        }
        Shape::Invalid { .. } => match to_host(value) {
            Some(serde_json::Value::Null) => return Ok(String::new()),
            Some(serde_json::Value::String(s)) => return Ok(s),
            Some(other) => other,
            None => return Ok(value.to_string()),
        },
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(script: &str) -> Dynamic {
        rhai::Engine::new().eval::<Dynamic>(script).unwrap()
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&eval("40 + 2")).unwrap(), "42");
        assert_eq!(render_value(&eval("\"hi\"")).unwrap(), "hi");
        assert_eq!(render_value(&eval("()")).unwrap(), "");
        assert_eq!(render_value(&eval("true")).unwrap(), "true");
    }

    #[test]
    fn test_render_structures_as_json() {
        let text = render_value(&eval("#{ a: 1, b: [1, 2] }")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["a"], 1);
        assert_eq!(parsed["b"][1], 2);
    }

    #[tokio::test]
    async fn test_run_script_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("spin.rhai");
        std::fs::write(&script, "loop { }").unwrap();

        let err = run_script(&Config::default(), &script.display().to_string(), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
