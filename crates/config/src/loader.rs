use std::path::Path;

use anyhow::{Context as _, bail};
use serde::Deserialize;
use toml::Value;

use crate::Config;

/// Matches `{{ env.NAME }}` with optional surrounding whitespace inside the
/// braces. The name must be a valid environment variable identifier.
fn env_placeholder() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("static regex"))
}

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_env_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_upstreams(&config)?;

    Ok(config)
}

pub(crate) fn validate_has_upstreams(config: &Config) -> anyhow::Result<()> {
    if config.llm.openai.is_none() && config.llm.bedrock.is_none() {
        bail!(
            "No upstream providers configured. Switchyard needs at least one of [llm.openai] or [llm.bedrock] to route chat completions."
        );
    }

    if config.kb.enabled && config.llm.bedrock.is_none() && config.kb.region.is_none() {
        bail!("[kb] is enabled but no region is available; set [kb].region or configure [llm.bedrock].");
    }

    Ok(())
}

/// Walks the raw TOML tree and substitutes `{{ env.NAME }}` placeholders in
/// every string before typed deserialization. A missing variable is an error
/// naming the config path it was found at.
fn expand_env_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            if !s.contains("{{") {
                return Ok(());
            }

            let mut expanded = String::with_capacity(s.len());
            let mut last = 0;

            for capture in env_placeholder().captures_iter(s) {
                let whole = capture.get(0).expect("capture group zero always exists");
                let name = &capture[1];

                let Ok(resolved) = std::env::var(name) else {
                    bail!(
                        "Environment variable '{name}' referenced at '{}' is not set",
                        render_path(path)
                    );
                };

                expanded.push_str(&s[last..whole.start()]);
                expanded.push_str(&resolved);
                last = whole.end();
            }

            expanded.push_str(&s[last..]);
            *s = expanded;
        }
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_env_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_env_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

fn render_path(path: &[Result<&str, usize>]) -> String {
    use std::fmt::Write;

    let mut rendered = String::new();

    for segment in path {
        match segment {
            Ok(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            Err(index) => write!(rendered, "[{index}]").expect("writing to a string cannot fail"),
        }
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use insta::assert_snapshot;

    fn expand(toml_str: &str) -> anyhow::Result<Value> {
        let mut value: Value = toml::from_str(toml_str).expect("valid toml");
        expand_env_strings(&mut Vec::new(), &mut value)?;
        Ok(value)
    }

    #[test]
    fn expands_env_placeholders_in_nested_tables() {
        temp_env::with_var("SWITCHYARD_TEST_KEY", Some("sk-resolved"), || {
            let value = expand(indoc! {r#"
                [llm.openai]
                api_key = "{{ env.SWITCHYARD_TEST_KEY }}"
            "#})
            .expect("expansion succeeds");

            let key = value["llm"]["openai"]["api_key"].as_str();
            assert_eq!(key, Some("sk-resolved"));
        });
    }

    #[test]
    fn missing_variable_reports_config_path() {
        temp_env::with_var_unset("SWITCHYARD_DEFINITELY_UNSET", || {
            let error = expand(indoc! {r#"
                [server]
                api_key = "{{ env.SWITCHYARD_DEFINITELY_UNSET }}"
            "#})
            .expect_err("expansion fails");

            assert_snapshot!(error.to_string(), @"Environment variable 'SWITCHYARD_DEFINITELY_UNSET' referenced at 'server.api_key' is not set");
        });
    }

    #[test]
    fn plain_strings_pass_through_untouched() {
        let value = expand(indoc! {r#"
            [files]
            bucket = "artifacts"
        "#})
        .expect("expansion succeeds");

        assert_eq!(value["files"]["bucket"].as_str(), Some("artifacts"));
    }

    #[test]
    fn validation_requires_an_upstream() {
        let config: Config = toml::from_str("").expect("empty config deserializes");
        let error = validate_has_upstreams(&config).expect_err("validation fails");

        assert_snapshot!(error.to_string(), @"No upstream providers configured. Switchyard needs at least one of [llm.openai] or [llm.bedrock] to route chat completions.");
    }
}
