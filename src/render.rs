use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tera::{Tera, Value};

/// Named values handed to a template.
pub type Payload = tera::Context;

/// Outcome name → template source.
pub type Templates = BTreeMap<String, String>;

pub const HANDSHAKE: &str = "handshake";
pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";
pub const UNAUTHORIZED: &str = "unauthorized";
pub const UNKNOWN_COMMAND: &str = "unknown_command";

pub fn default_templates() -> Templates {
    Templates::from([
        (HANDSHAKE.to_string(), "{{ user }} on it".to_string()),
        (
            SUCCESS.to_string(),
            "{{ user }} done{% if output %}\n```\n{{ output }}\n```{% endif %}".to_string(),
        ),
        (
            FAILURE.to_string(),
            "{{ user }} failed: {{ error }}{% if output %}\n```\n{{ output }}\n```{% endif %}"
                .to_string(),
        ),
        (
            UNAUTHORIZED.to_string(),
            "{{ user }} you are not allowed to run {{ command }}".to_string(),
        ),
        (
            UNKNOWN_COMMAND.to_string(),
            "{{ user }} unknown command {{ command }}".to_string(),
        ),
    ])
}

/// Defaults, but successful output is posted as-is after the user mention.
pub fn plain_templates() -> Templates {
    let mut templates = default_templates();
    templates.insert(
        SUCCESS.to_string(),
        "{{ user }}{% if output %}\n{{ output }}{% endif %}".to_string(),
    );
    templates
}

/// Tera-backed renderer with the `humanize_time` filter registered.
#[derive(Clone)]
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.register_filter("humanize_time", humanize_time_filter);
        Self { tera }
    }

    /// Render `source` under `name` against `payload`.
    pub fn render(&self, name: &str, source: &str, payload: &Payload) -> Result<String> {
        let mut tera = self.tera.clone();
        tera.add_raw_template(name, source)?;
        Ok(tera.render(name, payload)?)
    }

    /// Render the template registered for `key` in `templates`.
    pub fn render_outcome(&self, templates: &Templates, key: &str, payload: &Payload) -> Result<String> {
        let source = templates
            .get(key)
            .ok_or_else(|| Error::Render(format!("no template for {key}")))?;
        self.render(key, source, payload)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse relative time: `now` for the last minute, then minutes, hours and
/// days ago.
pub fn humanize(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds().max(0);
    let (amount, unit) = match seconds {
        0..60 => return "now".to_string(),
        60..3_600 => (seconds / 60, "minute"),
        3_600..86_400 => (seconds / 3_600, "hour"),
        _ => (seconds / 86_400, "day"),
    };
    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}

fn humanize_time_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("humanize_time expects an RFC3339 timestamp"))?;
    let at = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| tera::Error::msg(format!("humanize_time: invalid timestamp {raw}: {e}")))?;
    Ok(Value::String(humanize(at.with_timezone(&Utc), Utc::now())))
}
