//! Declarative step model executed by the interpreter.

use serde::{Deserialize, Deserializer, Serialize};

/// Closed set of browser actions a stored configuration may request.
///
/// Stored configurations are edited by an external admin workflow, so kinds we
/// do not recognize must stay non-fatal: they deserialize to [`StepKind::Unknown`]
/// and the interpreter logs and skips them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Goto,
    Wait,
    WaitSelector,
    Click,
    Type,
    FillCredential,
    FillDateStart,
    FillDateEnd,
    Download,
    PressKey,
    Screenshot,
    #[serde(other)]
    Unknown,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Goto => "goto",
            StepKind::Wait => "wait",
            StepKind::WaitSelector => "wait_selector",
            StepKind::Click => "click",
            StepKind::Type => "type",
            StepKind::FillCredential => "fill_credential",
            StepKind::FillDateStart => "fill_date_start",
            StepKind::FillDateEnd => "fill_date_end",
            StepKind::Download => "download",
            StepKind::PressKey => "press_key",
            StepKind::Screenshot => "screenshot",
            StepKind::Unknown => "unknown",
        }
    }
}

/// One declarative browser action in an ordered automation sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    pub kind: StepKind,
    /// Ordered candidate selectors; the first one that resolves to a visible
    /// element wins. Legacy configurations store these as one comma-separated
    /// string, which the deserializer still accepts.
    #[serde(
        default,
        alias = "selector",
        deserialize_with = "deserialize_selectors"
    )]
    pub selectors: Vec<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub credential_field: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Step {
    pub fn new(order: u32, kind: StepKind) -> Self {
        Self {
            order,
            kind,
            selectors: Vec::new(),
            value: None,
            credential_field: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_credential_field(mut self, field: impl Into<String>) -> Self {
        self.credential_field = Some(field.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Accepts either an explicit list or the legacy `"a, b, c"` form.
fn deserialize_selectors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SelectorField {
        List(Vec<String>),
        Legacy(String),
    }

    match Option::<SelectorField>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(SelectorField::List(list)) => Ok(list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()),
        Some(SelectorField::Legacy(raw)) => Ok(split_selector_list(&raw)),
    }
}

/// Split a legacy comma-separated selector chain into ordered candidates.
pub fn split_selector_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_selector_string_splits_into_candidates() {
        let yaml = r#"
order: 3
kind: click
selector: "button[type=submit], .login-btn , #submit"
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.kind, StepKind::Click);
        assert_eq!(
            step.selectors,
            vec!["button[type=submit]", ".login-btn", "#submit"]
        );
        assert_eq!(step.timeout_ms, 10_000);
    }

    #[test]
    fn selector_list_form_is_accepted() {
        let yaml = r##"
order: 1
kind: wait_selector
selectors: ["#a", "#b"]
timeout_ms: 2500
"##;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.selectors, vec!["#a", "#b"]);
        assert_eq!(step.timeout_ms, 2500);
    }

    #[test]
    fn unknown_kind_is_tolerated() {
        let yaml = r#"
order: 9
kind: hover_and_pray
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.kind, StepKind::Unknown);
    }
}
