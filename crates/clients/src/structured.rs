use crate::error::Result;
use crate::CompletionModel;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Target shape handed to the completion model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    /// JSON schema of `T`, without the `$schema` meta key.
    pub fn of<T: JsonSchema>(name: &str) -> Self {
        let mut schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
        }
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// Outcome of a structured completion.
///
/// Malformed output is a value, not a panic, so every caller has to decide
/// what a bad answer means for it.
#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Parsed(T),
    Malformed { raw: String, reason: String },
}

impl<T: DeserializeOwned> Structured<T> {
    pub fn from_raw(raw: String) -> Self {
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Self::Parsed(value),
            Err(err) => Self::Malformed {
                raw,
                reason: err.to_string(),
            },
        }
    }
}

impl<T> Structured<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Malformed { .. } => None,
        }
    }
}

/// Ask `model` for an instance of `T`.
///
/// Transport and status failures are errors; a successful call whose text
/// does not fit `T` comes back as [`Structured::Malformed`].
pub async fn invoke_structured<T>(
    model: &dyn CompletionModel,
    name: &str,
    prompt: &str,
) -> Result<Structured<T>>
where
    T: DeserializeOwned + JsonSchema,
{
    let format = ResponseFormat::of::<T>(name);
    log::debug!("Invoking structured completion shape={name}");
    let raw = model.complete(prompt, &format).await?;
    let result = Structured::from_raw(raw);
    if let Structured::Malformed { reason, .. } = &result {
        log::warn!("Structured completion did not match shape={name}: {reason}");
    }
    Ok(result)
}
