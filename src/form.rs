use serde::Serialize;
use thiserror::Error;

/// Form field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Local,
    Remote,
    Forward,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Local => write!(f, "local"),
            Field::Remote => write!(f, "remote"),
            Field::Forward => write!(f, "forward"),
        }
    }
}

/// Client-side validation failure. Never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub message: &'static str,
}

/// Raw, unvalidated values as typed into the creation form.
#[derive(Debug, Clone, Default)]
pub struct CreateForm {
    pub local: String,
    pub remote: String,
    pub forward: bool,
}

/// Validated payload for `POST <collection>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    pub local: String,
    pub remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<bool>,
}

/// Required-field check for a single input, shared with the interactive prompts.
pub fn require(field: Field, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let message = match field {
            Field::Local => "Please input the local endpoint",
            Field::Remote => "Please input the remote endpoint",
            Field::Forward => "Please choose a direction",
        };
        return Err(ValidationError { field, message });
    }
    Ok(())
}

impl CreateForm {
    /// Validate the form. `with_direction` controls whether the
    /// local-listener flag is part of the payload (tunnels only); setting
    /// it on a form without direction is an error.
    pub fn validate(&self, with_direction: bool) -> Result<CreateRequest, ValidationError> {
        require(Field::Local, &self.local)?;
        require(Field::Remote, &self.remote)?;
        if self.forward && !with_direction {
            return Err(ValidationError {
                field: Field::Forward,
                message: "Only tunnels have a local listener",
            });
        }
        Ok(CreateRequest {
            local: self.local.trim().to_string(),
            remote: self.remote.trim().to_string(),
            forward: with_direction.then_some(self.forward),
        })
    }
}
