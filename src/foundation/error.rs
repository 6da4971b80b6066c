use crate::validate::Diagnostic;

pub type ArborResult<T> = Result<T, ArborError>;

#[derive(thiserror::Error, Debug)]
pub enum ArborError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("uncaught render error at {path}: {message}")]
    Uncaught { path: String, message: String },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArborError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn scheduling(msg: impl Into<String>) -> Self {
        Self::Scheduling(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

/// Failure raised while building a component's children.
///
/// Render functions return this instead of unwinding; the scheduler routes it to the nearest
/// error boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("{0}")]
    Thrown(String),

    #[error("invalid props for `{component}` ({} diagnostic(s))", diagnostics.len())]
    InvalidProps {
        component: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl RenderError {
    pub fn thrown(msg: impl Into<String>) -> Self {
        Self::Thrown(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ArborError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(ArborError::schema("x").to_string().contains("schema error:"));
        assert!(
            ArborError::scheduling("x")
                .to_string()
                .contains("scheduling error:")
        );
        assert!(
            ArborError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn uncaught_names_the_failing_path() {
        let err = ArborError::Uncaught {
            path: "App#0/Avatar#0".to_string(),
            message: RenderError::thrown("cannot read `test` of undefined").to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("App#0/Avatar#0"));
        assert!(s.contains("cannot read"));
    }

    #[test]
    fn invalid_props_counts_diagnostics() {
        let err = RenderError::InvalidProps {
            component: "RadioButton".to_string(),
            diagnostics: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "invalid props for `RadioButton` (0 diagnostic(s))"
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ArborError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
