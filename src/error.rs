/// Process-level error carried back to `main`.
///
/// Exit codes:
/// - `2`: missing/unreadable input or invalid usage
/// - `3`: input was readable but nothing usable remained
/// - `4`: runtime failure (rendering, external tools, output files)
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// A required input path does not exist.
    pub fn missing_file(what: &str, path: &std::path::Path) -> Self {
        Self::new(2, format!("Error: {what} '{}' not found.", path.display()))
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<crate::io::correction::HeaderError> for AppError {
    fn from(err: crate::io::correction::HeaderError) -> Self {
        AppError::new(3, err.to_string())
    }
}

impl From<crate::expr::ExprError> for AppError {
    fn from(err: crate::expr::ExprError) -> Self {
        AppError::new(3, format!("Malformed correction formula: {err}"))
    }
}
