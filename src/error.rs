use std::fmt;

#[derive(Debug)]
pub enum LogbookError {
    MissingTemplate,
    TemplateUnreadable(String),
    TemplateEncrypted,
    TemplateHasNoPages,
    InvalidConfiguration(String),
    Font(String),
    Pdf(String),
    Io(std::io::Error),
}

impl fmt::Display for LogbookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogbookError::MissingTemplate => write!(f, "no template PDF configured"),
            LogbookError::TemplateUnreadable(message) => {
                write!(f, "template PDF cannot be read: {}", message)
            }
            LogbookError::TemplateEncrypted => write!(f, "template PDF is encrypted"),
            LogbookError::TemplateHasNoPages => write!(f, "template PDF has no pages"),
            LogbookError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            LogbookError::Font(message) => write!(f, "font error: {}", message),
            LogbookError::Pdf(message) => write!(f, "pdf compose error: {}", message),
            LogbookError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for LogbookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogbookError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LogbookError {
    fn from(value: std::io::Error) -> Self {
        LogbookError::Io(value)
    }
}

impl From<lopdf::Error> for LogbookError {
    fn from(value: lopdf::Error) -> Self {
        LogbookError::Pdf(value.to_string())
    }
}

impl LogbookError {
    /// Template failures are the only fatal class; everything per-cell degrades locally.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            LogbookError::MissingTemplate
                | LogbookError::TemplateUnreadable(_)
                | LogbookError::TemplateEncrypted
                | LogbookError::TemplateHasNoPages
        )
    }
}
