use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
pub const UNKNOWN_PRESET: &str = "UNKNOWN_PRESET";
pub const ASSET_MISSING: &str = "ASSET_MISSING";
pub const FONT_LOAD_FAILED: &str = "FONT_LOAD_FAILED";
pub const UNSUPPORTED_GLYPH: &str = "UNSUPPORTED_GLYPH";
pub const ENCODER_UNAVAILABLE: &str = "ENCODER_UNAVAILABLE";
pub const RENDER_FAILED: &str = "RENDER_FAILED";

/// Failure class, decides the CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedErrorKind {
    Usage,
    /// A card or its inputs (font, sounds, glyphs) could not be built.
    ClipConstruction,
    /// The encoder could not be started or did not finish cleanly.
    Render,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, CodedErrorKind::Usage)
    }

    pub fn clip(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, CodedErrorKind::ClipConstruction)
    }

    pub fn render(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, CodedErrorKind::Render)
    }

    fn new(code: &'static str, message: impl Into<String>, kind: CodedErrorKind) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            CodedErrorKind::Usage => 2,
            CodedErrorKind::ClipConstruction | CodedErrorKind::Render => 1,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                kind: self.kind,
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub kind: CodedErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}
