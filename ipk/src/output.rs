//! Result reporting for CLI commands, as plain text or JSON.

use anyhow::Result;
use ipk_core::{Error, ListedEntry};
use serde::Serialize;
use std::io::{self, Write};

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Renders command results to `out` and failures to `err`.
pub struct Reporter<O: Write, E: Write> {
    format: OutputFormat,
    out: O,
    err: E,
}

impl Reporter<io::Stdout, io::Stderr> {
    /// Reporter bound to the process' standard streams.
    pub fn stdio(format: OutputFormat) -> Self {
        Self::new(format, io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(format: OutputFormat, out: O, err: E) -> Self {
        Self { format, out, err }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Report a successful result.
    ///
    /// Text mode prints `text` verbatim, which may be empty.
    pub fn success<T: Serialize>(&mut self, data: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.out, data)?;
                writeln!(self.out)?;
            }
            OutputFormat::Text => self.out.write_all(text().as_bytes())?,
        }
        self.out.flush()?;
        Ok(())
    }

    /// Report a failure with its full context chain and return its result code.
    ///
    /// Failing to write the report is ignored; there is nowhere left to send it.
    pub fn failure(&mut self, error: &anyhow::Error) -> u8 {
        let result_code = result_code(error);
        let message = format!("{:#}", error);
        let _ = match self.format {
            OutputFormat::Json => {
                let report = ErrorOutput {
                    success: false,
                    result_code,
                    error: message,
                };
                serde_json::to_writer_pretty(&mut self.err, &report)
                    .map_err(io::Error::from)
                    .and_then(|()| writeln!(self.err))
            }
            OutputFormat::Text => writeln!(self.err, "Error: {}", message),
        };
        result_code
    }
}

/// Non-zero result code for a failure: 2 for a malformed or unsupported
/// package, 3 for an unknown user or group, 1 for everything else.
pub fn result_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<Error>() {
        Some(
            Error::Decode { .. }
            | Error::UnsupportedVersion { .. }
            | Error::SizeMismatch { .. }
            | Error::InvalidEntryName { .. }
            | Error::LinkTarget { .. },
        ) => 2,
        Some(Error::UnknownUser { .. } | Error::UnknownGroup { .. }) => 3,
        _ => 1,
    }
}

/// Failure report.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Result of `create`.
#[derive(Debug, Serialize)]
pub struct CreateOutput {
    pub success: bool,
    pub result_code: u8,
    pub package: String,
    pub input: String,
}

/// Result of `extract`.
#[derive(Debug, Serialize)]
pub struct ExtractOutput {
    pub success: bool,
    pub result_code: u8,
    pub package: String,
    pub destination: String,
}

/// Result of `view --json`.
#[derive(Debug, Serialize)]
pub struct ViewOutput {
    pub success: bool,
    pub result_code: u8,
    pub package: String,
    pub entries: Vec<ListedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn reporter(json: bool) -> Reporter<Vec<u8>, Vec<u8>> {
        Reporter::new(OutputFormat::from_flag(json), Vec::new(), Vec::new())
    }

    fn created() -> CreateOutput {
        CreateOutput {
            success: true,
            result_code: 0,
            package: "demo.ipk".to_string(),
            input: "staging".to_string(),
        }
    }

    #[test]
    fn test_text_success_prints_text_only() {
        let mut r = reporter(false);
        r.success(&created(), || "done\n".to_string()).unwrap();
        assert_eq!(r.out, b"done\n");
        assert!(r.err.is_empty());
    }

    #[test]
    fn test_json_success_skips_text() {
        let mut r = reporter(true);
        r.success(&created(), || panic!("text rendered in json mode"))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&r.out).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["package"], "demo.ipk");
    }

    #[test]
    fn test_text_failure_includes_context_chain() {
        let err = Err::<(), _>(io::Error::new(io::ErrorKind::NotFound, "missing"))
            .context("Failed to open demo.ipk")
            .unwrap_err();
        let mut r = reporter(false);
        assert_eq!(r.failure(&err), 1);
        assert!(r.out.is_empty());
        assert_eq!(
            String::from_utf8(r.err).unwrap(),
            "Error: Failed to open demo.ipk: missing\n"
        );
    }

    #[test]
    fn test_json_failure_report() {
        let err = anyhow::Error::new(Error::unsupported_version("1.0")).context("Failed to extract");
        let mut r = reporter(true);
        assert_eq!(r.failure(&err), 2);
        let value: serde_json::Value = serde_json::from_slice(&r.err).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["result_code"], 2);
        assert!(value["error"].as_str().unwrap().starts_with("Failed to extract: "));
    }

    #[test]
    fn test_result_code_by_error_kind() {
        assert_eq!(result_code(&anyhow::anyhow!("boom")), 1);
        assert_eq!(result_code(&Error::decode("truncated").into()), 2);
        assert_eq!(result_code(&Error::unknown_user("nobody-here").into()), 3);
        let io = std::io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(result_code(&anyhow::Error::new(io).context("Failed to open")), 1);
    }
}
