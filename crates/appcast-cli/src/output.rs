//! Output formatting for CLI results
//!
//! This module provides consistent output formatting across all CLI commands.
//! It supports two output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation

use std::cmp::Ordering;
use std::str::FromStr;

use appcast::{
    ItemReleaseNotes, ManifestItem, ReleaseNotes, SecurityMode, SignatureVerificationResult,
    UpdateCheck, UpdateStatus,
};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Exit code name for failed commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
            code: None,
        }
    }

    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::success(data)
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
            code: None,
        }
    }

    /// Create an error response tagged with the exit code it ends in
    pub fn failure(code: ExitCode, message: &str) -> JsonResponse<()> {
        JsonResponse {
            code: Some(code.name()),
            ..Self::error(message)
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Format the result of an update check
    pub fn format_check(&self, output: &CheckOutput) -> String {
        match self.format {
            OutputFormat::Table => self.check_table(output),
            OutputFormat::Json => self.to_json_response(output, "check"),
        }
    }

    /// Format a produced signature
    pub fn format_signature(&self, output: &SignatureOutput) -> String {
        match self.format {
            OutputFormat::Table => output.signature.clone(),
            OutputFormat::Json => self.to_json_response(output, "sign"),
        }
    }

    /// Format a verification result
    pub fn format_verification(&self, output: &VerifyOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["File", &output.file]);
                table.add_row(vec!["Mode", &output.mode.to_string()]);
                table.add_row(vec!["Result", &output.result.to_string()]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(output, "verify"),
        }
    }

    /// Format a generated key pair
    pub fn format_key_pair(&self, output: &KeyPairOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Public Key", &output.public_key]);
                table.add_row(vec!["Secret Key", &output.secret_key]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(output, "keygen"),
        }
    }

    /// Format a version comparison
    pub fn format_comparison(&self, output: &CompareOutput) -> String {
        match self.format {
            OutputFormat::Table => format!("{} {} {}", output.a, output.ordering, output.b),
            OutputFormat::Json => self.to_json_response(output, "compare"),
        }
    }

    /// Format a finished conversion
    pub fn format_conversion(&self, output: &ConvertOutput) -> String {
        match self.format {
            OutputFormat::Table => format!(
                "Converted {} items from {} ({}) to {} ({})",
                output.items, output.input, output.from, output.output, output.to
            ),
            OutputFormat::Json => self.to_json_response(output, "convert"),
        }
    }

    /// Format an error
    pub fn format_error(&self, code: ExitCode, message: &str) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {message}\n{}", code.description()),
            OutputFormat::Json => self.to_json(&JsonResponse::failure(code, message)),
        }
    }

    /// Format progress message (only shown in verbose mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Format warning message
    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Format data with consistent JSON response wrapper
    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }

    fn check_table(&self, output: &CheckOutput) -> String {
        let mut summary = format!("Installed {}: {}", output.installed, output.status);
        if output.critical {
            summary.push_str(" (critical)");
        }
        if output.candidates.is_empty() {
            return summary;
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Version", "Title", "Channel", "OS", "Published", "Critical"]);
        for c in &output.candidates {
            table.add_row(vec![
                c.version.as_str(),
                &c.title,
                c.channel.as_deref().unwrap_or("stable"),
                &c.os,
                c.published.as_deref().unwrap_or("-"),
                if c.critical { "yes" } else { "no" },
            ]);
        }

        let mut out = format!("{summary}\n{table}");
        for notes in &output.release_notes {
            out.push_str(&format!("\n\n== {} ({}) ==\n{}", notes.title, notes.version, notes.text));
        }
        out
    }
}

fn property_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    table
}

// JSON output structures

/// Update check output
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub installed: String,
    pub status: UpdateStatus,
    pub critical: bool,
    pub candidates: Vec<CandidateOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub release_notes: Vec<NotesOutput>,
}

impl CheckOutput {
    pub fn new(installed: &str, check: &UpdateCheck) -> Self {
        Self {
            installed: installed.to_string(),
            status: check.status,
            critical: check.has_critical_update(),
            candidates: check.items.iter().map(CandidateOutput::from).collect(),
            release_notes: Vec::new(),
        }
    }
}

/// One update candidate
#[derive(Debug, Serialize)]
pub struct CandidateOutput {
    pub version: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub critical: bool,
    pub size: i64,
}

impl From<&ManifestItem> for CandidateOutput {
    fn from(item: &ManifestItem) -> Self {
        Self {
            version: item.version.to_string(),
            title: item.title.clone(),
            short_version: item.short_version.clone(),
            channel: item.channel.clone(),
            os: item.operating_system.clone(),
            download_link: item.download_link.clone(),
            published: item.publication_date.map(|d| d.to_rfc3339()),
            critical: item.is_critical,
            size: item.size,
        }
    }
}

/// Release notes of one candidate
#[derive(Debug, Serialize)]
pub struct NotesOutput {
    pub version: String,
    pub title: String,
    /// `fetched`, `inline`, `unavailable` or `missing`
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureVerificationResult>,
    pub text: String,
}

impl From<&ItemReleaseNotes> for NotesOutput {
    fn from(notes: &ItemReleaseNotes) -> Self {
        let (source, signature, text) = match &notes.notes {
            ReleaseNotes::Fetched { content, signature } => ("fetched", Some(*signature), content.clone()),
            ReleaseNotes::Inline(content) => ("inline", None, content.clone()),
            ReleaseNotes::Unavailable(message) => ("unavailable", None, message.clone()),
            ReleaseNotes::Missing => ("missing", None, String::new()),
        };
        Self {
            version: notes.version.to_string(),
            title: notes.title.clone(),
            source,
            signature,
            text,
        }
    }
}

/// Signature produced by `sign`
#[derive(Debug, Serialize)]
pub struct SignatureOutput {
    pub file: String,
    pub signature: String,
}

/// Result of `verify`
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub file: String,
    pub mode: SecurityMode,
    pub result: SignatureVerificationResult,
}

/// Key pair produced by `keygen`
#[derive(Debug, Serialize)]
pub struct KeyPairOutput {
    pub public_key: String,
    pub secret_key: String,
}

/// Result of `compare`
#[derive(Debug, Serialize)]
pub struct CompareOutput {
    pub a: String,
    pub b: String,
    /// `<`, `=` or `>`
    pub ordering: &'static str,
}

impl CompareOutput {
    pub fn new(a: &str, b: &str, ordering: Ordering) -> Self {
        Self {
            a: a.to_string(),
            b: b.to_string(),
            ordering: match ordering {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            },
        }
    }
}

/// Result of `convert`
#[derive(Debug, Serialize)]
pub struct ConvertOutput {
    pub input: String,
    pub output: String,
    pub from: String,
    pub to: String,
    pub items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("table").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("quiet").is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_json_response_error() {
        let response = JsonResponse::<()>::error("test error");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("test error".to_string()));
        assert!(response.code.is_none());
    }

    #[test]
    fn test_format_error_carries_exit_code() {
        let json = OutputFormatter::new(OutputFormat::Json, false)
            .format_error(ExitCode::InvalidInput, "bad version");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "bad version");
        assert_eq!(value["code"], "INVALID_INPUT");

        let table = OutputFormatter::new(OutputFormat::Table, false)
            .format_error(ExitCode::InvalidInput, "bad version");
        assert!(table.starts_with("Error: bad version"));
        assert!(table.contains(ExitCode::InvalidInput.description()));
    }

    #[test]
    fn test_check_output_json() {
        let mut item = ManifestItem::new("1.2").unwrap();
        item.title = "Version 1.2".to_string();
        item.is_critical = true;
        let check = UpdateCheck {
            status: UpdateStatus::UpdateAvailable,
            items: vec![item],
        };

        let formatter = OutputFormatter::new(OutputFormat::Json, false);
        let output = formatter.format_check(&CheckOutput::new("1.0", &check));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "check");
        assert_eq!(value["data"]["status"], "update_available");
        assert_eq!(value["data"]["critical"], true);
        assert_eq!(value["data"]["candidates"][0]["version"], "1.2");
        assert!(value["data"].get("release_notes").is_none());
    }

    #[test]
    fn test_check_output_table_without_candidates() {
        let formatter = OutputFormatter::new(OutputFormat::Table, false);
        let output = formatter.format_check(&CheckOutput::new("2.0", &UpdateCheck {
            status: UpdateStatus::UpdateNotAvailable,
            items: Vec::new(),
        }));
        assert_eq!(output, "Installed 2.0: no update available");
    }

    #[test]
    fn test_comparison_output() {
        let formatter = OutputFormatter::new(OutputFormat::Table, false);
        let output = formatter.format_comparison(&CompareOutput::new("1.0-beta", "1.0", Ordering::Less));
        assert_eq!(output, "1.0-beta < 1.0");
    }

    #[test]
    fn test_notes_output_sources() {
        let notes = ItemReleaseNotes {
            version: "1.1".into(),
            title: "Version 1.1".to_string(),
            notes: ReleaseNotes::Unavailable("bad signature".to_string()),
        };
        let output = NotesOutput::from(&notes);
        assert_eq!(output.source, "unavailable");
        assert_eq!(output.text, "bad signature");
        assert!(output.signature.is_none());
    }
}
