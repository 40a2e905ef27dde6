//! Error Catalog for d2cc
//!
//! Every failure the wrapper or the daemon can report maps to a stable code
//! (D2CC-E001 through D2CC-E599), a one-line message and remediation steps.
//! Codes are emitted as a structured `code` field on diagnostics so a failed
//! remote attempt can be told apart from a designed local fallback in logs.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                          |
//! |------------|-------------|--------------------------------------|
//! | E001-E099  | Config      | Configuration file and environment   |
//! | E100-E199  | Protocol    | Wire decode and session sequencing   |
//! | E200-E299  | Channel     | Local socket connectivity            |
//! | E300-E399  | Subprocess  | Preprocessor pipeline                |
//! | E400-E499  | Remote      | Remote execution and results         |
//! | E500-E599  | Local       | Local compiler resolution and exec   |
//!
//! # Example
//!
//! ```rust
//! use d2cc_common::errors::catalog::ErrorCode;
//!
//! let entry = ErrorCode::ChannelConnectFailed.entry();
//! println!("Error {}: {}", entry.code, entry.message);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all d2cc error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Environment variable has invalid value
    ConfigEnvError,

    // =========================================================================
    // Protocol Errors (E100-E199)
    // =========================================================================
    /// Frame header or body is malformed
    ProtocolMalformed,
    /// Stream ended inside a frame
    ProtocolTruncated,
    /// Frame carries an unknown type tag
    ProtocolUnknownTag,
    /// Message arrived out of sequence
    ProtocolUnexpectedMessage,
    /// Hello announced an unsupported protocol version
    ProtocolUnsupportedVersion,
    /// Accumulated request exceeds the configured limit
    ProtocolRequestTooLarge,

    // =========================================================================
    // Channel Errors (E200-E299)
    // =========================================================================
    /// Could not connect to the daemon socket
    ChannelConnectFailed,
    /// Connected, but the Hello message could not be sent
    ChannelHandshakeFailed,
    /// Writing a message to the socket failed
    ChannelWriteFailed,
    /// Reading from the socket failed
    ChannelReadFailed,
    /// A socket operation exceeded its timeout
    ChannelTimedOut,

    // =========================================================================
    // Subprocess Errors (E300-E399)
    // =========================================================================
    /// Preprocessor could not be spawned
    SubprocessSpawnFailed,
    /// Preprocessor exited with a nonzero status
    SubprocessNonZeroExit,
    /// Reading preprocessor output failed
    SubprocessReadFailed,
    /// Preprocessing exceeded its timeout
    SubprocessTimedOut,

    // =========================================================================
    // Remote Errors (E400-E499)
    // =========================================================================
    /// Request was committed but no remote result path exists
    RemoteUnimplemented,

    // =========================================================================
    // Local Errors (E500-E599)
    // =========================================================================
    /// Real compiler could not be located
    LocalCompilerNotFound,
    /// Real compiler could not be executed
    LocalExecFailed,
}

/// High-level error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Protocol,
    Channel,
    Subprocess,
    Remote,
    Local,
}

/// Complete catalog entry for an error code.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    /// Formatted code, e.g. `D2CC-E200`.
    pub code: String,
    pub category: ErrorCategory,
    pub message: &'static str,
    pub remediation: &'static [&'static str],
}

impl ErrorCode {
    /// Numeric part of the code.
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigReadError => 1,
            Self::ConfigParseError => 2,
            Self::ConfigEnvError => 3,

            Self::ProtocolMalformed => 100,
            Self::ProtocolTruncated => 101,
            Self::ProtocolUnknownTag => 102,
            Self::ProtocolUnexpectedMessage => 103,
            Self::ProtocolUnsupportedVersion => 104,
            Self::ProtocolRequestTooLarge => 105,

            Self::ChannelConnectFailed => 200,
            Self::ChannelHandshakeFailed => 201,
            Self::ChannelWriteFailed => 202,
            Self::ChannelReadFailed => 203,
            Self::ChannelTimedOut => 204,

            Self::SubprocessSpawnFailed => 300,
            Self::SubprocessNonZeroExit => 301,
            Self::SubprocessReadFailed => 302,
            Self::SubprocessTimedOut => 303,

            Self::RemoteUnimplemented => 400,

            Self::LocalCompilerNotFound => 500,
            Self::LocalExecFailed => 501,
        }
    }

    /// Formatted code string (`D2CC-Ennn`).
    pub fn code_string(&self) -> String {
        format!("D2CC-E{:03}", self.code_number())
    }

    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            0..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Protocol,
            200..=299 => ErrorCategory::Channel,
            300..=399 => ErrorCategory::Subprocess,
            400..=499 => ErrorCategory::Remote,
            _ => ErrorCategory::Local,
        }
    }

    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message(),
            remediation: self.remediation(),
        }
    }

    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigReadError => "Configuration file could not be read",
            Self::ConfigParseError => "Configuration file is not valid TOML",
            Self::ConfigEnvError => "Environment variable has an invalid value",
            Self::ProtocolMalformed => "Malformed protocol message",
            Self::ProtocolTruncated => "Protocol stream ended inside a message",
            Self::ProtocolUnknownTag => "Unknown protocol message tag",
            Self::ProtocolUnexpectedMessage => "Protocol message out of sequence",
            Self::ProtocolUnsupportedVersion => "Unsupported protocol version",
            Self::ProtocolRequestTooLarge => "Compile request exceeds size limit",
            Self::ChannelConnectFailed => "Unable to connect to the d2cc daemon",
            Self::ChannelHandshakeFailed => "Unable to send hello message",
            Self::ChannelWriteFailed => "Unable to write to the d2cc daemon",
            Self::ChannelReadFailed => "Unable to read from the d2cc daemon",
            Self::ChannelTimedOut => "Daemon socket operation timed out",
            Self::SubprocessSpawnFailed => "Unable to spawn the preprocessor",
            Self::SubprocessNonZeroExit => "Preprocessor exited with an error",
            Self::SubprocessReadFailed => "Unable to read preprocessor output",
            Self::SubprocessTimedOut => "Preprocessing timed out",
            Self::RemoteUnimplemented => "Remote protocol not implemented",
            Self::LocalCompilerNotFound => "Real compiler not found",
            Self::LocalExecFailed => "Unable to spawn compiler",
        }
    }

    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigReadError => &["Check permissions on the file named by D2CC_CONFIG"],
            Self::ConfigParseError => &["Validate the configuration file with a TOML linter"],
            Self::ConfigEnvError => &["Unset or correct the D2CC_* variable named in the warning"],
            Self::ProtocolMalformed
            | Self::ProtocolTruncated
            | Self::ProtocolUnknownTag
            | Self::ProtocolUnexpectedMessage
            | Self::ProtocolUnsupportedVersion => {
                &["Make sure the wrapper and daemon come from the same release"]
            }
            Self::ProtocolRequestTooLarge => &["Raise daemon.max_request_bytes"],
            Self::ChannelConnectFailed => &[
                "Start the daemon with `d2ccd`",
                "Check that general.socket_path matches on both sides",
            ],
            Self::ChannelHandshakeFailed
            | Self::ChannelWriteFailed
            | Self::ChannelReadFailed => &["Check the daemon log for a closed connection"],
            Self::ChannelTimedOut => &["Raise client.connect_timeout_ms or client.io_timeout_ms"],
            Self::SubprocessSpawnFailed => &["Check that the real compiler is on PATH"],
            Self::SubprocessNonZeroExit => &["The local compile will report the same error"],
            Self::SubprocessReadFailed => &["Retry the build; the pipe closed unexpectedly"],
            Self::SubprocessTimedOut => &["Raise client.preprocess_timeout_secs"],
            Self::RemoteUnimplemented => &["No action needed; the build continues locally"],
            Self::LocalCompilerNotFound => &[
                "Set client.compiler or D2CC_COMPILER",
                "Make sure the real compiler precedes nothing but d2cc on PATH",
            ],
            Self::LocalExecFailed => &["Check that the compiler binary is executable"],
        }
    }

    /// All known codes, in numeric order.
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigEnvError,
            Self::ProtocolMalformed,
            Self::ProtocolTruncated,
            Self::ProtocolUnknownTag,
            Self::ProtocolUnexpectedMessage,
            Self::ProtocolUnsupportedVersion,
            Self::ProtocolRequestTooLarge,
            Self::ChannelConnectFailed,
            Self::ChannelHandshakeFailed,
            Self::ChannelWriteFailed,
            Self::ChannelReadFailed,
            Self::ChannelTimedOut,
            Self::SubprocessSpawnFailed,
            Self::SubprocessNonZeroExit,
            Self::SubprocessReadFailed,
            Self::SubprocessTimedOut,
            Self::RemoteUnimplemented,
            Self::LocalCompilerNotFound,
            Self::LocalExecFailed,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code_string())
    }
}

impl ErrorEntry {
    /// Single-line form used in diagnostics.
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}
