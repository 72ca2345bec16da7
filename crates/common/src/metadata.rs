//! Session metadata carried in a single environment variable.
//!
//! The transport has no slot for per-stream PTY selection, structured argv or
//! the working directory, so the client packs them into one JSON object and
//! sends it as an ordinary `env` request ahead of the start request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment key carrying the encoded [`SessionMetadata`].
pub const META_ENV_KEY: &str = "__FERRY_META";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("malformed session metadata: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode session metadata: {0}")]
    Encode(#[source] serde_json::Error),
}

/// How the start request payload should be interpreted by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    /// Payload is a JSON array of argv strings.
    RawArgv,
    /// Payload is one string handed to the login shell as `-c <payload>`.
    #[default]
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    /// Working directory, already expressed in the remote namespace.
    pub pwd: String,
    pub mode: CommandMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argv0: Option<String>,
    pub pty_stdin: bool,
    pub pty_stdout: bool,
    pub pty_stderr: bool,
    /// Ask the remote side to degrade to a simpler execution mode if needed.
    pub fallback: bool,
}

impl SessionMetadata {
    pub fn encode(&self) -> Result<String, MetadataError> {
        serde_json::to_string(self).map_err(MetadataError::Encode)
    }

    /// Decode a carrier value. An empty value means no metadata was sent and
    /// yields the interactive-shell default.
    pub fn decode(raw: &str) -> Result<Self, MetadataError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(MetadataError::Malformed)
    }

    pub fn wants_pty(&self) -> bool {
        self.pty_stdin || self.pty_stdout || self.pty_stderr
    }

    /// Mark every stream as a PTY endpoint.
    pub fn with_all_pty(mut self) -> Self {
        self.pty_stdin = true;
        self.pty_stdout = true;
        self.pty_stderr = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_decodes_to_shell_default() {
        let meta = SessionMetadata::decode("").unwrap();
        assert_eq!(meta.mode, CommandMode::Shell);
        assert!(!meta.wants_pty());
        assert!(meta.pwd.is_empty());
        assert!(meta.argv0.is_none());
        assert!(!meta.fallback);
    }

    #[test]
    fn garbage_is_distinguishable_from_missing() {
        let err = SessionMetadata::decode("{not json").unwrap_err();
        assert!(matches!(err, MetadataError::Malformed(_)));
        assert!(err.to_string().starts_with("malformed session metadata"));

        let err = SessionMetadata::decode("[1,2,3]").unwrap_err();
        assert!(matches!(err, MetadataError::Malformed(_)));
    }

    #[test]
    fn missing_fields_take_defaults_and_unknown_fields_are_ignored() {
        let meta =
            SessionMetadata::decode(r#"{"pwd":"/work","pty_stdout":true,"later_field":1}"#)
                .unwrap();
        assert_eq!(meta.pwd, "/work");
        assert!(meta.pty_stdout);
        assert!(!meta.pty_stdin);
        assert_eq!(meta.mode, CommandMode::Shell);
    }

    #[test]
    fn encoding_is_a_single_env_safe_line() {
        let meta = SessionMetadata {
            pwd: "/tmp/with space\nnewline".into(),
            mode: CommandMode::RawArgv,
            argv0: Some("-zsh".into()),
            ..Default::default()
        };
        let encoded = meta.encode().unwrap();
        assert!(!encoded.contains('\0'));
        assert!(!encoded.contains('\n'));
        assert!(encoded.contains(r#""mode":"raw_argv""#));
    }

    #[test]
    fn argv0_is_omitted_when_absent() {
        let encoded = SessionMetadata::default().encode().unwrap();
        assert!(!encoded.contains("argv0"));
    }

    fn arb_metadata() -> impl Strategy<Value = SessionMetadata> {
        (
            ".*",
            any::<bool>(),
            proptest::option::of(".*"),
            any::<[bool; 4]>(),
        )
            .prop_map(|(pwd, raw, argv0, flags)| SessionMetadata {
                pwd,
                mode: if raw {
                    CommandMode::RawArgv
                } else {
                    CommandMode::Shell
                },
                argv0,
                pty_stdin: flags[0],
                pty_stdout: flags[1],
                pty_stderr: flags[2],
                fallback: flags[3],
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(meta in arb_metadata()) {
            let encoded = meta.encode().unwrap();
            prop_assert!(!encoded.contains('\0'));
            prop_assert_eq!(SessionMetadata::decode(&encoded).unwrap(), meta);
        }
    }
}
