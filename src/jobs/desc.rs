//! # Owned, immutable job description.
//!
//! A [`JobDesc`] wraps the pre-validated JSON document that defines a job's
//! pipeline. The supervisor core reads exactly three fields (`name`,
//! `is_live` and `debug`) and treats the rest as an opaque payload that is
//! handed to the worker process verbatim over the out-of-band channel.
//!
//! ## Example
//! ```rust
//! use streamvisor::JobDesc;
//!
//! let desc = JobDesc::parse(r#"{"name": "cam1", "is_live": true}"#).unwrap();
//! assert_eq!(desc.name(), "cam1");
//! assert!(desc.is_live());
//! assert!(desc.debug().is_none());
//! ```

use serde_json::Value;

use crate::error::JobError;

/// Job description document, immutable after creation.
#[derive(Debug, Clone)]
pub struct JobDesc {
    raw: String,
    name: String,
    is_live: bool,
    debug: Option<String>,
}

impl JobDesc {
    /// Parses a description, extracting the fields the supervisor needs.
    ///
    /// Requirements:
    /// - the document is valid JSON,
    /// - `name` is a non-empty string usable as a path segment (the name
    ///   keys the payload channel and the job's log directory),
    /// - `is_live` defaults to `true` when absent,
    /// - `debug` is an optional string forwarded to the worker's argv.
    pub fn parse(text: &str) -> Result<Self, JobError> {
        let doc: Value = serde_json::from_str(text).map_err(|e| JobError::InvalidDescription {
            reason: e.to_string(),
        })?;

        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| JobError::InvalidDescription {
                reason: "missing \"name\" field".into(),
            })?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(JobError::InvalidDescription {
                reason: format!("name {name:?} is not usable as a path segment"),
            });
        }

        let is_live = doc.get("is_live").and_then(Value::as_bool).unwrap_or(true);
        let debug = doc
            .get("debug")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self {
            raw: text.to_owned(),
            name,
            is_live,
            debug,
        })
    }

    /// The job's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the job renders a live pipeline (health-monitored) as opposed
    /// to a bounded transcode.
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// Debug flags to forward to the worker, if any.
    pub fn debug(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    /// The full document text, exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Byte length of the document; the worker receives this on its argv to
    /// size its read of the payload channel.
    pub fn byte_len(&self) -> usize {
        self.raw.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extracts_fields() {
        let desc = JobDesc::parse(
            r#"{"name": "cam1", "is_live": false, "debug": "pipeline:4", "source": {}}"#,
        )
        .expect("valid");
        assert_eq!(desc.name(), "cam1");
        assert!(!desc.is_live());
        assert_eq!(desc.debug(), Some("pipeline:4"));
        assert_eq!(desc.byte_len(), desc.raw().len());
    }

    #[test]
    fn test_is_live_defaults_true() {
        let desc = JobDesc::parse(r#"{"name": "cam1"}"#).expect("valid");
        assert!(desc.is_live());
        assert!(desc.debug().is_none());
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let err = JobDesc::parse(r#"{"is_live": true}"#).unwrap_err();
        assert_eq!(err.as_label(), "invalid_description");
    }

    #[test]
    fn test_unusable_names_are_rejected() {
        for bad in ["", "a/b", "..", "."] {
            let doc = format!(r#"{{"name": {}}}"#, serde_json::to_string(bad).unwrap());
            assert!(
                JobDesc::parse(&doc).is_err(),
                "name {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(JobDesc::parse("not json").is_err());
    }
}
