mod account;
mod dataset;
mod experiment;
mod job;
mod workspace;

pub use account::AccountClient;
pub use dataset::{CreateDatasetOptions, DatasetClient, DatasetRef};
pub use experiment::{ExperimentClient, ExperimentRef};
pub use job::{JobClient, JobListOptions, JobRef};
pub use workspace::WorkspaceClient;

use crate::error::{Error, Result};

/// Check a resource name against the service's naming rules.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let legal = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if legal {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Percent-encode a resource identifier for use as a single path segment.
pub(crate) fn url_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_allow_word_characters_only() {
        assert!(validate_name("data_v1.2-final").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("has/slash").is_err());
    }

    #[test]
    fn quoting_keeps_unreserved_and_escapes_the_rest() {
        assert_eq!(url_quote("plain-id_1.2~x"), "plain-id_1.2~x");
        assert_eq!(url_quote("org/name"), "org%2Fname");
        assert_eq!(url_quote("a b"), "a%20b");
    }
}
