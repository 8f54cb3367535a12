use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no output to decode")]
    Empty,
    #[error("unable to decode output as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Final, possibly filtered, output of a command run.
///
/// `output` is `None` when neither stdout nor stderr was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    output: Option<Vec<u8>>,
}

impl CommandResult {
    pub(crate) fn new(output: Option<Vec<u8>>) -> Self {
        Self { output }
    }

    #[must_use]
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    #[must_use]
    pub fn into_output(self) -> Option<Vec<u8>> {
        self.output
    }

    /// The output as text, replacing invalid UTF-8. Empty when nothing was captured.
    #[must_use]
    pub fn output_string(&self) -> String {
        self.output
            .as_deref()
            .map(|o| String::from_utf8_lossy(o).into_owned())
            .unwrap_or_default()
    }

    /// Decode the first JSON value in the output.
    ///
    /// Anything after the first complete value is ignored.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Empty` if there is no value to decode, or
    /// `DecodeError::Json` if the output is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let bytes = self.output.as_deref().unwrap_or_default();
        serde_json::Deserializer::from_slice(bytes)
            .into_iter::<T>()
            .next()
            .ok_or(DecodeError::Empty)?
            .map_err(DecodeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        name: String,
        size: u64,
    }

    #[test]
    fn test_output_string_without_capture() {
        let result = CommandResult::new(None);
        assert_eq!(result.output(), None);
        assert_eq!(result.output_string(), "");
    }

    #[test]
    fn test_output_string_lossy() {
        let result = CommandResult::new(Some(b"ok \xff".to_vec()));
        assert_eq!(result.output_string(), "ok \u{fffd}");
    }

    #[test]
    fn test_json_decodes_first_value() {
        let result = CommandResult::new(Some(
            br#"{"name": "a.txt", "size": 12} {"name": "b.txt", "size": 3}"#.to_vec(),
        ));
        let entry: Entry = result.json().unwrap();
        assert_eq!(
            entry,
            Entry {
                name: "a.txt".to_string(),
                size: 12
            }
        );
    }

    #[test]
    fn test_json_empty_output() {
        let result = CommandResult::new(None);
        assert!(matches!(result.json::<Entry>(), Err(DecodeError::Empty)));
        let result = CommandResult::new(Some(b"  \n".to_vec()));
        assert!(matches!(result.json::<Entry>(), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_json_wrong_shape() {
        let result = CommandResult::new(Some(br#"{"name": 1}"#.to_vec()));
        assert!(matches!(result.json::<Entry>(), Err(DecodeError::Json(_))));
    }
}
