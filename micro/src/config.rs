//! JSON configuration loader with typed key lookup.

use std::path::Path;

use serde_json::{Map, Value};

use crate::status::{Result, Status};

/// A loaded configuration document. The root must be a JSON object; values
/// are looked up by top-level key.
#[derive(Debug, Clone)]
pub struct Config {
    root: Map<String, Value>,
}

impl Config {
    /// Read and parse a configuration file.
    ///
    /// A missing file maps to `not_found`; a parse failure or a non-object
    /// root maps to `invalid_argument` (the parse message carries line and
    /// column).
    pub fn load_file(path: impl AsRef<Path>) -> Result<Config> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|_| Status::not_found("config file not found"))?;

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Status::invalid_argument(format!("invalid json: {e}")))?;

        match value {
            Value::Object(root) => Ok(Config { root }),
            _ => Err(Status::invalid_argument("config root must be a JSON object")),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        let v = self
            .root
            .get(key)
            .ok_or_else(|| Status::not_found("missing key"))?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| Status::invalid_argument("not a string"))
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        let v = self
            .root
            .get(key)
            .ok_or_else(|| Status::not_found("missing key"))?;
        v.as_i64()
            .ok_or_else(|| Status::invalid_argument("not an int"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_strings_and_ints() {
        let f = write_config(r#"{"listen":"0.0.0.0:8086","threads":4}"#);
        let cfg = Config::load_file(f.path()).unwrap();

        assert!(cfg.has("listen"));
        assert!(!cfg.has("missing"));
        assert_eq!(cfg.get_string("listen").unwrap(), "0.0.0.0:8086");
        assert_eq!(cfg.get_int("threads").unwrap(), 4);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Config::load_file("/nonexistent/config.json").unwrap_err();
        assert_eq!(err.kind(), StatusKind::NotFound);
    }

    #[test]
    fn parse_error_reports_position() {
        let f = write_config("{\"listen\": \n oops}");
        let err = Config::load_file(f.path()).unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
        assert!(err.message().contains("line"));
        assert!(err.message().contains("column"));
    }

    #[test]
    fn non_object_root_is_rejected() {
        let f = write_config("[1,2,3]");
        let err = Config::load_file(f.path()).unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
    }

    #[test]
    fn type_mismatches() {
        let f = write_config(r#"{"threads":"four","listen":8086,"ratio":1.5}"#);
        let cfg = Config::load_file(f.path()).unwrap();

        assert_eq!(
            cfg.get_int("threads").unwrap_err().kind(),
            StatusKind::InvalidArgument
        );
        assert_eq!(
            cfg.get_string("listen").unwrap_err().kind(),
            StatusKind::InvalidArgument
        );
        assert_eq!(
            cfg.get_int("ratio").unwrap_err().kind(),
            StatusKind::InvalidArgument
        );
        assert_eq!(
            cfg.get_int("absent").unwrap_err().kind(),
            StatusKind::NotFound
        );
    }
}
