use std::fmt::Debug;

use zerror::{iotoz, Z};

/// Errors that cross a layer boundary as typed values: startup configuration and socket setup.
/// Desync, reply-parse failure, and slave death are handled as internal control flow (see §7 of
/// the design notes) and never become a [MasterError].
#[derive(Debug)]
pub enum MasterError {
    /// A mandatory configuration option was missing or malformed.
    Configuration {
        what: String,
        info: Vec<(String, String)>,
    },
    /// Binding or accepting on a listen socket failed.
    Io {
        err: std::io::Error,
        info: Vec<(String, String)>,
    },
}

impl MasterError {
    pub fn configuration(what: impl Into<String>) -> Self {
        MasterError::Configuration {
            what: what.into(),
            info: Vec::new(),
        }
    }
}

impl From<std::io::Error> for MasterError {
    fn from(err: std::io::Error) -> Self {
        MasterError::Io {
            err,
            info: Vec::new(),
        }
    }
}

impl std::fmt::Display for MasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MasterError::Configuration { what, .. } => write!(f, "configuration error: {what}"),
            MasterError::Io { err, .. } => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for MasterError {}

impl Z for MasterError {
    type Error = Self;

    fn long_form(&self) -> String {
        let mut s = format!("{self}\n");
        let info = match self {
            MasterError::Configuration { info, .. } => info,
            MasterError::Io { info, .. } => info,
        };
        for (name, value) in info.iter() {
            s += &format!("{}: {}\n", name, value);
        }
        s
    }

    #[allow(deprecated)]
    fn with_token(self, identifier: &str, value: &str) -> Self::Error {
        self.with_info(identifier, value)
    }

    #[allow(deprecated)]
    fn with_url(self, identifier: &str, url: &str) -> Self::Error {
        self.with_info(identifier, url)
    }

    #[allow(deprecated)]
    fn with_variable<X: Debug>(self, variable: &str, x: X) -> Self::Error {
        self.with_info(variable, x)
    }

    fn with_info<X: Debug>(mut self, name: &str, value: X) -> Self::Error {
        let entry = (name.to_string(), format!("{value:?}"));
        match &mut self {
            MasterError::Configuration { info, .. } => info.push(entry),
            MasterError::Io { info, .. } => info.push(entry),
        }
        self
    }

    fn with_lazy_info<F: FnOnce() -> String>(self, name: &str, value: F) -> Self::Error {
        self.with_info(name, value())
    }
}

iotoz!(MasterError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_carries_info() {
        let err = MasterError::configuration("missing slave_port").with_info("option", "slave_port");
        assert!(err.long_form().contains("missing slave_port"));
        assert!(err.long_form().contains("slave_port"));
    }

    #[test]
    fn io_error_lifts_via_as_z() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"));
        let lifted: Result<(), MasterError> = result.as_z();
        assert!(lifted.is_err());
    }
}
