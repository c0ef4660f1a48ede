//! Startup configuration (§6, §10.3): a typed CLI surface replacing the original's
//! comma-separated option string, built the way `busyrpc`'s binaries derive their options.

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use crate::error::MasterError;
use zerror::Z;

#[derive(CommandLine, Debug, Eq, PartialEq)]
pub struct MasterOptions {
    /// TCP port where slaves connect. Mandatory.
    #[arrrg(required, "TCP port slaves connect to.")]
    pub slave_port: u16,
    /// Max concurrent slaves.
    #[arrrg(optional, "Maximum number of concurrent slave connections.")]
    pub max_slaves: usize,
    /// Forward `quit` to slaves.
    #[arrrg(flag, "Forward the quit command to slaves.")]
    pub slaves_quit: bool,
    /// Optional TCP port for the slave-stderr tee. Disabled when absent.
    #[arrrg(optional, "TCP port for the slave-stderr proxy tee.")]
    pub proxy_port: Option<u16>,
    /// Periodically emit biometrics to stderr.
    #[arrrg(flag, "Emit biometrics counters to stderr periodically.")]
    pub emit_biometrics: bool,
}

impl MasterOptions {
    /// Validate cross-field constraints that `#[derive(CommandLine)]` cannot express on its own.
    pub fn validate(&self) -> Result<(), MasterError> {
        if self.slave_port == 0 {
            return Err(MasterError::configuration("slave_port must be nonzero")
                .with_info("slave_port", self.slave_port));
        }
        if self.max_slaves == 0 {
            return Err(MasterError::configuration("max_slaves must be nonzero")
                .with_info("max_slaves", self.max_slaves));
        }
        if let Some(proxy_port) = self.proxy_port {
            if proxy_port == self.slave_port {
                return Err(MasterError::configuration(
                    "proxy_port must differ from slave_port",
                )
                .with_info("port", proxy_port));
            }
        }
        Ok(())
    }
}

impl Default for MasterOptions {
    fn default() -> Self {
        MasterOptions {
            slave_port: 0,
            max_slaves: 100,
            slaves_quit: false,
            proxy_port: None,
            emit_biometrics: false,
        }
    }
}
