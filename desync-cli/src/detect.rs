//! Host service-manager detection.
//!
//! The install/uninstall/start/stop/restart subcommands only need to know
//! *which* manager is present well enough to print what they would do;
//! talking to systemd/OpenRC for real is an external collaborator's job.

use std::env;
use std::path::Path;

/// Which service manager, if any, appears to be running on this host.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServiceManagerType {
    Systemd,
    OpenRc,
    None,
}

impl ServiceManagerType {
    pub fn name(self) -> &'static str {
        match self {
            ServiceManagerType::Systemd => "systemd",
            ServiceManagerType::OpenRc => "OpenRC",
            ServiceManagerType::None => "none",
        }
    }
}

/// Detect the host service manager by probing the usual marker paths and
/// environment variables.
pub fn detect_service_manager() -> ServiceManagerType {
    #[cfg(not(target_os = "windows"))]
    {
        if Path::new("/run/systemd/system").exists() || Path::new("/sys/fs/cgroup/systemd").exists() {
            return ServiceManagerType::Systemd;
        }
        if env::var("RC_SVCNAME").is_ok() || Path::new("/run/openrc").exists() {
            return ServiceManagerType::OpenRc;
        }
        ServiceManagerType::None
    }

    #[cfg(target_os = "windows")]
    {
        ServiceManagerType::None
    }
}
