//! Network policy hook.
//!
//! The engine has no idea what kind of link it runs on; the embedder tells it
//! through a [`NetworkMonitor`]. Checked while a task prepares.

use crate::error::DownloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
    Unmetered,
    Metered,
    Offline,
}

pub trait NetworkMonitor: Send + Sync {
    fn current(&self) -> NetworkClass;
}

/// Default monitor for hosts that do not distinguish links.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysUnmetered;

impl NetworkMonitor for AlwaysUnmetered {
    fn current(&self) -> NetworkClass {
        NetworkClass::Unmetered
    }
}

/// Whether a task may start on `class` under the metered-network setting.
pub fn check_network(class: NetworkClass, allow_metered: bool) -> Result<(), DownloadError> {
    match class {
        NetworkClass::Unmetered => Ok(()),
        NetworkClass::Metered if allow_metered => Ok(()),
        NetworkClass::Metered => Err(DownloadError::NetworkDisallowed),
        NetworkClass::Offline => Err(DownloadError::Network("no network connection".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metered_needs_permission() {
        assert!(check_network(NetworkClass::Metered, true).is_ok());
        let err = check_network(NetworkClass::Metered, false).unwrap_err();
        assert_eq!(err, DownloadError::NetworkDisallowed);
        assert!(!err.is_fatal());
    }

    #[test]
    fn offline_is_a_network_error() {
        let err = check_network(NetworkClass::Offline, true).unwrap_err();
        assert_eq!(err.code(), 4);
        assert!(check_network(AlwaysUnmetered.current(), false).is_ok());
    }
}
