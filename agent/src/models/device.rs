//! Device model and device-list parsing

use std::path::Path;

use tracing::{info, warn};

/// A network appliance to back up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// `host[:port]` as written in the device list
    pub connection_string: String,

    /// Optional human-readable name
    pub display_name: Option<String>,
}

impl Device {
    pub fn new(connection_string: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            display_name: display_name.filter(|n| !n.trim().is_empty()),
        }
    }

    /// Parse one `host[:port][, display_name]` line.
    /// Returns `None` for blank and `#` comment lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut parts = line.split(',');
        let connection_string = parts.next()?.trim();
        if connection_string.is_empty() {
            return None;
        }
        let display_name = parts.next().map(|n| n.trim().to_string());

        Some(Self::new(connection_string, display_name))
    }

    /// Host part of the connection string
    pub fn host(&self) -> &str {
        self.split_host_port().0
    }

    /// Explicit port from the connection string, unparsed
    pub fn explicit_port(&self) -> Option<&str> {
        self.split_host_port().1
    }

    fn split_host_port(&self) -> (&str, Option<&str>) {
        match self.connection_string.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (self.connection_string.as_str(), None),
        }
    }

    /// Name used in logs and the run summary
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or(&self.connection_string)
    }

    /// Directory name for this device's backups, stable across runs
    pub fn folder_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(sanitize_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.host().replace(':', "_"))
    }
}

/// Make a display name safe for file and directory names.
///
/// Alphanumerics and `_` are kept, spaces and `-` become `_`, everything else
/// is dropped.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '_' => Some(c),
            ' ' | '-' => Some('_'),
            _ => None,
        })
        .collect()
}

/// Parse a device list, one device per line
pub fn parse_device_list(contents: &str) -> Vec<Device> {
    contents.lines().filter_map(Device::parse_line).collect()
}

/// Load the device list from `path`.
///
/// A missing or unreadable file is reported and treated as an empty list.
pub fn load_devices(path: &Path) -> Vec<Device> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let devices = parse_device_list(&contents);
            info!(path = %path.display(), count = devices.len(), "Loaded device list");
            devices
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to read device list");
            Vec::new()
        }
    }
}
