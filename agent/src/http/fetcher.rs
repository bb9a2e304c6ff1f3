//! Configuration backup download from an appliance management API

use chrono::Local;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use tracing::{debug, error, info};
use url::Url;

use crate::app::options::FetchOptions;
use crate::authn::credentials::Credential;
use crate::errors::BackupError;
use crate::filesys::file::File;
use crate::models::backup::BackupArtifact;
use crate::models::device::Device;
use crate::storage::layout::{backup_filename, StorageLayout};
use crate::utils::{mask_secret, truncate_chars};

/// Backup endpoint of the appliance API
pub const BACKUP_API_PATH: &str = "/api/v2/monitor/system/config/backup";

/// Error bodies are cut to this many characters
const ERROR_BODY_LIMIT: usize = 100;

/// Downloads one device's configuration per call and stores it locally
pub struct BackupFetcher {
    client: Client,
    options: FetchOptions,
    layout: StorageLayout,
}

impl BackupFetcher {
    /// Create a new fetcher.
    ///
    /// Certificate verification is disabled: appliances commonly present
    /// self-signed certificates on their management interface.
    pub fn new(options: FetchOptions, layout: StorageLayout) -> Result<Self, BackupError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            client,
            options,
            layout,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Build the backup URL for `device`.
    ///
    /// Fails with a configuration error when encryption is requested without a
    /// key, before any request is made.
    pub fn backup_url(&self, device: &Device) -> Result<Url, BackupError> {
        let port = match device.explicit_port() {
            Some(port) => port.trim().parse::<u16>().map_err(|e| {
                BackupError::ConfigError(format!(
                    "Invalid port in '{}': {}",
                    device.connection_string, e
                ))
            })?,
            None => self.options.default_port,
        };

        let base = format!(
            "{}://{}:{}{}",
            self.options.protocol.as_str(),
            device.host().trim(),
            port,
            BACKUP_API_PATH
        );
        let mut url = Url::parse(&base).map_err(|e| {
            BackupError::ConfigError(format!(
                "Invalid device address '{}': {}",
                device.connection_string, e
            ))
        })?;
        url.query_pairs_mut().append_pair("scope", "global");

        if self.options.encrypt {
            let key = self.options.encryption_key.as_ref().ok_or_else(|| {
                BackupError::ConfigError(format!(
                    "Encryption requested for {} but BACKUP_ENCRYPTION_KEY is missing",
                    device.label()
                ))
            })?;
            url.query_pairs_mut()
                .append_pair("options", "encrypt")
                .append_pair("password", key.expose_secret());
        }

        Ok(url)
    }

    /// Download the configuration of `device` and persist it under the
    /// device's folder
    pub async fn fetch(
        &self,
        device: &Device,
        credential: &Credential,
    ) -> Result<BackupArtifact, BackupError> {
        let url = self.backup_url(device)?;
        let token = credential.token.expose_secret();

        info!(
            device = device.label(),
            host = url.host_str().unwrap_or_default(),
            port = ?url.port_or_known_default(),
            encrypted = self.options.encrypt,
            token_source = ?credential.source,
            "Starting backup download"
        );
        debug!(
            device = device.label(),
            key = %credential.key,
            token = %mask_secret(token),
            "Authorization header set"
        );

        let response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_chars(&body, ERROR_BODY_LIMIT).to_string();
            error!(
                device = device.label(),
                status = status.as_u16(),
                body = %body,
                "Failed to retrieve config"
            );
            return Err(BackupError::FetchStatus {
                status: status.as_u16(),
                body,
            });
        }

        let created_at = Local::now();
        let folder = device.folder_name();
        let filename = backup_filename(&folder, &created_at);
        let local_path = self.layout.device_dir(&folder).join(&filename);

        let bytes = File::new(&local_path)
            .write_stream(response.bytes_stream())
            .await?;

        info!(
            device = device.label(),
            path = %local_path.display(),
            bytes,
            "Backup successful"
        );

        Ok(BackupArtifact {
            device_folder_name: folder,
            filename,
            local_path,
            created_at,
        })
    }
}
