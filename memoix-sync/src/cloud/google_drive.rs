//! Google Drive storage provider.
//!
//! Uses the Drive v3 REST API. The bundle and meta files live directly in
//! the selected folder and are looked up by name; an existing file is
//! replaced in place so its Drive id (and sharing) survives.

use super::storage::StorageProvider;
use crate::bundle::{BUNDLE_FILE_NAME, BundleCodec, META_FILE_NAME};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use memoix_types::{Bundle, ProviderKind, StorageMeta};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "memoix_bundle_boundary";

/// Google Drive specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Redirect URI for OAuth flow.
    pub redirect_uri: String,
    /// Folder created in the Drive root when connecting without a selection.
    pub default_folder_name: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Base URL for Google Drive API (e.g. `https://www.googleapis.com`).
    pub api_base_url: String,
    /// Base URL for Google OAuth2 (e.g. `https://oauth2.googleapis.com`).
    pub oauth_base_url: String,
    /// Base URL for Google Accounts auth page (e.g. `https://accounts.google.com`).
    pub auth_base_url: String,
}

impl Default for GoogleDriveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
            default_folder_name: "Memoix".to_string(),
            request_timeout_secs: 60,
            api_base_url: "https://www.googleapis.com".to_string(),
            oauth_base_url: "https://oauth2.googleapis.com".to_string(),
            auth_base_url: "https://accounts.google.com".to_string(),
        }
    }
}

/// OAuth2 tokens.
#[derive(Debug, Clone)]
struct OAuthTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct DriveState {
    tokens: Option<OAuthTokens>,
    folder_id: Option<String>,
    folder_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
    #[serde(default)]
    trashed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn into_tokens(self, previous_refresh: Option<String>) -> OAuthTokens {
        // 60s buffer so a token never expires mid-request.
        let expires_at = self
            .expires_in
            .map(|secs| SystemTime::now() + Duration::from_secs(secs.saturating_sub(60)));
        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at,
        }
    }
}

/// Google Drive storage provider.
pub struct GoogleDriveProvider {
    config: GoogleDriveConfig,
    client: Client,
    state: RwLock<DriveState>,
}

impl GoogleDriveProvider {
    pub fn new(config: GoogleDriveConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            state: RwLock::new(DriveState::default()),
        })
    }

    fn state(&self) -> RwLockReadGuard<'_, DriveState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, DriveState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets existing tokens (e.g., loaded from the platform keychain).
    pub fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        self.state_mut().tokens = Some(OAuthTokens {
            access_token,
            refresh_token,
            expires_at: None,
        });
    }

    /// Current refresh token, for the caller to persist.
    pub fn refresh_token(&self) -> Option<String> {
        self.state()
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    /// The OAuth2 authorization URL the user must visit to sign in.
    pub fn authorization_url(&self) -> String {
        let scope = "https://www.googleapis.com/auth/drive.file";
        format!(
            "{}/o/oauth2/v2/auth?\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            access_type=offline&\
            prompt=consent",
            self.config.auth_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(scope)
        )
    }

    /// Exchanges an authorization code for tokens.
    pub async fn complete_auth(&self, auth_code: &str) -> SyncResult<()> {
        debug!("Exchanging auth code for tokens");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", auth_code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("token exchange failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse token response: {e}")))?;

        self.state_mut().tokens = Some(token_response.into_tokens(None));
        info!("Google Drive authentication successful");
        Ok(())
    }

    /// Gets the current access token, refreshing if needed.
    async fn access_token(&self) -> SyncResult<String> {
        let (access_token, expired) = {
            let state = self.state();
            let tokens = state
                .tokens
                .as_ref()
                .ok_or_else(|| SyncError::Auth("not authenticated".to_string()))?;
            let expired = tokens
                .expires_at
                .is_some_and(|exp| SystemTime::now() > exp);
            (tokens.access_token.clone(), expired)
        };

        if expired {
            return self.refresh_access_token().await;
        }
        Ok(access_token)
    }

    /// Refreshes the access token.
    async fn refresh_access_token(&self) -> SyncResult<String> {
        let refresh_token = self
            .refresh_token()
            .ok_or_else(|| SyncError::Auth("no refresh token available".to_string()))?;

        debug!("Refreshing Google Drive access token");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("token refresh failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse token response: {e}")))?;

        let tokens = token_response.into_tokens(Some(refresh_token));
        let access_token = tokens.access_token.clone();
        self.state_mut().tokens = Some(tokens);
        Ok(access_token)
    }

    fn require_folder(&self) -> SyncResult<String> {
        self.state().folder_id.clone().ok_or(SyncError::NotConnected)
    }

    /// Finds a non-trashed file by name in a folder.
    async fn find_file(&self, folder_id: &str, name: &str) -> SyncResult<Option<String>> {
        let access_token = self.access_token().await?;
        let query = format!("name = '{name}' and '{folder_id}' in parents and trashed = false");

        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("file search failed: {e}")))?;
        let response = check_status(response, "file search").await?;

        let file_list: DriveFileList = response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse file list: {e}")))?;

        Ok(file_list.files.into_iter().next().map(|f| f.id))
    }

    /// Uploads a file, replacing the existing one with the same name.
    async fn upload_file(&self, folder_id: &str, name: &str, content: Vec<u8>) -> SyncResult<()> {
        let existing = self.find_file(folder_id, name).await?;
        let access_token = self.access_token().await?;
        let size = content.len();

        let request = match &existing {
            Some(file_id) => self
                .client
                .patch(format!(
                    "{}/upload/drive/v3/files/{file_id}?uploadType=media",
                    self.config.api_base_url
                ))
                .header("Content-Type", "application/json")
                .body(content),
            None => {
                let metadata = serde_json::json!({
                    "name": name,
                    "parents": [folder_id]
                });
                let mut body = Vec::with_capacity(size + 256);
                body.extend_from_slice(format!(
                    "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json\r\n\r\n"
                ).as_bytes());
                body.extend_from_slice(&content);
                body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());

                self.client
                    .post(format!(
                        "{}/upload/drive/v3/files?uploadType=multipart",
                        self.config.api_base_url
                    ))
                    .header(
                        "Content-Type",
                        format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                    )
                    .body(body)
            }
        };

        let response = request
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;
        check_status(response, "upload").await?;

        debug!(
            file = name,
            bytes = size,
            replaced = existing.is_some(),
            "Uploaded file"
        );
        Ok(())
    }

    /// Downloads a file by name, or `None` if the folder holds none.
    async fn download_file(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        let folder_id = self.require_folder()?;
        let Some(file_id) = self.find_file(&folder_id, name).await? else {
            return Ok(None);
        };
        let access_token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/drive/v3/files/{file_id}",
                self.config.api_base_url
            ))
            .query(&[("alt", "media")])
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;
        let response = check_status(response, "download").await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("read download body failed: {e}")))?;
        debug!(file = name, bytes = bytes.len(), "Downloaded file");
        Ok(Some(bytes.to_vec()))
    }

    /// Finds or creates the default folder in the Drive root.
    async fn ensure_default_folder(&self) -> SyncResult<(String, String)> {
        let access_token = self.access_token().await?;
        let name = self.config.default_folder_name.clone();
        let query = format!(
            "name = '{name}' and mimeType = '{FOLDER_MIME_TYPE}' and 'root' in parents and trashed = false"
        );

        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("folder search failed: {e}")))?;
        let response = check_status(response, "folder search").await?;

        let file_list: DriveFileList = response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse folder list: {e}")))?;

        if let Some(folder) = file_list.files.into_iter().next() {
            return Ok((folder.id, folder.name));
        }

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": ["root"]
        });
        let response = self
            .client
            .post(format!("{}/drive/v3/files", self.config.api_base_url))
            .bearer_auth(&access_token)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("folder creation failed: {e}")))?;
        let response = check_status(response, "folder creation").await?;

        let created: DriveFile = response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse created folder: {e}")))?;

        info!("Created sync folder: {}", created.name);
        Ok((created.id, created.name))
    }
}

/// Maps HTTP failures onto the sync error taxonomy.
async fn check_status(response: Response, context: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth(format!("{context}: {body}")),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            SyncError::AccessDenied(format!("{context}: {status} {body}"))
        }
        _ => SyncError::Network(format!("{context}: {status} {body}")),
    })
}

#[async_trait]
impl StorageProvider for GoogleDriveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleDrive
    }

    fn name(&self) -> &'static str {
        "Google Drive"
    }

    fn is_connected(&self) -> bool {
        let state = self.state();
        state.tokens.is_some() && state.folder_id.is_some()
    }

    fn connected_path(&self) -> Option<String> {
        self.state().folder_id.clone()
    }

    fn supports_automatic_sync(&self) -> bool {
        true
    }

    fn supports_fast_meta_check(&self) -> bool {
        true
    }

    async fn initialize(&self) -> SyncResult<bool> {
        let has_refresh = match &self.state().tokens {
            None => return Ok(false),
            Some(tokens) => tokens.refresh_token.is_some(),
        };
        if has_refresh {
            self.refresh_access_token().await?;
        }
        Ok(true)
    }

    async fn connect(&self) -> SyncResult<()> {
        if self.state().tokens.is_none() {
            return Err(SyncError::Auth(format!(
                "sign-in required: {}",
                self.authorization_url()
            )));
        }
        if self.state().folder_id.is_none() {
            let (id, name) = self.ensure_default_folder().await?;
            let mut state = self.state_mut();
            state.folder_id = Some(id);
            state.folder_name = Some(name);
        }
        Ok(())
    }

    async fn select_folder(&self, folder_id: &str) -> SyncResult<()> {
        let mut state = self.state_mut();
        state.folder_id = Some(folder_id.to_string());
        state.folder_name = None;
        Ok(())
    }

    async fn verify_access(&self) -> SyncResult<()> {
        let folder_id = self.require_folder()?;
        let access_token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/drive/v3/files/{folder_id}",
                self.config.api_base_url
            ))
            .bearer_auth(&access_token)
            .query(&[("fields", "id,name,mimeType,trashed")])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("folder lookup failed: {e}")))?;
        let response = check_status(response, "folder lookup").await?;

        let folder: DriveFile = response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse folder: {e}")))?;

        if folder.mime_type.as_deref() != Some(FOLDER_MIME_TYPE) {
            return Err(SyncError::AccessDenied(format!("{} is not a folder", folder.name)));
        }
        if folder.trashed.unwrap_or(false) {
            return Err(SyncError::AccessDenied(format!("{} is in the trash", folder.name)));
        }

        debug!(folder = %folder.name, "Verified folder access");
        self.state_mut().folder_name = Some(folder.name);
        Ok(())
    }

    async fn disconnect(&self) -> SyncResult<()> {
        *self.state_mut() = DriveState::default();
        info!("Disconnected from Google Drive");
        Ok(())
    }

    async fn push(&self, bundle: &Bundle) -> SyncResult<()> {
        let folder_id = self.require_folder()?;
        let bytes = BundleCodec::encode(bundle)?;
        self.upload_file(&folder_id, BUNDLE_FILE_NAME, bytes).await
    }

    async fn pull(&self) -> SyncResult<Option<Bundle>> {
        self.download_file(BUNDLE_FILE_NAME)
            .await?
            .map(|bytes| BundleCodec::decode(&bytes))
            .transpose()
    }

    async fn get_meta(&self) -> SyncResult<Option<StorageMeta>> {
        self.download_file(META_FILE_NAME)
            .await?
            .map(|bytes| BundleCodec::decode_meta(&bytes))
            .transpose()
    }

    async fn update_meta(&self, meta: &StorageMeta) -> SyncResult<()> {
        let folder_id = self.require_folder()?;
        let bytes = BundleCodec::encode_meta(meta)?;
        self.upload_file(&folder_id, META_FILE_NAME, bytes).await
    }
}
