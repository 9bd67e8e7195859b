//! Installed-app OAuth for the Drive API.
//!
//! Tokens are cached in `token_file` and refreshed by `yup-oauth2`; the
//! browser consent flow only runs when there is nothing to refresh.

use crate::models::error::{BackupError, Result};
use log::{info, warn};
use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::runtime::Runtime;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Read a downloaded OAuth client file (`installed` or `web` section).
pub fn load_client_secret(path: &Path) -> Result<ApplicationSecret> {
    let content = fs::read(path).map_err(|cause| BackupError::SecretRead {
        path: path.to_path_buf(),
        cause,
    })?;

    yup_oauth2::parse_application_secret(content).map_err(|e| BackupError::SecretParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Sends the user to the consent page and waits for the loopback redirect.
struct BrowserFlowDelegate;

impl InstalledFlowDelegate for BrowserFlowDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            if need_code {
                return Err("pasting an authorization code is not supported".to_string());
            }
            println!("Open this URL to authorize access to Google Drive:\n{}", url);
            if let Err(e) = webbrowser::open(url) {
                warn!("Could not open a browser: {}", e);
            }
            Ok(String::new())
        })
    }
}

/// Hands out Drive access tokens to the blocking HTTP client.
pub struct Authenticator {
    runtime: Runtime,
    inner: DefaultAuthenticator,
}

impl Authenticator {
    /// Load the client secret, open the token cache and make sure a usable
    /// token exists, running the consent flow if needed.
    pub fn authorize(secret_file: &Path, token_file: &Path) -> Result<Self> {
        let secret = load_client_secret(secret_file)?;

        if let Some(parent) = token_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BackupError::TokenCache {
                path: token_file.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let runtime = Runtime::new()
            .map_err(|e| BackupError::Auth(format!("failed to start auth runtime: {}", e)))?;

        let inner = runtime
            .block_on(
                InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                    .persist_tokens_to_disk(token_file)
                    .flow_delegate(Box::new(BrowserFlowDelegate))
                    .build(),
            )
            .map_err(|e| BackupError::TokenCache {
                path: token_file.to_path_buf(),
                reason: e.to_string(),
            })?;

        let auth = Self { runtime, inner };
        auth.access_token()?;
        info!("Token cache ready at {}", token_file.display());
        Ok(auth)
    }

    /// A currently valid access token, refreshed or re-consented as needed.
    pub fn access_token(&self) -> Result<String> {
        let token = self
            .runtime
            .block_on(self.inner.token(&[DRIVE_SCOPE]))
            .map_err(|e| BackupError::Auth(e.to_string()))?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| BackupError::Auth("token response carried no access token".to_string()))
    }
}
