//! Session and cloud-mode resolution.
//!
//! A remote account row plus a bearer token in the OS keychain make up a
//! session. When either is missing the tracker runs local-only: mutations
//! still enqueue for later replay, but no drain is attempted.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::services::remote_client::RemoteClientConfig;
use keyring::Entry;
use serde::Serialize;
use sqlx::FromRow;

/// Service name used in the keychain.
const SERVICE_NAME: &str = "refdesk";

/// Configured remote account. The token itself lives in the keychain.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RemoteAccount {
    pub id: i64,
    pub base_url: String,
    pub account_name: Option<String>,
    pub created_at: i64,
}

/// Get the configured remote account, if any.
pub async fn get_account(pool: &DbPool) -> Result<Option<RemoteAccount>, AppError> {
    let account = sqlx::query_as::<_, RemoteAccount>(
        "SELECT id, base_url, account_name, created_at FROM remote_accounts ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(account)
}

/// Configure the remote account and store its token in the keychain.
pub async fn configure_account(
    pool: &DbPool,
    base_url: &str,
    account_name: Option<&str>,
    token: &str,
) -> Result<RemoteAccount, AppError> {
    TokenStore::store_token(base_url, token)?;

    let account = sqlx::query_as::<_, RemoteAccount>(
        r#"
        INSERT INTO remote_accounts (base_url, account_name)
        VALUES (?, ?)
        ON CONFLICT(base_url) DO UPDATE SET account_name = excluded.account_name
        RETURNING id, base_url, account_name, created_at
        "#,
    )
    .bind(base_url)
    .bind(account_name)
    .fetch_one(pool)
    .await?;

    Ok(account)
}

/// Remove the remote account and its keychain token, returning the
/// tracker to local-only mode.
pub async fn remove_account(pool: &DbPool) -> Result<(), AppError> {
    if let Some(account) = get_account(pool).await? {
        TokenStore::delete_token(&account.base_url)?;

        sqlx::query("DELETE FROM remote_accounts WHERE id = ?")
            .bind(account.id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Resolve the remote client configuration for the current session.
///
/// Returns `None` when no account is configured or its token is missing -
/// the local-only state in which the sync engine is a no-op.
pub async fn cloud_credentials(pool: &DbPool) -> Result<Option<RemoteClientConfig>, AppError> {
    let Some(account) = get_account(pool).await? else {
        return Ok(None);
    };

    match TokenStore::get_token(&account.base_url) {
        Ok(token) => Ok(Some(RemoteClientConfig {
            base_url: account.base_url,
            token,
            timeout_secs: 30,
        })),
        Err(AppError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether cloud sync applies at all for this session.
pub async fn is_cloud_enabled(pool: &DbPool) -> Result<bool, AppError> {
    Ok(cloud_credentials(pool).await?.is_some())
}

/// Keychain-backed token storage.
pub struct TokenStore;

impl TokenStore {
    /// Store a token for a sync service.
    pub fn store_token(base_url: &str, token: &str) -> Result<(), AppError> {
        let entry = Self::get_entry(base_url)?;

        entry
            .set_password(token)
            .map_err(|e| AppError::credential_storage(format!("Failed to store token: {}", e)))
    }

    /// Retrieve the token for a sync service.
    pub fn get_token(base_url: &str) -> Result<String, AppError> {
        let entry = Self::get_entry(base_url)?;

        entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => AppError::not_found_with_id("credential", base_url),
            _ => AppError::credential_storage(format!("Failed to retrieve token: {}", e)),
        })
    }

    /// Delete the token for a sync service.
    ///
    /// This operation is idempotent - deleting a non-existent token is not an error.
    pub fn delete_token(base_url: &str) -> Result<(), AppError> {
        let entry = Self::get_entry(base_url)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Idempotent: already deleted
            Err(e) => Err(AppError::credential_storage(format!(
                "Failed to delete token: {}",
                e
            ))),
        }
    }

    /// Check if a token exists for a sync service.
    pub fn has_token(base_url: &str) -> Result<bool, AppError> {
        let entry = Self::get_entry(base_url)?;

        match entry.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(AppError::credential_storage(format!(
                "Failed to check token: {}",
                e
            ))),
        }
    }

    /// Create a keyring entry for the given service URL.
    fn get_entry(base_url: &str) -> Result<Entry, AppError> {
        // Normalize the URL to use as the account name
        let account = normalize_url(base_url);

        Entry::new(SERVICE_NAME, &account).map_err(|e| {
            AppError::credential_storage(format!("Failed to create keyring entry: {}", e))
        })
    }
}

/// Normalize a URL for use as an account identifier.
///
/// Removes trailing slashes and converts to lowercase.
fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_lowercase()
}
