use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "archivist";

/// Keychain account the archive secret key is filed under
const ARCHIVE_SECRET_ACCOUNT: &str = "archive-secret-key";

/// Archive secret storage in the OS keychain
pub struct CredentialStore;

impl CredentialStore {
    pub fn store_archive_secret(secret: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, ARCHIVE_SECRET_ACCOUNT)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(secret)
            .context("Failed to store archive secret in keychain")?;
        Ok(())
    }

    /// The stored secret, or `None` if there is none or the keychain is unavailable
    pub fn archive_secret() -> Option<String> {
        Entry::new(SERVICE_NAME, ARCHIVE_SECRET_ACCOUNT)
            .ok()?
            .get_password()
            .ok()
    }

    pub fn delete_archive_secret() -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, ARCHIVE_SECRET_ACCOUNT)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete archive secret from keychain")?;
        Ok(())
    }
}
