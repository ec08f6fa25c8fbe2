//! Service credential bootstrap.
//!
//! The credential file is the sole idempotence signal: when it exists it is
//! returned verbatim and no account is created. Otherwise a fresh random
//! account is created with the bootstrap credential, persisted, and then
//! elevated to server admin.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

use provsync_api::{AdminApi, ApiError, NewUser};
use provsync_core::ServiceCredential;

/// Random bytes in a generated password (hex-encoded, so twice as many chars).
const PASSWORD_BYTES: usize = 24;

/// Errors that abort credential resolution. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to access credential file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("credential file {} is corrupt: {source}", .path.display())]
    Corrupt { path: PathBuf, source: serde_json::Error },

    #[error("failed to encode credential for {}: {source}", .path.display())]
    Encode { path: PathBuf, source: serde_json::Error },

    #[error("failed to create service account: {0}")]
    CreateUser(#[source] ApiError),

    #[error("failed to grant server admin to account {user_id}: {source}")]
    Elevate { user_id: i64, source: ApiError },
}

/// JSON file holding the persisted [`ServiceCredential`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credential; `None` when the file does not exist.
    pub fn load(&self) -> Result<Option<ServiceCredential>, IdentityError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IdentityError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| IdentityError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Atomically write `credential` (temp file + rename), creating the directory if needed.
    pub fn save(&self, credential: &ServiceCredential) -> Result<(), IdentityError> {
        let io_err = |source| IdentityError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("serviceaccount.json");
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let json = serde_json::to_string_pretty(credential).map_err(|source| IdentityError::Encode {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&tmp_path, json).map_err(io_err)?;
        restrict_permissions(&tmp_path).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// A fresh, unguessable account: UUIDv4-derived login/email and an OS-random password.
pub fn generate_candidate() -> ServiceCredential {
    let id = Uuid::new_v4().simple().to_string();
    let mut secret = [0u8; PASSWORD_BYTES];
    OsRng.fill_bytes(&mut secret);
    ServiceCredential {
        email: format!("{id}@provsync"),
        login: format!("provsync-{id}"),
        password: hex::encode(secret),
    }
}

/// Resolves the daemon's service credential, creating it on first run.
pub struct IdentityProvisioner<'a, A: ?Sized> {
    api: &'a A,
    store: CredentialStore,
}

impl<'a, A> IdentityProvisioner<'a, A>
where
    A: AdminApi + ?Sized,
{
    pub fn new(api: &'a A, store: CredentialStore) -> Self {
        Self { api, store }
    }

    pub async fn resolve_credential(&self) -> Result<ServiceCredential, IdentityError> {
        if let Some(credential) = self.store.load()? {
            info!(
                login = %credential.login,
                path = %self.store.path().display(),
                "service account already exists, reading from file"
            );
            return Ok(credential);
        }

        let candidate = generate_candidate();
        info!(login = %candidate.login, "creating service account");
        let created = self
            .api
            .create_user(&NewUser::from(&candidate))
            .await
            .map_err(IdentityError::CreateUser)?;

        // Persist before elevation so a crash here never leads to a second account.
        self.store.save(&candidate)?;
        info!(path = %self.store.path().display(), "wrote service account file");

        self.api
            .grant_server_admin(created.id)
            .await
            .map_err(|source| IdentityError::Elevate {
                user_id: created.id,
                source,
            })?;
        info!(login = %candidate.login, user_id = created.id, "granted server admin");

        Ok(candidate)
    }
}
