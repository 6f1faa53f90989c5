// Credential resolution and the local credentials file.
//
// Precedence: in-process override > `BING_WEBMASTER_API_KEY` > file.

use crate::error::{BwmError, Result};
use crate::output::Record;
use crate::paths::API_KEY_ENV_VAR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// An API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        ApiKey(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `abcd...wxyz` for long keys, all `*` otherwise.
    pub fn masked(&self) -> String {
        mask_key(&self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Override,
    Env,
    Local,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeySource::Override => "override",
            KeySource::Env => "env",
            KeySource::Local => "local",
        })
    }
}

/// Result of `whoami`: where the key comes from, never the key itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub source: KeySource,
    pub api_key_masked: String,
    pub env_var: String,
    pub credentials_path: String,
    pub local_key_present: bool,
}

impl Record for AuthStatus {
    const COLUMNS: &'static [&'static str] = &[
        "source",
        "apiKeyMasked",
        "envVar",
        "credentialsPath",
        "localKeyPresent",
    ];
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    api_key: String,
}

/// Resolves the active API key and manages the credentials file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    env_key: Option<String>,
    override_key: Option<String>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, env_key: Option<String>) -> Self {
        CredentialStore {
            path: path.into(),
            env_key: env_key.filter(|k| !k.trim().is_empty()),
            override_key: None,
        }
    }

    /// Inject a key that beats every other source.
    pub fn with_override(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.override_key = Some(key).filter(|k| !k.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The key to use for API calls, with the source it came from.
    pub fn resolve(&self) -> Result<(ApiKey, KeySource)> {
        if let Some(key) = &self.override_key {
            return Ok((ApiKey::new(key.trim()), KeySource::Override));
        }
        if let Some(key) = &self.env_key {
            return Ok((ApiKey::new(key.trim()), KeySource::Env));
        }
        match self.load_stored()? {
            Some(key) => Ok((key, KeySource::Local)),
            None => Err(BwmError::NotAuthenticated),
        }
    }

    /// Persist `key` to the credentials file, readable only by the owner.
    pub fn login(&self, key: &str) -> Result<PathBuf> {
        let value = key.trim();
        if value.is_empty() {
            return Err(BwmError::validation("API key cannot be empty"));
        }

        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }
        let body = serde_json::to_string_pretty(&StoredCredentials {
            api_key: value.to_string(),
        })
        .map_err(|e| BwmError::config(format!("Failed to encode credentials: {e}")))?;

        write_private_file(&self.path, format!("{body}\n").as_bytes()).map_err(|e| {
            BwmError::config(format!(
                "Failed to write credentials file {}: {e}",
                self.path.display()
            ))
        })?;
        info!(path = %self.path.display(), "stored API key");
        Ok(self.path.clone())
    }

    /// Describe the active source. Fails with `NotAuthenticated` when none.
    pub fn whoami(&self) -> Result<AuthStatus> {
        let (key, source) = self.resolve()?;
        Ok(AuthStatus {
            source,
            api_key_masked: key.masked(),
            env_var: API_KEY_ENV_VAR.to_string(),
            credentials_path: self.path.display().to_string(),
            local_key_present: self.path.is_file(),
        })
    }

    /// Remove the credentials file. Returns whether anything was deleted.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "removed stored API key");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BwmError::config(format!(
                "Failed to remove credentials file {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn load_stored(&self) -> Result<Option<ApiKey>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BwmError::config(format!(
                    "Failed to read credentials file {}: {e}",
                    self.path.display()
                )))
            }
        };

        let payload: serde_json::Value = serde_json::from_str(&raw).map_err(|_| {
            BwmError::config(format!(
                "Stored credentials are invalid JSON: {}",
                self.path.display()
            ))
        })?;
        let value = payload
            .get("api_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BwmError::config(format!(
                    "Stored credentials are missing 'api_key': {}",
                    self.path.display()
                ))
            })?
            .trim();
        if value.is_empty() {
            return Err(BwmError::config(format!(
                "Stored API key is empty: {}",
                self.path.display()
            )));
        }
        Ok(Some(ApiKey::new(value)))
    }
}

fn mask_key(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| {
        BwmError::config(format!("Failed to create directory {}: {e}", dir.display()))
    })
}

fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // mode() only applies on creation; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, env_key: Option<&str>) -> CredentialStore {
        CredentialStore::new(
            dir.path().join("bwm").join("credentials.json"),
            env_key.map(str::to_string),
        )
    }

    #[test]
    fn login_then_resolve_uses_local_file() {
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, None);
        let path = creds.login("  abc123 ").unwrap();
        assert!(path.exists());

        let (key, source) = creds.resolve().unwrap();
        assert_eq!(key.expose(), "abc123");
        assert_eq!(source, KeySource::Local);
    }

    #[test]
    fn env_beats_file_and_override_beats_env() {
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, Some("env-key"));
        creds.login("local-key").unwrap();

        let (key, source) = creds.resolve().unwrap();
        assert_eq!((key.expose(), source), ("env-key", KeySource::Env));

        let creds = creds.with_override("override-key");
        let (key, source) = creds.resolve().unwrap();
        assert_eq!((key.expose(), source), ("override-key", KeySource::Override));
    }

    #[test]
    fn missing_everywhere_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir, None).resolve().unwrap_err();
        assert!(matches!(err, BwmError::NotAuthenticated));
    }

    #[test]
    fn clear_then_whoami_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, None);
        creds.login("abc").unwrap();
        assert!(creds.clear().unwrap());
        assert!(!creds.path().exists());
        assert!(!creds.clear().unwrap());
        assert!(matches!(creds.whoami(), Err(BwmError::NotAuthenticated)));
    }

    #[test]
    fn whoami_masks_the_key() {
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, None);
        creds.login("0123456789").unwrap();
        let status = creds.whoami().unwrap();
        assert_eq!(status.source, KeySource::Local);
        assert_eq!(status.api_key_masked, "0123...6789");
        assert!(status.local_key_present);

        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn corrupt_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, None);
        fs::create_dir_all(creds.path().parent().unwrap()).unwrap();

        fs::write(creds.path(), "not-json").unwrap();
        let err = creds.resolve().unwrap_err();
        assert!(matches!(&err, BwmError::Config(m) if m.contains("invalid JSON")));

        fs::write(creds.path(), r#"{"token": "x"}"#).unwrap();
        let err = creds.resolve().unwrap_err();
        assert!(matches!(&err, BwmError::Config(m) if m.contains("missing 'api_key'")));
    }

    #[test]
    fn empty_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir, None).login("   "),
            Err(BwmError::Validation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn credentials_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let creds = store(&dir, None);
        creds.login("abc").unwrap();
        let mode = fs::metadata(creds.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_output_hides_the_key() {
        let key = ApiKey::new("super-secret");
        assert!(!format!("{key:?}").contains("super-secret"));
    }
}
