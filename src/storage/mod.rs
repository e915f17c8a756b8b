//! Persistent configuration stores.
//!
//! Two named stores live side by side under the base directory:
//!
//! ```text
//! ~/.volair/
//! ├── config.db          server / LLM credentials, seeded from ENV_KEYS
//! └── client_config.db   client-local settings, not seeded
//! ```
//!
//! [`Stores::open`] is called once at startup; the stores are then passed by
//! reference to whatever needs them and closed with [`Stores::close`].

mod config_store;

use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::AppError;

pub use config_store::ConfigStore;

pub const SERVER_STORE_NAME: &str = "config.db";
pub const CLIENT_STORE_NAME: &str = "client_config.db";

/// Environment variables copied into the server store at startup.
pub const ENV_KEYS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_VERSION",
    "AZURE_OPENAI_API_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_REGION",
    "DEEPSEEK_API_KEY",
];

/// Open `name` under `base_dir` and seed it from the environment.
pub fn create_initialized(base_dir: &Path, name: &str, keys: &[&str]) -> Result<ConfigStore, AppError> {
    let store = ConfigStore::open(base_dir, name)?;
    store.initialize_keys(keys)?;
    Ok(store)
}

/// The application's pair of stores.
#[derive(Debug)]
pub struct Stores {
    /// Credentials and agent memory (`config.db`).
    pub server: ConfigStore,
    /// Client-local settings (`client_config.db`).
    pub client: ConfigStore,
}

impl Stores {
    /// Open both stores under `base_dir`, seeding the server store from [`ENV_KEYS`].
    pub fn open(base_dir: &Path) -> Result<Self, AppError> {
        Self::open_named(base_dir, SERVER_STORE_NAME, CLIENT_STORE_NAME, ENV_KEYS)
    }

    /// Open with explicit file names. The names must differ: the two stores
    /// never share a backing file.
    pub fn open_named(
        base_dir: &Path,
        server_name: &str,
        client_name: &str,
        server_keys: &[&str],
    ) -> Result<Self, AppError> {
        if normalize(&base_dir.join(server_name)) == normalize(&base_dir.join(client_name)) {
            return Err(AppError::Config(format!(
                "server and client stores must use different files ('{server_name}', '{client_name}')"
            )));
        }
        let server = create_initialized(base_dir, server_name, server_keys)?;
        let client = create_initialized(base_dir, client_name, &[])?;
        info!(base_dir = %base_dir.display(), "config stores ready");
        Ok(Self { server, client })
    }

    /// Close both stores. Reports the first failure but still attempts both.
    pub fn close(self) -> Result<(), AppError> {
        let server = self.server.close();
        let client = self.client.close();
        server.and(client)
    }
}

/// Lexically resolve `.` and `..` so equivalent spellings compare equal.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn open_creates_both_files() {
        let tmp = TempDir::new().unwrap();
        let stores = Stores::open_named(tmp.path(), "a.db", "b.db", &[]).unwrap();
        assert!(tmp.path().join("a.db").exists());
        assert!(tmp.path().join("b.db").exists());
        assert_ne!(stores.server.path(), stores.client.path());
        stores.close().unwrap();
    }

    #[test]
    fn same_key_does_not_leak_between_stores() {
        let tmp = TempDir::new().unwrap();
        let stores = Stores::open_named(tmp.path(), "a.db", "b.db", &[]).unwrap();
        stores.server.set("TOKEN", "server-secret").unwrap();
        assert_eq!(stores.client.get("TOKEN").unwrap(), None);

        stores.client.set("TOKEN", &json!(false)).unwrap();
        assert_eq!(stores.server.get("TOKEN").unwrap(), Some(json!("server-secret")));
        assert_eq!(stores.client.get("TOKEN").unwrap(), Some(json!(false)));
    }

    #[test]
    fn shared_file_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Stores::open_named(tmp.path(), "same.db", "same.db", &[]).unwrap_err();
        assert!(err.to_string().contains("different files"));
    }

    #[test]
    fn equivalent_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        for (server, client) in [
            ("config.db", "./config.db"),
            ("config.db", "sub/../config.db"),
        ] {
            let err = Stores::open_named(tmp.path(), server, client, &[]).unwrap_err();
            assert!(err.to_string().contains("different files"), "{server} vs {client}");
        }
        assert!(!tmp.path().join("config.db").exists());
    }

    #[test]
    fn normalize_drops_dot_components() {
        assert_eq!(normalize(Path::new("/a/./b/../c.db")), PathBuf::from("/a/c.db"));
        assert_eq!(normalize(Path::new("../x.db")), PathBuf::from("../x.db"));
    }

    #[test]
    fn env_keys_cover_all_providers() {
        assert_eq!(ENV_KEYS.len(), 9);
        assert!(ENV_KEYS.contains(&"DEEPSEEK_API_KEY"));
        assert!(ENV_KEYS.contains(&"AZURE_OPENAI_ENDPOINT"));
    }
}
