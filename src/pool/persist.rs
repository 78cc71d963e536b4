//! Atomic on-disk persistence for the account pool.
//!
//! Writes are write-temp-then-rename so a crash mid-write never corrupts
//! the live file; unknown JSON fields round-trip via each type's
//! `#[serde(flatten)] extra` map.

use std::path::Path;

use tokio::fs;

use super::AccountConfig;

pub async fn load(path: &Path) -> anyhow::Result<AccountConfig> {
    match fs::read(path).await {
        Ok(bytes) => {
            if bytes.is_empty() {
                return Ok(AccountConfig::default());
            }
            Ok(serde_json::from_slice(&bytes)?)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AccountConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn save(path: &Path, config: &AccountConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec_pretty(config)?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::path::PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Account, AccountSource};

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let config = load(&path).await.unwrap();
        assert!(config.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let mut config = AccountConfig::default();
        config.accounts.push(Account::new(
            "a@x.com",
            AccountSource::OAuth {
                refresh_token: "rt".into(),
            },
        ));
        config.active_index = 0;

        save(&path, &config).await.unwrap();
        let loaded = load(&path).await.unwrap();

        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.accounts[0].email, "a@x.com");
    }

    #[tokio::test]
    async fn test_unknown_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let raw = serde_json::json!({
            "accounts": [{
                "email": "a@x.com",
                "source": { "kind": "api_key", "api_key": "k" },
                "added_at": 1,
                "futureField": "keep-me"
            }],
            "active_index": 0,
            "settings": { "cooldown_duration_ms": 5000, "max_wait_before_error_ms": 120000, "unknownSetting": true }
        });
        fs::write(&path, serde_json::to_vec(&raw).unwrap())
            .await
            .unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(
            loaded.accounts[0].extra.get("futureField").unwrap(),
            "keep-me"
        );
        assert_eq!(
            loaded.settings.extra.get("unknownSetting").unwrap(),
            &serde_json::Value::Bool(true)
        );

        save(&path, &loaded).await.unwrap();
        let reloaded = load(&path).await.unwrap();
        assert_eq!(
            reloaded.accounts[0].extra.get("futureField").unwrap(),
            "keep-me"
        );
    }

    #[tokio::test]
    async fn test_tmp_file_cleaned_up_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        save(&path, &AccountConfig::default()).await.unwrap();

        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());
    }
}
