use crate::constants::crypto::{IV_SIZE, KEY_SIZE, TAG_SIZE};
use crate::errors::TaskError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.len() == KEY_SIZE * 2 {
        return hex::decode(trimmed).ok();
    }
    if trimmed.len() == KEY_SIZE {
        return Some(trimmed.as_bytes().to_vec());
    }
    if trimmed.len() > KEY_SIZE * 2 {
        let engine = base64::engine::general_purpose::STANDARD;
        return engine.decode(trimmed.as_bytes()).ok();
    }
    None
}

fn resolve_key_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("KEYWARDEN_KEY_FILE") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".keywarden").join("secret.key")
}

/// Symmetric cipher for stored platform/key secrets. Payloads are
/// `<iv_hex>:<tag_hex>:<data_hex>` over AES-256-GCM.
#[derive(Clone)]
pub struct Security {
    cipher: Aes256Gcm,
}

impl Security {
    pub fn new() -> Result<Self, TaskError> {
        let key_path = resolve_key_file_path();
        let secret_key = Self::load_or_create_secret(&key_path)?;
        if secret_key.len() != KEY_SIZE {
            return Err(TaskError::internal(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_SIZE,
                secret_key.len()
            )));
        }
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&secret_key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn from_key(secret_key: &[u8; KEY_SIZE]) -> Self {
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(secret_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    fn load_or_create_secret(path: &PathBuf) -> Result<Vec<u8>, TaskError> {
        if let Ok(raw) = std::env::var("KEYWARDEN_ENCRYPTION_KEY") {
            if let Some(decoded) = decode_key(&raw) {
                return Ok(decoded);
            }
        }

        if path.exists() {
            if let Ok(stored) = fs::read_to_string(path) {
                if let Some(decoded) = decode_key(&stored) {
                    return Ok(decoded);
                }
            }
        }

        let mut generated = vec![0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut generated);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(mut file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
        {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
            }
            let _ = file.write_all(hex::encode(&generated).as_bytes());
        }
        Ok(generated)
    }

    pub fn encrypt(&self, text: &str) -> Result<String, TaskError> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, text.as_bytes())
            .map_err(|_| TaskError::internal("Failed to encrypt secret payload"))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(TaskError::internal("Failed to encrypt secret payload"));
        }
        let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, payload: &str) -> Result<String, TaskError> {
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() != 3 {
            return Err(TaskError::decryption("Invalid encrypted payload format")
                .with_hint("Expected format: \"<iv_hex>:<tag_hex>:<data_hex>\"."));
        }
        let iv = hex::decode(parts[0])
            .map_err(|_| TaskError::decryption("Invalid encrypted payload format"))?;
        let tag = hex::decode(parts[1])
            .map_err(|_| TaskError::decryption("Invalid encrypted payload format"))?;
        let data = hex::decode(parts[2])
            .map_err(|_| TaskError::decryption("Invalid encrypted payload format"))?;
        if iv.len() != IV_SIZE {
            return Err(TaskError::decryption("Invalid nonce length"));
        }
        if tag.len() != TAG_SIZE {
            return Err(TaskError::decryption("Invalid auth tag length"));
        }
        let mut combined = Vec::with_capacity(data.len() + tag.len());
        combined.extend_from_slice(&data);
        combined.extend_from_slice(&tag);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let decrypted = self.cipher.decrypt(nonce, combined.as_ref()).map_err(|_| {
            TaskError::decryption("Failed to decrypt secret payload").with_hint(
                "Ensure KEYWARDEN_ENCRYPTION_KEY (or the persisted key file) matches the key used to encrypt stored secrets.",
            )
        })?;
        Ok(String::from_utf8_lossy(&decrypted).to_string())
    }
}
