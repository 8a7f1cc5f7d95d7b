mod common;
use common::ENV_LOCK;

use keywarden::services::security::Security;

fn security() -> Security {
    Security::from_key(&[42u8; 32])
}

#[test]
fn roundtrip_preserves_plain_strings() {
    let security = security();
    let encrypted = security.encrypt("my secret password").expect("encrypt");
    assert_ne!(encrypted, "my secret password");
    assert_eq!(security.decrypt(&encrypted).expect("decrypt"), "my secret password");
}

#[test]
fn roundtrip_preserves_empty_string() {
    let security = security();
    let encrypted = security.encrypt("").expect("encrypt");
    assert_eq!(security.decrypt(&encrypted).expect("decrypt"), "");
}

#[test]
fn roundtrip_preserves_multibyte_unicode() {
    let security = security();
    let original = "Hello 世界 🔐";
    let encrypted = security.encrypt(original).expect("encrypt");
    assert_eq!(security.decrypt(&encrypted).expect("decrypt"), original);
}

#[test]
fn same_input_produces_different_ciphertexts() {
    let security = security();
    let first = security.encrypt("test data").expect("encrypt");
    let second = security.encrypt("test data").expect("encrypt");
    assert_ne!(first, second, "nonce must vary per encryption");
    assert_eq!(security.decrypt(&first).expect("decrypt"), "test data");
    assert_eq!(security.decrypt(&second).expect("decrypt"), "test data");
}

#[test]
fn malformed_payload_is_a_decryption_error() {
    let security = security();
    let err = security.decrypt("invalid encrypted data").unwrap_err();
    assert_eq!(err.code, "DECRYPTION");

    let err = security.decrypt("zz:zz:zz").unwrap_err();
    assert_eq!(err.code, "DECRYPTION");
}

#[test]
fn foreign_key_ciphertext_is_a_decryption_error() {
    let encrypted = Security::from_key(&[1u8; 32])
        .encrypt("secret")
        .expect("encrypt");
    let err = Security::from_key(&[2u8; 32]).decrypt(&encrypted).unwrap_err();
    assert_eq!(err.code, "DECRYPTION");
}

#[tokio::test]
async fn key_from_env_matches_from_key() {
    let _guard = ENV_LOCK.lock().await;

    let key = [9u8; 32];
    std::env::set_var("KEYWARDEN_ENCRYPTION_KEY", hex::encode(key));
    let from_env = Security::new().expect("security from env");
    std::env::remove_var("KEYWARDEN_ENCRYPTION_KEY");

    let encrypted = Security::from_key(&key).encrypt("shared").expect("encrypt");
    assert_eq!(from_env.decrypt(&encrypted).expect("decrypt"), "shared");
}
