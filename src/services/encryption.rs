use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

/// Derives the per-application encryption key from the master key.
/// Keys are bound to the application id so a leaked key only exposes
/// one application's documents.
pub fn derive_application_key(master_key: &[u8], application_id: Uuid) -> Result<[u8; 32]> {
    if master_key.len() != 32 {
        anyhow::bail!("Master key must be exactly 32 bytes");
    }

    let hk = Hkdf::<Sha256>::new(None, master_key);
    let info = format!("murattal-kys-application-{}", application_id);
    let mut app_key = [0u8; 32];
    hk.expand(info.as_bytes(), &mut app_key)
        .map_err(|_| anyhow::anyhow!("Failed to derive application key"))?;

    Ok(app_key)
}

/// Parses the hex-encoded master key from config into 32 raw bytes.
pub fn parse_master_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key).context("DOCUMENT_MASTER_KEY must be hex")?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("DOCUMENT_MASTER_KEY must decode to 32 bytes"))?;
    Ok(key)
}

/// Encrypts a document with AES-256-GCM.
/// Returns (ciphertext, iv, authentication_tag); the 12-byte IV is random
/// per file and the 16-byte tag is split off the ciphertext.
pub fn encrypt_document(plaintext: &[u8], key: &[u8; 32]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    let mut iv = vec![0u8; 12];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    // aes-gcm appends the 16-byte authentication tag to the ciphertext
    let tag_start = ciphertext.len().saturating_sub(16);
    let encrypted_data = ciphertext[..tag_start].to_vec();
    let tag = ciphertext[tag_start..].to_vec();

    Ok((encrypted_data, iv, tag))
}

/// Decrypts an AES-256-GCM encrypted document, verifying authenticity.
pub fn decrypt_document(ciphertext: &[u8], iv: &[u8], tag: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if iv.len() != 12 {
        anyhow::bail!("IV must be exactly 12 bytes");
    }
    if tag.len() != 16 {
        anyhow::bail!("Authentication tag must be exactly 16 bytes");
    }

    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;
    let nonce = Nonce::from_slice(iv);

    // Recombine ciphertext + tag for aes-gcm
    let mut combined = ciphertext.to_vec();
    combined.extend_from_slice(tag);

    let plaintext = cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|e| anyhow::anyhow!("Decryption failed (data may be corrupted or tampered): {}", e))?;

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_application_key() {
        let master_key = [0u8; 32];
        let app1 = Uuid::new_v4();
        let app2 = Uuid::new_v4();
        let key1 = derive_application_key(&master_key, app1).unwrap();
        let key2 = derive_application_key(&master_key, app2).unwrap();
        let key1_again = derive_application_key(&master_key, app1).unwrap();

        // Derivation must be deterministic
        assert_eq!(key1, key1_again);
        // Different applications must get different keys
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_parse_master_key() {
        let hex_key = "00".repeat(32);
        assert!(parse_master_key(&hex_key).is_ok());
        assert!(parse_master_key("deadbeef").is_err());
        assert!(parse_master_key("not hex at all").is_err());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = [42u8; 32];
        let plaintext = b"School Registration Certificate, PDF bytes.";

        let (ciphertext, iv, tag) = encrypt_document(plaintext, &key).unwrap();

        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = decrypt_document(&ciphertext, &iv, &tag, &key).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let key = [42u8; 32];
        let wrong_key = [99u8; 32];
        let plaintext = b"Tax Clearance Certificate";

        let (ciphertext, iv, tag) = encrypt_document(plaintext, &key).unwrap();

        let result = decrypt_document(&ciphertext, &iv, &tag, &wrong_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_with_tampered_data() {
        let key = [42u8; 32];
        let plaintext = b"Principal's CV";

        let (mut ciphertext, iv, tag) = encrypt_document(plaintext, &key).unwrap();

        if !ciphertext.is_empty() {
            ciphertext[0] ^= 1;
        }

        // Authentication tag must no longer verify
        let result = decrypt_document(&ciphertext, &iv, &tag, &key);
        assert!(result.is_err());
    }
}
