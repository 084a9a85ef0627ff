//! At-rest encryption for account tokens
//!
//! Tokens are encrypted with age to the server's X25519 identity and stored
//! as base64 text. The identity comes from `[security] token_key` or
//! `PAGECAST_TOKEN_KEY`.

use age::secrecy::ExposeSecret as _;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::SecretString;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::error::{PagecastError, Result};

pub struct TokenCipher {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("recipient", &self.recipient.to_string())
            .finish()
    }
}

impl TokenCipher {
    /// Build from an `AGE-SECRET-KEY-1...` string
    pub fn from_key(key: &str) -> Result<Self> {
        let identity = age::x25519::Identity::from_str(key.trim())
            .map_err(|e| PagecastError::Crypto(format!("Invalid token key: {}", e)))?;
        let recipient = identity.to_public();

        Ok(Self {
            identity,
            recipient,
        })
    }

    /// Generate a fresh secret key in its string encoding
    pub fn generate_key() -> String {
        age::x25519::Identity::generate()
            .to_string()
            .expose_secret()
            .to_string()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let recipients: Vec<Box<dyn age::Recipient + Send>> = vec![Box::new(self.recipient.clone())];
        let encryptor = age::Encryptor::with_recipients(recipients)
            .ok_or_else(|| PagecastError::Crypto("No recipients for encryption".to_string()))?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| PagecastError::Crypto(e.to_string()))?;

        writer
            .write_all(plaintext.as_bytes())
            .map_err(|e| PagecastError::Crypto(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| PagecastError::Crypto(e.to_string()))?;

        Ok(STANDARD.encode(encrypted))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        let data = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| PagecastError::Crypto(format!("Invalid token encoding: {}", e)))?;

        let decryptor = match age::Decryptor::new(&data[..]) {
            Ok(age::Decryptor::Recipients(d)) => d,
            Ok(_) => {
                return Err(PagecastError::Crypto(
                    "Invalid encryption format (expected recipients)".to_string(),
                ))
            }
            Err(e) => return Err(PagecastError::Crypto(e.to_string())),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| PagecastError::Crypto(e.to_string()))?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| PagecastError::Crypto(e.to_string()))?;

        let plaintext = String::from_utf8(decrypted)
            .map_err(|e| PagecastError::Crypto(format!("Invalid UTF-8: {}", e)))?;

        Ok(SecretString::from(plaintext))
    }
}
