//! Field encryption provider.
//!
//! [`FieldCipher`] is the boundary the field transform engine encrypts and
//! decrypts through. [`KmsEncryptor`] implements it with AWS KMS, so
//! sensitive data like SSNs or card numbers is encrypted per field rather
//! than only at the table level.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{map_kms_error, CipherError};

/// Prefix for encrypted values to detect them on read.
const ENCRYPTED_PREFIX: &str = "ENC:";

/// Reversible text transformation applied to sensitive fields.
#[async_trait]
pub trait FieldCipher: Send + Sync {
    /// Encrypt `plaintext` into printable ciphertext.
    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Reverse [`FieldCipher::encrypt`].
    async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// KMS encryptor for field-level encryption.
#[derive(Clone)]
pub struct KmsEncryptor {
    client: KmsClient,
    key_id: String,
    context: HashMap<String, String>,
}

impl fmt::Debug for KmsEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsEncryptor")
            .field("key_id", &self.key_id)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl KmsEncryptor {
    /// Create a new KMS encryptor.
    ///
    /// # Arguments
    ///
    /// * `key_id` - KMS key ID, ARN, or alias
    /// * `region` - AWS region (uses the default chain if not set)
    /// * `context` - Encryption context bound to every ciphertext
    pub async fn new(
        key_id: impl Into<String>,
        region: Option<String>,
        context: Option<HashMap<String, String>>,
    ) -> Self {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(r) = region {
            config_loader = config_loader.region(aws_config::Region::new(r));
        }
        let config = config_loader.load().await;

        Self::from_client(KmsClient::new(&config), key_id, context)
    }

    /// Wrap an existing KMS client.
    pub fn from_client(
        client: KmsClient,
        key_id: impl Into<String>,
        context: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            client,
            key_id: key_id.into(),
            context: context.unwrap_or_default(),
        }
    }

    /// Check if a value carries the encryption prefix.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl FieldCipher for KmsEncryptor {
    /// Returns base64 ciphertext with the `ENC:` prefix.
    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut req = self
            .client
            .encrypt()
            .key_id(&self.key_id)
            .plaintext(Blob::new(plaintext.as_bytes()));

        for (k, v) in &self.context {
            req = req.encryption_context(k, v);
        }

        let output = req.send().await.map_err(map_kms_error)?;
        let blob = output
            .ciphertext_blob()
            .ok_or(CipherError::MissingCiphertext)?;
        Ok(format!("{}{}", ENCRYPTED_PREFIX, BASE64.encode(blob.as_ref())))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let encoded = ciphertext.strip_prefix(ENCRYPTED_PREFIX).ok_or_else(|| {
            CipherError::InvalidFormat("ciphertext must start with 'ENC:' prefix".to_string())
        })?;

        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| CipherError::InvalidFormat(format!("invalid base64: {}", e)))?;

        let mut req = self.client.decrypt().ciphertext_blob(Blob::new(decoded));

        for (k, v) in &self.context {
            req = req.encryption_context(k, v);
        }

        let output = req.send().await.map_err(map_kms_error)?;
        let blob = output.plaintext().ok_or(CipherError::MissingPlaintext)?;
        String::from_utf8(blob.as_ref().to_vec())
            .map_err(|e| CipherError::InvalidFormat(format!("invalid UTF-8: {}", e)))
    }
}
