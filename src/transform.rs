//! Field transform engine.
//!
//! Sensitive fields are stored encrypted under `<field>_encrypted`. On write
//! the plaintext attribute is replaced by its ciphertext; on read the
//! ciphertext attribute is replaced by the decrypted value. All fields of one
//! item are transformed concurrently, and the first failure aborts the call.

use futures::future::try_join_all;
use serde_json::Value;

use crate::encryption::FieldCipher;
use crate::errors::{CipherError, TransformError};
use crate::serialization::Attributes;

/// Suffix of the attribute holding a field's ciphertext.
pub const ENCRYPTED_SUFFIX: &str = "_encrypted";

/// Attribute name holding the ciphertext of `field`.
pub fn ciphertext_key(field: &str) -> String {
    format!("{}{}", field, ENCRYPTED_SUFFIX)
}

/// Falsy values (null, false, zero, empty string) are never encrypted.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Sensitive fields that `attrs` sets to a falsy value. Their plaintext is
/// written as is, so any stored ciphertext must be dropped.
pub fn cleared_fields<'a>(
    fields: &'a [String],
    attrs: &'a Attributes,
) -> impl Iterator<Item = &'a String> + 'a {
    fields
        .iter()
        .filter(move |field| attrs.get(*field).is_some_and(|v| !is_truthy(v)))
}

/// Encrypt the sensitive fields of `attrs`, returning a transformed copy.
pub async fn encrypt_fields(
    cipher: &dyn FieldCipher,
    fields: &[String],
    attrs: &Attributes,
) -> Result<Attributes, TransformError> {
    let pending = fields
        .iter()
        .filter_map(|field| attrs.get(field).filter(|v| is_truthy(v)).map(|v| (field, v)));

    let encrypted = try_join_all(pending.map(|(field, value)| async move {
        let plaintext = serde_json::to_string(value).map_err(|source| TransformError::Encode {
            field: field.clone(),
            source,
        })?;
        let ciphertext = cipher
            .encrypt(&plaintext)
            .await
            .map_err(|source| TransformError::Encrypt {
                field: field.clone(),
                source,
            })?;
        Ok::<_, TransformError>((field, ciphertext))
    }))
    .await?;

    let mut out = attrs.clone();
    for (field, ciphertext) in encrypted {
        out.remove(field);
        out.insert(ciphertext_key(field), Value::String(ciphertext));
    }
    Ok(out)
}

/// Decrypt the sensitive fields of `attrs` in place of their ciphertext.
///
/// A field without a ciphertext attribute stays absent.
pub async fn decrypt_fields(
    cipher: &dyn FieldCipher,
    fields: &[String],
    mut attrs: Attributes,
) -> Result<Attributes, TransformError> {
    let pending = fields.iter().filter_map(|field| {
        attrs
            .get(&ciphertext_key(field))
            .map(|ciphertext| (field, ciphertext))
    });

    let decrypted = try_join_all(pending.map(|(field, ciphertext)| async move {
        let ciphertext = ciphertext.as_str().ok_or_else(|| TransformError::Decrypt {
            field: field.clone(),
            source: CipherError::InvalidFormat("ciphertext is not a string".to_string()),
        })?;
        let plaintext = cipher
            .decrypt(ciphertext)
            .await
            .map_err(|source| TransformError::Decrypt {
                field: field.clone(),
                source,
            })?;
        let value: Value = serde_json::from_str(&plaintext).map_err(|source| {
            TransformError::Decode {
                field: field.clone(),
                source,
            }
        })?;
        Ok::<_, TransformError>((field.clone(), value))
    }))
    .await?;

    for (field, value) in decrypted {
        attrs.remove(&ciphertext_key(&field));
        attrs.insert(field, value);
    }
    Ok(attrs)
}
