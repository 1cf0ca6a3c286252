//! # Rendered Output Scanner
//!
//! Last line of defence before manifests are handed back to Argo CD: a rendered
//! `Secret` must never carry ciphertext.
//!
//! Documents are decoded leniently. Anything that does not look like a
//! Kubernetes object is skipped, and a `data` value that is not valid base64 is
//! examined as-is rather than dropping the whole document.

use crate::decrypt::detect::starts_with_ciphertext_marker;
use crate::error::{PluginError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderedObject {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<RenderedMetadata>,
    #[serde(default)]
    data: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default)]
    string_data: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderedMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Error if any rendered `Secret` has a `data` or `stringData` value that is
/// still ciphertext
pub fn check_secrets(rendered: &[u8]) -> Result<()> {
    let rendered = String::from_utf8_lossy(rendered);

    for doc in split_documents(&rendered) {
        let object: RenderedObject = match serde_yaml::from_str(doc) {
            Ok(object) => object,
            Err(e) => {
                debug!(error = %e, "skipping undecodable document");
                continue;
            }
        };
        if object.kind.as_deref() != Some("Secret") {
            continue;
        }

        let subject = secret_subject(object.metadata.as_ref());

        for (key, value) in object.data.iter().flatten() {
            let Some(encoded) = value.as_str() else {
                continue;
            };
            let compact: String = encoded.split_whitespace().collect();
            let decoded = general_purpose::STANDARD
                .decode(compact.as_bytes())
                .unwrap_or_else(|_| encoded.as_bytes().to_vec());
            if starts_with_ciphertext_marker(&decoded) {
                return Err(PluginError::ContentSafety {
                    subject,
                    key: key.clone(),
                });
            }
        }

        for (key, value) in object.string_data.iter().flatten() {
            if value
                .as_str()
                .is_some_and(|v| starts_with_ciphertext_marker(v.as_bytes()))
            {
                return Err(PluginError::ContentSafety {
                    subject,
                    key: key.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Split a multi-document YAML stream on `---` separator lines
fn split_documents(stream: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in stream.split_inclusive('\n') {
        if line.trim_end() == "---" {
            docs.push(&stream[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&stream[start..]);

    docs.into_iter().filter(|d| !d.trim().is_empty()).collect()
}

fn secret_subject(metadata: Option<&RenderedMetadata>) -> String {
    let name = metadata.and_then(|m| m.name.as_deref()).unwrap_or("<unnamed>");
    match metadata.and_then(|m| m.namespace.as_deref()) {
        Some(namespace) => format!("rendered Secret {namespace}/{name}"),
        None => format!("rendered Secret {name}"),
    }
}
