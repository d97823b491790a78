use core::fmt;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    Alert, CertificateDisplayPolicy, CertificateMetadata, FieldTransformPolicy, FileKind,
    ParseTree,
};

#[derive(Clone)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: Option<String>,
    pub extension: Option<String>,
}

impl RawUpload {
    pub fn new(bytes: Vec<u8>, original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        let extension = extension_of(&original_name);
        Self {
            bytes,
            original_name,
            mime_type: None,
            extension,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for RawUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawUpload")
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("extension", &self.extension)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Lowercased extension without the dot, `None` for names without one.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub token: String,
    pub field_policy: FieldTransformPolicy,
    pub certificate_policy: CertificateDisplayPolicy,
    pub stream_id: Option<String>,
    pub include_mapping: bool,
}

impl ConversionRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            field_policy: FieldTransformPolicy::default(),
            certificate_policy: CertificateDisplayPolicy::default(),
            stream_id: None,
            include_mapping: false,
        }
    }

    pub fn with_policies(
        mut self,
        field_policy: FieldTransformPolicy,
        certificate_policy: CertificateDisplayPolicy,
    ) -> Self {
        self.field_policy = field_policy;
        self.certificate_policy = certificate_policy;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub yaml: String,
    pub json: String,
    pub original: String,
    pub certificates: BTreeMap<String, CertificateMetadata>,
    pub alerts: Vec<Alert>,
    pub notes: Vec<String>,
    pub file_kind: FileKind,
    pub parser_id: String,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped: Option<ParseTree>,
}
