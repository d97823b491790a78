use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSource {
    Pem,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Certificate,
    PrivateKey,
    Other,
}

/// How much of the metadata was actually resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionLevel {
    X509,
    Heuristic,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateMetadata {
    pub kind: MaterialKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub source_format: CertificateSource,
    pub size_bytes: usize,
    pub extraction: ExtractionLevel,
}

impl CertificateMetadata {
    pub fn minimal(
        kind: MaterialKind,
        source_format: CertificateSource,
        fingerprint: String,
        size_bytes: usize,
    ) -> Self {
        Self {
            kind,
            subject: None,
            issuer: None,
            not_before: None,
            not_after: None,
            fingerprint,
            serial_number: None,
            source_format,
            size_bytes,
            extraction: ExtractionLevel::Minimal,
        }
    }

    /// Common name out of an RFC 4514 style subject, if there is one.
    pub fn subject_common_name(&self) -> Option<&str> {
        let subject = self.subject.as_deref()?;
        subject.split([',', '/']).find_map(|part| {
            let part = part.trim();
            part.strip_prefix("CN=")
                .or_else(|| part.strip_prefix("cn="))
                .map(str::trim)
                .filter(|cn| !cn.is_empty())
        })
    }

    pub fn to_tree(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
