pub mod certificate;
pub mod mapping;
pub mod redact;

pub use certificate::{
    CERT_HASH_PREFIX, CertificateHandler, INFO_SUFFIX, Material, OBFUSCATED_PLACEHOLDER,
    TRUNCATED_PLACEHOLDER, detect_certificate, display_value, handle_certificates, inspect,
};
pub use mapping::{MappedProfile, MappingSource, eap_method_name, map_profile};
pub use redact::{
    REDACTED_MARKER, RedactionReport, Redactor, carries_marker, redact, transform_value,
};
