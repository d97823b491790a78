pub mod alert;
pub mod artifact;
pub mod certificate;
pub mod config;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod policy;
pub mod result;
pub mod tree;

pub use alert::{Alert, AlertKind, Severity};
pub use artifact::{FileKind, ParseError, ParseErrorCode};
pub use certificate::{CertificateMetadata, CertificateSource, ExtractionLevel, MaterialKind};
pub use config::{ArchiveLimits, CascadeLimits, DEFAULT_RETENTION, RetrySchedule};
pub use error::{ConvertError, Result};
pub use hashing::{hash_upload_digest, sha256_digest, sha256_reference, upload_nonce};
pub use ids::{Digest32, RulesId, UploadDigest, encode_hex};
pub use policy::{CertificateDisplayPolicy, FieldTransformPolicy, UnknownPolicy};
pub use result::{ConversionRequest, ConversionResult, RawUpload, extension_of};
pub use tree::{
    ParseTree, TreeMap, insert_grouped, leaf_count, push_path_segment, tree_kind_name,
};
