pub mod rules;
pub mod rules_id;

pub use rules::{
    DEFAULT_ALLOW, DEFAULT_EXCLUDE, DEFAULT_PATTERNS, FIELD_RULES_SCHEMA_V1, FieldRules,
    RulesError,
};
pub use rules_id::compute_field_rules_id;
