pub mod archive;
pub mod cascade;
pub mod embedded;
pub mod fallback;
pub mod property_list;
pub mod sniff;
pub mod text;
pub mod xml;

pub use archive::{MatchPass, ResolvedEntry, normalize_archive_entry_path, resolve_archive};
pub use cascade::{
    ParseAttempt, ParseInput, ParseOutcome, ParseStrategy, ParserCascade, strategy_order,
};
pub use embedded::find_plist_fragment;
pub use fallback::FALLBACK_PARSER_ID;
pub use sniff::{ByteProfile, SNIFF_WINDOW, Sniffed, sniff, sniff_content};
