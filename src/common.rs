use coarsetime::{Duration, UnixTimeStamp};

pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_MAX_HEADER_LENGTH: usize = 8192;
pub const DEFAULT_MAX_DECOMPRESSED_PAYLOAD_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_TIME_TOLERANCE_SECS: u64 = 900;

/// Additional features to enable during verification
#[derive(Clone, Debug)]
pub struct VerificationOptions {
    /// Maximum token length to accept
    pub max_token_length: Option<usize>,

    /// Maximum length of the base64-encoded header
    pub max_header_length: Option<usize>,

    /// Maximum size of a payload once inflated (`zip` = `DEF`)
    pub max_decompressed_payload_length: usize,

    /// Require a specific key identifier to be present
    pub required_key_id: Option<String>,

    /// Time tolerance for validating expiration dates
    pub time_tolerance: Option<Duration>,

    /// Validate time claims against this instant instead of the current time
    pub artificial_time: Option<UnixTimeStamp>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        VerificationOptions {
            max_token_length: Some(DEFAULT_MAX_TOKEN_LENGTH),
            max_header_length: Some(DEFAULT_MAX_HEADER_LENGTH),
            max_decompressed_payload_length: DEFAULT_MAX_DECOMPRESSED_PAYLOAD_LENGTH,
            required_key_id: None,
            time_tolerance: Some(Duration::from_secs(DEFAULT_TIME_TOLERANCE_SECS)),
            artificial_time: None,
        }
    }
}
