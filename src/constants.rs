//! Common constants used throughout the alidns-sync application

//==============================================================================
// Alibaba Cloud DNS API Constants
//==============================================================================

/// Alibaba Cloud DNS API version used by every RPC action
pub const ALIDNS_API_VERSION: &str = "2015-01-09";

/// Region used when the config does not name one
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// User agent string for outgoing HTTP requests
pub const USER_AGENT: &str = "alidns-sync/1.0";

/// SHA256 of an empty request body (all RPC calls send their parameters in the query string)
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Number of records requested per `DescribeDomainRecords` page
pub const LIST_PAGE_SIZE: u32 = 500;

/// Priority sent on every `AddDomainRecord` call
///
/// The provider weights the default line with this value regardless of what
/// the host section asks for.
pub const ADD_RECORD_PRIORITY: u32 = 1;

/// Routing line used when a record does not name one
pub const DEFAULT_LINE: &str = "default";

//==============================================================================
// Address Discovery Constants
//==============================================================================

/// Discovery endpoint queried when no interface is configured
pub const DEFAULT_IP_API: &str = "http://myip.ipip.net/json";

//==============================================================================
// Timeout and Interval Constants
//==============================================================================

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Minimum HTTP request timeout in seconds
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum HTTP request timeout in seconds
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Default reconciliation interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Minimum reconciliation interval in seconds
pub const MIN_INTERVAL_SECS: u64 = 60;

//==============================================================================
// Config File Constants
//==============================================================================

/// Default configuration directory
pub const DEFAULT_CONFIG_DIR: &str = "/etc/alidns-sync";

/// Config file name inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

//==============================================================================
// Validation Constants
//==============================================================================

/// Maximum DNS name length in characters
pub const MAX_RECORD_NAME_LENGTH: usize = 253;

/// Maximum DNS label length in characters
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum TTL accepted by the provider (one day)
pub const MAX_TTL: u32 = 86_400;

//==============================================================================
// Environment Variable Names
//==============================================================================

/// Environment variable name for the access key id
pub const ENV_ACCESS_KEY_ID: &str = "ALIDNS_ACCESS_KEY_ID";

/// Environment variable name for the access key secret
pub const ENV_ACCESS_KEY_SECRET: &str = "ALIDNS_ACCESS_KEY_SECRET";

/// Environment variable name for the API region
pub const ENV_REGION: &str = "ALIDNS_REGION";
