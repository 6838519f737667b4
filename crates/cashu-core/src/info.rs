//! Mint information and capability map
//!
//! `/v1/info` tells the wallet who the mint is and which parts of the
//! protocol it speaks: issue/melt methods with their limits, feature flags,
//! which responses it caches, and which endpoints require auth.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::Amount;
use crate::keys::PublicKey;
use crate::proofs::{CurrencyUnit, PaymentMethod};

/// Mint info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    /// Name of the mint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pubkey of the mint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<PublicKey>,
    /// Implementation name and version, "name/version"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<MintVersion>,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Long description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_long: Option<String>,
    /// Ways to contact the operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<Contact>>,
    /// Supported protocol features
    #[serde(default)]
    pub nuts: Nuts,
    /// Url of the mint's icon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Message of the day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
    /// Server unix time at the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Url of the terms of service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_url: Option<String>,
}

impl MintInfo {
    /// Seconds cached responses stay valid, when caching is enabled
    pub fn cache_ttl(&self) -> Option<u64> {
        self.nuts.nut19.as_ref().and_then(|settings| settings.ttl)
    }

    /// Whether the mint replays `method path` from its cache
    pub fn is_cached_endpoint(&self, method: HttpMethod, path: &str) -> bool {
        self.nuts
            .nut19
            .as_ref()
            .map(|settings| {
                settings
                    .cached_endpoints
                    .iter()
                    .any(|endpoint| endpoint.method == method && endpoint.path == path)
            })
            .unwrap_or(false)
    }

    /// Auth the mint requires for `method path`, if any
    pub fn auth_required(&self, method: HttpMethod, path: &str) -> Option<AuthRequired> {
        let matches = |endpoints: &[ProtectedEndpoint]| {
            endpoints
                .iter()
                .any(|endpoint| endpoint.method == method && endpoint.path == path)
        };

        if let Some(blind) = &self.nuts.nut22 {
            if matches(&blind.protected_endpoints) {
                return Some(AuthRequired::Blind);
            }
        }

        if let Some(clear) = &self.nuts.nut21 {
            if matches(&clear.protected_endpoints) {
                return Some(AuthRequired::Clear);
            }
        }

        None
    }
}

/// Implementation name and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintVersion {
    /// Implementation name
    pub name: String,
    /// Version
    pub version: String,
}

impl Serialize for MintVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}/{}", self.name, self.version))
    }
}

impl<'de> Deserialize<'de> for MintVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let combined = String::deserialize(deserializer)?;
        let (name, version) = combined
            .split_once('/')
            .ok_or_else(|| serde::de::Error::custom("Expected `name/version`"))?;
        Ok(MintVersion {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Contact method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact method, e.g. "email" or "nostr"
    pub method: String,
    /// Address under that method
    pub info: String,
}

/// The capability map, keyed by NUT number on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nuts {
    /// Issue (mint) methods and limits
    #[serde(default, rename = "4")]
    pub nut04: IssueSettings,
    /// Melt methods and limits
    #[serde(default, rename = "5")]
    pub nut05: MeltSettings,
    /// Proof state checks
    #[serde(default, rename = "7")]
    pub nut07: SupportedSettings,
    /// Melt fee return
    #[serde(default, rename = "8")]
    pub nut08: SupportedSettings,
    /// Restore
    #[serde(default, rename = "9")]
    pub nut09: SupportedSettings,
    /// Spending conditions
    #[serde(default, rename = "10")]
    pub nut10: SupportedSettings,
    /// P2PK
    #[serde(default, rename = "11")]
    pub nut11: SupportedSettings,
    /// DLEQ proofs on signatures
    #[serde(default, rename = "12")]
    pub nut12: SupportedSettings,
    /// HTLC
    #[serde(default, rename = "14")]
    pub nut14: SupportedSettings,
    /// Multi-path payments
    #[serde(default, rename = "15", skip_serializing_if = "Option::is_none")]
    pub nut15: Option<MppSettings>,
    /// Quote signatures
    #[serde(default, rename = "20")]
    pub nut20: SupportedSettings,
    /// Cached responses
    #[serde(default, rename = "19", skip_serializing_if = "Option::is_none")]
    pub nut19: Option<CacheSettings>,
    /// Clear auth
    #[serde(default, rename = "21", skip_serializing_if = "Option::is_none")]
    pub nut21: Option<ClearAuthSettings>,
    /// Blind auth
    #[serde(default, rename = "22", skip_serializing_if = "Option::is_none")]
    pub nut22: Option<BlindAuthSettings>,
}

/// A flag feature: supported or not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedSettings {
    /// Whether the mint supports the feature
    pub supported: bool,
}

/// Settings for issuing ecash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSettings {
    /// Supported method/unit pairs
    pub methods: Vec<IssueMethodSettings>,
    /// Whether issuing is currently disabled
    #[serde(default)]
    pub disabled: bool,
}

/// One issue method/unit pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMethodSettings {
    /// Payment method
    pub method: PaymentMethod,
    /// Unit
    pub unit: CurrencyUnit,
    /// Smallest amount the mint will issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Amount>,
    /// Largest amount the mint will issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Amount>,
    /// Whether an invoice description can be requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<bool>,
}

/// Settings for melting ecash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltSettings {
    /// Supported method/unit pairs
    pub methods: Vec<MeltMethodSettings>,
    /// Whether melting is currently disabled
    #[serde(default)]
    pub disabled: bool,
}

/// One melt method/unit pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltMethodSettings {
    /// Payment method
    pub method: PaymentMethod,
    /// Unit
    pub unit: CurrencyUnit,
    /// Smallest amount the mint will pay out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Amount>,
    /// Largest amount the mint will pay out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Amount>,
}

/// Multi-path payment settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MppSettings {
    /// Method/unit pairs partial payments are accepted for
    pub methods: Vec<MppMethodSettings>,
}

/// One MPP method/unit pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MppMethodSettings {
    /// Payment method
    pub method: PaymentMethod,
    /// Unit
    pub unit: CurrencyUnit,
}

/// Response-cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds cached responses stay valid; none means indefinitely
    pub ttl: Option<u64>,
    /// Endpoints the mint replays from cache
    #[serde(default)]
    pub cached_endpoints: Vec<CachedEndpoint>,
}

/// One cached endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachedEndpoint {
    /// HTTP method
    pub method: HttpMethod,
    /// Route path, e.g. `/v1/swap`
    pub path: String,
}

/// HTTP method in capability declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(()),
        }
    }
}

/// Which auth scheme an endpoint demands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthRequired {
    /// `Clear-auth` header with an OIDC bearer token
    Clear,
    /// One blind auth token in the `Blind-auth` header
    Blind,
}

/// An endpoint behind auth
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtectedEndpoint {
    /// HTTP method
    pub method: HttpMethod,
    /// Route path
    pub path: String,
}

/// Clear-auth (OIDC) settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearAuthSettings {
    /// OIDC discovery document url
    pub openid_discovery: String,
    /// Client id to authenticate as
    pub client_id: String,
    /// Endpoints requiring a clear auth token
    #[serde(default)]
    pub protected_endpoints: Vec<ProtectedEndpoint>,
}

/// Blind-auth settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindAuthSettings {
    /// Max blind auth tokens per mint request
    pub bat_max_mint: u64,
    /// Endpoints requiring a blind auth token
    #[serde(default)]
    pub protected_endpoints: Vec<ProtectedEndpoint>,
}
