//! Identifier types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Width of the uid range reserved for each tenant.
///
/// A hosted app's effective uid inside a tenant is
/// `tenant * PER_TENANT_UID_RANGE + app_id`.
pub const PER_TENANT_UID_RANGE: u32 = 100_000;

/// Identifier of an isolation boundary (a virtual user profile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(u32);

impl TenantId {
    /// The primary tenant.
    pub const OWNER: Self = Self(0);

    /// Wrap a raw tenant number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw tenant number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Effective uid of an app inside this tenant.
    ///
    /// Only the app-id part of `app_uid` is kept. Returns `None` if the
    /// result does not fit in a `u32`.
    #[must_use]
    pub fn uid_for(self, app_uid: u32) -> Option<u32> {
        let app_id = app_uid.checked_rem(PER_TENANT_UID_RANGE)?;
        self.0
            .checked_mul(PER_TENANT_UID_RANGE)?
            .checked_add(app_id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant:{}", self.0)
    }
}

impl From<u32> for TenantId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Stable `(package, class)` identity of a service component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName {
    package: String,
    class: String,
}

impl ComponentName {
    /// Create a component name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidComponent`] if either part is empty or
    /// contains a `/` or whitespace.
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> CoreResult<Self> {
        let package = package.into();
        let class = class.into();
        Self::validate_part("package", &package)?;
        Self::validate_part("class", &class)?;
        Ok(Self { package, class })
    }

    /// Owning package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Fully qualified class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Short form: `pkg/.Suffix` when the class lives in the package
    /// namespace, `pkg/class` otherwise.
    #[must_use]
    pub fn short_string(&self) -> String {
        match self.class.strip_prefix(self.package.as_str()) {
            Some(rest) if rest.starts_with('.') => format!("{}/{rest}", self.package),
            _ => self.to_string(),
        }
    }

    fn validate_part(what: &str, part: &str) -> CoreResult<()> {
        if part.is_empty() {
            return Err(CoreError::InvalidComponent(format!("{what} must not be empty")));
        }
        if part.contains('/') || part.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidComponent(format!(
                "{what} must not contain '/' or whitespace, got: {part}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

impl FromStr for ComponentName {
    type Err = CoreError;

    /// Parses `pkg/class` or the short form `pkg/.Suffix`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (package, class) = s
            .split_once('/')
            .ok_or_else(|| CoreError::InvalidComponent(format!("missing '/' in: {s}")))?;
        if class.starts_with('.') {
            Self::new(package, format!("{package}{class}"))
        } else {
            Self::new(package, class)
        }
    }
}

impl Serialize for ComponentName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ComponentName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a client connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Per-component start counter value.
///
/// `StartId::ZERO` means "no start outstanding"; allocated ids begin at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StartId(u32);

impl StartId {
    /// The reset value of a component's start counter.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw start id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id following this one, or `None` on overflow.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for StartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StartId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Which start a stop request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTarget {
    /// Whatever start is current when the stop is evaluated.
    Latest,
    /// A specific start id; stale ids are refused.
    Id(StartId),
}

/// Stop the most recent start.
pub const SENTINEL_LAST: StopTarget = StopTarget::Latest;

impl From<StartId> for StopTarget {
    fn from(id: StartId) -> Self {
        Self::Id(id)
    }
}

/// Flags supplied by a client when binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindFlags(u32);

impl BindFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Create the service if it is not running.
    pub const AUTO_CREATE: Self = Self(0x0001);
    /// Bound for debugging only.
    pub const DEBUG_UNBIND: Self = Self(0x0002);
    /// Do not raise the service's scheduling priority.
    pub const NOT_FOREGROUND: Self = Self(0x0004);

    /// Wrap raw flag bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}
