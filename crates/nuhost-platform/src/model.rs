//! Identity of hosts, services and their build metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const INSTANCE_SEPARATOR: &str = "_IN";

/// One process among a fleet of identically named hosts, written `name_INk`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceHostInstanceName {
    host_name: String,
    instance_index: u32,
}

/// Errors raised while parsing a [`ServiceHostInstanceName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelParseError {
    /// The `_IN` separator was missing.
    #[error("instance name '{input}' must have the form 'name_IN<index>'")]
    MissingInstanceIndex {
        /// Offending input.
        input: String,
    },
    /// The host name part was empty.
    #[error("instance name '{input}' has an empty host name")]
    EmptyHostName {
        /// Offending input.
        input: String,
    },
    /// The index part was not a non-negative integer.
    #[error("instance name '{input}' has an invalid index")]
    InvalidIndex {
        /// Offending input.
        input: String,
    },
}

impl ServiceHostInstanceName {
    /// Builds an instance name from its parts.
    #[must_use]
    pub fn new(host_name: impl Into<String>, instance_index: u32) -> Self {
        Self {
            host_name: host_name.into(),
            instance_index,
        }
    }

    /// Parses `name_INk`. The last `_IN` separates the index.
    ///
    /// # Errors
    ///
    /// Returns [`ModelParseError`] when the separator, host name or index is
    /// missing or malformed.
    pub fn parse(input: &str) -> Result<Self, ModelParseError> {
        let Some((host_name, index)) = input.rsplit_once(INSTANCE_SEPARATOR) else {
            return Err(ModelParseError::MissingInstanceIndex {
                input: input.to_owned(),
            });
        };
        if host_name.is_empty() {
            return Err(ModelParseError::EmptyHostName {
                input: input.to_owned(),
            });
        }
        let instance_index = index
            .parse::<u32>()
            .map_err(|_| ModelParseError::InvalidIndex {
                input: input.to_owned(),
            })?;
        Ok(Self::new(host_name, instance_index))
    }

    /// Host name part.
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Instance index part.
    #[must_use]
    pub const fn instance_index(&self) -> u32 {
        self.instance_index
    }
}

impl fmt::Display for ServiceHostInstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{INSTANCE_SEPARATOR}{}",
            self.host_name, self.instance_index
        )
    }
}

impl FromStr for ServiceHostInstanceName {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServiceHostInstanceName {
    type Error = ModelParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceHostInstanceName> for String {
    fn from(value: ServiceHostInstanceName) -> Self {
        value.to_string()
    }
}

/// Describes the machine a host runs on. Created once per host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHostDescription {
    instance_name: ServiceHostInstanceName,
    machine_name: String,
}

impl ServiceHostDescription {
    /// Builds a description.
    #[must_use]
    pub fn new(instance_name: ServiceHostInstanceName, machine_name: impl Into<String>) -> Self {
        Self {
            instance_name,
            machine_name: machine_name.into(),
        }
    }

    /// Describes a local development host: `nuget-local-0-<host>_IN<index>`.
    #[must_use]
    pub fn local(host_name: &str, instance_index: u32) -> Self {
        Self::new(
            ServiceHostInstanceName::new(format!("nuget-local-0-{host_name}"), instance_index),
            machine_name(),
        )
    }

    /// Instance name of the host.
    #[must_use]
    pub const fn instance_name(&self) -> &ServiceHostInstanceName {
        &self.instance_name
    }

    /// Machine the host runs on.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }
}

fn machine_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| "localhost".to_owned())
}

/// Uniquely identifies a running service inside a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName {
    instance: ServiceHostInstanceName,
    name: String,
}

impl ServiceName {
    /// Builds a service name.
    #[must_use]
    pub fn new(instance: ServiceHostInstanceName, name: impl Into<String>) -> Self {
        Self {
            instance,
            name: name.into(),
        }
    }

    /// Host instance the service belongs to.
    #[must_use]
    pub const fn instance(&self) -> &ServiceHostInstanceName {
        &self.instance
    }

    /// Service name without the host part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instance, self.name)
    }
}

/// Version metadata reported for a service or the platform itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Semantic version.
    pub version: String,
    /// Source branch the build came from.
    pub branch: String,
    /// Source commit the build came from.
    pub commit: String,
    /// RFC 3339 UTC build timestamp.
    pub build_date_utc: String,
}

impl BuildInfo {
    /// Metadata of this platform build.
    #[must_use]
    pub fn platform() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            branch: env!("NUHOST_BUILD_BRANCH").to_owned(),
            commit: env!("NUHOST_BUILD_COMMIT").to_owned(),
            build_date_utc: env!("NUHOST_BUILD_DATE").to_owned(),
        }
    }
}
