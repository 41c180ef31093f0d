use std::{
    fmt::{self, Display},
    ops::{Deref, DerefMut},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when splitting a mailbox string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is missing the '@' separator: {0}")]
    MissingSeparator(String),

    #[error("address has an empty local part: {0}")]
    EmptyLocalPart(String),

    #[error("address has an empty domain: {0}")]
    EmptyDomain(String),
}

/// A mailbox address, pre-split into local part and domain.
///
/// Addresses reach the delivery core already parsed; this type only
/// guarantees the `local@domain` shape, it does not validate the
/// message content they came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    local: String,
    domain: String,
}

impl Address {
    /// The part before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local
    }

    /// The destination domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((local, domain)) = value.rsplit_once('@') else {
            return Err(AddressError::MissingSeparator(value.to_string()));
        };
        if local.is_empty() {
            return Err(AddressError::EmptyLocalPart(value.to_string()));
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain(value.to_string()));
        }

        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }
}

/// An ordered list of recipient addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressList(pub Vec<Address>);

impl Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            Display::fmt(addr, f)?;
        }
        Ok(())
    }
}

impl From<Vec<Address>> for AddressList {
    fn from(value: Vec<Address>) -> Self {
        Self(value)
    }
}

impl Deref for AddressList {
    type Target = Vec<Address>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AddressList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
