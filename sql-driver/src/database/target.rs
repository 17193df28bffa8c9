//! Connection targets

use crate::database::traits::DriverError;
use std::fmt;
use url::Url;

/// A URL-style connection address with query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    url: Url,
}

impl ConnectionTarget {
    pub fn parse(address: &str) -> Result<Self, DriverError> {
        Ok(Self {
            url: Url::parse(address)?,
        })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of a query parameter, if present
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    /// A copy of this target with `key` set to `value`
    ///
    /// Existing occurrences of `key` are replaced in place; otherwise the
    /// parameter is appended. All other parameters keep their order.
    pub fn with_parameter(&self, key: &str, value: &str) -> Self {
        let mut pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        let mut replaced = false;
        pairs.retain_mut(|(name, existing)| {
            if name != key {
                return true;
            }
            if replaced {
                return false;
            }
            *existing = value.to_string();
            replaced = true;
            true
        });
        if !replaced {
            pairs.push((key.to_string(), value.to_string()));
        }

        let mut url = self.url.clone();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        Self { url }
    }

    /// The address with its password masked, for logging
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            // Only fails for URLs that cannot carry credentials in the first place
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.redacted())
    }
}
