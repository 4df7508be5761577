//! The `deviceId::signalName` composite key used to identify a signal.

use std::fmt;

/// A signal's canonical string key: `deviceId + "::" + signalName`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SignalKey(String);

impl SignalKey {
    pub fn new(device_id: &str, signal_name: &str) -> Self {
        Self(format!("{device_id}::{signal_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into `(deviceId, signalName)`. Returns `None` if the key was not
    /// constructed via [`SignalKey::new`] and lacks the `::` separator.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once("::")
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SignalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_back_into_parts() {
        let key = SignalKey::new("SYS/DEV-1", "IN:S1");
        assert_eq!(key.split(), Some(("SYS/DEV-1", "IN:S1")));
        assert_eq!(key.as_str(), "SYS/DEV-1::IN:S1");
    }
}
