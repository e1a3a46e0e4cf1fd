/// Byte separating the name from the rest of a bucket key.
pub(crate) const NAME_TERMINATOR: u8 = 0;

/// A statistic series' name, e.g. `alert.type.accident`.
///
/// Must be non-empty and must not contain a NUL byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Debug)]
pub struct StatName<'a>(&'a str);

impl std::fmt::Display for StatName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> TryFrom<&'a str> for StatName<'a> {
    type Error = crate::Error;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(crate::Error::InvalidArgument("statistic name is empty"))
        } else if value.bytes().any(|b| b == NAME_TERMINATOR) {
            Err(crate::Error::InvalidArgument(
                "statistic name contains a NUL byte",
            ))
        } else {
            Ok(Self(value))
        }
    }
}

impl<'a> std::ops::Deref for StatName<'a> {
    type Target = &'a str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for StatName<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
