//! Record identifiers.

use std::str::FromStr;

/// Identifier for a queued e-mail record.
///
/// A ULID: globally unique, lexicographically sortable by creation time,
/// and safe to use as a filename. Records created later always sort after
/// records created earlier, which is what gives the selector its FIFO
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmailId(ulid::Ulid);

impl EmailId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    /// The creation timestamp encoded in the identifier, in milliseconds
    /// since the Unix epoch.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Parse an identifier from a stored filename like
    /// `01ARZ3NDEKTSV4RRFFQ69G5FAV.bin`.
    ///
    /// Rejects path separators and traversal patterns so a hostile filename
    /// in the store directory can never escape it.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".bin")?;

        ulid::Ulid::from_string(stem).ok().map(Self)
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EmailId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

impl serde::Serialize for EmailId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EmailId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ulid::Ulid::from_string(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_parsing_validates_input() {
        assert!(EmailId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_some());

        // Security: traversal and separators are rejected outright.
        assert!(EmailId::from_filename("../etc/passwd.bin").is_none());
        assert!(EmailId::from_filename("foo/bar.bin").is_none());
        assert!(EmailId::from_filename("..\\system32.bin").is_none());

        // Format: only valid ULIDs with the .bin extension are accepted.
        assert!(EmailId::from_filename("not_a_ulid.bin").is_none());
        assert!(EmailId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.eml").is_none());
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let earlier = EmailId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = EmailId::generate();

        assert!(earlier < later);
    }
}
