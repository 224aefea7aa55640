//! Validated text primitives shared by the ambulatorio crates.
//!
//! Free text in patient and record forms arrives as raw strings. The wrappers here
//! make the two constraints the domain cares about explicit in the type:
//! - [`NonEmptyText`]: at least one non-whitespace character (names, mandatory notes)
//! - [`BoundedText`]: at most `MAX` characters, never truncated

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input text is longer than the permitted number of characters
    #[error("Text exceeds {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction,
/// so `"  Rossi "` is stored as `"Rossi"` and `"   "` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Builds a `NonEmptyText` from optional input, treating blank text as absent.
    pub fn from_optional(input: Option<impl AsRef<str>>) -> Option<Self> {
        input.and_then(|s| Self::new(s).ok())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A string of at most `MAX` characters.
///
/// Length is measured in Unicode scalar values, not bytes. Over-long input is
/// rejected, never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundedText<const MAX: usize>(String);

impl<const MAX: usize> BoundedText<MAX> {
    /// Creates a new `BoundedText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::TooLong`] if the input has more than `MAX` characters.
    pub fn new(input: impl Into<String>) -> Result<Self, TextError> {
        let value = input.into();
        let actual = value.chars().count();
        if actual > MAX {
            return Err(TextError::TooLong { max: MAX, actual });
        }
        Ok(Self(value))
    }

    pub const fn max_len() -> usize {
        MAX
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const MAX: usize> std::fmt::Display for BoundedText<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const MAX: usize> AsRef<str> for BoundedText<MAX> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<const MAX: usize> serde::Serialize for BoundedText<MAX> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de, const MAX: usize> serde::Deserialize<'de> for BoundedText<MAX> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BoundedText::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        let name = NonEmptyText::new("  Rossi ").expect("valid name");
        assert_eq!(name.as_str(), "Rossi");
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
        assert_eq!(NonEmptyText::new(""), Err(TextError::Empty));
    }

    #[test]
    fn from_optional_treats_blank_as_absent() {
        assert!(NonEmptyText::from_optional(None::<&str>).is_none());
        assert!(NonEmptyText::from_optional(Some("  ")).is_none());
        assert_eq!(
            NonEmptyText::from_optional(Some(" vene difficili ")).map(|t| t.into_inner()),
            Some("vene difficili".to_string())
        );
    }

    #[test]
    fn bounded_text_counts_characters_not_bytes() {
        // Six characters, eight bytes.
        let note = BoundedText::<6>::new("àèìòù1").expect("six chars fit");
        assert_eq!(note.as_str(), "àèìòù1");
        assert_eq!(BoundedText::<6>::max_len(), 6);
    }

    #[test]
    fn bounded_text_rejects_instead_of_truncating() {
        let err = BoundedText::<6>::new("1234567").expect_err("seven chars is too long");
        assert_eq!(err, TextError::TooLong { max: 6, actual: 7 });
    }

    #[test]
    fn deserialize_enforces_constraints() {
        let ok: BoundedText<6> = serde_json::from_str("\"2 cm\"").expect("fits");
        assert_eq!(ok.as_str(), "2 cm");
        assert!(serde_json::from_str::<BoundedText<6>>("\"too long\"").is_err());
        assert!(serde_json::from_str::<NonEmptyText>("\"  \"").is_err());
    }
}
