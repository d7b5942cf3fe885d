use std::borrow::Cow;

use bytes::Bytes;

/// A utf-8 string backed by [`Bytes`], so text frames can be sliced
/// into event names and argument fragments without copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Str(Bytes);

impl Str {
    /// Slice the string by calling [`Bytes::slice`] on the inner bytes.
    ///
    /// # Panics
    /// Panics if the range is out of bounds or if either end does not fall on a
    /// char boundary, like indexing a [`str`] would.
    pub fn slice(&self, range: impl std::ops::RangeBounds<usize>) -> Self {
        use std::ops::Bound;
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.0.len(),
        };
        let s = self.as_str();
        assert!(
            s.is_char_boundary(start) && s.is_char_boundary(end),
            "byte range {start}..{end} is not on a char boundary of {s:?}"
        );
        Str(self.0.slice(start..end))
    }
    /// Return a &str representation of the string
    pub fn as_str(&self) -> &str {
        // SAFETY: every constructor checks or guarantees utf-8
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }
    /// Return a &[u8] representation of the string
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    /// Copy a borrowed str into a new [`Str`]
    pub fn copy_from_slice(s: &str) -> Self {
        Str(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl std::ops::Deref for Str {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl std::borrow::Borrow<str> for Str {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}
impl From<&'static str> for Str {
    fn from(s: &'static str) -> Self {
        Str(Bytes::from_static(s.as_bytes()))
    }
}
impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Bytes::from(s.into_bytes()))
    }
}
impl From<Cow<'static, str>> for Str {
    fn from(s: Cow<'static, str>) -> Self {
        match s {
            Cow::Borrowed(s) => Str::from(s),
            Cow::Owned(s) => Str::from(s),
        }
    }
}
impl TryFrom<Bytes> for Str {
    type Error = std::str::Utf8Error;
    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        std::str::from_utf8(&bytes)?;
        Ok(Str(bytes))
    }
}
impl From<Str> for Bytes {
    fn from(s: Str) -> Self {
        s.0
    }
}
impl From<Str> for String {
    fn from(s: Str) -> Self {
        s.as_str().to_owned()
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
impl PartialEq<Str> for &str {
    fn eq(&self, other: &Str) -> bool {
        *self == other.as_str()
    }
}

impl serde::Serialize for Str {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
impl<'de> serde::Deserialize<'de> for Str {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Str::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_keeps_utf8_view() {
        let s = Str::from("42[\"héllo\"]");
        assert_eq!(s.slice(2..), "[\"héllo\"]");
        assert_eq!(s.slice(..2).as_bytes(), b"42");
        assert_eq!(s.slice(4..=6), "hé");
    }

    #[test]
    #[should_panic(expected = "char boundary")]
    fn slice_inside_a_char_panics() {
        let s = Str::from("héllo");
        // 'é' spans bytes 1..3
        let _ = s.slice(0..2);
    }

    #[test]
    #[should_panic]
    fn slice_out_of_bounds_panics() {
        let _ = Str::from("42").slice(1..8);
    }

    #[test]
    fn try_from_rejects_invalid_utf8() {
        assert!(Str::try_from(Bytes::from_static(&[0xff, 0xfe])).is_err());
        assert_eq!(Str::try_from(Bytes::from_static(b"2")).unwrap(), "2");
    }
}
