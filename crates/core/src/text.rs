//! Text - terminator-padded byte string
//!
//! `Text` stores raw bytes in a [`SharedBuffer<u8>`] and keeps one trailing
//! terminator byte (`0`) whenever it is non-empty:
//!
//! ```text
//! "hello"  ->  [h][e][l][l][o][\0]     size() == 6, length() == 5
//! ""       ->  (no storage)            size() == 0, length() == 0
//! ```
//!
//! Copies share storage copy-on-write like any `SharedBuffer`. Bytes are not
//! interpreted: there is no encoding beyond "sequence of bytes", and
//! `Display` renders them lossily as UTF-8.
//!
//! A terminator byte inside the source of a construction or append becomes a
//! space instead of cutting the text short, so the terminator only ever
//! appears at the end.

use crate::buffer::SharedBuffer;
use crate::error::ErrorCode;
use crate::fatal;
use std::borrow::Cow;
use std::ffi::CStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign};

const TERMINATOR: u8 = 0;
const TERMINATOR_REPLACEMENT: u8 = b' ';

#[inline]
fn sanitize(byte: u8) -> u8 {
    if byte == TERMINATOR {
        TERMINATOR_REPLACEMENT
    } else {
        byte
    }
}

/// Byte string with a trailing terminator. See the [module docs](self).
#[derive(Clone, Default)]
pub struct Text {
    buf: SharedBuffer<u8>,
}

impl Text {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` and terminate them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::new();
        }
        let mut data = Vec::with_capacity(bytes.len() + 1);
        data.extend(bytes.iter().copied().map(sanitize));
        data.push(TERMINATOR);
        Self {
            buf: SharedBuffer::from_vec(data),
        }
    }

    /// Render `args` into a new text. See [`format_text!`](crate::format_text).
    pub fn format(args: fmt::Arguments<'_>) -> Self {
        match args.as_str() {
            Some(s) => Self::from(s),
            None => Self::from(fmt::format(args).as_str()),
        }
    }

    /// Buffer element count, terminator included
    #[inline]
    pub fn size(&self) -> usize {
        self.buf.size()
    }

    /// Number of bytes before the terminator
    #[inline]
    pub fn length(&self) -> usize {
        self.size().saturating_sub(1)
    }

    /// Same as `length`
    #[inline]
    pub fn len(&self) -> usize {
        self.length()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Content bytes, without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        let bytes = self.buf.as_slice();
        &bytes[..bytes.len().saturating_sub(1)]
    }

    /// Same as `as_bytes`
    pub fn get_data(&self) -> &[u8] {
        self.as_bytes()
    }

    /// Content bytes followed by the terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        if self.buf.is_empty() {
            return b"\0";
        }
        self.buf.as_slice()
    }

    pub fn as_c_str(&self) -> &CStr {
        match CStr::from_bytes_until_nul(self.as_bytes_with_nul()) {
            Ok(s) => s,
            Err(_) => fatal!("text of size {} lost its terminator", self.size()),
        }
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Byte at `index`. Out of range (the terminator included) is fatal.
    pub fn get(&self, index: usize) -> u8 {
        crate::index_or_fatal!(index, self.length());
        *self.buf.get(index)
    }

    /// Overwrite the byte at `index`. Out of range is fatal.
    pub fn set(&mut self, index: usize, byte: u8) {
        crate::index_or_fatal!(index, self.length());
        self.buf.set(index, sanitize(byte));
    }

    /// True if both texts alias the same storage
    pub fn ptr_eq(&self, other: &Text) -> bool {
        self.buf.ptr_eq(&other.buf)
    }

    /// Handles aliasing this text's storage (0 for an empty text)
    pub fn refcount(&self) -> u64 {
        self.buf.refcount()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append raw bytes. Appending nothing is a no-op.
    pub fn try_append_bytes(&mut self, bytes: &[u8]) -> Result<(), ErrorCode> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.buf.is_empty() {
            *self = Self::from_bytes(bytes);
            return Ok(());
        }

        // [old][\0] + n  ->  [old][new][\0]
        let old_len = self.length();
        self.buf.extend_from_slice(bytes)?;
        let slice = self.buf.as_mut_slice()?;
        for (dst, src) in slice[old_len..].iter_mut().zip(bytes) {
            *dst = sanitize(*src);
        }
        if let Some(last) = slice.last_mut() {
            *last = TERMINATOR;
        }
        Ok(())
    }

    /// Append another text. An empty receiver aliases `other`'s storage.
    pub fn try_append(&mut self, other: &Text) -> Result<(), ErrorCode> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.buf = other.buf.clone();
            return Ok(());
        }
        self.try_append_bytes(other.as_bytes())
    }

    /// Append one byte (the `+= byte` operator).
    pub fn try_push(&mut self, byte: u8) -> Result<(), ErrorCode> {
        self.try_append_bytes(&[byte])
    }

    /// Append one byte. A failure is reported and the text is left as it was.
    pub fn push(&mut self, byte: u8) {
        let _ = self.try_push(byte);
    }

    /// Append a string. A failure is reported and the text is left as it was.
    pub fn push_str(&mut self, s: &str) {
        let _ = self.try_append_bytes(s.as_bytes());
    }
}

/// Build a [`Text`](crate::text::Text) from format arguments.
///
/// ```ignore
/// let t = format_text!("{} items", 3);
/// assert_eq!(t, "3 items");
/// ```
#[macro_export]
macro_rules! format_text {
    ($($arg:tt)*) => {
        $crate::text::Text::format(format_args!($($arg)*))
    };
}

// =============================================================================
// Conversions
// =============================================================================

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<&String> for Text {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&[u8]> for Text {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Write for Text {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.try_append_bytes(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

// =============================================================================
// Comparison
// =============================================================================

impl PartialEq for Text {
    fn eq(&self, other: &Text) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Text {}

impl PartialOrd for Text {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Text {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for Text {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<Text> for str {
    fn eq(&self, other: &Text) -> bool {
        other == self
    }
}

impl PartialEq<Text> for &str {
    fn eq(&self, other: &Text) -> bool {
        other == *self
    }
}

impl PartialEq<[u8]> for Text {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<u8> for Text {
    /// True only for a one-byte text holding `other`
    fn eq(&self, other: &u8) -> bool {
        self.as_bytes() == [*other]
    }
}

// =============================================================================
// Concatenation
// =============================================================================

impl AddAssign<&Text> for Text {
    fn add_assign(&mut self, rhs: &Text) {
        let _ = self.try_append(rhs);
    }
}

impl AddAssign<&str> for Text {
    fn add_assign(&mut self, rhs: &str) {
        self.push_str(rhs);
    }
}

impl AddAssign<u8> for Text {
    fn add_assign(&mut self, rhs: u8) {
        self.push(rhs);
    }
}

impl Add<&Text> for &Text {
    type Output = Text;

    fn add(self, rhs: &Text) -> Text {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add<&str> for &Text {
    type Output = Text;

    fn add(self, rhs: &str) -> Text {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add<u8> for &Text {
    type Output = Text;

    fn add(self, rhs: u8) -> Text {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add<&str> for Text {
    type Output = Text;

    fn add(mut self, rhs: &str) -> Text {
        self += rhs;
        self
    }
}

impl Add<&Text> for Text {
    type Output = Text;

    fn add(mut self, rhs: &Text) -> Text {
        self += rhs;
        self
    }
}

impl Add<&Text> for &str {
    type Output = Text;

    fn add(self, rhs: &Text) -> Text {
        let mut out = Text::from(self);
        out += rhs;
        out
    }
}

impl Add<Text> for &str {
    type Output = Text;

    fn add(self, rhs: Text) -> Text {
        self + &rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fmt::Write;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_length_excludes_terminator() {
        let t = Text::from("hello");
        assert_eq!(t.size(), 6);
        assert_eq!(t.length(), 5);
        assert_eq!(t.as_bytes_with_nul(), b"hello\0");

        let empty = Text::new();
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.length(), 0);
        assert!(empty.is_empty());
        assert_eq!(empty.as_c_str(), c"");
    }

    #[test]
    fn test_append_str() {
        let mut s = Text::from("hello");
        s += "!";
        assert_eq!(s.get_data(), b"hello!");
        assert_eq!(s.length(), 6);
        assert_eq!(s.size(), 7);
        assert_eq!(s.as_c_str(), c"hello!");
    }

    #[test]
    fn test_append_empty_is_no_op() {
        let mut s = Text::from("abc");
        let before = s.clone();
        s += "";
        s += &Text::new();
        assert!(s.ptr_eq(&before));
        assert_eq!(s, "abc");
    }

    #[test]
    fn test_append_to_empty_aliases() {
        let src = Text::from("shared");
        let mut dst = Text::new();
        dst += &src;
        assert!(dst.ptr_eq(&src));
        assert_eq!(src.refcount(), 2);

        // First write splits them again
        dst += "!";
        assert_eq!(src, "shared");
        assert_eq!(dst, "shared!");
    }

    #[test]
    fn test_str_plus_text() {
        let t = "a" + Text::from("b");
        assert_eq!(t.length(), 2);
        assert_eq!(t, "ab");
        assert_eq!(&Text::from("x") + "yz", "xyz");
        assert_eq!(&Text::from("x") + b'!', "x!");
        assert_eq!(Text::from("1") + &Text::from("2"), "12");
    }

    #[test]
    fn test_embedded_terminator_becomes_space() {
        let t = Text::from_bytes(b"ab\0cd");
        assert_eq!(t.length(), 5);
        assert_eq!(t.as_bytes(), b"ab cd");

        let mut t = Text::from("x");
        t.try_append_bytes(b"\0y").unwrap();
        assert_eq!(t, "x y");
        t.set(0, 0);
        assert_eq!(t, "  y");
    }

    #[test]
    fn test_copy_on_write() {
        let a = Text::from("same");
        let mut b = a.clone();
        assert!(a.ptr_eq(&b));
        b.set(0, b'S');
        assert_eq!(a, "same");
        assert_eq!(b, "Same");
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_get_is_bounded_by_length() {
        let t = Text::from("ab");
        assert_eq!(t.get(1), b'b');
        // The terminator is not addressable
        assert!(catch_unwind(AssertUnwindSafe(|| t.get(2))).is_err());
    }

    #[test]
    fn test_comparisons() {
        let t = Text::from("q");
        assert_eq!(t, b'q');
        assert_ne!(Text::from("qq"), b'q');
        assert_ne!(Text::new(), b'q');
        assert!(t == b"q"[..]);
        assert!("q" == t);
        assert!(Text::from("abc") < Text::from("abd"));

        let mut set = HashSet::new();
        set.insert(Text::from("k"));
        assert!(set.contains(&Text::from("k")));
    }

    #[test]
    fn test_push_and_write() {
        let mut t = Text::new();
        t += b'a';
        t.push(b'b');
        write!(t, "{}", 3).unwrap();
        assert_eq!(t, "ab3");
        assert_eq!(t.length(), 3);
    }

    #[test]
    fn test_format_text() {
        let t = crate::format_text!("{}-{}", "a", 7);
        assert_eq!(t, "a-7");
        assert_eq!(t.to_string(), "a-7");
        assert_eq!(format!("{:?}", t), "\"a-7\"");
        assert_eq!(crate::format_text!("plain"), "plain");
    }

    #[test]
    fn test_clear() {
        let mut t = Text::from("gone");
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.size(), 0);
    }
}
