use std::fmt;
use std::str;
use trackable::error::ErrorKindExt;

use crate::{ErrorKind, Result};

/// ブロックやチャンクに付与される名前.
///
/// 容量は終端文字込みで`CAPACITY`バイトの固定長であり、
/// それを超える名前は(UTF-8の文字境界を保ったまま)切り詰められる.
///
/// 名前は一意である必要はない.
///
/// # Examples
///
/// ```
/// use ceit::BlockName;
///
/// assert_eq!(BlockName::new("SJOY_1").as_str(), "SJOY_1");
///
/// // 長すぎる名前は切り詰められる
/// let long = "a".repeat(40);
/// assert_eq!(BlockName::new(&long).as_str().len(), BlockName::MAX_LEN);
///
/// // NUL文字以降は無視される
/// assert_eq!(BlockName::new("foo\0bar").as_str(), "foo");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockName {
    bytes: [u8; BlockName::CAPACITY],
    len: u8,
}
impl BlockName {
    /// 終端文字込みの名前の容量(バイト単位).
    pub const CAPACITY: usize = 32;

    /// 名前の最大長(バイト単位).
    pub const MAX_LEN: usize = Self::CAPACITY - 1;

    /// 新しい`BlockName`インスタンスを生成する.
    pub fn new(name: &str) -> Self {
        let name = name.split('\0').next().unwrap_or("");
        let mut len = name.len().min(Self::MAX_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }

        let mut bytes = [0; Self::CAPACITY];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        BlockName {
            bytes,
            len: len as u8,
        }
    }

    /// 名前を文字列として返す.
    pub fn as_str(&self) -> &str {
        str::from_utf8(&self.bytes[..self.len as usize]).expect("Never fails")
    }

    /// 名前が空かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 終端文字で埋められた固定長のバイト列を返す.
    pub(crate) fn as_padded_bytes(&self) -> &[u8; BlockName::CAPACITY] {
        &self.bytes
    }

    /// 固定長のバイト列から`BlockName`を復元する.
    pub(crate) fn from_padded_bytes(bytes: &[u8; BlockName::CAPACITY]) -> Result<Self> {
        let len = bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::CAPACITY);
        track_assert!(len <= Self::MAX_LEN, ErrorKind::ChunkCorrupted; len);
        track_assert!(
            bytes[len..].iter().all(|&b| b == 0),
            ErrorKind::ChunkCorrupted
        );
        let name = track!(
            str::from_utf8(&bytes[..len]).map_err(|e| ErrorKind::ChunkCorrupted.cause(e))
        )?;
        Ok(BlockName::new(name))
    }
}
impl Default for BlockName {
    fn default() -> Self {
        BlockName::new("")
    }
}
impl<'a> From<&'a str> for BlockName {
    fn from(f: &'a str) -> Self {
        BlockName::new(f)
    }
}
impl PartialEq<str> for BlockName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}
impl<'a> PartialEq<&'a str> for BlockName {
    fn eq(&self, other: &&'a str) -> bool {
        self.as_str() == *other
    }
}
impl fmt::Debug for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BlockName({:?})", self.as_str())
    }
}
impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn truncation_works() {
        let name = BlockName::new(&"x".repeat(BlockName::CAPACITY));
        assert_eq!(name.as_str(), "x".repeat(BlockName::MAX_LEN));

        // マルチバイト文字の途中では切らない
        let name = BlockName::new(&format!("{}あ", "x".repeat(29)));
        assert_eq!(name.as_str(), "x".repeat(29));

        assert!(BlockName::new("").is_empty());
        assert_eq!(BlockName::new("\0foo"), BlockName::default());
    }

    #[test]
    fn padded_bytes_works() -> TestResult {
        let name = BlockName::new("SJOY_1");
        let bytes = *name.as_padded_bytes();
        assert_eq!(&bytes[..7], b"SJOY_1\0");
        assert_eq!(track!(BlockName::from_padded_bytes(&bytes))?, name);

        let mut broken = bytes;
        broken[20] = b'x';
        assert!(BlockName::from_padded_bytes(&broken).is_err());

        let full = [b'x'; BlockName::CAPACITY];
        assert!(BlockName::from_padded_bytes(&full).is_err());
        Ok(())
    }

    #[test]
    fn comparison_works() {
        let name = BlockName::new("foo");
        assert_eq!(name, "foo");
        assert_eq!(name.to_string(), "foo");
        assert_eq!(format!("{:?}", name), r#"BlockName("foo")"#);
        assert_eq!(BlockName::from("foo"), name);
    }
}
