use std::ops;
use trackable::error::ErrorKindExt;

use crate::{ErrorKind, Result};

/// チャンクが上流のアロケータから一括で確保するバッファ.
///
/// 確保は生成時の一度きりで、以後リサイズされることはない.
/// 内部的なメモリ管理の方法が異なるだけで、基本的には通常のバイト列(e.g., `&[u8]`)と同様に扱うことが可能.
#[derive(Debug)]
pub(crate) struct ChunkBuffer {
    buf: Vec<u8>,
}
impl ChunkBuffer {
    /// `size`バイトのバッファを確保する.
    ///
    /// 確保に失敗した場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される.
    ///
    /// 結果のバイト列の初期値はゼロ埋めされている.
    pub fn reserve(size: usize) -> Result<Self> {
        let mut buf: Vec<u8> = Vec::new();
        let result = buf
            .try_reserve_exact(size)
            .map_err(|e| ErrorKind::OutOfMemory.cause(e));
        track!(result, "size={}", size)?;
        buf.resize(size, 0);
        Ok(ChunkBuffer { buf })
    }
}
impl ops::Deref for ChunkBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.buf
    }
}
impl ops::DerefMut for ChunkBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
impl AsRef<[u8]> for ChunkBuffer {
    fn as_ref(&self) -> &[u8] {
        &*self
    }
}
impl AsMut<[u8]> for ChunkBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut *self
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn reserve_works() -> TestResult {
        let mut buf = track!(ChunkBuffer::reserve(10))?;
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.as_ref(), &[0; 10][..]);

        buf.as_mut()[3] = 1;
        assert_eq!(buf[3], 1);
        Ok(())
    }

    #[test]
    fn too_large_reservation_fails() {
        let e = ChunkBuffer::reserve(usize::MAX).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::OutOfMemory));
    }
}
