//! デバッグ用に、チャンクやブロックの状態をテキストで出力するための関数群.
//!
//! 出力フォーマットは人間が読むためのものであり、安定性は保証されない.
use std::io::{self, Write};

use crate::block::BlockInfo;
use crate::chunk::Chunk;
use crate::Result;

/// チャンク群の状態を`writer`に出力する.
///
/// チャンク毎に、その要約を一行出力した後に、各ブロックの情報をインデント付きで一行ずつ出力する.
///
/// # Examples
///
/// ```
/// use ceit::{dump, Registry};
///
/// let mut registry = Registry::new();
/// let id = registry.create_chunk("foo", 1024).unwrap();
/// registry.get_mut(id).unwrap().allocate(10, "bar").unwrap();
///
/// let mut buf = Vec::new();
/// dump::dump_chunks(&mut buf, &registry).unwrap();
/// let text = String::from_utf8(buf).unwrap();
/// assert_eq!(text.lines().count(), 3);
/// ```
pub fn dump_chunks<'a, W, I>(mut writer: W, chunks: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Chunk>,
{
    for chunk in chunks {
        track_io!(writeln!(writer, "{}", chunk.summary()))?;
        for block in chunk.blocks() {
            track_io!(writeln!(writer, "  {}", block))?;
        }
    }
    Ok(())
}

/// チャンク群の状態を標準出力に出力する.
pub fn print_chunks<'a, I>(chunks: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let stdout = io::stdout();
    track!(dump_chunks(stdout.lock(), chunks))
}

/// ブロック群の情報を`writer`に一行ずつ出力する.
pub fn dump_blocks<W, I>(mut writer: W, blocks: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = BlockInfo>,
{
    for block in blocks {
        track_io!(writeln!(writer, "{}", block))?;
    }
    Ok(())
}

/// ブロック群の情報を標準出力に出力する.
pub fn print_blocks<I>(blocks: I) -> Result<()>
where
    I: IntoIterator<Item = BlockInfo>,
{
    let stdout = io::stdout();
    track!(dump_blocks(stdout.lock(), blocks))
}
