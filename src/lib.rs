//! Chunk-based Embedded Item sTorage.
//!
//! `ceit`は、事前に確保した一つの連続したメモリ領域(チャンク)を、
//! 名前付きの可変長ブロック群に切り分けて利用するための、ユーザ空間用のサブアロケータ.
//!
//! # 特徴
//!
//! - 一つのチャンクは、生成時に一度だけ上流のアロケータから確保されたバッファを保持する
//!   - 以後の割当・解放は、全てこのバッファの内部で完結する
//! - 割当戦略は"BestFit"
//!   - 要求サイズを満たす空きブロックの中で、最も小さいものが選択される
//!   - 余剰分が十分に大きい場合には、ブロックが分割(split)される
//! - 解放時には、隣接する空きブロック同士が結合(coalesce)される
//! - 各ブロックは[BlockHandle]によって識別される
//!   - ブロック名は重複を許すデバッグ用のラベルであり、名前による解放も補助的に提供している
//! - ペイロードの読み書きは、常にブロックの容量の範囲内であることが検査される
//! - スレッドセーフではない (排他制御は利用者側の責務)
//!
//! # モジュールの依存関係
//!
//! ```text
//! registry => chunk => block
//!             dump  => chunk
//! ```
//!
//! - [chunk]モジュール:
//!   - 主に[Chunk]構造体を提供
//!   - `ceit`の利用者が直接触るのはこの構造体
//! - [block]モジュール:
//!   - ブロックのヘッダやハンドル、名前等の構成要素を提供
//! - [registry]モジュール:
//!   - 複数のチャンクをまとめて管理・一括破棄するための[Registry]を提供
//! - [dump]モジュール:
//!   - デバッグ用にチャンクやブロックの状態を出力する
//!
//! # Examples
//!
//! ```
//! use ceit::Chunk;
//!
//! let mut chunk = Chunk::create("joyc", 1024 * 1024).unwrap();
//! let block = chunk.allocate(10, "SJOY_1").unwrap();
//! chunk.write_text(block, "HI0099").unwrap();
//!
//! let mut buf = [0; 7];
//! chunk.read(block, &mut buf).unwrap();
//! assert_eq!(&buf, b"HI0099\0");
//!
//! chunk.release(block).unwrap();
//! assert_eq!(chunk.used_memory(), 0);
//! ```
//!
//! [BlockHandle]: ./block/struct.BlockHandle.html
//! [chunk]: ./chunk/index.html
//! [Chunk]: ./chunk/struct.Chunk.html
//! [block]: ./block/index.html
//! [registry]: ./registry/index.html
//! [Registry]: ./registry/struct.Registry.html
//! [dump]: ./dump/index.html
#![warn(missing_docs)]
extern crate adler32;
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate trackable;
extern crate uuid;
#[macro_use]
extern crate slog;

pub use crate::block::{BlockHandle, BlockInfo, BlockName, BlockState, BLOCK_HEADER_SIZE};
pub use crate::chunk::{Chunk, ChunkBuilder, ChunkSummary};
pub use crate::error::{Error, ErrorKind};
pub use crate::registry::{ChunkId, Registry};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod block;
pub mod chunk;
pub mod dump;
pub mod metrics;
pub mod registry;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
