use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力が不正.
    ///
    /// E.g., サイズ`0`での割当要求、別のチャンクのハンドルの指定
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 上流のアロケータからのメモリ確保に失敗した.
    ///
    /// チャンクの生成時にのみ返される.
    ///
    /// # 典型的な対応策
    ///
    /// - より小さいサイズでチャンクを生成し直す
    /// - 不要なチャンクを破棄してから再試行する
    OutOfMemory,

    /// チャンク内に、要求サイズを満たす空きブロックが存在しない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要なブロックを解放する
    /// - より大きなチャンクを別途生成する
    ChunkFull,

    /// 指定されたブロックが(割当状態では)存在しない.
    ///
    /// 解放済みのハンドルの再利用(二重解放)や、名前の誤り等で返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正する
    BlockNotFound,

    /// 読み書きの範囲がブロックの容量を超えている.
    ///
    /// この場合、読み書きは一切行われない.
    ///
    /// # 典型的な対応策
    ///
    /// - 読み書きのサイズをブロックの容量以下にする
    /// - より大きなブロックを割り当て直す
    OutOfBounds,

    /// チャンクのバッファ内に書き込まれているブロックヘッダが破損している.
    ///
    /// `Chunk::check_integrity`でのチェックサム検証が失敗した場合等にこのエラーが返される.
    ChunkCorrupted,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., ダンプ出力時のI/Oエラー
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
