//! ObjectStore port - 共有オブジェクトストア
//!
//! ストア本体（保存・退避ポリシー）は外部の関心事です。
//! core が使うのは「この ID を保護してほしい / もう保護は不要」の 2 つだけ。

use crate::domain::errors::PinError;
use crate::domain::ids::ObjectId;

/// ObjectStore は参照されたオブジェクトを生かしておく
///
/// # 契約
/// - `pin` は失敗しうる（オブジェクトが無い・ストアに繋がらない）
/// - `unpin` は対応する `pin` の後に 1 回だけ呼ばれる（二重 unpin は PinTable 側で防ぐ）
pub trait ObjectStore: Send + Sync {
    fn pin(&self, id: &ObjectId) -> Result<(), PinError>;

    fn unpin(&self, id: &ObjectId);
}
