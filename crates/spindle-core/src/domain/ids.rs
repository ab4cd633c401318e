//! Domain identifiers (strongly-typed, fixed-width IDs).
//!
//! # 20-byte ID + Phantom type
//! Function / Object / Task はすべて同じ 20 バイトの表現を持ちますが、
//! `UniqueId<T>` の `T` をマーカー型にすることで、コンパイル時に混同を防ぎます。
//!
//! ## 不変条件
//! - 長さはちょうど 20 バイト（短い・長い入力はエラー、パディングや切り詰めはしない）
//! - 比較・ハッシュはバイト列の等価性のみ
//! - バイト値の検証はしない（0x00 を含め全て合法）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

use super::errors::IdError;

/// Width of every identifier on the wire and in memory.
pub const ID_LEN: usize = 20;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"obj-", "fn-", "task-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let f = FunctionId::from_slice(b"aaaaaaaaaaaaaaaaaaaa")?;
/// let o: ObjectId = ObjectId::from_bytes([7; 20]);
/// // f と o は異なる型なので、混同できない
/// ```
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId<T: IdMarker> {
    bytes: [u8; ID_LEN],
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> UniqueId<T> {
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    /// スライスから ID を作成（長さ != 20 は `IdError::InvalidLength`）
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let bytes: [u8; ID_LEN] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// All-zero ID.
    pub const fn nil() -> Self {
        Self::from_bytes([0; ID_LEN])
    }

    pub fn is_nil(&self) -> bool {
        self.bytes == [0; ID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.bytes
    }
}

// derive だと `T: Clone` などの境界が付いてしまうので手で実装する
impl<T: IdMarker> Clone for UniqueId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for UniqueId<T> {}

impl<T: IdMarker> PartialEq for UniqueId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T: IdMarker> Eq for UniqueId<T> {}

impl<T: IdMarker> std::hash::Hash for UniqueId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for UniqueId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for UniqueId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl<T: IdMarker> TryFrom<&[u8]> for UniqueId<T> {
    type Error = IdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

impl<T: IdMarker> From<[u8; ID_LEN]> for UniqueId<T> {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl<T: IdMarker> fmt::Display for UniqueId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(T::prefix())?;
        for b in &self.bytes {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl<T: IdMarker> fmt::Debug for UniqueId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Object {}

impl IdMarker for Object {
    fn prefix() -> &'static str {
        "obj-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {}

impl IdMarker for Function {
    fn prefix() -> &'static str {
        "fn-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

// ========================================
// Type Alias
// ========================================

/// Identifier of an object held in the shared object store.
pub type ObjectId = UniqueId<Object>;

/// Identifier of a remote function.
pub type FunctionId = UniqueId<Function>;

/// Identifier of a task (derived from the function id and a nonce).
pub type TaskId = UniqueId<Task>;
