//! IdGenerator port - task nonce の生成
//!
//! TaskId と return id はすべて nonce から導出されるので、
//! nonce が重複しないことが衝突しないことの根拠になります。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース、単調増加（同じ生成器からは必ず狭義単調増加）

use std::sync::Mutex;

use ulid::Ulid;

use crate::ports::Clock;

/// IdGenerator は task nonce を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn next_nonce(&self) -> Ulid;
}

/// UlidGenerator は Clock ベースの単調増加 ULID 生成器
///
/// - 時刻が進んでいれば `timestamp + random`
/// - 同じミリ秒内（または時刻が戻った場合）は直前の値を +1
/// - ランダム部が溢れたら timestamp を 1ms 進める
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Ulid>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(Ulid::nil()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn next_nonce(&self) -> Ulid {
        let now_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let next = if now_ms > last.timestamp_ms() {
            Ulid::from_parts(now_ms, rand::random())
        } else {
            last.increment()
                .unwrap_or_else(|| Ulid::from_parts(last.timestamp_ms() + 1, 0))
        };
        *last = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_nonces() {
        let id_gen = UlidGenerator::new(SystemClock);
        let a = id_gen.next_nonce();
        let b = id_gen.next_nonce();
        let c = id_gen.next_nonce();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn fixed_clock_still_yields_strictly_increasing_nonces() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let mut prev = id_gen.next_nonce();
        assert_eq!(prev.timestamp_ms(), fixed_time.timestamp_millis() as u64);
        for _ in 0..1000 {
            let next = id_gen.next_nonce();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn overflowing_random_part_advances_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));
        let ts = fixed_time.timestamp_millis() as u64;
        *id_gen.last.lock().unwrap() = Ulid::from_parts(ts, u128::MAX);

        let next = id_gen.next_nonce();
        assert_eq!(next.timestamp_ms(), ts + 1);
    }
}
