/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next modification stamp for a row last stamped at `previous`.
///
/// Never returns a value lower than or equal to `previous`, even when the
/// wall clock stalls or steps backwards between two writes.
pub fn next_stamp(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_stamp_strictly_advances() {
        let now = now_millis();
        assert!(next_stamp(now) > now);

        let future = now + 60_000;
        assert_eq!(next_stamp(future), future + 1);
    }

    #[test]
    fn test_next_stamp_tracks_clock() {
        assert!(next_stamp(0) >= now_millis() - 1_000);
    }
}
