use crate::core::time::{primitive_now_utc, unix_millis};

/// Timestamp plus random suffix; needs no shared counter.
pub(crate) fn next_id() -> String {
    let millis = unix_millis(primitive_now_utc());
    format!("scr-{millis:x}-{:08x}", rand::random::<u32>())
}
