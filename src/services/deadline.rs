use time::{Duration, PrimitiveDateTime};

/// Latest instant an attempt may stay open: the earlier of the personal
/// duration bound and the exam's hard end.
pub(crate) fn compute_deadline(
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
    exam_end: Option<PrimitiveDateTime>,
) -> PrimitiveDateTime {
    let duration_deadline = started_at + Duration::minutes(i64::from(duration_minutes.max(0)));
    match exam_end {
        Some(end) if end < duration_deadline => end,
        _ => duration_deadline,
    }
}

pub(crate) fn is_expired(
    now: PrimitiveDateTime,
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
    exam_end: Option<PrimitiveDateTime>,
) -> bool {
    now >= compute_deadline(started_at, duration_minutes, exam_end)
}
