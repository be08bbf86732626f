pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, answers, evaluations, violations, marked_for_review, status, \
    submission_type, started_at, duration_minutes, submitted_at, evaluated_at, published_at, \
    total_marks, created_at, updated_at";
