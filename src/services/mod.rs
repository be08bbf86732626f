pub(crate) mod answer_merge;
pub(crate) mod deadline;
pub(crate) mod evaluation;
pub(crate) mod scoring;
pub(crate) mod submission_lifecycle;
pub(crate) mod violations;
