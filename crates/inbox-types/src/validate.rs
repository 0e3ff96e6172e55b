use serde::Serialize;

/// A single constraint violation on an incoming DTO.
///
/// ```
/// use inbox_types::validate::ValidationIssue;
///
/// let issue = ValidationIssue::new("body", "must not be empty");
/// assert_eq!(issue.field, "body");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accumulates violations across a DTO's fields, the way each validator in
/// this crate folds its checks into a single list instead of bailing on the
/// first failure.
#[derive(Default)]
pub struct Violations(Vec<ValidationIssue>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(ValidationIssue::new(field, message));
    }

    pub fn push_if(&mut self, cond: bool, field: &'static str, message: impl Into<String>) {
        if cond {
            self.push(field, message);
        }
    }

    pub fn into_result(self) -> Result<(), Vec<ValidationIssue>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

pub fn non_empty(value: &str, field: &'static str, violations: &mut Violations) {
    violations.push_if(value.trim().is_empty(), field, "must not be empty");
}

pub fn max_len(value: &str, max: usize, field: &'static str, violations: &mut Violations) {
    violations.push_if(
        value.chars().count() > max,
        field,
        format!("must be at most {max} characters"),
    );
}
