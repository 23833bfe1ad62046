//! Admin content: milestones, pregnancy tips and quiz questions.
//!
//! Every mutating operation checks the admin role locally before any request
//! is made, then validates the input.

use std::sync::Arc;

use tracing::instrument;

use crate::api::ApiClient;
use crate::api::types::{
    Milestone, MilestoneInput, PregnancyTip, PregnancyTipInput, Question, QuestionInput,
};
use crate::error::{ClientError, FieldErrors, Result, report};
use crate::notify::{Notice, Notifier};
use crate::session::SessionService;

/// Months covered by developmental milestones.
pub const MILESTONE_MONTHS: std::ops::RangeInclusive<u8> = 0..=36;

/// Weeks covered by pregnancy tips.
pub const PREGNANCY_WEEKS: std::ops::RangeInclusive<u8> = 1..=42;

/// Minimum number of answer options for a quiz question.
pub const MIN_QUESTION_OPTIONS: usize = 2;

/// Admin content management.
#[derive(Clone)]
pub struct ContentService {
    inner: Arc<ContentInner>,
}

struct ContentInner {
    api: ApiClient,
    session: SessionService,
    notifier: Arc<dyn Notifier>,
}

impl ContentService {
    pub fn new(api: ApiClient, session: SessionService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(ContentInner {
                api,
                session,
                notifier,
            }),
        }
    }

    /// Publish a developmental milestone.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-admins,
    /// `ClientError::Validation` for invalid input, or the API error.
    #[instrument(skip(self, input), fields(month = input.month))]
    pub async fn add_milestone(&self, input: MilestoneInput) -> Result<Milestone> {
        self.inner.session.require_admin().await?;
        let result = async {
            let input = validate_milestone(input)?;
            Ok(self.inner.api.create_milestone(&input).await?)
        }
        .await;
        self.finish("content.add_milestone", result, "Milestone added.")
    }

    /// Publish a weekly pregnancy tip.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-admins,
    /// `ClientError::Validation` for invalid input, or the API error.
    #[instrument(skip(self, input), fields(week = input.week))]
    pub async fn add_pregnancy_tip(&self, input: PregnancyTipInput) -> Result<PregnancyTip> {
        self.inner.session.require_admin().await?;
        let result = async {
            let input = validate_tip(input)?;
            Ok(self.inner.api.create_pregnancy_tip(&input).await?)
        }
        .await;
        self.finish("content.add_pregnancy_tip", result, "Pregnancy tip added.")
    }

    /// List quiz questions.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn questions(&self) -> Result<Vec<Question>> {
        self.inner.api.questions().await.map_err(|e| {
            let err = ClientError::from(e);
            report(self.inner.notifier.as_ref(), "content.questions", &err, None);
            err
        })
    }

    /// Publish a quiz question.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-admins,
    /// `ClientError::Validation` for invalid input, or the API error.
    #[instrument(skip(self, input))]
    pub async fn add_question(&self, input: QuestionInput) -> Result<Question> {
        self.inner.session.require_admin().await?;
        let result = async {
            let input = validate_question(input)?;
            Ok(self.inner.api.create_question(&input).await?)
        }
        .await;
        self.finish("content.add_question", result, "Question added.")
    }

    fn finish<T>(&self, context: &str, result: Result<T>, success: &str) -> Result<T> {
        match result {
            Ok(value) => {
                self.inner.notifier.notify(Notice::success(success));
                Ok(value)
            }
            Err(e) => {
                report(self.inner.notifier.as_ref(), context, &e, None);
                Err(e)
            }
        }
    }
}

fn require_text(fields: &mut FieldErrors, field: &str, value: &mut String, label: &str) {
    *value = value.trim().to_string();
    if value.is_empty() {
        fields.add(field, format!("{label} is required"));
    }
}

fn validate_milestone(mut input: MilestoneInput) -> Result<MilestoneInput> {
    let mut fields = FieldErrors::default();
    require_text(&mut fields, "title", &mut input.title, "Title");
    input.description = input.description.trim().to_string();
    if !MILESTONE_MONTHS.contains(&input.month) {
        fields.add(
            "month",
            format!(
                "Month must be between {} and {}",
                MILESTONE_MONTHS.start(),
                MILESTONE_MONTHS.end()
            ),
        );
    }
    fields.into_result()?;
    Ok(input)
}

fn validate_tip(mut input: PregnancyTipInput) -> Result<PregnancyTipInput> {
    let mut fields = FieldErrors::default();
    require_text(&mut fields, "title", &mut input.title, "Title");
    input.description = input.description.trim().to_string();
    if !PREGNANCY_WEEKS.contains(&input.week) {
        fields.add(
            "week",
            format!(
                "Week must be between {} and {}",
                PREGNANCY_WEEKS.start(),
                PREGNANCY_WEEKS.end()
            ),
        );
    }
    fields.into_result()?;
    Ok(input)
}

fn validate_question(mut input: QuestionInput) -> Result<QuestionInput> {
    let mut fields = FieldErrors::default();
    require_text(&mut fields, "text", &mut input.text, "Question");

    input.options = input
        .options
        .into_iter()
        .map(|option| option.trim().to_string())
        .collect();
    if input.options.len() < MIN_QUESTION_OPTIONS {
        fields.add(
            "options",
            format!("At least {MIN_QUESTION_OPTIONS} options are required"),
        );
    } else if input.options.iter().any(String::is_empty) {
        fields.add("options", "Options cannot be empty");
    }
    if input.answer >= input.options.len() {
        fields.add("answer", "Answer must be one of the options");
    }

    fields.into_result()?;
    Ok(input)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields_of(err: ClientError) -> FieldErrors {
        match err {
            ClientError::Validation(fields) => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_milestone_month_range() {
        let input = MilestoneInput {
            title: " First steps ".to_string(),
            description: String::new(),
            month: 12,
        };
        assert_eq!(validate_milestone(input).unwrap().title, "First steps");

        let input = MilestoneInput {
            title: String::new(),
            description: String::new(),
            month: 37,
        };
        let fields = fields_of(validate_milestone(input).unwrap_err());
        assert_eq!(fields.get("title"), Some("Title is required"));
        assert_eq!(fields.get("month"), Some("Month must be between 0 and 36"));
    }

    #[test]
    fn test_tip_week_range() {
        let tip = |week| PregnancyTipInput {
            title: "Hydrate".to_string(),
            description: String::new(),
            week,
        };
        assert!(validate_tip(tip(1)).is_ok());
        assert!(validate_tip(tip(42)).is_ok());
        assert!(validate_tip(tip(0)).is_err());
        assert!(validate_tip(tip(43)).is_err());
    }

    #[test]
    fn test_question_needs_two_options_and_valid_answer() {
        let question = |options: &[&str], answer| QuestionInput {
            text: "When do babies crawl?".to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            answer,
        };

        assert!(validate_question(question(&["6 months", "9 months"], 1)).is_ok());

        let fields = fields_of(validate_question(question(&["only"], 0)).unwrap_err());
        assert!(fields.get("options").is_some());

        let fields = fields_of(validate_question(question(&["a", "b"], 2)).unwrap_err());
        assert_eq!(fields.get("answer"), Some("Answer must be one of the options"));

        let fields = fields_of(validate_question(question(&["a", " "], 0)).unwrap_err());
        assert_eq!(fields.get("options"), Some("Options cannot be empty"));
    }
}
