//! Admin content endpoints: milestones, pregnancy tips, quiz questions.

use reqwest::Method;
use tracing::instrument;

use super::types::{
    Milestone, MilestoneInput, PregnancyTip, PregnancyTipInput, Question, QuestionInput,
};
use super::{ApiClient, ApiError, DataEnvelope};

impl ApiClient {
    /// `POST /api/tips/milestone`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the input is rejected.
    #[instrument(skip(self, input), fields(month = input.month))]
    pub async fn create_milestone(&self, input: &MilestoneInput) -> Result<Milestone, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "tips", "milestone"])
            .await?
            .json(input);
        let envelope: DataEnvelope<Milestone> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// `POST /api/tips/pregnancy-tip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the input is rejected.
    #[instrument(skip(self, input), fields(week = input.week))]
    pub async fn create_pregnancy_tip(
        &self,
        input: &PregnancyTipInput,
    ) -> Result<PregnancyTip, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "tips", "pregnancy-tip"])
            .await?
            .json(input);
        let envelope: DataEnvelope<PregnancyTip> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// `GET /api/questions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn questions(&self) -> Result<Vec<Question>, ApiError> {
        let builder = self.request(Method::GET, &["api", "questions"]).await?;
        let envelope: DataEnvelope<Vec<Question>> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// `POST /api/questions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the input is rejected.
    #[instrument(skip(self, input))]
    pub async fn create_question(&self, input: &QuestionInput) -> Result<Question, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "questions"])
            .await?
            .json(input);
        let envelope: DataEnvelope<Question> = self.send_json(builder).await?;
        Ok(envelope.data)
    }
}
