//! `bg admin` commands.
//!
//! The admin role is checked locally before any request is sent.

use baby_guard_storefront::AppState;
use baby_guard_storefront::api::types::{MilestoneInput, PregnancyTipInput, QuestionInput};

use super::CommandError;

pub async fn add_milestone(
    state: &AppState,
    title: String,
    description: String,
    month: u8,
) -> Result<(), CommandError> {
    let milestone = state
        .content()
        .add_milestone(MilestoneInput {
            title,
            description,
            month,
        })
        .await?;
    println!("{} (month {}) -> {}", milestone.title, milestone.month, milestone.id);
    Ok(())
}

pub async fn add_tip(
    state: &AppState,
    title: String,
    description: String,
    week: u8,
) -> Result<(), CommandError> {
    let tip = state
        .content()
        .add_pregnancy_tip(PregnancyTipInput {
            title,
            description,
            week,
        })
        .await?;
    println!("{} (week {}) -> {}", tip.title, tip.week, tip.id);
    Ok(())
}

pub async fn list_questions(state: &AppState) -> Result<(), CommandError> {
    let questions = state.content().questions().await?;
    if questions.is_empty() {
        println!("No questions yet.");
    }
    for question in &questions {
        println!("{} {}", question.id, question.text);
        for (index, option) in question.options.iter().enumerate() {
            let mark = if question.answer == Some(index) { "*" } else { " " };
            println!("   {mark} {index}. {option}");
        }
    }
    Ok(())
}

pub async fn add_question(
    state: &AppState,
    text: String,
    options: Vec<String>,
    answer: usize,
) -> Result<(), CommandError> {
    let question = state
        .content()
        .add_question(QuestionInput {
            text,
            options,
            answer,
        })
        .await?;
    println!("Question {} added.", question.id);
    Ok(())
}
