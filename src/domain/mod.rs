pub mod monitor;
pub mod questionnaire;
