//! Scripted diagnostics questionnaire: the fixed fifteen-question schema and
//! the step-transition function driving the chat interface.
//!
//! Question ids double as the training-time column names, so the wizard, the
//! feature encoder and the training script all agree on one schema.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const QUESTION_COUNT: usize = 15;

const YES_NO: &[&str] = &["yes", "no"];
const GENDERS: &[&str] = &["male", "female", "other"];
const FREQUENCIES: &[&str] = &["never", "rarely", "sometimes", "often", "always"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnswerKind {
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice(&'static [&'static str]),
    FreeText,
}

#[derive(Debug, Clone, Copy)]
pub struct Question {
    /// Column name the classifier was trained with.
    pub id: &'static str,
    pub prompt: &'static str,
    pub kind: AnswerKind,
    /// Categorical answers go through a fitted label encoder.
    pub categorical: bool,
}

/// The interview script, in trained feature order. Reordering this table
/// silently breaks every persisted model, so don't.
pub const QUESTIONS: [Question; QUESTION_COUNT] = [
    Question {
        id: "age",
        prompt: "How old are you?",
        kind: AnswerKind::Integer { min: 10, max: 100 },
        categorical: false,
    },
    Question {
        id: "gender",
        prompt: "What is your gender? (male / female / other)",
        kind: AnswerKind::Choice(GENDERS),
        categorical: true,
    },
    Question {
        id: "hours_per_day",
        prompt: "How many hours do you play video games per day, on average?",
        kind: AnswerKind::Float { min: 0.0, max: 24.0 },
        categorical: false,
    },
    Question {
        id: "days_per_week",
        prompt: "How many days per week do you play games?",
        kind: AnswerKind::Integer { min: 0, max: 7 },
        categorical: false,
    },
    Question {
        id: "game_genre",
        prompt: "What type of games do you mostly play? (e.g. shooter, MOBA, RPG, casual)",
        kind: AnswerKind::FreeText,
        categorical: true,
    },
    Question {
        id: "loses_track_of_time",
        prompt: "Do you often lose track of time while gaming? (yes / no)",
        kind: AnswerKind::Choice(YES_NO),
        categorical: true,
    },
    Question {
        id: "skips_meals_or_sleep",
        prompt: "Have you ever skipped meals or sleep because of gaming? (yes / no)",
        kind: AnswerKind::Choice(YES_NO),
        categorical: true,
    },
    Question {
        id: "others_concerned",
        prompt: "Have others ever expressed concern about your gaming habits? (yes / no)",
        kind: AnswerKind::Choice(YES_NO),
        categorical: true,
    },
    Question {
        id: "stress_level",
        prompt: "On a scale of 1 to 10, how stressed do you feel on average?",
        kind: AnswerKind::Integer { min: 1, max: 10 },
        categorical: false,
    },
    Question {
        id: "anxiety_level",
        prompt: "On a scale of 1 to 10, how anxious do you feel regularly?",
        kind: AnswerKind::Integer { min: 1, max: 10 },
        categorical: false,
    },
    Question {
        id: "sleep_hours",
        prompt: "On average, how many hours of sleep do you get per night?",
        kind: AnswerKind::Float { min: 0.0, max: 24.0 },
        categorical: false,
    },
    Question {
        id: "social_withdrawal",
        prompt: "How often do you feel socially withdrawn or isolated? (never / rarely / sometimes / often / always)",
        kind: AnswerKind::Choice(FREQUENCIES),
        categorical: true,
    },
    Question {
        id: "guilt_after_gaming",
        prompt: "Have you ever felt guilty or depressed after long gaming sessions? (yes / no)",
        kind: AnswerKind::Choice(YES_NO),
        categorical: true,
    },
    Question {
        id: "gaming_as_coping",
        prompt: "Do you think gaming helps you cope with stress or emotional issues? (yes / no)",
        kind: AnswerKind::Choice(YES_NO),
        categorical: true,
    },
    Question {
        id: "years_gaming",
        prompt: "For how many years have you been gaming regularly?",
        kind: AnswerKind::Float { min: 0.0, max: 60.0 },
        categorical: false,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Number(f64),
    Text(String),
}

/// Answers collected so far, keyed by question id.
pub type AnswerMap = HashMap<&'static str, Answer>;

/// One user's in-flight interview. Step 0 waits for "start"; step `n` in
/// `1..=15` waits for the answer to `QUESTIONS[n - 1]`.
#[derive(Debug, Clone)]
pub struct WizardSession {
    pub step: usize,
    pub answers: AnswerMap,
    pub started_at: DateTime<Utc>,
    /// Refreshed on every turn; stale-session eviction keys on this, not on
    /// `started_at`, so a slow interview is never dropped mid-flight.
    pub last_activity: DateTime<Utc>,
}

impl WizardSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            step: 0,
            answers: AnswerMap::new(),
            started_at: now,
            last_activity: now,
        }
    }

    fn reset(&mut self) {
        self.step = 0;
        self.answers.clear();
        self.started_at = Utc::now();
        self.last_activity = self.started_at;
    }
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Input accepted; here is the next thing to say.
    Prompt(String),
    /// Input rejected; same step, try again.
    Reprompt(String),
    /// All fifteen answers collected; the session has been reset.
    Completed(AnswerMap),
}

pub fn start_prompt() -> String {
    "Type 'start' to begin the diagnostics interview.".to_string()
}

/// Advance the wizard by one user turn. Total over every step in `0..=15`:
/// a parse failure re-prompts the same step and never corrupts collected
/// answers.
pub fn advance(session: &mut WizardSession, raw: &str) -> StepOutcome {
    let input = raw.trim();
    session.last_activity = Utc::now();

    // Substring match, like the "start" trigger below.
    if session.step > 0 && input.to_lowercase().contains("restart") {
        session.reset();
        return StepOutcome::Prompt(format!("Interview reset. {}", start_prompt()));
    }

    if session.step == 0 {
        if input.to_lowercase().contains("start") {
            session.step = 1;
            return StepOutcome::Prompt(format!("Question 1/{}: {}", QUESTION_COUNT, QUESTIONS[0].prompt));
        }
        return StepOutcome::Reprompt(start_prompt());
    }

    let question = &QUESTIONS[session.step - 1];
    match parse_answer(question, input) {
        Ok(answer) => {
            session.answers.insert(question.id, answer);
            if session.step == QUESTION_COUNT {
                let answers = std::mem::take(&mut session.answers);
                session.reset();
                StepOutcome::Completed(answers)
            } else {
                session.step += 1;
                let next = &QUESTIONS[session.step - 1];
                StepOutcome::Prompt(format!(
                    "Question {}/{}: {}",
                    session.step, QUESTION_COUNT, next.prompt
                ))
            }
        }
        Err(msg) => StepOutcome::Reprompt(msg),
    }
}

fn parse_answer(question: &Question, input: &str) -> Result<Answer, String> {
    match question.kind {
        AnswerKind::Integer { min, max } => match input.parse::<i64>() {
            Ok(v) if (min..=max).contains(&v) => Ok(Answer::Number(v as f64)),
            _ => Err(format!("Please enter a whole number between {min} and {max}.")),
        },
        AnswerKind::Float { min, max } => match input.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= min && v <= max => Ok(Answer::Number(v)),
            _ => Err(format!("Please enter a number between {min} and {max}.")),
        },
        AnswerKind::Choice(options) => {
            let lowered = input.to_lowercase();
            let token = match lowered.as_str() {
                "y" => "yes",
                "n" => "no",
                other => other,
            };
            if options.contains(&token) {
                Ok(Answer::Text(token.to_string()))
            } else {
                Err(format!("Please answer with one of: {}.", options.join(" / ")))
            }
        }
        AnswerKind::FreeText => {
            if input.is_empty() {
                Err("Please type a short answer.".to_string())
            } else {
                Ok(Answer::Text(input.to_lowercase()))
            }
        }
    }
}
