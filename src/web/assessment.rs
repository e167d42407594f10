//! Chat-style diagnostics endpoint driving the questionnaire wizard.

use crate::domain::questionnaire::{advance, start_prompt, StepOutcome, WizardSession};
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/message", post(message))
        .with_state(state)
}

#[derive(Serialize)]
struct AssessmentStatus {
    model_ready: bool,
    step: usize,
}

#[derive(Deserialize)]
struct MessagePayload {
    text: String,
}

#[derive(Serialize, Debug)]
struct ResultPayload {
    label: &'static str,
    probability: f64,
    probability_text: String,
}

#[derive(Serialize, Debug)]
struct MessageResponse {
    reply: String,
    step: usize,
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultPayload>,
}

async fn status(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
) -> Json<AssessmentStatus> {
    let sessions = state.wizard_sessions.read().await;
    let step = sessions.get(&username).map(|s| s.step).unwrap_or(0);
    Json(AssessmentStatus {
        model_ready: state.model.is_some(),
        step,
    })
}

async fn message(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<MessagePayload>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<serde_json::Value>)> {
    // Without trained artifacts the interview never starts; the rest of the
    // app stays usable.
    let Some(model) = state.model.clone() else {
        return Ok(Json(MessageResponse {
            reply: "Diagnostics are offline: no trained model artifacts were found. \
                    Run train-risk-model and restart the service."
                .to_string(),
            step: 0,
            done: false,
            result: None,
        }));
    };

    let outcome = {
        let mut sessions = state.wizard_sessions.write().await;
        let session = sessions
            .entry(username.clone())
            .or_insert_with(WizardSession::new);
        let outcome = advance(session, &payload.text);
        let step = session.step;
        (outcome, step)
    };

    match outcome {
        (StepOutcome::Prompt(reply), step) | (StepOutcome::Reprompt(reply), step) => {
            Ok(Json(MessageResponse {
                reply,
                step,
                done: false,
                result: None,
            }))
        }
        (StepOutcome::Completed(answers), _) => {
            let assessment = model.assess(&answers).map_err(|err| {
                tracing::error!("assessment failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Assessment failed." })),
                )
            })?;

            // The wizard already reset, so a failed write must not swallow
            // the result; it rides along in the error notice.
            if let Err(err) = state
                .history
                .append(
                    &username,
                    assessment.label.as_str(),
                    &assessment.probability_text(),
                )
                .await
            {
                tracing::error!("history store failure: {err}");
                return Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "Result storage is unavailable; this result was not saved.",
                        "result": {
                            "label": assessment.label.as_str(),
                            "probability": assessment.probability,
                            "probability_text": assessment.probability_text(),
                        },
                    })),
                ));
            }

            tracing::info!(
                user = %username,
                label = assessment.label.as_str(),
                probability = assessment.probability,
                "assessment completed"
            );

            let reply = format!(
                "Analysis complete. Risk status: {} (confidence {}). {}",
                assessment.label.as_str(),
                assessment.probability_text(),
                start_prompt()
            );
            Ok(Json(MessageResponse {
                reply,
                step: 0,
                done: true,
                result: Some(ResultPayload {
                    label: assessment.label.as_str(),
                    probability: assessment.probability,
                    probability_text: assessment.probability_text(),
                }),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::questionnaire::{Answer, AnswerMap, QUESTIONS, QUESTION_COUNT};
    use crate::middleware::RateLimiter;
    use crate::model::{
        Dataset, EncoderSet, ForestConfig, LabelEncoder, ModelBundle, RandomForest,
    };
    use crate::state::AppState;
    use crate::store::{HistoryStore, UserStore, HISTORY_FILE};
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn tiny_bundle() -> ModelBundle {
        let names: Vec<String> = QUESTIONS.iter().map(|q| q.id.to_string()).collect();
        let mut ds = Dataset::new(names);
        for i in 0..60 {
            let heavy = i % 2 == 0;
            let mut row = vec![0.0; QUESTION_COUNT];
            row[2] = if heavy { 6.0 } else { 1.0 }; // hours_per_day
            row[9] = if heavy { 9.0 } else { 2.0 }; // anxiety_level
            ds.push(row, if heavy { 1.0 } else { 0.0 });
        }
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 8,
                max_depth: 4,
                ..Default::default()
            },
            &ds,
        );

        let mut encoders = EncoderSet::new();
        encoders.insert("gender".into(), LabelEncoder::fit(["female", "male", "other"]));
        encoders.insert("game_genre".into(), LabelEncoder::fit(["moba", "rpg"]));
        encoders.insert(
            "social_withdrawal".into(),
            LabelEncoder::fit(["never", "often"]),
        );
        for id in [
            "loses_track_of_time",
            "skips_meals_or_sleep",
            "others_concerned",
            "guilt_after_gaming",
            "gaming_as_coping",
        ] {
            encoders.insert(id.into(), LabelEncoder::fit(["no", "yes"]));
        }
        ModelBundle::from_parts(forest, encoders).unwrap()
    }

    /// State with a loaded model; `break_history` turns the history file into
    /// a directory so every append fails.
    fn test_state(break_history: bool) -> SharedState {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "nexus-guardian-assessment-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let history = HistoryStore::open(&dir).unwrap();
        if break_history {
            fs::remove_file(dir.join(HISTORY_FILE)).unwrap();
            fs::create_dir(dir.join(HISTORY_FILE)).unwrap();
        }
        Arc::new(AppState {
            users: UserStore::open(&dir).unwrap(),
            history,
            model: Some(Arc::new(tiny_bundle())),
            session_key: b"test-key-test-key-test-key-1234!".to_vec(),
            wizard_sessions: Arc::new(RwLock::new(HashMap::new())),
            monitors: Arc::new(RwLock::new(HashMap::new())),
            login_limiter: RateLimiter::new(5, 60),
            register_limiter: RateLimiter::new(10, 60),
        })
    }

    /// A session one valid answer away from completion.
    async fn prefill_at_last_step(state: &SharedState, username: &str) {
        let mut session = crate::domain::questionnaire::WizardSession::new();
        session.step = QUESTION_COUNT;
        session.answers = AnswerMap::from([
            ("age", Answer::Number(24.0)),
            ("gender", Answer::Text("male".into())),
            ("hours_per_day", Answer::Number(6.0)),
            ("days_per_week", Answer::Number(7.0)),
            ("game_genre", Answer::Text("moba".into())),
            ("loses_track_of_time", Answer::Text("yes".into())),
            ("skips_meals_or_sleep", Answer::Text("yes".into())),
            ("others_concerned", Answer::Text("yes".into())),
            ("stress_level", Answer::Number(8.0)),
            ("anxiety_level", Answer::Number(9.0)),
            ("sleep_hours", Answer::Number(5.0)),
            ("social_withdrawal", Answer::Text("often".into())),
            ("guilt_after_gaming", Answer::Text("yes".into())),
            ("gaming_as_coping", Answer::Text("yes".into())),
        ]);
        state
            .wizard_sessions
            .write()
            .await
            .insert(username.to_string(), session);
    }

    #[tokio::test]
    async fn completion_stores_a_row_and_reports_the_result() {
        let state = test_state(false);
        prefill_at_last_step(&state, "ada").await;

        let Json(resp) = message(
            UserSession("ada".to_string()),
            State(state.clone()),
            Json(MessagePayload { text: "10".into() }),
        )
        .await
        .unwrap();

        assert!(resp.done);
        assert_eq!(resp.step, 0);
        let result = resp.result.unwrap();
        assert!(resp.reply.contains(result.label));

        let rows = state.history.for_user("ada").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result, result.label);
        assert_eq!(rows[0].probability, result.probability_text);
    }

    #[tokio::test]
    async fn storage_failure_notice_carries_the_computed_result() {
        let state = test_state(true);
        prefill_at_last_step(&state, "bob").await;

        let (status, Json(body)) = message(
            UserSession("bob".to_string()),
            State(state.clone()),
            Json(MessagePayload { text: "10".into() }),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not saved"));
        // The classification survives the failed write.
        assert!(body["result"]["label"].is_string());
        assert!(body["result"]["probability"].is_number());
    }
}
