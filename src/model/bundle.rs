//! Serving-side model artifacts: loading the trained forest + encoders and
//! turning a completed answer map into a risk assessment.

use crate::domain::questionnaire::{Answer, AnswerMap, QUESTIONS, QUESTION_COUNT};
use crate::model::encoder::EncoderSet;
use crate::model::forest::RandomForest;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const MODEL_FILE: &str = "risk_model.json";
pub const ENCODERS_FILE: &str = "encoders.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    #[serde(rename = "HIGH RISK")]
    HighRisk,
    #[serde(rename = "OPTIMAL")]
    Optimal,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::HighRisk => "HIGH RISK",
            RiskLabel::Optimal => "OPTIMAL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub label: RiskLabel,
    /// Model confidence in the predicted class, in `0.0..=1.0`.
    pub probability: f64,
}

impl RiskAssessment {
    pub fn probability_text(&self) -> String {
        format!("{:.1}%", self.probability * 100.0)
    }
}

/// Trained classifier plus its frozen label encoders, loaded read-only.
pub struct ModelBundle {
    forest: RandomForest,
    encoders: EncoderSet,
}

impl ModelBundle {
    /// Load both artifacts from `dir`, validating them against the
    /// questionnaire schema. A missing or mismatched artifact is an error;
    /// the caller decides whether that disables diagnostics or aborts.
    pub fn load(dir: &Path) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let file = File::open(&model_path)
            .with_context(|| format!("model artifact missing: {}", model_path.display()))?;
        let forest: RandomForest = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("model artifact unreadable: {}", model_path.display()))?;

        let encoders_path = dir.join(ENCODERS_FILE);
        let file = File::open(&encoders_path)
            .with_context(|| format!("encoder artifact missing: {}", encoders_path.display()))?;
        let encoders: EncoderSet = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("encoder artifact unreadable: {}", encoders_path.display()))?;

        Self::from_parts(forest, encoders)
    }

    pub fn from_parts(forest: RandomForest, encoders: EncoderSet) -> Result<Self> {
        if forest.n_features() != QUESTION_COUNT {
            bail!(
                "model expects {} features, questionnaire has {}",
                forest.n_features(),
                QUESTION_COUNT
            );
        }
        for question in QUESTIONS.iter().filter(|q| q.categorical) {
            if !encoders.contains_key(question.id) {
                bail!("no fitted encoder for categorical column '{}'", question.id);
            }
        }
        Ok(Self { forest, encoders })
    }

    /// Encode a completed answer map into the fixed-order feature vector.
    /// Order and encoding mirror training time exactly.
    pub fn feature_vector(&self, answers: &AnswerMap) -> Result<Vec<f64>> {
        let mut vector = Vec::with_capacity(QUESTION_COUNT);
        for question in &QUESTIONS {
            let answer = answers
                .get(question.id)
                .with_context(|| format!("answer missing for '{}'", question.id))?;
            let value = match (answer, question.categorical) {
                (Answer::Number(v), false) => *v,
                (Answer::Text(text), true) => self
                    .encoders
                    .get(question.id)
                    .with_context(|| format!("no encoder for '{}'", question.id))?
                    .encode_or_default(question.id, text),
                _ => bail!("answer for '{}' has the wrong type", question.id),
            };
            vector.push(value);
        }
        Ok(vector)
    }

    /// Run the classifier over a completed questionnaire.
    pub fn assess(&self, answers: &AnswerMap) -> Result<RiskAssessment> {
        let vector = self.feature_vector(answers)?;
        let p_high = self.forest.predict_proba(&vector);
        let assessment = if p_high >= 0.5 {
            RiskAssessment {
                label: RiskLabel::HighRisk,
                probability: p_high,
            }
        } else {
            RiskAssessment {
                label: RiskLabel::Optimal,
                probability: 1.0 - p_high,
            }
        };
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dataset::Dataset;
    use crate::model::encoder::LabelEncoder;
    use crate::model::forest::ForestConfig;

    /// A bundle trained on synthetic survey rows where heavy play with high
    /// anxiety is labeled high risk.
    fn trained_bundle() -> ModelBundle {
        let names: Vec<String> = QUESTIONS.iter().map(|q| q.id.to_string()).collect();
        let mut ds = Dataset::new(names);
        for i in 0..120 {
            let heavy = i % 2 == 0;
            let flag = if heavy { 1.0 } else { 0.0 };
            let hours = if heavy { 6.0 } else { 1.0 };
            let anxiety = if heavy { 9.0 } else { 2.0 };
            let stress = if heavy { 8.0 } else { 3.0 };
            let row = vec![
                20.0 + (i % 30) as f64, // age
                (i % 3) as f64,         // gender
                hours,
                if heavy { 7.0 } else { 2.0 }, // days_per_week
                (i % 4) as f64,                // game_genre
                flag,                          // loses_track_of_time
                flag,                          // skips_meals_or_sleep
                flag,                          // others_concerned
                stress,
                anxiety,
                if heavy { 5.0 } else { 8.0 }, // sleep_hours
                if heavy { 3.0 } else { 1.0 }, // social_withdrawal
                flag,                          // guilt_after_gaming
                flag,                          // gaming_as_coping
                5.0,                           // years_gaming
            ];
            ds.push(row, flag);
        }
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 15,
                max_depth: 6,
                ..Default::default()
            },
            &ds,
        );

        let mut encoders = EncoderSet::new();
        encoders.insert("gender".into(), LabelEncoder::fit(["female", "male", "other"]));
        encoders.insert(
            "game_genre".into(),
            LabelEncoder::fit(["casual", "moba", "rpg", "shooter"]),
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
        encoders.insert(
            "social_withdrawal".into(),
            LabelEncoder::fit(["always", "never", "often", "rarely", "sometimes"]),
        );

        ModelBundle::from_parts(forest, encoders).unwrap()
    }

    fn answers(hours: f64, stress: f64, anxiety: f64, yes: bool) -> AnswerMap {
        let flag = if yes { "yes" } else { "no" };
        let mut map = AnswerMap::new();
        map.insert("age", Answer::Number(24.0));
        map.insert("gender", Answer::Text("male".into()));
        map.insert("hours_per_day", Answer::Number(hours));
        map.insert("days_per_week", Answer::Number(if yes { 7.0 } else { 2.0 }));
        map.insert("game_genre", Answer::Text("moba".into()));
        map.insert("loses_track_of_time", Answer::Text(flag.into()));
        map.insert("skips_meals_or_sleep", Answer::Text(flag.into()));
        map.insert("others_concerned", Answer::Text(flag.into()));
        map.insert("stress_level", Answer::Number(stress));
        map.insert("anxiety_level", Answer::Number(anxiety));
        map.insert("sleep_hours", Answer::Number(if yes { 5.0 } else { 8.0 }));
        map.insert(
            "social_withdrawal",
            Answer::Text(if yes { "often" } else { "never" }.into()),
        );
        map.insert("guilt_after_gaming", Answer::Text(flag.into()));
        map.insert("gaming_as_coping", Answer::Text(flag.into()));
        map.insert("years_gaming", Answer::Number(5.0));
        map
    }

    #[test]
    fn feature_vector_has_fifteen_fields_in_schema_order() {
        let bundle = trained_bundle();
        let vector = bundle.feature_vector(&answers(6.0, 8.0, 9.0, true)).unwrap();
        assert_eq!(vector.len(), QUESTION_COUNT);
        // Spot-check positions against the schema.
        assert_eq!(vector[0], 24.0); // age
        assert_eq!(vector[2], 6.0); // hours_per_day
        assert_eq!(vector[9], 9.0); // anxiety_level
        assert_eq!(vector[14], 5.0); // years_gaming
    }

    #[test]
    fn high_and_low_risk_profiles_classify_apart() {
        let bundle = trained_bundle();

        let risky = bundle.assess(&answers(7.0, 9.0, 9.0, true)).unwrap();
        assert_eq!(risky.label, RiskLabel::HighRisk);
        assert!(risky.probability >= 0.5);

        let calm = bundle.assess(&answers(1.0, 2.0, 2.0, false)).unwrap();
        assert_eq!(calm.label, RiskLabel::Optimal);
        assert!(calm.probability >= 0.5);
        assert_eq!(calm.probability_text().pop(), Some('%'));
    }

    #[test]
    fn unseen_genre_encodes_like_the_first_fitted_class() {
        let bundle = trained_bundle();
        let mut unseen = answers(6.0, 8.0, 9.0, true);
        unseen.insert("game_genre", Answer::Text("flight-sim".into()));
        let mut first = answers(6.0, 8.0, 9.0, true);
        first.insert("game_genre", Answer::Text("casual".into()));

        assert_eq!(
            bundle.feature_vector(&unseen).unwrap(),
            bundle.feature_vector(&first).unwrap()
        );
    }

    #[test]
    fn missing_answer_is_an_error() {
        let bundle = trained_bundle();
        let mut partial = answers(6.0, 8.0, 9.0, true);
        partial.remove("sleep_hours");
        assert!(bundle.feature_vector(&partial).is_err());
    }

    #[test]
    fn mismatched_artifacts_fail_validation() {
        let ds = Dataset::new(vec!["only".into(), "two".into()]);
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 1,
                ..Default::default()
            },
            &ds,
        );
        assert!(ModelBundle::from_parts(forest, EncoderSet::new()).is_err());
    }
}
