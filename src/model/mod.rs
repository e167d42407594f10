pub mod bundle;
pub mod dataset;
pub mod encoder;
pub mod forest;

pub use bundle::{ModelBundle, RiskAssessment, RiskLabel};
pub use dataset::Dataset;
pub use encoder::{EncoderSet, LabelEncoder};
pub use forest::{ForestConfig, RandomForest};
