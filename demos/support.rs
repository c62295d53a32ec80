//! Synthetic data shared by the demos

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const CATEGORIES: [&str; 15] = [
    "es_transportation",
    "es_health",
    "es_otherservices",
    "es_food",
    "es_hotelservices",
    "es_barsandrestaurants",
    "es_tech",
    "es_sportsandtoys",
    "es_wellnessandbeauty",
    "es_hyper",
    "es_fashion",
    "es_home",
    "es_contents",
    "es_travel",
    "es_leisure",
];
const GENDERS: [&str; 4] = ["M", "F", "E", "U"];
const AGES: [&str; 8] = ["0", "1", "2", "3", "4", "5", "6", "U"];
const EVENTS: [&str; 3] = ["details_change", "password_change", "login"];

/// Write `transactions.csv` and `events.csv` covering three days
pub fn generate_data(dir: &Path, seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir.join("data"))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().ok_or("bad start date")?;

    let mut transactions = csv::Writer::from_path(dir.join("data/transactions.csv"))?;
    transactions.write_record([
        "step", "source", "age", "gender", "category", "amount", "fraud", "timestamp",
    ])?;
    for step in 0..3_000u32 {
        let customer = rng.gen_range(0..200);
        let at = start + Duration::seconds(rng.gen_range(0..3 * 86_400));
        let fraud = rng.gen_bool(0.02);
        let amount: f64 = if fraud {
            rng.gen_range(200.0..2_000.0)
        } else {
            rng.gen_range(1.0..150.0)
        };
        transactions.write_record([
            step.to_string(),
            format!("C{}", customer),
            AGES[customer % AGES.len()].to_string(),
            GENDERS[customer % GENDERS.len()].to_string(),
            CATEGORIES[rng.gen_range(0..CATEGORIES.len())].to_string(),
            format!("{:.2}", amount),
            u8::from(fraud).to_string(),
            at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }
    transactions.flush()?;

    let mut events = csv::Writer::from_path(dir.join("data/events.csv"))?;
    events.write_record(["source", "event", "timestamp"])?;
    for _ in 0..600 {
        let at = start + Duration::seconds(rng.gen_range(0..3 * 86_400));
        events.write_record([
            format!("C{}", rng.gen_range(0..200)),
            EVENTS[rng.gen_range(0..EVENTS.len())].to_string(),
            at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }
    events.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fstore_sdk::{builtin_handlers, FeatureStoreBuilder, PipelineConfig, StepKind};

    #[test]
    fn test_generated_data_is_deterministic() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        generate_data(first.path(), 7).unwrap();
        generate_data(second.path(), 7).unwrap();

        let a = std::fs::read_to_string(first.path().join("data/transactions.csv")).unwrap();
        let b = std::fs::read_to_string(second.path().join("data/transactions.csv")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.lines().count(), 3_001);
        assert!(first.path().join("data/events.csv").exists());
    }

    #[test]
    fn test_fraud_pipeline_sums_every_encoded_category() {
        let pipeline =
            PipelineConfig::from_yaml_str(include_str!("pipelines/fraud.yaml")).unwrap();
        let transactions = pipeline.feature_set("transactions").unwrap();
        let vocabulary = transactions
            .steps
            .iter()
            .find_map(|step| match &step.kind {
                StepKind::OneHotEncoder(encoder) => encoder.mapping.get("category").cloned(),
                _ => None,
            })
            .unwrap();
        assert_eq!(vocabulary, CATEGORIES.map(String::from).to_vec());

        for category in &vocabulary {
            let column = format!("category_{}", category);
            assert!(
                transactions.aggregations.iter().any(|a| a.column == column),
                "no aggregation over {}",
                column
            );
        }

        let names = FeatureStoreBuilder::new()
            .with_pipeline(pipeline)
            .with_handlers(builtin_handlers())
            .validate()
            .unwrap();
        assert_eq!(names, vec!["transactions", "events", "labels"]);
    }
}
