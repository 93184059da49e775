use crate::analyzer::LevelSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys a result must carry to be accepted. `action` is absent on purpose:
/// a missing or unknown action is derived from rating and confidence.
pub const VALIDATED_FIELDS: [&str; 7] = [
    "symbol",
    "rating",
    "confidence",
    "summary",
    "levels",
    "entry_plan",
    "exit_plan",
];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("result is not a JSON object")]
    NotAnObject,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("invalid rating: {0}")]
    InvalidRating(String),

    #[error("invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("malformed result: {0}")]
    Shape(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    /// rating >= 4 with confidence >= 0.65 buys, rating <= 2 with the same
    /// confidence sells, anything else holds.
    pub fn derive(rating: u8, confidence: f64) -> Self {
        if rating >= 4 && confidence >= 0.65 {
            Action::Buy
        } else if rating <= 2 && confidence >= 0.65 {
            Action::Sell
        } else {
            Action::Hold
        }
    }

    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()?.trim().to_lowercase().as_str() {
            "buy" => Some(Action::Buy),
            "hold" => Some(Action::Hold),
            "sell" => Some(Action::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub entries: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    #[serde(default)]
    pub stops: Vec<f64>,
    #[serde(default)]
    pub targets: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A model answer that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub rating: u8,
    pub confidence: f64,
    pub summary: String,
    pub action: Action,
    pub levels: LevelSet,
    pub entry_plan: EntryPlan,
    pub exit_plan: ExitPlan,
    // Advisory blocks echoed by the model; kept as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Value>,
    #[serde(default)]
    pub signals_bull: Vec<String>,
    #[serde(default)]
    pub signals_bear: Vec<String>,
    #[serde(default)]
    pub news: Vec<String>,
    #[serde(default)]
    pub risk_notes: Vec<String>,
}

impl AnalysisResult {
    /// Fills each empty side of `levels` from the detector's own output.
    pub fn backfill_levels(&mut self, detected: &LevelSet) {
        if self.levels.support.is_empty() {
            self.levels.support = detected.support.clone();
        }
        if self.levels.resistance.is_empty() {
            self.levels.resistance = detected.resistance.clone();
        }
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn coerce_rating(value: &Value) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::InvalidRating(value.to_string());
    let rating = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => n.as_f64().filter(|f| f.is_finite()).ok_or_else(invalid)?.trunc() as i64,
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if (1..=5).contains(&rating) {
        Ok(rating as u8)
    } else {
        Err(invalid())
    }
}

fn coerce_confidence(value: &Value) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::InvalidConfidence(value.to_string());
    let confidence = match value {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(invalid())
    }
}

fn missing_fields(map: &Map<String, Value>) -> Vec<String> {
    VALIDATED_FIELDS
        .iter()
        .filter(|key| !map.contains_key(**key))
        .map(|key| key.to_string())
        .collect()
}

/// Checks a decoded model answer and normalizes it into an [`AnalysisResult`].
///
/// Nulls are dropped first, so a `null` required key counts as missing.
/// Rating accepts integers, floats (truncated) and numeric strings; confidence
/// accepts numbers and numeric strings. List fields longer than `list_cap`
/// are truncated.
pub fn validate(mut value: Value, list_cap: usize) -> Result<AnalysisResult, ValidationError> {
    strip_nulls(&mut value);
    let Value::Object(mut map) = value else {
        return Err(ValidationError::NotAnObject);
    };

    let missing = missing_fields(&map);
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let rating = coerce_rating(&map["rating"])?;
    let confidence = coerce_confidence(&map["confidence"])?;
    let action = map
        .get("action")
        .and_then(Action::parse)
        .unwrap_or_else(|| Action::derive(rating, confidence));

    map.insert("rating".into(), rating.into());
    map.insert("confidence".into(), confidence.into());
    map.insert("action".into(), serde_json::to_value(action)?);

    let mut result: AnalysisResult = serde_json::from_value(Value::Object(map))?;
    for list in [
        &mut result.signals_bull,
        &mut result.signals_bear,
        &mut result.news,
        &mut result.risk_notes,
    ] {
        list.truncate(list_cap);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer() -> Value {
        json!({
            "symbol": "AAPL",
            "rating": 4,
            "confidence": 0.7,
            "summary": "Uptrend intact above the 50-day.",
            "action": "buy",
            "levels": {"support": [185.0], "resistance": [195.5]},
            "entry_plan": {"method": "pullback", "entries": [186.0]},
            "exit_plan": {"stops": [182.0], "targets": [195.5, 201.0]},
        })
    }

    #[test]
    fn accepts_a_complete_answer() {
        let r = validate(answer(), 8).unwrap();
        assert_eq!(r.symbol, "AAPL");
        assert_eq!(r.rating, 4);
        assert_eq!(r.action, Action::Buy);
        assert_eq!(r.levels.resistance, vec![195.5]);
        assert_eq!(r.exit_plan.targets, vec![195.5, 201.0]);
        assert!(r.signals_bull.is_empty());
        assert!(r.trend.is_none());
    }

    #[test]
    fn derived_action_rule() {
        assert_eq!(Action::derive(5, 0.8), Action::Buy);
        assert_eq!(Action::derive(1, 0.9), Action::Sell);
        assert_eq!(Action::derive(3, 0.5), Action::Hold);
        assert_eq!(Action::derive(4, 0.64), Action::Hold);
        assert_eq!(Action::derive(2, 0.65), Action::Sell);
    }

    #[test]
    fn missing_or_unknown_action_is_derived() {
        let mut v = answer();
        v["rating"] = json!(5);
        v["confidence"] = json!(0.8);
        v.as_object_mut().unwrap().remove("action");
        assert_eq!(validate(v, 8).unwrap().action, Action::Buy);

        let mut v = answer();
        v["rating"] = json!(1);
        v["confidence"] = json!(0.9);
        v["action"] = json!("strong sell");
        assert_eq!(validate(v, 8).unwrap().action, Action::Sell);

        let mut v = answer();
        v["rating"] = json!(3);
        v["confidence"] = json!(0.5);
        v["action"] = Value::Null;
        assert_eq!(validate(v, 8).unwrap().action, Action::Hold);
    }

    #[test]
    fn explicit_action_wins_over_the_rule() {
        let mut v = answer();
        v["action"] = json!("Hold");
        assert_eq!(validate(v, 8).unwrap().action, Action::Hold);
    }

    #[test]
    fn rejects_non_objects_and_missing_keys() {
        assert!(matches!(validate(json!([1, 2]), 8), Err(ValidationError::NotAnObject)));

        let mut v = answer();
        let map = v.as_object_mut().unwrap();
        map.remove("summary");
        map.insert("exit_plan".into(), Value::Null);
        match validate(v, 8) {
            Err(ValidationError::MissingFields(keys)) => {
                assert_eq!(keys, vec!["summary".to_string(), "exit_plan".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rating_coercion() {
        for (raw, want) in [(json!(3), 3), (json!(4.9), 4), (json!("2"), 2), (json!(" 5 "), 5)] {
            let mut v = answer();
            v["rating"] = raw;
            assert_eq!(validate(v, 8).unwrap().rating, want);
        }
        for raw in [json!(0), json!(6), json!("four"), json!(true), json!(-1.5)] {
            let mut v = answer();
            v["rating"] = raw;
            assert!(matches!(validate(v, 8), Err(ValidationError::InvalidRating(_))));
        }
    }

    #[test]
    fn confidence_coercion() {
        let mut v = answer();
        v["confidence"] = json!("0.55");
        assert_eq!(validate(v, 8).unwrap().confidence, 0.55);

        let mut v = answer();
        v["confidence"] = json!(1);
        assert_eq!(validate(v, 8).unwrap().confidence, 1.0);

        for raw in [json!(1.2), json!(-0.1), json!("high"), json!([0.5])] {
            let mut v = answer();
            v["confidence"] = raw;
            assert!(matches!(validate(v, 8), Err(ValidationError::InvalidConfidence(_))));
        }
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        let mut v = answer();
        v["levels"] = json!("near 190");
        assert!(matches!(validate(v, 8), Err(ValidationError::Shape(_))));

        let mut v = answer();
        v["symbol"] = json!(42);
        assert!(matches!(validate(v, 8), Err(ValidationError::Shape(_))));
    }

    #[test]
    fn long_lists_are_clipped() {
        let mut v = answer();
        let many: Vec<String> = (0..12).map(|i| format!("note {}", i)).collect();
        v["signals_bull"] = json!(many);
        v["risk_notes"] = json!(many);
        v["news"] = json!(["one", "two"]);
        let r = validate(v, 8).unwrap();
        assert_eq!(r.signals_bull.len(), 8);
        assert_eq!(r.signals_bull[7], "note 7");
        assert_eq!(r.risk_notes.len(), 8);
        assert_eq!(r.news.len(), 2);
    }

    #[test]
    fn plans_tolerate_missing_members() {
        let mut v = answer();
        v["entry_plan"] = json!({"notes": "wait for a close above 195"});
        v["exit_plan"] = json!({"stops": [180.0], "targets": null});
        let r = validate(v, 8).unwrap();
        assert_eq!(r.entry_plan.method, "");
        assert!(r.entry_plan.entries.is_empty());
        assert_eq!(r.exit_plan.stops, vec![180.0]);
        assert!(r.exit_plan.targets.is_empty());
    }

    #[test]
    fn backfill_fills_each_side_independently() {
        let mut v = answer();
        v["levels"] = json!({"resistance": [199.0]});
        let mut r = validate(v, 8).unwrap();
        let detected = LevelSet {
            support: vec![180.0, 184.5],
            resistance: vec![196.0],
        };
        r.backfill_levels(&detected);
        assert_eq!(r.levels.support, vec![180.0, 184.5]);
        assert_eq!(r.levels.resistance, vec![199.0]);
    }
}
