// Prompt text and the output contract shared by every strategy.
use crate::facts::FactPack;
use crate::model::{Horizon, Risk};
use serde_json::{json, Value};

/// Top-level keys every accepted result must carry.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "symbol",
    "rating",
    "confidence",
    "summary",
    "action",
    "levels",
    "entry_plan",
    "exit_plan",
];

/// Name of the function the model is forced to call.
pub const FUNCTION_NAME: &str = "return_analysis";

pub const SYSTEM_PROMPT: &str = "You are a cautious market commentator. Use ONLY the provided JSON facts. \
Return structured fields for the analysis. \
Do NOT default to 3; pick the most likely direction based on evidence. \
If evidence is balanced, use 3 with LOW confidence and include a brief uncertainty note in risk_notes. \
You MUST include: an action among {buy,hold,sell}, levels (support/resistance), and both entry_plan and exit_plan. \
Entry guidance should be concrete (e.g., breakout above nearest resistance or pullback near support). \
Exit guidance should include numeric stops (e.g., just below support, ~0.5*ATR) and targets (e.g., next resistance). \
Default rubric (unless contradicted by facts): rating>=4 & confidence>=0.65 => buy; \
rating<=2 & confidence>=0.65 => sell; otherwise hold. \
Output must strictly match the schema when provided.";

/// The user turn: horizon, risk and the compact fact pack.
pub fn user_message(facts: &FactPack, horizon: Horizon, risk: Risk) -> String {
    format!(
        "HORIZON={}\nRISK={}\nFACTS={}",
        horizon,
        risk,
        facts.to_compact_json()
    )
}

fn numbers(max_items: Option<u64>) -> Value {
    match max_items {
        Some(n) => json!({"type": "array", "items": {"type": "number"}, "maxItems": n}),
        None => json!({"type": "array", "items": {"type": "number"}}),
    }
}

fn strings() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

/// JSON schema of an analysis result.
pub fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {"type": "string"},
            "rating": {"type": "integer", "minimum": 1, "maximum": 5},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "summary": {"type": "string"},
            "action": {"type": "string", "enum": ["buy", "hold", "sell"]},
            "trend": {
                "type": "object",
                "properties": {
                    "dir": {"type": "string", "enum": ["up", "down", "side"]},
                    "rsi": {"type": "number"},
                    "sma20_above50": {"type": "boolean"},
                    "price_vs_sma200": {"type": "string", "enum": ["above", "below"]}
                },
                "required": ["dir"],
                "additionalProperties": true
            },
            "levels": {
                "type": "object",
                "properties": {
                    "support": numbers(None),
                    "resistance": numbers(None)
                },
                "required": ["support", "resistance"],
                "additionalProperties": true
            },
            "entry_plan": {
                "type": "object",
                "properties": {
                    "method": {"type": "string"},
                    "entries": numbers(Some(2)),
                    "notes": {"type": "string"}
                },
                "required": ["method", "entries"],
                "additionalProperties": true
            },
            "exit_plan": {
                "type": "object",
                "properties": {
                    "stops": numbers(Some(2)),
                    "targets": numbers(Some(3)),
                    "notes": {"type": "string"}
                },
                "required": ["stops", "targets"],
                "additionalProperties": true
            },
            "signals_bull": strings(),
            "signals_bear": strings(),
            "derivs": {
                "type": "object",
                "properties": {
                    "funding": {"type": "number"},
                    "oi_chg_24h": {"type": "number"},
                    "iv_rank": {"type": "number"}
                },
                "additionalProperties": true
            },
            "events": {
                "type": "object",
                "properties": {
                    "next_earn": {"type": "string"},
                    "div_ex": {"type": "string"}
                },
                "additionalProperties": true
            },
            "news": strings(),
            "risk_notes": strings()
        },
        "required": REQUIRED_FIELDS,
        "additionalProperties": true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::LevelSet;
    use crate::facts::{EventsBlock, PriceBlock, TrendBlock};

    #[test]
    fn schema_requires_exactly_the_contract_fields() {
        let schema = analysis_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, REQUIRED_FIELDS);
        assert_eq!(schema["properties"]["action"]["enum"], json!(["buy", "hold", "sell"]));
        assert_eq!(schema["properties"]["exit_plan"]["properties"]["targets"]["maxItems"], 3);
    }

    #[test]
    fn user_message_layout() {
        let facts = FactPack {
            symbol: "AAPL".into(),
            horizon: Horizon::Swing,
            risk: Risk::Low,
            price: PriceBlock {
                last: Some(190.12),
                prev: None,
                chg: None,
            },
            trend: TrendBlock::default(),
            levels: LevelSet::default(),
            derivs: None,
            events: EventsBlock::default(),
            news: vec![],
        };
        let msg = user_message(&facts, Horizon::Position, Risk::High);
        let mut lines = msg.lines();
        assert_eq!(lines.next(), Some("HORIZON=position"));
        assert_eq!(lines.next(), Some("RISK=high"));
        let facts_line = lines.next().unwrap();
        assert!(facts_line.starts_with("FACTS={"));
        assert!(!facts_line.contains(' '));
        assert!(facts_line.contains(r#""price":{"last":190.12}"#));
    }
}
