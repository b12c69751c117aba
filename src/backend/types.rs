//! Backend wire types

use serde::{Deserialize, Serialize};

/// Snapshot of the trading screen sent with every chat message so the
/// assistant can answer in context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenState {
    pub current_btc_price: f64,
    pub selected_option_type: String,
    pub selected_strike: Option<f64>,
    pub selected_expiry: i64,
    pub visible_strikes: Vec<f64>,
    pub active_tab: String,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self {
            current_btc_price: 0.0,
            selected_option_type: String::new(),
            selected_strike: None,
            selected_expiry: 0,
            visible_strikes: Vec::new(),
            active_tab: String::new(),
        }
    }
}

/// Request body for `POST /gr2/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub screen_state: ScreenState,
}

/// Response body of `POST /gr2/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub jargon_terms: Option<Vec<String>>,
}

/// Response body of `GET /gr2/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_optional_fields() {
        let full: ChatResponse = serde_json::from_str(
            r#"{"answer":"Delta measures price sensitivity.","confidence":0.92,
                "sources":["kb/greeks.md"],"jargon_terms":["delta"]}"#,
        )
        .unwrap();
        assert_eq!(full.confidence, Some(0.92));
        assert_eq!(full.sources.as_deref(), Some(&["kb/greeks.md".to_string()][..]));

        let minimal: ChatResponse = serde_json::from_str(r#"{"answer":"hi"}"#).unwrap();
        assert_eq!(minimal.answer, "hi");
        assert!(minimal.confidence.is_none());
        assert!(minimal.sources.is_none());
        assert!(minimal.jargon_terms.is_none());
    }

    #[test]
    fn test_screen_state_round_trip_field_names() {
        let state = ScreenState {
            current_btc_price: 64250.5,
            selected_option_type: "call".into(),
            selected_strike: Some(65000.0),
            selected_expiry: 1_735_689_600,
            visible_strikes: vec![64000.0, 65000.0, 66000.0],
            active_tab: "options".into(),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["current_btc_price"], 64250.5);
        assert_eq!(value["selected_option_type"], "call");
        assert_eq!(value["visible_strikes"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_screen_state_defaults_for_missing_fields() {
        let state: ScreenState = serde_json::from_str(r#"{"active_tab":"chart"}"#).unwrap();
        assert_eq!(state.current_btc_price, 0.0);
        assert!(state.selected_strike.is_none());
        assert!(state.visible_strikes.is_empty());
        assert_eq!(state.active_tab, "chart");
    }
}
