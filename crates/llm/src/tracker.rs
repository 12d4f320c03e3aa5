//! TokenTracker & WarningEvaluator (C6, spec §4.6).
//!
//! The bounded ring buffer is a `VecDeque` guarded by `parking_lot::Mutex`
//! (SPEC_FULL.md's ambient-stack decision) for per-instance shared state.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use ragflow_core::{
    LLMUsage, TokenWarning, TokenWarningKind, WarningSeverity,
};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 100;
const ROLLING_WINDOW: usize = 5;
const CONVERSATION_TOO_LONG_PCT: f32 = 0.8;

pub struct TokenTracker {
    capacity: usize,
    per_provider: Mutex<HashMap<String, VecDeque<LLMUsage>>>,
    per_session: Mutex<HashMap<Uuid, VecDeque<LLMUsage>>>,
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TokenTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            per_provider: Mutex::new(HashMap::new()),
            per_session: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, usage: &LLMUsage) {
        let mut providers = self.per_provider.lock();
        let buffer = providers.entry(usage.model_id.clone()).or_default();
        push_bounded(buffer, usage.clone(), self.capacity);

        if let Some(session_id) = usage.session_id {
            let mut sessions = self.per_session.lock();
            let buffer = sessions.entry(session_id).or_default();
            push_bounded(buffer, usage.clone(), self.capacity);
        }
    }

    pub fn provider_history_len(&self, model_id: &str) -> usize {
        self.per_provider.lock().get(model_id).map_or(0, |b| b.len())
    }

    pub fn session_history(&self, session_id: Uuid) -> Vec<LLMUsage> {
        self.per_session
            .lock()
            .get(&session_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn push_bounded(buffer: &mut VecDeque<LLMUsage>, usage: LLMUsage, capacity: usize) {
    if buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(usage);
}

pub struct WarningEvaluator;

impl WarningEvaluator {
    /// At most one warning per call, using the thresholds in spec §3.
    pub fn check(usage: &LLMUsage, model_context_window: u32) -> Option<TokenWarning> {
        if model_context_window == 0 {
            return None;
        }
        let pct = usage.total_tokens as f32 / model_context_window as f32 * 100.0;
        let (kind, severity) = if pct >= 95.0 {
            (TokenWarningKind::At95, WarningSeverity::Critical)
        } else if pct >= 85.0 {
            (TokenWarningKind::Approaching85, WarningSeverity::Warning)
        } else if pct >= 70.0 {
            (TokenWarningKind::Approaching70, WarningSeverity::Info)
        } else {
            return None;
        };

        Some(TokenWarning {
            kind,
            current: usage.total_tokens,
            limit: model_context_window,
            pct,
            severity,
            suggested_action: suggested_action(severity),
        })
    }

    /// Rolling sum of the last five calls; `CONVERSATION_TOO_LONG` once it
    /// exceeds 80% of the context window.
    pub fn check_conversation(
        session_usage_history: &[LLMUsage],
        model_context_window: u32,
    ) -> Option<TokenWarning> {
        if model_context_window == 0 {
            return None;
        }
        let rolling_sum: u32 = session_usage_history
            .iter()
            .rev()
            .take(ROLLING_WINDOW)
            .map(|u| u.total_tokens)
            .sum();
        let pct = rolling_sum as f32 / model_context_window as f32;
        if pct > CONVERSATION_TOO_LONG_PCT {
            Some(TokenWarning {
                kind: TokenWarningKind::ConversationTooLong,
                current: rolling_sum,
                limit: model_context_window,
                pct: pct * 100.0,
                severity: WarningSeverity::Warning,
                suggested_action: Some("start a new session or summarize history".to_string()),
            })
        } else {
            None
        }
    }
}

fn suggested_action(severity: WarningSeverity) -> Option<String> {
    match severity {
        WarningSeverity::Critical => Some("reduce prompt size or switch to a larger model".into()),
        WarningSeverity::Warning => Some("consider truncating context soon".into()),
        WarningSeverity::Info => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragflow_core::UsageService;

    fn usage(total_tokens: u32) -> LLMUsage {
        LLMUsage {
            prompt_tokens: total_tokens / 2,
            completion_tokens: total_tokens - total_tokens / 2,
            total_tokens,
            model_id: "claude-sonnet-4-20250514".into(),
            service: UsageService::Search,
            at: Utc::now(),
            user_id: None,
            session_id: None,
        }
    }

    #[test]
    fn ring_buffer_never_exceeds_capacity() {
        let tracker = TokenTracker::new(3);
        for i in 0..10 {
            tracker.record(&usage(i));
        }
        assert_eq!(tracker.provider_history_len("claude-sonnet-4-20250514"), 3);
    }

    #[test]
    fn warning_thresholds_are_monotone() {
        assert!(WarningEvaluator::check(&usage(100), 10_000).is_none());
        let w70 = WarningEvaluator::check(&usage(7_000), 10_000).unwrap();
        let w85 = WarningEvaluator::check(&usage(8_500), 10_000).unwrap();
        let w95 = WarningEvaluator::check(&usage(9_500), 10_000).unwrap();
        assert_eq!(w70.severity, WarningSeverity::Info);
        assert_eq!(w85.severity, WarningSeverity::Warning);
        assert_eq!(w95.severity, WarningSeverity::Critical);
        assert!(w85.severity > w70.severity);
        assert!(w95.severity > w85.severity);
    }

    #[test]
    fn conversation_too_long_uses_rolling_window_of_five() {
        let mut history = vec![usage(100); 10];
        history.extend(vec![usage(2_000); 5]);
        let warning = WarningEvaluator::check_conversation(&history, 10_000);
        assert!(warning.is_some());
        assert_eq!(warning.unwrap().kind, TokenWarningKind::ConversationTooLong);
    }

    #[test]
    fn exactly_at_threshold_does_not_warn() {
        let history = vec![usage(1_600); 5];
        assert!(WarningEvaluator::check_conversation(&history, 10_000).is_none());
    }
}
