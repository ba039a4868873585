//! Property-based tests for the LLM wire translation and error classification

use super::openai::OpenAIService;
use super::types::{LlmMessage, LlmRequest, MessageRole, SystemContent};
use super::LlmError;
use proptest::prelude::*;

fn arb_message() -> impl Strategy<Value = LlmMessage> {
    (
        prop_oneof![Just(MessageRole::User), Just(MessageRole::Assistant)],
        "[a-zA-Z0-9 _.!?,]{0,80}",
    )
        .prop_map(|(role, text)| LlmMessage { role, text })
}

fn arb_request() -> impl Strategy<Value = LlmRequest> {
    (
        prop::collection::vec("[a-zA-Z ]{1,40}", 0..3),
        prop::collection::vec(arb_message(), 1..6),
        prop::option::of(1u32..4096),
    )
        .prop_map(|(system, messages, max_tokens)| LlmRequest {
            system: system.into_iter().map(SystemContent::new).collect(),
            messages,
            max_tokens,
        })
}

proptest! {
    #[test]
    fn translation_preserves_message_order(request in arb_request()) {
        let service = OpenAIService::new("k".to_string(), "gpt-4", None).unwrap();
        let wire = serde_json::to_value(service.translate_request(&request)).unwrap();
        let messages = wire["messages"].as_array().unwrap();

        let offset = usize::from(!request.system.is_empty());
        prop_assert_eq!(messages.len(), request.messages.len() + offset);
        if offset == 1 {
            prop_assert_eq!(messages[0]["role"].as_str(), Some("system"));
        }
        for (wire_msg, msg) in messages.iter().skip(offset).zip(&request.messages) {
            prop_assert_eq!(wire_msg["role"].as_str(), Some(msg.role.as_str()));
            prop_assert_eq!(wire_msg["content"].as_str(), Some(msg.text.as_str()));
        }
    }

    #[test]
    fn only_rate_limits_and_server_errors_retry(status in 100u16..600) {
        let retryable = LlmError::from_status(status, "body").kind.is_retryable();
        prop_assert_eq!(retryable, status == 429 || (500..600).contains(&status));
    }
}
