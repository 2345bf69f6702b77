use crate::llm::{ChatCompleter, ChatMessage, CompletionRequest};
use tracing::{debug, error, info};

const SYSTEM_PROMPT: &str = "You are a business expert. Respond only with true or false.";

fn intent_prompt(user_message: &str, business_context: &str, schema_description: &str) -> String {
    format!(
        r#"
You are a business expert. You are given a question and business context (schema description, business context) and you need to determine if the question is business-related.
If it is, return True. If it is not, return False. And not explain anything.

Question: {}
Business Context: {}
Business Schema Description: {}
"#,
        user_message, business_context, schema_description
    )
}

/// Asks the completion endpoint whether `user_message` is business-related.
///
/// Passes when the lowercased answer contains `true`. Any failure to get an
/// answer lets the message through.
pub async fn business_intent_check(
    completer: &dyn ChatCompleter,
    user_message: &str,
    business_context: &str,
    schema_description: &str,
) -> bool {
    let prompt = intent_prompt(user_message, business_context, schema_description);
    debug!("Business intent prompt: {}", prompt);

    let request = CompletionRequest {
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
        temperature: 0.0,
        max_tokens: 10,
    };

    match completer.complete(request).await {
        Ok(content) => {
            let allowed = content.to_lowercase().contains("true");
            info!("Business intent check answered {:?}, allowed: {}", content.trim(), allowed);
            allowed
        }
        Err(e) => {
            error!("Error in business intent check, allowing message: {}", e);
            true
        }
    }
}
