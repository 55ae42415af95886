use async_trait::async_trait;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use crate::actuator::ChatActuator;
use streamchat_foundation::ActuationError;

/// Synthetic-input actuator. Assumes the chat input box already has
/// focus (the operator sets the window up once); types the message,
/// submits with Return, and presses Escape to defocus afterwards so
/// later keystrokes on the machine don't land in the chat box.
pub struct EnigoActuator;

impl EnigoActuator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnigoActuator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatActuator for EnigoActuator {
    async fn is_chat_available(&self) -> bool {
        // If an input backend can be created at all we consider the
        // surface reachable; permission problems show up here.
        let result = tokio::task::spawn_blocking(|| Enigo::new(&Settings::default()).is_ok()).await;
        matches!(result, Ok(true))
    }

    async fn type_message(&self, text: &str) -> Result<bool, ActuationError> {
        let message = text.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let mut enigo = Enigo::new(&Settings::default())
                .map_err(|e| ActuationError::Backend(format!("Failed to create Enigo: {}", e)))?;

            enigo
                .text(&message)
                .map_err(|e| ActuationError::Backend(format!("Failed to type text: {}", e)))?;
            enigo
                .key(Key::Return, Direction::Click)
                .map_err(|e| ActuationError::Backend(format!("Failed to submit: {}", e)))?;
            enigo
                .key(Key::Escape, Direction::Click)
                .map_err(|e| ActuationError::Backend(format!("Failed to defocus: {}", e)))?;

            Ok::<(), ActuationError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                tracing::info!("Chat message typed ({} chars)", text.len());
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ActuationError::TaskJoin),
        }
    }
}
