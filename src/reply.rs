//! Reply-generation collaborator boundary.
//!
//! The pipeline only ever sees [`ReplyGenerator`]; the actual content service
//! lives behind it. The default [`EchoAssistant`] derives a canned
//! acknowledgement from the inbound text, which is what the development
//! client expects until the real generation backend is wired in.

use thiserror::Error;

/// Reply generation failed. Reported to the originating connection as an
/// `error` event; never fatal to the session.
#[derive(Debug, Error)]
#[error("No se pudo generar la respuesta: {0}")]
pub struct ReplyError(pub String);

/// Produces the textual reply for a user message.
///
/// Implementations must be cheap to call from the pipeline's reply task;
/// anything slow belongs behind the scheduling delay, not in `generate`.
pub trait ReplyGenerator: Send + Sync {
    fn generate(&self, text: &str, user_id: &str) -> Result<String, ReplyError>;
}

/// Development stand-in that acknowledges the message it was given.
#[derive(Debug, Default, Clone)]
pub struct EchoAssistant;

impl ReplyGenerator for EchoAssistant {
    fn generate(&self, text: &str, _user_id: &str) -> Result<String, ReplyError> {
        let trimmed = text.trim();
        Ok(format!(
            "He recibido tu mensaje: \"{trimmed}\". En breve te respondo."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_derived_from_input() {
        let reply = EchoAssistant.generate("hola", "u1").unwrap();
        assert!(reply.contains("hola"));
    }

    #[test]
    fn reply_trims_surrounding_whitespace() {
        let reply = EchoAssistant.generate("  hola  ", "u1").unwrap();
        assert!(reply.contains("\"hola\""));
    }
}
