use async_trait::async_trait;

/// Asks the human operator whether to displace the active operator.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn confirm_takeover(&self, active_user: &str) -> bool;
}

/// Answers every takeover question the same way; used by headless embeddings.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl OperatorPrompt for FixedAnswer {
    async fn confirm_takeover(&self, _active_user: &str) -> bool {
        self.0
    }
}
