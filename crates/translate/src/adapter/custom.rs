use async_trait::async_trait;
use url::Url;

use super::{
    BackendAdapter, Http,
    chat::{self, ChatRequest},
};
use crate::{chunk::ChunkSink, error::ServiceError, messages::TranslationJob, target::ServiceTarget};

/// Caller-supplied OpenAI-compatible endpoints.
///
/// Only reached after the endpoint policy accepted the target.
pub(super) struct CustomStreamingChatAdapter {
    http: Http,
}

impl CustomStreamingChatAdapter {
    pub(super) fn new(http: Http) -> Self {
        Self { http }
    }
}

#[async_trait]
impl BackendAdapter for CustomStreamingChatAdapter {
    async fn run(
        &self,
        job: &TranslationJob,
        target: &ServiceTarget,
        sink: &mut ChunkSink,
    ) -> Result<(), ServiceError> {
        let ServiceTarget::Custom(target) = target else {
            return Err(ServiceError::Internal(format!(
                "{} cannot serve service '{}'",
                self.name(),
                target.service_id()
            )));
        };

        let endpoint = Url::parse(&target.endpoint)
            .map_err(|e| ServiceError::Internal(format!("endpoint of service '{}' is invalid: {e}", target.id)))?;

        log::debug!(
            "Calling custom service '{}' ({}) at {}",
            target.id,
            target.name,
            endpoint.origin().ascii_serialization()
        );

        let body = ChatRequest::new(&target.model, job, true);
        let request = chat::request(&self.http, endpoint, &target.api_key, &body);

        let response = self.http.send(request).await?;
        chat::relay(response, &self.http, sink).await
    }

    fn name(&self) -> &'static str {
        "custom-streaming-chat"
    }
}
