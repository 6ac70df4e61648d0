use async_trait::async_trait;

use super::{
    BackendAdapter, Http,
    chat::{self, ChatRequest},
};
use crate::{
    chunk::ChunkSink,
    error::ServiceError,
    messages::TranslationJob,
    target::{BuiltInProtocol, BuiltInTarget, ServiceTarget},
};

/// Configured chat completion backends, streamed.
pub(super) struct StreamingChatAdapter {
    http: Http,
}

impl StreamingChatAdapter {
    pub(super) fn new(http: Http) -> Self {
        Self { http }
    }
}

#[async_trait]
impl BackendAdapter for StreamingChatAdapter {
    async fn run(
        &self,
        job: &TranslationJob,
        target: &ServiceTarget,
        sink: &mut ChunkSink,
    ) -> Result<(), ServiceError> {
        let ServiceTarget::BuiltIn(
            target @ BuiltInTarget {
                protocol: BuiltInProtocol::StreamingChat,
                ..
            },
        ) = target
        else {
            return Err(ServiceError::Internal(format!(
                "{} cannot serve service '{}'",
                self.name(),
                target.service_id()
            )));
        };

        let Some(model) = target.model.as_deref() else {
            return Err(ServiceError::Internal(format!(
                "service '{}' has no model configured",
                target.service_id
            )));
        };

        let body = ChatRequest::new(model, job, true);
        let request = chat::request(&self.http, target.endpoint.clone(), &target.api_key, &body);

        let response = self.http.send(request).await?;
        chat::relay(response, &self.http, sink).await
    }

    fn name(&self) -> &'static str {
        "streaming-chat"
    }
}
