use std::{pin::Pin, sync::Arc};

use futures::Stream;
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    adapter::{Adapters, BackendAdapter},
    chunk::{ChunkSink, NormalizedChunk},
    error::ServiceError,
    history::{HistoryRecord, HistorySink},
    messages::{CustomApi, TranslateRequest, TranslationJob},
    policy::EndpointPolicy,
    resolver::ConfigResolver,
    target::ServiceTarget,
};

/// Chunks buffered between the service tasks and the client connection.
const OUTPUT_BUFFER: usize = 64;

/// All chunks of one request. Ends once every requested service is terminal.
///
/// Dropping the stream cancels every service still running.
pub(crate) type ChunkStream = Pin<Box<dyn Stream<Item = NormalizedChunk> + Send>>;

/// Fans translation requests out to their services and merges the results.
#[derive(Clone)]
pub(crate) struct Aggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    resolver: ConfigResolver,
    policy: Arc<dyn EndpointPolicy>,
    adapters: Adapters,
    history: Arc<dyn HistorySink>,
}

type Prepared = Result<(ServiceTarget, Arc<dyn BackendAdapter>), ServiceError>;

impl Aggregator {
    pub(crate) fn new(
        resolver: ConfigResolver,
        policy: Arc<dyn EndpointPolicy>,
        adapters: Adapters,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                resolver,
                policy,
                adapters,
                history,
            }),
        }
    }

    /// Starts one task per requested service and returns their merged output.
    ///
    /// Must be called within a tokio runtime. The request is expected to be validated.
    pub(crate) fn dispatch(&self, request: TranslateRequest) -> ChunkStream {
        let session_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(OUTPUT_BUFFER);

        let text: Arc<str> = Arc::from(request.text.as_str());
        let source_lang: Arc<str> = Arc::from(request.source_lang());
        let target_lang: Arc<str> = Arc::from(request.target_lang.trim());

        let service_ids = request.service_ids();

        log::debug!(
            "Session {session_id}: translating {} characters into {target_lang} with {} service(s)",
            text.chars().count(),
            service_ids.len()
        );

        for service_id in service_ids {
            let prepared = self.prepare(session_id, &service_id, &request.custom_apis);

            let job = TranslationJob {
                text: text.clone(),
                source_lang: source_lang.clone(),
                target_lang: target_lang.clone(),
                service_id: service_id.clone(),
            };

            let sink = ChunkSink::new(service_id, sender.clone());

            tokio::spawn(run_service(
                session_id,
                job,
                prepared,
                sink,
                self.inner.history.clone(),
                cancellation.child_token(),
            ));
        }

        // The stream ends when the last task drops its sender.
        drop(sender);

        let guard = cancellation.drop_guard();

        let chunks = futures::stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
            let chunk = receiver.recv().await?;
            Some((chunk, (receiver, guard)))
        });

        Box::pin(chunks)
    }

    fn prepare(&self, session_id: Uuid, service_id: &str, custom_apis: &[CustomApi]) -> Prepared {
        log::debug!("Session {session_id}: resolving service '{service_id}'");
        let target = self.inner.resolver.resolve(service_id, custom_apis)?;

        log::debug!("Session {session_id}: authorizing service '{service_id}'");
        self.inner.policy.authorize(&target)?;

        let adapter = self.inner.adapters.get(target.adapter_kind()).clone();

        Ok((target, adapter))
    }
}

async fn run_service(
    session_id: Uuid,
    job: TranslationJob,
    prepared: Prepared,
    mut sink: ChunkSink,
    history: Arc<dyn HistorySink>,
    cancellation: CancellationToken,
) {
    let outcome = match prepared {
        Ok((target, adapter)) => {
            log::debug!(
                "Session {session_id}: streaming service '{}' through {}",
                job.service_id,
                adapter.name()
            );

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(ServiceError::Cancelled),
                outcome = adapter.run(&job, &target, &mut sink) => outcome,
            }
        }
        Err(error) => Err(error),
    };

    // The client sees the end of the stream only after history is written.
    let _open = sink.hold_open();

    let Some(full_text) = sink.finish(outcome).await else {
        log::debug!("Session {session_id}: service '{}' ended without a result", job.service_id);
        return;
    };

    log::debug!("Session {session_id}: service '{}' done", job.service_id);

    history.record(HistoryRecord {
        service_id: job.service_id,
        full_text,
        timestamp: Timestamp::now(),
    });
}
