use super::naming::EntryNamer;
use crate::error::ArchiveError;
use crate::models::{ArchiveItem, ArchiveReport, AuditEvent, AuditEventType, EntryOutcome};
use crate::storage::{ArtifactStore, AuditLog};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Compressed chunks buffered between the archive task and its consumer.
const CHUNK_CHANNEL_CAPACITY: usize = 4;

/// `Write` sink the zip writer appends to; drained after every entry.
#[derive(Clone, Default)]
struct ChunkBuffer(Arc<Mutex<Vec<u8>>>);

impl ChunkBuffer {
    fn take(&self) -> Bytes {
        Bytes::from(std::mem::take(&mut *self.0.lock()))
    }
}

impl Write for ChunkBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Streams stored invoice PDFs into a single zip archive.
///
/// Reads run concurrently up to `concurrency`, entries are appended in
/// request order, and missing artifacts are skipped and reported.
#[derive(Clone)]
pub struct BatchArchiveBuilder {
    store: Arc<dyn ArtifactStore>,
    audit: Option<Arc<dyn AuditLog>>,
    concurrency: usize,
}

impl BatchArchiveBuilder {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            audit: None,
            concurrency: 4,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Start building the archive in the background and return its byte stream.
    ///
    /// Must be called inside a tokio runtime. Dropping the returned stream
    /// cancels the build.
    pub fn build(&self, actor: &str, items: Vec<ArchiveItem>) -> Result<ArchiveStream, ArchiveError> {
        if items.is_empty() {
            return Err(ArchiveError::EmptyBatch);
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (report_tx, report_rx) = oneshot::channel();

        let job = ArchiveJob {
            job_id: job_id.clone(),
            actor: actor.to_string(),
            items,
            store: self.store.clone(),
            audit: self.audit.clone(),
            concurrency: self.concurrency,
        };

        info!("📦 Starting batch archive {} with {} item(s)", job_id, job.items.len());
        tokio::spawn(async move {
            match job.run(&chunk_tx).await {
                Ok(Some(report)) => {
                    let _ = report_tx.send(report);
                }
                Ok(None) => info!("🛑 Batch archive cancelled by consumer"),
                Err(e) => {
                    error!("❌ Batch archive failed: {}", e);
                    let _ = chunk_tx.send(Err(e)).await;
                }
            }
        });

        Ok(ArchiveStream {
            job_id,
            chunks: chunk_rx,
            report: report_rx,
        })
    }
}

struct ArchiveJob {
    job_id: String,
    actor: String,
    items: Vec<ArchiveItem>,
    store: Arc<dyn ArtifactStore>,
    audit: Option<Arc<dyn AuditLog>>,
    concurrency: usize,
}

type ChunkSender = mpsc::Sender<Result<Bytes, ArchiveError>>;

impl ArchiveJob {
    /// `Ok(None)` when the consumer went away before the archive was finalized.
    async fn run(self, chunks: &ChunkSender) -> Result<Option<ArchiveReport>, ArchiveError> {
        let buffer = ChunkBuffer::default();
        let mut zip = ZipWriter::new_stream(buffer.clone());
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        let store = self.store.clone();
        // `buffered` keeps at most `concurrency` reads in flight and yields in input order.
        let mut reads = stream::iter(self.items.iter().cloned())
            .map(|item| {
                let store = store.clone();
                async move {
                    let result = store.read_artifact(&item.artifact_ref).await;
                    (item, result)
                }
            })
            .buffered(self.concurrency);

        let mut namer = EntryNamer::default();
        let mut outcomes = Vec::with_capacity(self.items.len());
        let mut representative_customer = None;

        while let Some((item, result)) = reads.next().await {
            if chunks.is_closed() {
                return Ok(None);
            }

            let outcome = match result {
                Ok(Some(pdf)) => {
                    let entry_name = namer.next(&item);
                    zip.start_file(entry_name.as_str(), options)?;
                    zip.write_all(&pdf)?;
                    representative_customer.get_or_insert_with(|| item.customer_name.clone());
                    EntryOutcome::Included { entry_name }
                }
                Ok(None) => {
                    warn!("⚠️ Skipping {}: artifact {} not found", item.id, item.artifact_ref);
                    EntryOutcome::Skipped {
                        reason: format!("artifact {} not found", item.artifact_ref),
                    }
                }
                Err(e) => {
                    warn!("⚠️ Skipping {}: {}", item.id, e);
                    EntryOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push((item.id, outcome));

            if !send_pending(&buffer, chunks).await {
                return Ok(None);
            }
        }
        drop(reads);

        zip.finish()?;
        if !send_pending(&buffer, chunks).await {
            return Ok(None);
        }

        let report = ArchiveReport {
            job_id: self.job_id.clone(),
            outcomes,
            representative_customer,
            completed_at: Utc::now(),
        };
        info!(
            "✅ Batch archive {} finalized: {} included, {} skipped",
            report.job_id,
            report.included(),
            report.skipped()
        );

        self.record_audit(&report).await;
        Ok(Some(report))
    }

    async fn record_audit(&self, report: &ArchiveReport) {
        let Some(audit) = &self.audit else {
            return;
        };

        let event = AuditEvent::new(AuditEventType::BatchDownload)
            .actor(self.actor.clone())
            .subject(report.representative_customer.clone().unwrap_or_default())
            .detail(serde_json::json!({
                "job_id": report.job_id,
                "count": report.included(),
                "skipped": report.skipped(),
                "representative_customer": report.representative_customer,
            }))
            .occurred_at(report.completed_at);

        if let Err(e) = audit.record(event).await {
            warn!("⚠️ Failed to record batch download audit event: {}", e);
        }
    }
}

/// Send whatever the zip writer produced since the last call. `false` once the consumer is gone.
async fn send_pending(buffer: &ChunkBuffer, chunks: &ChunkSender) -> bool {
    let chunk = buffer.take();
    if chunk.is_empty() {
        return true;
    }
    chunks.send(Ok(chunk)).await.is_ok()
}

/// Compressed archive bytes, delivered as they are produced.
///
/// The archive is complete only when [`report`](Self::report) (or
/// [`collect`](Self::collect) / [`write_to`](Self::write_to)) returns `Ok`;
/// an aborted build yields [`ArchiveError::Aborted`] or the failure itself.
pub struct ArchiveStream {
    job_id: String,
    chunks: mpsc::Receiver<Result<Bytes, ArchiveError>>,
    report: oneshot::Receiver<ArchiveReport>,
}

impl ArchiveStream {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, ArchiveError>> {
        self.chunks.recv().await
    }

    /// Resolves once the archive has been finalized and every chunk was taken.
    ///
    /// Calling it with chunks still unread cancels the build and yields
    /// [`ArchiveError::Aborted`]: those bytes never reached the caller.
    pub async fn report(self) -> Result<ArchiveReport, ArchiveError> {
        let ArchiveStream {
            mut chunks, report, ..
        } = self;
        match chunks.try_recv() {
            Ok(Ok(_)) => return Err(ArchiveError::Aborted),
            Ok(Err(e)) => return Err(e),
            Err(_) => {}
        }
        drop(chunks);
        report.await.map_err(|_| ArchiveError::Aborted)
    }

    /// Drain the whole archive into memory.
    pub async fn collect(mut self) -> Result<(Vec<u8>, ArchiveReport), ArchiveError> {
        let mut archive = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            archive.extend_from_slice(&chunk?);
        }
        let report = self.report.await.map_err(|_| ArchiveError::Aborted)?;
        Ok((archive, report))
    }

    /// Copy the archive into `out` chunk by chunk.
    pub async fn write_to<W>(mut self, out: &mut W) -> Result<ArchiveReport, ArchiveError>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.next_chunk().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        self.report.await.map_err(|_| ArchiveError::Aborted)
    }
}

impl Stream for ArchiveStream {
    type Item = Result<Bytes, ArchiveError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryArtifactStore, MemoryAuditLog, StoreError};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::io::{Cursor, Read};
    use std::time::Duration;
    use zip::ZipArchive;

    fn item(index: usize) -> ArchiveItem {
        ArchiveItem {
            id: format!("inv-{}", index),
            artifact_ref: format!("pdfs/{}.pdf", index),
            customer_tax_id: format!("1234567800019{}", index),
            customer_name: format!("Cliente {}", index),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, index as u32 + 1).unwrap(),
        }
    }

    fn entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        (0..zip.len())
            .map(|i| {
                let mut file = zip.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    /// Serves artifacts with delays that make later items finish first.
    struct SlowFirstStore;

    #[async_trait]
    impl ArtifactStore for SlowFirstStore {
        async fn read_artifact(&self, reference: &str) -> Result<Option<Bytes>, StoreError> {
            let index: u64 = reference
                .trim_start_matches("pdfs/")
                .trim_end_matches(".pdf")
                .parse()
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50 - index * 10)).await;
            Ok(Some(Bytes::from(format!("%PDF-{}", index))))
        }

        async fn write_artifact(&self, _reference: &str, _bytes: Bytes) -> Result<String, StoreError> {
            Err(StoreError::Backend("read only".to_string()))
        }
    }

    struct FailingAudit;

    #[async_trait]
    impl AuditLog for FailingAudit {
        async fn record(&self, _event: AuditEvent) -> Result<(), StoreError> {
            Err(StoreError::Backend("audit down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let builder = BatchArchiveBuilder::new(Arc::new(MemoryArtifactStore::new()));
        assert!(matches!(builder.build("tester", vec![]), Err(ArchiveError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_skipped() {
        let store = Arc::new(MemoryArtifactStore::new());
        for i in [0, 1, 3, 4] {
            store.insert(format!("pdfs/{}.pdf", i), format!("%PDF-{}", i).into_bytes());
        }
        let audit = Arc::new(MemoryAuditLog::new());
        let builder = BatchArchiveBuilder::new(store).with_audit(audit.clone());

        let items: Vec<_> = (0..5).map(item).collect();
        let (archive, report) = builder.build("tester", items).unwrap().collect().await.unwrap();

        assert_eq!(report.included(), 4);
        assert_eq!(report.skipped(), 1);
        assert!(matches!(report.outcomes[2].1, EntryOutcome::Skipped { .. }));
        assert_eq!(report.representative_customer.as_deref(), Some("Cliente 0"));

        let entries = entries(&archive);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].0, "12345678000190_Cliente_0_2025-01-01_NFS-e.pdf");
        assert_eq!(entries[0].1, b"%PDF-0");

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::BatchDownload);
        assert_eq!(events[0].actor, "tester");
        assert_eq!(events[0].detail["count"], 4);
    }

    #[tokio::test]
    async fn test_entries_follow_request_order_with_concurrent_reads() {
        let builder = BatchArchiveBuilder::new(Arc::new(SlowFirstStore)).with_concurrency(5);
        let items: Vec<_> = (0..5).map(item).collect();
        let (archive, report) = builder.build("tester", items).unwrap().collect().await.unwrap();

        let contents: Vec<_> = entries(&archive).into_iter().map(|(_, content)| content).collect();
        let expected: Vec<_> = (0..5).map(|i| format!("%PDF-{}", i).into_bytes()).collect();
        assert_eq!(contents, expected);
        assert_eq!(report.included(), 5);
    }

    #[tokio::test]
    async fn test_all_missing_still_finalizes_archive() {
        let builder = BatchArchiveBuilder::new(Arc::new(MemoryArtifactStore::new()));
        let (archive, report) = builder
            .build("tester", vec![item(0), item(1)])
            .unwrap()
            .collect()
            .await
            .unwrap();

        assert_eq!(report.included(), 0);
        assert_eq!(report.skipped(), 2);
        assert!(entries(&archive).is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_build() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.insert("pdfs/0.pdf", b"%PDF".to_vec());
        let builder = BatchArchiveBuilder::new(store).with_audit(Arc::new(FailingAudit));

        let (_, report) = builder.build("tester", vec![item(0)]).unwrap().collect().await.unwrap();
        assert_eq!(report.included(), 1);
    }

    #[tokio::test]
    async fn test_dropped_consumer_never_reports_completion() {
        let builder = BatchArchiveBuilder::new(Arc::new(SlowFirstStore)).with_concurrency(1);
        let stream = builder.build("tester", (0..5).map(item).collect()).unwrap();

        assert!(matches!(stream.report().await, Err(ArchiveError::Aborted)));
    }

    #[tokio::test]
    async fn test_report_without_reading_chunks_is_aborted() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.insert("pdfs/0.pdf", b"%PDF".to_vec());
        let builder = BatchArchiveBuilder::new(store);

        let stream = builder.build("tester", vec![item(0)]).unwrap();
        // Small enough for every chunk to sit in the channel before anyone reads
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(stream.report().await, Err(ArchiveError::Aborted)));
    }

    #[tokio::test]
    async fn test_report_after_draining_succeeds() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.insert("pdfs/0.pdf", b"%PDF".to_vec());
        let builder = BatchArchiveBuilder::new(store);

        let mut stream = builder.build("tester", vec![item(0)]).unwrap();
        while let Some(chunk) = stream.next_chunk().await {
            chunk.unwrap();
        }
        assert_eq!(stream.report().await.unwrap().included(), 1);
    }

    #[tokio::test]
    async fn test_write_to_async_sink() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.insert("pdfs/0.pdf", b"%PDF".to_vec());
        let builder = BatchArchiveBuilder::new(store);

        let mut out = Vec::new();
        let report = builder
            .build("tester", vec![item(0)])
            .unwrap()
            .write_to(&mut out)
            .await
            .unwrap();

        assert_eq!(report.included(), 1);
        assert_eq!(entries(&out).len(), 1);
    }
}
