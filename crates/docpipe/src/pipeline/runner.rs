use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::enhancer::Enhancement;
use crate::error::{ConfigError, StageError, StorageError};
use crate::processor::InputKind;
use crate::render::render;
use crate::sanitize;
use crate::task::{PipelineStage, ProcessingResult, TaskStore};

use super::context::PipelineContext;
use super::error::{FatalStage, PipelineError};
use super::params::ProcessParams;
use super::services::Services;

/// Sequences the stages of one document run and reports into the task store.
///
/// The pipeline never keeps task state of its own; every status change is a
/// call on the [`TaskStore`]. Stages run strictly one after another.
pub struct Pipeline {
    services: Services,
    tasks: Arc<dyn TaskStore>,
}

/// Runs `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    stage: PipelineStage,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
        out = fut => Ok(out),
    }
}

/// OCR confidences are stored with four decimals.
fn round_confidence(confidence: f32) -> f64 {
    (f64::from(confidence) * 10_000.0).round() / 10_000.0
}

impl Pipeline {
    /// Production constructor, builds all services from config.
    pub fn from_config(config: &Config, tasks: Arc<dyn TaskStore>) -> Result<Self, ConfigError> {
        Ok(Self::new(Services::from_config(config)?, tasks))
    }

    /// Injection constructor.
    pub fn new(services: Services, tasks: Arc<dyn TaskStore>) -> Self {
        Self { services, tasks }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    /// Runs every stage for `task_id`. On a fatal error the task is marked
    /// failed before the error is returned.
    pub async fn run(
        &self,
        task_id: &str,
        path: &Path,
        params: ProcessParams,
    ) -> Result<ProcessingResult, PipelineError> {
        self.run_with_cancellation(task_id, path, params, &CancellationToken::new())
            .await
    }

    /// Like [`Pipeline::run`], aborting at the next stage boundary or
    /// in-flight collaborator call once `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        task_id: &str,
        path: &Path,
        params: ProcessParams,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, PipelineError> {
        let mut ctx = PipelineContext::new(task_id, path, params);
        let span = info_span!("pipeline",
            task_id = %sanitize::short_id(task_id, 8),
            filename = %ctx.source_name,
            format = %ctx.params.output_format,
        );

        let outcome = self.execute(&mut ctx, cancel).instrument(span).await;

        if let Err(ref e) = outcome {
            if e.is_cancelled() {
                warn!(task_id, "{}", e);
            } else {
                error!(task_id, "{}", e);
            }
            self.tasks.fail(task_id, &e.to_string());
        }
        outcome
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, PipelineError> {
        let structural = self
            .step_structural_parse(ctx, cancel)
            .instrument(info_span!("stage.parse"))
            .await?;

        self.step_ocr(ctx, &structural, cancel)
            .instrument(info_span!("stage.ocr"))
            .await?;

        self.step_enhance(ctx, cancel)
            .instrument(info_span!("stage.enhance"))
            .await?;

        self.step_chunk(ctx, cancel)
            .instrument(info_span!("stage.chunk"))
            .await?;

        self.step_index(ctx, cancel)
            .instrument(info_span!("stage.index"))
            .await?;

        self.step_persist(ctx, cancel)
            .instrument(info_span!("stage.persist"))
            .await
    }

    /// Checks for cancellation, then records the stage checkpoint.
    fn enter(
        &self,
        ctx: &PipelineContext,
        stage: PipelineStage,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        if !self.tasks.update_stage(&ctx.task_id, stage, stage.checkpoint()) {
            debug!("Stage update for {} was ignored", stage);
        }
        Ok(())
    }

    // ─── Steps ──────────────────────────────────────────────────────────────

    /// Returns the structural text, empty for non-PDF inputs.
    async fn step_structural_parse(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let stage = PipelineStage::StructuralParse;
        self.enter(ctx, stage, cancel)?;

        if ctx.input_kind != InputKind::Pdf {
            return Ok(String::new());
        }

        let parsed = until_cancelled(cancel, stage, self.services.parser.parse(&ctx.path))
            .await?
            .map_err(|e| PipelineError::stage(FatalStage::StructuralParse, e))?;

        info!(
            parser = self.services.parser.name(),
            tables = parsed.table_count,
            chars = parsed.text.chars().count(),
            "Structural parse complete"
        );
        ctx.metadata.insert_new("structuralTables", parsed.table_count);
        ctx.metadata.extend_new(&parsed.metadata);
        Ok(parsed.best_text().to_string())
    }

    async fn step_ocr(
        &self,
        ctx: &mut PipelineContext,
        structural: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let stage = PipelineStage::Ocr;
        self.enter(ctx, stage, cancel)?;

        let ocr = until_cancelled(
            cancel,
            stage,
            self.services.ocr.extract(&ctx.path, &ctx.params.languages),
        )
        .await?
        .map_err(|e| PipelineError::stage(FatalStage::Ocr, e))?;

        info!(
            blocks = ocr.blocks.len(),
            confidence = ocr.avg_confidence,
            "OCR complete"
        );
        ctx.metadata
            .insert_new("ocrConfidence", round_confidence(ocr.avg_confidence));
        ctx.metadata.insert_new("ocrBlocks", ocr.blocks.len());

        ctx.text = self.services.merge_policy.merge(structural, &ocr.full_text);
        Ok(())
    }

    /// Never fatal: a failed enhancement keeps the merged text.
    async fn step_enhance(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let stage = PipelineStage::Enhance;
        self.enter(ctx, stage, cancel)?;

        if !ctx.params.enable_vlm || ctx.text.is_empty() {
            ctx.metadata.insert_new("vlmEnhanced", false);
            return Ok(());
        }

        let outcome = until_cancelled(
            cancel,
            stage,
            self.services
                .enhancer
                .enhance(&ctx.path, &ctx.text, ctx.params.output_format),
        )
        .await?;

        match outcome {
            Enhancement::Enhanced(text) => {
                ctx.text = text;
                ctx.metadata.insert_new("vlmEnhanced", true);
            }
            Enhancement::Fallback { reason, .. } => {
                warn!("Enhancement skipped, keeping extracted text: {}", reason);
                ctx.metadata.insert_new("vlmEnhanced", false);
                ctx.metadata.insert_new("vlmError", reason);
            }
        }
        Ok(())
    }

    async fn step_chunk(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let stage = PipelineStage::Chunk;
        self.enter(ctx, stage, cancel)?;

        let chunker = self.services.chunker.clone();
        let text = ctx.text.clone();
        let base = ctx.chunk_base_metadata();
        let mode = ctx.params.chunk_mode();
        let settings = ctx.params.chunk_settings();

        let handle =
            tokio::task::spawn_blocking(move || chunker.chunk(&text, &base, mode, settings));

        let chunks = until_cancelled(cancel, stage, handle)
            .await?
            .map_err(|e| {
                PipelineError::stage(
                    FatalStage::Chunk,
                    StageError::Chunk(format!("Chunking task aborted: {}", e)),
                )
            })?
            .map_err(|e| PipelineError::stage(FatalStage::Chunk, StageError::Chunk(e.to_string())))?;

        info!(chunks = chunks.len(), ?mode, "Chunking complete");
        ctx.chunks = chunks;
        Ok(())
    }

    /// Never fatal: index failures are recorded in metadata.
    async fn step_index(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let stage = PipelineStage::Index;
        self.enter(ctx, stage, cancel)?;

        if !ctx.params.store_in_index || ctx.chunks.is_empty() {
            return Ok(());
        }

        let stored = until_cancelled(
            cancel,
            stage,
            self.services
                .index
                .store(&ctx.chunks, ctx.params.collection.as_deref()),
        )
        .await?;

        match stored {
            Ok(ids) => {
                info!(index = self.services.index.name(), ids = ids.len(), "Chunks indexed");
                ctx.vector_ids = ids;
            }
            Err(e) => {
                warn!("Indexing failed, continuing without vector ids: {}", e);
                ctx.metadata.insert_new("indexError", e.to_string());
            }
        }
        Ok(())
    }

    /// Renders, persists and completes the task.
    async fn step_persist(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: PipelineStage::Done,
            });
        }

        let content = render(
            ctx.params.output_format,
            &ctx.text,
            &ctx.metadata,
            ctx.chunks.len(),
        )
        .map_err(|e| PipelineError::stage(FatalStage::Persist, StorageError::from(e)))?;

        let mut result = ProcessingResult {
            output_format: ctx.params.output_format,
            content,
            metadata: ctx.metadata.clone(),
            chunks_count: ctx.chunks.len(),
            vector_ids: std::mem::take(&mut ctx.vector_ids),
        };

        // Not raced against cancellation: a half-written output is worse
        // than a completed one.
        let stored = self
            .services
            .sink
            .persist(&ctx.task_id, &ctx.source_name, &result)
            .await
            .map_err(|e| PipelineError::stage(FatalStage::Persist, e))?;

        result
            .metadata
            .insert_new("outputFile", stored.location.display().to_string());
        if let Some(meta) = stored.metadata_location {
            result
                .metadata
                .insert_new("metadataFile", meta.display().to_string());
        }

        if self.tasks.complete(&ctx.task_id, result.clone()) {
            info!(
                chunks = result.chunks_count,
                output = %sanitize::redact_path(&stored.location),
                "Pipeline complete"
            );
        } else {
            warn!("Task record gone before completion, result kept on disk only");
        }
        Ok(result)
    }
}
