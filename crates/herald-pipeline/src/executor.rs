//! The end-to-end content pipeline for one run.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    ChannelUsed, CollaboratorError, DataSource, GenerationRequest, Generator, LedgerSession,
    MediaAttachment, MediaRenderer, Memory, NewPost, PipelineConfig, PipelineError,
    PipelineResult, PublishCoordinator, PublishOutcome, RunOutcome, RunProgress, RunStep, bounded,
};

/// Strip whitespace and wrapping quote characters from model output.
pub fn strip_wrapping_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

/// Runs gate check, memory synthesis, generation, scoring, persistence and
/// publishing in sequence.
pub struct Pipeline {
    data: Arc<dyn DataSource>,
    generator: Arc<dyn Generator>,
    memory: Arc<dyn Memory>,
    renderer: Option<Arc<dyn MediaRenderer>>,
    publisher: PublishCoordinator,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline; fails on invalid configuration.
    pub fn new(
        data: Arc<dyn DataSource>,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn Memory>,
        publisher: PublishCoordinator,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            data,
            generator,
            memory,
            renderer: None,
            publisher,
            config,
        })
    }

    /// Attach a media renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn MediaRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// `progress` is updated as steps complete so the caller can report where
    /// a failed run stopped.
    pub async fn execute(
        &self,
        session: &mut dyn LedgerSession,
        progress: &mut RunProgress,
    ) -> Result<RunOutcome, PipelineError> {
        let config = &self.config;

        // Data collection
        let snapshot = self
            .step(progress, RunStep::CollectData, self.data.collect_snapshot())
            .await?;
        let formatted_snapshot = snapshot.format_for_prompt();
        debug!(items = snapshot.items.len(), "collected snapshot");

        // Readiness gate
        let readiness = self
            .step(progress, RunStep::CheckReadiness, async {
                let readiness = self.data.check_readiness().await?;
                if !readiness.is_finite() {
                    return Err(CollaboratorError::InvalidResponse(format!(
                        "readiness is not a finite number: {}",
                        readiness
                    )));
                }
                Ok(readiness)
            })
            .await?;
        info!(readiness, threshold = config.gate_threshold, "readiness checked");
        if readiness < config.gate_threshold {
            info!("readiness below threshold, skipping run");
            return Ok(RunOutcome::GateClosed {
                readiness,
                threshold: config.gate_threshold,
            });
        }

        // Memory synthesis
        let prior_posts: Vec<String> = self
            .step(
                progress,
                RunStep::LoadPriorPosts,
                session.recent_posts(&config.username, config.prior_posts_limit),
            )
            .await?
            .into_iter()
            .map(|post| post.content)
            .collect();

        let short_term = self
            .step(
                progress,
                RunStep::SynthesizeMemory,
                self.generator.synthesize_short_term(&snapshot, &prior_posts),
            )
            .await?;
        debug!(short_term = %short_term, "short-term memory");

        let short_term_embedding = self
            .step(progress, RunStep::EmbedMemory, self.memory.embed(&short_term))
            .await?;
        let long_term = self
            .step(
                progress,
                RunStep::RetrieveMemories,
                self.memory.retrieve_relevant(&short_term_embedding),
            )
            .await?;
        debug!(count = long_term.len(), "retrieved long-term memories");

        // Generation
        let raw = self
            .step(
                progress,
                RunStep::Generate,
                self.generator.generate_post(GenerationRequest {
                    short_term: &short_term,
                    long_term: &long_term,
                    formatted_snapshot: &formatted_snapshot,
                    prior_posts: &prior_posts,
                }),
            )
            .await?;
        let content = strip_wrapping_quotes(&raw).to_string();
        if content.is_empty() {
            return Err(PipelineError::EmptyContent);
        }
        info!(content = %content, "generated post content");

        // Significance scoring
        let raw_score = self
            .step(
                progress,
                RunStep::Score,
                self.generator.score_significance(&content),
            )
            .await?;
        let score = u8::try_from(raw_score)
            .ok()
            .filter(|s| (1..=10).contains(s))
            .ok_or(PipelineError::ScoreOutOfRange(raw_score))?;
        progress.score = Some(score);
        info!(score, "significance scored");

        let will_publish = score >= config.publish_threshold;
        let media = if will_publish {
            self.render_media(&content, progress).await
        } else {
            None
        };

        // Conditional persistence; happens before publishing and survives its failure.
        let persisted_to_memory = if score >= config.memory_threshold {
            self.persist(&content, score, progress).await
        } else {
            false
        };

        let mut result = PipelineResult {
            significance_score: score,
            post_id: None,
            channel_used: ChannelUsed::None,
            persisted_to_memory,
            content,
        };

        // Conditional publish
        if !will_publish {
            info!(
                score,
                threshold = config.publish_threshold,
                "score below publish threshold, discarding content"
            );
            return Ok(RunOutcome::Completed(result));
        }

        // Each channel is bounded by the coordinator itself.
        let outcome = self
            .publisher
            .publish(&result.content, media.as_ref())
            .await
            .map_err(PipelineError::at(RunStep::Publish))?;
        progress.complete(RunStep::Publish);

        let (channel, post_id) = match outcome {
            PublishOutcome::Published { channel, post_id } => (channel, post_id),
            PublishOutcome::Failed => {
                warn!(score, "publish exhausted both channels, content lost for this cycle");
                return Ok(RunOutcome::Completed(result));
            }
        };
        result.channel_used = channel.into();
        result.post_id = Some(post_id.clone());

        // Record keeping
        let user = bounded(
            "ensure_user",
            config.call_timeout,
            session.ensure_user(&config.username),
        )
        .await
        .map_err(PipelineError::at(RunStep::RecordPost))?;
        let post = NewPost {
            user_id: user.id,
            username: user.username,
            content: result.content.clone(),
            external_id: post_id,
            channel,
        };
        let record = bounded("append_post", config.call_timeout, session.append_post(post))
            .await
            .map_err(PipelineError::at(RunStep::RecordPost))?;
        progress.complete(RunStep::RecordPost);
        info!(
            record_id = %record.id,
            post_id = %record.external_id,
            channel = %channel,
            "post recorded"
        );

        Ok(RunOutcome::Completed(result))
    }

    /// Await a collaborator call under the configured timeout and mark the
    /// step complete on success.
    async fn step<T, F>(
        &self,
        progress: &mut RunProgress,
        step: RunStep,
        fut: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let value = bounded(step_call_name(step), self.config.call_timeout, fut)
            .await
            .map_err(PipelineError::at(step))?;
        progress.complete(step);
        Ok(value)
    }

    async fn render_media(
        &self,
        content: &str,
        progress: &mut RunProgress,
    ) -> Option<MediaAttachment> {
        let renderer = self.renderer.as_ref()?;
        match bounded(
            "render_media",
            self.config.call_timeout,
            renderer.render(content),
        )
        .await
        {
            Ok(media) => {
                progress.complete(RunStep::RenderMedia);
                media
            }
            Err(e) => {
                warn!(error = %e, "media rendering failed, publishing text only");
                None
            }
        }
    }

    async fn persist(&self, content: &str, score: u8, progress: &mut RunProgress) -> bool {
        let stored = async {
            let embedding = self.memory.embed(content).await?;
            self.memory.store(content, &embedding, score).await
        };
        match bounded("store_memory", self.config.call_timeout, stored).await {
            Ok(()) => {
                progress.complete(RunStep::Persist);
                info!(score, "stored content in long-term memory");
                true
            }
            Err(e) => {
                warn!(error = %e, score, "failed to store long-term memory");
                false
            }
        }
    }
}

fn step_call_name(step: RunStep) -> &'static str {
    match step {
        RunStep::OpenSession => "open_session",
        RunStep::CollectData => "collect_snapshot",
        RunStep::CheckReadiness => "check_readiness",
        RunStep::LoadPriorPosts => "recent_posts",
        RunStep::SynthesizeMemory => "synthesize_short_term",
        RunStep::EmbedMemory => "embed",
        RunStep::RetrieveMemories => "retrieve_relevant",
        RunStep::Generate => "generate_post",
        RunStep::Score => "score_significance",
        RunStep::RenderMedia => "render_media",
        RunStep::Persist => "store_memory",
        RunStep::Publish => "publish",
        RunStep::RecordPost => "append_post",
    }
}
